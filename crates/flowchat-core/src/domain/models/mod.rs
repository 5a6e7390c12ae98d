mod chunk;
mod collaborators;
mod conversation;
mod error_category;
mod message;

pub use chunk::*;
pub use collaborators::*;
pub use conversation::*;
pub use error_category::*;
pub use message::*;
