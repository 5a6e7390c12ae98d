mod dispatcher;
mod persistence;
mod scheduler;
mod session;
mod store;

pub use dispatcher::*;
pub use persistence::*;
pub use scheduler::*;
pub use session::*;
pub use store::*;
