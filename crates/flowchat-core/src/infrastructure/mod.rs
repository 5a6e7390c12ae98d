pub mod collaborators;
pub mod storage;
