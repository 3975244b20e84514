pub mod types;
pub mod error;
pub mod config;
pub mod utils;
pub mod source;
pub mod storage;
pub mod data;
pub mod scheduler;
pub mod health;

pub use types::*;
pub use error::{Result, SyncError};
