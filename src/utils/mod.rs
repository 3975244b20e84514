pub mod idempotency;
pub mod logging;
pub mod time;

pub use idempotency::{batch_key, generate_idempotency_key};
pub use logging::init_logging;
pub use time::*;
