pub mod loader;

pub use loader::{load_config, load_config_from_str, read_config, validate_config, validate_sync_config};
