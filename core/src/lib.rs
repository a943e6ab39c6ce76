pub mod config;
pub mod error;

pub use config::{ReaderConfig, DEFAULT_BLOCK_SIZE};
pub use error::RawfsError;
