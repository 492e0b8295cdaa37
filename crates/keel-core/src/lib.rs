pub mod config;
pub mod image;
pub mod types;

pub use config::{ConfigError, KeelConfig, parse_duration};
pub use image::{Image, ImageError};
pub use types::*;
