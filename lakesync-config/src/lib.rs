//! Configuration loading and shared configuration types for lakesync services.

mod environment;
mod load;
pub mod shared;

pub use environment::Environment;
pub use load::{load_config, LoadConfigError};
