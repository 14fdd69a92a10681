//! Configuration Module
//!
//! Configuration loading for the stream tap.

mod settings;

pub use settings::{ConfigError, FeedConfig, StreamSettings};
