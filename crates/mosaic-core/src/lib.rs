//! Mosaic Core Library
//!
//! Configuration and error handling shared by the Mosaic static site generator.

pub mod config;
pub mod error;

pub use config::{BuildConfig, Config, SiteConfig};
pub use error::{CoreError, Result};
