//! Mosaic Generator Library
//!
//! Static site builder for Mosaic.
//!
//! # Modules
//!
//! - [`script`] - Parser for `.mosaic` page, layout and component sources
//! - [`eval`] - Script evaluation against a render context
//! - [`discover`] - Domain, page and template discovery with URL mapping
//! - [`assets`] - Global asset copying and content-hashed domain assets
//! - [`deps`] - Persisted dependency graph for incremental rebuilds
//! - [`build`] - Build orchestration

pub mod assets;
pub mod build;
pub mod deps;
pub mod discover;
pub mod eval;
pub mod script;

pub use assets::{AssetError, AssetManifest, AssetProcessor};
pub use build::{BuildError, BuildStats, Builder};
pub use deps::{Dependencies, DependencyGraph};
pub use discover::{Discoverer, Discovery, ErrorPage, PageSource};
pub use script::{Script, ScriptError};
