//! Mosaic Render Library
//!
//! Template registry, render cache, slot composition and component style
//! consolidation for the Mosaic static site generator.
//!
//! # Modules
//!
//! - [`template`] - Template identifiers, tagged template variants and arguments
//! - [`context`] - Per-render state: buffer, slots, usage record
//! - [`engine`] - Registry, memoization cache and layout substitution
//! - [`styles`] - Compile-once component styles and consolidated stylesheets
//!
//! # Example
//!
//! ```
//! use mosaic_render::{Args, Engine};
//!
//! let engine = Engine::new();
//! engine
//!     .define_layout("main", |ctx, _| {
//!         ctx.raw("<main>");
//!         ctx.pull("main");
//!         ctx.raw("</main>");
//!         Ok(())
//!     })
//!     .unwrap();
//! engine
//!     .define_page("home", |ctx, _| {
//!         ctx.layout("main", |ctx| ctx.push("main", |ctx| {
//!             ctx.text("Hello & welcome");
//!             Ok(())
//!         }))
//!     })
//!     .unwrap();
//!
//! let html = engine.render_page("home", &Args::new()).unwrap();
//! assert_eq!(html, "<main>Hello &amp; welcome</main>");
//! ```

pub mod context;
pub mod engine;
pub mod error;
pub mod styles;
pub mod template;

pub use context::{CONTENT_ARG, MAIN_SLOT, RenderContext, Usage, escape_html};
pub use engine::{CompiledLayout, Engine, Rendered};
pub use error::{RenderError, Result};
pub use styles::{Breakpoint, CompiledStyle, StyleBuilder, StyleError, StyleRegistry};
pub use template::{Args, RenderFn, Template, TemplateId, TemplateKind};
