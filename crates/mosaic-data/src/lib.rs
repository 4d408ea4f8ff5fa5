//! Mosaic Data Library
//!
//! Immutable in-memory collections loaded from JSON, YAML or TOML, queried
//! through chainable [`Query`] values with scopes, computed methods and
//! pagination.
//!
//! # Example
//!
//! ```
//! use mosaic_data::{DataStore, Matcher, Value};
//!
//! let mut store = DataStore::new("data");
//! store
//!     .define("posts", |def| {
//!         let posts = [("Hello", 3), ("Later", 7), ("Draft", 1)].map(|(title, views)| {
//!             Value::Map(
//!                 [
//!                     ("title".to_string(), Value::from(title)),
//!                     ("views".to_string(), Value::from(views)),
//!                 ]
//!                 .into(),
//!             )
//!         });
//!         def.from_array(posts)?;
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! let popular = store
//!     .query("posts")
//!     .unwrap()
//!     .filter([("views", Matcher::GreaterThan(2.into()))])
//!     .order("views", true);
//! assert_eq!(popular.count(), 2);
//! assert_eq!(popular.first().unwrap().field("title"), &Value::from("Later"));
//! ```

pub mod collection;
pub mod condition;
pub mod error;
pub mod item;
pub mod loader;
pub mod page;
pub mod query;
pub mod store;
pub mod value;

pub use collection::{Collection, Definition, MethodFn, Record, ScopeFn};
pub use condition::{Condition, Matcher};
pub use error::{DataError, Result};
pub use item::Item;
pub use page::Page;
pub use query::Query;
pub use store::DataStore;
pub use value::Value;
