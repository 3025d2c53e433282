//! An in-memory nested configuration tree with typed access, deterministic
//! layer merging, serde-driven struct binding, and change notification.
//!
//! The central type is [`Config`], a thread-safe accessor over a tree of
//! [`Value`]s addressed by dotted paths. Layers from [`Source`]s merge
//! right-biased and table-recursive; scalars read out through a permissive
//! coercion layer ([`convert`]); whole subtrees bind into any `Deserialize`
//! target with three-tier default precedence; and observers hear about
//! every mutation.
//!
//! ```
//! use confmap::{Config, table_from_json};
//! use serde_json::json;
//!
//! let config = Config::from_table(table_from_json(json!({
//!     "server": {"host": "localhost", "port": "8080"},
//!     "timeout": "2m",
//! })));
//! assert_eq!(config.get_u64("server.port"), 8080);
//! assert_eq!(config.get_duration("timeout").as_secs(), 120);
//!
//! let server = config.sub("server");
//! assert_eq!(server.get_string("host"), "localhost");
//! ```

mod bind;
mod config;
pub mod convert;
mod error;
pub mod merge;
mod options;
pub mod path;
mod source;
mod value;

pub use bind::{BindOptions, bind_value, from_value};
pub use config::Config;
pub use convert::{FromValue, split_csv};
pub use error::{Error, Result};
pub use options::GetOptions;
pub use source::{ChangeEvent, ChangeKind, MemorySource, Source, Validate, ValidationMode};
pub use value::{Table, Value, table_from_json, to_value};
