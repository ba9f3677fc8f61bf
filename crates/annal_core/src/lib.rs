pub mod api;
pub mod entity;
pub mod error;
pub mod page;
pub mod query;
pub mod rule;
pub mod shard;
pub mod value;

pub use api::*;
pub use entity::*;
pub use error::{AnnalError, AnnalResult};
pub use page::*;
pub use query::{CompiledRules, NamedParams, compile, expand_named};
pub use rule::*;
pub use shard::*;
pub use value::*;
