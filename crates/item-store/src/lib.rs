//! Keyed item store used as the persistence collaborator.
//!
//! Items are JSON objects addressed by a configurable [`KeySchema`]: a
//! partition attribute plus an optional sort attribute. Operations never
//! span more than one item transactionally.

pub mod error;
pub mod key;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;

pub use error::{Result, StoreError};
pub use key::{Item, ItemKey, KeySchema};
pub use memory::InMemoryItemStore;
pub use postgres::PostgresItemStore;
pub use query::{ItemQuery, SortCondition};
pub use store::{Condition, ItemStore, ItemStoreExt, Update, to_item};
