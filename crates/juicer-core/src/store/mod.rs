//! # Graph Store
//!
//! The minimal persistence contract the builder writes the symbol graph
//! through.
//!
//! Every entity has a natural key, and inserting a row whose key already
//! exists never creates a second row:
//!
//! | Entity     | Natural key           |
//! |------------|-----------------------|
//! | origin     | `name`                |
//! | symbol     | `(name, byte_size)`   |
//! | field      | `(owner, name)`       |
//! | dimension  | `(list, dim_order)`   |
//! | enumerator | `(symbol, name)`      |
//!
//! ## Realizations
//!
//! - [`SqliteStore`]: durable, backed by `rusqlite` with the bundled SQLite
//! - [`MemoryStore`]: arena-backed, for tests and throwaway runs
//!
//! The store handle is owned by the caller. Juicer borrows it for the
//! duration of its parse calls and never opens, closes, or deletes the
//! underlying storage.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::JuicerResult;
use crate::types::{
    DimensionId, DimensionListId, EnumeratorId, FieldId, FieldRecord, GraphSnapshot, NewField, NewSymbol, OriginId,
    SymbolId, SymbolRecord,
};

/// Outcome of an insert-or-get operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inserted<T>
{
    /// A new row was written.
    Created(T),
    /// A row with the same natural key already existed; nothing was written.
    Existing(T),
}

impl<T: Copy> Inserted<T>
{
    /// The row id, whichever way it was obtained.
    pub fn id(&self) -> T
    {
        match self {
            Inserted::Created(id) | Inserted::Existing(id) => *id,
        }
    }

    pub fn was_created(&self) -> bool
    {
        matches!(self, Inserted::Created(_))
    }
}

/// Persistence contract for the symbol graph.
///
/// ## Errors
///
/// Inserts report a natural-key collision either as `Ok(Inserted::Existing)`
/// or, when the store cannot name the colliding row, as
/// `JuicerError::StoreConflict`. Any other failure is `JuicerError::Store`.
///
/// ## Thread Safety
///
/// Stores are not expected to tolerate concurrent writers. Callers serialize
/// parse calls against one store.
pub trait GraphStore
{
    /// Record an input binary.
    fn insert_origin(&mut self, name: &str, little_endian: bool) -> JuicerResult<Inserted<OriginId>>;

    /// Insert a symbol, or return the one with the same `(name, byte_size)`.
    fn insert_symbol(&mut self, symbol: &NewSymbol<'_>) -> JuicerResult<Inserted<SymbolId>>;

    /// Insert a field, or return the one with the same `(owner, name)`.
    fn insert_field(&mut self, field: &NewField<'_>) -> JuicerResult<Inserted<FieldId>>;

    /// Insert one axis of a dimension list.
    fn insert_dimension(&mut self, list: DimensionListId, dim_order: u32, extent: u64) -> JuicerResult<DimensionId>;

    /// Insert an enumeration constant, or return the one with the same
    /// `(symbol, name)`.
    fn insert_enumerator(&mut self, symbol: SymbolId, name: &str, value: i64) -> JuicerResult<Inserted<EnumeratorId>>;

    /// Reserve a dimension list id no existing dimension entry uses.
    fn allocate_dimension_list_id(&mut self) -> JuicerResult<DimensionListId>;

    fn find_origin(&self, name: &str) -> JuicerResult<Option<OriginId>>;

    fn find_symbol(&self, name: &str, byte_size: u64) -> JuicerResult<Option<SymbolId>>;

    fn find_field(&self, owner: SymbolId, name: &str) -> JuicerResult<Option<FieldId>>;

    fn symbol_by_id(&self, id: SymbolId) -> JuicerResult<Option<SymbolRecord>>;

    fn field_by_id(&self, id: FieldId) -> JuicerResult<Option<FieldRecord>>;

    /// Every symbol with the given name, in id order.
    fn symbols_named(&self, name: &str) -> JuicerResult<Vec<SymbolRecord>>;

    /// Point every field whose type is `from` at `to`. Returns the number of
    /// rewritten fields.
    fn retarget_fields(&mut self, from: SymbolId, to: SymbolId) -> JuicerResult<usize>;

    /// Point one field at another type symbol, keeping the rest of its row.
    ///
    /// Returns whether the field exists.
    fn set_field_type(&mut self, field: FieldId, type_symbol: SymbolId) -> JuicerResult<bool>;

    /// Read the whole graph, every table ordered by id.
    fn snapshot(&self) -> JuicerResult<GraphSnapshot>;

    /// Make everything written so far durable.
    fn commit(&mut self) -> JuicerResult<()>;
}
