//! Platform-agnostic types shared by the debug access layer, the graph store,
//! and the builder.

pub mod entry;
pub mod ids;
pub mod records;

pub use entry::{CompoundKind, EntryKind, Enumerator, Extents, MemberEntry, TypeEntry};
pub use ids::{DimensionId, DimensionListId, EntryId, EnumeratorId, FieldId, OriginId, SymbolId};
pub use records::{
    DimensionRecord, EnumeratorRecord, FieldRecord, GraphSnapshot, NewField, NewSymbol, OriginRecord, SymbolRecord,
};
