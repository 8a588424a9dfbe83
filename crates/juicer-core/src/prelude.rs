//! Common module for library exports

pub use crate::dwarf::{DebugSource, DwarfImage, MemorySource};
pub use crate::error::{JuicerError, JuicerResult};
pub use crate::juicer::{Juicer, ParseState, Status};
pub use crate::overrides::{apply_overrides, FieldOverride, OverrideReport, Replacement};
pub use crate::remap::{remap_symbols, RemapReport};
pub use crate::store::{GraphStore, Inserted, MemoryStore, SqliteStore};
pub use crate::types::{EntryId, EntryKind, GraphSnapshot, MemberEntry, SymbolId, TypeEntry};
