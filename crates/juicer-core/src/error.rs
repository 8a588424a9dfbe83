//! # Error Types
//!
//! General error handling for the type-graph extraction engine.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages.

use thiserror::Error;

use crate::types::EntryId;

/// Main error type for Juicer operations
///
/// This enum represents all the ways extracting a type graph can fail.
///
/// ## Error Categories
///
/// 1. **Access errors**: Access (the binary or its debug information is unusable)
/// 2. **Graph errors**: UnresolvedReference, TypeDepthExceeded
/// 3. **Store errors**: StoreConflict (always recovered), Store, NoStore
/// 4. **Remap and override errors**: UnknownSymbol, UnknownField, InvalidRemap,
///    InvalidOverride
/// 5. **I/O errors**: Io (for file operations, etc.)
#[derive(Error, Debug)]
pub enum JuicerError
{
    /// The debug access layer could not produce entries
    ///
    /// This happens when:
    /// - The input file does not exist or cannot be read
    /// - The file is not an object file `object` understands
    /// - The file carries no (or malformed) DWARF debug information
    #[error("Debug information unavailable: {0}")]
    Access(String),

    /// A member or element type reference points at an entry the debug access
    /// layer cannot produce.
    #[error("Unresolved type reference to entry {entry}")]
    UnresolvedReference
    {
        /// The dangling entry identity
        entry: EntryId,
    },

    /// A chain of type references is deeper than the resolver accepts
    ///
    /// Well-formed debug information never comes close; hitting this limit
    /// means the input describes a reference loop that does not pass through
    /// a compound type.
    #[error("Type reference chain at entry {entry} exceeds depth {depth}")]
    TypeDepthExceeded
    {
        /// Entry being resolved when the limit was hit
        entry: EntryId,
        /// The configured limit
        depth: usize,
    },

    /// An insert collided with an existing natural key
    ///
    /// The merge resolver recovers from this by re-querying the store and
    /// reusing the existing row; it is never reported from `parse`.
    #[error("Store conflict on {entity} with key {key}")]
    StoreConflict
    {
        /// Table or entity kind that collided
        entity: &'static str,
        /// Human-readable natural key
        key: String,
    },

    /// The graph store failed for a reason unrelated to natural keys
    #[error("Graph store error: {0}")]
    Store(String),

    /// `parse` was called before a graph store was bound
    ///
    /// ## Solution
    ///
    /// Call `Juicer::set_store` before the first `parse`.
    #[error("No graph store bound to this Juicer")]
    NoStore,

    /// A remap named a symbol that does not exist in the store
    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),

    /// A remap request is malformed (e.g. the same symbol is remapped twice)
    #[error("Invalid remap: {0}")]
    InvalidRemap(String),

    /// An override named a field its symbol does not have
    #[error("Symbol {symbol} has no field {field}")]
    UnknownField
    {
        symbol: String,
        field: String,
    },

    /// An override request is malformed
    #[error("Invalid override: {0}")]
    InvalidOverride(String),

    /// I/O error (for file operations, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for JuicerError
{
    fn from(err: rusqlite::Error) -> Self
    {
        JuicerError::Store(err.to_string())
    }
}

/// Convenience type alias for `Result<T, JuicerError>`
///
/// ```rust
/// use juicer_core::error::JuicerResult;
/// fn foo() -> JuicerResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type JuicerResult<T> = std::result::Result<T, JuicerError>;

/// Map a gimli DWARF error to a `JuicerError` with context.
pub(crate) fn map_dwarf_error(context: &str, err: gimli::Error) -> JuicerError
{
    JuicerError::Access(format!("{context}: {err}"))
}
