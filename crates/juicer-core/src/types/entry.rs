//! Decoded type entries as exposed by a debug source.

use smallvec::SmallVec;

use super::ids::EntryId;

/// Per-axis element counts of an array, outermost axis first.
pub type Extents = SmallVec<[u64; 4]>;

/// One type-describing entry from a binary's debug information.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeEntry
{
    pub id: EntryId,
    pub name: Option<String>,
    pub byte_size: Option<u64>,
    pub kind: EntryKind,
}

impl TypeEntry
{
    /// Name of the entry, or the empty string for anonymous types.
    pub fn name_or_empty(&self) -> &str
    {
        self.name.as_deref().unwrap_or("")
    }

    /// Whether the entry has no usable name.
    pub fn is_anonymous(&self) -> bool
    {
        self.name.as_deref().is_none_or(str::is_empty)
    }
}

/// Closed set of entry kinds the builder knows how to resolve.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryKind
{
    /// Primitive type (`int`, `float`, ...). Opaque entries such as function
    /// types decode to this as well.
    Base,
    /// Struct or union with members at fixed byte offsets.
    Compound
    {
        kind: CompoundKind,
        members: Vec<MemberEntry>,
        /// Forward declaration with no definition anywhere in the input.
        declaration: bool,
    },
    /// Enumeration with its named constants.
    Enumeration
    {
        enumerators: Vec<Enumerator>,
    },
    /// Array of `element`, one extent per axis.
    Array
    {
        element: EntryId,
        extents: Extents,
    },
    /// Pointer; `None` target means `void *`.
    Pointer
    {
        target: Option<EntryId>,
    },
    /// Named alias of another type.
    Typedef
    {
        target: Option<EntryId>,
    },
    /// `const`/`volatile`/`restrict`/`_Atomic` wrapper, transparent for layout.
    Qualified
    {
        target: Option<EntryId>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompoundKind
{
    Struct,
    Union,
}

/// A member of a compound entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberEntry
{
    pub name: Option<String>,
    pub byte_offset: u64,
    pub type_ref: EntryId,
    pub bit_size: Option<u64>,
    pub bit_offset: Option<u64>,
}

impl MemberEntry
{
    /// Plain by-value member.
    pub fn new(name: impl Into<String>, byte_offset: u64, type_ref: EntryId) -> Self
    {
        Self {
            name: Some(name.into()),
            byte_offset,
            type_ref,
            bit_size: None,
            bit_offset: None,
        }
    }

    /// Attach bit-field placement to the member.
    #[must_use]
    pub fn with_bits(mut self, bit_size: u64, bit_offset: u64) -> Self
    {
        self.bit_size = Some(bit_size);
        self.bit_offset = Some(bit_offset);
        self
    }
}

/// A named constant of an enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enumerator
{
    pub name: String,
    pub value: i64,
}
