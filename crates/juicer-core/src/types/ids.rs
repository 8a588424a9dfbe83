//! Identifier newtypes for debug entries and graph rows.

use std::fmt;

/// Identity of one type-describing debug entry within a single input.
///
/// Entry ids are only meaningful relative to the `DebugSource` that produced
/// them. For DWARF inputs the id packs the unit index into the high 32 bits
/// and the entry's offset within that unit into the low 32 bits, so it is
/// stable across repeated decodes of the same file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId(u64);

impl EntryId
{
    /// Create an identifier from a raw value.
    #[must_use]
    pub const fn from_raw(value: u64) -> Self
    {
        Self(value)
    }

    /// Identifier for the entry at `offset` within unit number `unit`.
    #[must_use]
    pub fn from_unit(unit: usize, offset: usize) -> Self
    {
        Self(((unit as u64) << 32) | (offset as u64 & 0xffff_ffff))
    }

    /// Get the raw numeric representation (useful for logging / errors).
    #[must_use]
    pub const fn raw(self) -> u64
    {
        self.0
    }
}

impl fmt::Display for EntryId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "<{}:0x{:x}>", self.0 >> 32, self.0 & 0xffff_ffff)
    }
}

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(i64);

        impl $name
        {
            /// Create an identifier from a raw row id.
            #[must_use]
            pub const fn from_raw(value: i64) -> Self
            {
                Self(value)
            }

            /// Raw row id as stored in the graph store.
            #[must_use]
            pub const fn raw(self) -> i64
            {
                self.0
            }
        }

        impl fmt::Display for $name
        {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
            {
                write!(f, "{}", self.0)
            }
        }
    };
}

row_id!(
    /// Graph-local identifier of a `Symbol` row.
    SymbolId
);
row_id!(
    /// Graph-local identifier of a `Field` row.
    FieldId
);
row_id!(
    /// Graph-local identifier of one dimension entry.
    DimensionId
);
row_id!(
    /// Groups the dimension entries that belong to one array field.
    DimensionListId
);
row_id!(
    /// Identifier of the input binary that first produced a symbol.
    OriginId
);
row_id!(
    /// Identifier of one enumeration constant.
    EnumeratorId
);
