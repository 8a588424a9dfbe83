//! Rows of the symbol graph.

use super::ids::{DimensionId, DimensionListId, EnumeratorId, FieldId, OriginId, SymbolId};

/// One input binary (the `elfs` table).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginRecord
{
    pub id: OriginId,
    pub name: String,
    pub little_endian: bool,
}

/// One logical type definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolRecord
{
    pub id: SymbolId,
    pub origin: OriginId,
    pub name: String,
    pub byte_size: u64,
}

/// One member of a compound symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRecord
{
    pub id: FieldId,
    pub owner: SymbolId,
    pub name: String,
    pub byte_offset: u64,
    pub type_symbol: SymbolId,
    pub dimension_list: Option<DimensionListId>,
    pub little_endian: bool,
    pub bit_size: Option<u64>,
    pub bit_offset: Option<u64>,
    pub pointer_depth: u32,
}

/// One axis of an array field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DimensionRecord
{
    pub id: DimensionId,
    pub list: DimensionListId,
    pub dim_order: u32,
    pub extent: u64,
}

/// One enumeration constant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumeratorRecord
{
    pub id: EnumeratorId,
    pub symbol: SymbolId,
    pub name: String,
    pub value: i64,
}

/// Insert payload for a symbol row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSymbol<'a>
{
    pub origin: OriginId,
    pub name: &'a str,
    pub byte_size: u64,
}

/// Insert payload for a field row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewField<'a>
{
    pub owner: SymbolId,
    pub name: &'a str,
    pub byte_offset: u64,
    pub type_symbol: SymbolId,
    pub dimension_list: Option<DimensionListId>,
    pub little_endian: bool,
    pub bit_size: Option<u64>,
    pub bit_offset: Option<u64>,
    pub pointer_depth: u32,
}

/// Full, id-ordered copy of a store's content.
///
/// Two snapshots compare equal exactly when the stores are observationally
/// identical.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphSnapshot
{
    pub origins: Vec<OriginRecord>,
    pub symbols: Vec<SymbolRecord>,
    pub fields: Vec<FieldRecord>,
    pub dimensions: Vec<DimensionRecord>,
    pub enumerators: Vec<EnumeratorRecord>,
}

impl GraphSnapshot
{
    /// Symbols with the given name, in id order.
    pub fn symbols_named<'s>(&'s self, name: &'s str) -> impl Iterator<Item = &'s SymbolRecord> + 's
    {
        self.symbols.iter().filter(move |symbol| symbol.name == name)
    }

    /// The single symbol with the given name, if exactly one exists.
    pub fn symbol(&self, name: &str) -> Option<&SymbolRecord>
    {
        let mut matches = self.symbols.iter().filter(|symbol| symbol.name == name);
        let first = matches.next()?;
        matches.next().is_none().then_some(first)
    }

    pub fn symbol_by_id(&self, id: SymbolId) -> Option<&SymbolRecord>
    {
        self.symbols.iter().find(|symbol| symbol.id == id)
    }

    /// Fields owned by `owner`, ordered by byte offset then id.
    pub fn fields_of(&self, owner: SymbolId) -> Vec<&FieldRecord>
    {
        let mut fields: Vec<_> = self.fields.iter().filter(|field| field.owner == owner).collect();
        fields.sort_by_key(|field| (field.byte_offset, field.id));
        fields
    }

    /// Dimension entries of one list, ordered by `dim_order`.
    pub fn dimensions_of(&self, list: DimensionListId) -> Vec<&DimensionRecord>
    {
        let mut dims: Vec<_> = self.dimensions.iter().filter(|dim| dim.list == list).collect();
        dims.sort_by_key(|dim| dim.dim_order);
        dims
    }

    pub fn enumerators_of(&self, symbol: SymbolId) -> Vec<&EnumeratorRecord>
    {
        self.enumerators.iter().filter(|e| e.symbol == symbol).collect()
    }
}
