//! In-memory graph store.

use std::collections::HashMap;

use super::{GraphStore, Inserted};
use crate::error::JuicerResult;
use crate::types::{
    DimensionId, DimensionListId, DimensionRecord, EnumeratorId, EnumeratorRecord, FieldId, FieldRecord,
    GraphSnapshot, NewField, NewSymbol, OriginId, OriginRecord, SymbolId, SymbolRecord,
};

/// Arena-backed [`GraphStore`].
///
/// Rows live in insertion-ordered vectors; row ids are 1-based positions, the
/// same numbering SQLite hands out for a fresh database. Natural keys are
/// indexed in hash maps.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore
{
    graph: GraphSnapshot,
    origin_keys: HashMap<String, OriginId>,
    symbol_keys: HashMap<(String, u64), SymbolId>,
    field_keys: HashMap<(SymbolId, String), FieldId>,
    enumerator_keys: HashMap<(SymbolId, String), EnumeratorId>,
    dimension_keys: HashMap<(DimensionListId, u32), DimensionId>,
    last_list_id: i64,
}

fn next_row_id(len: usize) -> i64
{
    i64::try_from(len).map_or(i64::MAX, |len| len + 1)
}

impl MemoryStore
{
    pub fn new() -> Self
    {
        Self::default()
    }
}

impl GraphStore for MemoryStore
{
    fn insert_origin(&mut self, name: &str, little_endian: bool) -> JuicerResult<Inserted<OriginId>>
    {
        if let Some(id) = self.origin_keys.get(name) {
            return Ok(Inserted::Existing(*id));
        }
        let id = OriginId::from_raw(next_row_id(self.graph.origins.len()));
        self.graph.origins.push(OriginRecord {
            id,
            name: name.to_string(),
            little_endian,
        });
        self.origin_keys.insert(name.to_string(), id);
        Ok(Inserted::Created(id))
    }

    fn insert_symbol(&mut self, symbol: &NewSymbol<'_>) -> JuicerResult<Inserted<SymbolId>>
    {
        let key = (symbol.name.to_string(), symbol.byte_size);
        if let Some(id) = self.symbol_keys.get(&key) {
            return Ok(Inserted::Existing(*id));
        }
        let id = SymbolId::from_raw(next_row_id(self.graph.symbols.len()));
        self.graph.symbols.push(SymbolRecord {
            id,
            origin: symbol.origin,
            name: symbol.name.to_string(),
            byte_size: symbol.byte_size,
        });
        self.symbol_keys.insert(key, id);
        Ok(Inserted::Created(id))
    }

    fn insert_field(&mut self, field: &NewField<'_>) -> JuicerResult<Inserted<FieldId>>
    {
        let key = (field.owner, field.name.to_string());
        if let Some(id) = self.field_keys.get(&key) {
            return Ok(Inserted::Existing(*id));
        }
        let id = FieldId::from_raw(next_row_id(self.graph.fields.len()));
        self.graph.fields.push(FieldRecord {
            id,
            owner: field.owner,
            name: field.name.to_string(),
            byte_offset: field.byte_offset,
            type_symbol: field.type_symbol,
            dimension_list: field.dimension_list,
            little_endian: field.little_endian,
            bit_size: field.bit_size,
            bit_offset: field.bit_offset,
            pointer_depth: field.pointer_depth,
        });
        self.field_keys.insert(key, id);
        Ok(Inserted::Created(id))
    }

    fn insert_dimension(&mut self, list: DimensionListId, dim_order: u32, extent: u64) -> JuicerResult<DimensionId>
    {
        if let Some(id) = self.dimension_keys.get(&(list, dim_order)) {
            return Ok(*id);
        }
        let id = DimensionId::from_raw(next_row_id(self.graph.dimensions.len()));
        self.graph.dimensions.push(DimensionRecord {
            id,
            list,
            dim_order,
            extent,
        });
        self.dimension_keys.insert((list, dim_order), id);
        self.last_list_id = self.last_list_id.max(list.raw());
        Ok(id)
    }

    fn insert_enumerator(&mut self, symbol: SymbolId, name: &str, value: i64) -> JuicerResult<Inserted<EnumeratorId>>
    {
        let key = (symbol, name.to_string());
        if let Some(id) = self.enumerator_keys.get(&key) {
            return Ok(Inserted::Existing(*id));
        }
        let id = EnumeratorId::from_raw(next_row_id(self.graph.enumerators.len()));
        self.graph.enumerators.push(EnumeratorRecord {
            id,
            symbol,
            name: name.to_string(),
            value,
        });
        self.enumerator_keys.insert(key, id);
        Ok(Inserted::Created(id))
    }

    fn allocate_dimension_list_id(&mut self) -> JuicerResult<DimensionListId>
    {
        self.last_list_id += 1;
        Ok(DimensionListId::from_raw(self.last_list_id))
    }

    fn find_origin(&self, name: &str) -> JuicerResult<Option<OriginId>>
    {
        Ok(self.origin_keys.get(name).copied())
    }

    fn find_symbol(&self, name: &str, byte_size: u64) -> JuicerResult<Option<SymbolId>>
    {
        Ok(self.symbol_keys.get(&(name.to_string(), byte_size)).copied())
    }

    fn find_field(&self, owner: SymbolId, name: &str) -> JuicerResult<Option<FieldId>>
    {
        Ok(self.field_keys.get(&(owner, name.to_string())).copied())
    }

    fn symbol_by_id(&self, id: SymbolId) -> JuicerResult<Option<SymbolRecord>>
    {
        Ok(self.graph.symbol_by_id(id).cloned())
    }

    fn field_by_id(&self, id: FieldId) -> JuicerResult<Option<FieldRecord>>
    {
        Ok(self.graph.fields.iter().find(|field| field.id == id).cloned())
    }

    fn symbols_named(&self, name: &str) -> JuicerResult<Vec<SymbolRecord>>
    {
        Ok(self.graph.symbols_named(name).cloned().collect())
    }

    fn retarget_fields(&mut self, from: SymbolId, to: SymbolId) -> JuicerResult<usize>
    {
        let mut rewritten = 0;
        for field in self.graph.fields.iter_mut().filter(|field| field.type_symbol == from) {
            field.type_symbol = to;
            rewritten += 1;
        }
        Ok(rewritten)
    }

    fn set_field_type(&mut self, field: FieldId, type_symbol: SymbolId) -> JuicerResult<bool>
    {
        let Some(record) = self.graph.fields.iter_mut().find(|record| record.id == field) else {
            return Ok(false);
        };
        record.type_symbol = type_symbol;
        Ok(true)
    }

    fn snapshot(&self) -> JuicerResult<GraphSnapshot>
    {
        Ok(self.graph.clone())
    }

    fn commit(&mut self) -> JuicerResult<()>
    {
        Ok(())
    }
}
