//! Natural-key lookup and reuse in front of the graph store.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::error::{JuicerError, JuicerResult};
use crate::store::{GraphStore, Inserted};
use crate::types::{FieldId, NewField, NewSymbol, OriginId, SymbolId};

/// Counters for one parse pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeStats
{
    pub symbols_created: usize,
    pub symbols_reused: usize,
    pub fields_created: usize,
    pub fields_reused: usize,
    pub enumerators_created: usize,
    /// Inserts that collided with a row the lookup did not see.
    pub conflicts_recovered: usize,
}

/// Decides, for every symbol and field the builder produces, whether to reuse
/// an existing row or insert a new one.
///
/// Lookups go to an in-memory index first and to the store on a miss; the
/// index is dropped at the start of every parse pass so that the store stays
/// the only state shared between passes. A uniqueness collision reported by
/// the store is never an error here: the row that won is looked up and
/// reused.
#[derive(Debug, Default)]
pub struct MergeResolver
{
    symbols: HashMap<(String, u64), SymbolId>,
    fields: HashMap<(SymbolId, String), FieldId>,
    stats: MergeStats,
}

impl MergeResolver
{
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Forget the index and counters of the previous pass.
    pub fn reset(&mut self)
    {
        self.symbols.clear();
        self.fields.clear();
        self.stats = MergeStats::default();
    }

    pub fn stats(&self) -> MergeStats
    {
        self.stats
    }

    pub fn find_symbol(&mut self, store: &dyn GraphStore, name: &str, byte_size: u64) -> JuicerResult<Option<SymbolId>>
    {
        if let Some(id) = self.symbols.get(&(name.to_string(), byte_size)) {
            return Ok(Some(*id));
        }
        let found = store.find_symbol(name, byte_size)?;
        if let Some(id) = found {
            self.symbols.insert((name.to_string(), byte_size), id);
        }
        Ok(found)
    }

    pub fn find_field(&mut self, store: &dyn GraphStore, owner: SymbolId, name: &str) -> JuicerResult<Option<FieldId>>
    {
        if let Some(id) = self.fields.get(&(owner, name.to_string())) {
            return Ok(Some(*id));
        }
        let found = store.find_field(owner, name)?;
        if let Some(id) = found {
            self.fields.insert((owner, name.to_string()), id);
        }
        Ok(found)
    }

    /// Existing origin with the same name, or a new one.
    ///
    /// Reparsing a binary finds its origin by name; that is reuse, not a
    /// collision.
    pub fn origin(&mut self, store: &mut dyn GraphStore, name: &str, little_endian: bool) -> JuicerResult<OriginId>
    {
        if let Some(id) = store.find_origin(name)? {
            debug!(origin = %id, name, "reusing origin");
            return Ok(id);
        }

        let outcome = store.insert_origin(name, little_endian);
        let inserted = self.recover(outcome, "origin", name, |store| store.find_origin(name), store)?;
        Ok(inserted.id())
    }

    /// Existing symbol with the same `(name, byte_size)`, or a new one.
    ///
    /// Returns the id and whether this call created it.
    pub fn symbol(&mut self, store: &mut dyn GraphStore, symbol: &NewSymbol<'_>) -> JuicerResult<(SymbolId, bool)>
    {
        if let Some(id) = self.find_symbol(store, symbol.name, symbol.byte_size)? {
            self.stats.symbols_reused += 1;
            debug!(symbol = %id, name = symbol.name, byte_size = symbol.byte_size, "reusing symbol");
            return Ok((id, false));
        }

        let key = format!("({}, {})", symbol.name, symbol.byte_size);
        let outcome = store.insert_symbol(symbol);
        let inserted = self.recover(outcome, "symbol", &key, |store| {
            store.find_symbol(symbol.name, symbol.byte_size)
        }, store)?;

        let id = inserted.id();
        self.symbols.insert((symbol.name.to_string(), symbol.byte_size), id);
        if inserted.was_created() {
            self.stats.symbols_created += 1;
            debug!(symbol = %id, name = symbol.name, byte_size = symbol.byte_size, "created symbol");
        } else {
            self.stats.symbols_reused += 1;
        }
        Ok((id, inserted.was_created()))
    }

    /// Existing field with the same `(owner, name)`, or a new one.
    pub fn field(&mut self, store: &mut dyn GraphStore, field: &NewField<'_>) -> JuicerResult<(FieldId, bool)>
    {
        if let Some(id) = self.find_field(store, field.owner, field.name)? {
            self.stats.fields_reused += 1;
            return Ok((id, false));
        }

        let key = format!("({}, {})", field.owner, field.name);
        let outcome = store.insert_field(field);
        let inserted = self.recover(outcome, "field", &key, |store| store.find_field(field.owner, field.name), store)?;

        let id = inserted.id();
        self.fields.insert((field.owner, field.name.to_string()), id);
        if inserted.was_created() {
            self.stats.fields_created += 1;
            debug!(field = %id, owner = %field.owner, name = field.name, offset = field.byte_offset, "created field");
        } else {
            self.stats.fields_reused += 1;
        }
        Ok((id, inserted.was_created()))
    }

    /// Record one enumeration constant, tolerating an existing row.
    pub fn enumerator(&mut self, store: &mut dyn GraphStore, symbol: SymbolId, name: &str, value: i64) -> JuicerResult<()>
    {
        match store.insert_enumerator(symbol, name, value) {
            Ok(Inserted::Created(_)) => self.stats.enumerators_created += 1,
            Ok(Inserted::Existing(_)) => {}
            Err(JuicerError::StoreConflict { entity, key }) => {
                warn!(entity, key = %key, "enumerator already recorded");
                self.stats.conflicts_recovered += 1;
            }
            Err(err) => return Err(err),
        }
        Ok(())
    }

    /// Turn a collision into reuse of the row that is already stored.
    fn recover<T: Copy + std::fmt::Display>(
        &mut self,
        outcome: JuicerResult<Inserted<T>>,
        entity: &'static str,
        key: &str,
        requery: impl FnOnce(&dyn GraphStore) -> JuicerResult<Option<T>>,
        store: &dyn GraphStore,
    ) -> JuicerResult<Inserted<T>>
    {
        match outcome {
            Ok(Inserted::Created(id)) => Ok(Inserted::Created(id)),
            Ok(Inserted::Existing(id)) => {
                self.stats.conflicts_recovered += 1;
                warn!(entity, key, existing = %id, "insert collided with an existing row; reusing it");
                Ok(Inserted::Existing(id))
            }
            Err(JuicerError::StoreConflict { .. }) => match requery(store)? {
                Some(id) => {
                    self.stats.conflicts_recovered += 1;
                    warn!(entity, key, existing = %id, "store reported a conflict; reusing the existing row");
                    Ok(Inserted::Existing(id))
                }
                None => Err(JuicerError::Store(format!(
                    "{entity} {key} conflicted but no existing row could be found"
                ))),
            },
            Err(err) => Err(err),
        }
    }
}
