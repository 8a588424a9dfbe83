//! Type graph builder.
//!
//! Turns one debug entry into a symbol id, creating the symbol and everything
//! it needs (member fields, their types, dimension lists, enumerators) on the
//! way.
//!
//! ## Sections
//!
//! - **Cycles**: a compound's symbol is reserved before its members are
//!   visited, so a member that refers back to the compound (directly or
//!   through pointers and typedefs) finds the reservation instead of
//!   recursing.
//! - **Sizes**: a symbol's natural key needs its size up front. Sizes are
//!   computed from the debug entries alone, falling back to the member layout
//!   extent for compounds the compiler did not size.
//! - **Field shapes**: qualifiers are skipped, by-value arrays are flattened
//!   into one dimension list, and pointers are counted into `pointer_depth`.

use std::collections::HashMap;

use tracing::trace;

use super::merge::MergeResolver;
use crate::dwarf::DebugSource;
use crate::error::{JuicerError, JuicerResult};
use crate::store::GraphStore;
use crate::types::{
    DimensionListId, EntryId, EntryKind, Enumerator, Extents, MemberEntry, NewField, NewSymbol, OriginId, SymbolId,
    TypeEntry,
};

/// Maximum number of type references followed from one entry.
pub const MAX_TYPE_REF_DEPTH: usize = 256;

/// Name of the symbol standing in for `void` and opaque types.
pub const VOID_SYMBOL: &str = "void";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reservation
{
    /// Symbol row exists, members are still being filled.
    InProgress(SymbolId),
    Complete(SymbolId),
}

impl Reservation
{
    fn symbol(self) -> SymbolId
    {
        match self {
            Reservation::InProgress(id) | Reservation::Complete(id) => id,
        }
    }
}

/// Entry to symbol bindings made during one parse pass.
#[derive(Debug, Default)]
pub(crate) struct Reservations
{
    entries: HashMap<EntryId, Reservation>,
}

impl Reservations
{
    pub(crate) fn clear(&mut self)
    {
        self.entries.clear();
    }

    fn get(&self, entry: EntryId) -> Option<SymbolId>
    {
        self.entries.get(&entry).map(|reservation| reservation.symbol())
    }

    fn reserve(&mut self, entry: EntryId, symbol: SymbolId)
    {
        self.entries.insert(entry, Reservation::InProgress(symbol));
    }

    fn complete(&mut self, entry: EntryId, symbol: SymbolId)
    {
        self.entries.insert(entry, Reservation::Complete(symbol));
    }

    /// Entries whose members were never filled.
    pub(crate) fn pending(&self) -> Vec<EntryId>
    {
        let mut pending: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, reservation)| matches!(reservation, Reservation::InProgress(_)))
            .map(|(entry, _)| *entry)
            .collect();
        pending.sort_unstable();
        pending
    }

    pub(crate) fn len(&self) -> usize
    {
        self.entries.len()
    }
}

/// How a member refers to its type.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FieldShape
{
    type_symbol: SymbolId,
    extents: Extents,
    pointer_depth: u32,
}

pub(crate) struct TypeGraphBuilder<'a>
{
    source: &'a dyn DebugSource,
    store: &'a mut dyn GraphStore,
    merge: &'a mut MergeResolver,
    reservations: &'a mut Reservations,
    origin: OriginId,
    little_endian: bool,
    void: Option<SymbolId>,
}

impl<'a> TypeGraphBuilder<'a>
{
    pub(crate) fn new(
        source: &'a dyn DebugSource,
        store: &'a mut dyn GraphStore,
        merge: &'a mut MergeResolver,
        reservations: &'a mut Reservations,
        origin: OriginId,
    ) -> Self
    {
        Self {
            source,
            store,
            merge,
            reservations,
            origin,
            little_endian: source.little_endian(),
            void: None,
        }
    }

    /// Whether a top-level entry is only resolved when something refers to
    /// it.
    ///
    /// Anonymous structs, unions and enums take their name from the typedef
    /// that aliases them, so resolving them on their own would create a
    /// nameless symbol first.
    pub(crate) fn is_deferred(&self, id: EntryId) -> JuicerResult<bool>
    {
        let entry = self.source.entry(id)?;
        Ok(matches!(entry.kind, EntryKind::Compound { .. } | EntryKind::Enumeration { .. }) && entry.is_anonymous())
    }

    /// Symbol representing `id`.
    pub(crate) fn resolve(&mut self, id: EntryId) -> JuicerResult<SymbolId>
    {
        self.resolve_at(id, None, 0)
    }

    fn resolve_at(&mut self, id: EntryId, name_override: Option<&str>, depth: usize) -> JuicerResult<SymbolId>
    {
        if depth > MAX_TYPE_REF_DEPTH {
            return Err(JuicerError::TypeDepthExceeded {
                entry: id,
                depth: MAX_TYPE_REF_DEPTH,
            });
        }
        if let Some(symbol) = self.reservations.get(id) {
            return Ok(symbol);
        }

        let source = self.source;
        let entry = source.entry(id)?;
        // A declaration comes back as its definition, which may be reserved.
        if entry.id != id {
            if let Some(symbol) = self.reservations.get(entry.id) {
                return Ok(symbol);
            }
        }
        trace!(entry = %id, name = entry.name_or_empty(), "visiting type entry");

        match &entry.kind {
            EntryKind::Base => {
                let name = if entry.is_anonymous() {
                    VOID_SYMBOL
                } else {
                    entry.name_or_empty()
                };
                let symbol = self.intern(name, entry.byte_size.unwrap_or(0))?;
                self.reservations.complete(id, symbol);
                Ok(symbol)
            }
            EntryKind::Compound { members, .. } => self.resolve_compound(entry, members, name_override, depth),
            EntryKind::Enumeration { enumerators } => self.resolve_enumeration(entry, enumerators, name_override),
            EntryKind::Array { element, .. } => {
                let symbol = self.resolve_at(*element, None, depth + 1)?;
                self.reservations.complete(id, symbol);
                Ok(symbol)
            }
            EntryKind::Pointer { target } => {
                let symbol = match target {
                    Some(target) => self.resolve_at(*target, None, depth + 1)?,
                    None => self.void()?,
                };
                self.reservations.complete(id, symbol);
                Ok(symbol)
            }
            EntryKind::Qualified { target } => match target {
                Some(target) => self.resolve_at(*target, name_override, depth + 1),
                None => self.void(),
            },
            EntryKind::Typedef { target } => self.resolve_typedef(entry, *target, depth),
        }
    }

    fn resolve_compound(
        &mut self,
        entry: &'a TypeEntry,
        members: &'a [MemberEntry],
        name_override: Option<&str>,
        depth: usize,
    ) -> JuicerResult<SymbolId>
    {
        let name = name_override.unwrap_or_else(|| entry.name_or_empty());
        let byte_size = self.size_of(entry.id, depth)?;
        let symbol = self.intern(name, byte_size)?;

        self.reservations.reserve(entry.id, symbol);
        self.fill_members(symbol, members, depth)?;
        self.reservations.complete(entry.id, symbol);
        Ok(symbol)
    }

    fn resolve_enumeration(
        &mut self,
        entry: &'a TypeEntry,
        enumerators: &'a [Enumerator],
        name_override: Option<&str>,
    ) -> JuicerResult<SymbolId>
    {
        let name = name_override.unwrap_or_else(|| entry.name_or_empty());
        let symbol = self.intern(name, entry.byte_size.unwrap_or(0))?;
        self.fill_enumerators(symbol, enumerators)?;
        self.reservations.complete(entry.id, symbol);
        Ok(symbol)
    }

    /// A typedef is a symbol of its own, sized like its target and carrying
    /// the target's fields or enumerators. A typedef of an anonymous struct,
    /// union or enum instead names that type, unless an earlier typedef
    /// already named it (`typedef struct { .. } A, B;`).
    fn resolve_typedef(&mut self, entry: &'a TypeEntry, target: Option<EntryId>, depth: usize) -> JuicerResult<SymbolId>
    {
        let name = entry.name_or_empty();
        let aliased = match target {
            Some(target) => self.strip_qualifiers(target, depth + 1)?,
            None => None,
        };

        if let Some(aliased) = aliased {
            if aliased.is_anonymous()
                && matches!(aliased.kind, EntryKind::Compound { .. } | EntryKind::Enumeration { .. })
                && self.reservations.get(aliased.id).is_none()
            {
                let symbol = self.resolve_at(aliased.id, Some(name), depth + 1)?;
                self.reservations.complete(entry.id, symbol);
                return Ok(symbol);
            }
        }

        let byte_size = self.size_of(entry.id, depth)?;
        let symbol = self.intern(name, byte_size)?;
        self.reservations.reserve(entry.id, symbol);

        if let Some(target) = target {
            self.resolve_at(target, None, depth + 1)?;
        }
        match aliased.map(|aliased| &aliased.kind) {
            Some(EntryKind::Compound { members, .. }) => self.fill_members(symbol, members, depth + 1)?,
            Some(EntryKind::Enumeration { enumerators }) => self.fill_enumerators(symbol, enumerators)?,
            _ => {}
        }

        self.reservations.complete(entry.id, symbol);
        Ok(symbol)
    }

    /// Follow qualifier wrappers to the entry they decorate. `None` means
    /// `void`.
    fn strip_qualifiers(&self, id: EntryId, depth: usize) -> JuicerResult<Option<&'a TypeEntry>>
    {
        let source = self.source;
        let mut current = Some(id);
        let mut hops = depth;
        while let Some(id) = current {
            if hops > MAX_TYPE_REF_DEPTH {
                return Err(JuicerError::TypeDepthExceeded {
                    entry: id,
                    depth: MAX_TYPE_REF_DEPTH,
                });
            }
            let entry = source.entry(id)?;
            match &entry.kind {
                EntryKind::Qualified { target } => current = *target,
                _ => return Ok(Some(entry)),
            }
            hops += 1;
        }
        Ok(None)
    }

    fn fill_members(&mut self, owner: SymbolId, members: &'a [MemberEntry], depth: usize) -> JuicerResult<()>
    {
        for (index, member) in members.iter().enumerate() {
            let name = match member.name.as_deref() {
                Some(name) if !name.is_empty() => name.to_string(),
                _ => format!("_anon_{index}"),
            };
            let shape = self.field_shape(member.type_ref, depth + 1)?;

            // The list id is only a counter; its rows are written once the
            // field is known to be new so a reused field leaves nothing behind.
            let dimension_list = if shape.extents.is_empty() {
                None
            } else {
                Some(self.store.allocate_dimension_list_id()?)
            };

            let (_, created) = self.merge.field(
                &mut *self.store,
                &NewField {
                    owner,
                    name: &name,
                    byte_offset: member.byte_offset,
                    type_symbol: shape.type_symbol,
                    dimension_list,
                    little_endian: self.little_endian,
                    bit_size: member.bit_size,
                    bit_offset: member.bit_offset,
                    pointer_depth: shape.pointer_depth,
                },
            )?;

            if let (true, Some(list)) = (created, dimension_list) {
                self.insert_dimensions(list, &shape.extents)?;
            }
        }
        Ok(())
    }

    fn fill_enumerators(&mut self, symbol: SymbolId, enumerators: &[Enumerator]) -> JuicerResult<()>
    {
        for enumerator in enumerators {
            self.merge
                .enumerator(&mut *self.store, symbol, &enumerator.name, enumerator.value)?;
        }
        Ok(())
    }

    fn insert_dimensions(&mut self, list: DimensionListId, extents: &[u64]) -> JuicerResult<()>
    {
        for (dim_order, extent) in (0u32..).zip(extents) {
            self.store.insert_dimension(list, dim_order, *extent)?;
        }
        Ok(())
    }

    /// Walk a member's type reference down to the symbol it records.
    fn field_shape(&mut self, type_ref: EntryId, depth: usize) -> JuicerResult<FieldShape>
    {
        let source = self.source;
        let mut extents = Extents::new();
        let mut pointer_depth = 0u32;
        let mut current = Some(type_ref);
        let mut hops = depth;

        while let Some(id) = current {
            if hops > MAX_TYPE_REF_DEPTH {
                return Err(JuicerError::TypeDepthExceeded {
                    entry: id,
                    depth: MAX_TYPE_REF_DEPTH,
                });
            }
            let entry = source.entry(id)?;
            match &entry.kind {
                EntryKind::Qualified { target } => current = *target,
                EntryKind::Array { element, extents: axes } if pointer_depth == 0 => {
                    extents.extend_from_slice(axes);
                    current = Some(*element);
                }
                EntryKind::Pointer { target } => {
                    pointer_depth += 1;
                    current = *target;
                }
                _ => {
                    return Ok(FieldShape {
                        type_symbol: self.resolve_at(id, None, hops)?,
                        extents,
                        pointer_depth,
                    });
                }
            }
            hops += 1;
        }

        Ok(FieldShape {
            type_symbol: self.void()?,
            extents,
            pointer_depth,
        })
    }

    /// Size of the type an entry describes, in bytes.
    fn size_of(&self, id: EntryId, depth: usize) -> JuicerResult<u64>
    {
        if depth > MAX_TYPE_REF_DEPTH {
            return Err(JuicerError::TypeDepthExceeded {
                entry: id,
                depth: MAX_TYPE_REF_DEPTH,
            });
        }

        let entry = self.source.entry(id)?;
        if let Some(byte_size) = entry.byte_size {
            return Ok(byte_size);
        }

        match &entry.kind {
            EntryKind::Base | EntryKind::Enumeration { .. } | EntryKind::Pointer { .. } => Ok(0),
            EntryKind::Compound { members, .. } => {
                let mut extent = 0u64;
                for member in members {
                    let end = match member.bit_size {
                        Some(bits) => member
                            .byte_offset
                            .saturating_mul(8)
                            .saturating_add(member.bit_offset.unwrap_or(0))
                            .saturating_add(bits)
                            .div_ceil(8),
                        None => member.byte_offset.saturating_add(self.size_of(member.type_ref, depth + 1)?),
                    };
                    extent = extent.max(end);
                }
                Ok(extent)
            }
            EntryKind::Array { element, extents } => {
                let count = extents.iter().fold(1u64, |acc, extent| acc.saturating_mul(*extent));
                Ok(self.size_of(*element, depth + 1)?.saturating_mul(count))
            }
            EntryKind::Typedef { target } | EntryKind::Qualified { target } => match target {
                Some(target) => self.size_of(*target, depth + 1),
                None => Ok(0),
            },
        }
    }

    fn void(&mut self) -> JuicerResult<SymbolId>
    {
        if let Some(symbol) = self.void {
            return Ok(symbol);
        }
        let symbol = self.intern(VOID_SYMBOL, 0)?;
        self.void = Some(symbol);
        Ok(symbol)
    }

    fn intern(&mut self, name: &str, byte_size: u64) -> JuicerResult<SymbolId>
    {
        let (symbol, _) = self.merge.symbol(
            &mut *self.store,
            &NewSymbol {
                origin: self.origin,
                name,
                byte_size,
            },
        )?;
        Ok(symbol)
    }
}
