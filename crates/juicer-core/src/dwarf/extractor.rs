//! DWARF type decoding.
//!
//! Walks every compile and type unit once and turns each type-describing DIE
//! into a [`TypeEntry`]. References between DIEs become [`EntryId`]s; nothing
//! here interprets the graph, that is the builder's job.

use std::collections::HashMap;

use gimli::{
    constants, Attribute, AttributeValue, DebugTypeSignature, DebuggingInformationEntry, Operation, Reader, Unit,
    UnitOffset, UnitSectionOffset, UnitType,
};
use tracing::warn;

use super::{OwnedDwarf, OwnedReader};
use crate::error::{map_dwarf_error, JuicerResult};
use crate::types::{CompoundKind, EntryId, EntryKind, Enumerator, Extents, MemberEntry, TypeEntry};

/// Unit index used for references that point outside every loaded unit.
///
/// Entries with this unit index never exist, so the builder reports them as
/// unresolved references.
const DANGLING_UNIT: usize = 0xffff_ffff;

/// Everything decoded from one binary.
pub(crate) struct DecodedTypes
{
    pub(crate) entries: HashMap<EntryId, TypeEntry>,
    pub(crate) top_level: Vec<EntryId>,
}

pub(crate) struct TypeExtractor<'a>
{
    dwarf: &'a OwnedDwarf,
    units: Vec<Unit<OwnedReader>>,
}

impl<'a> TypeExtractor<'a>
{
    pub(crate) fn new(dwarf: &'a OwnedDwarf) -> JuicerResult<Self>
    {
        let mut units = Vec::new();
        let mut headers = dwarf.units();
        while let Some(header) = headers
            .next()
            .map_err(|err| map_dwarf_error("reading .debug_info unit header", err))?
        {
            units.push(
                dwarf
                    .unit(header)
                    .map_err(|err| map_dwarf_error("parsing compilation unit", err))?,
            );
        }

        let mut type_headers = dwarf.type_units();
        while let Some(header) = type_headers
            .next()
            .map_err(|err| map_dwarf_error("reading .debug_types unit header", err))?
        {
            units.push(dwarf.unit(header).map_err(|err| map_dwarf_error("parsing type unit", err))?);
        }

        Ok(Self { dwarf, units })
    }

    pub(crate) fn unit_count(&self) -> usize
    {
        self.units.len()
    }

    pub(crate) fn decode(&self) -> JuicerResult<DecodedTypes>
    {
        let mut decoded = DecodedTypes {
            entries: HashMap::new(),
            top_level: Vec::new(),
        };

        for (index, unit) in self.units.iter().enumerate() {
            self.decode_unit(index, unit, &mut decoded)?;
        }

        Ok(decoded)
    }

    fn decode_unit(&self, index: usize, unit: &Unit<OwnedReader>, decoded: &mut DecodedTypes) -> JuicerResult<()>
    {
        let mut depth: isize = 0;
        let mut cursor = unit.entries();
        while let Some((delta, entry)) = cursor.next_dfs().map_err(|err| map_dwarf_error("traversing DIE tree", err))? {
            depth += delta;
            let Some(kind) = self.decode_kind(index, unit, entry)? else {
                continue;
            };

            let id = EntryId::from_unit(index, entry.offset().0);
            let byte_size = match (&kind, self.byte_size(entry)?) {
                (EntryKind::Pointer { .. }, None) => Some(u64::from(unit.header.address_size())),
                (_, size) => size,
            };
            let name = match (&kind, self.entry_name(unit, entry)?) {
                (EntryKind::Base, None) => Some("void".to_string()),
                (_, name) => name,
            };

            decoded.entries.insert(
                id,
                TypeEntry {
                    id,
                    name,
                    byte_size,
                    kind,
                },
            );
            if depth == 1 {
                decoded.top_level.push(id);
            }
        }
        Ok(())
    }

    fn decode_kind(
        &self,
        index: usize,
        unit: &Unit<OwnedReader>,
        entry: &DebuggingInformationEntry<'_, '_, OwnedReader>,
    ) -> JuicerResult<Option<EntryKind>>
    {
        let kind = match entry.tag() {
            constants::DW_TAG_base_type | constants::DW_TAG_unspecified_type | constants::DW_TAG_subroutine_type => {
                EntryKind::Base
            }
            constants::DW_TAG_structure_type | constants::DW_TAG_class_type => EntryKind::Compound {
                kind: CompoundKind::Struct,
                members: self.collect_members(index, unit, entry.offset())?,
                declaration: self.is_declaration(entry)?,
            },
            constants::DW_TAG_union_type => EntryKind::Compound {
                kind: CompoundKind::Union,
                members: self.collect_members(index, unit, entry.offset())?,
                declaration: self.is_declaration(entry)?,
            },
            constants::DW_TAG_enumeration_type => EntryKind::Enumeration {
                enumerators: self.collect_enumerators(unit, entry.offset())?,
            },
            constants::DW_TAG_array_type => EntryKind::Array {
                element: self
                    .type_ref(index, unit, entry)?
                    .unwrap_or_else(|| EntryId::from_unit(DANGLING_UNIT, entry.offset().0)),
                extents: self.collect_extents(unit, entry.offset())?,
            },
            constants::DW_TAG_pointer_type
            | constants::DW_TAG_reference_type
            | constants::DW_TAG_rvalue_reference_type => EntryKind::Pointer {
                target: self.type_ref(index, unit, entry)?,
            },
            constants::DW_TAG_typedef => EntryKind::Typedef {
                target: self.type_ref(index, unit, entry)?,
            },
            constants::DW_TAG_const_type
            | constants::DW_TAG_volatile_type
            | constants::DW_TAG_restrict_type
            | constants::DW_TAG_atomic_type => EntryKind::Qualified {
                target: self.type_ref(index, unit, entry)?,
            },
            _ => return Ok(None),
        };
        Ok(Some(kind))
    }

    fn collect_members(
        &self,
        index: usize,
        unit: &Unit<OwnedReader>,
        offset: UnitOffset<usize>,
    ) -> JuicerResult<Vec<MemberEntry>>
    {
        let mut members = Vec::new();
        let mut tree = unit
            .entries_tree(Some(offset))
            .map_err(|err| map_dwarf_error("building compound tree", err))?;
        let root = tree.root().map_err(|err| map_dwarf_error("navigating compound root", err))?;
        let mut children = root.children();
        while let Some(child) = children
            .next()
            .map_err(|err| map_dwarf_error("iterating compound children", err))?
        {
            let child_entry = child.entry().clone();
            if child_entry.tag() != constants::DW_TAG_member {
                continue;
            }
            if self.is_static_member(&child_entry)? {
                continue;
            }
            let Some(type_ref) = self.type_ref(index, unit, &child_entry)? else {
                warn!(member = %EntryId::from_unit(index, child_entry.offset().0), "skipping member without a type");
                continue;
            };
            members.push(self.build_member(unit, &child_entry, type_ref)?);
        }
        Ok(members)
    }

    fn build_member(
        &self,
        unit: &Unit<OwnedReader>,
        entry: &DebuggingInformationEntry<'_, '_, OwnedReader>,
        type_ref: EntryId,
    ) -> JuicerResult<MemberEntry>
    {
        let name = self.entry_name(unit, entry)?;
        let location = self.member_location(unit, entry)?;
        let bit_size = self.udata_attr(entry, constants::DW_AT_bit_size, "reading DW_AT_bit_size")?;
        let data_bit_offset = self.udata_attr(entry, constants::DW_AT_data_bit_offset, "reading DW_AT_data_bit_offset")?;

        let (byte_offset, bit_offset) = match (location, data_bit_offset) {
            // DWARF 4+ bit-fields: the bit offset is relative to the start of the
            // containing entity.
            (Some(bytes), Some(bits)) => (bytes, Some(bits.saturating_sub(bytes.saturating_mul(8)))),
            (None, Some(bits)) => (bits / 8, Some(bits % 8)),
            // DWARF 2/3 bit-fields carry DW_AT_bit_offset from the storage unit's
            // most significant bit.
            (bytes, None) => (
                bytes.unwrap_or(0),
                self.udata_attr(entry, constants::DW_AT_bit_offset, "reading DW_AT_bit_offset")?,
            ),
        };

        Ok(MemberEntry {
            name,
            byte_offset,
            type_ref,
            bit_size,
            bit_offset: bit_size.and(bit_offset),
        })
    }

    /// Byte offset from `DW_AT_data_member_location`, either a constant or a
    /// location expression such as `DW_OP_plus_uconst n`.
    fn member_location(
        &self,
        unit: &Unit<OwnedReader>,
        entry: &DebuggingInformationEntry<'_, '_, OwnedReader>,
    ) -> JuicerResult<Option<u64>>
    {
        let Some(attr) = entry
            .attr(constants::DW_AT_data_member_location)
            .map_err(|err| map_dwarf_error("reading DW_AT_data_member_location", err))?
        else {
            return Ok(None);
        };

        if let Some(bytes) = attr.udata_value() {
            return Ok(Some(bytes));
        }

        let Some(expression) = attr.exprloc_value() else {
            return Ok(None);
        };
        let mut offset = 0u64;
        let mut operations = expression.operations(unit.encoding());
        while let Some(operation) = operations
            .next()
            .map_err(|err| map_dwarf_error("evaluating member location", err))?
        {
            match operation {
                Operation::PlusConstant { value } => offset = offset.wrapping_add(value),
                Operation::UnsignedConstant { value } => offset = value,
                _ => {}
            }
        }
        Ok(Some(offset))
    }

    fn collect_enumerators(&self, unit: &Unit<OwnedReader>, offset: UnitOffset<usize>) -> JuicerResult<Vec<Enumerator>>
    {
        let mut enumerators = Vec::new();
        let mut tree = unit
            .entries_tree(Some(offset))
            .map_err(|err| map_dwarf_error("building enumeration tree", err))?;
        let root = tree
            .root()
            .map_err(|err| map_dwarf_error("navigating enumeration root", err))?;
        let mut children = root.children();
        while let Some(child) = children.next().map_err(|err| map_dwarf_error("iterating enumerators", err))? {
            let entry = child.entry().clone();
            if entry.tag() != constants::DW_TAG_enumerator {
                continue;
            }

            let Some(name) = self.entry_name(unit, &entry)? else {
                continue;
            };
            let value = Self::attribute_to_i64(
                entry
                    .attr(constants::DW_AT_const_value)
                    .map_err(|err| map_dwarf_error("reading DW_AT_const_value", err))?,
            )
            .unwrap_or(0);
            enumerators.push(Enumerator { name, value });
        }
        Ok(enumerators)
    }

    /// One extent per `DW_TAG_subrange_type` child, outermost first.
    fn collect_extents(&self, unit: &Unit<OwnedReader>, offset: UnitOffset<usize>) -> JuicerResult<Extents>
    {
        let mut extents = Extents::new();
        let mut tree = unit
            .entries_tree(Some(offset))
            .map_err(|err| map_dwarf_error("building array tree", err))?;
        let root = tree.root().map_err(|err| map_dwarf_error("navigating array root", err))?;
        let mut children = root.children();
        while let Some(child) = children.next().map_err(|err| map_dwarf_error("iterating subranges", err))? {
            let entry = child.entry().clone();
            if !matches!(entry.tag(), constants::DW_TAG_subrange_type | constants::DW_TAG_enumeration_type) {
                continue;
            }

            if let Some(count) = self.udata_attr(&entry, constants::DW_AT_count, "reading DW_AT_count")? {
                extents.push(count);
                continue;
            }

            let lower = self
                .udata_attr(&entry, constants::DW_AT_lower_bound, "reading DW_AT_lower_bound")?
                .unwrap_or(0);
            let extent = self
                .udata_attr(&entry, constants::DW_AT_upper_bound, "reading DW_AT_upper_bound")?
                .and_then(|upper| upper.checked_sub(lower))
                .and_then(|span| span.checked_add(1))
                .unwrap_or(0);
            extents.push(extent);
        }
        Ok(extents)
    }

    fn byte_size(&self, entry: &DebuggingInformationEntry<'_, '_, OwnedReader>) -> JuicerResult<Option<u64>>
    {
        self.udata_attr(entry, constants::DW_AT_byte_size, "reading DW_AT_byte_size")
    }

    fn is_declaration(&self, entry: &DebuggingInformationEntry<'_, '_, OwnedReader>) -> JuicerResult<bool>
    {
        let attr = entry
            .attr_value(constants::DW_AT_declaration)
            .map_err(|err| map_dwarf_error("reading DW_AT_declaration", err))?;
        Ok(matches!(attr, Some(AttributeValue::Flag(true))))
    }

    /// C++ static data members are declared as `DW_TAG_member` with
    /// `DW_AT_external` in DWARF 2-4; they occupy no storage in the object.
    fn is_static_member(&self, entry: &DebuggingInformationEntry<'_, '_, OwnedReader>) -> JuicerResult<bool>
    {
        let external = entry
            .attr_value(constants::DW_AT_external)
            .map_err(|err| map_dwarf_error("reading DW_AT_external", err))?;
        Ok(matches!(external, Some(AttributeValue::Flag(true))) && self.is_declaration(entry)?)
    }

    fn udata_attr(
        &self,
        entry: &DebuggingInformationEntry<'_, '_, OwnedReader>,
        name: constants::DwAt,
        context: &str,
    ) -> JuicerResult<Option<u64>>
    {
        let attr = entry.attr(name).map_err(|err| map_dwarf_error(context, err))?;
        Ok(attr.and_then(|attribute| {
            attribute
                .udata_value()
                .or_else(|| attribute.sdata_value().and_then(|value| u64::try_from(value).ok()))
        }))
    }

    fn attribute_to_i64(attr: Option<Attribute<OwnedReader>>) -> Option<i64>
    {
        attr.and_then(|attribute| {
            attribute
                .sdata_value()
                .or_else(|| attribute.udata_value().and_then(|value| i64::try_from(value).ok()))
        })
    }

    fn entry_name(
        &self,
        unit: &Unit<OwnedReader>,
        entry: &DebuggingInformationEntry<'_, '_, OwnedReader>,
    ) -> JuicerResult<Option<String>>
    {
        if let Some(attr) = entry
            .attr(constants::DW_AT_name)
            .map_err(|err| map_dwarf_error("reading DW_AT_name", err))?
        {
            return Ok(Some(self.attr_to_string(unit, attr.value())?));
        }
        Ok(None)
    }

    fn attr_to_string(&self, unit: &Unit<OwnedReader>, value: AttributeValue<OwnedReader>) -> JuicerResult<String>
    {
        let reader = self
            .dwarf
            .attr_string(unit, value)
            .map_err(|err| map_dwarf_error("resolving DWARF string", err))?;
        let owned = match reader.to_string() {
            Ok(cow) => cow.into_owned(),
            Err(_) => reader
                .to_string_lossy()
                .map_err(|err| map_dwarf_error("decoding DWARF string", err))?
                .into_owned(),
        };
        Ok(owned)
    }

    /// Entry id referenced by `DW_AT_type`, if the attribute is present.
    fn type_ref(
        &self,
        index: usize,
        unit: &Unit<OwnedReader>,
        entry: &DebuggingInformationEntry<'_, '_, OwnedReader>,
    ) -> JuicerResult<Option<EntryId>>
    {
        let Some(attr) = entry
            .attr(constants::DW_AT_type)
            .map_err(|err| map_dwarf_error("reading DW_AT_type", err))?
        else {
            return Ok(None);
        };

        let id = match attr.value() {
            AttributeValue::UnitRef(offset) => EntryId::from_unit(index, offset.0),
            AttributeValue::DebugInfoRef(offset) => {
                let target = UnitSectionOffset::from(offset);
                self.find_unit_for_offset(target)
                    .map_or_else(|| EntryId::from_unit(DANGLING_UNIT, offset.0), |(unit_index, unit_offset)| {
                        EntryId::from_unit(unit_index, unit_offset.0)
                    })
            }
            AttributeValue::DebugTypesRef(signature) => self
                .find_type_unit(signature)
                .unwrap_or_else(|| EntryId::from_unit(DANGLING_UNIT, entry.offset().0)),
            _ => {
                warn!(entry = %EntryId::from_unit(index, entry.offset().0), unit = ?unit.header.offset(), "unsupported DW_AT_type form");
                EntryId::from_unit(DANGLING_UNIT, entry.offset().0)
            }
        };
        Ok(Some(id))
    }

    fn find_type_unit(&self, signature: DebugTypeSignature) -> Option<EntryId>
    {
        self.units.iter().enumerate().find_map(|(index, unit)| match unit.header.type_() {
            UnitType::Type {
                type_signature,
                type_offset,
            }
            | UnitType::SplitType {
                type_signature,
                type_offset,
            } if type_signature == signature => Some(EntryId::from_unit(index, type_offset.0)),
            _ => None,
        })
    }

    fn find_unit_for_offset(&self, target: UnitSectionOffset<usize>) -> Option<(usize, UnitOffset<usize>)>
    {
        self.units
            .iter()
            .enumerate()
            .find_map(|(index, unit)| target.to_unit_offset(unit).map(|offset| (index, offset)))
    }
}
