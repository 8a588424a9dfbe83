//! Tests for DWARF decoding, against DWARF synthesized with `gimli::write`

use std::collections::HashMap;

use gimli::write::{AttributeValue, DwarfUnit, EndianVec, Expression, Sections, UnitEntryId};
use gimli::{constants, Encoding, Format, LittleEndian, RunTimeEndian, SectionId};
use juicer_core::dwarf::{owned_reader, DebugSource, DwarfImage, OwnedDwarf};
use juicer_core::juicer::{Juicer, Status};
use juicer_core::store::{GraphStore, MemoryStore};
use juicer_core::types::{CompoundKind, EntryKind, TypeEntry};

fn encoding() -> Encoding
{
    Encoding {
        format: Format::Dwarf32,
        version: 4,
        address_size: 8,
    }
}

/// Write one compile unit and load it back for reading.
fn build_dwarf(build: impl FnOnce(&mut DwarfUnit)) -> OwnedDwarf
{
    let mut unit = DwarfUnit::new(encoding());
    build(&mut unit);

    let mut sections = Sections::new(EndianVec::new(LittleEndian));
    unit.write(&mut sections).unwrap();

    let mut bytes: HashMap<SectionId, Vec<u8>> = HashMap::new();
    sections
        .for_each(|id, data| {
            bytes.insert(id, data.slice().to_vec());
            Ok::<_, gimli::Error>(())
        })
        .unwrap();

    gimli::Dwarf::load(|id| {
        let data = bytes.get(&id).cloned().unwrap_or_default();
        Ok::<_, gimli::Error>(owned_reader(data, RunTimeEndian::Little))
    })
    .unwrap()
}

fn add(unit: &mut DwarfUnit, parent: UnitEntryId, tag: constants::DwTag, attrs: Vec<(constants::DwAt, AttributeValue)>)
-> UnitEntryId
{
    let id = unit.unit.add(parent, tag);
    let entry = unit.unit.get_mut(id);
    for (name, value) in attrs {
        entry.set(name, value);
    }
    id
}

fn name(value: &str) -> (constants::DwAt, AttributeValue)
{
    (constants::DW_AT_name, AttributeValue::String(value.as_bytes().to_vec()))
}

fn size(bytes: u64) -> (constants::DwAt, AttributeValue)
{
    (constants::DW_AT_byte_size, AttributeValue::Udata(bytes))
}

fn type_ref(target: UnitEntryId) -> (constants::DwAt, AttributeValue)
{
    (constants::DW_AT_type, AttributeValue::UnitRef(target))
}

fn location(offset: u64) -> (constants::DwAt, AttributeValue)
{
    (constants::DW_AT_data_member_location, AttributeValue::Udata(offset))
}

fn named<'a>(image: &'a DwarfImage, wanted: &str) -> &'a TypeEntry
{
    image
        .top_level()
        .iter()
        .map(|id| image.entry(*id).unwrap())
        .find(|entry| entry.name.as_deref() == Some(wanted))
        .unwrap()
}

fn circle_dwarf() -> OwnedDwarf
{
    build_dwarf(|unit| {
        let root = unit.unit.root();
        let float = add(unit, root, constants::DW_TAG_base_type, vec![name("float"), size(4)]);
        let int = add(unit, root, constants::DW_TAG_base_type, vec![name("int"), size(4)]);
        let points = add(unit, root, constants::DW_TAG_array_type, vec![type_ref(int)]);
        add(
            unit,
            points,
            constants::DW_TAG_subrange_type,
            vec![(constants::DW_AT_upper_bound, AttributeValue::Udata(2))],
        );

        let circle = add(unit, root, constants::DW_TAG_structure_type, vec![name("Circle"), size(20)]);
        add(
            unit,
            circle,
            constants::DW_TAG_member,
            vec![name("diameter"), type_ref(float), location(0)],
        );
        let mut radius_at = Expression::new();
        radius_at.op_plus_uconst(4);
        add(
            unit,
            circle,
            constants::DW_TAG_member,
            vec![
                name("radius"),
                type_ref(float),
                (constants::DW_AT_data_member_location, AttributeValue::Exprloc(radius_at)),
            ],
        );
        add(
            unit,
            circle,
            constants::DW_TAG_member,
            vec![name("points"), type_ref(points), location(8)],
        );
    })
}

#[test]
fn test_decodes_compound_members_and_offsets()
{
    let image = DwarfImage::from_dwarf("circle.o", true, &circle_dwarf()).unwrap();

    let circle = named(&image, "Circle");
    assert_eq!(circle.byte_size, Some(20));
    let EntryKind::Compound {
        kind,
        members,
        declaration,
    } = &circle.kind
    else {
        panic!("Circle should decode as a compound");
    };
    assert_eq!(*kind, CompoundKind::Struct);
    assert!(!declaration);

    let offsets: Vec<_> = members
        .iter()
        .map(|member| (member.name.as_deref().unwrap(), member.byte_offset))
        .collect();
    assert_eq!(offsets, [("diameter", 0), ("radius", 4), ("points", 8)]);

    let points = image.entry(members[2].type_ref).unwrap();
    let EntryKind::Array { element, extents } = &points.kind else {
        panic!("points should decode as an array");
    };
    assert_eq!(extents.as_slice(), &[3]);
    assert_eq!(image.entry(*element).unwrap().name.as_deref(), Some("int"));
}

#[test]
fn test_top_level_is_unit_children_only()
{
    let image = DwarfImage::from_dwarf("circle.o", true, &circle_dwarf()).unwrap();
    // float, int, int[3], Circle
    assert_eq!(image.top_level().len(), 4);
    assert_eq!(image.entry_count(), 4);
    assert_eq!(image.origin(), "circle.o");
    assert!(image.little_endian());
}

#[test]
fn test_parses_decoded_image_into_store()
{
    let image = DwarfImage::from_dwarf("circle.o", true, &circle_dwarf()).unwrap();
    let mut store = MemoryStore::new();
    let mut juicer = Juicer::new();
    juicer.set_store(&mut store);
    assert_eq!(juicer.parse_source(&image), Status::Ok);
    drop(juicer);

    let graph = store.snapshot().unwrap();
    let circle = graph.symbol("Circle").unwrap();
    let fields = graph.fields_of(circle.id);
    assert_eq!(fields.len(), 3);
    assert_eq!(fields[1].byte_offset, 4);
    let dims = graph.dimensions_of(fields[2].dimension_list.unwrap());
    assert_eq!(dims[0].extent, 3);
}

#[test]
fn test_forward_declaration_resolves_to_definition()
{
    let dwarf = build_dwarf(|unit| {
        let root = unit.unit.root();
        let int = add(unit, root, constants::DW_TAG_base_type, vec![name("int"), size(4)]);
        let declared = add(
            unit,
            root,
            constants::DW_TAG_structure_type,
            vec![name("Node"), (constants::DW_AT_declaration, AttributeValue::Flag(true))],
        );
        let pointer = add(unit, root, constants::DW_TAG_pointer_type, vec![type_ref(declared)]);
        let holder = add(unit, root, constants::DW_TAG_structure_type, vec![name("Holder"), size(8)]);
        add(
            unit,
            holder,
            constants::DW_TAG_member,
            vec![name("head"), type_ref(pointer), location(0)],
        );
        let node = add(unit, root, constants::DW_TAG_structure_type, vec![name("Node"), size(16)]);
        add(unit, node, constants::DW_TAG_member, vec![name("value"), type_ref(int), location(0)]);
        add(unit, node, constants::DW_TAG_member, vec![name("next"), type_ref(pointer), location(8)]);
    });
    let image = DwarfImage::from_dwarf("decl.o", true, &dwarf).unwrap();

    let pointer = image
        .top_level()
        .iter()
        .map(|id| image.entry(*id).unwrap())
        .find(|entry| matches!(entry.kind, EntryKind::Pointer { .. }))
        .unwrap();
    assert_eq!(pointer.byte_size, Some(8));
    let EntryKind::Pointer { target: Some(target) } = pointer.kind else {
        panic!("pointer should have a target");
    };
    let resolved = image.entry(target).unwrap();
    assert_eq!(resolved.byte_size, Some(16));
    assert!(matches!(
        resolved.kind,
        EntryKind::Compound {
            declaration: false,
            ..
        }
    ));

    let mut store = MemoryStore::new();
    let mut juicer = Juicer::new();
    juicer.set_store(&mut store);
    assert_eq!(juicer.parse_source(&image), Status::Ok);
    drop(juicer);

    let graph = store.snapshot().unwrap();
    let node = graph.symbol("Node").unwrap();
    assert_eq!(node.byte_size, 16);
    assert_eq!(graph.symbols_named("Node").count(), 1);
    let holder = graph.symbol("Holder").unwrap();
    assert_eq!(graph.fields_of(holder.id)[0].type_symbol, node.id);

    // Self reference through the declaration lands on the definition.
    let next = graph.fields_of(node.id)[1];
    assert_eq!(next.name, "next");
    assert_eq!(next.type_symbol, node.id);
    assert_eq!(next.pointer_depth, 1);
}

#[test]
fn test_bitfields_subranges_and_enumerators()
{
    let dwarf = build_dwarf(|unit| {
        let root = unit.unit.root();
        let uint = add(unit, root, constants::DW_TAG_base_type, vec![name("unsigned int"), size(4)]);
        let flags = add(unit, root, constants::DW_TAG_structure_type, vec![name("Flags"), size(4)]);
        add(
            unit,
            flags,
            constants::DW_TAG_member,
            vec![
                name("mode"),
                type_ref(uint),
                (constants::DW_AT_bit_size, AttributeValue::Udata(3)),
                (constants::DW_AT_data_bit_offset, AttributeValue::Udata(13)),
            ],
        );

        let bounded = add(unit, root, constants::DW_TAG_array_type, vec![type_ref(uint)]);
        add(
            unit,
            bounded,
            constants::DW_TAG_subrange_type,
            vec![
                (constants::DW_AT_lower_bound, AttributeValue::Udata(1)),
                (constants::DW_AT_upper_bound, AttributeValue::Udata(4)),
            ],
        );
        add(unit, bounded, constants::DW_TAG_subrange_type, vec![]);

        let color = add(unit, root, constants::DW_TAG_enumeration_type, vec![name("Color"), size(4)]);
        add(
            unit,
            color,
            constants::DW_TAG_enumerator,
            vec![name("RED"), (constants::DW_AT_const_value, AttributeValue::Sdata(0))],
        );
        add(
            unit,
            color,
            constants::DW_TAG_enumerator,
            vec![name("NONE"), (constants::DW_AT_const_value, AttributeValue::Sdata(-1))],
        );
    });
    let image = DwarfImage::from_dwarf("misc.o", true, &dwarf).unwrap();

    let EntryKind::Compound { members, .. } = &named(&image, "Flags").kind else {
        panic!("Flags should decode as a compound");
    };
    assert_eq!(members[0].byte_offset, 1);
    assert_eq!(members[0].bit_size, Some(3));
    assert_eq!(members[0].bit_offset, Some(5));

    let bounded = image
        .top_level()
        .iter()
        .map(|id| image.entry(*id).unwrap())
        .find(|entry| matches!(entry.kind, EntryKind::Array { .. }))
        .unwrap();
    let EntryKind::Array { extents, .. } = &bounded.kind else {
        unreachable!();
    };
    assert_eq!(extents.as_slice(), &[4, 0]);

    let EntryKind::Enumeration { enumerators } = &named(&image, "Color").kind else {
        panic!("Color should decode as an enumeration");
    };
    let values: Vec<_> = enumerators.iter().map(|e| (e.name.as_str(), e.value)).collect();
    assert_eq!(values, [("RED", 0), ("NONE", -1)]);
}

#[test]
fn test_bit_offset_with_extreme_member_location()
{
    let dwarf = build_dwarf(|unit| {
        let root = unit.unit.root();
        let uint = add(unit, root, constants::DW_TAG_base_type, vec![name("unsigned int"), size(4)]);
        let wide = add(unit, root, constants::DW_TAG_structure_type, vec![name("Wide"), size(4)]);
        add(
            unit,
            wide,
            constants::DW_TAG_member,
            vec![
                name("flag"),
                type_ref(uint),
                location(u64::MAX / 4),
                (constants::DW_AT_bit_size, AttributeValue::Udata(1)),
                (constants::DW_AT_data_bit_offset, AttributeValue::Udata(3)),
            ],
        );
    });
    let image = DwarfImage::from_dwarf("wide.o", true, &dwarf).unwrap();

    let EntryKind::Compound { members, .. } = &named(&image, "Wide").kind else {
        panic!("Wide should decode as a compound");
    };
    assert_eq!(members[0].byte_offset, u64::MAX / 4);
    assert_eq!(members[0].bit_offset, Some(0));
}

#[test]
fn test_void_pointer_and_qualifiers()
{
    let dwarf = build_dwarf(|unit| {
        let root = unit.unit.root();
        let int = add(unit, root, constants::DW_TAG_base_type, vec![name("int"), size(4)]);
        let constant = add(unit, root, constants::DW_TAG_const_type, vec![type_ref(int)]);
        let volatile = add(unit, root, constants::DW_TAG_volatile_type, vec![type_ref(constant)]);
        let opaque = add(unit, root, constants::DW_TAG_pointer_type, vec![]);
        let regs = add(unit, root, constants::DW_TAG_structure_type, vec![name("Regs"), size(16)]);
        add(unit, regs, constants::DW_TAG_member, vec![name("status"), type_ref(volatile), location(0)]);
        add(unit, regs, constants::DW_TAG_member, vec![name("user"), type_ref(opaque), location(8)]);
    });
    let image = DwarfImage::from_dwarf("regs.o", true, &dwarf).unwrap();

    let mut store = MemoryStore::new();
    let mut juicer = Juicer::new();
    juicer.set_store(&mut store);
    assert_eq!(juicer.parse_source(&image), Status::Ok);
    drop(juicer);

    let graph = store.snapshot().unwrap();
    let regs = graph.symbol("Regs").unwrap();
    let fields = graph.fields_of(regs.id);
    assert_eq!(fields[0].type_symbol, graph.symbol("int").unwrap().id);
    assert_eq!(fields[0].pointer_depth, 0);
    assert_eq!(fields[1].type_symbol, graph.symbol("void").unwrap().id);
    assert_eq!(fields[1].pointer_depth, 1);
}
