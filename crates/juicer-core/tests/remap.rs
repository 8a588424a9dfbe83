//! Tests for symbol remapping

use juicer_core::dwarf::MemorySource;
use juicer_core::error::JuicerError;
use juicer_core::juicer::{Juicer, Status};
use juicer_core::remap::remap_symbols;
use juicer_core::store::{GraphStore, MemoryStore};
use juicer_core::types::MemberEntry;

fn parsed_store() -> MemoryStore
{
    let mut source = MemorySource::new("telemetry.o");
    let int = source.base("int", 4);
    let short = source.base("short", 2);
    source.base("int32_t", 4);
    source.structure(
        "Packet",
        12,
        vec![
            MemberEntry::new("length", 0, int),
            MemberEntry::new("kind", 4, short),
            MemberEntry::new("crc", 8, int),
        ],
    );

    let mut store = MemoryStore::new();
    let mut juicer = Juicer::new();
    juicer.set_store(&mut store);
    assert_eq!(juicer.parse_source(&source), Status::Ok);
    drop(juicer);
    store
}

#[test]
fn test_remap_rewrites_every_field_of_old_symbol()
{
    let mut store = parsed_store();
    let report = remap_symbols(&mut store, &[("int", "int32_t")]).unwrap();
    assert_eq!(report.entries.len(), 1);
    assert_eq!(report.fields_rewritten(), 2);

    let graph = store.snapshot().unwrap();
    let int32 = graph.symbol("int32_t").unwrap().id;
    assert_eq!(report.entries[0].target, int32);
    let packet = graph.symbol("Packet").unwrap();
    let types: Vec<_> = graph.fields_of(packet.id).iter().map(|field| field.type_symbol).collect();
    assert_eq!(types, [int32, graph.symbol("short").unwrap().id, int32]);
    // The old symbol itself stays in the graph.
    assert!(graph.symbol("int").is_some());
}

#[test]
fn test_remap_unknown_symbol_leaves_store_untouched()
{
    let mut store = parsed_store();
    let before = store.snapshot().unwrap();

    let err = remap_symbols(&mut store, &[("int", "int32_t"), ("short", "int16_t")]).unwrap_err();
    assert!(matches!(err, JuicerError::UnknownSymbol(name) if name == "int16_t"));
    assert_eq!(store.snapshot().unwrap(), before);
}

#[test]
fn test_remap_rejects_duplicates_and_self_maps()
{
    let mut store = parsed_store();
    assert!(matches!(
        remap_symbols(&mut store, &[("int", "int32_t"), ("int", "short")]),
        Err(JuicerError::InvalidRemap(_))
    ));
    assert!(matches!(
        remap_symbols(&mut store, &[("int", "int")]),
        Err(JuicerError::InvalidRemap(_))
    ));
}
