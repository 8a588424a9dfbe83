//! Tests for the SQLite graph store against real database files

use juicer_core::dwarf::MemorySource;
use juicer_core::juicer::{Juicer, Status};
use juicer_core::remap::remap_symbols;
use juicer_core::store::{GraphStore, SqliteStore};
use juicer_core::types::{MemberEntry, NewSymbol};

fn sensor_source() -> MemorySource
{
    let mut source = MemorySource::new("sensor.elf");
    let uint = source.base("unsigned int", 4);
    let readings = source.array(uint, &[2, 4]);
    source.structure(
        "SensorFrame",
        36,
        vec![
            MemberEntry::new("sequence", 0, uint),
            MemberEntry::new("readings", 4, readings),
        ],
    );
    source
}

#[test]
fn test_graph_survives_reopen()
{
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("layouts.sqlite");

    let written = {
        let mut store = SqliteStore::open(&path).unwrap();
        let mut juicer = Juicer::new();
        juicer.set_store(&mut store);
        assert_eq!(juicer.parse_source(&sensor_source()), Status::Ok);
        drop(juicer);
        store.snapshot().unwrap()
    };

    let reopened = SqliteStore::open(&path).unwrap();
    assert_eq!(reopened.snapshot().unwrap(), written);
    assert_eq!(written.origins[0].name, "sensor.elf");
    assert_eq!(written.dimensions.len(), 2);
}

#[test]
fn test_reparse_into_reopened_database_adds_nothing()
{
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("layouts.sqlite");

    let first = {
        let mut store = SqliteStore::open(&path).unwrap();
        let mut juicer = Juicer::new();
        juicer.set_store(&mut store);
        assert_eq!(juicer.parse_source(&sensor_source()), Status::Ok);
        drop(juicer);
        store.snapshot().unwrap()
    };

    let mut store = SqliteStore::open(&path).unwrap();
    let mut juicer = Juicer::new();
    juicer.set_store(&mut store);
    assert_eq!(juicer.parse_source(&sensor_source()), Status::Ok);
    assert_eq!(juicer.stats().symbols_created, 0);
    assert_eq!(juicer.stats().fields_created, 0);
    drop(juicer);

    assert_eq!(store.snapshot().unwrap(), first);
}

#[test]
fn test_dimension_list_ids_continue_after_reopen()
{
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("layouts.sqlite");

    let first = {
        let mut store = SqliteStore::open(&path).unwrap();
        let list = store.allocate_dimension_list_id().unwrap();
        store.insert_dimension(list, 0, 8).unwrap();
        list
    };

    let mut store = SqliteStore::open(&path).unwrap();
    let second = store.allocate_dimension_list_id().unwrap();
    assert!(second.raw() > first.raw());
}

#[test]
fn test_uncommitted_writes_are_committed_on_drop()
{
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("layouts.sqlite");

    {
        let mut store = SqliteStore::open(&path).unwrap();
        let origin = store.insert_origin("drop.o", false).unwrap().id();
        store
            .insert_symbol(&NewSymbol {
                origin,
                name: "char",
                byte_size: 1,
            })
            .unwrap();
    }

    let store = SqliteStore::open(&path).unwrap();
    let graph = store.snapshot().unwrap();
    assert!(!graph.origins[0].little_endian);
    assert_eq!(graph.symbol("char").unwrap().byte_size, 1);
}

#[test]
fn test_remap_persists()
{
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("layouts.sqlite");

    {
        let mut source = sensor_source();
        source.base("uint32_t", 4);
        let mut store = SqliteStore::open(&path).unwrap();
        let mut juicer = Juicer::new();
        juicer.set_store(&mut store);
        assert_eq!(juicer.parse_source(&source), Status::Ok);
        drop(juicer);

        let report = remap_symbols(&mut store, &[("unsigned int", "uint32_t")]).unwrap();
        assert_eq!(report.fields_rewritten(), 2);
    }

    let store = SqliteStore::open(&path).unwrap();
    let graph = store.snapshot().unwrap();
    let target = graph.symbol("uint32_t").unwrap().id;
    assert!(graph.fields.iter().all(|field| field.type_symbol == target));
}
