//! SQLite graph store.
//!
//! ## Schema
//!
//! ```text
//! elfs(id, name UNIQUE, little_endian)
//! symbols(id, elf -> elfs, name, byte_size, UNIQUE(name, byte_size))
//! fields(id, symbol -> symbols, name, byte_offset, type -> symbols,
//!        dimension_list, little_endian, bit_size, bit_offset, pointer_depth,
//!        UNIQUE(symbol, name))
//! dimension_lists(id, list_id, dim_order, extent, UNIQUE(list_id, dim_order))
//! enumerations(id, symbol -> symbols, name, value, UNIQUE(symbol, name))
//! ```

use std::path::Path;

use rusqlite::{ffi, params, Connection, OptionalExtension, Row};
use tracing::{debug, warn};

use super::{GraphStore, Inserted};
use crate::error::{JuicerError, JuicerResult};
use crate::types::{
    DimensionId, DimensionListId, DimensionRecord, EnumeratorId, EnumeratorRecord, FieldId, FieldRecord,
    GraphSnapshot, NewField, NewSymbol, OriginId, OriginRecord, SymbolId, SymbolRecord,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS elfs (
    id            INTEGER PRIMARY KEY,
    name          TEXT    NOT NULL UNIQUE,
    little_endian INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS symbols (
    id        INTEGER PRIMARY KEY,
    elf       INTEGER NOT NULL REFERENCES elfs(id),
    name      TEXT    NOT NULL,
    byte_size INTEGER NOT NULL,
    UNIQUE (name, byte_size)
);
CREATE TABLE IF NOT EXISTS fields (
    id             INTEGER PRIMARY KEY,
    symbol         INTEGER NOT NULL REFERENCES symbols(id),
    name           TEXT    NOT NULL,
    byte_offset    INTEGER NOT NULL,
    type           INTEGER NOT NULL REFERENCES symbols(id),
    dimension_list INTEGER,
    little_endian  INTEGER NOT NULL,
    bit_size       INTEGER,
    bit_offset     INTEGER,
    pointer_depth  INTEGER NOT NULL DEFAULT 0,
    UNIQUE (symbol, name)
);
CREATE TABLE IF NOT EXISTS dimension_lists (
    id        INTEGER PRIMARY KEY,
    list_id   INTEGER NOT NULL,
    dim_order INTEGER NOT NULL,
    extent    INTEGER NOT NULL,
    UNIQUE (list_id, dim_order)
);
CREATE TABLE IF NOT EXISTS enumerations (
    id     INTEGER PRIMARY KEY,
    symbol INTEGER NOT NULL REFERENCES symbols(id),
    name   TEXT    NOT NULL,
    value  INTEGER NOT NULL,
    UNIQUE (symbol, name)
);
CREATE INDEX IF NOT EXISTS fields_by_type ON fields(type);
";

/// [`GraphStore`] persisted in a SQLite database file.
///
/// Writes are grouped into one transaction that stays open until
/// [`GraphStore::commit`]. Dropping the store commits whatever is pending.
#[derive(Debug)]
pub struct SqliteStore
{
    conn: Connection,
    last_list_id: i64,
}

fn is_unique_violation(err: &rusqlite::Error) -> bool
{
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                || failure.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

fn to_sql_int(value: u64, column: &str) -> JuicerResult<i64>
{
    i64::try_from(value).map_err(|_| JuicerError::Store(format!("{column} value {value} does not fit in SQLite INTEGER")))
}

fn from_sql_int(value: i64) -> u64
{
    u64::try_from(value).unwrap_or(0)
}

const FIELD_COLUMNS: &str =
    "id, symbol, name, byte_offset, type, dimension_list, little_endian, bit_size, bit_offset, pointer_depth";

fn field_from_row(row: &Row<'_>) -> rusqlite::Result<FieldRecord>
{
    Ok(FieldRecord {
        id: FieldId::from_raw(row.get(0)?),
        owner: SymbolId::from_raw(row.get(1)?),
        name: row.get(2)?,
        byte_offset: from_sql_int(row.get(3)?),
        type_symbol: SymbolId::from_raw(row.get(4)?),
        dimension_list: row.get::<_, Option<i64>>(5)?.map(DimensionListId::from_raw),
        little_endian: row.get(6)?,
        bit_size: row.get::<_, Option<i64>>(7)?.map(from_sql_int),
        bit_offset: row.get::<_, Option<i64>>(8)?.map(from_sql_int),
        pointer_depth: row.get(9)?,
    })
}

fn symbol_from_row(row: &Row<'_>) -> rusqlite::Result<SymbolRecord>
{
    Ok(SymbolRecord {
        id: SymbolId::from_raw(row.get(0)?),
        origin: OriginId::from_raw(row.get(1)?),
        name: row.get(2)?,
        byte_size: from_sql_int(row.get(3)?),
    })
}

impl SqliteStore
{
    /// Open (creating if needed) a database file and make sure the schema
    /// exists.
    pub fn open(path: impl AsRef<Path>) -> JuicerResult<Self>
    {
        let conn = Connection::open(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "opened SQLite graph store");
        Self::with_connection(conn)
    }

    /// Store backed by a private in-memory database.
    pub fn open_in_memory() -> JuicerResult<Self>
    {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> JuicerResult<Self>
    {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute_batch(SCHEMA)?;
        let last_list_id = conn.query_row("SELECT COALESCE(MAX(list_id), 0) FROM dimension_lists", [], |row| {
            row.get(0)
        })?;
        Ok(Self { conn, last_list_id })
    }

    fn begin(&mut self) -> JuicerResult<()>
    {
        if self.conn.is_autocommit() {
            self.conn.execute_batch("BEGIN IMMEDIATE")?;
        }
        Ok(())
    }

    /// Run an insert; on a uniqueness violation, look the row up by its
    /// natural key instead.
    fn insert_or_get<T>(
        &mut self,
        entity: &'static str,
        key: impl FnOnce() -> String,
        insert: impl FnOnce(&Connection) -> rusqlite::Result<usize>,
        lookup: impl FnOnce(&Self) -> JuicerResult<Option<T>>,
        wrap: impl FnOnce(i64) -> T,
    ) -> JuicerResult<Inserted<T>>
    {
        self.begin()?;
        match insert(&self.conn) {
            Ok(_) => Ok(Inserted::Created(wrap(self.conn.last_insert_rowid()))),
            Err(err) if is_unique_violation(&err) => match lookup(self)? {
                Some(id) => Ok(Inserted::Existing(id)),
                None => Err(JuicerError::StoreConflict { entity, key: key() }),
            },
            Err(err) => Err(err.into()),
        }
    }

    fn find_enumerator(&self, symbol: SymbolId, name: &str) -> JuicerResult<Option<EnumeratorId>>
    {
        Ok(self
            .conn
            .query_row(
                "SELECT id FROM enumerations WHERE symbol = ?1 AND name = ?2",
                params![symbol.raw(), name],
                |row| row.get(0),
            )
            .optional()?
            .map(EnumeratorId::from_raw))
    }

    fn find_dimension(&self, list: DimensionListId, dim_order: u32) -> JuicerResult<Option<DimensionId>>
    {
        Ok(self
            .conn
            .query_row(
                "SELECT id FROM dimension_lists WHERE list_id = ?1 AND dim_order = ?2",
                params![list.raw(), dim_order],
                |row| row.get(0),
            )
            .optional()?
            .map(DimensionId::from_raw))
    }
}

impl GraphStore for SqliteStore
{
    fn insert_origin(&mut self, name: &str, little_endian: bool) -> JuicerResult<Inserted<OriginId>>
    {
        self.insert_or_get(
            "origin",
            || name.to_string(),
            |conn| {
                conn.execute(
                    "INSERT INTO elfs (name, little_endian) VALUES (?1, ?2)",
                    params![name, little_endian],
                )
            },
            |store| store.find_origin(name),
            OriginId::from_raw,
        )
    }

    fn insert_symbol(&mut self, symbol: &NewSymbol<'_>) -> JuicerResult<Inserted<SymbolId>>
    {
        let byte_size = to_sql_int(symbol.byte_size, "byte_size")?;
        self.insert_or_get(
            "symbol",
            || format!("({}, {})", symbol.name, symbol.byte_size),
            |conn| {
                conn.execute(
                    "INSERT INTO symbols (elf, name, byte_size) VALUES (?1, ?2, ?3)",
                    params![symbol.origin.raw(), symbol.name, byte_size],
                )
            },
            |store| store.find_symbol(symbol.name, symbol.byte_size),
            SymbolId::from_raw,
        )
    }

    fn insert_field(&mut self, field: &NewField<'_>) -> JuicerResult<Inserted<FieldId>>
    {
        let byte_offset = to_sql_int(field.byte_offset, "byte_offset")?;
        let bit_size = field.bit_size.map(|bits| to_sql_int(bits, "bit_size")).transpose()?;
        let bit_offset = field.bit_offset.map(|bits| to_sql_int(bits, "bit_offset")).transpose()?;
        self.insert_or_get(
            "field",
            || format!("({}, {})", field.owner, field.name),
            |conn| {
                conn.execute(
                    "INSERT INTO fields (symbol, name, byte_offset, type, dimension_list, little_endian, bit_size, \
                     bit_offset, pointer_depth) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        field.owner.raw(),
                        field.name,
                        byte_offset,
                        field.type_symbol.raw(),
                        field.dimension_list.map(DimensionListId::raw),
                        field.little_endian,
                        bit_size,
                        bit_offset,
                        field.pointer_depth,
                    ],
                )
            },
            |store| store.find_field(field.owner, field.name),
            FieldId::from_raw,
        )
    }

    fn insert_dimension(&mut self, list: DimensionListId, dim_order: u32, extent: u64) -> JuicerResult<DimensionId>
    {
        let extent = to_sql_int(extent, "extent")?;
        let inserted = self.insert_or_get(
            "dimension",
            || format!("({list}, {dim_order})"),
            |conn| {
                conn.execute(
                    "INSERT INTO dimension_lists (list_id, dim_order, extent) VALUES (?1, ?2, ?3)",
                    params![list.raw(), dim_order, extent],
                )
            },
            |store| store.find_dimension(list, dim_order),
            DimensionId::from_raw,
        )?;
        self.last_list_id = self.last_list_id.max(list.raw());
        Ok(inserted.id())
    }

    fn insert_enumerator(&mut self, symbol: SymbolId, name: &str, value: i64) -> JuicerResult<Inserted<EnumeratorId>>
    {
        self.insert_or_get(
            "enumerator",
            || format!("({symbol}, {name})"),
            |conn| {
                conn.execute(
                    "INSERT INTO enumerations (symbol, name, value) VALUES (?1, ?2, ?3)",
                    params![symbol.raw(), name, value],
                )
            },
            |store| store.find_enumerator(symbol, name),
            EnumeratorId::from_raw,
        )
    }

    fn allocate_dimension_list_id(&mut self) -> JuicerResult<DimensionListId>
    {
        self.last_list_id += 1;
        Ok(DimensionListId::from_raw(self.last_list_id))
    }

    fn find_origin(&self, name: &str) -> JuicerResult<Option<OriginId>>
    {
        Ok(self
            .conn
            .query_row("SELECT id FROM elfs WHERE name = ?1", params![name], |row| row.get(0))
            .optional()?
            .map(OriginId::from_raw))
    }

    fn find_symbol(&self, name: &str, byte_size: u64) -> JuicerResult<Option<SymbolId>>
    {
        let byte_size = to_sql_int(byte_size, "byte_size")?;
        Ok(self
            .conn
            .query_row(
                "SELECT id FROM symbols WHERE name = ?1 AND byte_size = ?2",
                params![name, byte_size],
                |row| row.get(0),
            )
            .optional()?
            .map(SymbolId::from_raw))
    }

    fn find_field(&self, owner: SymbolId, name: &str) -> JuicerResult<Option<FieldId>>
    {
        Ok(self
            .conn
            .query_row(
                "SELECT id FROM fields WHERE symbol = ?1 AND name = ?2",
                params![owner.raw(), name],
                |row| row.get(0),
            )
            .optional()?
            .map(FieldId::from_raw))
    }

    fn symbol_by_id(&self, id: SymbolId) -> JuicerResult<Option<SymbolRecord>>
    {
        Ok(self
            .conn
            .query_row(
                "SELECT id, elf, name, byte_size FROM symbols WHERE id = ?1",
                params![id.raw()],
                symbol_from_row,
            )
            .optional()?)
    }

    fn field_by_id(&self, id: FieldId) -> JuicerResult<Option<FieldRecord>>
    {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {FIELD_COLUMNS} FROM fields WHERE id = ?1"),
                params![id.raw()],
                field_from_row,
            )
            .optional()?)
    }

    fn symbols_named(&self, name: &str) -> JuicerResult<Vec<SymbolRecord>>
    {
        let mut stmt = self
            .conn
            .prepare("SELECT id, elf, name, byte_size FROM symbols WHERE name = ?1 ORDER BY id")?;
        let rows = stmt.query_map(params![name], symbol_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn retarget_fields(&mut self, from: SymbolId, to: SymbolId) -> JuicerResult<usize>
    {
        self.begin()?;
        Ok(self
            .conn
            .execute("UPDATE fields SET type = ?2 WHERE type = ?1", params![from.raw(), to.raw()])?)
    }

    fn set_field_type(&mut self, field: FieldId, type_symbol: SymbolId) -> JuicerResult<bool>
    {
        self.begin()?;
        let updated = self.conn.execute(
            "UPDATE fields SET type = ?2 WHERE id = ?1",
            params![field.raw(), type_symbol.raw()],
        )?;
        Ok(updated > 0)
    }

    fn snapshot(&self) -> JuicerResult<GraphSnapshot>
    {
        let mut graph = GraphSnapshot::default();

        let mut stmt = self.conn.prepare("SELECT id, name, little_endian FROM elfs ORDER BY id")?;
        graph.origins = stmt
            .query_map([], |row| {
                Ok(OriginRecord {
                    id: OriginId::from_raw(row.get(0)?),
                    name: row.get(1)?,
                    little_endian: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<_>>()?;

        let mut stmt = self.conn.prepare("SELECT id, elf, name, byte_size FROM symbols ORDER BY id")?;
        graph.symbols = stmt.query_map([], symbol_from_row)?.collect::<rusqlite::Result<_>>()?;

        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {FIELD_COLUMNS} FROM fields ORDER BY id"))?;
        graph.fields = stmt.query_map([], field_from_row)?.collect::<rusqlite::Result<_>>()?;

        let mut stmt = self
            .conn
            .prepare("SELECT id, list_id, dim_order, extent FROM dimension_lists ORDER BY id")?;
        graph.dimensions = stmt
            .query_map([], |row| {
                Ok(DimensionRecord {
                    id: DimensionId::from_raw(row.get(0)?),
                    list: DimensionListId::from_raw(row.get(1)?),
                    dim_order: row.get(2)?,
                    extent: from_sql_int(row.get(3)?),
                })
            })?
            .collect::<rusqlite::Result<_>>()?;

        let mut stmt = self
            .conn
            .prepare("SELECT id, symbol, name, value FROM enumerations ORDER BY id")?;
        graph.enumerators = stmt
            .query_map([], |row| {
                Ok(EnumeratorRecord {
                    id: EnumeratorId::from_raw(row.get(0)?),
                    symbol: SymbolId::from_raw(row.get(1)?),
                    name: row.get(2)?,
                    value: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<_>>()?;

        Ok(graph)
    }

    fn commit(&mut self) -> JuicerResult<()>
    {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }
}

impl Drop for SqliteStore
{
    fn drop(&mut self)
    {
        if let Err(err) = self.commit() {
            warn!(error = %err, "failed to commit pending graph store writes");
        }
    }
}
