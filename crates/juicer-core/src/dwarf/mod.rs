//! # Debug Access Layer
//!
//! Exposes the type-describing entries of one input binary to the builder.
//!
//! The builder never touches DWARF directly. It talks to a [`DebugSource`],
//! which hands out decoded [`TypeEntry`] values by [`EntryId`]. Two sources
//! ship with the crate:
//!
//! - [`DwarfImage`]: decodes an ELF (or any object file `object` can read)
//!   with `gimli`
//! - [`MemorySource`]: an in-memory description, handy for tests and for
//!   callers that already hold decoded types
//!
//! ## Example
//!
//! ```rust
//! use juicer_core::dwarf::{DebugSource, MemorySource};
//! use juicer_core::types::MemberEntry;
//!
//! let mut source = MemorySource::new("example.o");
//! let float = source.base("float", 4);
//! let circle = source.structure(
//!     "Circle",
//!     8,
//!     vec![MemberEntry::new("diameter", 0, float), MemberEntry::new("radius", 4, float)],
//! );
//! assert_eq!(source.top_level().len(), 2);
//! assert_eq!(source.entry(circle).unwrap().name.as_deref(), Some("Circle"));
//! ```

mod extractor;
mod image;

use std::collections::HashMap;
use std::sync::Arc;

use gimli::read::{Relocate, RelocateReader};
use gimli::{Dwarf, EndianArcSlice, ReaderOffset, RunTimeEndian};
pub use image::DwarfImage;

use crate::error::{JuicerError, JuicerResult};
use crate::types::{CompoundKind, EntryId, EntryKind, Enumerator, Extents, MemberEntry, TypeEntry};

/// Relocations recorded against one debug section of a relocatable object.
///
/// Linked binaries carry none; reads then pass through unchanged.
#[derive(Debug, Clone, Default)]
pub struct SectionRelocations(Option<Arc<object::read::RelocationMap>>);

impl SectionRelocations
{
    pub fn new(map: object::read::RelocationMap) -> Self
    {
        Self(Some(Arc::new(map)))
    }

    fn apply(&self, offset: usize, value: u64) -> u64
    {
        match &self.0 {
            Some(map) => map.relocate(offset as u64, value),
            None => value,
        }
    }
}

impl Relocate for SectionRelocations
{
    fn relocate_address(&self, offset: usize, value: u64) -> gimli::Result<u64>
    {
        Ok(self.apply(offset, value))
    }

    fn relocate_offset(&self, offset: usize, value: usize) -> gimli::Result<usize>
    {
        <usize as ReaderOffset>::from_u64(self.apply(offset, value as u64))
    }
}

/// Reader over section bytes owned by the image, with the section's
/// relocations applied to every address and offset it yields.
pub type OwnedReader = RelocateReader<EndianArcSlice<RunTimeEndian>, SectionRelocations>;
pub type OwnedDwarf = Dwarf<OwnedReader>;

/// Reader over section bytes that need no relocation.
pub fn owned_reader(data: impl Into<Arc<[u8]>>, endian: RunTimeEndian) -> OwnedReader
{
    RelocateReader::new(EndianArcSlice::new(data.into(), endian), SectionRelocations::default())
}

/// One input binary's type entries.
///
/// Implementations are read-only for the duration of a parse pass.
pub trait DebugSource
{
    /// Name of the input (usually its path), recorded as symbol provenance.
    fn origin(&self) -> &str;

    /// Byte order of the environment that produced the layouts.
    fn little_endian(&self) -> bool;

    /// Unit-level type entries, in the order they should be resolved.
    fn top_level(&self) -> &[EntryId];

    /// Look up one entry.
    ///
    /// ## Errors
    ///
    /// Returns `JuicerError::UnresolvedReference` when `id` is not an entry of
    /// this source.
    fn entry(&self, id: EntryId) -> JuicerResult<&TypeEntry>;
}

/// In-memory debug source.
#[derive(Debug, Clone)]
pub struct MemorySource
{
    origin: String,
    little_endian: bool,
    entries: HashMap<EntryId, TypeEntry>,
    top_level: Vec<EntryId>,
    next_id: u64,
}

impl MemorySource
{
    /// Empty source reporting the host byte order.
    pub fn new(origin: impl Into<String>) -> Self
    {
        Self {
            origin: origin.into(),
            little_endian: cfg!(target_endian = "little"),
            entries: HashMap::new(),
            top_level: Vec::new(),
            next_id: 1,
        }
    }

    /// Override the reported byte order.
    #[must_use]
    pub fn with_little_endian(mut self, little_endian: bool) -> Self
    {
        self.little_endian = little_endian;
        self
    }

    /// Allocate an id without defining the entry yet.
    ///
    /// Needed for self-referential types, whose members refer to the entry
    /// being defined.
    pub fn declare(&mut self) -> EntryId
    {
        let id = EntryId::from_raw(self.next_id);
        self.next_id += 1;
        id
    }

    /// Define a previously declared entry and list it as top-level.
    pub fn define(&mut self, id: EntryId, name: Option<&str>, byte_size: Option<u64>, kind: EntryKind) -> EntryId
    {
        let entry = TypeEntry {
            id,
            name: name.map(str::to_string),
            byte_size,
            kind,
        };
        if self.entries.insert(id, entry).is_none() {
            self.top_level.push(id);
        }
        id
    }

    fn add(&mut self, name: Option<&str>, byte_size: Option<u64>, kind: EntryKind) -> EntryId
    {
        let id = self.declare();
        self.define(id, name, byte_size, kind)
    }

    pub fn base(&mut self, name: &str, byte_size: u64) -> EntryId
    {
        self.add(Some(name), Some(byte_size), EntryKind::Base)
    }

    pub fn structure(&mut self, name: &str, byte_size: u64, members: Vec<MemberEntry>) -> EntryId
    {
        self.compound(Some(name), Some(byte_size), CompoundKind::Struct, members)
    }

    pub fn union(&mut self, name: &str, byte_size: u64, members: Vec<MemberEntry>) -> EntryId
    {
        self.compound(Some(name), Some(byte_size), CompoundKind::Union, members)
    }

    /// Struct or union with full control over name and size.
    pub fn compound(
        &mut self,
        name: Option<&str>,
        byte_size: Option<u64>,
        kind: CompoundKind,
        members: Vec<MemberEntry>,
    ) -> EntryId
    {
        self.add(
            name,
            byte_size,
            EntryKind::Compound {
                kind,
                members,
                declaration: false,
            },
        )
    }

    pub fn enumeration(&mut self, name: Option<&str>, byte_size: u64, enumerators: &[(&str, i64)]) -> EntryId
    {
        let enumerators = enumerators
            .iter()
            .map(|(name, value)| Enumerator {
                name: (*name).to_string(),
                value: *value,
            })
            .collect();
        self.add(name, Some(byte_size), EntryKind::Enumeration { enumerators })
    }

    pub fn array(&mut self, element: EntryId, extents: &[u64]) -> EntryId
    {
        self.add(
            None,
            None,
            EntryKind::Array {
                element,
                extents: Extents::from_slice(extents),
            },
        )
    }

    pub fn pointer(&mut self, target: Option<EntryId>, byte_size: u64) -> EntryId
    {
        self.add(None, Some(byte_size), EntryKind::Pointer { target })
    }

    pub fn typedef(&mut self, name: &str, target: Option<EntryId>) -> EntryId
    {
        self.add(Some(name), None, EntryKind::Typedef { target })
    }

    pub fn qualified(&mut self, target: Option<EntryId>) -> EntryId
    {
        self.add(None, None, EntryKind::Qualified { target })
    }
}

impl DebugSource for MemorySource
{
    fn origin(&self) -> &str
    {
        &self.origin
    }

    fn little_endian(&self) -> bool
    {
        self.little_endian
    }

    fn top_level(&self) -> &[EntryId]
    {
        &self.top_level
    }

    fn entry(&self, id: EntryId) -> JuicerResult<&TypeEntry>
    {
        self.entries.get(&id).ok_or(JuicerError::UnresolvedReference { entry: id })
    }
}
