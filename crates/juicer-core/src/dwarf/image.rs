//! Object file loading and DWARF section plumbing.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use gimli::read::RelocateReader;
use gimli::{Dwarf, EndianArcSlice, RunTimeEndian, SectionId};
use object::{Object, ObjectSection};
use once_cell::sync::OnceCell;
use tracing::{debug, warn};

use super::extractor::TypeExtractor;
use super::{owned_reader, DebugSource, OwnedDwarf, OwnedReader, SectionRelocations};
use crate::error::{JuicerError, JuicerResult};
use crate::types::{CompoundKind, EntryId, EntryKind, TypeEntry};

const DWARF_SECTIONS: &[(&str, &[&str])] = &[
    (".debug_abbrev", &[".debug_abbrev", "__debug_abbrev"]),
    (".debug_addr", &[".debug_addr", "__debug_addr"]),
    (".debug_info", &[".debug_info", "__debug_info"]),
    (".debug_line", &[".debug_line", "__debug_line"]),
    (".debug_line_str", &[".debug_line_str", "__debug_line_str"]),
    (".debug_ranges", &[".debug_ranges", "__debug_ranges"]),
    (".debug_rnglists", &[".debug_rnglists", "__debug_rnglists"]),
    (".debug_str", &[".debug_str", "__debug_str"]),
    (".debug_str_offsets", &[".debug_str_offsets", "__debug_str_offsets"]),
    (".debug_types", &[".debug_types", "__debug_types"]),
    (".debug_loc", &[".debug_loc", "__debug_loc"]),
    (".debug_loclists", &[".debug_loclists", "__debug_loclists"]),
];

/// Bytes of one debug section and the relocations that apply to them.
#[derive(Default)]
struct LoadedSection
{
    data: Option<Arc<[u8]>>,
    relocations: SectionRelocations,
}

fn load_section(file: &object::File<'_>, names: &[&str]) -> JuicerResult<LoadedSection>
{
    for name in names {
        if let Some(section) = file.section_by_name(name) {
            let data = section
                .uncompressed_data()
                .map_err(|err| JuicerError::Access(format!("failed to read {name}: {err}")))?;
            // Relocation kinds `object` cannot apply leave the section as stored.
            let relocations = match section.relocation_map() {
                Ok(map) => SectionRelocations::new(map),
                Err(err) => {
                    warn!(section = *name, error = %err, "debug relocations not applied");
                    SectionRelocations::default()
                }
            };
            return Ok(LoadedSection {
                data: Some(match data {
                    Cow::Borrowed(bytes) => Arc::<[u8]>::from(bytes.to_vec()),
                    Cow::Owned(vec) => vec.into(),
                }),
                relocations,
            });
        }
    }

    Ok(LoadedSection::default())
}

/// Kinds of named types that can be forward-declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum DefinitionKind
{
    Compound(CompoundKind),
    Enumeration,
}

impl DefinitionKind
{
    /// Kind of `entry` and whether it is only a declaration.
    ///
    /// Enumerations carry no declaration flag; a declared one has neither a
    /// size nor any enumerator.
    fn of(entry: &TypeEntry) -> Option<(Self, bool)>
    {
        match &entry.kind {
            EntryKind::Compound { kind, declaration, .. } => Some((DefinitionKind::Compound(*kind), *declaration)),
            EntryKind::Enumeration { enumerators } => Some((
                DefinitionKind::Enumeration,
                entry.byte_size.is_none() && enumerators.is_empty(),
            )),
            _ => None,
        }
    }
}

/// Definitions of named structs, unions and enums keyed by kind and name.
type DefinitionIndex = HashMap<DefinitionKind, HashMap<String, EntryId>>;

/// Every type entry decoded from one object file.
///
/// Decoding happens once, up front; lookups afterwards are plain map reads.
/// Forward declarations (`struct Foo;`, `enum Bar;`) are answered with the
/// definition of the same name and kind when the binary contains one.
pub struct DwarfImage
{
    origin: String,
    little_endian: bool,
    entries: HashMap<EntryId, TypeEntry>,
    top_level: Vec<EntryId>,
    definitions: OnceCell<DefinitionIndex>,
}

impl DwarfImage
{
    /// Read and decode an object file.
    ///
    /// ## Errors
    ///
    /// - `JuicerError::Io` if the file cannot be read
    /// - `JuicerError::Access` if it is not an object file, carries no DWARF,
    ///   or the DWARF is malformed
    pub fn open(path: impl AsRef<Path>) -> JuicerResult<Self>
    {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        let data = Arc::<[u8]>::from(bytes);
        let file = object::File::parse(&*data)
            .map_err(|err| JuicerError::Access(format!("failed to parse {}: {err}", path.display())))?;

        let little_endian = file.is_little_endian();
        let endian = if little_endian {
            RunTimeEndian::Little
        } else {
            RunTimeEndian::Big
        };

        let mut sections = HashMap::new();
        for (canonical, aliases) in DWARF_SECTIONS {
            sections.insert(*canonical, load_section(&file, aliases)?);
        }

        let has_info = sections
            .get(".debug_info")
            .and_then(|section| section.data.as_ref())
            .is_some_and(|info| !info.is_empty());
        if !has_info {
            return Err(JuicerError::Access(format!(
                "{} has no DWARF debug information",
                path.display()
            )));
        }

        let dwarf = Dwarf::load(|section| Ok::<_, gimli::Error>(section_reader(&sections, section, endian)))
            .map_err(|err| JuicerError::Access(format!("failed to load DWARF: {err}")))?;

        Self::from_dwarf(path.display().to_string(), little_endian, &dwarf)
    }

    /// Decode already-loaded DWARF sections.
    pub fn from_dwarf(origin: impl Into<String>, little_endian: bool, dwarf: &OwnedDwarf) -> JuicerResult<Self>
    {
        let origin = origin.into();
        let extractor = TypeExtractor::new(dwarf)?;
        let decoded = extractor.decode()?;
        debug!(
            origin = %origin,
            units = extractor.unit_count(),
            entries = decoded.entries.len(),
            top_level = decoded.top_level.len(),
            "decoded DWARF type entries"
        );

        Ok(Self {
            origin,
            little_endian,
            entries: decoded.entries,
            top_level: decoded.top_level,
            definitions: OnceCell::new(),
        })
    }

    /// Number of decoded type entries, nested ones included.
    pub fn entry_count(&self) -> usize
    {
        self.entries.len()
    }

    fn definitions(&self) -> &DefinitionIndex
    {
        self.definitions.get_or_init(|| {
            let mut index = DefinitionIndex::new();
            for entry in self.entries.values() {
                let Some((kind, false)) = DefinitionKind::of(entry) else {
                    continue;
                };
                let Some(name) = entry.name.as_deref().filter(|name| !name.is_empty()) else {
                    continue;
                };
                let slot = index.entry(kind).or_default().entry(name.to_string()).or_insert(entry.id);
                // Lowest id wins so repeated runs pick the same definition.
                if entry.id < *slot {
                    *slot = entry.id;
                }
            }
            index
        })
    }

    fn definition_of(&self, entry: &TypeEntry) -> Option<&TypeEntry>
    {
        let Some((kind, true)) = DefinitionKind::of(entry) else {
            return None;
        };
        let name = entry.name.as_deref()?;
        let id = self.definitions().get(&kind)?.get(name)?;
        self.entries.get(id)
    }
}

fn section_reader(sections: &HashMap<&'static str, LoadedSection>, id: SectionId, endian: RunTimeEndian) -> OwnedReader
{
    let Some(section) = sections.get(id.name()) else {
        return owned_reader(Vec::new(), endian);
    };
    let data = section
        .data
        .clone()
        .unwrap_or_else(|| Arc::<[u8]>::from(Vec::new()));
    RelocateReader::new(EndianArcSlice::new(data, endian), section.relocations.clone())
}

impl DebugSource for DwarfImage
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
        let entry = self
            .entries
            .get(&id)
            .ok_or(JuicerError::UnresolvedReference { entry: id })?;
        Ok(self.definition_of(entry).unwrap_or(entry))
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_open_missing_file_is_io_error()
    {
        let err = DwarfImage::open("/definitely/not/here.elf").err().unwrap();
        assert!(matches!(err, JuicerError::Io(_)));
    }

    #[test]
    fn test_open_non_object_is_access_error()
    {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.bin");
        fs::write(&path, b"this is not an object file").unwrap();

        let err = DwarfImage::open(&path).err().unwrap();
        assert!(matches!(err, JuicerError::Access(_)));
        assert!(err.to_string().contains("garbage.bin"));
    }
}
