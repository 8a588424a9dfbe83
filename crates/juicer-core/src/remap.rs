//! Symbol remapping.
//!
//! Rebinds fields from one symbol to another by name, e.g. to point every
//! field of type `int` at `int32_t` after the fact. When several symbols
//! share a name (same name, different sizes), the one with the lowest id is
//! the remap target; every symbol with the old name is remapped.

use std::collections::HashSet;

use tracing::info;

use crate::error::{JuicerError, JuicerResult};
use crate::store::GraphStore;
use crate::types::SymbolId;

/// One applied remap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemapEntry
{
    pub from: String,
    pub to: String,
    /// Symbol the fields now point at.
    pub target: SymbolId,
    pub fields_rewritten: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemapReport
{
    pub entries: Vec<RemapEntry>,
}

impl RemapReport
{
    pub fn fields_rewritten(&self) -> usize
    {
        self.entries.iter().map(|entry| entry.fields_rewritten).sum()
    }
}

/// Parse a `OLD=NEW` command line argument.
pub fn parse_mapping(arg: &str) -> JuicerResult<(String, String)>
{
    let (old, new) = arg
        .split_once('=')
        .ok_or_else(|| JuicerError::InvalidRemap(format!("expected OLD=NEW, got '{arg}'")))?;
    let (old, new) = (old.trim(), new.trim());
    if old.is_empty() || new.is_empty() {
        return Err(JuicerError::InvalidRemap(format!("empty symbol name in '{arg}'")));
    }
    Ok((old.to_string(), new.to_string()))
}

/// Apply `(old, new)` remaps to the store.
///
/// Every pair is validated before anything is rewritten, so a failing
/// request leaves the store untouched.
///
/// ## Errors
///
/// - `InvalidRemap` if an old name appears twice, or a pair maps a name onto
///   itself
/// - `UnknownSymbol` if either name of a pair has no symbol
pub fn remap_symbols<S: AsRef<str>>(store: &mut dyn GraphStore, mappings: &[(S, S)]) -> JuicerResult<RemapReport>
{
    let mut seen = HashSet::new();
    let mut plan = Vec::with_capacity(mappings.len());

    for (old, new) in mappings {
        let (old, new) = (old.as_ref(), new.as_ref());
        if !seen.insert(old) {
            return Err(JuicerError::InvalidRemap(format!("'{old}' is remapped more than once")));
        }
        if old == new {
            return Err(JuicerError::InvalidRemap(format!("'{old}' is remapped onto itself")));
        }

        let sources = store.symbols_named(old)?;
        if sources.is_empty() {
            return Err(JuicerError::UnknownSymbol(old.to_string()));
        }
        let target = store
            .symbols_named(new)?
            .first()
            .map(|symbol| symbol.id)
            .ok_or_else(|| JuicerError::UnknownSymbol(new.to_string()))?;

        plan.push((old, new, sources, target));
    }

    let mut report = RemapReport::default();
    for (old, new, sources, target) in plan {
        let mut fields_rewritten = 0;
        for source in sources {
            fields_rewritten += store.retarget_fields(source.id, target)?;
        }
        info!(from = old, to = new, target = %target, fields_rewritten, "remapped symbol");
        report.entries.push(RemapEntry {
            from: old.to_string(),
            to: new.to_string(),
            target,
            fields_rewritten,
        });
    }
    store.commit()?;

    Ok(report)
}
