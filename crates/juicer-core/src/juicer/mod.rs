//! # Parse Orchestrator
//!
//! [`Juicer`] drives one parse pass per input: open the debug information,
//! resolve every top-level type entry into the bound graph store, and report
//! one [`Status`].
//!
//! ## Lifecycle
//!
//! ```text
//! Idle -> Opening -> Walking -> Finalizing -> Succeeded
//!            \           \           \
//!             +-----------+-----------+----> Failed
//! ```
//!
//! ## Failure semantics
//!
//! A pass stops at the first entry that cannot be resolved. Everything
//! written before that point stays in the store and is committed: there is
//! no rollback. Diagnostic detail goes to the `tracing` subscriber; the
//! returned status only says which kind of failure happened.
//!
//! ## Example
//!
//! ```rust
//! use juicer_core::dwarf::MemorySource;
//! use juicer_core::juicer::{Juicer, Status};
//! use juicer_core::store::{GraphStore, MemoryStore};
//! use juicer_core::types::MemberEntry;
//!
//! let mut source = MemorySource::new("circle.o");
//! let float = source.base("float", 4);
//! source.structure("Circle", 8, vec![MemberEntry::new("diameter", 0, float), MemberEntry::new("radius", 4, float)]);
//!
//! let mut store = MemoryStore::new();
//! let mut juicer = Juicer::new();
//! juicer.set_store(&mut store);
//! assert_eq!(juicer.parse_source(&source), Status::Ok);
//! drop(juicer);
//!
//! let graph = store.snapshot().unwrap();
//! assert_eq!(graph.symbols.len(), 2);
//! assert_eq!(graph.fields.len(), 2);
//! ```

mod builder;
mod merge;

use std::fmt;
use std::path::Path;

pub use builder::{MAX_TYPE_REF_DEPTH, VOID_SYMBOL};
use builder::{Reservations, TypeGraphBuilder};
pub use merge::{MergeResolver, MergeStats};
use tracing::{error, info, info_span};

use crate::dwarf::{DebugSource, DwarfImage};
use crate::error::{JuicerError, JuicerResult};
use crate::store::GraphStore;

/// Outcome of one parse call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status
{
    Ok,
    /// The input could not be read, or its type graph could not be resolved.
    ParseError,
    /// The graph store failed, or none was bound.
    StoreError,
}

impl Status
{
    pub fn is_ok(self) -> bool
    {
        self == Status::Ok
    }
}

impl From<&JuicerError> for Status
{
    fn from(err: &JuicerError) -> Self
    {
        match err {
            JuicerError::Access(_)
            | JuicerError::UnresolvedReference { .. }
            | JuicerError::TypeDepthExceeded { .. }
            | JuicerError::Io(_) => Status::ParseError,
            JuicerError::StoreConflict { .. }
            | JuicerError::Store(_)
            | JuicerError::NoStore
            | JuicerError::UnknownSymbol(_)
            | JuicerError::UnknownField { .. }
            | JuicerError::InvalidRemap(_)
            | JuicerError::InvalidOverride(_) => Status::StoreError,
        }
    }
}

impl fmt::Display for Status
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let label = match self {
            Status::Ok => "ok",
            Status::ParseError => "parse error",
            Status::StoreError => "store error",
        };
        f.write_str(label)
    }
}

/// Where the current or most recent parse pass is.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ParseState
{
    #[default]
    Idle,
    Opening,
    Walking,
    Finalizing,
    Succeeded,
    Failed,
}

/// Type graph extraction engine.
///
/// Holds a non-owning handle to the graph store; the caller keeps ownership
/// and must keep the store alive across every `parse` call. The same
/// `Juicer` can parse any number of inputs in sequence. Per-pass bookkeeping
/// (the cycle-breaking reservations and the merge index) is reset at the
/// start of every pass, so the store content is the only state carried from
/// one pass to the next.
#[derive(Default)]
pub struct Juicer<'s>
{
    store: Option<&'s mut dyn GraphStore>,
    merge: MergeResolver,
    reservations: Reservations,
    state: ParseState,
}

impl<'s> Juicer<'s>
{
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Bind the graph store every following parse writes into.
    pub fn set_store(&mut self, store: &'s mut dyn GraphStore)
    {
        self.store = Some(store);
    }

    pub fn store(&self) -> Option<&dyn GraphStore>
    {
        self.store.as_deref()
    }

    pub fn state(&self) -> ParseState
    {
        self.state
    }

    /// Counters of the most recent pass.
    pub fn stats(&self) -> MergeStats
    {
        self.merge.stats()
    }

    /// Parse one object file.
    pub fn parse(&mut self, path: impl AsRef<Path>) -> Status
    {
        let path = path.as_ref();
        let span = info_span!("parse", origin = %path.display());
        let _guard = span.enter();

        self.state = ParseState::Opening;
        if self.store.is_none() {
            return self.fail(&JuicerError::NoStore);
        }
        let image = match DwarfImage::open(path) {
            Ok(image) => image,
            Err(err) => return self.fail(&err),
        };
        self.walk(&image)
    }

    /// Parse an already-open debug source.
    pub fn parse_source(&mut self, source: &dyn DebugSource) -> Status
    {
        let span = info_span!("parse", origin = source.origin());
        let _guard = span.enter();

        self.state = ParseState::Opening;
        self.walk(source)
    }

    fn walk(&mut self, source: &dyn DebugSource) -> Status
    {
        self.merge.reset();
        self.reservations.clear();
        let result = self.try_walk(source);
        self.reservations.clear();

        match result {
            Ok(()) => {
                self.state = ParseState::Succeeded;
                Status::Ok
            }
            Err(err) => self.fail(&err),
        }
    }

    fn try_walk(&mut self, source: &dyn DebugSource) -> JuicerResult<()>
    {
        let store = self.store.as_deref_mut().ok_or(JuicerError::NoStore)?;

        self.state = ParseState::Walking;
        let origin = self.merge.origin(&mut *store, source.origin(), source.little_endian())?;
        info!(
            entries = source.top_level().len(),
            little_endian = source.little_endian(),
            "walking top-level type entries"
        );

        let mut failure = None;
        {
            let mut builder = TypeGraphBuilder::new(source, &mut *store, &mut self.merge, &mut self.reservations, origin);
            for &id in source.top_level() {
                let resolved = match builder.is_deferred(id) {
                    Ok(true) => continue,
                    Ok(false) => builder.resolve(id),
                    Err(err) => Err(err),
                };
                if let Err(err) = resolved {
                    error!(entry = %id, origin = source.origin(), error = %err, "failed to resolve type entry");
                    failure = Some(err);
                    break;
                }
            }
        }

        // Keep what was resolved before the failure.
        store.commit()?;
        if let Some(err) = failure {
            return Err(err);
        }

        self.state = ParseState::Finalizing;
        // Every reservation is completed before `resolve` returns Ok.
        debug_assert!(self.reservations.pending().is_empty());

        let stats = self.merge.stats();
        info!(
            entries = self.reservations.len(),
            symbols_created = stats.symbols_created,
            symbols_reused = stats.symbols_reused,
            fields_created = stats.fields_created,
            fields_reused = stats.fields_reused,
            enumerators_created = stats.enumerators_created,
            conflicts_recovered = stats.conflicts_recovered,
            "parse pass finished"
        );
        Ok(())
    }

    fn fail(&mut self, err: &JuicerError) -> Status
    {
        error!(error = %err, "parse failed");
        self.state = ParseState::Failed;
        Status::from(err)
    }
}
