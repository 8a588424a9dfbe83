//! # juicer-core
//!
//! Extracts compiled type layouts from DWARF debug information into a
//! deduplicated, queryable symbol graph.
//!
//! The crate is organised leaves first:
//! - [`dwarf`]: the debug access layer (`DwarfImage` over `gimli`, plus an
//!   in-memory `MemorySource`)
//! - [`store`]: the graph store contract and its SQLite and in-memory
//!   realizations
//! - [`juicer`]: the type graph builder, merge resolver and parse orchestrator
//! - [`remap`]: rebinding fields from one symbol to another after a parse
//! - [`overrides`]: giving single fields a replacement type (strings,
//!   enumerations) after a parse
//!
//! ## Natural keys
//!
//! Symbols are identified by `(name, byte_size)` across every input written
//! into one store. Parsing the same binary twice, or two binaries that share
//! `float`, never creates a second row for the same key.

pub mod dwarf;
pub mod error;
pub mod juicer;
pub mod overrides;
pub mod prelude;
pub mod remap;
pub mod store;
pub mod types;

pub use error::{JuicerError, JuicerResult};
pub use juicer::{Juicer, ParseState, Status};
