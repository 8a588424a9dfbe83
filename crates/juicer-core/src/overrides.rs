//! Field type overrides.
//!
//! Debug information records a string buffer as `char[N]` and a set of
//! `#define` constants as a plain integer. An override gives one field of one
//! symbol a replacement type after the fact:
//!
//! - a named type, e.g. `string` for a `char[16]` buffer
//! - an enumeration carrying the constants the integer takes
//!
//! The replacement is a symbol sized like the field's current type and owned
//! by the same origin as the field's symbol. The field keeps its offset,
//! dimensions, pointer depth and bit layout; only its type changes. Like a
//! remap, when several symbols share the parent name the one with the lowest
//! id is overridden.
//!
//! Replacements go through the natural keys, so applying the same override
//! twice leaves the store as the first application did.

use std::collections::HashSet;

use tracing::info;

use crate::error::{JuicerError, JuicerResult};
use crate::juicer::MergeResolver;
use crate::store::GraphStore;
use crate::types::{FieldRecord, NewSymbol, SymbolId, SymbolRecord};

/// Type a field is given by an override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Replacement
{
    Named(String),
    /// Enumeration with the given constants. Without a name the symbol is
    /// called `SYMBOL.FIELD`.
    Enumeration
    {
        name: Option<String>,
        enumerators: Vec<(String, i64)>,
    },
}

/// Replace the type of `symbol.field`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldOverride
{
    pub symbol: String,
    pub field: String,
    pub replacement: Replacement,
}

impl FieldOverride
{
    pub fn named(symbol: impl Into<String>, field: impl Into<String>, type_name: impl Into<String>) -> Self
    {
        Self {
            symbol: symbol.into(),
            field: field.into(),
            replacement: Replacement::Named(type_name.into()),
        }
    }

    pub fn enumeration(
        symbol: impl Into<String>,
        field: impl Into<String>,
        name: Option<String>,
        enumerators: Vec<(String, i64)>,
    ) -> Self
    {
        Self {
            symbol: symbol.into(),
            field: field.into(),
            replacement: Replacement::Enumeration { name, enumerators },
        }
    }

    /// Name of the replacement symbol.
    pub fn type_name(&self) -> String
    {
        match &self.replacement {
            Replacement::Named(name) | Replacement::Enumeration { name: Some(name), .. } => name.clone(),
            Replacement::Enumeration { name: None, .. } => format!("{}.{}", self.symbol, self.field),
        }
    }

    fn validate(&self) -> JuicerResult<()>
    {
        match &self.replacement {
            Replacement::Named(name) if name.trim().is_empty() => Err(JuicerError::InvalidOverride(format!(
                "empty type name for {}.{}",
                self.symbol, self.field
            ))),
            Replacement::Enumeration { name: Some(name), .. } if name.trim().is_empty() => Err(
                JuicerError::InvalidOverride(format!("empty enumeration name for {}.{}", self.symbol, self.field)),
            ),
            Replacement::Enumeration { enumerators, .. } => {
                if enumerators.is_empty() {
                    return Err(JuicerError::InvalidOverride(format!(
                        "enumeration for {}.{} has no constants",
                        self.symbol, self.field
                    )));
                }
                let mut seen = HashSet::new();
                for (name, _) in enumerators {
                    if !seen.insert(name.as_str()) {
                        return Err(JuicerError::InvalidOverride(format!(
                            "constant '{name}' appears twice for {}.{}",
                            self.symbol, self.field
                        )));
                    }
                }
                Ok(())
            }
            Replacement::Named(_) => Ok(()),
        }
    }
}

/// One applied override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideEntry
{
    pub symbol: String,
    pub field: String,
    pub type_name: String,
    /// Type the field pointed at before.
    pub previous: SymbolId,
    /// Type the field points at now.
    pub replacement: SymbolId,
    pub enumerators_created: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideReport
{
    pub entries: Vec<OverrideEntry>,
}

/// Parse a `SYMBOL.FIELD` command line argument.
///
/// The field name is everything after the last dot.
pub fn parse_field_path(arg: &str) -> JuicerResult<(String, String)>
{
    let (symbol, field) = arg
        .rsplit_once('.')
        .ok_or_else(|| JuicerError::InvalidOverride(format!("expected SYMBOL.FIELD, got '{arg}'")))?;
    let (symbol, field) = (symbol.trim(), field.trim());
    if symbol.is_empty() || field.is_empty() {
        return Err(JuicerError::InvalidOverride(format!("empty symbol or field name in '{arg}'")));
    }
    Ok((symbol.to_string(), field.to_string()))
}

/// Parse a `NAME=VALUE` enumeration constant. Values are decimal, or
/// hexadecimal with a `0x` prefix, optionally negative.
pub fn parse_enumerator(arg: &str) -> JuicerResult<(String, i64)>
{
    let invalid = || JuicerError::InvalidOverride(format!("expected NAME=VALUE, got '{arg}'"));
    let (name, value) = arg.split_once('=').ok_or_else(invalid)?;
    let (name, value) = (name.trim(), value.trim());
    if name.is_empty() {
        return Err(invalid());
    }

    let (negative, digits) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value),
    };
    let magnitude = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16),
        None => digits.parse::<i64>(),
    }
    .map_err(|_| invalid())?;

    Ok((name.to_string(), if negative { -magnitude } else { magnitude }))
}

/// Fields an override resolved to, before anything is written.
struct Target<'o>
{
    request: &'o FieldOverride,
    owner: SymbolRecord,
    field: FieldRecord,
    previous: SymbolRecord,
}

fn resolve<'o>(store: &dyn GraphStore, request: &'o FieldOverride) -> JuicerResult<Target<'o>>
{
    let owner = store
        .symbols_named(&request.symbol)?
        .into_iter()
        .next()
        .ok_or_else(|| JuicerError::UnknownSymbol(request.symbol.clone()))?;
    let unknown_field = || JuicerError::UnknownField {
        symbol: request.symbol.clone(),
        field: request.field.clone(),
    };
    let field_id = store.find_field(owner.id, &request.field)?.ok_or_else(unknown_field)?;
    let field = store.field_by_id(field_id)?.ok_or_else(unknown_field)?;
    let previous = store.symbol_by_id(field.type_symbol)?.ok_or_else(|| {
        JuicerError::Store(format!(
            "field {}.{} refers to missing symbol {}",
            request.symbol, request.field, field.type_symbol
        ))
    })?;

    Ok(Target {
        request,
        owner,
        field,
        previous,
    })
}

/// Apply field overrides to the store.
///
/// Every request is validated and resolved before anything is written, so a
/// failing request leaves the store untouched.
///
/// ## Errors
///
/// - `InvalidOverride` if a field is overridden twice, a replacement has an
///   empty name, or an enumeration has no (or repeated) constants
/// - `UnknownSymbol` / `UnknownField` if the field cannot be found
pub fn apply_overrides(store: &mut dyn GraphStore, overrides: &[FieldOverride]) -> JuicerResult<OverrideReport>
{
    let mut seen = HashSet::new();
    let mut plan = Vec::with_capacity(overrides.len());
    for request in overrides {
        if !seen.insert((request.symbol.as_str(), request.field.as_str())) {
            return Err(JuicerError::InvalidOverride(format!(
                "{}.{} is overridden more than once",
                request.symbol, request.field
            )));
        }
        request.validate()?;
        plan.push(resolve(store, request)?);
    }

    let mut merge = MergeResolver::new();
    let mut report = OverrideReport::default();
    for target in plan {
        let type_name = target.request.type_name();
        let (replacement, _) = merge.symbol(
            &mut *store,
            &NewSymbol {
                origin: target.owner.origin,
                name: &type_name,
                byte_size: target.previous.byte_size,
            },
        )?;

        let before = merge.stats().enumerators_created;
        if let Replacement::Enumeration { enumerators, .. } = &target.request.replacement {
            for (name, value) in enumerators {
                merge.enumerator(&mut *store, replacement, name, *value)?;
            }
        }
        let enumerators_created = merge.stats().enumerators_created - before;

        if !store.set_field_type(target.field.id, replacement)? {
            return Err(JuicerError::UnknownField {
                symbol: target.request.symbol.clone(),
                field: target.request.field.clone(),
            });
        }
        info!(
            symbol = %target.request.symbol,
            field = %target.request.field,
            previous = %target.previous.name,
            replacement = %type_name,
            enumerators_created,
            "overrode field type"
        );

        report.entries.push(OverrideEntry {
            symbol: target.request.symbol.clone(),
            field: target.request.field.clone(),
            type_name,
            previous: target.previous.id,
            replacement,
            enumerators_created,
        });
    }
    store.commit()?;

    Ok(report)
}
