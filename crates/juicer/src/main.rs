use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::{env, fmt};

use clap::{Parser, Subcommand, ValueEnum};
use juicer_core::error::JuicerError;
use juicer_core::overrides::{apply_overrides, parse_enumerator, parse_field_path, FieldOverride};
use juicer_core::remap::{parse_mapping, remap_symbols};
use juicer_core::store::{GraphStore, SqliteStore};
use juicer_core::types::{FieldRecord, GraphSnapshot, SymbolRecord};
use juicer_core::Juicer;
use juicer_utils::logging::LOG_FORMAT_VAR;
use juicer_utils::{info, init_logging, init_logging_with_level, LogFormat, LogLevel};

/// Squeezes struct, union, and array layouts out of ELF debug information
/// into a SQLite database.
#[derive(Parser, Debug)]
#[command(name = "juicer")]
#[command(version)]
#[command(about = "Extracts type layouts from DWARF debug information into a SQLite database", long_about = None)]
struct Cli
{
    /// Log verbosity: 1 error, 2 warn, 3 info, 4 debug (overrides RUST_LOG)
    #[arg(short = 'v', long, global = true, value_parser = clap::value_parser!(u8).range(1..=4))]
    verbosity: Option<u8>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode
{
    Sqlite,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Parse one or more binaries into the database
    Parse
    {
        /// Binary to parse; repeat to merge several binaries into one database
        #[arg(short, long = "input", required = true)]
        inputs: Vec<PathBuf>,
        /// Database file, created if missing
        #[arg(short, long)]
        output: PathBuf,
        /// Output backend
        #[arg(short, long, value_enum, default_value_t = Mode::Sqlite)]
        mode: Mode,
    },
    /// Point every field of one symbol at another symbol
    Remap
    {
        /// Database file
        #[arg(short, long)]
        output: PathBuf,
        /// Mapping in OLD=NEW form; repeatable
        #[arg(long = "map", required = true, value_parser = parse_map_arg)]
        maps: Vec<(String, String)>,
    },
    /// Give one field a replacement type: a named type such as `string` for
    /// a char buffer, or an enumeration of the given constants
    Override
    {
        /// Database file
        #[arg(short, long)]
        output: PathBuf,
        /// Field to override, as SYMBOL.FIELD
        #[arg(long, value_parser = parse_field_arg)]
        field: (String, String),
        /// Name of the replacement type; required unless --enum is given
        #[arg(long = "type", required_unless_present = "enumerators")]
        type_name: Option<String>,
        /// Enumeration constant in NAME=VALUE form; repeatable
        #[arg(long = "enum", value_parser = parse_enumerator_arg)]
        enumerators: Vec<(String, i64)>,
    },
    /// Print the layout of every symbol with the given name
    Show
    {
        /// Database file
        #[arg(short, long)]
        output: PathBuf,
        /// Symbol name
        name: String,
    },
}

fn parse_map_arg(arg: &str) -> Result<(String, String), String>
{
    parse_mapping(arg).map_err(|err| err.to_string())
}

fn parse_field_arg(arg: &str) -> Result<(String, String), String>
{
    parse_field_path(arg).map_err(|err| err.to_string())
}

fn parse_enumerator_arg(arg: &str) -> Result<(String, i64), String>
{
    parse_enumerator(arg).map_err(|err| err.to_string())
}

fn main() -> ExitCode
{
    let cli = Cli::parse();

    let logging = match cli.verbosity {
        Some(verbosity) => {
            let format = env::var(LOG_FORMAT_VAR)
                .ok()
                .and_then(|value| value.parse::<LogFormat>().ok())
                .unwrap_or(LogFormat::Pretty);
            LogLevel::from_verbosity(verbosity).and_then(|level| init_logging_with_level(level, format))
        }
        None => init_logging(),
    };
    let _guard = match logging {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run_command(cli.command) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run_command(command: Commands) -> Result<ExitCode, JuicerError>
{
    match command {
        Commands::Parse { inputs, output, mode } => run_parse(&inputs, &output, mode),
        Commands::Remap { output, maps } => {
            let mut store = SqliteStore::open(&output)?;
            let report = remap_symbols(&mut store, &maps)?;
            for entry in &report.entries {
                println!(
                    "{} -> {} (symbol {}): {} field(s) rewritten",
                    entry.from, entry.to, entry.target, entry.fields_rewritten
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Override {
            output,
            field: (symbol, field),
            type_name,
            enumerators,
        } => {
            let request = if enumerators.is_empty() {
                let type_name = type_name.ok_or_else(|| JuicerError::InvalidOverride("--type is required".to_string()))?;
                FieldOverride::named(symbol, field, type_name)
            } else {
                FieldOverride::enumeration(symbol, field, type_name, enumerators)
            };
            let mut store = SqliteStore::open(&output)?;
            let report = apply_overrides(&mut store, &[request])?;
            for entry in &report.entries {
                println!(
                    "{}.{} -> {} (symbol {}): {} new constant(s)",
                    entry.symbol, entry.field, entry.type_name, entry.replacement, entry.enumerators_created
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Show { output, name } => {
            let store = SqliteStore::open(&output)?;
            let graph = store.snapshot()?;
            let symbols: Vec<_> = graph.symbols_named(&name).collect();
            if symbols.is_empty() {
                return Err(JuicerError::UnknownSymbol(name));
            }
            for symbol in symbols {
                print!("{}", Layout { graph: &graph, symbol });
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn run_parse(inputs: &[PathBuf], output: &Path, mode: Mode) -> Result<ExitCode, JuicerError>
{
    let mut store = match mode {
        Mode::Sqlite => SqliteStore::open(output)?,
    };
    let mut juicer = Juicer::new();
    juicer.set_store(&mut store);

    let mut failed = 0usize;
    for input in inputs {
        let status = juicer.parse(input);
        if status.is_ok() {
            let stats = juicer.stats();
            println!(
                "{}: {} new symbol(s), {} reused, {} new field(s)",
                input.display(),
                stats.symbols_created,
                stats.symbols_reused,
                stats.fields_created
            );
        } else {
            failed += 1;
            eprintln!("{}: {status}", input.display());
        }
    }
    info!(inputs = inputs.len(), failed, output = %output.display(), "parse finished");

    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Human-readable layout of one symbol.
struct Layout<'a>
{
    graph: &'a GraphSnapshot,
    symbol: &'a SymbolRecord,
}

impl Layout<'_>
{
    fn type_name(&self, field: &FieldRecord) -> String
    {
        let mut name = self
            .graph
            .symbol_by_id(field.type_symbol)
            .map_or_else(|| format!("<symbol {}>", field.type_symbol), |symbol| symbol.name.clone());
        for _ in 0..field.pointer_depth {
            name.push('*');
        }
        if let Some(list) = field.dimension_list {
            for dimension in self.graph.dimensions_of(list) {
                name.push_str(&format!("[{}]", dimension.extent));
            }
        }
        name
    }
}

impl fmt::Display for Layout<'_>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let origin = self
            .graph
            .origins
            .iter()
            .find(|origin| origin.id == self.symbol.origin)
            .map_or("?", |origin| origin.name.as_str());
        writeln!(
            f,
            "{} ({} bytes, symbol {}, from {})",
            self.symbol.name, self.symbol.byte_size, self.symbol.id, origin
        )?;

        for field in self.graph.fields_of(self.symbol.id) {
            let offset = match field.bit_offset {
                Some(bits) => format!("+{}.{}", field.byte_offset, bits),
                None => format!("+{}", field.byte_offset),
            };
            let name = match field.bit_size {
                Some(bits) => format!("{}:{}", field.name, bits),
                None => field.name.clone(),
            };
            writeln!(f, "  {offset:<8} {name:<24} {}", self.type_name(field))?;
        }

        for enumerator in self.graph.enumerators_of(self.symbol.id) {
            writeln!(f, "  {:<24} = {}", enumerator.name, enumerator.value)?;
        }
        Ok(())
    }
}
