//! Kiln CLI: the command-line driver for the Kiln pipeline compiler.
//!
//! Provides `kiln module` for building shader modules, `kiln compute` and
//! `kiln graphics` for building pipeline binaries, `kiln merge` for stitching
//! a fragment binary into a non-fragment one, and `kiln stats` for reading
//! register statistics back out of a pipeline binary.

#![warn(missing_docs)]

mod build;
mod inspect;
mod session;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};

/// Kiln, a caching GPU pipeline compiler.
#[derive(Parser, Debug)]
#[command(name = "kiln", version, about = "Kiln pipeline compiler")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// GPU target as `major.minor[.stepping]` (overrides `kiln.toml`).
    #[arg(long, global = true)]
    pub gfxip: Option<String>,

    /// Compiler option string, e.g. `--option=-subgroup-size=32`. Repeatable.
    #[arg(long = "option", global = true, allow_hyphen_values = true)]
    pub options: Vec<String>,

    /// Directory holding a `kiln.toml` profile.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build shader modules and report their hashes.
    Module(ModuleArgs),
    /// Build a compute pipeline.
    Compute(ComputeArgs),
    /// Build a graphics pipeline.
    Graphics(GraphicsArgs),
    /// Merge the pixel stage of one pipeline binary into another.
    Merge(MergeArgs),
    /// Print register and spill statistics of a pipeline binary.
    Stats(StatsArgs),
}

/// Arguments for `kiln module`.
#[derive(Parser, Debug)]
pub struct ModuleArgs {
    /// SPIR-V or IR bitcode files.
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Pre-lower every entry point.
    #[arg(long)]
    pub lower: bool,

    /// Directory to write serialized modules into.
    #[arg(short, long)]
    pub out_dir: Option<PathBuf>,
}

/// Listing sections to embed in a pipeline binary.
#[derive(Parser, Debug, Clone, Copy)]
pub struct ListingArgs {
    /// Embed the disassembly listing.
    #[arg(long)]
    pub disasm: bool,

    /// Embed the IR listing.
    #[arg(long)]
    pub ir: bool,
}

/// Arguments for `kiln compute`.
#[derive(Parser, Debug)]
pub struct ComputeArgs {
    /// Compute shader file.
    pub shader: PathBuf,

    /// Entry-point name.
    #[arg(long, default_value = "main")]
    pub entry: String,

    /// Output ELF path.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Pipeline dump file to write the option line to.
    #[arg(long)]
    pub dump: Option<PathBuf>,

    #[command(flatten)]
    pub listings: ListingArgs,
}

/// Arguments for `kiln graphics`.
#[derive(Parser, Debug)]
pub struct GraphicsArgs {
    /// Vertex shader file.
    #[arg(long)]
    pub vs: Option<PathBuf>,

    /// Tessellation control shader file.
    #[arg(long)]
    pub tcs: Option<PathBuf>,

    /// Tessellation evaluation shader file.
    #[arg(long)]
    pub tes: Option<PathBuf>,

    /// Geometry shader file.
    #[arg(long)]
    pub gs: Option<PathBuf>,

    /// Fragment shader file.
    #[arg(long)]
    pub fs: Option<PathBuf>,

    /// Entry-point name used for every stage.
    #[arg(long, default_value = "main")]
    pub entry: String,

    /// Output ELF path.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Pipeline dump file to write the option line to.
    #[arg(long)]
    pub dump: Option<PathBuf>,

    #[command(flatten)]
    pub listings: ListingArgs,
}

/// Arguments for `kiln merge`.
#[derive(Parser, Debug)]
pub struct MergeArgs {
    /// Binary providing the pixel stage.
    pub fragment: PathBuf,

    /// Binary providing every other stage.
    pub non_fragment: PathBuf,

    /// Output ELF path.
    #[arg(short, long)]
    pub output: PathBuf,
}

/// Arguments for `kiln stats`.
#[derive(Parser, Debug)]
pub struct StatsArgs {
    /// Pipeline ELF.
    pub input: PathBuf,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

/// Report output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable terminal output.
    Text,
    /// Machine-readable JSON output.
    Json,
}

/// Error type returned by every command.
///
/// `Send` so module builds can report failures across rayon workers.
pub type CliError = Box<dyn std::error::Error + Send + Sync>;

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// GPU target override.
    pub gfxip: Option<String>,
    /// Extra option strings.
    pub options: Vec<String>,
    /// Optional profile directory.
    pub config: Option<PathBuf>,
}

fn init_logging(quiet: bool, verbose: bool) {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);

    let global = GlobalArgs {
        quiet: cli.quiet,
        gfxip: cli.gfxip,
        options: cli.options,
        config: cli.config,
    };

    let result = match cli.command {
        Command::Module(ref args) => build::module(args, &global),
        Command::Compute(ref args) => build::compute(args, &global),
        Command::Graphics(ref args) => build::graphics(args, &global),
        Command::Merge(ref args) => inspect::merge(args, &global),
        Command::Stats(ref args) => inspect::stats(args),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}
