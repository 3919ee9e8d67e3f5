//! ADM renderer command line interface
//!
//! Usage:
//!   admr render in.wav out.wav -s 0+5+0    - render a BW64 file to a layout
//!   admr utils make-test-bwf out.wav       - generate a test file
//!   admr utils dump-axml in.wav            - print the axml chunk
//!   admr utils dump-chna in.wav            - print the chna table
//!   admr utils replace-axml in.wav out.wav - swap the axml chunk
//!   admr utils ambix-to-bwf in.wav out.wav - wrap an ambiX file as BW64
//!   admr utils regenerate in.wav out.wav   - rewrite metadata canonically

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

mod render;
mod utils;

#[derive(Parser)]
#[command(name = "admr", about = "ADM renderer", version)]
struct Cli {
    /// Print debug information when an error occurs
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ConversionMode {
    ToCartesian,
    ToPolar,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a BW64 ADM file to a loudspeaker layout
    Render {
        input_file: PathBuf,
        output_file: PathBuf,

        /// Target output system, according to ITU-R BS.2051
        #[arg(short = 's', long = "system", value_name = "target_system")]
        system: String,

        /// Speakers file describing the real layout
        #[arg(short = 'l', long = "layout", value_name = "layout_file")]
        speakers_file: Option<PathBuf>,

        /// Output gain in dB
        #[arg(long, value_name = "gain_db", default_value_t = 0.0)]
        output_gain_db: f64,

        /// Fail if an overload condition is detected in the output
        #[arg(short = 'c', long)]
        fail_on_overload: bool,

        /// Automatically try to fix faulty block format durations
        #[arg(long)]
        enable_block_duration_fix: bool,

        /// Select an audioProgramme to render by ID
        #[arg(long, value_name = "id")]
        programme: Option<String>,

        /// Select an audioObject by ID from a complementary group
        #[arg(long = "comp-object", value_name = "id")]
        comp_objects: Vec<String>,

        /// Convert Objects metadata to one coordinate convention before
        /// rendering
        #[arg(long, value_enum)]
        apply_conversion: Option<ConversionMode>,

        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,
    },

    /// File inspection and generation utilities
    Utils {
        #[command(subcommand)]
        command: utils::UtilCommands,
    },
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Render {
            input_file,
            output_file,
            system,
            speakers_file,
            output_gain_db,
            fail_on_overload,
            enable_block_duration_fix,
            programme,
            comp_objects,
            apply_conversion,
            strict,
        } => render::OfflineRenderDriver {
            target_layout: system,
            speakers_file,
            output_gain_db,
            fail_on_overload,
            enable_block_duration_fix,
            programme_id: programme,
            complementary_object_ids: comp_objects,
            apply_conversion,
            strict,
        }
        .run(&input_file, &output_file),
        Commands::Utils { command } => utils::run(command),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let debug = cli.debug;

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            if debug {
                eprintln!("error: {:?}", error);
            } else {
                eprintln!("error: {:#}", error);
            }
            ExitCode::FAILURE
        }
    }
}
