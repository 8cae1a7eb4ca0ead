use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use spectral_processor::data::convert::convert;
use spectral_processor::data::detect::detect_text;
use spectral_processor::data::encoding::decode;
use spectral_processor::store::DirectoryStore;
use spectral_processor::{analyze, find_peaks, Processor, ProcessorConfig, Registry};

#[derive(Parser, Debug)]
#[command(
    name = "spectral-processor",
    version,
    about = "Instrument file normalisation and spectral analysis"
)]
struct Cli {
    /// JSON file with processor settings
    #[arg(long, global = true, env = "SPECTRAL_PROCESSOR_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the dialect of an instrument file
    Detect { file: PathBuf },
    /// Convert an instrument file to canonical CSV
    Convert {
        file: PathBuf,
        /// Write the CSV here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Also print the detected peak positions as JSON on stderr
        #[arg(long)]
        peaks: bool,
    },
    /// Refractive and absorption index from a THz reference/sample pair
    Thz {
        reference: PathBuf,
        sample: PathBuf,
        /// Sample thickness in light-picoseconds
        #[arg(long)]
        thickness: f64,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Process a record of a directory-backed spectra store
    Process {
        id: u64,
        #[arg(long, env = "SPECTRAL_PROCESSOR_STORE")]
        store: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => ProcessorConfig::from_file(path)?,
        None => ProcessorConfig::default(),
    };
    let registry = Registry::builtin().context("loading dialect registry")?;

    match cli.command {
        Command::Detect { file } => {
            let text = decode(&read(&file)?)?;
            let dialect = detect_text(registry, &text)?;
            println!("{}", dialect.dialect);
        }
        Command::Convert { file, output, peaks } => {
            let conversion = convert(registry, &read(&file)?)?;
            log::info!("{} detected as {}", file.display(), conversion.dialect);
            write_output(output.as_deref(), &conversion.table.to_csv()?)?;
            if peaks {
                let found = find_peaks(&conversion.table, &config.peaks);
                eprintln!("{}", serde_json::to_string(&found)?);
            }
        }
        Command::Thz {
            reference,
            sample,
            thickness,
            output,
        } => {
            let reference = convert(registry, &read(&reference)?)?.table;
            let sample = convert(registry, &read(&sample)?)?.table;
            let result = analyze(&reference, &sample, thickness)?;
            write_output(output.as_deref(), &result.to_table()?.to_csv()?)?;
        }
        Command::Process { id, store } => {
            let store = DirectoryStore::open(&store)?;
            let processor = Processor::new(registry, config);
            let report = processor.process_record(&store, id);
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

fn read(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading {}", path.display()))
}

fn write_output(path: Option<&Path>, csv: &str) -> Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, csv).with_context(|| format!("writing {}", path.display()))
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(csv.as_bytes())?;
            stdout.flush()?;
            Ok(())
        }
    }
}
