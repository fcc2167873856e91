use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;

use fmsgain::{CalibrationTable, Category, ChannelKey, ChannelSet};
use fmsgain::{Optimiser, OptimiserConfiguration, Outcome};

/// Propose the voltage and bitshift that give one channel a new gain.
#[derive(Parser)]
#[command(name = "fmsgain-optimise")]
struct Cli {
    /// Gain files with `detector channel row column voltage gain` lines
    #[arg(long, required = true, num_args = 1..)]
    gains: Vec<PathBuf>,

    /// Large cell calibration curves, `detector row column p0 p1 p2`
    #[arg(long)]
    large_curves: PathBuf,

    /// Small cell calibration curves, `detector row column p0 p1 p2`
    #[arg(long)]
    small_curves: PathBuf,

    /// Current bitshifts, `detector row column bitshift`; zero where not given
    #[arg(long)]
    bitshifts: Option<PathBuf>,

    #[arg(long)]
    detector: i32,

    #[arg(long)]
    row: i32,

    #[arg(long)]
    column: i32,

    /// Requested effective gain
    #[arg(long)]
    gain: f64,
}

fn open(path: &Path) -> fmsgain::Result<BufReader<File>> {
    log::debug!("reading {}", path.display());
    Ok(BufReader::new(File::open(path)?))
}

fn main() -> fmsgain::Result<ExitCode> {
    env_logger::init();
    let cli = Cli::parse();

    let mut table = CalibrationTable::new();
    table.load(Category::Large, open(&cli.large_curves)?)?;
    table.load(Category::Small, open(&cli.small_curves)?)?;

    let mut channels = ChannelSet::new();
    for path in cli.gains.iter() {
        channels.load_gains(open(path)?)?;
    }
    if let Some(path) = cli.bitshifts.as_ref() {
        channels.load_bitshifts(open(path)?)?;
    }
    channels.set_calibration(&table);

    let key = ChannelKey { detector: cli.detector, row: cli.row, column: cli.column };
    let Some(channel) = channels.get(key) else {
        eprintln!("{}: no such channel", key);
        return Ok(ExitCode::FAILURE)
    };

    println!("{} (channel {}, {:?} cell):", key, channel.channel, channel.category);
    let voltage = channel.category.format_voltage(channel.voltage).to_string();
    println!("  current:   voltage {:>5}  bitshift {:+}  gain {:.5}",
             voltage, channel.bitshift, channel.gain);

    let optimiser = Optimiser::new(OptimiserConfiguration::default());
    match optimiser.optimise(channel, cli.gain) {
        Ok(result) => {
            let voltage = channel.category.format_voltage(result.voltage).to_string();
            println!("  proposed:  voltage {:>5}  bitshift {:+}  gain {:.5}",
                     voltage, result.bitshift, result.gain);
            match result.outcome {
                Outcome::Reached =>
                    println!("requested gain {:.5} reached", cli.gain),
                Outcome::Clamped =>
                    println!("requested gain {:.5} is out of range, clamped", cli.gain),
                Outcome::Locked =>
                    println!("bitshift {:+} is locked, channel unchanged", channel.bitshift),
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(error) => {
            eprintln!("cannot optimise: {}", error);
            Ok(ExitCode::FAILURE)
        }
    }
}
