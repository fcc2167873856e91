use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use clap::Parser;

use fmsgain::{CalibrationTable, Category, ChannelSet, Correction};
use fmsgain::{Optimiser, OptimiserConfiguration};

/// Scale channel gains by per-channel factors, choosing new voltages and bitshifts.
#[derive(Parser)]
#[command(name = "fmsgain-correct")]
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

    /// Gain corrections, `detector row column factor`
    #[arg(long)]
    corrections: PathBuf,

    /// Output gain file
    #[arg(long, default_value = "newgains.txt")]
    out: PathBuf,

    /// Output bitshift file, `detector row column bitshift`
    #[arg(long, default_value = "newbitshifts.txt")]
    out_bitshifts: PathBuf,

    /// Bitshifts that are never changed; `--locked` alone locks none [default: -5]
    #[arg(long, num_args = 0.., allow_negative_numbers = true)]
    locked: Option<Vec<i32>>,
}

fn open(path: &Path) -> fmsgain::Result<BufReader<File>> {
    log::debug!("reading {}", path.display());
    Ok(BufReader::new(File::open(path)?))
}

fn main() -> fmsgain::Result<()> {
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
    let calibrated = channels.set_calibration(&table);
    println!("{} channels, {} with calibration curves", channels.len(), calibrated);

    let mut config = OptimiserConfiguration::default();
    if let Some(locked) = cli.locked {
        config.locked_bitshifts = locked;
    }
    let optimiser = Optimiser::new(config);
    println!("locked bitshifts: {:?}", optimiser.configuration().locked_bitshifts);
    let corrections = Correction::load(open(&cli.corrections)?)?;
    let modified = channels.apply_gain_corrections(&optimiser, &corrections);
    println!("modified {} channels from {} corrections", modified, corrections.len());

    channels.write_gains(BufWriter::new(File::create(&cli.out)?))?;
    println!("saved {}", cli.out.display());
    channels.write_bitshifts(BufWriter::new(File::create(&cli.out_bitshifts)?))?;
    println!("saved {}", cli.out_bitshifts.display());
    Ok(())
}
