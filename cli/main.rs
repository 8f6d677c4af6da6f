#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

use clap::{Args, CommandFactory, Parser, Subcommand};
#[cfg(feature = "plotting")]
use clap::ValueEnum;
#[cfg(feature = "plotting")]
use oaxaca::PlotKind;
use std::path::PathBuf;
use std::process;

use oaxaca::report::format_contributions;
use oaxaca::{DecompositionConfig, DecompositionEngine, Dataset};

#[cfg(feature = "plotting")]
#[derive(Clone, Copy, ValueEnum)]
pub enum PlotKindCli {
    TwoFold,
    ThreeFold,
    Cotton,
}

#[cfg(feature = "plotting")]
impl From<PlotKindCli> for PlotKind {
    fn from(kind: PlotKindCli) -> Self {
        match kind {
            PlotKindCli::TwoFold => PlotKind::TwoFold,
            PlotKindCli::ThreeFold => PlotKind::ThreeFold,
            PlotKindCli::Cotton => PlotKind::Cotton,
        }
    }
}

#[derive(Args)]
pub struct DecomposeArgs {
    /// Path to a TSV (or .csv) file with a header row
    #[arg(value_name = "DATA_PATH")]
    pub data: PathBuf,

    /// Column holding the group indicator (exactly two distinct values)
    #[arg(long, value_name = "COLUMN")]
    pub group: String,

    /// Column holding the response whose group gap is decomposed
    #[arg(long, value_name = "COLUMN")]
    pub response: String,

    /// Optional TOML file with decomposition settings; flags override it
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// The predictors already contain an intercept column
    #[arg(long, conflicts_with = "no_constant")]
    pub has_constant: bool,

    /// Add a `const` column even if the config file sets `has_constant`
    #[arg(long)]
    pub no_constant: bool,

    /// Round every reported component to this many decimal digits
    #[arg(long, value_name = "DIGITS")]
    pub round: Option<u32>,

    /// Skip the Cotton-weighted two-fold decomposition
    #[arg(long)]
    pub no_cotton: bool,

    /// Skip the three-fold variance estimate
    #[arg(long)]
    pub no_variance: bool,

    /// Also print each predictor's contribution to the two-fold components
    #[arg(long)]
    pub detailed: bool,

    /// Save the results as TOML to this path
    #[arg(long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Render a bar chart of one decomposition to this PNG path
    #[cfg(feature = "plotting")]
    #[arg(long, value_name = "PATH")]
    pub plot: Option<PathBuf>,

    /// Which decomposition the bar chart shows
    #[cfg(feature = "plotting")]
    #[arg(long, value_enum, default_value_t = PlotKindCli::TwoFold)]
    pub plot_kind: PlotKindCli,
}

#[derive(Parser)]
#[command(
    name = "oaxaca",
    about = "Oaxaca-Blinder decomposition of the mean gap between two groups",
    long_about = "Fits group and pooled OLS regressions and splits the difference in mean \
                 response into explained and unexplained parts (two-fold), into characteristic, \
                 coefficient and interaction effects (three-fold), and a Cotton-weighted variant."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Decompose the response gap between the two groups of a data file
    #[command(about = "Run the decomposition (outputs: summary on stdout, optional TOML/PNG)")]
    Decompose(DecomposeArgs),

    /// Display version information
    #[command(about = "Display version information")]
    Version,
}

fn resolve_config(args: &DecomposeArgs) -> Result<DecompositionConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => {
            log::info!("Loading decomposition settings from '{}'", path.display());
            DecompositionConfig::load(path)?
        }
        None => DecompositionConfig::default(),
    };
    if args.has_constant {
        config.has_constant = true;
    }
    if args.no_constant {
        config.has_constant = false;
    }
    if args.round.is_some() {
        config.round_digits = args.round;
    }
    if args.no_cotton {
        config.with_cotton = false;
    }
    if args.no_variance {
        config.with_variance = false;
    }
    Ok(config)
}

fn decompose(args: DecomposeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = resolve_config(&args)?;
    let dataset = Dataset::from_delimited_file(&args.data)?;

    let mut engine = DecompositionEngine::with_config(
        &dataset,
        args.group.as_str(),
        args.response.as_str(),
        config,
    )?;
    let report = engine.decompose()?;
    println!("{report}");

    if args.detailed {
        let contributions = engine.detailed_two_fold()?;
        println!("\nDetailed two-fold decomposition (pooled reference)");
        print!("{}", format_contributions(&contributions));
    }

    if let Some(path) = &args.output {
        let path = path.to_string_lossy();
        report.save(&path)?;
        println!("\nResults saved to: {path}");
    }

    #[cfg(feature = "plotting")]
    if let Some(path) = &args.plot {
        let path = path.to_string_lossy();
        oaxaca::plot::plot_decomposition(
            &report,
            args.plot_kind.into(),
            &path,
            &oaxaca::plot::PlotConfig::default(),
        )?;
        println!("Chart saved to: {path}");
    }

    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let result = match cli.command {
        Some(Commands::Decompose(args)) => decompose(args),
        Some(Commands::Version) => {
            println!("oaxaca {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        None => {
            Cli::command().print_help().expect("print help");
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
