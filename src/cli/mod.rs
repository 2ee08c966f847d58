//! CLI command definitions and handlers

mod doctor;
mod run;
mod stages;

use anyhow::Result;
use clap::{Parser, Subcommand};
use qe_clean::config::Config;
use std::path::{Path, PathBuf};

/// qe-clean - quality-estimation data selection
#[derive(Parser, Debug)]
#[command(name = "qe-clean")]
#[command(
    version,
    about = "Filter noisy parallel corpora by language-model and word-alignment scores",
    long_about = "qe-clean scores every sentence pair of a noisy bitext with six features \
(source and target LM scores, forward and reverse alignment scores and coverage), \
normalizes them against a clean development set, and selects the pairs that are \
at most N standard deviations below the development mean on every feature.",
    after_help = "\
Examples:
  qe-clean run -f mono.de -e mono.en -b clean.de-en -d dev.de-en -i noisy.de-en -o work
  qe-clean select 1.0 < work/input.scored > selected.de-en
  qe-clean run ... --command        Print the external commands without running them
  qe-clean doctor                   Check that the toolchain binaries exist"
)]
pub struct Cli {
    /// Config file (default: ./qe-clean.toml if present)
    #[arg(long, global = true, env = "QE_CLEAN_CONFIG")]
    pub config: Option<PathBuf>,

    /// cdec base directory (fast_align and klm are found under it)
    #[arg(long, global = true, env = "QE_CLEAN_CDEC")]
    pub cdec: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace); RUST_LOG overrides
    #[arg(
        long,
        global = true,
        default_value = "info",
        value_parser = ["error", "warn", "info", "debug", "trace"]
    )]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the full pipeline: build LMs, align, score dev and input
    #[command(after_help = "\
Output layout:
  OUTPUT/input.scored      text ||| features ||| deviations, one line per input pair
  OUTPUT/dev.scored        the same for the development set
  OUTPUT/files/            models, intermediate scores, dev.stats
  OUTPUT/log/              stderr of the external tools

Steps whose outputs already exist are skipped, so a failed run can be resumed.")]
    Run {
        /// Clean monolingual source-side text
        #[arg(short = 'f', long = "source-mono")]
        source_mono: PathBuf,

        /// Clean monolingual target-side text
        #[arg(short = 'e', long = "target-mono")]
        target_mono: PathBuf,

        /// Clean bitext for word alignment (source ||| target)
        #[arg(short = 'b', long)]
        bitext: PathBuf,

        /// Clean development bitext
        #[arg(short = 'd', long)]
        dev: PathBuf,

        /// Noisy input bitext to score
        #[arg(short = 'i', long)]
        input: PathBuf,

        /// Output directory
        #[arg(short = 'o', long)]
        output: PathBuf,

        /// Print commands for the external steps instead of running them
        #[arg(long)]
        command: bool,
    },

    /// Align dev and input in one aligner run and split the output
    Align {
        /// Aligner binary (fast_align)
        aligner: PathBuf,
        /// Bitext the alignment model is estimated on
        corpus: PathBuf,
        /// Development bitext
        dev: PathBuf,
        /// Input bitext
        input: PathBuf,
        /// Alignment output for dev
        dev_out: PathBuf,
        /// Alignment output for input
        input_out: PathBuf,
        /// Reverse (target-to-source) alignment
        #[arg(short = 'r', long)]
        reverse: bool,
    },

    /// Score a bitext from precomputed LM and alignment outputs
    #[command(after_help = "\
Exactly one of --stats-in and --stats-out is required:
  --stats-out   estimate the baseline on TEXT and save it (development set)
  --stats-in    score TEXT against a saved baseline (input set)")]
    Score {
        /// Bitext being scored
        text: PathBuf,
        /// Source-side LM query output
        lm_src: PathBuf,
        /// Target-side LM query output
        lm_tgt: PathBuf,
        /// Forward alignment records
        al_fwd: PathBuf,
        /// Reverse alignment records
        al_rev: PathBuf,
        /// Scored output file
        #[arg(short = 'o', long)]
        output: PathBuf,
        /// Baseline statistics to score against
        #[arg(long)]
        stats_in: Option<PathBuf>,
        /// Where to save the estimated baseline statistics
        #[arg(long)]
        stats_out: Option<PathBuf>,
    },

    /// Keep scored pairs within N deviations on every feature (stdin to stdout)
    Select {
        /// Maximum allowed deficit, in standard deviations
        #[arg(allow_negative_numbers = true)]
        threshold: f64,
    },

    /// Print field N (0-based) of each `|||`-separated line (stdin to stdout)
    Cut {
        /// Field index
        field: usize,
    },

    /// Check that the configured toolchain binaries exist
    Doctor,

    /// Manage configuration (init or show)
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Initialize user config file with example settings
    Init,
    /// Show effective config and paths
    Show,
}

/// Run the CLI with parsed arguments
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run {
            source_mono,
            target_mono,
            bitext,
            dev,
            input,
            output,
            command,
        } => {
            let config = load_config(cli.config.as_deref(), cli.cdec)?;
            run::run(
                &config,
                qe_clean::pipeline::RunInputs {
                    source_mono,
                    target_mono,
                    bitext,
                    dev,
                    input,
                    output,
                },
                command,
            )
        }

        Commands::Align {
            aligner,
            corpus,
            dev,
            input,
            dev_out,
            input_out,
            reverse,
        } => stages::align(
            &aligner,
            &corpus,
            qe_clean::demux::DemuxPaths {
                reference: dev,
                candidate: input,
                reference_out: dev_out,
                candidate_out: input_out,
            },
            reverse,
        ),

        Commands::Score {
            text,
            lm_src,
            lm_tgt,
            al_fwd,
            al_rev,
            output,
            stats_in,
            stats_out,
        } => stages::score(
            &text,
            qe_clean::normalize::FeatureSources {
                lm_source: lm_src,
                lm_target: lm_tgt,
                align_forward: al_fwd,
                align_reverse: al_rev,
            },
            stats_in,
            stats_out,
            &output,
        ),

        Commands::Select { threshold } => stages::select(threshold),

        Commands::Cut { field } => stages::cut(field),

        Commands::Doctor => {
            let config = load_config(cli.config.as_deref(), cli.cdec)?;
            doctor::run(&config)
        }

        Commands::Config { action } => {
            run_config_action(action, cli.config.as_deref(), cli.cdec)
        }
    }
}

/// Config files, then `--cdec` on top
fn load_config(explicit: Option<&Path>, cdec: Option<PathBuf>) -> Result<Config> {
    let mut config = Config::load(explicit)?;
    if cdec.is_some() {
        config.tools.cdec = cdec;
    }
    Ok(config)
}

fn run_config_action(
    action: ConfigAction,
    explicit: Option<&Path>,
    cdec: Option<PathBuf>,
) -> Result<()> {
    match action {
        ConfigAction::Init => {
            let path = Config::init_user_config()?;
            println!("Config initialized at: {}", path.display());
            println!("\nEdit it to point [tools] at your cdec or KenLM binaries.");
        }
        ConfigAction::Show => {
            match Config::user_config_path() {
                Some(path) if path.exists() => println!("User config: {}", path.display()),
                Some(path) => println!("User config: {} (not created)", path.display()),
                None => println!("User config: unavailable"),
            }
            if let Some(path) = explicit {
                println!("Run config:  {}", path.display());
            } else if Path::new(Config::FILENAME).exists() {
                println!("Run config:  ./{}", Config::FILENAME);
            }
            let config = load_config(explicit, cdec)?;
            println!("\n{}", toml::to_string_pretty(&config)?);
        }
    }
    Ok(())
}
