//! Data selection pipeline
//!
//! Orchestrates a full run over an output directory:
//! 0. Create `OUTPUT/files` and `OUTPUT/log`
//! 1. Build the source LM and score dev/input source sides
//! 2. Build the target LM and score dev/input target sides
//! 3. Source-to-target word alignment of dev and input
//! 4. Target-to-source word alignment of dev and input
//! 5. Score dev (estimating the baseline) and input (against it)
//!
//! Steps 1-4 are independent of each other and skip work whose outputs
//! already exist. In command-only mode they are printed as shell commands
//! instead of run, and step 5 is left out.

mod layout;

pub use layout::{RunLayout, SideFiles};

use crate::demux::DemuxPaths;
use crate::normalize::{score_corpus, BaselineMode, ScoreSummary};
use crate::tools::{self, format_command, LmSettings, StepOutcome, Toolchain};
use anyhow::{bail, Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Files a run reads
#[derive(Debug, Clone)]
pub struct RunInputs {
    /// Clean monolingual source-side text (source LM estimation)
    pub source_mono: PathBuf,
    /// Clean monolingual target-side text (target LM estimation)
    pub target_mono: PathBuf,
    /// Clean bitext (alignment model estimation)
    pub bitext: PathBuf,
    /// Clean development bitext (baseline statistics)
    pub dev: PathBuf,
    /// Noisy bitext to score
    pub input: PathBuf,
    /// Output directory
    pub output: PathBuf,
}

impl RunInputs {
    fn required_files(&self) -> [&Path; 5] {
        [
            &self.source_mono,
            &self.target_mono,
            &self.bitext,
            &self.dev,
            &self.input,
        ]
    }
}

/// Full scoring pipeline.
pub struct Pipeline {
    tools: Toolchain,
    lm: LmSettings,
    /// Print external commands instead of running them
    command_only: bool,
    /// Program name used when printing stage subcommands
    program: String,
}

impl Pipeline {
    pub fn new(tools: Toolchain, lm: LmSettings) -> Self {
        Self {
            tools,
            lm,
            command_only: false,
            program: env!("CARGO_PKG_NAME").to_string(),
        }
    }

    /// Print commands for steps 1-4 rather than running anything.
    pub fn command_only(mut self, enabled: bool) -> Self {
        self.command_only = enabled;
        self
    }

    /// Name printed for this program's own subcommands (`align`, `cut`).
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn is_command_only(&self) -> bool {
        self.command_only
    }

    /// Run the pipeline, printing commands to stdout in command-only mode.
    pub fn run(&self, inputs: &RunInputs) -> Result<RunStats> {
        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        self.run_with_output(inputs, &mut lock)
    }

    /// Run the pipeline, writing command-only output to `commands`.
    pub fn run_with_output<W: Write>(
        &self,
        inputs: &RunInputs,
        commands: &mut W,
    ) -> Result<RunStats> {
        self.preflight(inputs)?;
        let mut stats = RunStats::default();

        info!("Step 0: Create output directories");
        let layout = RunLayout::new(&inputs.output, self.lm.order);
        layout.create()?;

        info!("Step 1: Build source language model and score data");
        self.lm_step(inputs, &inputs.source_mono, &layout.source, 0, &mut stats, commands)?;

        info!("Step 2: Build target language model and score data");
        self.lm_step(inputs, &inputs.target_mono, &layout.target, 1, &mut stats, commands)?;

        info!("Step 3: Source-target word alignment");
        let forward = layout.forward_alignment(inputs);
        self.align_step(inputs, &forward, &layout.align_fe_log, false, &mut stats, commands)?;

        info!("Step 4: Target-source word alignment");
        let reverse = layout.reverse_alignment(inputs);
        self.align_step(inputs, &reverse, &layout.align_ef_log, true, &mut stats, commands)?;

        if self.command_only {
            return Ok(stats);
        }

        info!("Step 5: Calculate scores and standard deviations");
        let dev = score_corpus(
            &inputs.dev,
            &layout.dev_sources(),
            &BaselineMode::Compute {
                stats_out: layout.stats.clone(),
            },
            &layout.dev_scored,
        )
        .with_context(|| layout.score_diagnostic(&inputs.dev, &layout.dev_sources()))?;

        let input = score_corpus(
            &inputs.input,
            &layout.input_sources(),
            &BaselineMode::Precomputed {
                stats_in: layout.stats.clone(),
            },
            &layout.input_scored,
        )
        .with_context(|| layout.score_diagnostic(&inputs.input, &layout.input_sources()))?;

        stats.dev = Some(dev);
        stats.input = Some(input);
        stats.scored = Some(layout.input_scored.clone());

        info!(
            "Finished. Scored input text written to `{}`",
            layout.input_scored.display()
        );
        info!(
            "All other files in `{}` may be deleted.",
            inputs.output.display()
        );
        Ok(stats)
    }

    fn preflight(&self, inputs: &RunInputs) -> Result<()> {
        if !self.command_only {
            let missing = self.tools.missing();
            if !missing.is_empty() {
                let list: Vec<String> = missing
                    .iter()
                    .map(|(role, path)| format!("  {} `{}`", role, path.display()))
                    .collect();
                bail!(
                    "Missing binaries:\n{}\n{}",
                    list.join("\n"),
                    "Use --cdec or the [tools] config section to locate them."
                );
            }
        }

        if inputs.bitext == inputs.input {
            warn!("Using input data for model estimation.");
            warn!("Make sure this is intentional (no clean bitext available).");
        }

        for file in inputs.required_files() {
            if !file.exists() {
                bail!("File `{}` does not exist", file.display());
            }
        }
        Ok(())
    }

    fn lm_step<W: Write>(
        &self,
        inputs: &RunInputs,
        mono: &Path,
        files: &SideFiles,
        side: usize,
        stats: &mut RunStats,
        commands: &mut W,
    ) -> Result<()> {
        if self.command_only {
            let build = self.tools.lm_build_command(&self.lm, &files.tmp);
            let binary = self.tools.build_binary_command(&files.arpa, &files.lm);
            writeln!(
                commands,
                "$ {} <{} >{}",
                format_command(&build),
                mono.display(),
                files.arpa.display()
            )?;
            writeln!(commands, "$ {}", format_command(&binary))?;
            let query = format_command(&self.tools.query_command(&files.lm));
            for (text, out) in files.scored_texts(inputs) {
                writeln!(
                    commands,
                    "$ {} cut {} <{} | {} >{}",
                    self.program,
                    side,
                    text.display(),
                    query,
                    out.display()
                )?;
            }
            return Ok(());
        }

        let outcome = tools::build_lm(
            &self.tools,
            &self.lm,
            mono,
            &files.arpa,
            &files.lm,
            &files.tmp,
            &files.log,
        )
        .with_context(|| {
            format!(
                "Error estimating language model. Check `{}` and `{}`",
                self.tools.lmplz.display(),
                mono.display()
            )
        })?;
        stats.record(outcome);

        for (text, out) in files.scored_texts(inputs) {
            let outcome = tools::score_lm(&self.tools, &files.lm, text, side, out, &files.log)
                .with_context(|| {
                    format!(
                        "Error LM scoring data. Check `{}` and `{}`",
                        self.tools.ngram_query.display(),
                        text.display()
                    )
                })?;
            stats.record(outcome);
        }
        Ok(())
    }

    fn align_step<W: Write>(
        &self,
        inputs: &RunInputs,
        paths: &DemuxPaths,
        log: &Path,
        reverse: bool,
        stats: &mut RunStats,
        commands: &mut W,
    ) -> Result<()> {
        if self.command_only {
            let mut line = format!(
                "$ {} align {} {} {} {} {} {}",
                self.program,
                self.tools.fast_align.display(),
                inputs.bitext.display(),
                paths.reference.display(),
                paths.candidate.display(),
                paths.reference_out.display(),
                paths.candidate_out.display()
            );
            if reverse {
                line.push_str(" -r");
            }
            writeln!(commands, "{}", line)?;
            return Ok(());
        }

        let result = tools::word_align(&self.tools, &inputs.bitext, paths, log, reverse)
            .with_context(|| {
                format!(
                    "Error aligning data. Check `{}`, `{}`, `{}`, and `{}`",
                    self.tools.fast_align.display(),
                    inputs.bitext.display(),
                    paths.reference.display(),
                    paths.candidate.display()
                )
            })?;
        stats.record(match result {
            Some(_) => StepOutcome::Ran,
            None => StepOutcome::Reused,
        });
        Ok(())
    }
}

/// Statistics from one pipeline run.
#[derive(Default, Debug)]
pub struct RunStats {
    /// External steps that ran
    pub steps_run: usize,
    /// External steps whose outputs were already present
    pub steps_reused: usize,
    /// Reference scoring pass
    pub dev: Option<ScoreSummary>,
    /// Candidate scoring pass
    pub input: Option<ScoreSummary>,
    /// Final scored input file
    pub scored: Option<PathBuf>,
}

impl RunStats {
    fn record(&mut self, outcome: StepOutcome) {
        match outcome {
            StepOutcome::Ran => self.steps_run += 1,
            StepOutcome::Reused => self.steps_reused += 1,
        }
    }

    /// Get a summary string.
    pub fn summary(&self) -> String {
        let mut parts = vec![format!(
            "{} steps run, {} reused",
            self.steps_run, self.steps_reused
        )];
        if let Some(ref dev) = self.dev {
            parts.push(format!("{} dev lines", dev.lines));
        }
        if let Some(ref input) = self.input {
            parts.push(format!(
                "{} input lines ({} fallback scores)",
                input.lines,
                input.total_malformed()
            ));
        }
        parts.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tempfile::tempdir;

    fn inputs_in(dir: &Path) -> RunInputs {
        let inputs = RunInputs {
            source_mono: dir.join("mono.f"),
            target_mono: dir.join("mono.e"),
            bitext: dir.join("bitext.fe"),
            dev: dir.join("dev.fe"),
            input: dir.join("input.fe"),
            output: dir.join("out"),
        };
        for file in inputs.required_files() {
            std::fs::write(file, "a ||| b\n").unwrap();
        }
        inputs
    }

    fn toolchain(cdec: &Path) -> Toolchain {
        let mut config = Config::default();
        config.tools.cdec = Some(cdec.to_path_buf());
        Toolchain::from_config(&config)
    }

    #[test]
    fn test_pipeline_creation() {
        let pipeline = Pipeline::new(toolchain(Path::new("/c")), LmSettings::default())
            .command_only(true)
            .with_program("qe");
        assert!(pipeline.is_command_only());
        assert_eq!(pipeline.program, "qe");
    }

    #[test]
    fn test_missing_binaries_fail_before_work() {
        let dir = tempdir().unwrap();
        let inputs = inputs_in(dir.path());
        let pipeline = Pipeline::new(toolchain(&dir.path().join("nocdec")), LmSettings::default());

        let err = pipeline.run_with_output(&inputs, &mut Vec::new()).unwrap_err();
        assert!(err.to_string().contains("Missing binaries"), "{err}");
        assert!(!inputs.output.exists());
    }

    #[test]
    fn test_missing_input_is_fatal() {
        let dir = tempdir().unwrap();
        let inputs = inputs_in(dir.path());
        std::fs::remove_file(&inputs.dev).unwrap();
        let pipeline =
            Pipeline::new(toolchain(Path::new("/c")), LmSettings::default()).command_only(true);

        let err = pipeline.run_with_output(&inputs, &mut Vec::new()).unwrap_err();
        assert!(err.to_string().contains("dev.fe"), "{err}");
    }

    #[test]
    fn test_command_only_prints_steps() {
        let dir = tempdir().unwrap();
        let inputs = inputs_in(dir.path());
        let pipeline = Pipeline::new(toolchain(Path::new("/c")), LmSettings::default())
            .command_only(true)
            .with_program("qe-clean");

        let mut out = Vec::new();
        let stats = pipeline.run_with_output(&inputs, &mut out).unwrap();
        let printed = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = printed.lines().collect();

        // 2 x (build, binary, 2 queries) + 2 alignments
        assert_eq!(lines.len(), 10, "{printed}");
        assert!(lines[0].starts_with("$ /c/klm/lm/builder/builder -o 4 -T "));
        assert!(lines[1].contains("build_binary trie"));
        assert!(lines[2].starts_with("$ qe-clean cut 0 <"));
        assert!(lines[6].starts_with("$ qe-clean cut 1 <"));
        assert!(lines[8].starts_with("$ qe-clean align /c/word-aligner/fast_align "));
        assert!(!lines[8].ends_with(" -r"));
        assert!(lines[9].ends_with(" -r"));

        // Directories exist but nothing was scored
        assert!(inputs.output.join("files").is_dir());
        assert!(inputs.output.join("log").is_dir());
        assert!(stats.dev.is_none());
        assert!(!inputs.output.join("input.scored").exists());
    }

    #[test]
    fn test_run_stats_summary() {
        let mut stats = RunStats::default();
        stats.record(StepOutcome::Ran);
        stats.record(StepOutcome::Reused);
        stats.record(StepOutcome::Reused);
        assert_eq!(stats.summary(), "1 steps run, 2 reused");
    }
}
