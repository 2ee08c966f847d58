//! Single-stage commands: align, score, select, cut
//!
//! Each runs one piece of the pipeline on its own, so a run can be
//! reproduced or distributed step by step.

use anyhow::{Context, Result};
use qe_clean::config::Config;
use qe_clean::demux::{demultiplex, DemuxPaths};
use qe_clean::fields::cut_lines;
use qe_clean::normalize::{score_corpus, BaselineMode, FeatureSources};
use qe_clean::select::select as select_lines;
use qe_clean::tools::{format_command, Toolchain};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const STDIN: &str = "<stdin>";
const STDOUT: &str = "<stdout>";

pub fn align(aligner: &Path, corpus: &Path, paths: DemuxPaths, reverse: bool) -> Result<()> {
    let mut config = Config::default();
    config.tools.fast_align = Some(aligner.to_path_buf());
    let mut cmd = Toolchain::from_config(&config).align_command(corpus, reverse);
    debug!("$ {}", format_command(&cmd));

    let stats = demultiplex(&mut cmd, &paths).with_context(|| {
        format!(
            "Error aligning data. Check `{}`, `{}`, `{}`, and `{}`",
            aligner.display(),
            corpus.display(),
            paths.reference.display(),
            paths.candidate.display()
        )
    })?;
    info!(
        "Aligned {} dev and {} input lines",
        stats.reference_out, stats.candidate_out
    );
    Ok(())
}

pub fn score(
    text: &Path,
    sources: FeatureSources,
    stats_in: Option<PathBuf>,
    stats_out: Option<PathBuf>,
    output: &Path,
) -> Result<()> {
    let mode = BaselineMode::from_paths(stats_in, stats_out)?;
    let summary = score_corpus(text, &sources, &mode, output)?;
    for (feature, count) in qe_clean::models::Feature::all().iter().zip(summary.malformed) {
        if count > 0 {
            info!("{}: {} lines scored with the fallback", feature.name(), count);
        }
    }
    Ok(())
}

pub fn select(threshold: f64) -> Result<()> {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let stats = select_lines(
        stdin.lock(),
        BufWriter::new(stdout.lock()),
        threshold,
        Path::new(STDIN),
        Path::new(STDOUT),
    )?;
    info!(
        "Selected {} of {} lines ({} rejected, {} malformed)",
        stats.selected,
        stats.read,
        stats.rejected(),
        stats.malformed
    );
    Ok(())
}

pub fn cut(field: usize) -> Result<()> {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    cut_lines(stdin.lock(), &mut out, field, Path::new(STDIN), Path::new(STDOUT))?;
    out.flush()?;
    Ok(())
}
