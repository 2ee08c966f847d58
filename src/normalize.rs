//! Deficit-score normalization
//!
//! Combines the per-line feature streams positionally into one
//! [`FeatureVector`] per sentence and scores it against baseline statistics:
//! `dev_i = (mean_i - value_i) / stdev_i`. The sign is inverted relative to
//! a standard z-score, so a value below the reference mean scores positive
//! and a selection of `dev <= N` keeps sentences at or above average plus a
//! tolerance band below it.
//!
//! The reference run estimates and persists the baseline; the candidate run
//! loads it. Streams are paired by line number only and must all have the
//! same length.

use crate::error::{QeError, QeResult};
use crate::extract::{
    AlignCoverageScorer, AlignScoreScorer, LineScorer, LmScorer, ScoreStream, Side,
};
use crate::models::{Feature, FeatureVector, ScoredRecord, FEATURE_DIM};
use crate::stats::BaselineStatistics;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Score files for one corpus
#[derive(Debug, Clone)]
pub struct FeatureSources {
    /// LM query output for the source side
    pub lm_source: PathBuf,
    /// LM query output for the target side
    pub lm_target: PathBuf,
    /// Source-to-target alignment records
    pub align_forward: PathBuf,
    /// Target-to-source alignment records
    pub align_reverse: PathBuf,
}

impl FeatureSources {
    /// Open all six feature streams from the start, in [`Feature::all`] order
    pub fn open(&self) -> QeResult<FeatureStreams> {
        let stream =
            |path: &Path, scorer: Box<dyn LineScorer + Send>| ScoreStream::open(path, scorer);
        let score = AlignScoreScorer {
            denominator: Side::Target,
        };
        let coverage = AlignCoverageScorer {
            denominator: Side::Target,
        };
        Ok(FeatureStreams {
            streams: [
                stream(&self.lm_source, Box::new(LmScorer))?,
                stream(&self.lm_target, Box::new(LmScorer))?,
                stream(&self.align_forward, Box::new(score))?,
                stream(&self.align_reverse, Box::new(score))?,
                stream(&self.align_forward, Box::new(coverage))?,
                stream(&self.align_reverse, Box::new(coverage))?,
            ],
            line_no: 0,
        })
    }

    pub fn paths(&self) -> [&Path; 4] {
        [
            &self.lm_source,
            &self.lm_target,
            &self.align_forward,
            &self.align_reverse,
        ]
    }
}

type BoxedStream = ScoreStream<BufReader<File>, Box<dyn LineScorer + Send>>;

/// Six score streams advanced in lockstep
pub struct FeatureStreams {
    streams: [BoxedStream; FEATURE_DIM],
    line_no: usize,
}

impl FeatureStreams {
    /// Lines replaced by the fallback score, per feature
    pub fn malformed(&self) -> [usize; FEATURE_DIM] {
        let mut out = [0; FEATURE_DIM];
        for (slot, stream) in out.iter_mut().zip(&self.streams) {
            *slot = stream.malformed();
        }
        out
    }
}

impl Iterator for FeatureStreams {
    type Item = QeResult<FeatureVector>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut values = [0.0; FEATURE_DIM];
        let mut ended: Vec<&'static str> = Vec::new();
        for (i, stream) in self.streams.iter_mut().enumerate() {
            match stream.next() {
                Some(Ok(v)) => values[i] = v,
                Some(Err(e)) => return Some(Err(e)),
                None => ended.push(Feature::all()[i].name()),
            }
        }

        if ended.len() == FEATURE_DIM {
            return None;
        }
        self.line_no += 1;
        if !ended.is_empty() {
            let sources: Vec<String> = self
                .streams
                .iter()
                .zip(Feature::all())
                .filter(|(_, f)| ended.contains(&f.name()))
                .map(|(s, f)| format!("{} ({})", s.source().display(), f.name()))
                .collect();
            return Some(Err(QeError::LengthMismatch(format!(
                "{} ended before line {}",
                sources.join(", "),
                self.line_no
            ))));
        }
        Some(Ok(FeatureVector(values)))
    }
}

/// Where the baseline comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaselineMode {
    /// Reference run: estimate from this corpus and save to `stats_out`
    Compute { stats_out: PathBuf },
    /// Candidate run: load from `stats_in`
    Precomputed { stats_in: PathBuf },
}

impl BaselineMode {
    /// Exactly one of the two paths must be given
    pub fn from_paths(stats_in: Option<PathBuf>, stats_out: Option<PathBuf>) -> QeResult<Self> {
        match (stats_in, stats_out) {
            (None, Some(stats_out)) => Ok(BaselineMode::Compute { stats_out }),
            (Some(stats_in), None) => Ok(BaselineMode::Precomputed { stats_in }),
            _ => Err(QeError::BaselineMode),
        }
    }
}

/// Outcome of one scoring pass
#[derive(Debug, Clone)]
pub struct ScoreSummary {
    pub lines: usize,
    pub baseline: BaselineStatistics,
    /// Fallback substitutions, per feature
    pub malformed: [usize; FEATURE_DIM],
}

impl ScoreSummary {
    pub fn total_malformed(&self) -> usize {
        self.malformed.iter().sum()
    }
}

/// Score every line of `text` against the baseline and write
/// `text ||| features ||| deviations` to `out`.
pub fn score_corpus(
    text: &Path,
    sources: &FeatureSources,
    mode: &BaselineMode,
    out: &Path,
) -> QeResult<ScoreSummary> {
    info!("Calculating scores for {}", text.display());

    let baseline = match mode {
        BaselineMode::Compute { .. } => BaselineStatistics::estimate(sources.open()?, text)?,
        BaselineMode::Precomputed { stats_in } => BaselineStatistics::load(stats_in)?,
    };

    if !text.exists() {
        return Err(QeError::MissingFile(text.to_path_buf()));
    }
    let input = File::open(text).map_err(|e| QeError::io(text, e))?;
    let output = File::create(out).map_err(|e| QeError::io(out, e))?;

    let mut features = sources.open()?;
    let lines = write_scored(
        BufReader::new(input),
        &mut features,
        &baseline,
        output,
        text,
        out,
    )?;

    // Only a fully scored reference set leaves a baseline behind
    if let BaselineMode::Compute { stats_out } = mode {
        baseline.save(stats_out)?;
        info!("Saved baseline statistics to {}", stats_out.display());
    }

    let summary = ScoreSummary {
        lines,
        baseline,
        malformed: features.malformed(),
    };
    info!(
        "Wrote {} scored lines to {} ({} fallback scores)",
        summary.lines,
        out.display(),
        summary.total_malformed()
    );
    Ok(summary)
}

/// Pair text lines with feature vectors and write scored records
fn write_scored<R, I, W>(
    text: R,
    features: &mut I,
    baseline: &BaselineStatistics,
    out: W,
    text_path: &Path,
    out_path: &Path,
) -> QeResult<usize>
where
    R: BufRead,
    I: Iterator<Item = QeResult<FeatureVector>>,
    W: Write,
{
    let mut writer = BufWriter::new(out);
    let mut count = 0;

    for line in text.lines() {
        let line = line.map_err(|e| QeError::io(text_path, e))?;
        let vector = match features.next() {
            Some(v) => v?,
            None => {
                return Err(QeError::LengthMismatch(format!(
                    "score files ended before line {} of `{}`",
                    count + 1,
                    text_path.display()
                )))
            }
        };
        let record = ScoredRecord {
            text: line.trim().to_string(),
            features: vector,
            deviations: vector.deficit(baseline),
        };
        writeln!(writer, "{}", record).map_err(|e| QeError::io(out_path, e))?;
        count += 1;
    }

    if let Some(extra) = features.next() {
        extra?;
        return Err(QeError::LengthMismatch(format!(
            "`{}` has {} lines but the score files have more",
            text_path.display(),
            count
        )));
    }

    writer.flush().map_err(|e| QeError::io(out_path, e))?;
    Ok(count)
}
