//! Core data models for scored sentence pairs

use crate::error::MalformedLine;
use crate::fields::{join_fields, split_fields};
use crate::stats::BaselineStatistics;
use std::fmt;
use std::ops::Index;

/// Number of feature dimensions. Every vector in the pipeline has exactly
/// this many positions, in [`Feature::all`] order.
pub const FEATURE_DIM: usize = 6;

/// One feature dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    /// Length-normalized LM log-probability of the source side
    LmSource,
    /// Length-normalized LM log-probability of the target side
    LmTarget,
    /// Per-word alignment log-score, source to target
    AlignScoreForward,
    /// Per-word alignment log-score, target to source
    AlignScoreReverse,
    /// Fraction of linked words, source to target
    AlignCoverageForward,
    /// Fraction of linked words, target to source
    AlignCoverageReverse,
}

impl Feature {
    pub fn all() -> &'static [Feature; FEATURE_DIM] {
        &[
            Feature::LmSource,
            Feature::LmTarget,
            Feature::AlignScoreForward,
            Feature::AlignScoreReverse,
            Feature::AlignCoverageForward,
            Feature::AlignCoverageReverse,
        ]
    }

    /// Position of this feature in every vector
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(&self) -> &'static str {
        match self {
            Feature::LmSource => "lm_src",
            Feature::LmTarget => "lm_tgt",
            Feature::AlignScoreForward => "al_score_fwd",
            Feature::AlignScoreReverse => "al_score_rev",
            Feature::AlignCoverageForward => "al_coverage_fwd",
            Feature::AlignCoverageReverse => "al_coverage_rev",
        }
    }
}

/// Parse exactly [`FEATURE_DIM`] whitespace-separated floats
fn parse_six(field: &str, what: &str) -> Result<[f64; FEATURE_DIM], MalformedLine> {
    let mut values = [0.0; FEATURE_DIM];
    let mut count = 0;
    for token in field.split_whitespace() {
        if count == FEATURE_DIM {
            return Err(MalformedLine::new(format!(
                "expected {} {}, found more",
                FEATURE_DIM, what
            )));
        }
        values[count] = token
            .parse()
            .map_err(|_| MalformedLine::new(format!("invalid number `{}` in {}", token, what)))?;
        count += 1;
    }
    if count != FEATURE_DIM {
        return Err(MalformedLine::new(format!(
            "expected {} {}, found {}",
            FEATURE_DIM, what, count
        )));
    }
    Ok(values)
}

fn write_six(f: &mut fmt::Formatter<'_>, values: &[f64; FEATURE_DIM]) -> fmt::Result {
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            f.write_str(" ")?;
        }
        write!(f, "{}", v)?;
    }
    Ok(())
}

/// Raw per-sentence features
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector(pub [f64; FEATURE_DIM]);

impl FeatureVector {
    pub fn values(&self) -> &[f64; FEATURE_DIM] {
        &self.0
    }

    /// Deficit score against a baseline: `(mean - value) / stdev` per
    /// dimension. Positive means the value is below the reference mean.
    pub fn deficit(&self, baseline: &BaselineStatistics) -> DeviationVector {
        let mut out = [0.0; FEATURE_DIM];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = (baseline.means[i] - self.0[i]) / baseline.stdevs[i];
        }
        DeviationVector(out)
    }

    pub fn parse(field: &str) -> Result<Self, MalformedLine> {
        parse_six(field, "features").map(FeatureVector)
    }
}

impl Index<Feature> for FeatureVector {
    type Output = f64;

    fn index(&self, feature: Feature) -> &f64 {
        &self.0[feature.index()]
    }
}

impl fmt::Display for FeatureVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_six(f, &self.0)
    }
}

/// Deficit scores, one per feature dimension
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviationVector(pub [f64; FEATURE_DIM]);

impl DeviationVector {
    pub fn values(&self) -> &[f64; FEATURE_DIM] {
        &self.0
    }

    /// Largest deviation; NaN if any dimension is NaN
    pub fn max(&self) -> f64 {
        self.0.iter().copied().fold(f64::NEG_INFINITY, |acc, v| {
            if v.is_nan() || acc.is_nan() {
                f64::NAN
            } else {
                acc.max(v)
            }
        })
    }

    /// Every dimension is at or below the threshold
    pub fn within(&self, threshold: f64) -> bool {
        self.0.iter().all(|&d| d <= threshold)
    }

    pub fn parse(field: &str) -> Result<Self, MalformedLine> {
        parse_six(field, "deviations").map(DeviationVector)
    }
}

impl Index<Feature> for DeviationVector {
    type Output = f64;

    fn index(&self, feature: Feature) -> &f64 {
        &self.0[feature.index()]
    }
}

impl fmt::Display for DeviationVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_six(f, &self.0)
    }
}

/// One line of parallel text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentencePair {
    pub source: String,
    pub target: String,
}

impl SentencePair {
    /// Parse `source ||| target`
    pub fn parse(text: &str) -> Result<Self, MalformedLine> {
        match split_fields(text).as_slice() {
            [source, target] => Ok(SentencePair {
                source: source.trim().to_string(),
                target: target.trim().to_string(),
            }),
            fields => Err(MalformedLine::new(format!(
                "expected `source ||| target`, found {} field(s)",
                fields.len()
            ))),
        }
    }
}

impl fmt::Display for SentencePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ||| {}", self.source, self.target)
    }
}

/// Text plus its raw features and deficit scores; one line of a scored file
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    /// Original text, trimmed
    pub text: String,
    pub features: FeatureVector,
    pub deviations: DeviationVector,
}

impl ScoredRecord {
    /// Parse `text ||| features ||| deviations`. The text part may itself
    /// contain separators; the last two fields are always the vectors.
    pub fn parse(line: &str) -> Result<Self, MalformedLine> {
        let fields = split_fields(line);
        if fields.len() < 3 {
            return Err(MalformedLine::new(format!(
                "expected `text ||| features ||| deviations`, found {} field(s)",
                fields.len()
            )));
        }
        let n = fields.len();
        let deviations = DeviationVector::parse(fields[n - 1])?;
        let features = FeatureVector::parse(fields[n - 2])?;
        let text = join_fields(fields[..n - 2].iter().map(|f| f.trim()));
        Ok(ScoredRecord {
            text,
            features,
            deviations,
        })
    }

    /// The text as a sentence pair
    pub fn pair(&self) -> Result<SentencePair, MalformedLine> {
        SentencePair::parse(&self.text)
    }
}

impl fmt::Display for ScoredRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ||| {} ||| {}", self.text, self.features, self.deviations)
    }
}
