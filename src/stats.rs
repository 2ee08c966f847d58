//! Baseline statistics estimated from the trusted reference set
//!
//! One (mean, population stdev) pair per feature dimension. The file form
//! is two lines of whitespace-separated floats: means, then stdevs.

use crate::error::{QeError, QeResult};
use crate::models::{Feature, FeatureVector, FEATURE_DIM};
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub struct BaselineStatistics {
    pub means: [f64; FEATURE_DIM],
    pub stdevs: [f64; FEATURE_DIM],
    /// Number of reference lines, when estimated in this process
    pub count: Option<usize>,
}

/// Running mean and sum of squared deviations (Welford)
#[derive(Debug, Default, Clone, Copy)]
struct Accumulator {
    count: usize,
    mean: f64,
    m2: f64,
}

impl Accumulator {
    fn push(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    fn population_stdev(&self) -> f64 {
        (self.m2 / self.count as f64).sqrt()
    }
}

impl BaselineStatistics {
    /// Build from explicit values, rejecting degenerate dimensions
    pub fn new(means: [f64; FEATURE_DIM], stdevs: [f64; FEATURE_DIM]) -> QeResult<Self> {
        let stats = Self {
            means,
            stdevs,
            count: None,
        };
        stats.validate()?;
        Ok(stats)
    }

    /// Every mean must be finite and every stdev finite and positive
    fn validate(&self) -> QeResult<()> {
        for feature in Feature::all() {
            let (mean, stdev) = (self.mean(*feature), self.stdev(*feature));
            if !mean.is_finite() {
                return Err(QeError::InvalidBaseline {
                    feature: feature.name(),
                    statistic: "mean",
                    value: mean,
                });
            }
            if stdev == 0.0 {
                return Err(QeError::ZeroStdev {
                    feature: feature.name(),
                });
            }
            if !(stdev.is_finite() && stdev > 0.0) {
                return Err(QeError::InvalidBaseline {
                    feature: feature.name(),
                    statistic: "stdev",
                    value: stdev,
                });
            }
        }
        Ok(())
    }

    /// Consume the whole reference feature stream and estimate per-dimension
    /// mean and population standard deviation.
    ///
    /// `source` names the reference set in diagnostics.
    pub fn estimate<I>(features: I, source: &Path) -> QeResult<Self>
    where
        I: IntoIterator<Item = QeResult<FeatureVector>>,
    {
        let mut acc = [Accumulator::default(); FEATURE_DIM];
        for vector in features {
            let vector = vector?;
            for (slot, value) in acc.iter_mut().zip(vector.values()) {
                slot.push(*value);
            }
        }

        let count = acc[0].count;
        if count == 0 {
            return Err(QeError::EmptyReference(source.to_path_buf()));
        }

        let mut means = [0.0; FEATURE_DIM];
        let mut stdevs = [0.0; FEATURE_DIM];
        for i in 0..FEATURE_DIM {
            means[i] = acc[i].mean;
            stdevs[i] = acc[i].population_stdev();
        }

        let mut stats = Self::new(means, stdevs)?;
        stats.count = Some(count);

        info!(
            "Estimated baseline from {} reference lines of {}",
            count,
            source.display()
        );
        for feature in Feature::all() {
            info!(
                "  {:<16} mean={:.4}, stdev={:.4}",
                feature.name(),
                stats.means[feature.index()],
                stats.stdevs[feature.index()]
            );
        }

        Ok(stats)
    }

    /// Write means and stdevs as two lines
    pub fn save(&self, path: &Path) -> QeResult<()> {
        let join = |values: &[f64; FEATURE_DIM]| {
            values
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(" ")
        };
        let content = format!("{}\n{}\n", join(&self.means), join(&self.stdevs));
        std::fs::write(path, content).map_err(|e| QeError::io(path, e))
    }

    /// Read a statistics file written by [`save`](Self::save)
    pub fn load(path: &Path) -> QeResult<Self> {
        if !path.exists() {
            return Err(QeError::MissingFile(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|e| QeError::io(path, e))?;
        Self::parse(&content).map_err(|reason| QeError::StatsFormat {
            path: path.to_path_buf(),
            reason,
        })?
    }

    /// Parse the two-line form. The outer error is a format problem; the
    /// inner result carries the zero-stdev check.
    fn parse(content: &str) -> Result<QeResult<Self>, String> {
        let mut lines = content.lines().filter(|l| !l.trim().is_empty());
        let means = parse_row(lines.next(), "means")?;
        let stdevs = parse_row(lines.next(), "standard deviations")?;
        if lines.next().is_some() {
            return Err("expected exactly two lines".to_string());
        }
        Ok(Self::new(means, stdevs))
    }

    pub fn mean(&self, feature: Feature) -> f64 {
        self.means[feature.index()]
    }

    pub fn stdev(&self, feature: Feature) -> f64 {
        self.stdevs[feature.index()]
    }
}

fn parse_row(line: Option<&str>, what: &str) -> Result<[f64; FEATURE_DIM], String> {
    let line = line.ok_or_else(|| format!("missing line of {}", what))?;
    let values: Vec<f64> = line
        .split_whitespace()
        .map(|t| {
            t.parse::<f64>()
                .map_err(|_| format!("invalid number `{}` in {}", t, what))
        })
        .collect::<Result<_, _>>()?;
    values.try_into().map_err(|v: Vec<f64>| {
        format!(
            "expected {} {}, found {}",
            FEATURE_DIM,
            what,
            v.len()
        )
    })
}
