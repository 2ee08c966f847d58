//! Aligner output records
//!
//! ```text
//! src words ||| tgt words ||| 0-0 1-2 2-1 ||| -12.73
//! ```

use super::LineScorer;
use crate::error::MalformedLine;
use crate::fields::split_fields;
use std::collections::HashSet;

/// Which side's word count normalizes a score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Side {
    Source,
    #[default]
    Target,
}

/// One parsed alignment line
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentRecord {
    pub source_words: usize,
    pub target_words: usize,
    /// (source index, target index) pairs
    pub links: Vec<(usize, usize)>,
    /// Aligner log-score
    pub score: f64,
}

impl AlignmentRecord {
    pub fn parse(line: &str) -> Result<Self, MalformedLine> {
        let fields = split_fields(line);
        let [source, target, links, score] = fields.as_slice() else {
            return Err(MalformedLine::new(format!(
                "expected 4 `|||` fields, found {}",
                fields.len()
            )));
        };

        let links = links
            .split_whitespace()
            .map(parse_link)
            .collect::<Result<Vec<_>, _>>()?;
        let score = score
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| MalformedLine::new(format!("invalid score `{}`", score.trim())))?;

        Ok(Self {
            source_words: source.split_whitespace().count(),
            target_words: target.split_whitespace().count(),
            links,
            score,
        })
    }

    pub fn words(&self, side: Side) -> usize {
        match side {
            Side::Source => self.source_words,
            Side::Target => self.target_words,
        }
    }

    /// Distinct source positions that take part in at least one link
    pub fn linked_source_words(&self) -> usize {
        self.links
            .iter()
            .map(|(s, _)| *s)
            .collect::<HashSet<_>>()
            .len()
    }

    fn denominator(&self, side: Side) -> Result<f64, MalformedLine> {
        match self.words(side) {
            0 => Err(MalformedLine::new(format!("no {:?} words", side).to_lowercase())),
            n => Ok(n as f64),
        }
    }
}

fn parse_link(token: &str) -> Result<(usize, usize), MalformedLine> {
    let bad = || MalformedLine::new(format!("invalid link `{}`", token));
    let (s, t) = token.split_once('-').ok_or_else(bad)?;
    Ok((s.parse().map_err(|_| bad())?, t.parse().map_err(|_| bad())?))
}

/// Per-word alignment log-score
#[derive(Debug, Clone, Copy, Default)]
pub struct AlignScoreScorer {
    pub denominator: Side,
}

impl LineScorer for AlignScoreScorer {
    fn label(&self) -> &'static str {
        "alignment score"
    }

    fn score(&self, line: &str) -> Result<f64, MalformedLine> {
        let record = AlignmentRecord::parse(line)?;
        Ok(record.score / record.denominator(self.denominator)?)
    }
}

/// Fraction of linked source words
#[derive(Debug, Clone, Copy, Default)]
pub struct AlignCoverageScorer {
    pub denominator: Side,
}

impl LineScorer for AlignCoverageScorer {
    fn label(&self) -> &'static str {
        "alignment coverage"
    }

    fn score(&self, line: &str) -> Result<f64, MalformedLine> {
        let record = AlignmentRecord::parse(line)?;
        Ok(record.linked_source_words() as f64 / record.denominator(self.denominator)?)
    }
}
