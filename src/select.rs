//! Threshold selection over scored records

use crate::error::{QeError, QeResult};
use crate::models::ScoredRecord;
use std::io::{BufRead, Write};
use std::path::Path;
use tracing::warn;

/// Counts from one selection pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectStats {
    pub read: usize,
    pub selected: usize,
    /// Lines excluded because they could not be parsed
    pub malformed: usize,
}

impl SelectStats {
    pub fn rejected(&self) -> usize {
        self.read - self.selected - self.malformed
    }
}

/// A record is kept iff every deficit score is at or below `threshold`
pub fn is_selected(record: &ScoredRecord, threshold: f64) -> bool {
    record.deviations.within(threshold)
}

/// Write `source ||| target` for every scored line within `threshold`.
///
/// `source` and `sink` name the streams in diagnostics.
pub fn select<R, W>(
    input: R,
    mut output: W,
    threshold: f64,
    source: &Path,
    sink: &Path,
) -> QeResult<SelectStats>
where
    R: BufRead,
    W: Write,
{
    let mut stats = SelectStats::default();

    for (i, line) in input.lines().enumerate() {
        let line = line.map_err(|e| QeError::io(source, e))?;
        stats.read += 1;

        let parsed = ScoredRecord::parse(&line).and_then(|r| Ok((r.pair()?, r)));
        let (pair, record) = match parsed {
            Ok(v) => v,
            Err(reason) => {
                stats.malformed += 1;
                warn!("Bad line {}, excluding: {} ({})", i + 1, reason, line.trim());
                continue;
            }
        };

        if is_selected(&record, threshold) {
            writeln!(output, "{}", pair).map_err(|e| QeError::io(sink, e))?;
            stats.selected += 1;
        }
    }

    output.flush().map_err(|e| QeError::io(sink, e))?;
    Ok(stats)
}
