//! Score extraction from raw per-line tool output
//!
//! Each extractor turns one line of an LM query or alignment file into one
//! scalar. A [`ScoreStream`] applies a [`LineScorer`] lazily over a file,
//! one value per line, in order. A line the scorer rejects is logged and
//! replaced by [`FALLBACK_SCORE`] so that a single corrupt record never
//! costs a full pass over a large corpus.
//!
//! Streams are restarted by reopening the file.

mod alignment;
mod lm;

pub use alignment::{AlignCoverageScorer, AlignScoreScorer, AlignmentRecord, Side};
pub use lm::LmScorer;

use crate::error::{MalformedLine, QeError, QeResult};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Value substituted for a malformed line
pub const FALLBACK_SCORE: f64 = 0.0;

/// Turns one line of tool output into a score
pub trait LineScorer {
    /// Short label used in diagnostics
    fn label(&self) -> &'static str;

    fn score(&self, line: &str) -> Result<f64, MalformedLine>;
}

impl<S: LineScorer + ?Sized> LineScorer for Box<S> {
    fn label(&self) -> &'static str {
        (**self).label()
    }

    fn score(&self, line: &str) -> Result<f64, MalformedLine> {
        (**self).score(line)
    }
}

/// Lazy per-line scores over a reader
pub struct ScoreStream<R, S> {
    reader: R,
    scorer: S,
    source: PathBuf,
    line_no: usize,
    buf: String,
    malformed: usize,
}

impl<S: LineScorer> ScoreStream<BufReader<File>, S> {
    /// Open a score file from the beginning
    pub fn open(path: &Path, scorer: S) -> QeResult<Self> {
        if !path.exists() {
            return Err(QeError::MissingFile(path.to_path_buf()));
        }
        let file = File::open(path).map_err(|e| QeError::io(path, e))?;
        Ok(Self::new(BufReader::new(file), scorer, path))
    }
}

impl<R: BufRead, S: LineScorer> ScoreStream<R, S> {
    /// Wrap any buffered reader. `source` names it in diagnostics.
    pub fn new(reader: R, scorer: S, source: impl Into<PathBuf>) -> Self {
        Self {
            reader,
            scorer,
            source: source.into(),
            line_no: 0,
            buf: String::new(),
            malformed: 0,
        }
    }

    /// Path or label of the underlying input
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Lines replaced by the fallback so far
    pub fn malformed(&self) -> usize {
        self.malformed
    }
}

impl<R: BufRead, S: LineScorer> Iterator for ScoreStream<R, S> {
    type Item = QeResult<f64>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        match self.reader.read_line(&mut self.buf) {
            Ok(0) => None,
            Ok(_) => {
                self.line_no += 1;
                let line = self.buf.trim_end_matches(['\n', '\r']);
                match self.scorer.score(line) {
                    Ok(score) => Some(Ok(score)),
                    Err(reason) => {
                        self.malformed += 1;
                        warn!(
                            "Bad {} line {} in {}, assigning {}: {} ({})",
                            self.scorer.label(),
                            self.line_no,
                            self.source.display(),
                            FALLBACK_SCORE,
                            reason,
                            line.trim()
                        );
                        Some(Ok(FALLBACK_SCORE))
                    }
                }
            }
            Err(e) => Some(Err(QeError::io(&self.source, e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct Length;

    impl LineScorer for Length {
        fn label(&self) -> &'static str {
            "length"
        }

        fn score(&self, line: &str) -> Result<f64, MalformedLine> {
            if line.is_empty() {
                return Err(MalformedLine::new("empty"));
            }
            Ok(line.len() as f64)
        }
    }

    #[test]
    fn test_stream_yields_one_value_per_line() {
        let input = Cursor::new("abc\n\nhello\r\nxy");
        let mut stream = ScoreStream::new(input, Length, "mem");
        let scores: Vec<f64> = stream.by_ref().map(|s| s.unwrap()).collect();
        assert_eq!(scores, vec![3.0, FALLBACK_SCORE, 5.0, 2.0]);
        assert_eq!(stream.malformed(), 1);
    }

    #[test]
    fn test_boxed_scorer() {
        let scorer: Box<dyn LineScorer> = Box::new(Length);
        let stream = ScoreStream::new(Cursor::new("a\nbb\n"), scorer, "mem");
        let scores: Vec<f64> = stream.map(|s| s.unwrap()).collect();
        assert_eq!(scores, vec![1.0, 2.0]);
    }

    #[test]
    fn test_reopen_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scores");
        std::fs::write(&path, "aaaa\nbb\n").unwrap();

        let first: Vec<f64> = ScoreStream::open(&path, Length)
            .unwrap()
            .map(|s| s.unwrap())
            .collect();
        let second: Vec<f64> = ScoreStream::open(&path, Length)
            .unwrap()
            .map(|s| s.unwrap())
            .collect();
        assert_eq!(first, vec![4.0, 2.0]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_open_missing_file() {
        let err = ScoreStream::open(Path::new("/nonexistent/scores"), Length).err();
        assert!(matches!(err, Some(QeError::MissingFile(_))));
    }
}
