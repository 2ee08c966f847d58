//! Language-model query output
//!
//! The query tool prints one line per sentence:
//!
//! ```text
//! w_1=id n logprob w_2=id n logprob ... Total: logprob OOV: n
//! ```
//!
//! Every word contributes three tokens and the trailing summary four. The
//! first word is scored against `<s>` and one extra transition to `</s>` is
//! scored at the end, so a line with `t` tokens covers `(t - 4) / 3 + 1`
//! n-grams.

use super::LineScorer;
use crate::error::MalformedLine;

/// Length-normalized log-probability: `Total / n-gram count`
#[derive(Debug, Clone, Copy, Default)]
pub struct LmScorer;

impl LineScorer for LmScorer {
    fn label(&self) -> &'static str {
        "lm score"
    }

    fn score(&self, line: &str) -> Result<f64, MalformedLine> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 4 {
            return Err(MalformedLine::new(format!(
                "expected at least 4 tokens, found {}",
                tokens.len()
            )));
        }
        let ngrams = (tokens.len() - 4) / 3 + 1;
        // Positional read: the value two tokens before `OOV:`
        let total = tokens[tokens.len() - 3];
        let log_prob = total
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| {
                MalformedLine::new(format!("invalid total log-probability `{}`", total))
            })?;
        Ok(log_prob / ngrams as f64)
    }
}
