//! `|||`-delimited field handling shared by every line format

use crate::error::{QeError, QeResult};
use memchr::memmem;
use std::io::{BufRead, Write};
use std::path::Path;
use tracing::warn;

/// Separator between fields of parallel and scored records
pub const SEPARATOR: &str = "|||";

/// Split a line on [`SEPARATOR`]. Fields are returned untrimmed; a line
/// without a separator yields a single field.
pub fn split_fields(line: &str) -> Vec<&str> {
    let mut fields = Vec::with_capacity(4);
    let mut start = 0;
    for pos in memmem::find_iter(line.as_bytes(), SEPARATOR.as_bytes()) {
        fields.push(&line[start..pos]);
        start = pos + SEPARATOR.len();
    }
    fields.push(&line[start..]);
    fields
}

/// Trimmed field `index` of a line, if present
pub fn cut_field(line: &str, index: usize) -> Option<&str> {
    split_fields(line).get(index).map(|f| f.trim())
}

/// Write field `index` of every input line, one output line per input line.
///
/// A line without that field becomes an empty line, so the output stays
/// positionally aligned with the input. `source` and `sink` name the
/// streams in diagnostics.
pub fn cut_lines<R, W>(
    input: R,
    mut output: W,
    index: usize,
    source: &Path,
    sink: &Path,
) -> QeResult<usize>
where
    R: BufRead,
    W: Write,
{
    let mut count = 0;
    for (i, line) in input.lines().enumerate() {
        let line = line.map_err(|e| QeError::io(source, e))?;
        let field = cut_field(&line, index).unwrap_or_else(|| {
            warn!(
                "Line {} of {} has no field {}, writing an empty line",
                i + 1,
                source.display(),
                index
            );
            ""
        });
        writeln!(output, "{}", field).map_err(|e| QeError::io(sink, e))?;
        count += 1;
    }
    output.flush().map_err(|e| QeError::io(sink, e))?;
    Ok(count)
}

/// Join fields with a padded separator, the form every writer emits
pub fn join_fields<I, S>(fields: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for (i, field) in fields.into_iter().enumerate() {
        if i > 0 {
            out.push_str(" ||| ");
        }
        out.push_str(field.as_ref());
    }
    out
}
