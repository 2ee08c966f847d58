//! Stream demultiplexer for line-oriented external processes
//!
//! Feeds a reference file followed by a candidate file into a subprocess
//! and splits its single output stream back into two files at the
//! reference line count.
//!
//! Writing and reading overlap: a background thread drains the process's
//! stdout while the calling thread fills its stdin. The process may start
//! emitting output before it has consumed all input, and both pipes have a
//! finite buffer, so a write-everything-then-read ordering can block the
//! writer on a full stdin while the process blocks on a full stdout.
//!
//! ```text
//!   reference ─┐                      ┌─ first L_ref lines ─▶ reference_out
//!              ├─▶ stdin  [process]  stdout
//!   candidate ─┘                      └─ remaining lines ───▶ candidate_out
//! ```

use crate::error::{QeError, QeResult};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use tracing::{debug, info};

/// Line counts observed by the demultiplexer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DemuxStats {
    /// Reference lines written to the process
    pub reference_in: usize,
    /// Candidate lines written to the process
    pub candidate_in: usize,
    /// Output lines routed to the reference file
    pub reference_out: usize,
    /// Output lines routed to the candidate file
    pub candidate_out: usize,
}

impl DemuxStats {
    pub fn is_balanced(&self) -> bool {
        self.reference_in == self.reference_out && self.candidate_in == self.candidate_out
    }
}

/// Inputs and outputs for one demultiplexed run
#[derive(Debug, Clone)]
pub struct DemuxPaths {
    pub reference: PathBuf,
    pub candidate: PathBuf,
    pub reference_out: PathBuf,
    pub candidate_out: PathBuf,
}

/// Count lines in a file, including a final line without a newline
pub fn count_lines(path: &Path) -> QeResult<usize> {
    let file = File::open(path).map_err(|e| QeError::io(path, e))?;
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();
    let mut count = 0;
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => return Ok(count),
            Ok(_) => count += 1,
            Err(e) => return Err(QeError::io(path, e)),
        }
    }
}

/// Run `command` over the concatenation of reference and candidate and
/// split its output at the reference line count.
///
/// The command's stdin and stdout are replaced with pipes; its stderr is
/// left as configured by the caller. A non-zero exit status or an output
/// line count that does not match the input is fatal.
pub fn demultiplex(command: &mut Command, paths: &DemuxPaths) -> QeResult<DemuxStats> {
    for input in [&paths.reference, &paths.candidate] {
        if !input.exists() {
            return Err(QeError::MissingFile(input.clone()));
        }
    }

    let program = command.get_program().to_string_lossy().to_string();
    let reference_lines = count_lines(&paths.reference)?;

    // Create outputs up front so an empty side still produces a file
    let reference_out =
        File::create(&paths.reference_out).map_err(|e| QeError::io(&paths.reference_out, e))?;
    let candidate_out =
        File::create(&paths.candidate_out).map_err(|e| QeError::io(&paths.candidate_out, e))?;

    debug!(
        "Demultiplexing {} through {} ({} reference lines)",
        paths.candidate.display(),
        program,
        reference_lines
    );

    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .map_err(|source| QeError::Spawn {
            program: program.clone(),
            source,
        })?;

    let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
        // Both pipes were requested above
        let _ = child.kill();
        let _ = child.wait();
        return Err(QeError::Spawn {
            program,
            source: std::io::Error::other("process pipes unavailable"),
        });
    };

    let split_paths = (paths.reference_out.clone(), paths.candidate_out.clone());
    let reader = thread::spawn(move || {
        split_output(
            stdout,
            reference_lines,
            (reference_out, &split_paths.0),
            (candidate_out, &split_paths.1),
        )
    });

    let written = feed_input(stdin, &paths.reference, &paths.candidate);

    let status = child.wait().map_err(|e| QeError::Spawn {
        program: program.clone(),
        source: e,
    })?;
    let routed = reader
        .join()
        .map_err(|_| {
            let panicked = std::io::Error::other("output reader panicked");
            QeError::io(&paths.reference_out, panicked)
        })?;

    if !status.success() {
        return Err(QeError::ProcessFailed {
            program,
            status: status.to_string(),
            inputs: format!(
                "`{}` and `{}`",
                paths.reference.display(),
                paths.candidate.display()
            ),
        });
    }

    let (reference_out, candidate_out) = routed?;
    let stats = match written {
        Ok((reference_in, candidate_in)) => DemuxStats {
            reference_in,
            candidate_in,
            reference_out,
            candidate_out,
        },
        // The process exited cleanly without reading all of its input
        Err(QeError::Io { source, .. }) if source.kind() == ErrorKind::BrokenPipe => {
            return Err(QeError::LengthMismatch(format!(
                "`{}` stopped reading input after producing {} + {} lines",
                program, reference_out, candidate_out
            )));
        }
        Err(e) => return Err(e),
    };

    if !stats.is_balanced() {
        return Err(QeError::LengthMismatch(format!(
            "`{}` read {} + {} lines from `{}` and `{}` but produced {} + {}",
            program,
            stats.reference_in,
            stats.candidate_in,
            paths.reference.display(),
            paths.candidate.display(),
            stats.reference_out,
            stats.candidate_out
        )));
    }

    info!(
        "Split {} output lines into {} ({}) and {} ({})",
        stats.reference_out + stats.candidate_out,
        paths.reference_out.display(),
        stats.reference_out,
        paths.candidate_out.display(),
        stats.candidate_out
    );
    Ok(stats)
}

/// Write every line of both inputs into the process, then close its stdin.
/// Returns the number of lines written from each input.
fn feed_input(stdin: impl Write, reference: &Path, candidate: &Path) -> QeResult<(usize, usize)> {
    let mut sink = BufWriter::new(stdin);
    let reference_in = copy_lines(reference, &mut sink)?;
    let candidate_in = copy_lines(candidate, &mut sink)?;
    sink.flush().map_err(|e| QeError::io(candidate, e))?;
    // Dropping the writer closes the pipe and signals end of input
    drop(sink);
    Ok((reference_in, candidate_in))
}

/// Copy lines verbatim, terminating a final unterminated line so two
/// files never merge into one line.
fn copy_lines(path: &Path, sink: &mut impl Write) -> QeResult<usize> {
    let file = File::open(path).map_err(|e| QeError::io(path, e))?;
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();
    let mut count = 0;
    loop {
        buf.clear();
        let n = reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| QeError::io(path, e))?;
        if n == 0 {
            return Ok(count);
        }
        if buf.last() != Some(&b'\n') {
            buf.push(b'\n');
        }
        sink.write_all(&buf).map_err(|e| QeError::io(path, e))?;
        count += 1;
    }
}

/// Drain process output, routing the first `split_at` lines to the first
/// sink and everything after to the second.
fn split_output(
    stdout: impl Read,
    split_at: usize,
    first: (File, &Path),
    second: (File, &Path),
) -> QeResult<(usize, usize)> {
    let mut reader = BufReader::new(stdout);
    let mut first_sink = BufWriter::new(first.0);
    let mut second_sink = BufWriter::new(second.0);
    let mut buf = Vec::new();
    let (mut first_count, mut second_count) = (0usize, 0usize);

    loop {
        buf.clear();
        let n = reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| QeError::io(first.1, e))?;
        if n == 0 {
            break;
        }
        if first_count < split_at {
            first_sink.write_all(&buf).map_err(|e| QeError::io(first.1, e))?;
            first_count += 1;
        } else {
            second_sink
                .write_all(&buf)
                .map_err(|e| QeError::io(second.1, e))?;
            second_count += 1;
        }
    }

    first_sink.flush().map_err(|e| QeError::io(first.1, e))?;
    second_sink.flush().map_err(|e| QeError::io(second.1, e))?;
    Ok((first_count, second_count))
}
