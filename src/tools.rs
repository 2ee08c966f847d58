//! External toolchain: word aligner and LM estimation/query binaries
//!
//! Each step runs its tool as a subprocess, sends the tool's stderr to a
//! log file and checks the exit status. A step whose outputs already exist
//! is skipped, so an interrupted run can be resumed.

use crate::config::Config;
use crate::demux::{demultiplex, DemuxPaths, DemuxStats};
use crate::error::{QeError, QeResult};
use crate::fields::cut_lines;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// Paths to the external binaries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub fast_align: PathBuf,
    pub lmplz: PathBuf,
    pub build_binary: PathBuf,
    pub ngram_query: PathBuf,
}

/// LM estimation parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LmSettings {
    pub order: u32,
    pub memory: String,
}

impl LmSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            order: config.lm_order(),
            memory: config.lm_memory().to_string(),
        }
    }
}

impl Default for LmSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Whether a step did work or found its outputs in place
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Ran,
    Reused,
}

impl Toolchain {
    /// Explicit paths win; the rest follow the cdec directory layout
    pub fn from_config(config: &Config) -> Self {
        fn pick(explicit: &Option<PathBuf>, cdec: &Path, parts: &[&str]) -> PathBuf {
            explicit
                .clone()
                .unwrap_or_else(|| parts.iter().fold(cdec.to_path_buf(), |p, s| p.join(s)))
        }

        let cdec = config.cdec();
        let tools = &config.tools;
        Self {
            fast_align: pick(&tools.fast_align, &cdec, &["word-aligner", "fast_align"]),
            lmplz: pick(&tools.lmplz, &cdec, &["klm", "lm", "builder", "builder"]),
            build_binary: pick(&tools.build_binary, &cdec, &["klm", "lm", "build_binary"]),
            ngram_query: pick(&tools.ngram_query, &cdec, &["klm", "lm", "ngram_query"]),
        }
    }

    /// (role, path) for every binary
    pub fn binaries(&self) -> [(&'static str, &Path); 4] {
        [
            ("aligner", self.fast_align.as_path()),
            ("lm builder", self.lmplz.as_path()),
            ("lm binary builder", self.build_binary.as_path()),
            ("lm query", self.ngram_query.as_path()),
        ]
    }

    /// Binaries that do not exist on disk
    pub fn missing(&self) -> Vec<(&'static str, &Path)> {
        self.binaries()
            .into_iter()
            .filter(|(_, path)| !path.exists())
            .collect()
    }

    /// `fast_align -i CORPUS -d -v -H -x - [-r]`, reading pairs from stdin
    pub fn align_command(&self, corpus: &Path, reverse: bool) -> Command {
        let mut cmd = Command::new(&self.fast_align);
        cmd.arg("-i")
            .arg(corpus)
            .args(["-d", "-v", "-H", "-x", "-"]);
        if reverse {
            cmd.arg("-r");
        }
        cmd
    }

    /// `lmplz -o ORDER -T TMP -S MEMORY`, text on stdin, ARPA on stdout
    pub fn lm_build_command(&self, settings: &LmSettings, tmp: &Path) -> Command {
        let mut cmd = Command::new(&self.lmplz);
        cmd.arg("-o")
            .arg(settings.order.to_string())
            .arg("-T")
            .arg(tmp)
            .arg("-S")
            .arg(&settings.memory);
        cmd
    }

    /// `build_binary trie ARPA LM`
    pub fn build_binary_command(&self, arpa: &Path, lm: &Path) -> Command {
        let mut cmd = Command::new(&self.build_binary);
        cmd.arg("trie").arg(arpa).arg(lm);
        cmd
    }

    /// `ngram_query LM`, sentences on stdin
    pub fn query_command(&self, lm: &Path) -> Command {
        let mut cmd = Command::new(&self.ngram_query);
        cmd.arg(lm);
        cmd
    }
}

/// Shell-style rendering of a command, for command-only output and logs
pub fn format_command(cmd: &Command) -> String {
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(|s| s.to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn open_log(log: &Path) -> QeResult<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(log)
        .map_err(|e| QeError::io(log, e))
}

fn program_name(cmd: &Command) -> String {
    cmd.get_program().to_string_lossy().to_string()
}

fn spawn_error(cmd: &Command) -> impl FnOnce(std::io::Error) -> QeError + '_ {
    move |source| QeError::Spawn {
        program: program_name(cmd),
        source,
    }
}

fn check_status(cmd: &Command, status: std::process::ExitStatus, inputs: String) -> QeResult<()> {
    if status.success() {
        return Ok(());
    }
    Err(QeError::ProcessFailed {
        program: program_name(cmd),
        status: status.to_string(),
        inputs,
    })
}

fn require(path: &Path) -> QeResult<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(QeError::MissingFile(path.to_path_buf()))
    }
}

/// Estimate an ARPA model from `text`, then compile it to `lm`.
/// Each half is skipped when its output exists.
pub fn build_lm(
    tools: &Toolchain,
    settings: &LmSettings,
    text: &Path,
    arpa: &Path,
    lm: &Path,
    tmp: &Path,
    log: &Path,
) -> QeResult<StepOutcome> {
    let mut outcome = StepOutcome::Reused;

    if arpa.exists() {
        info!("Found existing arpa file `{}`", arpa.display());
    } else {
        require(text)?;
        info!("Running LM builder on {}", text.display());
        let mut cmd = tools.lm_build_command(settings, tmp);
        debug!("$ {} <{} >{}", format_command(&cmd), text.display(), arpa.display());

        let stdin = File::open(text).map_err(|e| QeError::io(text, e))?;
        let stdout = File::create(arpa).map_err(|e| QeError::io(arpa, e))?;
        let status = cmd
            .stdin(stdin)
            .stdout(stdout)
            .stderr(open_log(log)?)
            .status()
            .map_err(spawn_error(&cmd));
        let checked = status.and_then(|s| check_status(&cmd, s, format!("`{}`", text.display())));
        if let Err(e) = checked {
            // Never leave a partial model that a rerun would pick up
            let _ = std::fs::remove_file(arpa);
            return Err(e);
        }
        outcome = StepOutcome::Ran;
    }

    if lm.exists() {
        info!("Found existing binary LM `{}`", lm.display());
    } else {
        info!("Running LM binary builder on {}", arpa.display());
        let mut cmd = tools.build_binary_command(arpa, lm);
        debug!("$ {}", format_command(&cmd));
        let status = cmd
            .stdin(Stdio::null())
            .stdout(open_log(log)?)
            .stderr(open_log(log)?)
            .status()
            .map_err(spawn_error(&cmd));
        let checked = status.and_then(|s| {
            check_status(
                &cmd,
                s,
                format!("that `{}` is a valid arpa file (or delete it and re-run)", arpa.display()),
            )
        });
        if let Err(e) = checked {
            let _ = std::fs::remove_file(lm);
            return Err(e);
        }
        outcome = StepOutcome::Ran;
    }

    Ok(outcome)
}

/// Score field `side` of every bitext line with the LM query tool,
/// one output line per input line.
pub fn score_lm(
    tools: &Toolchain,
    lm: &Path,
    bitext: &Path,
    side: usize,
    out: &Path,
    log: &Path,
) -> QeResult<StepOutcome> {
    if out.exists() {
        info!("Found existing lm score file `{}`", out.display());
        return Ok(StepOutcome::Reused);
    }
    require(bitext)?;
    info!("Scoring side {} of {}", side, bitext.display());

    let mut cmd = tools.query_command(lm);
    debug!("$ {} >{}", format_command(&cmd), out.display());
    let stdout = File::create(out).map_err(|e| QeError::io(out, e))?;
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(stdout)
        .stderr(open_log(log)?)
        .spawn()
        .map_err(spawn_error(&cmd))?;

    // stdout goes straight to a file, so writing all input up front cannot
    // stall on an undrained pipe
    let written = match child.stdin.take() {
        Some(stdin) => feed_side(bitext, side, stdin),
        None => Ok(0),
    };
    let status = child.wait().map_err(spawn_error(&cmd))?;

    let result = check_status(
        &cmd,
        status,
        format!("`{}` and `{}`", lm.display(), bitext.display()),
    )
    .and(written);
    match result {
        Ok(lines) => {
            debug!("Scored {} lines into {}", lines, out.display());
            Ok(StepOutcome::Ran)
        }
        Err(e) => {
            let _ = std::fs::remove_file(out);
            Err(e)
        }
    }
}

/// Write field `side` of each line, keeping one line per input line
fn feed_side(bitext: &Path, side: usize, sink: impl Write) -> QeResult<usize> {
    let reader = BufReader::new(File::open(bitext).map_err(|e| QeError::io(bitext, e))?);
    cut_lines(reader, BufWriter::new(sink), side, bitext, bitext)
}

/// Align `paths.reference` and `paths.candidate` in one aligner run with a
/// model estimated on `corpus`, splitting the records back per input.
pub fn word_align(
    tools: &Toolchain,
    corpus: &Path,
    paths: &DemuxPaths,
    log: &Path,
    reverse: bool,
) -> QeResult<Option<DemuxStats>> {
    if paths.reference_out.exists() && paths.candidate_out.exists() {
        info!(
            "Found existing alignment files `{}` and `{}`",
            paths.reference_out.display(),
            paths.candidate_out.display()
        );
        return Ok(None);
    }
    require(corpus)?;
    info!(
        "Running aligner{} on {} and {}",
        if reverse { " (reverse)" } else { "" },
        paths.reference.display(),
        paths.candidate.display()
    );

    let mut cmd = tools.align_command(corpus, reverse);
    debug!("$ {}", format_command(&cmd));
    cmd.stderr(open_log(log)?);

    match demultiplex(&mut cmd, paths) {
        Ok(stats) => Ok(Some(stats)),
        Err(e) => {
            let _ = std::fs::remove_file(&paths.reference_out);
            let _ = std::fs::remove_file(&paths.candidate_out);
            Err(e)
        }
    }
}
