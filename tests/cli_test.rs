//! CLI contract tests
//!
//! Drives the `qe-clean` binary end to end. External tools are replaced
//! by small shell stubs laid out like a cdec checkout, so these tests need
//! a unix shell and awk but no real aligner or language model.

#![cfg(unix)]

use qe_clean::models::{Feature, ScoredRecord};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

fn qe_clean_bin() -> &'static str {
    env!("CARGO_BIN_EXE_qe-clean")
}

/// Command isolated from the caller's config files and environment
fn cli(dir: &Path) -> Command {
    let mut cmd = Command::new(qe_clean_bin());
    cmd.current_dir(dir)
        .env("XDG_CONFIG_HOME", dir.join(".config"))
        .env("HOME", dir)
        .env_remove("QE_CLEAN_CONFIG")
        .env_remove("QE_CLEAN_CDEC")
        .env_remove("RUST_LOG");
    cmd
}

fn run_with_stdin(mut cmd: Command, input: &str) -> Output {
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to run qe-clean");
    child
        .stdin
        .take()
        .unwrap()
        .write_all(input.as_bytes())
        .unwrap();
    child.wait_with_output().unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn script(path: &Path, body: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

/// Stub toolchain under `dir/cdec`.
///
/// The aligner links every other diagonal position and scores `-(n*m)`,
/// so the per-word score is minus the source length. The query tool emits
/// three tokens per word and a total of `-(n^2 + 1)`.
fn stub_cdec(dir: &Path) -> PathBuf {
    let cdec = dir.join("cdec");
    script(
        &cdec.join("word-aligner/fast_align"),
        r#"awk -F'[|][|][|]' '{
  n = split($1, s, " "); m = split($2, t, " ");
  k = (n < m) ? n : m; links = "";
  for (i = 0; i < k; i += 2) links = links (links == "" ? "" : " ") i "-" i;
  printf "%s ||| %s ||| %s ||| %d\n", $1, $2, links, -(n * m)
}'"#,
    );
    script(
        &cdec.join("klm/lm/builder/builder"),
        "cat >/dev/null\necho '\\data\\'",
    );
    script(&cdec.join("klm/lm/build_binary"), r#"cp "$2" "$3""#);
    script(
        &cdec.join("klm/lm/ngram_query"),
        r#"awk '{
  out = "";
  for (i = 1; i <= NF; i++) out = out $i "=1 2 -1 ";
  printf "%sTotal: %d OOV: 0\n", out, -(NF * NF + 1)
}'"#,
    );
    cdec
}

const DEV: &str = "\
a ||| x
a b c ||| x y
a b ||| x y z w
a b c d ||| x y z
";

const INPUT: &str = "\
das haus ||| the house
ein ||| a long english sentence here
b c ||| y z
";

struct RunFixture {
    dir: tempfile::TempDir,
    cdec: PathBuf,
}

impl RunFixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let cdec = stub_cdec(dir.path());
        let files = [
            ("mono.f", "a b c\nd e\n"),
            ("mono.e", "x y\nz\n"),
            ("bitext.fe", DEV),
            ("dev.fe", DEV),
            ("input.fe", INPUT),
        ];
        for (name, content) in files {
            std::fs::write(dir.path().join(name), content).unwrap();
        }
        Self { dir, cdec }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn run(&self, extra: &[&str]) -> Output {
        let mut cmd = cli(self.path());
        cmd.arg("--cdec").arg(&self.cdec).args([
            "run", "-f", "mono.f", "-e", "mono.e", "-b", "bitext.fe", "-d", "dev.fe", "-i",
            "input.fe", "-o", "out",
        ]);
        cmd.args(extra);
        cmd.output().unwrap()
    }
}

fn read_scored(path: &Path) -> Vec<ScoredRecord> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| ScoredRecord::parse(l).unwrap())
        .collect()
}

// ============================================================================
// run
// ============================================================================

#[test]
fn test_run_end_to_end() {
    let fx = RunFixture::new();
    let output = fx.run(&[]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let out = fx.path().join("out");
    for file in [
        "files/f.4.arpa",
        "files/e.4.klm",
        "files/dev.f.lmscr",
        "files/input.e.lmscr",
        "files/dev.fe.al",
        "files/input.ef.al",
        "files/dev.stats",
        "log/lm.f.log",
        "log/al.fe.log",
        "dev.scored",
    ] {
        assert!(out.join(file).exists(), "missing {file}");
    }

    let dev = read_scored(&out.join("dev.scored"));
    assert_eq!(dev.len(), 4);
    // Deviations of the reference set average to zero on every feature
    for feature in Feature::all() {
        let sum: f64 = dev.iter().map(|r| r.deviations.0[feature.index()]).sum();
        assert!(sum.abs() < 1e-9, "{}: {sum}", feature.name());
    }

    let input = read_scored(&out.join("input.scored"));
    assert_eq!(input.len(), 3);
    assert_eq!(input[0].text, "das haus ||| the house");
    // Forward per-word alignment score is minus the source length
    assert_eq!(input[0].features[Feature::AlignScoreForward], -2.0);
}

#[test]
fn test_run_resumes_from_existing_outputs() {
    let fx = RunFixture::new();
    assert!(fx.run(&[]).status.success());
    let first = std::fs::read_to_string(fx.path().join("out/input.scored")).unwrap();
    let arpa = std::fs::metadata(fx.path().join("out/files/f.4.arpa")).unwrap();

    let again = fx.run(&[]);
    assert!(again.status.success(), "stderr: {}", stderr(&again));
    let log = stderr(&again);
    assert!(log.contains("Found existing arpa file"));
    assert!(log.contains("Found existing alignment files"));

    let second = std::fs::read_to_string(fx.path().join("out/input.scored")).unwrap();
    assert_eq!(first, second);
    let rerun = std::fs::metadata(fx.path().join("out/files/f.4.arpa")).unwrap();
    assert_eq!(arpa.modified().unwrap(), rerun.modified().unwrap());
}

#[test]
fn test_run_missing_binaries_fails() {
    let fx = RunFixture::new();
    std::fs::remove_file(fx.cdec.join("klm/lm/ngram_query")).unwrap();
    let output = fx.run(&[]);
    assert!(!output.status.success());
    let log = stderr(&output);
    assert!(log.contains("Missing binaries"));
    assert!(log.contains("ngram_query"));
    assert!(!fx.path().join("out").exists());
}

#[test]
fn test_run_command_only() {
    let fx = RunFixture::new();
    let output = fx.run(&["--command"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let printed = stdout(&output);
    assert_eq!(printed.lines().count(), 10, "{printed}");
    assert_eq!(printed.lines().filter(|l| l.contains(" align ")).count(), 2);
    assert_eq!(printed.lines().filter(|l| l.contains(" cut ")).count(), 4);
    assert!(!fx.path().join("out/dev.scored").exists());
    assert!(!fx.path().join("out/files/f.4.arpa").exists());
}

#[test]
fn test_run_missing_input_fails() {
    let fx = RunFixture::new();
    std::fs::remove_file(fx.path().join("input.fe")).unwrap();
    let output = fx.run(&[]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("input.fe"));
}

#[test]
fn test_run_warns_when_bitext_is_input() {
    let fx = RunFixture::new();
    let mut cmd = cli(fx.path());
    cmd.arg("--cdec").arg(&fx.cdec).args([
        "run", "-f", "mono.f", "-e", "mono.e", "-b", "input.fe", "-d", "dev.fe", "-i", "input.fe",
        "-o", "out", "--command",
    ]);
    let output = cmd.output().unwrap();
    assert!(output.status.success());
    assert!(stderr(&output).contains("Using input data for model estimation"));
}

// ============================================================================
// select / cut
// ============================================================================

const SCORED: &str = "\
a ||| x ||| 1 1 1 1 1 1 ||| 0 0 0 0 0 0
b ||| y ||| 1 1 1 1 1 1 ||| 0.5 -1 0 0 0 1.5
garbage
";

#[test]
fn test_select_filters_stdin() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = cli(dir.path());
    cmd.args(["select", "1"]);
    let output = run_with_stdin(cmd, SCORED);
    assert!(output.status.success());
    assert_eq!(stdout(&output), "a ||| x\n");
    assert!(stderr(&output).contains("Bad line 3"));

    let mut cmd = cli(dir.path());
    cmd.args(["select", "1.5"]);
    assert_eq!(stdout(&run_with_stdin(cmd, SCORED)), "a ||| x\nb ||| y\n");

    let mut cmd = cli(dir.path());
    cmd.args(["select", "-0.1"]);
    assert_eq!(stdout(&run_with_stdin(cmd, SCORED)), "");
}

#[test]
fn test_cut_fields() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = cli(dir.path());
    cmd.args(["cut", "1"]);
    let output = run_with_stdin(cmd, "das haus ||| the house\nkein feld\n");
    assert!(output.status.success());
    assert_eq!(stdout(&output), "the house\n\n");
}

// ============================================================================
// align / score
// ============================================================================

#[test]
fn test_align_splits_output() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path();
    let aligner = p.join("echo-aligner");
    script(&aligner, "cat");
    std::fs::write(p.join("dev"), "d1\nd2\nd3\n").unwrap();
    std::fs::write(p.join("input"), "i1\ni2\n").unwrap();
    std::fs::write(p.join("corpus"), "").unwrap();

    let output = cli(p)
        .arg("align")
        .arg(&aligner)
        .args(["corpus", "dev", "input", "dev.al", "input.al", "-r"])
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(std::fs::read_to_string(p.join("dev.al")).unwrap(), "d1\nd2\nd3\n");
    assert_eq!(std::fs::read_to_string(p.join("input.al")).unwrap(), "i1\ni2\n");
}

#[test]
fn test_align_failing_tool() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path();
    let aligner = p.join("broken");
    script(&aligner, "cat >/dev/null\nexit 2");
    std::fs::write(p.join("dev"), "d1\n").unwrap();
    std::fs::write(p.join("input"), "i1\n").unwrap();

    let output = cli(p)
        .arg("align")
        .arg(&aligner)
        .args(["corpus", "dev", "input", "dev.al", "input.al"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Error aligning data"));
}

fn write_score_inputs(p: &Path) {
    std::fs::write(p.join("text"), "a ||| x\nb c ||| y z\nd e f ||| w\n").unwrap();
    std::fs::write(
        p.join("lm.f"),
        "a=1 2 -1 Total: -2 OOV: 0\n\
         b=1 2 -1 c=1 2 -1 Total: -6 OOV: 0\n\
         d=1 2 -1 e=1 2 -1 f=1 2 -1 Total: -12 OOV: 0\n",
    )
    .unwrap();
    std::fs::write(
        p.join("lm.e"),
        "x=1 2 -1 Total: -1 OOV: 0\n\
         y=1 2 -1 z=1 2 -1 Total: -3 OOV: 0\n\
         w=1 2 -1 Total: -4 OOV: 0\n",
    )
    .unwrap();
    let al = "a ||| x ||| 0-0 ||| -1\nb c ||| y z ||| 0-0 ||| -6\nd e f ||| w ||| 0-0 1-0 ||| -2\n";
    std::fs::write(p.join("al.fe"), al).unwrap();
    std::fs::write(p.join("al.ef"), al).unwrap();
}

#[test]
fn test_score_compute_then_precomputed() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path();
    write_score_inputs(p);
    let inputs = ["text", "lm.f", "lm.e", "al.fe", "al.ef"];

    let output = cli(p)
        .arg("score")
        .args(inputs)
        .args(["-o", "dev.scored", "--stats-out", "dev.stats"])
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(
        std::fs::read_to_string(p.join("dev.stats")).unwrap().lines().count(),
        2
    );

    let output = cli(p)
        .arg("score")
        .args(inputs)
        .args(["-o", "input.scored", "--stats-in", "dev.stats"])
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    // Same text against its own baseline scores identically
    assert_eq!(
        std::fs::read_to_string(p.join("dev.scored")).unwrap(),
        std::fs::read_to_string(p.join("input.scored")).unwrap()
    );
}

#[test]
fn test_score_requires_exactly_one_baseline() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path();
    write_score_inputs(p);
    let inputs = ["text", "lm.f", "lm.e", "al.fe", "al.ef"];

    let neither = cli(p)
        .arg("score")
        .args(inputs)
        .args(["-o", "out"])
        .output()
        .unwrap();
    assert!(!neither.status.success());
    assert!(stderr(&neither).contains("exactly one"));

    let both = cli(p)
        .arg("score")
        .args(inputs)
        .args(["-o", "out", "--stats-in", "a", "--stats-out", "b"])
        .output()
        .unwrap();
    assert!(!both.status.success());
    assert!(!p.join("out").exists());
}

#[test]
fn test_score_zero_stdev_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path();
    write_score_inputs(p);
    // Every line gets the same target LM score
    std::fs::write(
        p.join("lm.e"),
        "x=1 2 -1 Total: -2 OOV: 0\nx=1 2 -1 Total: -2 OOV: 0\nx=1 2 -1 Total: -2 OOV: 0\n",
    )
    .unwrap();

    let output = cli(p)
        .arg("score")
        .args(["text", "lm.f", "lm.e", "al.fe", "al.ef"])
        .args(["-o", "dev.scored", "--stats-out", "dev.stats"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(stderr(&output).contains("lm_tgt"));
}

// ============================================================================
// doctor / config
// ============================================================================

#[test]
fn test_doctor_reports_missing_binaries() {
    let dir = tempfile::tempdir().unwrap();
    let output = cli(dir.path())
        .args(["--cdec", "nowhere", "doctor"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(stdout(&output).contains("not found"));

    let cdec = stub_cdec(dir.path());
    let output = cli(dir.path())
        .arg("--cdec")
        .arg(&cdec)
        .arg("doctor")
        .output()
        .unwrap();
    assert!(output.status.success(), "stdout: {}", stdout(&output));
}

#[test]
fn test_config_file_locates_tools() {
    let dir = tempfile::tempdir().unwrap();
    let cdec = stub_cdec(dir.path());
    std::fs::write(
        dir.path().join("qe-clean.toml"),
        format!("[tools]\ncdec = \"{}\"\n\n[lm]\norder = 3\n", cdec.display()),
    )
    .unwrap();

    let output = cli(dir.path()).arg("doctor").output().unwrap();
    assert!(output.status.success(), "stdout: {}", stdout(&output));
    assert!(stdout(&output).contains("LM order 3"));

    let shown = cli(dir.path()).args(["config", "show"]).output().unwrap();
    assert!(shown.status.success());
    assert!(stdout(&shown).contains("order = 3"));
}
