//! File layout of a run's output directory

use super::RunInputs;
use crate::demux::DemuxPaths;
use crate::normalize::FeatureSources;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// LM files for one language side
#[derive(Debug, Clone)]
pub struct SideFiles {
    pub arpa: PathBuf,
    pub lm: PathBuf,
    pub tmp: PathBuf,
    pub log: PathBuf,
    pub dev_scores: PathBuf,
    pub input_scores: PathBuf,
}

impl SideFiles {
    /// (bitext, LM score file) for dev and input
    pub fn scored_texts<'a>(&'a self, inputs: &'a RunInputs) -> [(&'a Path, &'a Path); 2] {
        [
            (inputs.dev.as_path(), self.dev_scores.as_path()),
            (inputs.input.as_path(), self.input_scores.as_path()),
        ]
    }

    fn new(files: &Path, log: &Path, lang: &str, order: u32) -> Self {
        Self {
            arpa: files.join(format!("{lang}.{order}.arpa")),
            lm: files.join(format!("{lang}.{order}.klm")),
            tmp: files.join(format!("lm.{lang}.tmp")),
            log: log.join(format!("lm.{lang}.log")),
            dev_scores: files.join(format!("dev.{lang}.lmscr")),
            input_scores: files.join(format!("input.{lang}.lmscr")),
        }
    }
}

/// Every path a run reads or writes under `OUTPUT`
#[derive(Debug, Clone)]
pub struct RunLayout {
    pub root: PathBuf,
    pub files: PathBuf,
    pub log: PathBuf,
    pub source: SideFiles,
    pub target: SideFiles,
    pub dev_fe: PathBuf,
    pub input_fe: PathBuf,
    pub align_fe_log: PathBuf,
    pub dev_ef: PathBuf,
    pub input_ef: PathBuf,
    pub align_ef_log: PathBuf,
    pub stats: PathBuf,
    pub dev_scored: PathBuf,
    pub input_scored: PathBuf,
}

impl RunLayout {
    pub fn new(output: &Path, order: u32) -> Self {
        let files = output.join("files");
        let log = output.join("log");
        Self {
            source: SideFiles::new(&files, &log, "f", order),
            target: SideFiles::new(&files, &log, "e", order),
            dev_fe: files.join("dev.fe.al"),
            input_fe: files.join("input.fe.al"),
            align_fe_log: log.join("al.fe.log"),
            dev_ef: files.join("dev.ef.al"),
            input_ef: files.join("input.ef.al"),
            align_ef_log: log.join("al.ef.log"),
            stats: files.join("dev.stats"),
            dev_scored: output.join("dev.scored"),
            input_scored: output.join("input.scored"),
            root: output.to_path_buf(),
            files,
            log,
        }
    }

    pub fn create(&self) -> Result<()> {
        for dir in [&self.root, &self.files, &self.log] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create `{}`", dir.display()))?;
        }
        Ok(())
    }

    pub fn forward_alignment(&self, inputs: &RunInputs) -> DemuxPaths {
        DemuxPaths {
            reference: inputs.dev.clone(),
            candidate: inputs.input.clone(),
            reference_out: self.dev_fe.clone(),
            candidate_out: self.input_fe.clone(),
        }
    }

    pub fn reverse_alignment(&self, inputs: &RunInputs) -> DemuxPaths {
        DemuxPaths {
            reference: inputs.dev.clone(),
            candidate: inputs.input.clone(),
            reference_out: self.dev_ef.clone(),
            candidate_out: self.input_ef.clone(),
        }
    }

    pub fn dev_sources(&self) -> FeatureSources {
        FeatureSources {
            lm_source: self.source.dev_scores.clone(),
            lm_target: self.target.dev_scores.clone(),
            align_forward: self.dev_fe.clone(),
            align_reverse: self.dev_ef.clone(),
        }
    }

    pub fn input_sources(&self) -> FeatureSources {
        FeatureSources {
            lm_source: self.source.input_scores.clone(),
            lm_target: self.target.input_scores.clone(),
            align_forward: self.input_fe.clone(),
            align_reverse: self.input_ef.clone(),
        }
    }

    /// Context line for a failed scoring pass
    pub fn score_diagnostic(&self, text: &Path, sources: &FeatureSources) -> String {
        let files: Vec<String> = std::iter::once(text)
            .chain(sources.paths())
            .map(|p| format!("`{}`", p.display()))
            .collect();
        format!("Error calculating scores. Check {}", files.join(", "))
    }
}
