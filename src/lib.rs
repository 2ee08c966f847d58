//! qe-clean - quality-estimation data selection for parallel corpora
//!
//! Scores each sentence pair of a noisy bitext with language-model and
//! word-alignment features, normalizes the scores against statistics from a
//! clean development set, and keeps the pairs that fall no more than `N`
//! standard deviations below the reference mean on any feature.

pub mod config;
pub mod demux;
pub mod error;
pub mod extract;
pub mod fields;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod select;
pub mod stats;
pub mod tools;

pub use error::{MalformedLine, QeError, QeResult};
