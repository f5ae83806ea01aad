//! Tunable knobs for a compiler run.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Tunables for [`crate::compile`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerKnobs {
    /// How many training pairs to draw as few-shot demonstrations.
    pub k_demos: usize,
    /// How many of the fixed instruction mutations to seed the population
    /// with, taken in order starting from `"original"`. Clamped to
    /// `[1, 6]`: the spec's fixed set has exactly six entries and describes
    /// it as a minimum, not a menu to subset below `"original"` alone.
    pub n_inst: usize,
    /// Number of evolutionary generations to run.
    pub iters: usize,
    /// Hard cap on total sender calls across bootstrap, seed evaluation,
    /// meta-optimize, and child evaluation. Checked at generation
    /// boundaries, not mid-batch.
    pub call_budget: u64,
    /// Max in-flight per-example evaluations. Defaults to hardware
    /// parallelism.
    pub concurrency: usize,
}

impl Default for CompilerKnobs {
    fn default() -> Self {
        Self {
            k_demos: 4,
            n_inst: 6,
            iters: 10,
            call_budget: 200,
            concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
        }
    }
}

/// Failure reading or parsing a [`CompilerKnobs`] file.
#[derive(Debug, Error)]
pub enum KnobsError {
    /// The file could not be read.
    #[error("reading compiler knobs from {path}: {source}")]
    Io {
        /// The path that failed to read.
        path: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// The file's contents were not valid JSON for this shape.
    #[error("parsing compiler knobs: {0}")]
    Parse(#[from] serde_json::Error),
}

impl CompilerKnobs {
    /// Load knobs from a JSON file at `path`, falling back to [`Default`]
    /// for any field the file omits (`#[serde(default)]` on the struct).
    pub fn from_path(path: &Path) -> Result<Self, KnobsError> {
        let text = std::fs::read_to_string(path).map_err(|source| KnobsError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_spec_minimums() {
        let knobs = CompilerKnobs::default();
        assert_eq!(knobs.n_inst, 6);
        assert!(knobs.concurrency >= 1);
    }

    #[test]
    fn from_path_missing_file_is_io_error() {
        let err = CompilerKnobs::from_path(Path::new("/nonexistent/knobs.json")).unwrap_err();
        assert!(matches!(err, KnobsError::Io { .. }));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knobs.json");
        std::fs::write(&path, r#"{"iters": 3}"#).unwrap();
        let knobs = CompilerKnobs::from_path(&path).unwrap();
        assert_eq!(knobs.iters, 3);
        assert_eq!(knobs.k_demos, CompilerKnobs::default().k_demos);
    }
}
