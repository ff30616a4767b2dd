//! Experiment launching.
//!
//! `run_experiment` owns the process-level setup the training code should
//! never repeat: global seeding, log-directory creation, a `variant.json`
//! snapshot of the configuration, metric loggers, and a checkpointer
//! implementing the snapshot policy. The experiment function receives the
//! validated variant and a ready [`LaunchContext`].

use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;

use crate::checkpoint::{CheckpointError, Checkpointer, SnapshotMode};
use crate::envs::EnvError;
use crate::metrics::{ConsoleLogger, CsvLogger, MultiLogger};

use super::variant::{Variant, VariantError};

/// Errors from launching an experiment.
#[derive(Debug)]
pub enum LaunchError {
    Variant(VariantError),
    Env(EnvError),
    Io(io::Error),
    Checkpoint(CheckpointError),
    Serialize(serde_json::Error),
}

impl fmt::Display for LaunchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaunchError::Variant(e) => write!(f, "variant error: {e}"),
            LaunchError::Env(e) => write!(f, "environment error: {e}"),
            LaunchError::Io(e) => write!(f, "IO error: {e}"),
            LaunchError::Checkpoint(e) => write!(f, "checkpoint error: {e}"),
            LaunchError::Serialize(e) => write!(f, "serialization error: {e}"),
        }
    }
}

impl std::error::Error for LaunchError {}

impl From<VariantError> for LaunchError {
    fn from(e: VariantError) -> Self {
        LaunchError::Variant(e)
    }
}

impl From<EnvError> for LaunchError {
    fn from(e: EnvError) -> Self {
        LaunchError::Env(e)
    }
}

impl From<io::Error> for LaunchError {
    fn from(e: io::Error) -> Self {
        LaunchError::Io(e)
    }
}

impl From<CheckpointError> for LaunchError {
    fn from(e: CheckpointError) -> Self {
        LaunchError::Checkpoint(e)
    }
}

impl From<serde_json::Error> for LaunchError {
    fn from(e: serde_json::Error) -> Self {
        LaunchError::Serialize(e)
    }
}

/// Run metadata: where the run logs, how it is seeded, and when snapshots
/// are written.
#[derive(Debug, Clone)]
pub struct ExperimentMeta {
    pub exp_prefix: String,
    /// Distinguishes runs sharing a prefix (e.g. a seed sweep).
    pub exp_id: usize,
    pub seed: u64,
    pub use_gpu: bool,
    pub base_log_dir: PathBuf,
    pub snapshot_mode: SnapshotMode,
}

impl ExperimentMeta {
    pub fn new(exp_prefix: impl Into<String>) -> Self {
        Self {
            exp_prefix: exp_prefix.into(),
            exp_id: 0,
            seed: 0,
            use_gpu: false,
            base_log_dir: PathBuf::from("data"),
            snapshot_mode: SnapshotMode::GapAndLast { gap: 100 },
        }
    }

    pub fn with_exp_id(mut self, exp_id: usize) -> Self {
        self.exp_id = exp_id;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_use_gpu(mut self, use_gpu: bool) -> Self {
        self.use_gpu = use_gpu;
        self
    }

    pub fn with_base_log_dir(mut self, base_log_dir: impl Into<PathBuf>) -> Self {
        self.base_log_dir = base_log_dir.into();
        self
    }

    pub fn with_snapshot_mode(mut self, snapshot_mode: SnapshotMode) -> Self {
        self.snapshot_mode = snapshot_mode;
        self
    }

    /// Log directory for this run:
    /// `{base}/{prefix}/{prefix}_{id:04}--s-{seed}`.
    pub fn log_dir(&self) -> PathBuf {
        self.base_log_dir.join(&self.exp_prefix).join(format!(
            "{}_{:04}--s-{}",
            self.exp_prefix, self.exp_id, self.seed
        ))
    }
}

/// Everything `run_experiment` sets up for the experiment function.
pub struct LaunchContext {
    pub log_dir: PathBuf,
    pub logger: MultiLogger,
    pub checkpointer: Checkpointer,
    pub seed: u64,
}

/// Validate the variant, prepare the run directory, then hand off to the
/// experiment function.
pub fn run_experiment<F>(
    experiment: F,
    variant: &Variant,
    meta: &ExperimentMeta,
) -> Result<(), LaunchError>
where
    F: FnOnce(&Variant, LaunchContext) -> Result<(), LaunchError>,
{
    variant.validate()?;

    let log_dir = meta.log_dir();
    fs::create_dir_all(&log_dir)?;
    fs::write(
        log_dir.join("variant.json"),
        serde_json::to_string_pretty(variant)?,
    )?;

    fastrand::seed(meta.seed);

    let logger = MultiLogger::new()
        .add(ConsoleLogger::new(1))
        .add(CsvLogger::new(log_dir.join("progress.csv"))?);
    let checkpointer = Checkpointer::new(log_dir.join("snapshots"), meta.snapshot_mode)?;

    println!(
        "launching {} seed {} -> {}",
        meta.exp_prefix,
        meta.seed,
        log_dir.display()
    );

    experiment(
        variant,
        LaunchContext {
            log_dir,
            logger,
            checkpointer,
            seed: meta.seed,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_log_dir_layout() {
        let meta = ExperimentMeta::new("pickandplace1")
            .with_exp_id(3)
            .with_seed(7)
            .with_base_log_dir("/tmp/runs");

        assert_eq!(
            meta.log_dir(),
            PathBuf::from("/tmp/runs/pickandplace1/pickandplace1_0003--s-7")
        );
    }

    #[test]
    fn test_run_experiment_prepares_directory() {
        let dir = tempdir().unwrap();
        let meta = ExperimentMeta::new("smoke")
            .with_seed(1)
            .with_base_log_dir(dir.path());
        let variant = Variant::pick_and_place(1, false);

        let mut seen_seed = None;
        run_experiment(
            |_, ctx| {
                seen_seed = Some(ctx.seed);
                assert!(ctx.log_dir.join("variant.json").exists());
                assert!(ctx.log_dir.join("progress.csv").exists());
                assert!(ctx.checkpointer.snapshot_dir().exists());
                Ok(())
            },
            &variant,
            &meta,
        )
        .unwrap();

        assert_eq!(seen_seed, Some(1));

        // The written variant decodes back.
        let json = fs::read_to_string(meta.log_dir().join("variant.json")).unwrap();
        let decoded = Variant::from_json(&json).unwrap();
        assert_eq!(decoded.env_id, variant.env_id);
    }

    #[test]
    fn test_invalid_variant_rejected_before_setup() {
        let dir = tempdir().unwrap();
        let meta = ExperimentMeta::new("bad").with_base_log_dir(dir.path());
        let mut variant = Variant::pick_and_place(1, false);
        variant.embedding_dim = 0;

        let err = run_experiment(|_, _| Ok(()), &variant, &meta).unwrap_err();
        assert!(matches!(err, LaunchError::Variant(_)));
        assert!(!meta.log_dir().exists());
    }
}
