//! Snapshot saving for experiment launches.
//!
//! Snapshots are saved per epoch according to a snapshot mode: only the
//! latest, every `gap` epochs, or both. Files use Burn's binary recorder;
//! gap snapshots land in `itr_{epoch}.bin` and the rolling latest in
//! `last.bin`.

use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::backend::Backend;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// When to write snapshots during training.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotMode {
    /// Overwrite `last.bin` every epoch.
    Last,
    /// Write `itr_{epoch}.bin` every `gap` epochs.
    Gap { gap: usize },
    /// Both of the above.
    GapAndLast { gap: usize },
}

impl SnapshotMode {
    fn gap(&self) -> Option<usize> {
        match self {
            SnapshotMode::Last => None,
            SnapshotMode::Gap { gap } | SnapshotMode::GapAndLast { gap } => Some(*gap),
        }
    }

    fn saves_last(&self) -> bool {
        matches!(self, SnapshotMode::Last | SnapshotMode::GapAndLast { .. })
    }
}

/// Errors from snapshot IO.
#[derive(Debug)]
pub enum CheckpointError {
    Io(io::Error),
    Recorder(String),
    Serde(serde_json::Error),
    NoSnapshots,
}

impl std::fmt::Display for CheckpointError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckpointError::Io(e) => write!(f, "IO error: {e}"),
            CheckpointError::Recorder(e) => write!(f, "recorder error: {e}"),
            CheckpointError::Serde(e) => write!(f, "state serialization error: {e}"),
            CheckpointError::NoSnapshots => write!(f, "no snapshots found"),
        }
    }
}

impl From<serde_json::Error> for CheckpointError {
    fn from(e: serde_json::Error) -> Self {
        CheckpointError::Serde(e)
    }
}

impl std::error::Error for CheckpointError {}

impl From<io::Error> for CheckpointError {
    fn from(e: io::Error) -> Self {
        CheckpointError::Io(e)
    }
}

/// Writes model snapshots under a snapshot directory.
pub struct Checkpointer {
    snapshot_dir: PathBuf,
    mode: SnapshotMode,
}

impl Checkpointer {
    /// Create the snapshot directory if needed.
    pub fn new(snapshot_dir: impl Into<PathBuf>, mode: SnapshotMode) -> Result<Self, CheckpointError> {
        let snapshot_dir = snapshot_dir.into();
        fs::create_dir_all(&snapshot_dir)?;
        Ok(Self { snapshot_dir, mode })
    }

    pub fn snapshot_dir(&self) -> &Path {
        &self.snapshot_dir
    }

    pub fn mode(&self) -> SnapshotMode {
        self.mode
    }

    /// Whether this epoch produces a gap snapshot.
    pub fn is_gap_epoch(&self, epoch: usize) -> bool {
        match self.mode.gap() {
            Some(gap) if gap > 0 => epoch % gap == 0,
            _ => false,
        }
    }

    /// Save a model according to the snapshot mode. Returns the paths
    /// written this epoch.
    pub fn save_epoch<B: Backend, M: Module<B>>(
        &self,
        model: &M,
        epoch: usize,
    ) -> Result<Vec<PathBuf>, CheckpointError> {
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        let mut written = Vec::new();

        if self.is_gap_epoch(epoch) {
            let path = self.snapshot_dir.join(format!("itr_{epoch}.bin"));
            model
                .clone()
                .save_file(&path, &recorder)
                .map_err(|e| CheckpointError::Recorder(e.to_string()))?;
            written.push(path);
        }

        if self.mode.saves_last() {
            let path = self.snapshot_dir.join("last.bin");
            model
                .clone()
                .save_file(&path, &recorder)
                .map_err(|e| CheckpointError::Recorder(e.to_string()))?;
            written.push(path);
        }

        Ok(written)
    }

    /// Save serializable non-module state (normalizer statistics and the
    /// like) on the same schedule as model snapshots. Files are named
    /// `{name}_itr_{epoch}.json` and `{name}_last.json`.
    pub fn save_state<T: Serialize>(
        &self,
        name: &str,
        state: &T,
        epoch: usize,
    ) -> Result<Vec<PathBuf>, CheckpointError> {
        let json = serde_json::to_string(state)?;
        let mut written = Vec::new();

        if self.is_gap_epoch(epoch) {
            let path = self.snapshot_dir.join(format!("{name}_itr_{epoch}.json"));
            fs::write(&path, &json)?;
            written.push(path);
        }

        if self.mode.saves_last() {
            let path = self.snapshot_dir.join(format!("{name}_last.json"));
            fs::write(&path, &json)?;
            written.push(path);
        }

        Ok(written)
    }

    /// Load the rolling latest non-module state saved under `name`.
    pub fn load_state_last<T: DeserializeOwned>(&self, name: &str) -> Result<T, CheckpointError> {
        let path = self.snapshot_dir.join(format!("{name}_last.json"));
        if !path.exists() {
            return Err(CheckpointError::NoSnapshots);
        }
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }

    /// Load a model from a snapshot file into a freshly built template.
    pub fn load<B: Backend, M: Module<B>>(
        &self,
        model_template: M,
        path: &Path,
        device: &B::Device,
    ) -> Result<M, CheckpointError> {
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        model_template
            .load_file(path, &recorder, device)
            .map_err(|e| CheckpointError::Recorder(e.to_string()))
    }

    /// Load the rolling latest snapshot.
    pub fn load_last<B: Backend, M: Module<B>>(
        &self,
        model_template: M,
        device: &B::Device,
    ) -> Result<M, CheckpointError> {
        let path = self.snapshot_dir.join("last.bin");
        if !path.exists() {
            return Err(CheckpointError::NoSnapshots);
        }
        self.load(model_template, &path, device)
    }

    /// List gap snapshots, sorted by epoch.
    pub fn list_gap_snapshots(&self) -> Result<Vec<(usize, PathBuf)>, CheckpointError> {
        let mut snapshots: Vec<(usize, PathBuf)> = fs::read_dir(&self.snapshot_dir)?
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let path = e.path();
                let epoch = path
                    .file_name()?
                    .to_str()?
                    .strip_prefix("itr_")?
                    .strip_suffix(".bin")?
                    .parse()
                    .ok()?;
                Some((epoch, path))
            })
            .collect();

        snapshots.sort_by_key(|&(epoch, _)| epoch);
        Ok(snapshots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::module::Param;
    use burn::prelude::*;
    use tempfile::tempdir;

    type B = NdArray<f32>;

    #[derive(Module, Debug)]
    struct Toy<B: Backend> {
        w: Param<Tensor<B, 1>>,
    }

    fn toy(value: f32, device: &<B as Backend>::Device) -> Toy<B> {
        Toy {
            w: Param::from_tensor(Tensor::ones([4], device).mul_scalar(value)),
        }
    }

    fn first_weight(m: &Toy<B>) -> f32 {
        m.w.val().into_data().as_slice::<f32>().unwrap()[0]
    }

    #[test]
    fn test_gap_epoch_schedule() {
        let dir = tempdir().unwrap();
        let ckpt = Checkpointer::new(dir.path(), SnapshotMode::GapAndLast { gap: 100 }).unwrap();

        assert!(ckpt.is_gap_epoch(0));
        assert!(!ckpt.is_gap_epoch(50));
        assert!(ckpt.is_gap_epoch(100));
        assert!(ckpt.is_gap_epoch(200));
    }

    #[test]
    fn test_last_mode_has_no_gap() {
        let dir = tempdir().unwrap();
        let ckpt = Checkpointer::new(dir.path(), SnapshotMode::Last).unwrap();

        assert!(!ckpt.is_gap_epoch(0));
        assert!(!ckpt.is_gap_epoch(100));
        assert!(ckpt.mode().saves_last());
    }

    #[test]
    fn test_directory_creation() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("run/snapshots");
        let ckpt = Checkpointer::new(&nested, SnapshotMode::Gap { gap: 10 }).unwrap();

        assert!(nested.exists());
        assert_eq!(ckpt.snapshot_dir(), nested.as_path());
    }

    #[test]
    fn test_list_gap_snapshots_empty() {
        let dir = tempdir().unwrap();
        let ckpt = Checkpointer::new(dir.path(), SnapshotMode::Gap { gap: 10 }).unwrap();
        assert!(ckpt.list_gap_snapshots().unwrap().is_empty());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let ckpt = Checkpointer::new(dir.path(), SnapshotMode::GapAndLast { gap: 10 }).unwrap();
        let device = Default::default();

        // Epoch 0 is a gap epoch, so both files are written.
        let written = ckpt.save_epoch(&toy(3.0, &device), 0).unwrap();
        assert_eq!(written.len(), 2);

        let restored = ckpt.load_last(toy(0.0, &device), &device).unwrap();
        assert!((first_weight(&restored) - 3.0).abs() < 1e-6);

        let gaps = ckpt.list_gap_snapshots().unwrap();
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].0, 0);
        let restored = ckpt.load(toy(0.0, &device), &gaps[0].1, &device).unwrap();
        assert!((first_weight(&restored) - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_last_overwrites_between_epochs() {
        let dir = tempdir().unwrap();
        let ckpt = Checkpointer::new(dir.path(), SnapshotMode::Last).unwrap();
        let device = Default::default();

        ckpt.save_epoch(&toy(1.0, &device), 0).unwrap();
        ckpt.save_epoch(&toy(2.0, &device), 1).unwrap();

        let restored = ckpt.load_last(toy(0.0, &device), &device).unwrap();
        assert!((first_weight(&restored) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_load_last_without_snapshots() {
        let dir = tempdir().unwrap();
        let ckpt = Checkpointer::new(dir.path(), SnapshotMode::Last).unwrap();
        let device = Default::default();

        assert!(matches!(
            ckpt.load_last(toy(0.0, &device), &device),
            Err(CheckpointError::NoSnapshots)
        ));
    }

    #[test]
    fn test_state_round_trip_follows_schedule() {
        let dir = tempdir().unwrap();
        let ckpt = Checkpointer::new(dir.path(), SnapshotMode::GapAndLast { gap: 10 }).unwrap();

        let stats = vec![1.5f32, -2.0, 0.25];
        let written = ckpt.save_state("normalizer", &stats, 10).unwrap();
        assert_eq!(written.len(), 2);
        assert!(dir.path().join("normalizer_itr_10.json").exists());
        assert!(dir.path().join("normalizer_last.json").exists());

        let restored: Vec<f32> = ckpt.load_state_last("normalizer").unwrap();
        assert_eq!(restored, stats);

        assert!(matches!(
            ckpt.load_state_last::<Vec<f32>>("missing"),
            Err(CheckpointError::NoSnapshots)
        ));
    }
}
