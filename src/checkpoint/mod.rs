//! Model snapshotting.

pub mod checkpointer;

pub use checkpointer::{CheckpointError, Checkpointer, SnapshotMode};
