//! Replay buffers.

pub mod relabeling_buffer;

pub use relabeling_buffer::{HerBatch, ObsDictRelabelingBuffer, RelabelingBufferConfig};
