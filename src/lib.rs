//! Goal-conditioned relational reinforcement learning for block
//! construction.
//!
//! The crate wires four pieces into one experiment: a kinematic
//! block-construction environment selected by formatted identifier strings,
//! graph-relational policy/value networks over a shared input normalizer, a
//! hindsight-relabeling replay buffer, and a twin soft actor-critic trainer.
//! [`launch::run_experiment`] validates a typed [`launch::Variant`] and sets
//! up logging, seeding, and snapshotting before handing control to
//! [`experiment::block_construction_experiment`].
//!
//! ```no_run
//! use relational_her::experiment::block_construction_experiment;
//! use relational_her::launch::{run_experiment, ExperimentMeta, Variant};
//! use burn::backend::{Autodiff, NdArray};
//!
//! let variant = Variant::pick_and_place(1, false);
//! let meta = ExperimentMeta::new("pickandplace1").with_seed(1);
//! run_experiment(
//!     |variant, ctx| {
//!         block_construction_experiment::<Autodiff<NdArray<f32>>>(
//!             variant,
//!             ctx,
//!             Default::default(),
//!         )
//!     },
//!     &variant,
//!     &meta,
//! )
//! .unwrap();
//! ```

pub mod algorithms;
pub mod buffers;
pub mod checkpoint;
pub mod core;
pub mod envs;
pub mod experiment;
pub mod launch;
pub mod metrics;
pub mod nn;
