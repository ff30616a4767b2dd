//! Single-block pick-and-place training run.
//!
//! Replicates the canonical single-block setup: incremental reward, three
//! relational blocks over 64-dim embeddings, one pooling query, exploration
//! masking on, and gap-and-last snapshots every 100 epochs.

use burn::backend::{Autodiff, NdArray};

use relational_her::checkpoint::SnapshotMode;
use relational_her::experiment::block_construction_experiment;
use relational_her::launch::{run_experiment, ExperimentMeta, Variant};

type TrainBackend = Autodiff<NdArray<f32>>;

fn main() {
    let num_blocks = 1;
    let stackonly = false;
    let seed = 1;

    let variant = Variant::pick_and_place(num_blocks, stackonly);

    let exp_prefix = format!(
        "pickandplace1_seed{seed}_recurrent{}_stack{num_blocks}_numrelblocks{}_nqh{}_{}stackonly",
        variant.recurrent_graph, variant.num_relational_blocks, variant.num_query_heads, stackonly
    );
    println!("prefix: {exp_prefix}");
    println!("env id: {}", variant.env_id);

    let meta = ExperimentMeta::new(exp_prefix)
        .with_exp_id(0)
        .with_seed(seed)
        .with_snapshot_mode(SnapshotMode::GapAndLast { gap: 100 });

    let result = run_experiment(
        |variant, ctx| {
            block_construction_experiment::<TrainBackend>(variant, ctx, Default::default())
        },
        &variant,
        &meta,
    );

    if let Err(err) = result {
        eprintln!("experiment failed: {err}");
        std::process::exit(1);
    }
}
