use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result, bail};
use strix_core::{Color, GameGraph, GraphEval, GraphPosition, NoTablebase};
use strix_engine::{NullListener, SearchControl, SearchLimits, SearchOptions, ThreadPool};
use tracing::info;

/// Synthetic graphs searched by `bench`, as (seed, nodes, branching).
const BENCH_GRAPHS: [(u64, usize, usize); 4] = [(1, 5_000, 12), (2, 20_000, 8), (3, 2_000, 30), (4, 50_000, 4)];

struct BenchArgs {
    depth: i32,
    threads: usize,
    hash_mb: usize,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<BenchArgs> {
    match args.next().as_deref() {
        None | Some("bench") => {}
        Some(other) => bail!("unknown command `{other}`, expected `bench [depth] [threads] [hash_mb]`"),
    }
    let mut next = |name: &str, default: usize| -> Result<usize> {
        args.next()
            .map_or(Ok(default), |s| s.parse().with_context(|| format!("invalid {name} `{s}`")))
    };
    Ok(BenchArgs {
        depth: next("depth", 10)? as i32,
        threads: next("threads", 1)?,
        hash_mb: next("hash_mb", 16)?,
    })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = parse_args(std::env::args().skip(1))?;
    info!(depth = args.depth, threads = args.threads, hash_mb = args.hash_mb, "strix bench starting");

    let options = SearchOptions {
        threads: args.threads,
        hash_mb: args.hash_mb,
        ..SearchOptions::default()
    };
    let mut pool = ThreadPool::new(args.hash_mb);
    let control = SearchControl::new(Arc::new(AtomicBool::new(false)));

    let mut total_nodes = 0u64;
    let start = std::time::Instant::now();
    for (seed, nodes, branching) in BENCH_GRAPHS {
        let graph = Arc::new(GameGraph::random(seed, nodes, branching));
        let root = (0..graph.len())
            .find(|&id| graph.node(id).is_some_and(|n| !n.edges.is_empty()))
            .context("bench graph has no moves")?;
        let pos = GraphPosition::new(graph, root, Color::White)?;

        pool.clear();
        control.reset();
        let result = pool.search(
            &pos,
            &SearchLimits::depth(args.depth),
            &options,
            &GraphEval,
            &NoTablebase,
            &control,
            &mut NullListener,
        );
        total_nodes += result.nodes;
        info!(
            seed,
            depth = result.depth,
            score = result.score,
            nodes = result.nodes,
            best = ?result.best_move,
            "bench position done"
        );
    }

    let elapsed_ms = start.elapsed().as_millis().max(1) as u64;
    println!("Total time (ms) : {elapsed_ms}");
    println!("Nodes searched  : {total_nodes}");
    println!("Nodes/second    : {}", total_nodes * 1000 / elapsed_ms);
    Ok(())
}
