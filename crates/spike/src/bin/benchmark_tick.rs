use anyhow::Result;
use clap::Parser;
use ferox_core::{World, WorldConfig};
use std::time::Instant;

/// Tick-rate benchmark: runs the engine with and without per-tick snapshot
/// export and reports the overhead.
#[derive(Parser, Debug)]
struct Args {
    #[arg(long, default_value_t = 300)]
    width: usize,
    #[arg(long, default_value_t = 160)]
    height: usize,
    #[arg(long, default_value_t = 12)]
    colonies: usize,
    #[arg(long, default_value_t = 4)]
    workers: usize,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    #[arg(long, default_value_t = 200)]
    ticks: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let args = Args::parse();

    let config = WorldConfig {
        width: args.width,
        height: args.height,
        initial_colonies: args.colonies,
        workers: args.workers,
        seed: args.seed,
    };
    println!(
        "Benchmarking {}x{} world, {} colonies, {} workers, {} ticks",
        args.width, args.height, args.colonies, args.workers, args.ticks
    );

    let mut world = World::new(config.clone())?;
    let start = Instant::now();
    let mut age_us = 0u64;
    let mut spread_us = 0u64;
    let mut serial_us = 0u64;
    for _ in 0..args.ticks {
        let t = world.tick();
        age_us += t.age_us;
        spread_us += t.spread_us;
        serial_us += t.serial_us;
    }
    let bare = start.elapsed();
    println!("Time for {} ticks WITHOUT snapshots: {:?}", args.ticks, bare);
    println!(
        "  per tick: age {}us, spread {}us, serial {}us",
        age_us / args.ticks as u64,
        spread_us / args.ticks as u64,
        serial_us / args.ticks as u64
    );

    let mut world = World::new(config)?;
    let start = Instant::now();
    let mut last_len = 0usize;
    for _ in 0..args.ticks {
        world.tick();
        let snap = world.snapshot(true);
        last_len = snap.colonies.len();
    }
    let with_snapshots = start.elapsed();
    println!(
        "Time for {} ticks WITH snapshots: {:?} ({} colonies in the last frame)",
        args.ticks, with_snapshots, last_len
    );
    println!(
        "Snapshot overhead per tick: {:?}",
        with_snapshots.saturating_sub(bare) / args.ticks as u32
    );

    Ok(())
}
