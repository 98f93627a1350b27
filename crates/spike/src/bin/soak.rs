use anyhow::{bail, Result};
use clap::Parser;
use ferox_core::{World, WorldConfig};

/// Long-running soak: advances the world for many ticks and checks the
/// engine's structural invariants periodically, dumping metrics as JSON.
#[derive(Parser, Debug)]
struct Args {
    #[arg(long, default_value_t = 200)]
    width: usize,
    #[arg(long, default_value_t = 120)]
    height: usize,
    #[arg(long, default_value_t = 8)]
    colonies: usize,
    #[arg(long, default_value_t = 4)]
    workers: usize,
    #[arg(long, default_value_t = 7)]
    seed: u64,
    #[arg(long, default_value_t = 2000)]
    ticks: u64,
    /// Check invariants and print metrics every this many ticks.
    #[arg(long, default_value_t = 100)]
    check_every: u64,
}

fn check_invariants(world: &World) -> Result<()> {
    let fields = world.fields();
    for (name, field) in [
        ("nutrients", &fields.nutrients),
        ("toxins", &fields.toxins),
        ("signals", &fields.signals),
    ] {
        if !field.iter().all(|v| (0.0..=1.0).contains(v)) {
            bail!("field {name} left [0,1] at tick {}", world.tick_count());
        }
    }
    for colony in world.colonies().iter_active() {
        let Some(stats) = world.stats_for(colony.id) else {
            bail!("active colony {} has no stats row", colony.id);
        };
        let actual = (0..world.grid().len())
            .filter(|&i| world.grid().cell(i).colony_id() == colony.id)
            .count() as i64;
        if stats.cell_count() != actual {
            bail!(
                "colony {} cell_count {} != grid count {} at tick {}",
                colony.id,
                stats.cell_count(),
                actual,
                world.tick_count()
            );
        }
        if stats.max_cell_count() < stats.cell_count() {
            bail!("colony {} peak below current", colony.id);
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let args = Args::parse();

    let mut world = World::new(WorldConfig {
        width: args.width,
        height: args.height,
        initial_colonies: args.colonies,
        workers: args.workers,
        seed: args.seed,
    })?;

    for _ in 0..args.ticks {
        world.tick();
        if world.tick_count() % args.check_every == 0 {
            check_invariants(&world)?;
            println!("{}", serde_json::to_string(world.metrics())?);
        }
    }
    check_invariants(&world)?;
    println!(
        "soak complete: {} ticks, {} active colonies, {} occupied cells",
        world.tick_count(),
        world.metrics().active_colonies,
        world.metrics().occupied_cells
    );
    Ok(())
}
