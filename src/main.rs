mod agent;
mod config;
mod draw;
mod episode;
mod frontend;
mod game;
mod neat;
mod sprite;

use anyhow::{Context, Result};
use clap::Parser;
use config::Config;
use episode::{Arcade, QuitRequested};
use frontend::{Frontend, Headless, WindowFrontend};
use log::info;
use neat::{Genome, Population};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Evolves neural networks that play Flappy Bird", long_about = None)]
struct Args {
    /// JSON file with the NEAT and game settings
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Number of generations to evolve
    #[arg(long, default_value = "50")]
    generations: u32,

    /// Run without a window, as fast as possible
    #[arg(long)]
    headless: bool,

    /// Seed for pipes and evolution, overriding the config file
    #[arg(long)]
    seed: Option<u64>,

    /// Write the winning genome as JSON to this path
    #[arg(long)]
    winner: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = Config::load(&args.config)?;
    if args.seed.is_some() {
        config.game.seed = args.seed;
    }

    let result = if args.headless {
        train(Headless, &config, &args)
    } else {
        let window = WindowFrontend::new(config.game.fps)?;
        train(window, &config, &args)
    };

    match result {
        Err(err) if err.is::<QuitRequested>() => {
            info!("window closed, stopping");
            Ok(())
        }
        other => other,
    }
}

fn rng_from(seed: Option<u64>) -> SmallRng {
    match seed {
        Some(seed) => SmallRng::seed_from_u64(seed),
        None => SmallRng::from_entropy(),
    }
}

fn train<F: Frontend>(frontend: F, config: &Config, args: &Args) -> Result<()> {
    let seed = config.game.seed;
    let mut population = Population::new(config.neat.clone(), rng_from(seed));
    let mut arcade = Arcade::new(frontend, config.game.clone(), rng_from(seed.map(|s| s.wrapping_add(1))));

    let winner: Genome = population.run(&mut arcade, Some(args.generations))?;
    info!(
        "best genome after {} generations: fitness {:.1}, size {:?}",
        arcade.generation(),
        winner.fitness,
        winner.size()
    );
    let stats = population.statistics();
    for (generation, ((best, mean), species)) in
        stats.best_fitness.iter().zip(&stats.mean_fitness).zip(&stats.species_count).enumerate()
    {
        info!("  generation {generation:>3}: best {best:>8.1} mean {mean:>8.1} species {species}");
    }
    info!(
        "{} genomes in {} species at generation {}",
        population.genomes().len(),
        population.species().len(),
        population.generation()
    );

    if let Some(path) = &args.winner {
        let json = serde_json::to_string_pretty(&winner).context("failed to serialize winner")?;
        fs::write(path, json).with_context(|| format!("failed to write winner to {}", path.display()))?;
        info!("winner saved to {}", path.display());
    }
    Ok(())
}
