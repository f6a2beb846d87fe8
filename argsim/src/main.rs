#![deny(clippy::pedantic)]

#[macro_use]
extern crate log;

use anyhow::{Context, Result};
use log::LevelFilter;
use structopt::StructOpt;

mod minimal_logger;

use argsim::{
    model::{Model, ModelBuilder},
    Simulator,
};
use argsim_core::cogs::GeneticMap;
use argsim_core_bond::NonNegativeF64;
use argsim_impls::{
    genetic_map::UniformGeneticMap, mutation::PoissonMutationPlacer,
    reporter::EdgeCountReporter, rng::SeededRng,
};

use minimal_logger::MinimalLogger;

static MINIMAL_LOGGER: MinimalLogger = MinimalLogger;

#[derive(Debug, StructOpt)]
struct CommandLineArguments {
    /// Pops as name:size:samples, e.g. african:10000:20
    #[structopt(long = "pop", required = true, number_of_values = 1)]
    pops: Vec<String>,
    /// Backward-time migration as from:to:rate
    #[structopt(long = "migration", number_of_values = 1)]
    migrations: Vec<String>,
    /// Recombination rate per chromosome per generation
    #[structopt(long, default_value = "0.0")]
    recomb_rate: f64,
    /// Gene-conversion initiation rate relative to the recombination rate
    #[structopt(long, default_value = "0.0")]
    gc_ratio: f64,
    /// Mean gene-conversion tract length as a chromosome fraction
    #[structopt(long, default_value = "0.01")]
    gc_mean_tract: f64,
    /// Neutral mutation rate per chromosome per generation
    #[structopt(long, default_value = "0.0")]
    mutation_rate: f64,
    /// Selective sweep as pop:end_gen:site:selection:end_freq
    #[structopt(long)]
    sweep: Option<String>,
    /// Recombination-map control points as physical:genetic, covering
    /// both chromosome ends
    #[structopt(long = "genetic-map", number_of_values = 1)]
    genetic_map: Vec<String>,
    seed: u64,
    /// Raises the log level once per occurrence
    #[structopt(short, parse(from_occurrences))]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = CommandLineArguments::from_args();

    log::set_logger(&MINIMAL_LOGGER)
        .map(|()| {
            log::set_max_level(match args.verbose {
                0 => LevelFilter::Info,
                1 => LevelFilter::Debug,
                _ => LevelFilter::Trace,
            });
        })
        .map_err(|_| anyhow::anyhow!("Failed to initialise the logger"))?;

    let mut builder = ModelBuilder::new()
        .recomb_rate(args.recomb_rate)
        .gene_conversion(args.gc_ratio, args.gc_mean_tract)
        .mutation_rate(args.mutation_rate);

    for pop in &args.pops {
        let (name, size, samples) =
            parse_pop(pop).with_context(|| format!("Failed to parse pop {pop:?}"))?;

        builder = builder.pop(name, size, samples);
    }

    for migration in &args.migrations {
        let (from, to, rate) = parse_migration(migration)
            .with_context(|| format!("Failed to parse migration {migration:?}"))?;

        builder = builder.migration(from, to, rate);
    }

    if let Some(sweep) = &args.sweep {
        let (pop, end_gen, site, selection, end_freq) =
            parse_sweep(sweep).with_context(|| format!("Failed to parse sweep {sweep:?}"))?;

        builder = builder.sweep(pop, end_gen, site, selection, end_freq);
    }

    if !args.genetic_map.is_empty() {
        let points = args
            .genetic_map
            .iter()
            .map(|point| {
                parse_map_point(point)
                    .with_context(|| format!("Failed to parse map point {point:?}"))
            })
            .collect::<Result<Vec<_>>>()?;

        builder = builder.genetic_map(points);
    }

    let model = builder.build().context("The model is invalid")?;

    let placer = PoissonMutationPlacer::new(model.mutation_rate(), args.seed.rotate_left(17));
    let rng = SeededRng::from_seed(args.seed);

    let (reporter, mutations, final_generation) = match model.genetic_map() {
        Some(map) => simulate(&model, map.clone(), placer, rng)?,
        None => simulate(&model, UniformGeneticMap, placer, rng)?,
    };

    info!(
        "{} coalescences, {} recombinations, {} gene conversions",
        reporter.coalescences(),
        reporter.recombinations(),
        reporter.gene_conversions(),
    );
    info!("{mutations} neutral mutations placed");
    info!("deepest event at generation {}", final_generation.get());

    Ok(())
}

fn simulate<G: GeneticMap>(
    model: &Model,
    map: G,
    placer: PoissonMutationPlacer,
    rng: SeededRng,
) -> Result<(EdgeCountReporter, usize, NonNegativeF64)> {
    let mut simulator =
        Simulator::new(model, map, placer, rng).context("Failed to set up the simulation")?;
    let mut reporter = EdgeCountReporter::default();

    let final_generation = simulator
        .run(&mut reporter)
        .context("The simulation failed")?;

    let mutations = simulator.demography().placer().mutation_count();

    Ok((reporter, mutations, final_generation))
}

fn parse_map_point(point: &str) -> Result<(f64, f64)> {
    let mut parts = point.split(':');

    let physical = parts
        .next()
        .context("missing the physical position")?
        .parse::<f64>()
        .context("the physical position is not a number")?;
    let genetic = parts
        .next()
        .context("missing the genetic position")?
        .parse::<f64>()
        .context("the genetic position is not a number")?;

    anyhow::ensure!(parts.next().is_none(), "trailing fields after the genetic position");

    Ok((physical, genetic))
}

fn parse_pop(pop: &str) -> Result<(&str, f64, u32)> {
    let mut parts = pop.split(':');

    let name = parts.next().context("missing the pop name")?;
    let size = parts
        .next()
        .context("missing the pop size")?
        .parse::<f64>()
        .context("the pop size is not a number")?;
    let samples = parts
        .next()
        .context("missing the sample count")?
        .parse::<u32>()
        .context("the sample count is not a number")?;

    anyhow::ensure!(parts.next().is_none(), "trailing fields after the sample count");

    Ok((name, size, samples))
}

fn parse_migration(migration: &str) -> Result<(&str, &str, f64)> {
    let mut parts = migration.split(':');

    let from = parts.next().context("missing the source pop")?;
    let to = parts.next().context("missing the target pop")?;
    let rate = parts
        .next()
        .context("missing the rate")?
        .parse::<f64>()
        .context("the rate is not a number")?;

    anyhow::ensure!(parts.next().is_none(), "trailing fields after the rate");

    Ok((from, to, rate))
}

fn parse_sweep(sweep: &str) -> Result<(&str, f64, f64, f64, f64)> {
    let mut parts = sweep.split(':');

    let pop = parts.next().context("missing the swept pop")?;

    let mut number = |what: &'static str| -> Result<f64> {
        parts
            .next()
            .with_context(|| format!("missing the {what}"))?
            .parse::<f64>()
            .with_context(|| format!("the {what} is not a number"))
    };

    let end_gen = number("end generation")?;
    let site = number("causal site")?;
    let selection = number("selection coefficient")?;
    let end_freq = number("end frequency")?;

    Ok((pop, end_gen, site, selection, end_freq))
}
