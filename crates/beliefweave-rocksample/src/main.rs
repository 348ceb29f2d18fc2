use std::fs::{self, File};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing_subscriber::EnvFilter;

use beliefweave_core::{PomdpModel, SearchBudget, Solver, SolverError, SolverOptions};
use beliefweave_rocksample::{MapError, RockSampleMap, RockSampleModel};

/// The classic RockSample[7,8] instance, used when no map file is given.
const DEFAULT_MAP: &str = "\
....3..
0......
.1..4.5
..S....
2......
......6
...7...
";

#[derive(Debug, Parser)]
#[command(name = "rocksample", about = "Online POMDP planning on a RockSample grid")]
struct Cli {
    /// Solver options YAML; the bundled defaults are used when omitted.
    #[arg(long)]
    options: Option<PathBuf>,

    /// Map file (text grid: '.', 'S', rock digits); a built-in 7x7 map with
    /// eight rocks is used when omitted.
    #[arg(long)]
    map: Option<PathBuf>,

    /// Maximum number of world steps to execute.
    #[arg(long, default_value_t = 50)]
    steps: u64,

    /// Override the rng seed from the options.
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::from(exit_code_for(&err))
        }
    }
}

/// Exit codes: 1 configuration error, 2 model error (unrecoverable particle
/// depletion), 3 I/O error on the serialization file.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    if let Some(solver_err) = err.downcast_ref::<SolverError>() {
        return match solver_err {
            SolverError::Configuration { .. } => 1,
            SolverError::ModelContract { .. }
            | SolverError::ParticleDepletion { .. }
            | SolverError::Invariant { .. } => 2,
            SolverError::Serialization { .. } => 3,
        };
    }
    if err.downcast_ref::<MapError>().is_some() {
        return 1;
    }
    if err.downcast_ref::<std::io::Error>().is_some() {
        return 3;
    }
    1
}

fn run(cli: Cli) -> Result<()> {
    let mut options = match &cli.options {
        Some(path) => SolverOptions::from_yaml_path(path)
            .with_context(|| format!("loading options from {}", path.display()))?,
        None => SolverOptions::from_default_yaml()?,
    };
    if let Some(seed) = cli.seed {
        options.rng_seed = seed;
    }

    let map_text = match &cli.map {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("reading map {}", path.display()))?
        }
        None => DEFAULT_MAP.to_string(),
    };
    let map = RockSampleMap::parse(&map_text)?;
    tracing::info!(
        width = map.width,
        height = map.height,
        rocks = map.rock_count(),
        "map loaded"
    );

    let model = RockSampleModel::new(map).with_discount(options.discount_factor);
    let discount = options.discount_factor;
    let serializer_path = options.serializer_path.clone();
    let budget = SearchBudget::from_options(&options);
    let mut solver = Solver::new(model, options)?;

    // The driver plays the world: a hidden true state stepped with its own
    // rng, decoupled from the solver's search randomness.
    let mut world_rng = ChaCha8Rng::seed_from_u64(solver.options().rng_seed.wrapping_add(1));
    let mut true_state = solver.model().sample_an_init_state(&mut world_rng);
    let mut total_reward = 0.0;
    let mut scale = 1.0;

    for step in 0..cli.steps {
        let simulations = solver.improve(budget)?;
        let action = solver
            .recommended_action()
            .context("the solver produced no action")?;
        let result = solver
            .model()
            .generate_step(&true_state, &action, &mut world_rng);
        total_reward += scale * result.reward;
        scale *= discount;
        tracing::info!(
            step,
            simulations,
            %action,
            observation = %result.observation,
            reward = result.reward,
            state = %result.next_state,
            "executed step"
        );

        if result.is_terminal {
            tracing::info!(step, "episode finished");
            break;
        }

        match solver.advance(&action, &result.observation) {
            Ok(()) => {}
            Err(SolverError::ParticleDepletion { .. }) => {
                tracing::warn!("particle depletion; falling back to the uniform state prior");
                solver.refill_root_uniform()?;
            }
            Err(err) => return Err(err.into()),
        }
        true_state = result.next_state;
    }
    tracing::info!(total_reward, "run complete");

    if let Some(path) = serializer_path {
        let file = File::create(&path).with_context(|| format!("creating {path}"))?;
        solver.save(file)?;
        tracing::info!(path, "solver state saved");
    }
    Ok(())
}
