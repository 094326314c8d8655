//! eyeq-engine - hands-free gaze and voice interaction engine.
//!
//! Runs the engine headless against a scripted session: gaze samples,
//! speech results and navigation read from a JSON script, UI actions
//! logged instead of performed.

use eyeq_engine::calibration::LoggingTrainer;
use eyeq_engine::clock::{Clock, SystemClock, TestClock};
use eyeq_engine::config::EngineConfig;
use eyeq_engine::engine::{Collaborators, InteractionEngine};
use eyeq_engine::geometry::Viewport;
use eyeq_engine::input_source::{Script, ScriptedInputProvider};
use eyeq_engine::persist::{FlagStore, JsonFileStore, MemoryStore};
use eyeq_engine::runtime::{Runtime, RuntimeConfig};
use eyeq_engine::screen::LoggingSink;
use eyeq_engine::voice::ManualSpeechSource;

use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "eyeq-engine", about = "Gaze and voice interaction engine")]
struct Cli {
    /// Engine config file (JSON). Missing keys keep their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// File for the persisted calibration/tour flags (default: in memory)
    #[arg(long)]
    state: Option<PathBuf>,

    /// Clear persisted flags before starting
    #[arg(long)]
    reset_state: bool,

    /// Viewport size (WxH), overrides the config
    #[arg(long)]
    viewport: Option<String>,

    /// Session script to replay (JSON)
    #[arg(long)]
    script: Option<PathBuf>,

    /// Replay on the wall clock through the event loop instead of simulated time
    #[arg(long)]
    realtime: bool,

    /// Exit after N seconds (real-time mode)
    #[arg(long)]
    exit_after: Option<u64>,

    /// Seed for the calibration point order
    #[arg(long)]
    seed: Option<u64>,

    /// Show version and exit
    #[arg(long)]
    version: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("eyeq-engine {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "eyeq_engine=info".into()),
        )
        .init();

    info!("eyeq-engine v{} starting", env!("CARGO_PKG_VERSION"));

    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(size) = &cli.viewport {
        config.viewport = Viewport::parse(size)
            .ok_or_else(|| anyhow::anyhow!("invalid viewport '{}', expected WxH", size))?;
        config.validate()?;
    }
    info!(
        "viewport: {}x{}",
        config.viewport.width, config.viewport.height
    );

    let script = match &cli.script {
        Some(path) => {
            let script = Script::load(path)?;
            info!(
                "Loaded script {}: {} layout(s), {} event(s), {:?} of waits",
                path.display(),
                script.layouts.len(),
                script.events.len(),
                script.duration()
            );
            script
        }
        None => Script::default(),
    };

    match cli.state.clone() {
        Some(path) => {
            info!("persisted state: {}", path.display());
            run(&cli, config, script, JsonFileStore::new(path))
        }
        None => run(&cli, config, script, MemoryStore::new()),
    }
}

fn run<F: FlagStore>(
    cli: &Cli,
    config: EngineConfig,
    script: Script,
    store: F,
) -> anyhow::Result<()> {
    let rng = match cli.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let test_clock = Arc::new(TestClock::new());
    let clock: Arc<dyn Clock> = if cli.realtime {
        Arc::new(SystemClock)
    } else {
        test_clock.clone()
    };

    let mut engine = InteractionEngine::new(
        config,
        Collaborators {
            speech: ManualSpeechSource::default(),
            trainer: LoggingTrainer::default(),
            store,
            sink: LoggingSink,
        },
        clock.clone(),
        rng,
    );
    if cli.reset_state {
        engine.reset_persisted_state();
    }

    let Script { layouts, events } = script;
    let mut runtime = Runtime::new(engine, layouts, clock);
    let provider = ScriptedInputProvider::new(events);

    if cli.realtime {
        runtime.run(
            provider,
            RuntimeConfig {
                exit_after_secs: cli.exit_after,
                ..Default::default()
            },
        )?;
    } else {
        let mut provider = provider;
        runtime.start();
        runtime.simulate(&test_clock, &mut provider);
        runtime.engine_mut().shutdown();
    }

    let status = runtime.engine().status();
    info!(
        "Final status: calibrated={} tour_completed={} samples trained={} screen={:?}",
        status.calibrated,
        status.tour_completed,
        runtime.engine().trainer().samples,
        status.screen
    );
    Ok(())
}
