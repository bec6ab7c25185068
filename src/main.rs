//! voxgraph - headless workbench driver
//!
//! Builds the default pipeline (loader, Gaussian smoothing, Laplace shader
//! filter, 3-D renderer with an outline cube), waits for the selected
//! preset to load and renders a fixed number of frames.
//!
//! Usage: `voxgraph [CONFIG] [FRAMES]`

use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use voxgraph::{
    collab::HeadlessSurface,
    config::WorkbenchConfig,
    error::ResultExt,
    graph::{Graph, ModuleFactory, ModuleId, ModuleType, PortId, PortKind},
};

const DEFAULT_FRAMES: u32 = 120;
const FRAME_TIME: Duration = Duration::from_millis(16);
const LOAD_TIMEOUT: Duration = Duration::from_secs(30);

fn main() -> anyhow::Result<()> {
    use anyhow::Context;

    let mut args = std::env::args().skip(1);
    let config_path = match args.next() {
        Some(path) => path.into(),
        None => WorkbenchConfig::default_path()?,
    };
    let frames = match args.next() {
        Some(n) => n.parse::<u32>().context("FRAMES must be a number")?,
        None => DEFAULT_FRAMES,
    };

    // Logging depends on the config, so a load failure is reported afterwards.
    let (config, config_error) = WorkbenchConfig::load_or_default_reporting(&config_path);
    let _log_guard = init_logging(&config);

    tracing::info!("Starting voxgraph with config {:?}", config_path);
    if let Some(e) = config_error {
        tracing::warn!("Failed to load config, using defaults: {}", e);
    }

    let surface_log = std::rc::Rc::new(std::cell::RefCell::new(None));
    let factory = {
        let surface_log = surface_log.clone();
        ModuleFactory::new(config).with_surface(move || {
            let surface = HeadlessSurface::new();
            *surface_log.borrow_mut() = Some(surface.log());
            Box::new(surface)
        })
    };

    let mut graph = Graph::new();
    let ids = build_default_pipeline(&factory, &mut graph)?;

    let started = std::time::Instant::now();
    while graph.pump_loads()? == 0 {
        if started.elapsed() > LOAD_TIMEOUT {
            anyhow::bail!("Timed out waiting for volume data");
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    for _ in 0..frames {
        graph.render_frame(FRAME_TIME)?;
    }

    if let Some(log) = surface_log.borrow().as_ref() {
        let log = log.borrow();
        tracing::info!(
            "Rendered {} draw call(s), {} texture upload(s)",
            log.draws.len(),
            log.uploads.len()
        );
    }
    tracing::debug!(
        "Topology: {}",
        serde_json::to_string(&graph.topology()).context("Failed to serialize topology")?
    );

    tracing::info!("Shutting down...");
    graph.remove_module(ids.renderer)?;
    Ok(())
}

struct PipelineIds {
    renderer: ModuleId,
}

fn build_default_pipeline(factory: &ModuleFactory, graph: &mut Graph) -> voxgraph::Result<PipelineIds> {
    let mut add = |module_type: ModuleType| {
        factory
            .create(module_type)
            .and_then(|module| graph.add_module(module))
            .with_context(|| format!("Failed to add {}", module_type))
    };
    let loader = add(ModuleType::ExampleDataLoader)?;
    let gauss = add(ModuleType::GaussSmoothingData)?;
    let laplace = add(ModuleType::LaplaceFilterShader)?;
    let cube = add(ModuleType::GeometryCube)?;
    let renderer = add(ModuleType::Renderer3d)?;

    let image = |from: ModuleId, to: ModuleId| {
        (
            PortId::output(from, PortKind::Image, 0),
            PortId::input(to, PortKind::Image, 0),
        )
    };
    for (output, input) in [image(loader, gauss), image(gauss, laplace), image(laplace, renderer)] {
        graph.connect(output, input).context("Failed to wire image ports")?;
    }
    graph
        .connect(
            PortId::output(cube, PortKind::Scene, 0),
            PortId::input(renderer, PortKind::Scene, 0),
        )
        .context("Failed to wire the scene port")?;

    Ok(PipelineIds { renderer })
}

/// Console logging plus an optional daily rolling file.
fn init_logging(config: &WorkbenchConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));

    match &config.logging.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "voxgraph.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
            None
        }
    }
}
