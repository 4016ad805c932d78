//! skynoise - drone delivery noise experiments from the command line.
//!
//! Usage:
//!   skynoise run --scenario city.json --navigator HEAVY_NOISE --drones 20
//!   skynoise build-graph --scenario city.json
//!   skynoise warm-cache --scenario city.json --navigator NOISE_A050
//!   skynoise bake-routes --scenario city.json --orders-file orders.csv
//!   skynoise generate-orders --scenario city.json --count 500 --out orders.csv

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use skynoise_cli::{write_outcome, DemoOrders};
use skynoise_core::{
    load_baseline, load_orders, save_orders, NavGraph, NavigatorType, Planner, RouteCache,
    ScenarioFile, SimConfig, SimConfigBuilder, Simulator,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Simulate delivery drone fleets and the noise they add")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one experiment and write its result files
    Run(RunArgs),
    /// Build the navigation graph files from the navigation baseline
    BuildGraph(ScenarioArgs),
    /// Precompute the warehouse shortest-path trees for a navigator
    WarmCache(WarmCacheArgs),
    /// Bake the LIGHT_NOISE polyline cache for an order dataset
    BakeRoutes(BakeRoutesArgs),
    /// Write a seeded demo order dataset
    GenerateOrders(GenerateOrdersArgs),
}

#[derive(Args, Debug)]
struct ScenarioArgs {
    /// Scenario JSON file (map, warehouses, baseline and cache paths)
    #[arg(long)]
    scenario: PathBuf,

    /// JSON config file; SKYNOISE_* environment variables are used otherwise
    #[arg(long)]
    config: Option<PathBuf>,

    /// Navigation graph cell size in metres
    #[arg(long)]
    nav_cell_size: Option<f64>,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    scenario: ScenarioArgs,

    #[arg(long)]
    navigator: Option<NavigatorType>,

    #[arg(long)]
    drones: Option<usize>,

    #[arg(long)]
    orders: Option<usize>,

    /// Orders CSV
    #[arg(long)]
    orders_file: Option<PathBuf>,

    #[arg(long)]
    landing: bool,

    #[arg(long)]
    compute_on_miss: bool,

    /// Log fleet status periodically
    #[arg(long)]
    stats: bool,

    /// Include cell centroids in the impact CSV
    #[arg(long)]
    plot_map: bool,

    /// Stop at the next tick after this many wall-clock seconds
    #[arg(long)]
    max_wall_secs: Option<u64>,

    #[arg(long, default_value = "results")]
    out: PathBuf,
}

#[derive(Args, Debug)]
struct WarmCacheArgs {
    #[command(flatten)]
    scenario: ScenarioArgs,

    #[arg(long, default_value = "HEAVY_NOISE")]
    navigator: NavigatorType,
}

#[derive(Args, Debug)]
struct BakeRoutesArgs {
    #[command(flatten)]
    scenario: ScenarioArgs,

    /// Orders CSV; defaults to the configured dataset
    #[arg(long)]
    orders_file: Option<PathBuf>,

    /// Only bake the first N orders
    #[arg(long)]
    limit: Option<usize>,
}

#[derive(Args, Debug)]
struct GenerateOrdersArgs {
    #[arg(long)]
    scenario: PathBuf,

    #[arg(long, default_value_t = 100)]
    count: usize,

    /// Maximum customer offset from the warehouse, per axis
    #[arg(long, default_value_t = 3000.0)]
    radius: f64,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    #[arg(long, default_value = "orders.csv")]
    out: PathBuf,
}

fn main() -> Result<()> {
    skynoise_cli::logging::init()?;

    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run(args),
        Command::BuildGraph(args) => build_graph(args),
        Command::WarmCache(args) => warm_cache(args),
        Command::BakeRoutes(args) => bake_routes(args),
        Command::GenerateOrders(args) => generate_orders(args),
    }
}

fn base_config(args: &ScenarioArgs) -> Result<SimConfigBuilder> {
    let config = match &args.config {
        Some(path) => skynoise_core::persist::read_json::<SimConfig>(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => SimConfig::from_env(),
    };
    let mut builder = SimConfigBuilder::from_config(config);
    if let Some(size) = args.nav_cell_size {
        builder = builder.nav_cell_size_m(size);
    }
    Ok(builder)
}

fn load_scenario(path: &Path) -> Result<ScenarioFile> {
    ScenarioFile::load(path).with_context(|| format!("loading scenario {}", path.display()))
}

fn run(args: RunArgs) -> Result<()> {
    let mut builder = base_config(&args.scenario)?;
    if let Some(navigator) = args.navigator {
        builder = builder.navigator_type(navigator);
    }
    if let Some(drones) = args.drones {
        builder = builder.drones(drones);
    }
    if let Some(orders) = args.orders {
        builder = builder.orders(orders);
    }
    if let Some(path) = &args.orders_file {
        builder = builder.order_dataset_path(path);
    }
    if args.landing {
        builder = builder.drone_landing(true);
    }
    if args.compute_on_miss {
        builder = builder.compute_on_miss(true);
    }
    if args.stats {
        builder = builder.print_model_stats(true);
    }
    if args.plot_map {
        builder = builder.plot_map(true);
    }
    let config = builder.build().context("invalid configuration")?;

    let scenario = load_scenario(&args.scenario.scenario)?
        .build(&config)
        .context("building scenario")?;
    let simulator = Simulator::new(&config, &scenario).context("preparing simulation")?;

    let cancel = Arc::new(AtomicBool::new(false));
    if let Some(secs) = args.max_wall_secs {
        let flag = cancel.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_secs(secs));
            flag.store(true, Ordering::Relaxed);
        });
    }

    let outcome = simulator.run_until(&cancel);
    tracing::info!(
        navigator = %outcome.result.navigation_type,
        delivered = outcome.result.delivered_orders_number,
        orders = outcome.result.num_orders,
        avg_noise_diff = outcome.result.avg_noise_diff,
        seconds = outcome.result.execution_time_seconds,
        "run complete"
    );
    write_outcome(&args.out, &config, &outcome)?;
    if outcome.cancelled {
        tracing::warn!("results are partial: run stopped before every order settled");
    }
    Ok(())
}

fn build_graph(args: ScenarioArgs) -> Result<()> {
    let config = base_config(&args)?.build()?;
    let file = load_scenario(&args.scenario)?;
    let Some(files) = &file.nav_graph else {
        bail!("scenario has no nav_graph output paths");
    };
    let Some(baseline) = &file.nav_baseline_path else {
        bail!("scenario has no nav_baseline_path to build from");
    };

    let projection = file.projection.projection();
    let cells = load_baseline(baseline, projection.as_ref())
        .with_context(|| format!("reading {}", baseline.display()))?;
    let graph = NavGraph::from_baseline(&cells, config.nav_cell_size_m)?;
    graph
        .save(&files.json, &files.binary)
        .context("saving navigation graph")?;
    tracing::info!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        json = %files.json.display(),
        binary = %files.binary.display(),
        "navigation graph written"
    );
    Ok(())
}

fn warm_cache(args: WarmCacheArgs) -> Result<()> {
    let config = base_config(&args.scenario)?
        .navigator_type(args.navigator)
        .compute_on_miss(true)
        .build()?;
    let scenario = load_scenario(&args.scenario.scenario)?.build(&config)?;
    if scenario.path_cache_dir.is_none() {
        bail!("scenario has no path_cache_dir");
    }
    let router = Planner::router(args.navigator, &scenario)?;
    let stats = router.stats();
    tracing::info!(
        navigator = %args.navigator,
        anchors = router.anchors().count(),
        computed = stats.trees_computed,
        "warehouse path cache ready"
    );
    Ok(())
}

fn bake_routes(args: BakeRoutesArgs) -> Result<()> {
    let mut builder = base_config(&args.scenario)?
        .navigator_type(NavigatorType::LightNoise)
        .compute_on_miss(true);
    if let Some(path) = &args.orders_file {
        builder = builder.order_dataset_path(path);
    }
    let config = builder.build()?;
    let scenario = load_scenario(&args.scenario.scenario)?.build(&config)?;
    let Some(cache_path) = scenario.route_cache_path.clone() else {
        bail!("scenario has no route_cache_path");
    };

    let orders = load_orders(&config.order_dataset_path, args.limit.unwrap_or(usize::MAX))?;
    let mut cache = if cache_path.exists() {
        RouteCache::load(&cache_path)?
    } else {
        RouteCache::default()
    };
    let mut router = Planner::router(NavigatorType::LightNoise, &scenario)?;
    let failures = cache.bake(&mut router, &orders);
    cache.save(&cache_path)?;
    tracing::info!(
        routes = cache.len(),
        failures,
        path = %cache_path.display(),
        "route cache baked"
    );
    Ok(())
}

fn generate_orders(args: GenerateOrdersArgs) -> Result<()> {
    let file = load_scenario(&args.scenario)?;
    let demo = DemoOrders {
        count: args.count,
        max_radius_m: args.radius,
        seed: args.seed,
    };
    let orders = demo.generate(&file.boundaries, &file.warehouses);
    save_orders(&args.out, &orders).with_context(|| format!("writing {}", args.out.display()))?;
    tracing::info!(count = orders.len(), path = %args.out.display(), "orders written");
    Ok(())
}
