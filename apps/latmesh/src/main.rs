mod logging;
mod seeds;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use latmesh_graph::{
    export_graph, graph_stats, merge_graphs, prune_graph, ExportFormat, Layout, PruneCriteria,
};
use latmesh_render::{show_graph, PngCanvas, RenderSettings};
use latmesh_scan::{parse_duration, NullCanvas, ScanConfig, Scanner, UpdateMode};
use latmesh_trace::SystemTraceroute;
use latmesh_web::{serve_directory, serve_live, ServeOptions};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser)]
#[command(name = "latmesh", version, about = "Local async internet latency mapper")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Scan(ScanArgs),
    Show(ShowArgs),
    Export(ExportArgs),
    Stats(StatsArgs),
    Prune(PruneArgs),
    Merge(MergeArgs),
    Seed(SeedArgs),
    Serve(ServeArgs),
}

#[derive(Args, Clone)]
#[command(
    about = "Trace outward from seed networks and map latency. Only probe networks you have permission to test."
)]
struct ScanArgs {
    /// Seed addresses (defaults to well-known public resolvers)
    #[arg(value_name = "SEEDS")]
    seeds: Vec<String>,

    #[arg(short = 's', long, default_value = "internet_map")]
    save_base: PathBuf,

    /// Concurrent traceroute workers
    #[arg(short = 'w', long, default_value_t = 5)]
    workers: usize,

    /// Traceroutes per second, per worker
    #[arg(long, default_value_t = 1.0)]
    pps: f64,

    #[arg(long, default_value_t = 16)]
    prefix: u8,

    /// 0 disables the cap
    #[arg(long, default_value_t = 4096)]
    max_per_seed: usize,

    /// Per-hop timeout in seconds
    #[arg(long, default_value_t = 1.0)]
    timeout: f64,

    #[arg(long, default_value_t = 30)]
    max_hops: u32,

    /// Skip the live map
    #[arg(long)]
    no_display: bool,

    /// fixed or dynamic
    #[arg(long, default_value = "fixed")]
    update_mode: String,

    /// Seconds between redraws (fixed mode)
    #[arg(long, default_value_t = 1.0)]
    update_interval: f64,

    /// Traceroutes per redraw (dynamic mode)
    #[arg(long, default_value_t = 5)]
    update_count: u64,

    #[arg(long, default_value = "radial")]
    layout: Layout,

    /// Stop after this long, e.g. 90s, 5m, 2h
    #[arg(long)]
    duration: Option<String>,

    /// Stop after this many successful traces; 0 or less stops at once
    #[arg(long, allow_negative_numbers = true)]
    max_traces: Option<i64>,

    /// Chance of requeueing an already seen hop
    #[arg(long, default_value_t = 0.02)]
    revisit: f64,
}

#[derive(Args)]
struct ShowArgs {
    graph: PathBuf,

    #[arg(long, default_value = "radial")]
    layout: Layout,

    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct ExportArgs {
    graph: PathBuf,

    /// gexf or csv
    #[arg(long, default_value = "gexf")]
    format: String,

    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct StatsArgs {
    graph: PathBuf,
}

#[derive(Args)]
struct PruneArgs {
    graph: PathBuf,

    /// Drop nodes not seen within this window, e.g. 7d
    #[arg(long)]
    older_than: Option<String>,

    /// Drop nodes faster than this many milliseconds
    #[arg(long)]
    min_latency: Option<f64>,

    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct MergeArgs {
    #[arg(required = true)]
    graphs: Vec<PathBuf>,

    #[arg(long)]
    output: PathBuf,
}

#[derive(Args)]
struct SeedArgs {
    seeds: Vec<String>,

    /// Start with the default gateway and public resolvers
    #[arg(long)]
    auto: bool,
}

#[derive(Args)]
struct ServeArgs {
    #[command(flatten)]
    scan: ScanArgs,

    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    #[arg(long, default_value_t = 8000)]
    port: u16,

    /// Serve this directory as static files instead of scanning
    #[arg(long)]
    directory: Option<PathBuf>,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let log_guard = logging::init();

    match cli.command {
        Commands::Scan(args) => run_scan(args, log_guard),
        Commands::Show(args) => run_show(args),
        Commands::Export(args) => run_export(args),
        Commands::Stats(args) => run_stats(args),
        Commands::Prune(args) => run_prune(args),
        Commands::Merge(args) => run_merge(args),
        Commands::Seed(args) => run_seed(args),
        Commands::Serve(args) => run_serve(args),
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}

fn scan_config(args: &ScanArgs) -> Result<ScanConfig> {
    let hop_timeout = Duration::try_from_secs_f64(args.timeout.max(0.001))
        .map_err(|_| anyhow!("invalid --timeout: {}", args.timeout))?;
    let duration = args.duration.as_deref().map(parse_duration).transpose()?;
    let update_mode =
        UpdateMode::from_parts(&args.update_mode, args.update_interval, args.update_count)?;

    Ok(ScanConfig {
        seeds: seeds::dedup(args.seeds.iter().cloned()),
        prefix: args.prefix,
        max_per_seed: Some(args.max_per_seed),
        workers: args.workers,
        pps: args.pps,
        hop_timeout,
        max_hops: args.max_hops,
        save_base: args.save_base.clone(),
        display: !args.no_display,
        layout: args.layout,
        update_mode,
        duration,
        max_traces: args.max_traces.map(|limit| limit.max(0) as u64),
        revisit_probability: args.revisit,
        ..ScanConfig::default()
    })
}

fn live_map_path(save_base: &std::path::Path) -> PathBuf {
    let mut name = save_base.as_os_str().to_os_string();
    name.push("_live.png");
    PathBuf::from(name)
}

fn run_scan(args: ScanArgs, log_guard: WorkerGuard) -> Result<()> {
    let config = scan_config(&args)?;
    let tracer = Arc::new(SystemTraceroute::default());

    let outcome = runtime()?.block_on(async move {
        if config.display {
            let canvas = PngCanvas::new(
                live_map_path(&config.save_base),
                config.layout,
                RenderSettings::default(),
            );
            tracing::info!(path = %canvas.output().display(), "live map");
            Scanner::new(config, tracer, canvas)
                .with_log_guard(log_guard)
                .run()
                .await
        } else {
            Scanner::new(config, tracer, NullCanvas)
                .with_log_guard(log_guard)
                .run()
                .await
        }
    })?;

    println!(
        "scan: {} traces, {} nodes, {} edges -> {}",
        outcome.successes,
        outcome.nodes,
        outcome.edges,
        outcome.saved_to.display()
    );
    Ok(())
}

fn run_show(args: ShowArgs) -> Result<()> {
    let target = show_graph(
        &args.graph,
        args.layout,
        args.output.as_deref(),
        &RenderSettings::default(),
    )?;
    println!("show: wrote {}", target.display());
    Ok(())
}

fn run_export(args: ExportArgs) -> Result<()> {
    let format: ExportFormat = args.format.parse()?;
    let target = export_graph(&args.graph, format, args.output.as_deref())?;
    println!("export: wrote {}", target.display());
    Ok(())
}

fn run_stats(args: StatsArgs) -> Result<()> {
    let stats = graph_stats(&args.graph)?;
    for line in format_stats(&stats) {
        println!("{line}");
    }
    Ok(())
}

fn format_stats(stats: &latmesh_model::GraphStats) -> Vec<String> {
    vec![
        format!("{:>12}: {}", "nodes", stats.nodes),
        format!("{:>12}: {}", "edges", stats.edges),
        format!("{:>12}: {}", "components", stats.components),
        format!("{:>12}: {:.2}", "avg_degree", stats.avg_degree),
        format!("{:>12}: {:.2}", "avg_latency", stats.avg_latency),
    ]
}

fn run_prune(args: PruneArgs) -> Result<()> {
    let criteria = PruneCriteria {
        older_than: args.older_than.as_deref().map(parse_duration).transpose()?,
        min_latency: args.min_latency,
    };
    let target = prune_graph(&args.graph, &criteria, args.output.as_deref())?;
    println!("prune: wrote {}", target.display());
    Ok(())
}

fn run_merge(args: MergeArgs) -> Result<()> {
    let target = merge_graphs(&args.graphs, &args.output)?;
    println!("merge: wrote {}", target.display());
    Ok(())
}

fn run_seed(args: SeedArgs) -> Result<()> {
    for seed in seed_list(&args) {
        println!("{seed}");
    }
    Ok(())
}

fn seed_list(args: &SeedArgs) -> Vec<String> {
    let auto = if args.auto {
        seeds::auto_seeds()
    } else {
        Vec::new()
    };
    seeds::dedup(auto.into_iter().chain(args.seeds.iter().cloned()))
}

fn run_serve(args: ServeArgs) -> Result<()> {
    let runtime = runtime()?;
    if let Some(directory) = args.directory {
        return runtime.block_on(serve_directory(
            &directory,
            &args.host,
            args.port,
            async {
                let _ = tokio::signal::ctrl_c().await;
            },
        ));
    }

    let config = scan_config(&args.scan)?;
    let options = ServeOptions {
        host: args.host,
        port: args.port,
        ..ServeOptions::default()
    };
    runtime.block_on(serve_live(
        config,
        Arc::new(SystemTraceroute::default()),
        options,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("latmesh").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn scan_flags_map_onto_config() {
        let Commands::Scan(args) = parse(&[
            "scan",
            "192.0.2.1",
            "192.0.2.1",
            "-w",
            "3",
            "--prefix",
            "24",
            "--update-mode",
            "dynamic",
            "--update-count",
            "2",
            "--duration",
            "5m",
            "--max-traces",
            "-3",
            "--no-display",
            "--layout",
            "layered",
        ])
        .command
        else {
            panic!("expected scan");
        };

        let config = scan_config(&args).unwrap();
        assert_eq!(config.seeds, vec!["192.0.2.1"]);
        assert_eq!(config.workers, 3);
        assert_eq!(config.prefix, 24);
        assert_eq!(config.update_mode, UpdateMode::Dynamic { count: 2 });
        assert_eq!(config.duration, Some(Duration::from_secs(300)));
        assert_eq!(config.max_traces, Some(0));
        assert!(!config.display);
        assert_eq!(config.layout, Layout::Layered);
    }

    #[test]
    fn scan_defaults_match_config_defaults() {
        let Commands::Scan(args) = parse(&["scan"]).command else {
            panic!("expected scan");
        };
        let config = scan_config(&args).unwrap();
        let defaults = ScanConfig::default();
        assert!(config.seeds.is_empty());
        assert_eq!(config.save_base, defaults.save_base);
        assert_eq!(config.max_per_seed, defaults.max_per_seed);
        assert_eq!(config.hop_timeout, defaults.hop_timeout);
        assert_eq!(config.update_mode, defaults.update_mode);
        assert_eq!(config.revisit_probability, defaults.revisit_probability);
        assert_eq!(config.max_traces, None);
    }

    #[test]
    fn bad_duration_is_reported() {
        let Commands::Scan(args) = parse(&["scan", "--duration", "soon"]).command else {
            panic!("expected scan");
        };
        assert!(scan_config(&args).is_err());
    }

    #[test]
    fn unknown_layout_is_rejected_by_the_parser() {
        assert!(Cli::try_parse_from(["latmesh", "show", "map", "--layout", "kamada"]).is_err());
    }

    #[test]
    fn seed_listing_keeps_order_without_duplicates() {
        let args = SeedArgs {
            seeds: vec!["192.0.2.1".into(), "192.0.2.1".into(), "198.51.100.1".into()],
            auto: false,
        };
        assert_eq!(seed_list(&args), vec!["192.0.2.1", "198.51.100.1"]);

        let args = SeedArgs {
            seeds: vec!["8.8.8.8".into()],
            auto: true,
        };
        let listed = seed_list(&args);
        assert_eq!(listed.iter().filter(|s| *s == "8.8.8.8").count(), 1);
        assert!(listed.contains(&"9.9.9.9".to_string()));
    }

    #[test]
    fn stats_lines_are_aligned() {
        let lines = format_stats(&latmesh_model::GraphStats {
            nodes: 4,
            edges: 3,
            components: 1,
            avg_degree: 1.5,
            avg_latency: 4.0 / 3.0,
        });
        assert_eq!(lines[0], "       nodes: 4");
        assert_eq!(lines[3], "  avg_degree: 1.50");
        assert_eq!(lines[4], " avg_latency: 1.33");
    }

    #[test]
    fn live_map_sits_next_to_the_save_base() {
        assert_eq!(
            live_map_path(std::path::Path::new("out/internet_map")),
            PathBuf::from("out/internet_map_live.png")
        );
    }

    #[test]
    fn serve_accepts_scan_options() {
        let Commands::Serve(args) = parse(&["serve", "--port", "9000", "-w", "2"]).command else {
            panic!("expected serve");
        };
        assert_eq!(args.port, 9000);
        assert_eq!(args.scan.workers, 2);
        assert!(args.directory.is_none());
    }
}
