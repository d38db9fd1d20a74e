use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use hubtopo_collect::{content_hash, match_all, match_apis, Selector};
use hubtopo_core::{Topology, TrackedKind};
use hubtopo_kubehub::{KubeClusterClient, VersionGate};
use hubtopo_store::{parse_kinds, CycleReport, FailurePolicy, FetchConfig, Fetcher};
use serde_json::json;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "hubtopoctl", version, about = "Inspect hub topology and API collections")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Failure policy: strict or best-effort (overrides HUBTOPO_FETCH_POLICY)
    #[arg(long, global = true)]
    policy: Option<FailurePolicy>,

    /// Maximum concurrent list requests
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    /// Cycle deadline in seconds, 0 disables
    #[arg(long = "deadline-secs", global = true)]
    deadline_secs: Option<u64>,

    /// Lowest accepted 1.x minor version
    #[arg(long = "min-minor", global = true)]
    min_minor: Option<u32>,

    /// Comma separated kinds to fetch, e.g. "Ingress,API"
    #[arg(long, global = true)]
    kinds: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check a server version and show which group/versions would be read
    Gate {
        /// e.g. "v1.21.3"
        version: String,
    },
    /// Fetch one snapshot from the current kube context
    Snapshot,
    /// Match every API collection and report hashes
    Collections,
    /// Match APIs against an ad-hoc selector
    Match {
        /// e.g. "team=checkout,env in (prod),!legacy"
        selector: String,
        /// Collection path prefix; with the collection's own prefix the
        /// printed hash equals the one `collections` reports
        #[arg(long = "path-prefix", default_value = "")]
        path_prefix: String,
    },
}

fn init_tracing() {
    let env = std::env::var("HUBTOPO_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("HUBTOPO_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            warn!(addr = %addr, "invalid HUBTOPO_METRICS_ADDR; expected host:port");
        }
    }
}

fn fetch_config(cli: &Cli) -> Result<FetchConfig> {
    let mut cfg = FetchConfig::from_env();
    if let Some(policy) = cli.policy {
        cfg.policy = policy;
    }
    if let Some(n) = cli.concurrency {
        cfg.concurrency = n.max(1);
    }
    if let Some(secs) = cli.deadline_secs {
        cfg.deadline = (secs > 0).then(|| Duration::from_secs(secs));
    }
    if let Some(m) = cli.min_minor {
        cfg.min_minor = m;
    }
    if let Some(list) = cli.kinds.as_deref() {
        cfg.kinds = parse_kinds(list).context("parsing --kinds")?;
    }
    Ok(cfg)
}

/// One fetch cycle against the current kube context. Ctrl-C cancels it.
async fn fetch_once(cfg: FetchConfig) -> Result<CycleReport> {
    let client = KubeClusterClient::try_default().await?;
    let fetcher = Fetcher::new(Arc::new(client), cfg).await.context("admitting cluster")?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    let watcher = tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("interrupt received; cancelling fetch");
            on_signal.cancel();
        }
    });
    let res = fetcher.fetch(&cancel).await;
    watcher.abort();

    let report = res.context("fetch cycle")?;
    for failure in &report.failures {
        warn!(error = %failure, "kind missing from snapshot");
    }
    Ok(report)
}

fn print_snapshot(topo: &Topology) {
    println!("server {} • epoch {}", topo.server_version, topo.epoch);
    for kind in TrackedKind::ALL {
        if topo.missing_kinds.contains(&kind) {
            println!("{kind} • missing");
            continue;
        }
        let keys = topo.keys_of(kind);
        println!("{kind} • {}", keys.len());
        for key in keys {
            println!("  {key}");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();
    let cfg = fetch_config(&cli)?;

    match &cli.command {
        Commands::Gate { version } => {
            let caps = VersionGate::new(cfg.min_minor).admit(version)?;
            match cli.output {
                Output::Human => {
                    println!("{} admitted", caps.version());
                    for kind in &cfg.kinds {
                        let plan: Vec<String> = caps.plan(*kind).iter().map(|s| s.api_version()).collect();
                        if plan.is_empty() {
                            println!("{kind} • not served");
                        } else {
                            println!("{kind} • {}", plan.join(" → "));
                        }
                    }
                }
                Output::Json => {
                    let plans: serde_json::Map<String, serde_json::Value> = cfg
                        .kinds
                        .iter()
                        .map(|k| (k.to_string(), json!(caps.plan(*k).iter().map(|s| s.api_version()).collect::<Vec<_>>())))
                        .collect();
                    println!("{}", serde_json::to_string_pretty(&json!({ "version": caps.version().to_string(), "plans": plans }))?);
                }
            }
        }
        Commands::Snapshot => {
            let report = fetch_once(cfg).await?;
            match cli.output {
                Output::Human => print_snapshot(&report.snapshot),
                Output::Json => println!("{}", serde_json::to_string_pretty(report.snapshot.as_ref())?),
            }
        }
        Commands::Collections => {
            let report = fetch_once(cfg).await?;
            let topo = &report.snapshot;
            let mut rows = Vec::new();
            for res in match_all(topo) {
                match res {
                    Ok(m) => {
                        let stale = topo.collections.values().find(|c| c.meta.name == m.name).map_or(true, |c| m.needs_sync(c));
                        match cli.output {
                            Output::Human => {
                                let state = if stale { "stale" } else { "in sync" };
                                println!("{} • {} apis • {} • {}", m.name, m.apis.len(), &m.hash[..12.min(m.hash.len())], state);
                            }
                            Output::Json => rows.push(json!({ "name": m.name, "apis": m.apis, "hash": m.hash, "stale": stale })),
                        }
                    }
                    Err(e) => match cli.output {
                        Output::Human => eprintln!("{e}"),
                        Output::Json => rows.push(json!({ "error": e.to_string() })),
                    },
                }
            }
            if cli.output == Output::Json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            }
        }
        Commands::Match { selector, path_prefix } => {
            let selector: Selector = selector.parse().context("parsing selector")?;
            let report = fetch_once(cfg).await?;
            let apis = match_apis(&report.snapshot, &selector);
            let hash = content_hash(path_prefix, &selector, &apis)?;
            match cli.output {
                Output::Human => {
                    for (key, api) in &apis {
                        println!("{key} • {}", api.path_prefix);
                    }
                    println!("{} apis • {}", apis.len(), hash);
                }
                Output::Json => {
                    let keys: Vec<&str> = apis.iter().map(|(key, _)| *key).collect();
                    println!("{}", serde_json::to_string_pretty(&json!({ "selector": selector.to_string(), "pathPrefix": path_prefix, "apis": keys, "hash": hash }))?);
                }
            }
        }
    }
    Ok(())
}
