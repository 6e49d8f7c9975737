//! `wispd` — the Wisp daemon and cluster client.
//!
//! # Usage
//!
//! ```text
//! wispd serve -c wisp.toml                  # run a node
//! wispd locate app.host.cpu other.metric    # resolve owners
//! echo '["a.b","c.d"]' | wispd locate -     # keys from stdin
//! wispd locate --single --host graphite010 a.b
//! wispd servers                             # print every node's ring view
//! ```

mod config;

use std::collections::BTreeMap;
use std::io::Read;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use wisp_api::ApiServer;
use wisp_cluster::{
    fetch_ring_views, is_healthy, locate_metrics, HttpRingSource, LocateOptions, RingSource,
};
use wisp_store::{FileBackend, MetricStore};
use wisp_types::{Node, RingView};

use config::CliConfig;

// -----------------------------------------------------------------------
// CLI definition
// -----------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "wispd", version, about = "Wisp metric cluster daemon and client")]
struct Cli {
    /// Path to TOML config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a storage node.
    Serve {
        /// Override the data directory.
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// Override the listen address (e.g. "0.0.0.0:4242").
        #[arg(short, long)]
        listen_addr: Option<String>,
    },

    /// Resolve metric keys to their owning nodes.
    Locate {
        /// Metric keys, or a single `-` to read a JSON array from stdin.
        #[arg(required = true)]
        keys: Vec<String>,

        /// Trust one host's ring view without cross-checking peers.
        #[arg(short, long)]
        single: bool,

        /// Host to query (defaults to the configured node host).
        #[arg(long)]
        host: Option<String>,

        /// Treat any unreachable node as fatal.
        #[arg(long)]
        strict: bool,

        /// Output a JSON object instead of `key => node` lines.
        #[arg(short, long)]
        json: bool,
    },

    /// Print every node's reported ring view and the health verdict.
    Servers {
        /// Host to bootstrap the node list from when none is configured.
        #[arg(long)]
        host: Option<String>,
    },
}

// -----------------------------------------------------------------------
// Entrypoint
// -----------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = CliConfig::load(cli.config.as_deref()).context("failed to load config")?;

    setup_tracing(&config.log.level);

    match cli.command {
        Commands::Serve {
            data_dir,
            listen_addr,
        } => {
            // CLI args override config file values.
            if let Some(dir) = data_dir {
                config.node.data_dir = dir;
            }
            if let Some(addr) = listen_addr {
                config.node.listen_addr = addr;
            }
            cmd_serve(config).await
        }
        Commands::Locate {
            keys,
            single,
            host,
            strict,
            json,
        } => cmd_locate(&config, keys, single, host, strict, json).await,
        Commands::Servers { host } => cmd_servers(&config, host).await,
    }
}

/// Initialize the `tracing` subscriber with the given level filter.
///
/// Respects `RUST_LOG` env var if set, otherwise uses the config value.
fn setup_tracing(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

// -----------------------------------------------------------------------
// wispd serve
// -----------------------------------------------------------------------

async fn cmd_serve(config: CliConfig) -> Result<()> {
    let identity = config.node_identity();
    info!(
        node = %identity,
        data_dir = %config.node.data_dir.display(),
        listen_addr = %config.node.listen_addr,
        cluster_nodes = config.cluster.nodes.len(),
        "starting wispd"
    );

    let backend = Arc::new(
        FileBackend::new(&config.node.data_dir).context("failed to open data directory")?,
    );

    let mut nodes = config.cluster.nodes.clone();
    if nodes.is_empty() {
        info!("no cluster nodes configured, running standalone");
        nodes.push(identity.clone());
    } else if !nodes.iter().any(|n| n == &identity) {
        warn!(
            node = %identity,
            "this node is not in the configured cluster list; peers will see an inconsistent ring"
        );
    }
    let view = RingView {
        name: identity,
        nodes,
    };

    let store = Arc::new(MetricStore::new(backend, view));
    // Warm the inventory in the background; listings answer 202 until done.
    store.trigger_rebuild();

    let server = ApiServer::new(store);
    server
        .serve_with_shutdown(&config.node.listen_addr, async {
            tokio::signal::ctrl_c().await.ok();
            info!("shutdown signal received");
        })
        .await
        .context("node API server failed")?;

    Ok(())
}

// -----------------------------------------------------------------------
// wispd locate
// -----------------------------------------------------------------------

async fn cmd_locate(
    config: &CliConfig,
    keys: Vec<String>,
    single: bool,
    host: Option<String>,
    strict: bool,
    json: bool,
) -> Result<()> {
    let keys = read_keys(&keys)?;
    let source = HttpRingSource::new(config.cluster.port, config.query_timeout())?;
    let query_host = host.unwrap_or_else(|| config.node.host.clone());

    let opts = if single {
        LocateOptions {
            nodes: Vec::new(),
            single_host: Some(query_host),
            strict: false,
        }
    } else {
        LocateOptions {
            nodes: cluster_hosts(config, &source, &query_host).await?,
            single_host: None,
            strict,
        }
    };

    let placements = locate_metrics(&source, &opts, &keys).await?;
    print!("{}", format_placements(&placements, json)?);
    Ok(())
}

/// Expand positional key arguments; a sole `-` reads a JSON array from stdin.
fn read_keys(args: &[String]) -> Result<Vec<String>> {
    if args.len() == 1 && args[0] == "-" {
        let mut input = String::new();
        std::io::stdin()
            .read_to_string(&mut input)
            .context("failed to read stdin")?;
        return parse_stdin_keys(&input);
    }
    Ok(args.to_vec())
}

fn parse_stdin_keys(input: &str) -> Result<Vec<String>> {
    let keys: Vec<String> =
        serde_json::from_str(input).context("stdin is not a JSON array of metric keys")?;
    if keys.is_empty() {
        bail!("no metric keys supplied");
    }
    Ok(keys)
}

/// Hosts to query for ring views.
///
/// Uses the configured cluster list when present; otherwise bootstraps by
/// asking one host for its view and querying the members it reports.
/// `host:instance` specs collapse to their host, which serves all of its
/// instances on one port.
async fn cluster_hosts(
    config: &CliConfig,
    source: &dyn RingSource,
    bootstrap_host: &str,
) -> Result<Vec<String>> {
    let specs = if config.cluster.nodes.is_empty() {
        let view = source
            .fetch_ring(bootstrap_host)
            .await
            .with_context(|| format!("failed to bootstrap node list from {bootstrap_host}"))?;
        view.nodes
    } else {
        config.cluster.nodes.clone()
    };

    let mut hosts = Vec::new();
    for spec in &specs {
        let node = Node::from_str(spec).with_context(|| format!("bad node spec {spec:?}"))?;
        if !hosts.contains(&node.host) {
            hosts.push(node.host);
        }
    }
    if hosts.is_empty() {
        bail!("no cluster nodes configured");
    }
    Ok(hosts)
}

/// Render placements as `key => node` lines or a JSON object.
fn format_placements(placements: &BTreeMap<String, Node>, json: bool) -> Result<String> {
    if json {
        let map: BTreeMap<&str, String> = placements
            .iter()
            .map(|(key, node)| (key.as_str(), node.identity()))
            .collect();
        let mut out = serde_json::to_string_pretty(&map)?;
        out.push('\n');
        return Ok(out);
    }

    let mut out = String::new();
    for (key, node) in placements {
        out.push_str(&format!("{key} => {node}\n"));
    }
    Ok(out)
}

// -----------------------------------------------------------------------
// wispd servers
// -----------------------------------------------------------------------

async fn cmd_servers(config: &CliConfig, host: Option<String>) -> Result<()> {
    let source = HttpRingSource::new(config.cluster.port, config.query_timeout())?;
    let bootstrap = host.unwrap_or_else(|| config.node.host.clone());
    let hosts = cluster_hosts(config, &source, &bootstrap).await?;

    let views = fetch_ring_views(&source, &hosts).await;
    for (host, view) in &views {
        match view {
            Some(view) => println!("{}: {}", host, view.nodes.join(" ")),
            None => println!("{host}: unreachable"),
        }
    }

    if is_healthy(&views, false) {
        println!("Cluster is consistent.");
        Ok(())
    } else {
        bail!("cluster ring views are inconsistent or unavailable");
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_locate_parses_keys_and_flags() {
        let cli = Cli::try_parse_from([
            "wispd", "locate", "--single", "--json", "--host", "graphite010", "a.b", "c.d",
        ])
        .unwrap();

        match cli.command {
            Commands::Locate {
                keys,
                single,
                host,
                json,
                strict,
            } => {
                assert_eq!(keys, vec!["a.b", "c.d"]);
                assert!(single);
                assert!(json);
                assert!(!strict);
                assert_eq!(host.as_deref(), Some("graphite010"));
            }
            _ => panic!("expected Locate command"),
        }
    }

    #[test]
    fn test_cli_locate_requires_keys() {
        assert!(Cli::try_parse_from(["wispd", "locate"]).is_err());
    }

    #[test]
    fn test_cli_serve_overrides() {
        let cli = Cli::try_parse_from([
            "wispd",
            "serve",
            "--data-dir",
            "/tmp/x",
            "--listen-addr",
            "127.0.0.1:9000",
        ])
        .unwrap();

        match cli.command {
            Commands::Serve {
                data_dir,
                listen_addr,
            } => {
                assert_eq!(data_dir, Some(PathBuf::from("/tmp/x")));
                assert_eq!(listen_addr.as_deref(), Some("127.0.0.1:9000"));
            }
            _ => panic!("expected Serve command"),
        }
    }

    #[test]
    fn test_parse_stdin_keys() {
        let keys = parse_stdin_keys(r#"["a.b", "c.d"]"#).unwrap();
        assert_eq!(keys, vec!["a.b", "c.d"]);

        assert!(parse_stdin_keys("not json").is_err());
        assert!(parse_stdin_keys("[]").is_err());
        assert!(parse_stdin_keys(r#"{"a": 1}"#).is_err());
    }

    #[test]
    fn test_read_keys_passthrough() {
        let args = vec!["a.b".to_string(), "c.d".to_string()];
        assert_eq!(read_keys(&args).unwrap(), args);

        // A "-" among other keys is a literal key, not the stdin token.
        let mixed = vec!["a.b".to_string(), "-".to_string()];
        assert_eq!(read_keys(&mixed).unwrap(), mixed);
    }

    #[test]
    fn test_format_placements_text() {
        let mut placements = BTreeMap::new();
        placements.insert("a.b".to_string(), Node::new("node1", None));
        placements.insert(
            "c.d".to_string(),
            Node::new("node2", Some("x".to_string())),
        );

        let out = format_placements(&placements, false).unwrap();
        assert_eq!(out, "a.b => node1\nc.d => node2:x\n");
    }

    #[test]
    fn test_format_placements_json() {
        let mut placements = BTreeMap::new();
        placements.insert("a.b".to_string(), Node::new("node1", None));

        let out = format_placements(&placements, true).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["a.b"], "node1");
    }

    #[tokio::test]
    async fn test_serve_binds_and_answers_hashring() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FileBackend::new(dir.path()).unwrap());
        let view = RingView {
            name: "test-node".to_string(),
            nodes: vec!["test-node".to_string()],
        };
        let store = Arc::new(MetricStore::new(backend, view));
        let server = ApiServer::new(store);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let bound_addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, server.into_router()).await.ok();
        });

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let conn = tokio::net::TcpStream::connect(bound_addr).await;
        assert!(conn.is_ok(), "should be able to connect to the node port");

        handle.abort();
    }
}
