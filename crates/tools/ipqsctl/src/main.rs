use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use ipqs_client::{
    configure_proxy, Client, ClientConfig, DialStrategy, LookupError, LookupOptions, Verdict,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Command-line interface for reputation lookups
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(propagate_version = true)]
struct Cli {
    /// Optional TOML file with client settings
    #[clap(long, short, global = true)]
    config: Option<PathBuf>,

    /// Subcommand to execute
    #[clap(subcommand)]
    command: Commands,
}

/// CLI commands
#[derive(Subcommand)]
enum Commands {
    /// Look up the reputation of one or more IP addresses or hostnames
    Lookup {
        /// Keys to classify
        #[clap(required = true)]
        keys: Vec<String>,

        /// User agent sent to the backend
        #[clap(long)]
        user_agent: Option<String>,

        /// Cache TTL in seconds for the verdicts written by this run
        #[clap(long)]
        ttl: Option<u64>,

        /// Per-lookup deadline in milliseconds
        #[clap(long, default_value = "5000")]
        timeout_ms: u64,

        /// Proxy URL (http, https or socks5)
        #[clap(long)]
        proxy: Option<String>,

        /// Backend base URL the key is appended to
        #[clap(long)]
        endpoint: Option<String>,

        /// Skip cache reads
        #[clap(long)]
        no_cache: bool,

        /// Print one JSON object per key instead of colored text
        #[clap(long)]
        json: bool,
    },

    /// Validate a proxy URL and show the dialing strategy it selects
    CheckProxy {
        /// Proxy URL to validate
        url: String,
    },
}

/// Result of a single key, as printed by `lookup`.
#[derive(Debug, Serialize, PartialEq)]
struct LookupReport {
    key: String,
    verdict: Option<Verdict>,
    clean: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl LookupReport {
    fn new(key: String, result: Result<(), LookupError>) -> Self {
        match result {
            Ok(()) => Self {
                key,
                verdict: Some(Verdict::Good),
                clean: true,
                error: None,
            },
            Err(e) => Self {
                key,
                verdict: e.verdict(),
                clean: false,
                error: Some(e.to_string()),
            },
        }
    }

    fn render(&self) -> String {
        let label = match self.verdict {
            Some(Verdict::Good) => "GOOD".green().bold(),
            Some(Verdict::Bad) => "BAD".red().bold(),
            Some(Verdict::Unknown) => "UNKNOWN".yellow().bold(),
            None => "NO ANSWER".dimmed(),
        };
        match &self.error {
            Some(error) if self.verdict.is_none() => format!("{:<40} {} ({})", self.key, label, error),
            _ => format!("{:<40} {}", self.key, label),
        }
    }
}

fn describe_strategy(strategy: &DialStrategy) -> String {
    if strategy.is_direct() {
        "no proxy, lookups dial the backend directly".to_string()
    } else {
        format!("lookups dial through {}", strategy)
    }
}

fn load_config(path: Option<&Path>) -> Result<ClientConfig> {
    let config = match path {
        Some(path) => ClientConfig::from_file(path)?,
        None => ClientConfig::default(),
    };
    config.with_env_overrides()
}

fn init_logging(config: &ClientConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(config.log_level.as_deref().unwrap_or("warn"))
            .unwrap_or_else(|_| EnvFilter::new("warn"))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Runs every lookup concurrently and returns the reports in input order.
async fn run_lookups(
    client: Arc<Client>,
    keys: Vec<String>,
    user_agent: String,
    opts: LookupOptions,
) -> Result<Vec<LookupReport>> {
    let handles: Vec<_> = keys
        .into_iter()
        .map(|key| {
            let client = client.clone();
            let user_agent = user_agent.clone();
            tokio::spawn(async move {
                let result = client.lookup(&key, &user_agent, opts).await;
                if let Err(e) = result {
                    if e.is_cancellation() {
                        tracing::warn!("No answer for {}: {}", key, e);
                    }
                }
                LookupReport::new(key, result)
            })
        })
        .collect();

    let mut reports = Vec::with_capacity(handles.len());
    for handle in handles {
        reports.push(handle.await.map_err(|e| anyhow!("Lookup task failed: {}", e))?);
    }
    Ok(reports)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;
    init_logging(&config);

    match cli.command {
        Commands::Lookup {
            keys,
            user_agent,
            ttl,
            timeout_ms,
            proxy,
            endpoint,
            no_cache,
            json,
        } => {
            if let Some(proxy) = proxy {
                config.proxy = Some(proxy);
            }
            if let Some(endpoint) = endpoint {
                config.endpoint = endpoint;
            }
            if no_cache {
                config.cache_enabled = false;
            }
            let user_agent = user_agent.unwrap_or_else(|| config.user_agent.clone());

            let mut client = Client::new(config);
            client
                .provision()
                .map_err(|e| anyhow!("Failed to provision reputation client: {}", e))?;
            tracing::debug!("Looking up {} keys", keys.len());

            let mut opts = LookupOptions::new().with_timeout(Duration::from_millis(timeout_ms));
            if let Some(ttl) = ttl {
                opts = opts.with_ttl(Duration::from_secs(ttl));
            }

            let reports = run_lookups(Arc::new(client), keys, user_agent, opts).await?;
            for report in &reports {
                if json {
                    println!("{}", serde_json::to_string(report)?);
                } else {
                    println!("{}", report.render());
                }
            }

            if reports.iter().all(|r| r.clean) {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }

        Commands::CheckProxy { url } => {
            let strategy = configure_proxy(&url).map_err(|e| anyhow!("{}: {}", url, e))?;
            println!("{} {}", "OK".green().bold(), describe_strategy(&strategy));
            Ok(ExitCode::SUCCESS)
        }
    }
}
