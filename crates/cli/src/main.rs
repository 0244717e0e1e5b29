use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use kumasync_apply::{connect_with_retry, Phase, RetryPolicy, Strategy, SyncConfig, SyncError, SyncReport};
use kumasync_core::EntityKind;
use kumasync_hub::{Credentials, DirectoryClient, Endpoint, KumaConnector};
use serde::Serialize;
use tokio::signal;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "kumasyncctl", version, about = "Mirror Uptime Kuma monitors and notifications onto a secondary instance")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum StrategyArg { Merge, Recreate }

impl From<StrategyArg> for Strategy {
    fn from(s: StrategyArg) -> Self {
        match s {
            StrategyArg::Merge => Strategy::Merge,
            StrategyArg::Recreate => Strategy::Recreate,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Copy notifications then monitors from the primary onto the secondary
    Sync {
        #[command(flatten)]
        conn: ConnArgs,
        /// merge: update by name, add the rest. recreate: wipe the secondary first
        #[arg(long = "strategy", value_enum, default_value_t = StrategyArg::Merge)]
        strategy: StrategyArg,
        /// Report what would change without writing to the secondary
        #[arg(long = "dry-run", action = ArgAction::SetTrue)]
        dry_run: bool,
        /// Repeat the sync every N seconds until interrupted
        #[arg(long = "every", env = "KUMASYNC_EVERY_SECS")]
        every: Option<u64>,
    },
    /// Log in to both instances and print what each holds
    Check {
        #[command(flatten)]
        conn: ConnArgs,
    },
}

#[derive(Args, Debug, Clone)]
struct ConnArgs {
    /// Base URL of the instance to copy from
    #[arg(long = "primary-url", env = "KUMASYNC_PRIMARY_URL")]
    primary_url: String,
    /// Base URL of the instance to copy onto
    #[arg(long = "secondary-url", env = "KUMASYNC_SECONDARY_URL")]
    secondary_url: String,
    #[arg(long = "username", env = "KUMASYNC_USERNAME")]
    username: String,
    #[arg(long = "password", env = "KUMASYNC_PASSWORD", hide_env_values = true)]
    password: String,
    /// Secondary login when it differs from the primary's
    #[arg(long = "secondary-username", env = "KUMASYNC_SECONDARY_USERNAME")]
    secondary_username: Option<String>,
    #[arg(long = "secondary-password", env = "KUMASYNC_SECONDARY_PASSWORD", hide_env_values = true)]
    secondary_password: Option<String>,
    /// Bound on each connect and each round trip
    #[arg(long = "timeout-secs", env = "KUMASYNC_TIMEOUT_SECS", default_value_t = 300)]
    timeout_secs: u64,
    /// Connection attempts per instance
    #[arg(long = "retries", env = "KUMASYNC_RETRIES", default_value_t = 10)]
    retries: u32,
    #[arg(long = "retry-delay-secs", env = "KUMASYNC_RETRY_DELAY_SECS", default_value_t = 10)]
    retry_delay_secs: u64,
}

impl ConnArgs {
    fn sync_config(&self) -> SyncConfig {
        let timeout = Duration::from_secs(self.timeout_secs);
        let primary_creds = Credentials::new(&self.username, &self.password);
        let secondary_creds = Credentials::new(
            self.secondary_username.as_deref().unwrap_or(&self.username),
            self.secondary_password.as_deref().unwrap_or(&self.password),
        );
        let mut cfg = SyncConfig::new(
            Endpoint::new("primary", &self.primary_url, primary_creds).with_timeout(timeout),
            Endpoint::new("secondary", &self.secondary_url, secondary_creds).with_timeout(timeout),
        );
        cfg.retry = RetryPolicy { attempts: self.retries, delay: Duration::from_secs(self.retry_delay_secs) };
        cfg
    }
}

fn init_tracing() {
    let env = std::env::var("KUMASYNC_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    // stdout carries the report.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("KUMASYNC_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            warn!(addr = %addr, "KUMASYNC_METRICS_ADDR is not a socket address; metrics disabled");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();

    let cli = Cli::parse();
    let ok = match cli.command {
        Commands::Sync { conn, strategy, dry_run, every } => {
            let mut cfg = conn.sync_config();
            cfg.strategy = strategy.into();
            cfg.dry_run = dry_run;
            sync_loop(&cfg, every.map(Duration::from_secs), cli.output).await?
        }
        Commands::Check { conn } => check(&conn.sync_config(), cli.output).await?,
    };
    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

/// Returns whether the last run completed without a fatal error.
async fn sync_loop(cfg: &SyncConfig, every: Option<Duration>, output: Output) -> Result<bool> {
    let connector = KumaConnector::new();
    loop {
        let result = kumasync_apply::run_sync(&connector, cfg).await;
        let ok = result.is_ok();
        match &result {
            Ok(report) => println!("{}", render_report(report, output)?),
            Err(e) => eprintln!("{}", render_fatal(e, output)?),
        }
        let Some(period) = every else { return Ok(ok) };
        tokio::select! {
            _ = tokio::time::sleep(period) => {}
            _ = signal::ctrl_c() => {
                info!("interrupt received; stopping");
                return Ok(ok);
            }
        }
    }
}

fn render_report(report: &SyncReport, output: Output) -> Result<String> {
    if output == Output::Json {
        return Ok(serde_json::to_string_pretty(report)?);
    }
    let mut out = String::new();
    if report.dry_run {
        out.push_str("dry run: nothing was written\n");
    }
    for (kind, r) in [(EntityKind::Notification, &report.notifications), (EntityKind::Monitor, &report.monitors)] {
        out.push_str(&format!(
            "{:<14} added {:>3}  updated {:>3}  skipped {:>3}",
            format!("{kind}s"),
            r.added,
            r.updated,
            r.skipped
        ));
        if r.deleted > 0 {
            out.push_str(&format!("  deleted {:>3}", r.deleted));
        }
        out.push('\n');
        for f in &r.failures {
            out.push_str(&format!("  - {kind} {:?}: {}\n", f.name, f.reason));
        }
    }
    if !report.is_clean() {
        let skipped = report.notifications.skipped + report.monitors.skipped;
        let noun = if skipped == 1 { "entity" } else { "entities" };
        out.push_str(&format!("completed with {skipped} skipped {noun}\n"));
    }
    Ok(out.trim_end().to_string())
}

#[derive(Serialize)]
struct FatalReport {
    ok: bool,
    phase: Phase,
    error: String,
}

fn render_fatal(e: &SyncError, output: Output) -> Result<String> {
    match output {
        Output::Human => Ok(format!("sync failed: {e}")),
        Output::Json => {
            let body = FatalReport { ok: false, phase: e.phase(), error: e.to_string() };
            Ok(serde_json::to_string_pretty(&body)?)
        }
    }
}

#[derive(Serialize)]
struct InstanceSummary {
    label: String,
    url: String,
    notifications: usize,
    monitors: usize,
}

/// Connect to each side in turn and count what it holds. Nothing is written.
async fn check(cfg: &SyncConfig, output: Output) -> Result<bool> {
    let connector = KumaConnector::new();
    let mut rows = Vec::new();
    for (endpoint, phase) in [(&cfg.primary, Phase::ConnectPrimary), (&cfg.secondary, Phase::ConnectSecondary)] {
        let mut client = match connect_with_retry(&connector, endpoint, cfg.retry, phase).await {
            Ok(c) => c,
            Err(e) => {
                eprintln!("{}", render_fatal(&e, output)?);
                return Ok(false);
            }
        };
        let listed = async {
            let notifications = client.list(EntityKind::Notification).await?.len();
            let monitors = client.list(EntityKind::Monitor).await?.len();
            Ok::<_, kumasync_core::ClientError>((notifications, monitors))
        }
        .await;
        if let Err(e) = client.disconnect().await {
            warn!(endpoint = %endpoint.label, error = %e, "disconnect failed");
        }
        let (notifications, monitors) = listed?;
        rows.push(InstanceSummary { label: endpoint.label.clone(), url: endpoint.url.clone(), notifications, monitors });
    }

    match output {
        Output::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
        Output::Human => {
            for r in &rows {
                println!("{:<10} {:<40} {:>4} notifications  {:>4} monitors", r.label, r.url, r.notifications, r.monitors);
            }
        }
    }
    Ok(true)
}
