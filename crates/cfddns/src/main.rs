// # cfddns - Cloudflare DDNS updater
//
// This binary is a thin integration layer. All reconciliation logic lives
// in cfddns-core.
//
// It is responsible for:
// 1. Parsing the command line
// 2. Initializing logging
// 3. Loading the configuration file
// 4. Building the resolver, provider and cache
// 5. Running one reconciliation, raced against SIGINT/SIGTERM
// 6. Mapping the result to an exit code
//
// ## Example
//
// ```bash
// cfddns --config /etc/cloudflare-ddns/config.json --dry-run
// ```

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use cfddns_core::config::{Config, VerifyMode};
use cfddns_core::traits::StateStore;
use cfddns_core::{FileStateStore, IpResolver, MemoryStateStore, Outcome, Reconciler, RunReport};
use cfddns_ip_http::sources_from_config;
use cfddns_provider_cloudflare::CloudflareProvider;

use cli::{Cli, LogFormat};

#[cfg(unix)]
use tokio::signal::unix::{Signal, SignalKind, signal};

/// Exit codes for different termination scenarios
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DdnsExitCode {
    /// Every record reconciled
    Success = 0,
    /// Configuration error, nothing was attempted
    ConfigError = 1,
    /// Runtime or setup error
    RuntimeError = 2,
    /// One or more records failed
    RecordFailures = 3,
    /// Interrupted by SIGINT/SIGTERM
    Interrupted = 130,
}

impl From<DdnsExitCode> for ExitCode {
    fn from(code: DdnsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

impl DdnsExitCode {
    fn for_report(report: &RunReport) -> Self {
        if report.is_success() {
            DdnsExitCode::Success
        } else {
            DdnsExitCode::RecordFailures
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli) {
        eprintln!("Failed to initialize logging: {:#}", e);
        return DdnsExitCode::RuntimeError.into();
    }

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!(path = %cli.config.display(), error = %e, "Configuration error");
            return DdnsExitCode::ConfigError.into();
        }
    };

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DdnsExitCode::RuntimeError.into();
        }
    };

    let code = rt.block_on(async {
        match run(&cli, &config).await {
            Ok(code) => code,
            Err(e) => {
                error!("Runtime error: {:#}", e);
                DdnsExitCode::RuntimeError
            }
        }
    });

    code.into()
}

/// Initialize tracing
///
/// `RUST_LOG` directives win over `--log-level` when set.
fn init_logging(cli: &Cli) -> Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&cli.log_level)
            .with_context(|| format!("invalid log level {:?}", cli.log_level))?,
    };

    let result = match cli.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .try_init(),
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .compact()
            .try_init(),
    };

    result.map_err(|e| anyhow::anyhow!(e))
}

/// Build components and run one reconciliation
async fn run(cli: &Cli, config: &Config) -> Result<DdnsExitCode> {
    info!(
        config = %cli.config.display(),
        domains = config.domains.len(),
        records = config.target_records().len(),
        "Starting cfddns"
    );
    if cli.dry_run {
        warn!("Dry-run mode: no records or cache entries will be changed");
    }

    let mut shutdown = Shutdown::install()?;

    let provider = CloudflareProvider::new(
        config.api_token.clone(),
        config.engine.api_base.clone(),
        config.engine.http_timeout(),
    )
    .context("failed to create Cloudflare client")?;

    let sources = sources_from_config(&config.ip_services, config.engine.ip_timeout())
        .context("failed to create IP sources")?;
    let resolver = IpResolver::new(sources).with_timeout(config.engine.ip_timeout());

    let cache: Box<dyn StateStore> = if cli.no_cache {
        info!("Cache disabled for this run");
        Box::new(MemoryStateStore::new())
    } else {
        let store = FileStateStore::open(&cli.cache_path).await;
        info!(path = %cli.cache_path.display(), entries = store.len().await, "Cache loaded");
        Box::new(store)
    };

    let mut reconciler = Reconciler::new(resolver, Box::new(provider), cache, config)
        .with_dry_run(cli.dry_run);
    if cli.trust_cache {
        reconciler = reconciler.with_verify_mode(VerifyMode::TrustCache);
    }

    tokio::select! {
        report = reconciler.run() => {
            log_summary(&report);
            Ok(DdnsExitCode::for_report(&report))
        }
        signal = shutdown.recv() => {
            warn!(signal, "Interrupted; updates already applied stay applied");
            Ok(DdnsExitCode::Interrupted)
        }
    }
}

fn log_summary(report: &RunReport) {
    let changed = report.count(Outcome::Updated) + report.count(Outcome::WouldUpdate);
    let failed = report.count(Outcome::Failed);

    if failed == 0 {
        info!(
            "Run complete: {} {}/{} records, {} already current",
            if report.dry_run { "would update" } else { "updated" },
            changed,
            report.len(),
            report.count(Outcome::Unchanged) + report.count(Outcome::Cached),
        );
    } else {
        for record in report.failures() {
            error!(
                fqdn = %record.fqdn,
                record_type = %record.record_type,
                category = record.error_category.unwrap_or("other"),
                "Record not reconciled"
            );
        }
        error!(
            "Run finished with failures: {}/{} records failed, {} changed",
            failed,
            report.len(),
            changed
        );
    }
}

/// SIGTERM/SIGINT listener, installed before any network activity
#[cfg(unix)]
struct Shutdown {
    sigterm: Signal,
    sigint: Signal,
}

#[cfg(unix)]
impl Shutdown {
    fn install() -> Result<Self> {
        let sigterm = signal(SignalKind::terminate())
            .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
        let sigint = signal(SignalKind::interrupt())
            .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;
        Ok(Self { sigterm, sigint })
    }

    /// Wait for either signal and return its name
    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.sigterm.recv() => "SIGTERM",
            _ = self.sigint.recv() => "SIGINT",
        }
    }
}

/// Ctrl-C listener for non-Unix platforms
#[cfg(not(unix))]
struct Shutdown;

#[cfg(not(unix))]
impl Shutdown {
    fn install() -> Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> &'static str {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "SIGINT",
            Err(e) => {
                error!("Failed to wait for CTRL-C: {}", e);
                std::future::pending().await
            }
        }
    }
}
