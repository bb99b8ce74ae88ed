use anyhow::Context;
use clap::Parser;
#[cfg(feature = "metrics")]
use metrics_exporter_prometheus::PrometheusBuilder;
use prload::{ApiClient, LoadTest};
use prload_core::{
    Population, RunConfig, Stage, Thresholds, DEFAULT_BASE_URL, DEFAULT_REQUEST_TIMEOUT,
    DEFAULT_STAGES, THRESHOLD_FAILURE_EXIT_CODE,
};
#[cfg(feature = "metrics")]
use std::net::SocketAddr;
use std::num::{NonZeroU32, NonZeroU64};
use std::process::ExitCode;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Staged load test for the team / pull-request review service.
#[derive(Parser, Debug)]
#[command(version)]
struct Cli {
    /// Base URL of the service under test.
    #[arg(long, env = "BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Comma separated `<duration>:<target>` stages.
    #[arg(long, env = "STAGES", value_delimiter = ',', default_value = DEFAULT_STAGES)]
    stages: Vec<Stage>,

    /// Teams created during setup.
    #[arg(long, default_value_t = prload_core::DEFAULT_TEAM_COUNT)]
    teams: usize,

    /// Members per team created during setup.
    #[arg(long, default_value_t = prload_core::DEFAULT_MEMBERS_PER_TEAM)]
    members: usize,

    /// Stop after this many iterations even if stages remain.
    #[arg(long)]
    iterations: Option<NonZeroU64>,

    /// Cap on iterations started per second.
    #[arg(long)]
    max_rps: Option<NonZeroU32>,

    /// Responses at or above this duration fail their check.
    #[arg(long, default_value = "300ms", value_parser = humantime::parse_duration)]
    latency_ceiling: Duration,

    /// The p95 response time must stay below this.
    #[arg(long, default_value = "300ms", value_parser = humantime::parse_duration)]
    p95: Duration,

    /// The error rate must stay below this.
    #[arg(long, default_value_t = prload_core::DEFAULT_MAX_ERROR_RATE)]
    max_error_rate: f64,

    /// Transport-level timeout for a single request [default: 60s].
    #[arg(long, value_parser = humantime::parse_duration)]
    request_timeout: Option<Duration>,

    /// Serve Prometheus metrics on this address while the run is active.
    #[cfg(feature = "metrics")]
    #[arg(long)]
    metrics_addr: Option<SocketAddr>,
}

impl Cli {
    fn request_timeout(&self) -> Duration {
        self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT)
    }

    fn run_config(&self) -> RunConfig {
        RunConfig {
            stages: self.stages.clone(),
            population: Population {
                teams: self.teams,
                members_per_team: self.members,
            },
            thresholds: Thresholds {
                p95_latency: self.p95,
                max_error_rate: self.max_error_rate,
            },
            latency_ceiling: self.latency_ceiling,
            max_iterations: self.iterations,
            max_rps: self.max_rps,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("prload=info")),
        )
        .init();

    let cli = Cli::parse();

    #[cfg(feature = "metrics")]
    if let Some(addr) = cli.metrics_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!("Serving metrics on {addr}");
    }

    let api = ApiClient::new(&cli.base_url, cli.request_timeout())
        .with_context(|| format!("Failed to build client for {}", cli.base_url))?;
    info!("Target: {}", api.base_url());

    let report = LoadTest::new(api).config(cli.run_config()).await?;
    println!("{report}");

    if report.passed() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(THRESHOLD_FAILURE_EXIT_CODE))
    }
}
