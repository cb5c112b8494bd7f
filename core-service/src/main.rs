use anyhow::{bail, Context};
use bridge_traits::time::LogLevel;
use clap::Parser;
use core_runtime::config::{CoreConfig, DEFAULT_BIND_ADDRESS, DEFAULT_DATABASE_PATH};
use core_runtime::logging::{init_logging, redact_if_sensitive, LogFormat, LoggingConfig};
use core_service::{api, CoreDependencies, CoreService};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// status-sync: mirrors what a user is listening to into their Slack status.
#[derive(Parser)]
#[command(name = "status-sync", version)]
struct Args {
    /// Address the control API listens on.
    #[arg(long, env = "STATUS_SYNC_BIND", default_value = DEFAULT_BIND_ADDRESS)]
    bind: String,

    /// SQLite database holding linked accounts.
    #[arg(long, env = "STATUS_SYNC_DB", default_value = DEFAULT_DATABASE_PATH)]
    database: PathBuf,

    /// Spotify OAuth client id, needed to refresh expired access tokens.
    #[arg(long, env = "SPOTIFY_CLIENT_ID")]
    spotify_client_id: Option<String>,

    /// Spotify OAuth client secret.
    #[arg(long, env = "SPOTIFY_CLIENT_SECRET", hide_env_values = true)]
    spotify_client_secret: Option<String>,

    /// Seconds between two successful polls.
    #[arg(long, env = "STATUS_SYNC_POLL_SECS", default_value_t = 30)]
    poll_secs: u64,

    /// Seconds to wait after a failed poll.
    #[arg(long, env = "STATUS_SYNC_BACKOFF_SECS", default_value_t = 10)]
    backoff_secs: u64,

    /// Log output: pretty, json or compact.
    #[arg(long, env = "STATUS_SYNC_LOG_FORMAT")]
    log_format: Option<String>,

    /// Level for the workspace crates, overridden by RUST_LOG.
    #[arg(long, env = "STATUS_SYNC_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Full filter directive, e.g. "core_sync=trace,provider_slack=debug".
    #[arg(long, env = "STATUS_SYNC_LOG_FILTER")]
    log_filter: Option<String>,

    /// Log span open and close events.
    #[arg(long, env = "STATUS_SYNC_LOG_SPANS")]
    log_spans: bool,

    /// Leave the module path out of log lines.
    #[arg(long, env = "STATUS_SYNC_LOG_HIDE_TARGET")]
    log_hide_target: bool,
}

impl Args {
    fn logging_config(&self) -> anyhow::Result<LoggingConfig> {
        let mut config = LoggingConfig::default()
            .with_level(
                self.log_level
                    .parse::<LogLevel>()
                    .map_err(anyhow::Error::msg)?,
            )
            .with_spans(self.log_spans)
            .with_target(!self.log_hide_target);
        if let Some(format) = &self.log_format {
            config = config.with_format(format.parse::<LogFormat>()?);
        }
        if let Some(filter) = &self.log_filter {
            config = config.with_filter(filter);
        }
        Ok(config)
    }

    fn core_config(&self) -> anyhow::Result<CoreConfig> {
        let mut builder = CoreConfig::builder()
            .bind_address(&self.bind)
            .database_path(&self.database)
            .poll_interval(Duration::from_secs(self.poll_secs))
            .error_backoff(Duration::from_secs(self.backoff_secs));

        match (&self.spotify_client_id, &self.spotify_client_secret) {
            (Some(id), Some(secret)) => builder = builder.spotify_client(id, secret),
            (None, None) => {}
            _ => bail!("SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET must be set together"),
        }

        Ok(builder.build()?)
    }

    /// Options worth echoing at startup, secrets masked.
    fn log_settings(&self) {
        let settings = [
            ("bind", Some(self.bind.clone())),
            ("database", Some(self.database.display().to_string())),
            ("spotify_client_id", self.spotify_client_id.clone()),
            ("spotify_client_secret", self.spotify_client_secret.clone()),
            ("poll_secs", Some(self.poll_secs.to_string())),
            ("backoff_secs", Some(self.backoff_secs.to_string())),
        ];

        for (name, value) in settings {
            if let Some(value) = value {
                debug!(setting = name, value = %redact_if_sensitive(name, &value), "Startup setting");
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Ignoring unreadable .env file: {e}");
        }
    }

    let args = Args::parse();
    init_logging(args.logging_config()?)?;
    args.log_settings();

    let config = args.core_config()?;
    let bind_address = config.bind_address;
    info!(database = %config.database_path.display(), "status-sync starting");

    let deps = CoreDependencies::desktop(&config)
        .await
        .context("failed to initialize host adapters")?;
    let service = CoreService::bootstrap(config, deps).await?;
    let _event_logger = service.spawn_event_logger();

    let listener = tokio::net::TcpListener::bind(bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;
    info!("Listening on http://{bind_address}");

    axum::serve(listener, api::router(service.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    service.shutdown().await;
    info!("status-sync stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Could not listen for Ctrl-C, shutting down");
        return;
    }
    info!("Shutdown requested, restoring statuses");
}
