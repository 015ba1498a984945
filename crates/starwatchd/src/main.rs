// # starwatchd - Star Watcher Daemon
//
// The starwatchd daemon is a thin integration layer. It is responsible
// for:
// 1. Reading configuration from environment variables
// 2. Initializing the runtime and tracing
// 3. Constructing the snapshot source, state store, and connectors
// 4. Starting the detection engine
//
// All detection and dispatch logic lives in starwatch-core.
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### GitHub
// - `STARWATCH_GITHUB_TOKEN`: Personal access token (required)
// - `STARWATCH_GITHUB_USERNAME`: Account to watch (defaults to the
//   token's own account)
//
// ### Engine
// - `STARWATCH_CHECK_INTERVAL`: Seconds between checks (10-3600)
// - `STARWATCH_MESSAGE_TEMPLATE`: Template with `{url}`, `{name}`,
//   `{description}` fields
//
// ### State Store
// - `STARWATCH_STATE_STORE_TYPE`: Type of state store (file, memory)
// - `STARWATCH_STATE_PATH`: Path to the state file (for file store)
//
// ### Destinations (each enabled with `..._ENABLED=true`)
// - `STARWATCH_DISCORD_ENABLED`, `STARWATCH_DISCORD_WEBHOOK_URL`
// - `STARWATCH_MASTODON_ENABLED`, `STARWATCH_MASTODON_BASE_URL`,
//   `STARWATCH_MASTODON_ACCESS_TOKEN`
// - `STARWATCH_MATRIX_ENABLED`, `STARWATCH_MATRIX_HOMESERVER`,
//   `STARWATCH_MATRIX_ROOM_ID`, `STARWATCH_MATRIX_USER_ID`, and one of
//   `STARWATCH_MATRIX_ACCESS_TOKEN` or `STARWATCH_MATRIX_PASSWORD`
// - `STARWATCH_BLUESKY_ENABLED`, `STARWATCH_BLUESKY_HANDLE`,
//   `STARWATCH_BLUESKY_APP_PASSWORD`, `STARWATCH_BLUESKY_SERVICE_URL`
//
// ### Logging
// - `STARWATCH_LOG_LEVEL`: trace, debug, info, warn, error
//
// ## Example
//
// ```bash
// export STARWATCH_GITHUB_TOKEN=ghp_xxxxxxxxxxxxxxxxxxxx
// export STARWATCH_CHECK_INTERVAL=60
// export STARWATCH_STATE_PATH=/var/lib/starwatch/state.json
// export STARWATCH_DISCORD_ENABLED=true
// export STARWATCH_DISCORD_WEBHOOK_URL=https://discord.com/api/webhooks/...
//
// starwatchd
// ```

use anyhow::Result;
use std::env;
use std::process::ExitCode;
use tracing::{Level, debug, error, info};
use tracing_subscriber::FmtSubscriber;

use starwatch_core::{
    Connector, ConnectorConfig, EngineConfig, FileStateStore, GithubConfig, MemoryStateStore,
    SnapshotSource, StarwatchConfig, StarwatchEngine, StateStore, StateStoreConfig,
};
use starwatch_connector_bluesky::{BlueskyConnector, DEFAULT_SERVICE_URL};
use starwatch_connector_discord::DiscordConnector;
use starwatch_connector_mastodon::MastodonConnector;
use starwatch_connector_matrix::MatrixConnector;
use starwatch_source_github::GithubStarsSource;

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum StarwatchExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<StarwatchExitCode> for ExitCode {
    fn from(code: StarwatchExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Parse a `..._ENABLED` style boolean flag.
fn env_flag(name: &str) -> bool {
    env::var(name)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

/// Daemon-level settings that sit outside [`StarwatchConfig`]
struct DaemonSettings {
    log_level: String,
}

/// Load configuration from environment variables
fn config_from_env() -> Result<(StarwatchConfig, DaemonSettings)> {
    let token = env::var("STARWATCH_GITHUB_TOKEN").map_err(|_| {
        anyhow::anyhow!(
            "STARWATCH_GITHUB_TOKEN is required. \
            Set it via: export STARWATCH_GITHUB_TOKEN=your_pat"
        )
    })?;

    let check_interval_secs = match env::var("STARWATCH_CHECK_INTERVAL") {
        Ok(raw) => {
            let interval: u64 = raw.parse().map_err(|_| {
                anyhow::anyhow!("STARWATCH_CHECK_INTERVAL must be a number. Got: {}", raw)
            })?;
            if !(10..=3600).contains(&interval) {
                anyhow::bail!(
                    "STARWATCH_CHECK_INTERVAL must be between 10 and 3600 seconds. Got: {}",
                    interval
                );
            }
            interval
        }
        Err(_) => 60,
    };

    let state_store = match env::var("STARWATCH_STATE_STORE_TYPE")
        .unwrap_or_else(|_| "file".to_string())
        .as_str()
    {
        "memory" => StateStoreConfig::Memory,
        "file" => {
            let path = match env::var("STARWATCH_STATE_PATH") {
                Ok(path) if !path.is_empty() => path,
                _ => {
                    let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
                    format!("{}/.starwatch-state.json", home)
                }
            };
            StateStoreConfig::File { path }
        }
        other => anyhow::bail!(
            "STARWATCH_STATE_STORE_TYPE '{}' is not supported. \
            Supported types: file, memory",
            other
        ),
    };

    let mut connectors = Vec::new();

    if env_flag("STARWATCH_DISCORD_ENABLED") {
        connectors.push(ConnectorConfig::Discord {
            webhook_url: env::var("STARWATCH_DISCORD_WEBHOOK_URL").unwrap_or_default(),
        });
    }

    if env_flag("STARWATCH_MASTODON_ENABLED") {
        connectors.push(ConnectorConfig::Mastodon {
            base_url: env::var("STARWATCH_MASTODON_BASE_URL").unwrap_or_default(),
            access_token: env::var("STARWATCH_MASTODON_ACCESS_TOKEN").unwrap_or_default(),
        });
    }

    if env_flag("STARWATCH_MATRIX_ENABLED") {
        connectors.push(ConnectorConfig::Matrix {
            homeserver: env::var("STARWATCH_MATRIX_HOMESERVER").unwrap_or_default(),
            room_id: env::var("STARWATCH_MATRIX_ROOM_ID").unwrap_or_default(),
            user_id: env::var("STARWATCH_MATRIX_USER_ID").unwrap_or_default(),
            access_token: env::var("STARWATCH_MATRIX_ACCESS_TOKEN").ok(),
            password: env::var("STARWATCH_MATRIX_PASSWORD").ok(),
        });
    }

    if env_flag("STARWATCH_BLUESKY_ENABLED") {
        connectors.push(ConnectorConfig::Bluesky {
            handle: env::var("STARWATCH_BLUESKY_HANDLE").unwrap_or_default(),
            app_password: env::var("STARWATCH_BLUESKY_APP_PASSWORD").unwrap_or_default(),
            service_url: env::var("STARWATCH_BLUESKY_SERVICE_URL")
                .unwrap_or_else(|_| DEFAULT_SERVICE_URL.to_string()),
        });
    }

    let engine = match env::var("STARWATCH_MESSAGE_TEMPLATE")
        .ok()
        .filter(|t| !t.is_empty())
    {
        Some(message_template) => EngineConfig {
            check_interval_secs,
            message_template,
            ..EngineConfig::default()
        },
        None => EngineConfig {
            check_interval_secs,
            ..EngineConfig::default()
        },
    };

    let config = StarwatchConfig {
        github: GithubConfig {
            token,
            username: env::var("STARWATCH_GITHUB_USERNAME").ok().filter(|u| !u.is_empty()),
        },
        state_store,
        connectors,
        engine,
    };

    let settings = DaemonSettings {
        log_level: env::var("STARWATCH_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
    };

    Ok((config, settings))
}

fn main() -> ExitCode {
    // Load configuration from environment
    let (config, settings) = match config_from_env() {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return StarwatchExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return StarwatchExitCode::ConfigError.into();
    }

    // Initialize tracing
    let log_level = match settings.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        other => {
            eprintln!(
                "STARWATCH_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                other
            );
            return StarwatchExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return StarwatchExitCode::ConfigError.into();
    }

    info!("Starting starwatchd daemon");
    info!(
        "Configuration loaded: {} destination(s)",
        config.connectors.len()
    );

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return StarwatchExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config).await {
            error!("Daemon error: {}", e);
            StarwatchExitCode::RuntimeError
        } else {
            StarwatchExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Construct the connector set from the validated configuration.
fn build_connectors(configs: &[ConnectorConfig]) -> Vec<Box<dyn Connector>> {
    let mut connectors: Vec<Box<dyn Connector>> = Vec::with_capacity(configs.len());

    for config in configs {
        info!("Enabling {} destination", config.platform_name());
        match config {
            ConnectorConfig::Discord { webhook_url } => {
                connectors.push(Box::new(DiscordConnector::new(webhook_url.clone())));
            }
            ConnectorConfig::Mastodon {
                base_url,
                access_token,
            } => {
                connectors.push(Box::new(MastodonConnector::new(
                    base_url.clone(),
                    access_token.clone(),
                )));
            }
            ConnectorConfig::Matrix {
                homeserver,
                room_id,
                user_id,
                access_token,
                password,
            } => {
                connectors.push(Box::new(MatrixConnector::new(
                    homeserver.clone(),
                    room_id.clone(),
                    user_id.clone(),
                    access_token.clone(),
                    password.clone(),
                )));
            }
            ConnectorConfig::Bluesky {
                handle,
                app_password,
                service_url,
            } => {
                connectors.push(Box::new(BlueskyConnector::new(
                    handle.clone(),
                    app_password.clone(),
                    service_url.clone(),
                )));
            }
        }
    }

    connectors
}

/// Construct the watermark store from the validated configuration.
async fn build_state_store(config: &StateStoreConfig) -> Result<Box<dyn StateStore>> {
    match config {
        StateStoreConfig::File { path } => {
            info!("State store: file at {}", path);
            Ok(Box::new(FileStateStore::new(path).await?))
        }
        StateStoreConfig::Memory => {
            info!("State store: in-memory (re-baselines on restart)");
            Ok(Box::new(MemoryStateStore::new()))
        }
    }
}

/// Run the daemon
async fn run_daemon(config: StarwatchConfig) -> Result<()> {
    let source = Box::new(GithubStarsSource::new(&config.github)?);
    info!("Snapshot source: {}", source.describe());

    let state_store = build_state_store(&config.state_store).await?;
    let connectors = build_connectors(&config.connectors);

    let (mut engine, mut events) =
        StarwatchEngine::new(source, connectors, state_store, config.engine)?;

    // Drain engine events at debug level so the channel never fills
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!(?event, "engine event");
        }
    });

    info!("Starting detection engine");
    engine.run().await?;

    info!("Shutting down daemon");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use starwatch_core::Watermark;
    use std::collections::BTreeSet;

    #[tokio::test]
    async fn file_store_config_builds_a_usable_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let store = build_state_store(&StateStoreConfig::File {
            path: path.to_string_lossy().into_owned(),
        })
        .await
        .unwrap();

        let keys: BTreeSet<String> = ["a/one".to_string()].into_iter().collect();
        store.save(&Watermark::from_keys(keys)).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert!(loaded.contains("a/one"));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn memory_store_config_builds_a_usable_store() {
        let store = build_state_store(&StateStoreConfig::Memory).await.unwrap();
        assert!(store.load().await.unwrap().is_empty());
    }
}
