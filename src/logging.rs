use anyhow::Context;
use chrono::Utc;
use serde_json::Value;
use std::fs;
use tracing::info;
use tracing_appender::rolling;
use tracing_subscriber::filter::{EnvFilter, LevelFilter, Targets};
use tracing_subscriber::{fmt, layer::SubscriberExt, Layer, Registry};

/// Target of the request audit records
pub const AUDIT_TARGET: &str = "save_to_log_file";

pub fn setup_logging(log_dir: Option<&str>) -> Result<(), anyhow::Error> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    // Stdout layer logs everything with source location
    let stdout_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_file(true)
        .with_line_number(true)
        .with_filter(env_filter);

    let file_layer = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create logs directory {}", dir))?;

            // Daily rotating file appender
            let file_appender = rolling::daily(dir, "app.log");

            // Only audit records go to the file
            let target_filter = Targets::new().with_target(AUDIT_TARGET, LevelFilter::TRACE);

            Some(
                fmt::layer()
                    .with_writer(file_appender)
                    .with_ansi(false)
                    .with_filter(target_filter),
            )
        }
        None => None,
    };

    let subscriber = Registry::default().with(stdout_layer).with(file_layer);

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global default subscriber")?;

    Ok(())
}

/// Write one audit record for an incoming request. The body is rendered compactly,
/// `-` when there is none.
pub fn audit_request(method: &str, path: &str, request_id: &str, body: Option<&Value>) {
    let body = body.map_or_else(|| "-".to_string(), Value::to_string);

    info!(
        target: AUDIT_TARGET,
        request_id,
        method,
        uri = path,
        "{} {} {} [{}] {}",
        Utc::now().to_rfc3339(),
        method,
        path,
        request_id,
        body
    );
}
