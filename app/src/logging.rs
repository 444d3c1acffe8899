use std::path::Path;
use std::sync::Mutex;

use color_eyre::Result;
use tracing::level_filters::LevelFilter;
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config;

lazy_static::lazy_static! {
    pub static ref LOG_ENV: String = format!("{}_LOG_LEVEL", config::PROJECT_NAME.clone());
    pub static ref LOG_FILE: String = format!("{}.log", env!("CARGO_PKG_NAME"));
}

/// `FORSEER_LOG_LEVEL` when set, `RUST_LOG` otherwise, `info` by default
fn env_filter() -> Result<EnvFilter> {
    let builder = EnvFilter::builder().with_default_directive(LevelFilter::INFO.into());
    let filter = if std::env::var_os(LOG_ENV.as_str()).is_some() {
        builder.with_env_var(LOG_ENV.as_str()).from_env()?
    } else {
        builder.from_env()?
    };
    Ok(filter)
}

/// Logs to stderr and to a file in `data_dir`
pub fn init(data_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(data_dir)?;
    let log_path = data_dir.join(LOG_FILE.as_str());
    let log_file = std::fs::File::create(&log_path)?;

    let file_subscriber = fmt::layer()
        .with_file(true)
        .with_line_number(true)
        .with_writer(Mutex::new(log_file))
        .with_target(false)
        .with_ansi(false);
    let stderr_subscriber = fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter()?)
        .with(file_subscriber)
        .with(stderr_subscriber)
        .with(ErrorLayer::default())
        .try_init()?;

    tracing::debug!("Writing logs to {}", log_path.display());
    Ok(())
}
