//! Log setup: console plus a size-capped file.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter};
use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogConfig;

const LOG_FILENAME: &str = "vadrigar.log";

/// Initialize logging for the host process.
///
/// Returns a guard that must be kept alive for the duration of the
/// program; dropping it stops the file writer.
pub fn init_logging(config: &LogConfig) -> io::Result<WorkerGuard> {
    let log_dir = config
        .dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&log_dir)?;
    let log_path = log_dir.join(LOG_FILENAME);

    truncate_if_needed(&log_path, config.max_size)?;

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let (non_blocking_file, guard) = tracing_appender::non_blocking(BufWriter::new(file));

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(io::stdout).with_ansi(true))
        .with(
            fmt::layer()
                .with_writer(non_blocking_file)
                .with_ansi(false)
                .with_target(true),
        )
        .init();

    tracing::info!(
        "============ vadrigar run @ {} ============",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    tracing::info!("Logging to file: {}", log_path.display());

    Ok(guard)
}

/// Truncate the log file if it has grown past the configured cap.
fn truncate_if_needed(log_path: &PathBuf, max_size: u64) -> io::Result<()> {
    if log_path.exists() {
        let metadata = fs::metadata(log_path)?;
        if metadata.len() > max_size {
            let file = File::create(log_path)?;
            file.set_len(0)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_truncate_only_past_cap() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(LOG_FILENAME);

        let mut file = File::create(&path).unwrap();
        file.write_all(b"0123456789").unwrap();
        drop(file);

        truncate_if_needed(&path, 100).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), 10);

        truncate_if_needed(&path, 5).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), 0);
    }
}
