use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};
use crate::error::AppError;

/// Initialize tracing/logging.
///
/// `RUST_LOG` takes precedence over the configured level. Output goes to
/// stderr. Fails if a global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), AppError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let result = match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    };

    result.map_err(|e| AppError::Config {
        message: format!("Failed to initialize logging: {}", e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_rejected() {
        let config = LoggingConfig::default();
        // Another test in the same binary may have installed the subscriber first.
        let _ = init_logging(&config);

        let err = init_logging(&config).unwrap_err();
        assert!(matches!(err, AppError::Config { .. }));
        assert!(err.to_string().contains("Failed to initialize logging"));
    }
}
