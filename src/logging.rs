//! Log output setup.
//!
//! `RUST_LOG` takes precedence over the configured default level.

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub json_format: bool,
    pub default_level: Level,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            json_format: false,
            default_level: Level::INFO,
        }
    }
}

impl LoggingConfig {
    pub fn json() -> Self {
        Self {
            json_format: true,
            ..Default::default()
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.default_level = level;
        self
    }
}

fn filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.default_level.to_string()))
}

/// Installs the global subscriber, writing to stderr.
///
/// Returns `false` when a subscriber was already installed.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let registry = tracing_subscriber::registry().with(filter(config));
    if config.json_format {
        registry
            .with(fmt::layer().json().with_current_span(true).with_writer(std::io::stderr))
            .try_init()
            .is_ok()
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .try_init()
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn retry_warnings_are_structured() {
        use crate::collector::PaginatedCollector;
        use crate::data::{Identifier, Page};
        use crate::error::FetchError;
        use crate::retry::{RecordingSleeper, RetryPolicy};

        let capture = Capture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::registry().with(EnvFilter::new("warn")).with(
            fmt::layer()
                .json()
                .with_writer(move || writer.clone()),
        );

        tracing::subscriber::with_default(subscriber, || {
            let collector = PaginatedCollector::new(RetryPolicy::default()).with_sleeper(RecordingSleeper::new());
            let mut limited = false;
            collector
                .collect_all(&Identifier::from("T1"), |_, _| {
                    if limited {
                        Ok(Page::new(vec![Identifier::from("u1")], None))
                    } else {
                        limited = true;
                        Err(FetchError::RateLimited { retry_after: None })
                    }
                })
                .unwrap();
        });

        let out = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        let line: serde_json::Value = serde_json::from_str(out.lines().next().unwrap()).unwrap();
        assert_eq!(line["level"], "WARN");
        assert_eq!(line["fields"]["message"], "rate limited, waiting before resending");
    }

    #[test]
    fn second_init_is_refused() {
        init_logging(&LoggingConfig::default());
        assert!(!init_logging(&LoggingConfig::json()));
    }
}
