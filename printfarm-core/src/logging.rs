use std::sync::Arc;

use tracing_subscriber::{
    fmt::{self, format::FmtSpan, writer::BoxMakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

use crate::config::LoggingConfig;

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `config.level`; both accept full filter directives
/// such as `info,printfarm_proxy=debug`. Output goes to `config.file_path`
/// when set, stdout otherwise.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => level_filter(&config.level)?,
    };

    let writer = match &config.file_path {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            BoxMakeWriter::new(Arc::new(file))
        }
        None => BoxMakeWriter::new(std::io::stdout),
    };

    let base = fmt::layer()
        .with_writer(writer)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_line_number(true);
    let output: Box<dyn Layer<Registry> + Send + Sync> = if config.format == "json" {
        base.json()
            .with_current_span(true)
            .with_span_list(true)
            .with_file(true)
            .boxed()
    } else {
        base.pretty().with_file(false).boxed()
    };

    tracing_subscriber::registry()
        .with(output)
        .with(filter)
        .try_init()?;
    Ok(())
}

fn level_filter(level: &str) -> anyhow::Result<EnvFilter> {
    EnvFilter::try_new(level).map_err(|e| anyhow::anyhow!("Invalid log level '{level}': {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_levels_are_accepted() {
        for level in ["trace", "debug", "info", "warn", "error"] {
            assert!(level_filter(level).is_ok(), "{level}");
        }
    }

    #[test]
    fn test_directives_are_accepted() {
        assert!(level_filter("info,printfarm_proxy=debug").is_ok());
        assert!(level_filter("warn,tower_http=trace,printfarm_api::http=info").is_ok());
    }

    #[test]
    fn test_malformed_directive_is_rejected() {
        assert!(level_filter("printfarm_proxy=loud").is_err());
    }
}
