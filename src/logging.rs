use std::path::Path;

use anyhow::Result;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Installs the global subscriber: a daily rolling file under
/// `<log_root>/logs`, plus stderr when `verbose` is set.
///
/// The filter comes from `level`, then `RUST_LOG`, then `info`. A bare level
/// applies to this crate only. Full directives are used as given.
pub fn enable_logging(log_root: &Path, level: Option<&str>, verbose: bool) -> Result<()> {
    let appender = tracing_appender::rolling::Builder::new()
        .rotation(Rotation::DAILY)
        .max_log_files(7)
        .filename_prefix("lifebalance")
        .filename_suffix("log")
        .build(log_root.join("logs"))?;

    let stderr = std::io::stderr.with_filter(move |_| verbose);

    let filter = match level {
        Some(level) => EnvFilter::try_new(directive(level))?,
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(directive("info"))),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(stderr.and(appender))
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to install log subscriber: {err}"))?;
    Ok(())
}

/// `debug` becomes `lifebalance=debug`. Anything with a target is kept.
fn directive(level: &str) -> String {
    if level.contains('=') || level.contains(',') {
        level.to_string()
    } else {
        format!("{}={level}", env!("CARGO_PKG_NAME").replace('-', "_"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_level_is_scoped_to_the_crate() {
        assert_eq!(directive("debug"), "lifebalance=debug");
    }

    #[test]
    fn full_directive_is_kept() {
        assert_eq!(directive("lifebalance=trace"), "lifebalance=trace");
        assert_eq!(directive("warn,lifebalance=debug"), "warn,lifebalance=debug");
        assert!(EnvFilter::try_new(directive("lifebalance=trace")).is_ok());
    }
}
