use super::{types::Config, ConfigError};
use crate::discovery::WildcardPattern;
use crate::supervisor::LaunchCommand;

/// Longest allowed idle sleep between polls; the sleep stays sub-second.
const MAX_POLL_INTERVAL_MS: u64 = 999;

/// Validate configuration
/// Currently validates:
/// - Parallelism is serial, unbounded or a positive bound (enforced by serde)
/// - Launch command template has a program and a `{}` placeholder
/// - Filename pattern is non-empty and compiles
/// - Poll interval is between 1 and 999 ms
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let starter = &config.starter;

    LaunchCommand::parse(starter.command())
        .map_err(|e| ConfigError::ValidationError(format!("starter.command: {e}")))?;

    WildcardPattern::new(starter.pattern())
        .map_err(|e| ConfigError::ValidationError(format!("starter.pattern: {e}")))?;

    if starter.poll_interval_ms == 0 || starter.poll_interval_ms > MAX_POLL_INTERVAL_MS {
        return Err(ConfigError::ValidationError(format!(
            "starter.poll_interval_ms must be between 1 and {MAX_POLL_INTERVAL_MS}, got {}",
            starter.poll_interval_ms
        )));
    }

    Ok(())
}
