use navlink_fc::TransportError;
use std::time::Duration;

/// Invalid construction parameters. The only failure that makes a component unusable.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be a positive, finite number of seconds (got {value})")]
    InvalidPeriod { name: &'static str, value: f64 },
    #[error("disconnect threshold must be at least one heartbeat period")]
    ZeroDisconnectPeriod,
    #[error("{name} must be positive and finite (got {value})")]
    InvalidRate { name: &'static str, value: f32 },
    #[error("target coordinates must be finite")]
    InvalidTarget,
}

/// A telemetry sampling pass aborted by a read error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FuseError {
    #[error("telemetry read failed: {0}")]
    Transport(#[from] TransportError),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("telemetry missing {0} data")]
    MissingData(&'static str),
    #[error("command send failed: {0}")]
    Transport(#[from] TransportError),
}

pub(crate) fn period(name: &'static str, secs: f64) -> Result<Duration, ConfigError> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(ConfigError::InvalidPeriod { name, value: secs });
    }
    Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::InvalidPeriod { name, value: secs })
}
