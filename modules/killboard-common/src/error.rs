use thiserror::Error;

#[derive(Error, Debug)]
pub enum KillboardError {
    #[error("Malformed event record: {0}")]
    Malformed(String),

    #[error("Unknown period: {0}")]
    UnknownPeriod(String),

    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
