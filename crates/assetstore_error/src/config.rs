//! Settings and telemetry bootstrap failures.

/// Where in bootstrap a configuration failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum ConfigStage {
    /// Layered settings sources could not be read or merged.
    #[display("read")]
    Read,
    /// Merged settings did not deserialize into the expected shape.
    #[display("parse")]
    Parse,
    /// The tracing subscriber could not be installed.
    #[display("telemetry")]
    Telemetry,
}

/// Settings could not be loaded, or logging could not start.
///
/// ```
/// use assetstore_error::{ConfigError, ConfigStage};
///
/// let err = ConfigError::parse("missing field `chunk_size`");
/// assert_eq!(err.stage, ConfigStage::Parse);
/// assert!(err.to_string().starts_with("Config (parse): missing field"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Config ({}): {} ({}:{})", stage, message, file, line)]
pub struct ConfigError {
    /// Bootstrap step that failed.
    pub stage: ConfigStage,
    /// Underlying cause as reported by `config` or `tracing_subscriber`.
    pub message: String,
    /// Source line of the caller.
    pub line: u32,
    /// Source file of the caller.
    pub file: &'static str,
}

impl ConfigError {
    /// A failure at `stage`, located at the caller.
    #[track_caller]
    pub fn new(stage: ConfigStage, message: impl Into<String>) -> Self {
        let caller = std::panic::Location::caller();
        Self {
            stage,
            message: message.into(),
            line: caller.line(),
            file: caller.file(),
        }
    }

    /// Reading `source` failed.
    #[track_caller]
    pub fn read(source: impl std::fmt::Display, cause: impl std::fmt::Display) -> Self {
        Self::new(ConfigStage::Read, format!("{source}: {cause}"))
    }

    /// Deserializing merged settings failed.
    #[track_caller]
    pub fn parse(cause: impl std::fmt::Display) -> Self {
        Self::new(ConfigStage::Parse, cause.to_string())
    }

    /// Installing the global subscriber failed.
    #[track_caller]
    pub fn telemetry(cause: impl std::fmt::Display) -> Self {
        Self::new(ConfigStage::Telemetry, cause.to_string())
    }
}
