//! Error types for pipeline composition and evaluation.

use std::fmt;
use std::process::ExitStatus;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// The four error families a pipeline can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Operands of the chain operator do not fit together.
    Composition,
    /// A stage's fixed parameters are invalid regardless of data.
    StageConfiguration,
    /// A stage failed while producing an item from live data.
    StageRuntime,
    /// An external resource could not be acquired or released.
    Resource,
}

impl ErrorKind {
    /// Short kebab-case label used in diagnostics.
    pub fn label(self) -> &'static str {
        match self {
            ErrorKind::Composition => "composition",
            ErrorKind::StageConfiguration => "stage-configuration",
            ErrorKind::StageRuntime => "stage-runtime",
            ErrorKind::Resource => "resource",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Errors raised while building or pulling from a pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("cannot compose pipeline: {message}")]
    Composition { message: String },

    #[error("{stage}: invalid configuration: {message}")]
    StageConfiguration { stage: String, message: String },

    #[error("{stage}: invalid pattern: {source}")]
    InvalidPattern {
        stage: String,
        #[source]
        source: regex::Error,
    },

    #[error("{stage}: invalid glob: {source}")]
    InvalidGlob {
        stage: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("{stage}: {message}")]
    StageRuntime { stage: String, message: String },

    #[error("{stage}: I/O error: {source}")]
    Io {
        stage: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{stage}: command {command:?} failed: {status}")]
    CommandFailed {
        stage: String,
        command: String,
        status: ExitStatus,
    },

    #[error("{stage}: stage already failed")]
    StageFailed { stage: String },

    #[error("{stage}: cannot {action}: {source}")]
    Resource {
        stage: String,
        action: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{stage}: cannot walk directory: {source}")]
    Walk {
        stage: String,
        #[source]
        source: walkdir::Error,
    },

    #[error("curl: cannot fetch {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: Box<ureq::Error>,
    },
}

impl PipelineError {
    pub fn composition(message: impl Into<String>) -> Self {
        PipelineError::Composition {
            message: message.into(),
        }
    }

    pub fn configuration(stage: &str, message: impl Into<String>) -> Self {
        PipelineError::StageConfiguration {
            stage: stage.to_string(),
            message: message.into(),
        }
    }

    pub fn runtime(stage: &str, message: impl Into<String>) -> Self {
        PipelineError::StageRuntime {
            stage: stage.to_string(),
            message: message.into(),
        }
    }

    pub fn io(stage: &str, source: std::io::Error) -> Self {
        PipelineError::Io {
            stage: stage.to_string(),
            source,
        }
    }

    pub fn resource(stage: &str, action: impl Into<String>, source: std::io::Error) -> Self {
        PipelineError::Resource {
            stage: stage.to_string(),
            action: action.into(),
            source,
        }
    }

    /// Which family this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Composition { .. } => ErrorKind::Composition,
            PipelineError::StageConfiguration { .. }
            | PipelineError::InvalidPattern { .. }
            | PipelineError::InvalidGlob { .. } => ErrorKind::StageConfiguration,
            PipelineError::StageRuntime { .. }
            | PipelineError::Io { .. }
            | PipelineError::CommandFailed { .. }
            | PipelineError::StageFailed { .. } => ErrorKind::StageRuntime,
            PipelineError::Resource { .. }
            | PipelineError::Walk { .. }
            | PipelineError::Network { .. } => ErrorKind::Resource,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            PipelineError::composition("x").kind(),
            ErrorKind::Composition
        );
        assert_eq!(
            PipelineError::configuration("cut", "empty delimiter").kind(),
            ErrorKind::StageConfiguration
        );
        assert_eq!(
            PipelineError::runtime("cut", "no field 3").kind(),
            ErrorKind::StageRuntime
        );
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(
            PipelineError::resource("cat", "open file", io).kind(),
            ErrorKind::Resource
        );
    }

    #[test]
    fn test_invalid_pattern_is_configuration() {
        let source = regex::Regex::new("(").unwrap_err();
        let err = PipelineError::InvalidPattern {
            stage: "grep".to_string(),
            source,
        };
        assert_eq!(err.kind(), ErrorKind::StageConfiguration);
        assert!(err.to_string().starts_with("grep: invalid pattern"));
    }

    #[test]
    fn test_display_messages() {
        let err = PipelineError::runtime("join", "expected fields, got text");
        assert_eq!(err.to_string(), "join: expected fields, got text");
        assert_eq!(ErrorKind::StageRuntime.to_string(), "stage-runtime");
    }
}
