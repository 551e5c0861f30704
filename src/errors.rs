use thiserror::Error;

/// Coarse classification of a [`RecordingError`], handy for matching in callers and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingErrorKind {
    InvalidState,
    ProtocolViolation,
    SizeMismatch,
    UnsupportedFormat,
    ResourceUnavailable,
    Codec,
    Io,
    Config,
}

#[derive(Debug, Error)]
pub enum RecordingError {
    /// Operation attempted in the wrong stream state
    #[error("Invalid stream state: {0}")]
    InvalidState(String),
    /// Encoder or muxer produced output out of the expected order
    #[error("Encoder/muxer protocol violation: {0}")]
    ProtocolViolation(String),
    #[error("Buffer size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    /// Encoder or muxer could not be created
    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),
    /// Encoder or muxer rejected an operation
    #[error("Codec error: {0}")]
    Codec(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RecordingError {
    pub fn invalid_state(message: impl Into<String>) -> Self {
        RecordingError::InvalidState(message.into())
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        RecordingError::ProtocolViolation(message.into())
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        RecordingError::UnsupportedFormat(message.into())
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        RecordingError::ResourceUnavailable(message.into())
    }

    pub fn codec(message: impl Into<String>) -> Self {
        RecordingError::Codec(message.into())
    }

    pub fn kind(&self) -> RecordingErrorKind {
        match self {
            RecordingError::InvalidState(_) => RecordingErrorKind::InvalidState,
            RecordingError::ProtocolViolation(_) => RecordingErrorKind::ProtocolViolation,
            RecordingError::SizeMismatch { .. } => RecordingErrorKind::SizeMismatch,
            RecordingError::UnsupportedFormat(_) => RecordingErrorKind::UnsupportedFormat,
            RecordingError::ResourceUnavailable(_) => RecordingErrorKind::ResourceUnavailable,
            RecordingError::Codec(_) => RecordingErrorKind::Codec,
            RecordingError::Io(_) => RecordingErrorKind::Io,
            RecordingError::Config(_) => RecordingErrorKind::Config,
        }
    }

    /// Protocol violations end the recording session; everything else only aborts the call.
    pub fn is_fatal(&self) -> bool {
        self.kind() == RecordingErrorKind::ProtocolViolation
    }
}
