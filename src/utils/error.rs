use thiserror::Error;

#[derive(Error, Debug)]
pub enum MulticamError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("CSV report error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Configuration error in '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration field: {field}")]
    MissingConfigError { field: String },

    #[error("Failed to start {backend} for {camera}: {source}")]
    BackendSpawnError {
        backend: String,
        camera: String,
        #[source]
        source: std::io::Error,
    },

    #[error("[{camera}] Connection failed after {attempts} attempt(s)")]
    ConnectionError { camera: String, attempts: u32 },

    #[error("[{camera}] Source is not connected")]
    NotConnected { camera: String },

    #[error("[{camera}] Stream ended")]
    StreamEnded { camera: String },

    #[error("Incomplete frame: expected {expected} bytes, received {received}")]
    IncompleteFrame { expected: usize, received: usize },

    #[error("Required tool '{tool}' was not found on PATH")]
    ToolNotFound { tool: String },

    #[error("Worker for {camera} failed: {message}")]
    WorkerError { camera: String, message: String },

    #[error("Processing error: {message}")]
    ProcessingError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Connection,
    Stream,
    Environment,
    Storage,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl MulticamError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => ErrorCategory::Configuration,
            Self::ConnectionError { .. } | Self::NotConnected { .. } => ErrorCategory::Connection,
            Self::StreamEnded { .. } | Self::IncompleteFrame { .. } => ErrorCategory::Stream,
            Self::BackendSpawnError { .. } | Self::ToolNotFound { .. } => {
                ErrorCategory::Environment
            }
            Self::IoError(_) | Self::SerializationError(_) | Self::CsvError(_) => {
                ErrorCategory::Storage
            }
            Self::WorkerError { .. } | Self::ProcessingError { .. } => ErrorCategory::Internal,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::StreamEnded { .. } | Self::IncompleteFrame { .. } => ErrorSeverity::Low,
            Self::ConnectionError { .. } | Self::NotConnected { .. } | Self::WorkerError { .. } => {
                ErrorSeverity::Medium
            }
            Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. }
            | Self::ProcessingError { .. }
            | Self::SerializationError(_)
            | Self::CsvError(_) => ErrorSeverity::High,
            Self::IoError(_) | Self::BackendSpawnError { .. } | Self::ToolNotFound { .. } => {
                ErrorSeverity::Critical
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionError { .. } | Self::StreamEnded { .. } | Self::IncompleteFrame { .. }
        )
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            Self::ConfigValidationError { field, .. }
            | Self::InvalidConfigValueError { field, .. } => {
                format!("Check the value of '{}' in your flags or TOML file", field)
            }
            Self::MissingConfigError { field } => {
                format!("Add '{}' to the configuration", field)
            }
            Self::ConnectionError { .. } => {
                "Verify the camera is reachable, the credentials are correct and the RTSP path exists"
                    .to_string()
            }
            Self::NotConnected { .. } => "Call connect() before grabbing frames".to_string(),
            Self::StreamEnded { .. } | Self::IncompleteFrame { .. } => {
                "The decoder stopped producing frames; check camera health or network stability"
                    .to_string()
            }
            Self::BackendSpawnError { backend, .. } => {
                format!("Make sure '{}' is installed and executable", backend)
            }
            Self::ToolNotFound { tool } => {
                format!("Install '{}' or add its directory to PATH", tool)
            }
            Self::WorkerError { .. } => {
                "Run the same camera with --run-mode seq to see the worker's own error".to_string()
            }
            Self::IoError(_) => "Check file permissions and free disk space".to_string(),
            Self::SerializationError(_) | Self::CsvError(_) => {
                "The report could not be encoded; please report this as a bug".to_string()
            }
            Self::ProcessingError { .. } => "Re-run with --verbose for details".to_string(),
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::Connection => format!("Camera connection problem: {}", self),
            ErrorCategory::Stream => format!("Stream problem: {}", self),
            ErrorCategory::Environment => format!("Environment problem: {}", self),
            ErrorCategory::Storage => format!("Could not write the report: {}", self),
            ErrorCategory::Internal => format!("Unexpected failure: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, MulticamError>;
