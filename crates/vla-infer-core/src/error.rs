//! Error types for vla-infer

/// Result type alias using vla-infer's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for model selection, loading and inference
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested backend name is not registered
    #[error("unknown model type: {}. Supported model types: {}", .kind, .supported.join(", "))]
    UnsupportedKind {
        /// The value that was asked for
        kind: String,
        /// Every registered backend name
        supported: Vec<String>,
    },

    /// Backend initialization errors (weights, processor, device)
    #[error("failed to load model: {0}")]
    Load(String),

    /// `predict` was called before a successful `load`
    #[error("model not loaded, call load() first")]
    NotLoaded,

    /// Errors raised while running a prediction
    #[error("inference error: {0}")]
    Inference(String),

    /// Invalid invocation of the command-line driver
    #[error("{0}")]
    Usage(String),

    /// Image decoding or file errors
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a new unsupported-kind error
    pub fn unsupported_kind(kind: impl Into<String>, supported: Vec<String>) -> Self {
        Self::UnsupportedKind {
            kind: kind.into(),
            supported,
        }
    }

    /// Create a new load error
    pub fn load(msg: impl Into<String>) -> Self {
        Self::Load(msg.into())
    }

    /// Create a new inference error
    pub fn inference(msg: impl Into<String>) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new usage error
    pub fn usage(msg: impl Into<String>) -> Self {
        Self::Usage(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Reclassify as a load failure, keeping load errors untouched
    pub fn into_load(self) -> Self {
        match self {
            Self::Load(_) => self,
            other => Self::Load(other.to_string()),
        }
    }

    /// Reclassify as an inference failure.
    ///
    /// `NotLoaded` keeps its identity since it is a precondition violation,
    /// not a failure of the prediction itself.
    pub fn into_inference(self) -> Self {
        match self {
            Self::Inference(_) | Self::NotLoaded => self,
            other => Self::Inference(other.to_string()),
        }
    }

    /// Whether this error is a driver usage error
    pub fn is_usage(&self) -> bool {
        matches!(self, Self::Usage(_))
    }
}
