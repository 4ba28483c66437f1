use std::fmt;

/// Which of the two generation rounds an artifact belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundId {
    V1,
    V2,
}

impl RoundId {
    /// File-name suffix for this round's image, e.g. `v1`.
    pub fn suffix(self) -> &'static str {
        match self {
            Self::V1 => "v1",
            Self::V2 => "v2",
        }
    }
}

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V1 => write!(f, "V1"),
            Self::V2 => write!(f, "V2"),
        }
    }
}

/// Error type for pipeline stages, with variants designed around what the
/// caller can do about them.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// The dataset could not be read or prepared. Fix the input file.
    #[error("dataset: {0}")]
    Dataset(String),
    /// The model call failed (network, auth, rate limit, bad payload).
    #[error("model: {0}")]
    Model(String),
    /// The model response had no delimited block and the policy is to abort.
    #[error("no delimited block in {0} response")]
    MissingBlock(RoundId),
    /// A chart script failed and the policy is to abort.
    #[error("{round} script: {message}")]
    Script { round: RoundId, message: String },
    /// Configuration could not be loaded or is inconsistent.
    #[error("config: {0}")]
    Config(String),
    /// Filesystem failure outside the dataset loader.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    /// Bad input or stage logic error. Don't retry, fix the code.
    #[error("invalid: {0}")]
    Invalid(String),
}

impl From<ureq::Error> for StageError {
    fn from(e: ureq::Error) -> Self {
        StageError::Model(e.to_string())
    }
}

impl From<csv::Error> for StageError {
    fn from(e: csv::Error) -> Self {
        StageError::Dataset(e.to_string())
    }
}

impl From<image::ImageError> for StageError {
    fn from(e: image::ImageError) -> Self {
        StageError::Io(std::io::Error::other(e.to_string()))
    }
}

impl StageError {
    /// Create an [`Invalid`](StageError::Invalid) error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        StageError::Invalid(msg.into())
    }

    /// Create a [`Dataset`](StageError::Dataset) error.
    pub fn dataset(msg: impl Into<String>) -> Self {
        StageError::Dataset(msg.into())
    }

    /// Create a [`Model`](StageError::Model) error.
    pub fn model(msg: impl Into<String>) -> Self {
        StageError::Model(msg.into())
    }

    /// True when the failure came from talking to a model.
    pub fn is_model(&self) -> bool {
        matches!(self, StageError::Model(_))
    }
}
