pub type ChronoResult<T> = Result<T, ChronoError>;

#[derive(thiserror::Error, Debug)]
pub enum ChronoError {
    #[error("repository error: {0}")]
    Repository(String),

    #[error("branch not found: {0}")]
    BranchNotFound(String),

    #[error("{0}")]
    EmptyHistory(String),

    #[error("encoder unavailable: {0}")]
    EncoderUnavailable(String),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("invalid option: {0}")]
    InvalidOption(String),

    #[error("render error: {0}")]
    Render(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("not ready: {0}")]
    NotReady(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ChronoError {
    pub fn repository(msg: impl Into<String>) -> Self {
        Self::Repository(msg.into())
    }

    pub fn branch_not_found(msg: impl Into<String>) -> Self {
        Self::BranchNotFound(msg.into())
    }

    pub fn empty_history(msg: impl Into<String>) -> Self {
        Self::EmptyHistory(msg.into())
    }

    pub fn encoder_unavailable(msg: impl Into<String>) -> Self {
        Self::EncoderUnavailable(msg.into())
    }

    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::Encoding(msg.into())
    }

    pub fn invalid_option(msg: impl Into<String>) -> Self {
        Self::InvalidOption(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn not_ready(msg: impl Into<String>) -> Self {
        Self::NotReady(msg.into())
    }
}

impl From<git2::Error> for ChronoError {
    fn from(e: git2::Error) -> Self {
        Self::Repository(e.message().to_owned())
    }
}
