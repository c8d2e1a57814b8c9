use thiserror::Error;

/// Failures of a single proxy session
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Connect, read or handshake failure towards the device
    #[error("Upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    /// The device answered, but not with a success status
    #[error("Upstream returned status {0}")]
    UpstreamStatus(u16),

    /// The video buffer outgrew its cap or the stream cannot be parsed
    #[error("Stream corruption: {0}")]
    StreamCorruption(String),

    #[error("Invalid resource: {0}")]
    InvalidResource(String),

    /// Local setup failure, no device involved
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ProxyResult<T> = Result<T, ProxyError>;

impl ProxyError {
    /// Short label used for session outcome logging and metrics
    #[must_use]
    pub const fn outcome(&self) -> &'static str {
        match self {
            Self::UpstreamUnreachable(_) => "upstream_unreachable",
            Self::UpstreamStatus(_) => "upstream_status",
            Self::StreamCorruption(_) => "stream_corruption",
            Self::InvalidResource(_) => "invalid_resource",
            Self::Internal(_) => "internal",
        }
    }
}
