use thiserror::Error;

#[derive(Debug, Error)]
pub enum CallError {
    /// The mailbox rejected the request with its own error taxonomy.
    #[error("signaling rejected ({status} {code}): {message}")]
    Signal {
        status: u16,
        code: String,
        message: String,
    },

    #[error("signaling transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("camera or microphone unavailable: {0}")]
    MediaUnavailable(String),

    #[error("peer connection error: {0}")]
    Peer(String),

    #[error("malformed signaling data: {0}")]
    Malformed(String),

    #[error("a call is already active on this coordinator")]
    AlreadyActive,

    #[error("call was hung up before setup finished")]
    HungUp,
}

impl CallError {
    /// Failures the user has to act on (grant permissions, plug in a device).
    /// Everything else is retried or logged.
    pub fn is_user_actionable(&self) -> bool {
        matches!(self, CallError::MediaUnavailable(_))
    }

    pub fn signal_code(&self) -> Option<&str> {
        match self {
            CallError::Signal { code, .. } => Some(code),
            _ => None,
        }
    }
}

impl From<webrtc::Error> for CallError {
    fn from(err: webrtc::Error) -> Self {
        CallError::Peer(err.to_string())
    }
}

impl From<url::ParseError> for CallError {
    fn from(err: url::ParseError) -> Self {
        CallError::Malformed(err.to_string())
    }
}

impl From<serde_json::Error> for CallError {
    fn from(err: serde_json::Error) -> Self {
        CallError::Malformed(err.to_string())
    }
}
