use croft_types::api::ContentError;

/// Errors surfaced at the service boundary. Write failures are also echoed
/// on the event stream so observers that never see the `Result` still learn
/// about them.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("not connected")]
    NotConnected,

    #[error("already connected or connecting")]
    AlreadyConnected,

    #[error("connection attempt superseded")]
    Superseded,

    #[error("farmer id must be a non-empty string")]
    InvalidFarmerId,

    #[error(transparent)]
    InvalidContent(#[from] ContentError),

    #[error("invalid voice message: {0}")]
    InvalidVoice(&'static str),

    #[error("request timed out")]
    Timeout,

    #[error("message missing or not owned by this farmer")]
    NotOwner,

    #[error("hub returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("feed error: {0}")]
    Feed(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(e.to_string())
        }
    }
}
