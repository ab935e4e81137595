// ============================================================================
// Control Channel Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Frame has no string `kind` discriminator")]
    MissingKind,

    #[error("Malformed `{kind}` frame: {source}")]
    Malformed {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("`{0}` is an outbound-only message kind")]
    UnexpectedDirection(String),
}

impl ProtocolError {
    /// Short label used when counting rejected frames
    pub fn reason(&self) -> &'static str {
        match self {
            ProtocolError::MissingKind => "missing_kind",
            ProtocolError::Malformed { .. } => "malformed",
            ProtocolError::UnexpectedDirection(_) => "unexpected_direction",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Control channel peer has disconnected")]
    Closed,

    #[error("Failed to encode control message: {0}")]
    Encode(#[from] serde_json::Error),
}
