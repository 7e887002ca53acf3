//! Crate-wide error taxonomy.
//!
//! Four failure classes cover everything the core can encounter:
//!
//! | Variant | Meaning | Policy |
//! |---------|---------|--------|
//! | [`Error::Transport`] | broker or HTTP unreachable/timeout | broker connects retry forever; HTTP is logged, no retry |
//! | [`Error::Parse`] | malformed JSON or missing required field | offending input discarded, processing continues |
//! | [`Error::Protocol`] | unexpected status from the train controller | logged, operation fails, no partial mutation |
//! | [`Error::NotConfigured`] | operation needs an address that is not set | silent no-op |
//!
//! No variant is fatal to the process.

/// Errors produced by the trackside core.
#[derive(Debug)]
pub enum Error {
    /// Broker or HTTP transport failure (unreachable, timeout, socket error).
    Transport(String),
    /// Malformed JSON payload or missing required field.
    Parse(String),
    /// The remote train controller answered with a non-2xx status.
    Protocol {
        /// HTTP status code returned by the controller.
        status: u16,
        /// Response body, for logging.
        body: String,
    },
    /// A required address (broker or controller) is not configured.
    NotConfigured(&'static str),
}

impl Error {
    /// Build a transport error from anything displayable.
    pub fn transport(e: impl std::fmt::Display) -> Self {
        Self::Transport(e.to_string())
    }

    /// Build a parse error from anything displayable.
    pub fn parse(e: impl std::fmt::Display) -> Self {
        Self::Parse(e.to_string())
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport error: {}", e),
            Self::Parse(e) => write!(f, "parse error: {}", e),
            Self::Protocol { status, body } => {
                write!(f, "controller returned status {}: {}", status, body)
            }
            Self::NotConfigured(what) => write!(f, "{} not configured", what),
        }
    }
}

impl std::error::Error for Error {}
