//! Error taxonomy for the analysis/emission pipeline.
//!
//! Fatal errors (`Config`, `Io`, `Decode`, `Analysis`) abort the run before
//! any event is sent. `Network` is only used where a send path cannot even be
//! constructed; individual send failures are logged and never become errors.
//! `Interrupted` is a control-flow outcome, not a failure.

pub type Result<T> = std::result::Result<T, TrackcastError>;

#[derive(Debug, thiserror::Error)]
pub enum TrackcastError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("input error: {0}")]
    Io(#[from] std::io::Error),

    #[error("decode error: {0}")]
    Decode(#[from] hound::Error),

    #[error("analysis error: {0}")]
    Analysis(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("interrupted")]
    Interrupted,
}

impl TrackcastError {
    /// Process exit status for this error, matching the CLI contract:
    /// 130 for an interrupt, 1 for everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            TrackcastError::Interrupted => 130,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_cli_contract() {
        assert_eq!(TrackcastError::Interrupted.exit_code(), 130);
        assert_eq!(TrackcastError::Config("bad".into()).exit_code(), 1);
        assert_eq!(TrackcastError::Network("down".into()).exit_code(), 1);
    }
}
