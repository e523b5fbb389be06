//! Error kinds surfaced to a connection via the `error` event (spec §7)

/// Reason a submitted tap was rejected by the validator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapRejection {
    ClockSkew,
    RateLimited,
}

impl std::fmt::Display for TapRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TapRejection::ClockSkew => write!(f, "ClockSkew"),
            TapRejection::RateLimited => write!(f, "RateLimited"),
        }
    }
}

/// All failure modes a Matchmaker operation can report to its caller.
///
/// Every variant is reported to the offending connection only, never
/// broadcast, and never transitions a Match's status (spec §7).
#[derive(Debug, Clone, thiserror::Error)]
pub enum MatchmakerError {
    #[error("already queued")]
    AlreadyQueued,

    #[error("already in a match")]
    AlreadyInMatch,

    #[error("not queued")]
    NotQueued,

    #[error("match not found")]
    MatchNotFound,

    #[error("not in this match")]
    NotInMatch,

    #[error("match is not active")]
    MatchNotActive,

    #[error("invalid tap: {0}")]
    InvalidTap(TapRejection),

    #[error("bad payload")]
    BadPayload,
}
