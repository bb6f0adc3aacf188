use thiserror::Error;

/// Errors surfaced by the store operations in this crate.
///
/// Constraint violations are translated into their domain meaning here and
/// only here; callers must never inspect [`diesel::result::Error`] values or
/// match on error message text.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The unique index on `votes.device_fingerprint` rejected an insert.
    /// This is the authoritative "already voted" signal; any client-side
    /// check is advisory.
    #[error("a vote for this device already exists")]
    DuplicateVote,

    /// The foreign key on `votes.team_id` rejected an insert, or the named
    /// team could not be found.
    #[error("the referenced team does not exist")]
    UnknownTeam,

    /// The unique index on `teams.name` rejected an insert.
    #[error("a team with this name already exists")]
    DuplicateTeamName,

    /// Anything else: connection failures, malformed queries, a broken pool.
    /// Recoverable by retrying the request.
    #[error("database error: {0}")]
    Transport(#[from] diesel::result::Error),
}
