use chrono::NaiveDateTime;
use diesel::{
    connection::LoadConnection, dsl::now, insert_into, prelude::*,
    result::DatabaseErrorKind, sqlite::Sqlite,
};
use serde::Serialize;

use crate::{error::StoreError, schema::votes};

#[derive(Debug, Queryable, Serialize, Clone)]
pub struct Vote {
    pub id: i64,
    pub public_id: String,
    pub team_id: i64,
    pub device_fingerprint: String,
    pub user_agent: String,
    pub created_at: NaiveDateTime,
}

impl Vote {
    /// The advisory pre-check: does this device already have a vote on
    /// record? The unique index remains the actual guarantee.
    pub fn find_by_fingerprint(
        conn: &mut (impl Connection<Backend = Sqlite> + LoadConnection),
        fingerprint: &str,
    ) -> Result<Option<Vote>, StoreError> {
        Ok(votes::table
            .filter(votes::device_fingerprint.eq(fingerprint))
            .first::<Vote>(conn)
            .optional()?)
    }

    /// Records a vote. The store enforces both invariants: at most one vote
    /// per fingerprint ([`StoreError::DuplicateVote`]) and votes only for
    /// teams that exist ([`StoreError::UnknownTeam`]).
    pub fn insert(
        conn: &mut (impl Connection<Backend = Sqlite> + LoadConnection),
        public_id: &str,
        team_id: i64,
        fingerprint: &str,
        user_agent: &str,
    ) -> Result<Vote, StoreError> {
        let result = insert_into(votes::table)
            .values((
                votes::public_id.eq(public_id),
                votes::team_id.eq(team_id),
                votes::device_fingerprint.eq(fingerprint),
                votes::user_agent.eq(user_agent),
                votes::created_at.eq(now),
            ))
            .get_result::<Vote>(conn);

        match result {
            Ok(vote) => Ok(vote),
            Err(diesel::result::Error::DatabaseError(
                DatabaseErrorKind::UniqueViolation,
                _,
            )) => Err(StoreError::DuplicateVote),
            Err(diesel::result::Error::DatabaseError(
                DatabaseErrorKind::ForeignKeyViolation,
                _,
            )) => Err(StoreError::UnknownTeam),
            Err(e) => Err(StoreError::Transport(e)),
        }
    }
}
