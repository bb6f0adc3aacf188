use chrono::NaiveDateTime;
use diesel::{
    connection::LoadConnection, dsl::now, insert_into, prelude::*,
    sqlite::Sqlite,
};
use serde::Serialize;

use crate::{
    error::StoreError,
    schema::{teams, vote_records},
};

/// The denormalised per-team vote count. Bumped by the `votes_bump_tally`
/// trigger on every vote insert; nothing in this crate writes `vote_count`.
#[derive(Debug, Queryable, Serialize, Clone)]
pub struct TallyRecord {
    pub id: i64,
    pub team_id: i64,
    pub vote_count: i64,
    pub last_updated: NaiveDateTime,
}

/// One leaderboard row: a tally joined with the minimal team projection.
#[derive(Debug, Queryable, Serialize, Clone, PartialEq, Eq)]
pub struct TallyRow {
    pub team_public_id: String,
    pub team_name: String,
    pub vote_count: i64,
    pub last_updated: NaiveDateTime,
}

impl TallyRow {
    /// Leaderboard rows, highest count first. Ties order by team id so the
    /// output is stable across refetches.
    pub fn leaderboard(
        conn: &mut (impl Connection<Backend = Sqlite> + LoadConnection),
    ) -> Result<Vec<TallyRow>, StoreError> {
        Ok(vote_records::table
            .inner_join(teams::table)
            .order((
                vote_records::vote_count.desc(),
                vote_records::team_id.asc(),
            ))
            .select((
                teams::public_id,
                teams::name,
                vote_records::vote_count,
                vote_records::last_updated,
            ))
            .load::<TallyRow>(conn)?)
    }
}

impl TallyRecord {
    /// Creates the zeroed tally row for a freshly registered team. Callers
    /// treat a failure as non-fatal; a team without a tally row simply never
    /// appears on the leaderboard.
    pub fn init_for_team(
        conn: &mut (impl Connection<Backend = Sqlite> + LoadConnection),
        team_id: i64,
    ) -> Result<(), StoreError> {
        insert_into(vote_records::table)
            .values((
                vote_records::team_id.eq(team_id),
                vote_records::vote_count.eq(0),
                vote_records::last_updated.eq(now),
            ))
            .execute(conn)?;

        Ok(())
    }

    pub fn for_team(
        conn: &mut (impl Connection<Backend = Sqlite> + LoadConnection),
        team_id: i64,
    ) -> Result<Option<TallyRecord>, StoreError> {
        Ok(vote_records::table
            .filter(vote_records::team_id.eq(team_id))
            .first::<TallyRecord>(conn)
            .optional()?)
    }
}
