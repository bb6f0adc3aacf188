use chrono::NaiveDateTime;
use diesel::{
    connection::LoadConnection, dsl::now, insert_into, prelude::*,
    result::DatabaseErrorKind, sqlite::Sqlite,
};
use serde::{Deserialize, Serialize};

use crate::{error::StoreError, schema::teams};

#[derive(Debug, Queryable, Serialize, Clone)]
pub struct Team {
    pub id: i64,
    pub public_id: String,
    pub name: String,
    pub description: String,
    /// JSON-encoded list of member names.
    pub members: String,
    pub captain_name: Option<String>,
    pub contact_info: Option<String>,
    pub project_description: Option<String>,
    pub is_registered: bool,
    pub created_at: NaiveDateTime,
}

/// The fields a team supplies when registering. Everything else (ids,
/// timestamps, the registration flag) is filled in at insert time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamDraft {
    pub name: String,
    pub description: String,
    pub captain_name: String,
    pub members: Vec<String>,
    pub contact_info: String,
    pub project_description: Option<String>,
}

impl Team {
    pub fn member_names(&self) -> Vec<String> {
        serde_json::from_str(&self.members).unwrap_or_default()
    }

    pub fn validate_name(name: &str) -> bool {
        name.trim().chars().count() >= 2
    }

    pub fn validate_description(description: &str) -> bool {
        description.trim().chars().count() >= 10
    }

    /// All teams, sorted by name.
    pub fn all_ordered(
        conn: &mut (impl Connection<Backend = Sqlite> + LoadConnection),
    ) -> Result<Vec<Team>, StoreError> {
        Ok(teams::table.order(teams::name.asc()).load::<Team>(conn)?)
    }

    pub fn by_public_id(
        conn: &mut (impl Connection<Backend = Sqlite> + LoadConnection),
        public_id: &str,
    ) -> Result<Option<Team>, StoreError> {
        Ok(teams::table
            .filter(teams::public_id.eq(public_id))
            .first::<Team>(conn)
            .optional()?)
    }

    /// Inserts a newly registered team. Team names are unique; a collision
    /// surfaces as [`StoreError::DuplicateTeamName`].
    pub fn insert(
        conn: &mut (impl Connection<Backend = Sqlite> + LoadConnection),
        public_id: &str,
        draft: &TeamDraft,
    ) -> Result<Team, StoreError> {
        let members = serde_json::to_string(&draft.members).unwrap();

        let result = insert_into(teams::table)
            .values((
                teams::public_id.eq(public_id),
                teams::name.eq(&draft.name),
                teams::description.eq(&draft.description),
                teams::members.eq(&members),
                teams::captain_name.eq(&draft.captain_name),
                teams::contact_info.eq(&draft.contact_info),
                teams::project_description.eq(&draft.project_description),
                teams::is_registered.eq(true),
                teams::created_at.eq(now),
            ))
            .get_result::<Team>(conn);

        match result {
            Ok(team) => Ok(team),
            Err(diesel::result::Error::DatabaseError(
                DatabaseErrorKind::UniqueViolation,
                _,
            )) => Err(StoreError::DuplicateTeamName),
            Err(e) => Err(StoreError::Transport(e)),
        }
    }
}

#[cfg(test)]
mod test_team_validation {
    use super::Team;

    #[test]
    fn test_name_needs_two_chars() {
        assert!(Team::validate_name("Ok"));
        assert!(!Team::validate_name(" x "));
    }

    #[test]
    fn test_description_needs_ten_chars() {
        assert!(Team::validate_description("builds robot arms"));
        assert!(!Team::validate_description("robots"));
    }
}
