//! End-to-end tests of the voting flow, driven through Rocket's blocking
//! test client against a throwaway SQLite database. Each test uses an
//! untracked client so cookies are passed explicitly, the way separate
//! browser sessions would present them.

use diesel::dsl::now;
use diesel::prelude::*;
use diesel::{Connection, SqliteConnection};
use rocket::http::{ContentType, Cookie, Status};
use rocket::local::blocking::{Client, LocalResponse};
use uuid::Uuid;

use db::schema::{teams, vote_records, votes};
use db::tally::{TallyRecord, TallyRow};
use db::vote::Vote;

use crate::make_rocket;
use crate::voting::VoteForm;

fn get_test_rocket_instance() -> (Client, SqliteConnection) {
    let db_name = format!("{}.db", Uuid::now_v7());

    let mut conn = SqliteConnection::establish(&db_name)
        .expect("Database connection failed");
    diesel::sql_query("PRAGMA journal_mode=WAL")
        .execute(&mut conn)
        .expect("Failed to enable WAL mode");
    diesel::sql_query("PRAGMA foreign_keys=ON")
        .execute(&mut conn)
        .expect("Failed to enable foreign keys");
    diesel::sql_query("pragma synchronous = off;")
        .execute(&mut conn)
        .expect("Failed to disable sync commit");

    let rocket = make_rocket(&db_name, None);
    (Client::untracked(rocket).unwrap(), conn)
}

fn register<'c>(client: &'c Client, name: &str) -> LocalResponse<'c> {
    client
        .post("/register")
        .header(ContentType::Form)
        .body(format!(
            "name={name}\
             &description=A+team+that+builds+interesting+things\
             &captain_name=Casey\
             &members=Alex&members=Sam&members=\
             &contact_info=07700900123\
             &project_description="
        ))
        .dispatch()
}

fn vote<'c>(
    client: &'c Client,
    fingerprint: &str,
    team_public_id: &str,
) -> LocalResponse<'c> {
    client
        .post("/vote")
        .header(ContentType::Form)
        .cookie(Cookie::new("device_fp", fingerprint.to_string()))
        .body(
            serde_urlencoded::to_string(&VoteForm {
                team_id: team_public_id.to_string(),
            })
            .unwrap(),
        )
        .dispatch()
}

fn public_id_of(conn: &mut SqliteConnection, name: &str) -> String {
    teams::table
        .filter(teams::name.eq(name))
        .select(teams::public_id)
        .first::<String>(conn)
        .unwrap()
}

fn id_of(conn: &mut SqliteConnection, name: &str) -> i64 {
    teams::table
        .filter(teams::name.eq(name))
        .select(teams::id)
        .first::<i64>(conn)
        .unwrap()
}

fn vote_count(conn: &mut SqliteConnection) -> i64 {
    votes::table.count().get_result::<i64>(conn).unwrap()
}

#[test]
fn test_vote_happy_path_and_session_guard() {
    let (client, mut conn) = get_test_rocket_instance();

    assert_eq!(register(&client, "Alpha").status(), Status::SeeOther);
    assert_eq!(register(&client, "Beta").status(), Status::SeeOther);

    let alpha_pid = public_id_of(&mut conn, "Alpha");
    let beta_pid = public_id_of(&mut conn, "Beta");

    // (1) the voting page lists the registered teams
    let page = client.get("/").dispatch();
    assert_eq!(page.status(), Status::Ok);
    let body = page.into_string().unwrap();
    assert!(body.contains("Alpha"));
    assert!(body.contains("Beta"));

    // (2) a first vote is accepted and lands on the results page
    let resp = vote(&client, "abc123", &alpha_pid);
    assert_eq!(resp.status(), Status::SeeOther);
    assert_eq!(resp.headers().get_one("Location"), Some("/results"));
    assert_eq!(
        resp.cookies()
            .get("voted_team")
            .map(|cookie| cookie.value().to_string()),
        Some(alpha_pid.clone())
    );

    let stored = votes::table.first::<Vote>(&mut conn).unwrap();
    assert_eq!(stored.device_fingerprint, "abc123");
    assert_eq!(stored.team_id, id_of(&mut conn, "Alpha"));

    // (3) the trigger bumped the denormalised count
    let alpha_id = id_of(&mut conn, "Alpha");
    let tally = TallyRecord::for_team(&mut conn, alpha_id)
        .unwrap()
        .unwrap();
    assert_eq!(tally.vote_count, 1);

    // (4) a second attempt from the same session is turned away before it
    // reaches the store
    let resp = client
        .post("/vote")
        .header(ContentType::Form)
        .cookie(Cookie::new("device_fp", "abc123"))
        .cookie(Cookie::new("voted_team", alpha_pid.clone()))
        .body(
            serde_urlencoded::to_string(&VoteForm {
                team_id: beta_pid.clone(),
            })
            .unwrap(),
        )
        .dispatch();
    assert_eq!(resp.status(), Status::SeeOther);
    assert_eq!(resp.headers().get_one("Location"), Some("/"));
    assert_eq!(vote_count(&mut conn), 1);

    // (5) the voting page now reports the voted team and disables voting
    let page = client
        .get("/")
        .cookie(Cookie::new("device_fp", "abc123"))
        .dispatch();
    let body = page.into_string().unwrap();
    assert!(body.contains("You voted for"));
}

#[test]
fn test_duplicate_vote_reports_the_attempted_team() {
    let (client, mut conn) = get_test_rocket_instance();

    assert_eq!(register(&client, "Gamma").status(), Status::SeeOther);
    assert_eq!(register(&client, "Delta").status(), Status::SeeOther);

    let gamma_pid = public_id_of(&mut conn, "Gamma");
    let delta_pid = public_id_of(&mut conn, "Delta");
    let gamma_id = id_of(&mut conn, "Gamma");

    // a vote recorded in an earlier session on this device
    assert_eq!(vote(&client, "dupfp01", &gamma_pid).status(), Status::SeeOther);

    // a fresh session (no cookies beyond the fingerprint) tries a different
    // team; the store's unique index rejects it
    let resp = vote(&client, "dupfp01", &delta_pid);
    assert_eq!(resp.status(), Status::SeeOther);
    assert_eq!(resp.headers().get_one("Location"), Some("/results"));

    // the session now believes it voted for Delta even though the stored
    // vote is for Gamma: the attempted team is used as a best-effort guess
    // and the actual vote is not re-queried
    assert_eq!(
        resp.cookies()
            .get("voted_team")
            .map(|cookie| cookie.value().to_string()),
        Some(delta_pid)
    );

    assert_eq!(vote_count(&mut conn), 1);
    let stored = votes::table.first::<Vote>(&mut conn).unwrap();
    assert_eq!(stored.team_id, gamma_id);

    let tally = TallyRecord::for_team(&mut conn, gamma_id)
        .unwrap()
        .unwrap();
    assert_eq!(tally.vote_count, 1);
}

#[test]
fn test_vote_for_unknown_team() {
    let (client, mut conn) = get_test_rocket_instance();

    let resp = vote(&client, "fp9zz", "no-such-team");
    assert_eq!(resp.status(), Status::SeeOther);
    assert_eq!(resp.headers().get_one("Location"), Some("/"));
    assert_eq!(vote_count(&mut conn), 0);
}

#[test]
fn test_voting_page_with_no_teams() {
    let (client, _conn) = get_test_rocket_instance();

    let page = client.get("/").dispatch();
    assert_eq!(page.status(), Status::Ok);
    let body = page.into_string().unwrap();
    assert!(body.contains("No teams have registered yet"));
}

#[test]
fn test_leaderboard_ordering_and_tie_break() {
    let (client, mut conn) = get_test_rocket_instance();

    for name in ["Alpha", "Beta", "Gamma", "Delta"] {
        assert_eq!(register(&client, name).status(), Status::SeeOther);
    }

    let alpha_pid = public_id_of(&mut conn, "Alpha");
    let beta_pid = public_id_of(&mut conn, "Beta");

    assert_eq!(vote(&client, "fp1", &beta_pid).status(), Status::SeeOther);
    assert_eq!(vote(&client, "fp2", &beta_pid).status(), Status::SeeOther);
    assert_eq!(vote(&client, "fp3", &alpha_pid).status(), Status::SeeOther);

    // highest count first; the zero-vote teams tie and fall back to team id
    // order, which is registration order
    let rows = TallyRow::leaderboard(&mut conn).unwrap();
    assert_eq!(
        rows.iter()
            .map(|row| (row.team_name.as_str(), row.vote_count))
            .collect::<Vec<_>>(),
        vec![("Beta", 2), ("Alpha", 1), ("Gamma", 0), ("Delta", 0)]
    );

    // the partial the results page refetches reflects the same order
    let partial = client.get("/results/table").dispatch();
    assert_eq!(partial.status(), Status::Ok);
    let body = partial.into_string().unwrap();
    assert!(body.find("Beta").unwrap() < body.find("Alpha").unwrap());
}

#[test]
fn test_duplicate_team_name_leaves_a_single_tally_record() {
    let (client, mut conn) = get_test_rocket_instance();

    assert_eq!(register(&client, "Echo").status(), Status::SeeOther);

    let resp = register(&client, "Echo");
    assert_eq!(resp.status(), Status::Ok);
    let body = resp.into_string().unwrap();
    assert!(body.contains("already exists"));

    assert_eq!(
        teams::table.count().get_result::<i64>(&mut conn).unwrap(),
        1
    );
    assert_eq!(
        vote_records::table
            .count()
            .get_result::<i64>(&mut conn)
            .unwrap(),
        1
    );
}

#[test]
fn test_vote_without_a_tally_row_is_tolerated() {
    let (client, mut conn) = get_test_rocket_instance();

    // a team created outside the registration flow has no tally row, so the
    // bump trigger has nothing to update
    diesel::insert_into(teams::table)
        .values((
            teams::public_id.eq("unseeded1"),
            teams::name.eq("Unseeded"),
            teams::description.eq("created outside the registration flow"),
            teams::members.eq("[]"),
            teams::is_registered.eq(true),
            teams::created_at.eq(now),
        ))
        .execute(&mut conn)
        .unwrap();

    let resp = vote(&client, "fp7aa", "unseeded1");
    assert_eq!(resp.status(), Status::SeeOther);
    assert_eq!(resp.headers().get_one("Location"), Some("/results"));

    assert_eq!(vote_count(&mut conn), 1);
    assert_eq!(
        vote_records::table
            .count()
            .get_result::<i64>(&mut conn)
            .unwrap(),
        0
    );
    assert!(TallyRow::leaderboard(&mut conn).unwrap().is_empty());
}
