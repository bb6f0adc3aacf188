use db::DbConn;
use diesel_migrations::{
    embed_migrations, EmbeddedMigrations, MigrationHarness,
};
use rocket::{
    fairing::AdHoc,
    figment::{
        util::map,
        value::{Map, Value},
    },
    Build, Rocket,
};
use trace_request::RequestIdFairing;

use results::TallyFeed;

pub mod fingerprint;
pub mod registration;
pub mod results;
pub mod util;
pub mod voting;

#[cfg(test)]
mod tests;

#[macro_use]
extern crate rocket;

pub const MIGRATIONS: EmbeddedMigrations =
    embed_migrations!("../../migrations");

pub fn make_rocket(
    database_url: &str,
    secret_key: Option<&str>,
) -> Rocket<Build> {
    let db: Map<_, Value> = map![
        "url" => database_url.into(),
        "pool_size" => 10.into(),
        "timeout" => 5.into(),
    ];

    let mut figment = rocket::Config::figment()
        .merge(("databases", map!["voting" => db]));

    if let Some(secret_key) = secret_key {
        figment = figment.merge(("secret_key", secret_key));
    }

    rocket::custom(figment)
        .attach(DbConn::fairing())
        .attach(AdHoc::try_on_ignite("migrations", |rocket| async move {
            let db_conn = DbConn::get_one(&rocket).await.unwrap();

            let ret: Result<(), Box<dyn std::error::Error + Send + Sync>> =
                db_conn
                    .run(move |conn| {
                        conn.run_pending_migrations(MIGRATIONS)?;
                        Ok(())
                    })
                    .await;

            match ret {
                Ok(_) => Ok(rocket),
                Err(_) => Err(rocket),
            }
        }))
        .manage(TallyFeed::new())
        .mount(
            "/",
            routes![
                voting::voting_page,
                voting::do_vote,
                results::results_page,
                results::tally_table_partial,
                results::tally_feed,
                registration::register_page,
                registration::do_register,
            ],
        )
        .register("/", catchers![not_found])
        .attach(RequestIdFairing)
}

#[catch(404)]
fn not_found() -> maud::Markup {
    ui::error_404()
}
