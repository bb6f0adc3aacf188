use tracing_subscriber::EnvFilter;
use votewall::make_rocket;

#[rocket::launch]
fn rocket() -> _ {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let database_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL environment variable must be set");
    let secret_key = std::env::var("SECRET_KEY")
        .expect("SECRET_KEY environment variable must be set");

    make_rocket(&database_url, Some(&secret_key))
}
