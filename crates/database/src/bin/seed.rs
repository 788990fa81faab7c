//! Create (or promote) a user and print a fresh session token for it.
//!
//! Reads `SEED_USER_EMAIL` (required), `SEED_USER_ADMIN` (`true`/`false`) and
//! `SEED_SESSION_HOURS` (default 720) besides the usual `DATABASE_*` variables.

use anyhow::{anyhow, Context, Result};
use database::Database;
use tracing::info;

const DEFAULT_SESSION_HOURS: i64 = 24 * 30;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .compact()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .init();

    let email = std::env::var("SEED_USER_EMAIL").context("SEED_USER_EMAIL not set")?;
    let is_admin = std::env::var("SEED_USER_ADMIN")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    let session_hours = match std::env::var("SEED_SESSION_HOURS") {
        Ok(v) => v
            .parse()
            .map_err(|_| anyhow!("SEED_SESSION_HOURS must be a number"))?,
        Err(_) => DEFAULT_SESSION_HOURS,
    };

    let db_config = config::DatabaseConfig::from_env()
        .map_err(|e| anyhow!("Failed to load database config: {e}"))?;
    let database = Database::from_config(&db_config)
        .await
        .context("Failed to connect to database")?;
    database
        .run_migrations()
        .await
        .context("Failed to run migrations")?;

    let user = database.users.upsert(&email, is_admin).await?;
    let token = database.sessions.create(user.id, session_hours).await?;
    info!(user_id = %user.id, is_admin, "Seeded user");

    println!("{}", token.0);
    Ok(())
}
