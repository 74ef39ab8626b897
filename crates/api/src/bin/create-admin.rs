//! Admin account bootstrap for Supportly
//!
//! Self-service registration only creates customers, so the first admin is
//! created (or an existing account promoted) with this tool.
//!
//! Usage:
//!   cargo run --bin create-admin -- admin@example.com "Ada Admin"
//!
//! The password is read from stdin so it does not show in the process list.
//! Only `DATABASE_URL` is required.

use std::env;
use std::io::{self, Write};

use anyhow::{bail, Context};
use supportly_api::auth::{hash_password, validate_password_strength};
use supportly_shared::{create_pool, run_migrations, store, Role};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let mut args = env::args().skip(1);
    let (Some(email), Some(name)) = (args.next(), args.next()) else {
        bail!("usage: create-admin <email> <name>");
    };
    let email = email.trim().to_lowercase();
    let name = name.trim().to_string();

    let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let pool = create_pool(&database_url, 1).await?;
    run_migrations(&pool).await?;

    if let Some(existing) = store::find_credentials(&pool, &email).await? {
        let user = store::set_user_role(&pool, existing.id, Role::Admin, None).await?;
        println!("Promoted {} ({}) to admin", user.email, user.id);
        return Ok(());
    }

    print!("Password for {email}: ");
    io::stdout().flush()?;
    let mut password = String::new();
    io::stdin().read_line(&mut password)?;
    let password = password.trim_end_matches(['\r', '\n']);

    validate_password_strength(password)?;
    let password_hash = hash_password(password)?;

    let user = store::insert_user(&pool, &email, &name, &password_hash, Role::Admin).await?;
    println!("Created admin {} ({})", user.email, user.id);

    Ok(())
}
