use anyhow::Context;
use chrono::Utc;
use dotenvy::dotenv;
use tracing::info;

use moderation_server::{config::Config, repositories::Repositories, seeder};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = Config::from_env().context("Failed to load configuration")?;
    info!(storage = %config.storage, "Starting seed");

    let repos = Repositories::connect(&config).await?;
    let admin = seeder::ensure_admin(repos.users.as_ref(), &config.seed_admin_username).await?;

    println!("Admin account: {}", admin.username);
    println!("Bearer token: {}", seeder::token_for(&config, &admin, Utc::now()));
    Ok(())
}
