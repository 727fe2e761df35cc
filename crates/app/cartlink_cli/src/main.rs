//! Cartlink operator CLI.
//!
//! Connects to PostgreSQL, applies migrations, then runs one command against
//! the token lifecycle manager. Logs go to stderr; stdout carries JSON output.

// Import and re-export the `error` module
pub use self::error::{Error, Result};
mod error;

use std::sync::Arc;
use std::time::Duration;

use cartlink_core::commerce::client::HttpCommerceClient;
use cartlink_core::config::CommerceConfig;
use cartlink_core::models::link::ServiceBrandAppLink;
use cartlink_core::store::postgres::PgLinkStore;
use cartlink_core::store::secrets::TokenCipher;
use cartlink_core::token::TokenManager;
use clap::Parser;
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};

use cli::{Cli, Commands};

mod cli;
mod logging;
mod session;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    logging::init()?;

    let args = Cli::parse();

    if let Err(e) = run(args).await {
        error!("{}", e);
        std::process::exit(1);
    }
    Ok(())
}

async fn run(args: Cli) -> Result<()> {
    info!(max_connections = args.max_connections, "configuring connection pool");
    let pool = PgPoolOptions::new()
        .max_connections(args.max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&args.database_url)
        .await?;

    let mut store = PgLinkStore::new(pool);

    info!("running database migrations");
    store.migrate().await?;

    if args.command == Commands::Migrate {
        println!("{}", json!({ "migrated": true }));
        return Ok(());
    }

    let config = Arc::new(CommerceConfig::from_env()?);
    info!(?config, "commerce configuration loaded");

    let commerce = Arc::new(HttpCommerceClient::from_config(&config)?);
    if let Some(key) = args.encryption_key.as_deref() {
        store = store.with_cipher(TokenCipher::new(key));
    } else {
        info!("TOKEN_ENCRYPTION_KEY not set, refresh tokens are stored in plaintext");
    }
    let manager = TokenManager::new(config, commerce, Arc::new(store));

    match args.command {
        Commands::Migrate => {}
        Commands::Token(user) => {
            let grant = manager.acquire(&user.user_id, &user.email).await?;
            println!("{}", session::grant_json(&grant));
        }
        Commands::SignIn(user) => {
            let grant = manager.sign_in(&user.session()).await?;
            println!("{}", session::grant_json(&grant));
        }
        Commands::Profile {
            user,
            first_name,
            last_name,
            phone,
        } => {
            let update = cli::profile_update(first_name, last_name, phone);
            let profile = manager.update_profile(&user.session(), &update).await?;
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }
        Commands::Link { user_id } => match manager.stored_link(&user_id).await? {
            Some(link) => println!("{}", serde_json::to_string_pretty(&link_json(&link))?),
            None => return Err(Error::Custom(format!("No stored link for user {user_id}"))),
        },
        Commands::Session => session::run(&manager).await?,
    }

    Ok(())
}

fn link_json(link: &ServiceBrandAppLink) -> serde_json::Value {
    json!({
        "id": link.id,
        "profileId": link.profile_id,
        "serviceId": link.service_id,
        "brandId": link.brand_id,
        "appId": link.app_id,
        "externalCustomerId": link.external_customer_id,
        "hasRefreshToken": link.refresh_token.is_some(),
        "metadata": link.metadata,
        "createdAt": link.created_at.to_rfc3339(),
        "updatedAt": link.updated_at.to_rfc3339(),
    })
}
