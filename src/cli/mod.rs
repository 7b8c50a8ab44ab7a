use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::api::{self, AppState};
use crate::auth::{generate_jwt, Claims};
use crate::config::{config, StoreBackend};
use crate::database::DatabaseManager;
use crate::types::{Role, RoleSet};

#[derive(Parser)]
#[command(name = "bridge-server")]
#[command(about = "Bridge study management API")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the HTTP server (default)")]
    Serve {
        #[arg(long, help = "Port to listen on (default: BRIDGE_PORT, PORT, or config)")]
        port: Option<u16>,
        #[arg(long, value_enum, help = "Persistence backend (default: BRIDGE_STORE or config)")]
        store: Option<StoreBackend>,
    },

    #[command(about = "Mint a session token for local tooling")]
    Token {
        #[arg(long, help = "Study the session is bound to")]
        study: String,
        #[arg(long, default_value = "local-user", help = "Account id placed in the token")]
        user: String,
        #[arg(long, value_delimiter = ',', help = "Comma-separated roles, e.g. developer,researcher")]
        roles: Vec<Role>,
    },
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command.unwrap_or(Commands::Serve { port: None, store: None }) {
        Commands::Serve { port, store } => serve(port, store).await,
        Commands::Token { study, user, roles } => {
            let claims = Claims::new(user, study, RoleSet::of(&roles));
            println!("{}", generate_jwt(&claims)?);
            Ok(())
        }
    }
}

async fn serve(port: Option<u16>, store: Option<StoreBackend>) -> anyhow::Result<()> {
    let config = config();
    info!("Starting Bridge server in {:?} mode", config.environment);
    if crate::is_production!() && config.security.jwt_secret.is_empty() {
        anyhow::bail!("JWT_SECRET must be set in production");
    }

    let mut database = config.database.clone();
    if let Some(store) = store {
        database.backend = store;
    }

    let state = match database.backend {
        StoreBackend::Memory => {
            if !crate::is_development!() {
                warn!("Running with the in-memory store; nothing will survive a restart");
            }
            AppState::memory()
        }
        StoreBackend::Postgres => {
            let pool = DatabaseManager::connect(&database).await?;
            if database.apply_schema_on_start {
                DatabaseManager::apply_schema(&pool).await?;
            }
            AppState::postgres(pool)
        }
    };
    state.studies.bootstrap(&config.bootstrap.studies).await?;

    let port = port.unwrap_or(config.api.port);
    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Bridge server listening on http://{} ({:?} store)", bind_addr, database.backend);

    axum::serve(listener, api::app(state)).await?;
    Ok(())
}
