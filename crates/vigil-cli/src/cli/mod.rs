//! CLI entry and dispatch.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use vigil_core::api::ApiClient;
use vigil_core::config::{Config, paths};
use vigil_core::session::SessionStore;
use vigil_core::session::token::TokenStore;

mod commands;

#[derive(Parser)]
#[command(name = "vigil")]
#[command(version)]
#[command(about = "Terminal client for the Vigil log-monitoring service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Server base URL (overrides config)
    #[arg(long, env = "VIGIL_SERVER_URL", global = true, value_name = "URL")]
    server: Option<String>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Sign in and persist the session credential
    Login {
        /// Username to sign in as
        #[arg(short, long)]
        username: String,

        /// Password (prompted when omitted)
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Sign out and purge the persisted credential
    Logout,

    /// Show who is signed in
    Status,

    /// Show the tenant's audit log feed
    Logs {
        /// Number of pages to fetch
        #[arg(long, default_value_t = 1)]
        pages: u32,
    },

    /// Manage tenant users
    Users {
        #[command(subcommand)]
        command: UserCommands,
    },

    /// Register a new account
    Register {
        #[arg(long)]
        username: String,

        /// Password (prompted when omitted)
        #[arg(long)]
        password: Option<String>,

        #[arg(long)]
        email: Option<String>,

        /// Role for the new account
        #[arg(long, default_value = "user")]
        role: String,

        /// Tenant the account belongs to
        #[arg(long)]
        tenant: String,
    },

    /// Manage the second authentication factor
    Mfa {
        #[command(subcommand)]
        command: MfaCommands,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum UserCommands {
    /// List the users of your tenant
    List,
}

#[derive(clap::Subcommand)]
enum MfaCommands {
    /// Enroll into time-based one-time codes
    Enable,
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // execution is cooperative and single-threaded; one runtime for everything
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("create tokio runtime")?;

    rt.block_on(async move { dispatch(cli).await })
}

/// Builds the session service and API client against the configured server,
/// restoring any persisted session.
fn connect(config: &Config) -> Result<(Arc<SessionStore>, Arc<ApiClient>)> {
    let session = Arc::new(SessionStore::new(
        config,
        TokenStore::new(paths::token_path()),
    )?);
    session.initialize();
    let api = Arc::new(ApiClient::new(config, Arc::clone(&session))?);
    Ok((session, api))
}

async fn dispatch(cli: Cli) -> Result<()> {
    let mut config = Config::load().context("load config")?;
    if let Some(server) = cli.server.as_deref() {
        let trimmed = server.trim();
        if !trimmed.is_empty() {
            config.server_url = trimmed.to_string();
        }
    }

    match cli.command {
        Commands::Login { username, password } => {
            let (session, _api) = connect(&config)?;
            commands::auth::login(&session, &username, password).await
        }

        Commands::Logout => {
            let (session, _api) = connect(&config)?;
            commands::auth::logout(&session)
        }

        Commands::Status => {
            let (session, _api) = connect(&config)?;
            commands::auth::status(&session)
        }

        Commands::Logs { pages } => {
            let (session, api) = connect(&config)?;
            commands::logs::run(&config, api, session, pages).await
        }

        Commands::Users { command } => match command {
            UserCommands::List => {
                let (session, api) = connect(&config)?;
                commands::users::list(&session, &api).await
            }
        },

        Commands::Register {
            username,
            password,
            email,
            role,
            tenant,
        } => {
            let (_session, api) = connect(&config)?;
            commands::users::register(&api, username, password, email, role, tenant).await
        }

        Commands::Mfa { command } => match command {
            MfaCommands::Enable => {
                let (session, api) = connect(&config)?;
                commands::users::enable_mfa(&session, &api).await
            }
        },

        Commands::Config { command } => match command {
            ConfigCommands::Path => commands::config::path(),
            ConfigCommands::Init => commands::config::init(),
        },
    }
}
