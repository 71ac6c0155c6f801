//! Marketplace CLI - Drives the client library against a live backend.
//!
//! # Usage
//!
//! ```bash
//! # Sign in and show who you are and which roles you hold
//! MARKETPLACE_PASSWORD=... mp-cli sign-in -e shopper@example.com
//!
//! # Create an account
//! mp-cli sign-up -e shopper@example.com -n "Sam Shopper" -p hunter2hunter2
//!
//! # Check a single role
//! mp-cli role -e vendor@example.com -r vendor
//!
//! # Browse the catalog
//! mp-cli catalog products --category 6f1c... --limit 10
//!
//! # Follow deployed builds until ctrl-c
//! mp-cli watch-updates
//! ```
//!
//! Passwords may be passed with `--password` or the `MARKETPLACE_PASSWORD`
//! environment variable.

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use marketplace_client::config::MarketplaceConfig;
use marketplace_core::{CategoryId, StoreId};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "mp-cli")]
#[command(author, version, about = "Marketplace client tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in, report the user and their roles, then sign out
    #[command(alias = "whoami")]
    SignIn {
        /// Account email address
        #[arg(short, long)]
        email: String,

        /// Account password (falls back to `MARKETPLACE_PASSWORD`)
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Create a new account
    SignUp {
        /// Account email address
        #[arg(short, long)]
        email: String,

        /// Display name stored on the profile
        #[arg(short = 'n', long)]
        full_name: String,

        /// Account password (falls back to `MARKETPLACE_PASSWORD`)
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Check whether an account holds a role
    Role {
        /// Account email address
        #[arg(short, long)]
        email: String,

        /// Account password (falls back to `MARKETPLACE_PASSWORD`)
        #[arg(short, long)]
        password: Option<String>,

        /// Role to check (`admin`, `vendor`, `customer`)
        #[arg(short, long)]
        role: String,
    },
    /// Browse active catalog listings
    Catalog {
        #[command(subcommand)]
        listing: CatalogListing,
    },
    /// Watch for new builds until interrupted
    WatchUpdates,
}

#[derive(Subcommand)]
enum CatalogListing {
    /// List active categories
    Categories,
    /// List active stores
    Stores,
    /// List active products
    Products {
        /// Only products from this store
        #[arg(long)]
        store: Option<StoreId>,

        /// Only products in this category
        #[arg(long)]
        category: Option<CategoryId>,

        /// Maximum number of products
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show a single product
    Product {
        /// Product id (numeric or slug)
        id: String,
    },
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &MarketplaceConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let config = MarketplaceConfig::from_env();

    // Sentry before the subscriber so the layer has a client
    let _sentry_guard = config.as_ref().ok().and_then(init_sentry);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "marketplace_client=info,marketplace_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let cli = Cli::parse();

    let result = match config {
        Ok(config) => run(cli, config).await,
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: MarketplaceConfig) -> Result<(), Box<dyn std::error::Error>> {
    let app = commands::App::new(config);

    match cli.command {
        Commands::SignIn { email, password } => {
            let password = commands::password(password)?;
            commands::auth::sign_in(&app, &email, &password).await?;
        }
        Commands::SignUp {
            email,
            full_name,
            password,
        } => {
            let password = commands::password(password)?;
            commands::auth::sign_up(&app, &email, &password, &full_name).await?;
        }
        Commands::Role {
            email,
            password,
            role,
        } => {
            let password = commands::password(password)?;
            commands::auth::check_role(&app, &email, &password, &role).await?;
        }
        Commands::Catalog { listing } => match listing {
            CatalogListing::Categories => commands::catalog::categories(&app).await?,
            CatalogListing::Stores => commands::catalog::stores(&app).await?,
            CatalogListing::Products {
                store,
                category,
                limit,
            } => commands::catalog::products(&app, store, category, limit).await?,
            CatalogListing::Product { id } => commands::catalog::product(&app, &id).await?,
        },
        Commands::WatchUpdates => commands::updates::watch(&app).await?,
    }
    Ok(())
}
