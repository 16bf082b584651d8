//! services/api/src/bin/smartcart.rs
//!
//! Command-line client for product comparisons. The working set is kept in a
//! local JSON file between runs; saved comparisons live in the database and
//! need a signed-in session.

use api_lib::{
    adapters::{ConsoleNotifier, DbAdapter, FileLocalStorage, SessionAuth},
    config::Config,
    error::ApiError,
};
use clap::{Parser, Subcommand};
use smartcart_core::comparison::ComparisonManager;
use smartcart_core::domain::{AuthEvent, CatalogProduct, ComparedProduct};
use smartcart_core::ports::{DatabaseService, LocalStorage, PortError};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const TOKEN_STORAGE_KEY: &str = "smartcart.access_token";

#[derive(Parser)]
#[command(name = "smartcart")]
#[command(about = "Compare products side by side and keep named comparisons")]
#[command(version)]
struct Cli {
    /// Access token of an existing session; overrides the stored one.
    #[arg(long, env = "SMARTCART_ACCESS_TOKEN")]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a catalog product to the comparison by ASIN
    Add { asin: String },
    /// Remove a product from the comparison by product id
    Remove { product_id: String },
    /// Show the products being compared
    List,
    /// Empty the comparison
    Clear,
    /// Save the current comparison under a name
    Save { name: String },
    /// List saved comparisons
    History,
    /// Replace the current comparison with a saved one
    Load { id: String },
    /// Delete a saved comparison
    Delete { id: String },
    /// Sign in with an access token
    Login { token: String },
    /// Sign out and forget the stored token
    Logout,
}

fn compared_from_catalog(row: CatalogProduct) -> ComparedProduct {
    ComparedProduct {
        id: row.id.to_string(),
        asin: row.asin,
        title: row.title,
        description: row.description,
        image_url: row.image_url,
        current_price: row.current_price,
        original_price: row.original_price,
        url: row.url,
        availability: row.availability,
        ..Default::default()
    }
}

fn print_products(products: &[ComparedProduct]) {
    if products.is_empty() {
        println!("No products in comparison");
        return;
    }
    for p in products {
        let price = p
            .current_price
            .map(|v| format!("{:.2}", v))
            .unwrap_or_else(|| "-".to_string());
        println!("{}  {}  {:>10}  {}", p.id, p.asin, price, p.title);
    }
}

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    let cli = Cli::parse();
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let db_pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&config.database_url)
        .await?;
    let db: Arc<dyn DatabaseService> = Arc::new(DbAdapter::new(db_pool));
    let storage = Arc::new(FileLocalStorage::open(config.local_storage_path.clone()));

    let token = match cli.token.or_else(|| config.access_token.clone()) {
        Some(token) => Some(token),
        None => storage.get_item(TOKEN_STORAGE_KEY)?,
    };
    let auth = Arc::new(SessionAuth::new(db.clone(), token));
    let manager = ComparisonManager::new(
        auth.clone(),
        db.clone(),
        storage.clone(),
        Arc::new(ConsoleNotifier),
    );

    match cli.command {
        Commands::Add { asin } => {
            let row = db
                .find_product_by_asin(&asin.to_ascii_uppercase())
                .await?
                .ok_or_else(|| PortError::NotFound(format!("No saved product with ASIN {}", asin)))?;
            // Already reported to the user.
            let _ = manager.add_to_compare(compared_from_catalog(row)).await;
        }
        Commands::Remove { product_id } => {
            if !manager.remove_from_compare(&product_id) {
                println!("Product {} is not in the comparison", product_id);
            }
        }
        Commands::List => print_products(&manager.compared_products()),
        Commands::Clear => manager.clear_compare(),
        Commands::Save { name } => {
            if let Ok(id) = manager.save_comparison(&name).await {
                println!("{}", id);
            }
        }
        Commands::History => {
            if manager.load_comparison_history().await.is_ok() {
                for h in manager.comparison_history() {
                    println!(
                        "{}  {}  {} products  {}",
                        h.id,
                        h.created_at.format("%Y-%m-%d %H:%M"),
                        h.products.len(),
                        h.name
                    );
                }
            }
        }
        Commands::Load { id } => {
            if manager.load_comparison_by_id(&id).await.is_ok() {
                print_products(&manager.compared_products());
            }
        }
        Commands::Delete { id } => {
            if manager.load_comparison_history().await.is_ok() {
                let _ = manager.delete_comparison_history(&id).await;
            }
        }
        Commands::Login { token } => {
            let user = auth.sign_in(&token).await?;
            storage.set_item(TOKEN_STORAGE_KEY, &token)?;
            info!(user_id = %user.user_id, "Stored access token");
            let _ = manager.handle_auth_event(&AuthEvent::SignedIn(user)).await;
            println!(
                "Signed in, {} saved comparisons",
                manager.comparison_history().len()
            );
        }
        Commands::Logout => {
            auth.sign_out();
            storage.remove_item(TOKEN_STORAGE_KEY)?;
            let _ = manager.handle_auth_event(&AuthEvent::SignedOut).await;
            println!("Signed out");
        }
    }

    Ok(())
}
