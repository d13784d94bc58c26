//! Basket CLI - cart and wishlist sync from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Pull the cart from the server
//! basket refresh cart
//!
//! # Add two medium shirts to the cart
//! basket add --product shirt-1 --quantity 2 --size M
//!
//! # Toggle a product on the wishlist
//! basket wish shirt-1
//!
//! # Forget everything cached locally
//! basket sign-out
//! ```
//!
//! Every command prints the resulting collection as JSON on stdout. Logs go
//! to stderr and are filtered with `RUST_LOG`.

#![cfg_attr(not(test), forbid(unsafe_code))]

use basket_client::{AppError, Config, FileCache, HttpCollectionService, Result};
use basket_engine::{line_key, CollectionItem, CollectionKind, CollectionView, SyncEngine, Variant};
use clap::{Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "basket")]
#[command(author, version, about = "Cart and wishlist sync client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the locally known state of a collection
    Show { collection: Collection },
    /// Replace a collection with the server's listing
    Refresh { collection: Collection },
    /// Add a line to the cart
    Add {
        /// Product identifier
        #[arg(short, long)]
        product: String,

        #[arg(long)]
        name: Option<String>,

        /// Unit price, e.g. 19.99
        #[arg(long)]
        price: Option<Decimal>,

        #[arg(long)]
        image: Option<String>,

        #[arg(long)]
        brand: Option<String>,

        #[arg(short, long, default_value_t = 1)]
        quantity: u32,

        #[arg(long)]
        size: Option<String>,

        #[arg(long)]
        color: Option<String>,
    },
    /// Toggle a product on the wishlist
    Wish { product: String },
    /// Set the quantity of a cart line
    Quantity {
        item: String,
        #[arg(allow_negative_numbers = true)]
        quantity: i64,
    },
    /// Remove an item from a collection
    Remove { collection: Collection, item: String },
    /// Empty a collection
    Clear { collection: Collection },
    /// Drop all local state
    SignOut,
}

#[derive(Clone, Copy, ValueEnum)]
enum Collection {
    Cart,
    Wishlist,
}

impl From<Collection> for CollectionKind {
    fn from(collection: Collection) -> Self {
        match collection {
            Collection::Cart => CollectionKind::Cart,
            Collection::Wishlist => CollectionKind::Wishlist,
        }
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "basket_client=info,basket_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::from_env()?;
    let service = HttpCollectionService::from_config(&config)?;
    let cache = FileCache::new(&config.cache_dir);
    let engine = SyncEngine::new(service, cache, config.engine_config());

    let views = match cli.command {
        Commands::Show { collection } => vec![engine.view(collection.into())],
        Commands::Refresh { collection } => {
            let collection = collection.into();
            engine.refresh(collection).await?;
            vec![engine.view(collection)]
        }
        Commands::Add {
            product,
            name,
            price,
            image,
            brand,
            quantity,
            size,
            color,
        } => {
            let variant = Variant::new(size, color).normalized();
            let mut item = CollectionItem::cart_line(
                line_key(&product, variant.as_ref()),
                product,
                quantity,
            );
            item.name = name;
            item.price = price;
            item.image = image;
            item.brand = brand;
            item.variant = variant;

            engine.add(CollectionKind::Cart, item).await?;
            vec![engine.view(CollectionKind::Cart)]
        }
        Commands::Wish { product } => {
            engine
                .toggle(CollectionKind::Wishlist, CollectionItem::wishlist_entry(product))
                .await?;
            vec![engine.view(CollectionKind::Wishlist)]
        }
        Commands::Quantity { item, quantity } => {
            engine
                .update_quantity(CollectionKind::Cart, &item, quantity)
                .await?;
            vec![engine.view(CollectionKind::Cart)]
        }
        Commands::Remove { collection, item } => {
            let collection = collection.into();
            engine.remove(collection, &item).await?;
            vec![engine.view(collection)]
        }
        Commands::Clear { collection } => {
            let collection = collection.into();
            engine.clear(collection).await?;
            vec![engine.view(collection)]
        }
        Commands::SignOut => {
            engine.sign_out();
            CollectionKind::ALL
                .into_iter()
                .map(|collection| engine.view(collection))
                .collect()
        }
    };

    print_views(&views)
}

fn print_views(views: &[CollectionView]) -> Result<()> {
    let output = match views {
        [view] => serde_json::to_string_pretty(view),
        views => serde_json::to_string_pretty(views),
    }
    .map_err(AppError::from)?;
    println!("{output}");
    Ok(())
}
