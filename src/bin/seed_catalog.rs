//! Catalog seeding script
//!
//! Run with: cargo run --bin seed-catalog -- --categories 10 --flowers 40
//!
//! Creates `Category {i}` and `Flower {i}` rows; flowers cycle through the
//! categories and are priced at `10.00 + i * 0.50`. Re-running updates the
//! existing rows instead of duplicating them.

use std::time::Duration as StdDuration;

use chrono::Utc;
use clap::Parser;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{
    sea_query::OnConflict, ActiveModelTrait, ColumnTrait, ConnectOptions, Database,
    DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use tracing::info;

use bloomhaven_api::entities::{category, flower};

const DEFAULT_STOCK: i32 = 100;

#[derive(Parser, Debug)]
#[command(name = "seed-catalog", about = "Populate the flower catalog with demo data")]
struct Cli {
    /// Number of categories to create
    #[arg(long, default_value_t = 50)]
    categories: u32,

    /// Number of flowers to create
    #[arg(long, default_value_t = 50)]
    flowers: u32,

    /// Database URL; falls back to DATABASE_URL
    #[arg(long)]
    database_url: Option<String>,

    /// Apply migrations before seeding
    #[arg(long)]
    migrate: bool,
}

fn flower_price(i: u32) -> Decimal {
    dec!(10.00) + Decimal::from(i) * dec!(0.50)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let cli = Cli::parse();
    let database_url = cli
        .database_url
        .clone()
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .unwrap_or_else(|| "sqlite://bloomhaven.db?mode=rwc".to_string());

    let mut options = ConnectOptions::new(database_url.clone());
    options
        .max_connections(5)
        .min_connections(1)
        .connect_timeout(StdDuration::from_secs(10))
        .acquire_timeout(StdDuration::from_secs(10));

    info!("Connecting to database: {}", database_url);
    let db = Database::connect(options).await?;

    if cli.migrate {
        bloomhaven_api::db::run_migrations(&db).await?;
    }

    let category_ids = seed_categories(&db, cli.categories).await?;
    info!("  Seeded {} categories", category_ids.len());

    let flowers = seed_flowers(&db, cli.flowers, &category_ids).await?;
    info!("  Seeded {} flowers", flowers);

    Ok(())
}

async fn seed_categories(db: &DatabaseConnection, count: u32) -> anyhow::Result<Vec<i32>> {
    let mut ids = Vec::with_capacity(count as usize);
    for i in 1..=count {
        let name = format!("Category {}", i);
        let row = category::ActiveModel {
            name: Set(name.clone()),
            description: Set(format!("Seeded category number {}", i)),
            ..Default::default()
        };
        category::Entity::insert(row)
            .on_conflict(
                OnConflict::column(category::Column::Name)
                    .update_column(category::Column::Description)
                    .to_owned(),
            )
            .exec_without_returning(db)
            .await?;

        let stored = category::Entity::find()
            .filter(category::Column::Name.eq(name.as_str()))
            .one(db)
            .await?
            .ok_or_else(|| anyhow::anyhow!("category {} missing after upsert", name))?;
        ids.push(stored.id);
    }
    Ok(ids)
}

async fn seed_flowers(
    db: &DatabaseConnection,
    count: u32,
    category_ids: &[i32],
) -> anyhow::Result<u32> {
    for i in 1..=count {
        let name = format!("Flower {}", i);
        let category_id = if category_ids.is_empty() {
            None
        } else {
            Some(category_ids[(i as usize - 1) % category_ids.len()])
        };

        let existing = flower::Entity::find()
            .filter(flower::Column::Name.eq(name.as_str()))
            .one(db)
            .await?;

        match existing {
            Some(model) => {
                let mut active: flower::ActiveModel = model.into();
                active.price = Set(flower_price(i));
                active.category_id = Set(category_id);
                active.update(db).await?;
            }
            None => {
                flower::ActiveModel {
                    name: Set(name),
                    description: Set(format!("Seeded flower number {}", i)),
                    price: Set(flower_price(i)),
                    stock: Set(DEFAULT_STOCK),
                    category_id: Set(category_id),
                    created_at: Set(Utc::now()),
                    ..Default::default()
                }
                .insert(db)
                .await?;
            }
        }
    }
    Ok(count)
}
