use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;

use spendstore::SpendStore;
use spendstore::cli::{Cli, Command};
use spendstore::config::Config;

fn setup_logging() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Warn)
        .parse_default_env()
        .init();
    Ok(())
}

fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    let db_path = cli.db.unwrap_or(config.db_path);

    info!("spendstore starting with {}", db_path.display());

    let mut store = SpendStore::open(&db_path).with_context(|| format!("Failed to open {}", db_path.display()))?;
    store.initialize_schema()?;

    match cli.command {
        Command::Init => {
            println!("{} Initialized {}", "✓".green(), db_path.display().to_string().cyan());
        }
        Command::Schema => {
            let schema = store.describe()?;
            print!("{}", schema);
        }
        Command::Query { sql, markdown } => {
            let table = store.execute(&sql)?;
            if markdown {
                print!("{}", table.to_markdown());
            } else {
                println!("{}", table);
            }
        }
        Command::Exec { file } => {
            let sql = std::fs::read_to_string(&file).with_context(|| format!("Failed to read {}", file.display()))?;
            let changed = store.execute_script(&sql)?;
            println!("{} Committed ({} rows changed)", "✓".green(), changed);
        }
        Command::Cart { items, list } => {
            if list || items.is_empty() {
                let products = store.cart_products()?;
                if products.is_empty() {
                    println!("No products found");
                }
                for p in products {
                    println!("{}", p);
                }
                return Ok(());
            }

            let quote = store.price_cart(&items)?;
            println!("{}", "Total cost per supermarket".bold());
            for t in &quote.per_supermarket {
                let missing = if t.missing.is_empty() {
                    String::new()
                } else {
                    format!(" (missing: {})", t.missing.join(", ")).dimmed().to_string()
                };
                println!("  {:<30} {:>10.2}{}", t.supermarket, t.total, missing);
            }

            println!("\n{}", "Cheapest combination".bold());
            for line in &quote.cheapest {
                println!(
                    "  {:<30} {:>6} x {:>8.2} @ {} = {:.2}",
                    line.product, line.quantity, line.unitary_value, line.supermarket.yellow(), line.estimated_cost
                );
            }
            for p in &quote.unpriced {
                println!("  {:<30} {}", p, "no price history".red());
            }
            println!("{} Cheapest total: {:.2}", "✓".green(), quote.cheapest_total);
        }
    }

    Ok(())
}
