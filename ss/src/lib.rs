//! SpendStore - relational store for supermarket receipt line items
//!
//! Owns a SQLite database with one `invoices` row per purchased item and
//! exposes the operations the agent layer needs from a relational store:
//! schema introspection, statement execution with tabular results, and
//! transactional script execution for receipt inserts.
//!
//! # Layout
//!
//! ```text
//! spend.db
//! ├── invoices      # one row per receipt line item
//! └── checkpoints   # latest workflow state snapshot per session thread
//! ```
//!
//! # Example
//!
//! ```ignore
//! use spendstore::SpendStore;
//!
//! let mut store = SpendStore::open("spend.db")?;
//! store.initialize_schema()?;
//! let schema = store.describe()?;
//! let table = store.execute("SELECT category, SUM(total_value) FROM invoices GROUP BY category")?;
//! println!("{}", table);
//! ```

pub mod cart;
pub mod cli;
pub mod config;
mod error;
mod schema;
mod store;
mod table;

pub use cart::{CartItem, CartQuote, CheapestLine, PricePoint, SupermarketTotal};
pub use error::StoreError;
pub use schema::{ColumnInfo, INVOICES_TABLE, Schema};
pub use store::{Checkpoint, SpendStore};
pub use table::{Table, Value};

use std::path::PathBuf;

/// Default database file name
pub const DEFAULT_DB_FILE: &str = "spend.db";

/// Default location of the spend database (`~/.local/share/marketagent/spend.db` on Linux)
pub fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("marketagent")
        .join(DEFAULT_DB_FILE)
}
