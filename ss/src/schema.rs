//! Schema description and DDL

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Name of the receipt line-item table
pub const INVOICES_TABLE: &str = "invoices";

/// Tables that belong to the store itself and are never described to callers
pub(crate) const INTERNAL_TABLES: &[&str] = &["checkpoints"];

pub(crate) const SCHEMA_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS invoices (
    invoice_id TEXT NOT NULL,
    supermarket_name TEXT NOT NULL,
    datetime DATE NOT NULL,
    description TEXT NOT NULL,
    quantity NUMERIC NOT NULL,
    unit VARCHAR(10) NOT NULL,
    unitary_value DECIMAL(10,2) NOT NULL,
    total_value DECIMAL(10,2) NOT NULL,
    product TEXT NOT NULL,
    full_product_name TEXT,
    volume VARCHAR(10),
    category TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_invoices_datetime ON invoices(datetime DESC);
CREATE INDEX IF NOT EXISTS idx_invoices_product ON invoices(full_product_name, supermarket_name);

CREATE TABLE IF NOT EXISTS checkpoints (
    thread_id TEXT PRIMARY KEY,
    version INTEGER NOT NULL,
    state TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

/// One column of a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, column_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: column_type.into(),
        }
    }
}

/// Table name to ordered column list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    tables: BTreeMap<String, Vec<ColumnInfo>>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a table description
    pub fn insert(&mut self, table: impl Into<String>, columns: Vec<ColumnInfo>) {
        self.tables.insert(table.into(), columns);
    }

    pub fn columns(&self, table: &str) -> Option<&[ColumnInfo]> {
        self.tables.get(table).map(Vec::as_slice)
    }

    pub fn tables(&self) -> impl Iterator<Item = (&str, &[ColumnInfo])> {
        self.tables.iter().map(|(name, cols)| (name.as_str(), cols.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (table, columns) in &self.tables {
            if !first {
                writeln!(f)?;
            }
            first = false;
            writeln!(f, "Table {}:", table)?;
            for col in columns {
                writeln!(f, "  - {} ({})", col.name, col.column_type)?;
            }
        }
        Ok(())
    }
}
