//! Core SpendStore implementation

use rusqlite::{Connection, OptionalExtension, Statement, params};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::schema::{ColumnInfo, INTERNAL_TABLES, INVOICES_TABLE, SCHEMA_DDL, Schema};
use crate::table::{Table, Value};

/// Latest saved workflow state for a session thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub thread_id: String,
    pub version: u64,
    /// Serialized state (JSON)
    pub state: String,
    /// RFC 3339 timestamp of the last save
    pub updated_at: String,
}

/// SQLite-backed store of receipt line items
pub struct SpendStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SpendStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path)?;
        let mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!(?path, %mode, "Opened spend store");

        Ok(Self { conn, path: Some(path) })
    }

    /// Create an in-memory store (for tests and dry runs)
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        debug!("Opened in-memory spend store");
        Ok(Self { conn, path: None })
    }

    /// Path of the database file, if not in-memory
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Create tables and indexes if they do not exist
    pub fn initialize_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(SCHEMA_DDL)?;
        info!("Spend store schema initialized");
        Ok(())
    }

    /// Describe every user table: name to ordered `{name, type}` columns
    pub fn describe(&self) -> Result<Schema, StoreError> {
        let mut schema = Schema::new();
        for table in self.table_names()? {
            let mut stmt = self
                .conn
                .prepare(&format!("PRAGMA table_info(\"{}\")", table.replace('"', "\"\"")))?;
            let columns = stmt
                .query_map([], |row| Ok(ColumnInfo::new(row.get::<_, String>(1)?, row.get::<_, String>(2)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            schema.insert(table, columns);
        }
        debug!(tables = schema.tables().count(), "describe: done");
        Ok(schema)
    }

    fn table_names(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names
            .into_iter()
            .filter(|n| !INTERNAL_TABLES.contains(&n.as_str()))
            .collect())
    }

    /// Execute a single statement and return its rows
    ///
    /// Statements without result columns are executed for their side effect and
    /// return an empty table carrying the affected row count.
    pub fn execute(&self, sql: &str) -> Result<Table, StoreError> {
        let sql = sql.trim();
        if sql.is_empty() {
            return Err(StoreError::EmptyStatement);
        }
        debug!(sql_len = sql.len(), "execute: called");

        let mut stmt = self.conn.prepare(sql)?;
        if stmt.column_count() == 0 {
            let affected = stmt.execute([])?;
            debug!(affected, "execute: statement without result columns");
            return Ok(Table::affected(affected as u64));
        }
        read_rows(&mut stmt)
    }

    /// Run a single statement that only reads and yields rows
    ///
    /// Anything that would write, or that has no result columns, is rejected
    /// before it runs.
    pub fn query_readonly(&self, sql: &str) -> Result<Table, StoreError> {
        let sql = sql.trim();
        if sql.is_empty() {
            return Err(StoreError::EmptyStatement);
        }
        debug!(sql_len = sql.len(), "query_readonly: called");

        let mut stmt = self.conn.prepare(sql)?;
        if !stmt.readonly() || stmt.column_count() == 0 {
            debug!("query_readonly: rejected");
            return Err(StoreError::NotReadOnly(sql.to_string()));
        }
        read_rows(&mut stmt)
    }

    /// Execute one or more statements in a single transaction
    ///
    /// Either every statement commits or none does. Returns the number of rows
    /// changed by the last statement.
    pub fn execute_script(&mut self, sql: &str) -> Result<u64, StoreError> {
        let sql = sql.trim();
        if sql.is_empty() {
            return Err(StoreError::EmptyStatement);
        }
        debug!(sql_len = sql.len(), "execute_script: called");

        let tx = self.conn.transaction()?;
        tx.execute_batch(sql)?;
        let changed = tx.changes() as u64;
        tx.commit()?;

        info!(changed, "Script committed");
        Ok(changed)
    }

    /// All invoice rows, most recent first
    pub fn load_invoices(&self) -> Result<Table, StoreError> {
        self.execute(&format!("SELECT * FROM {} ORDER BY datetime DESC", INVOICES_TABLE))
    }

    /// CREATE statements plus a few sample rows for every user table
    pub fn table_info(&self, sample_rows: usize) -> Result<String, StoreError> {
        let mut out = String::new();
        for table in self.table_names()? {
            let ddl: Option<String> = self
                .conn
                .query_row(
                    "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    params![table],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(ddl) = ddl {
                out.push_str(ddl.trim());
                out.push_str("\n\n");
            }

            if sample_rows > 0 {
                let sample = self.execute(&format!(
                    "SELECT * FROM \"{}\" LIMIT {}",
                    table.replace('"', "\"\""),
                    sample_rows
                ))?;
                out.push_str(&format!(
                    "/*\n{} rows from {} table:\n{}\n*/\n\n",
                    sample.row_count(),
                    table,
                    sample
                ));
            }
        }
        Ok(out.trim_end().to_string())
    }

    /// Save (or replace) the latest state snapshot for a thread
    pub fn save_checkpoint(&self, thread_id: &str, version: u64, state: &str) -> Result<(), StoreError> {
        debug!(%thread_id, version, "save_checkpoint: called");
        self.conn.execute(
            "INSERT OR REPLACE INTO checkpoints (thread_id, version, state, updated_at) VALUES (?1, ?2, ?3, ?4)",
            params![thread_id, version as i64, state, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Load the latest state snapshot for a thread
    pub fn load_checkpoint(&self, thread_id: &str) -> Result<Option<Checkpoint>, StoreError> {
        debug!(%thread_id, "load_checkpoint: called");
        let checkpoint = self
            .conn
            .query_row(
                "SELECT thread_id, version, state, updated_at FROM checkpoints WHERE thread_id = ?1",
                params![thread_id],
                |row| {
                    Ok(Checkpoint {
                        thread_id: row.get(0)?,
                        version: row.get::<_, i64>(1)? as u64,
                        state: row.get(2)?,
                        updated_at: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(checkpoint)
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn read_rows(stmt: &mut Statement<'_>) -> Result<Table, StoreError> {
    let column_count = stmt.column_count();
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(column_count);
        for i in 0..column_count {
            values.push(Value::from(row.get_ref(i)?));
        }
        out.push(values);
    }

    debug!(rows = out.len(), "read_rows: done");
    Ok(Table::new(columns, out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE_INSERT: &str = "INSERT INTO invoices (invoice_id, supermarket_name, datetime, description, quantity, unit, unitary_value, total_value, product, full_product_name, volume, category) VALUES \
        ('35250447508411271427651040001883521912124444', 'SuperNova Alimentos', '2025-03-01', 'LTE ITALAC ZERO 1L', 3.00, 'Un', 5.89, 17.67, 'Leite', 'Leite Italac', '1L', 'Laticínios'), \
        ('35250447508411271427651040001883521912124444', 'SuperNova Alimentos', '2025-03-01', 'P QJ SIBERI 1kg TRAD', 1.00, 'PC', 14.10, 14.10, 'Pão de Queijo', 'Pão de Queijo Siberi', '1KG', 'Padaria e Confeitaria')";

    fn store() -> SpendStore {
        let store = SpendStore::open_in_memory().unwrap();
        store.initialize_schema().unwrap();
        store
    }

    #[test]
    fn test_describe_hides_internal_tables() {
        let schema = store().describe().unwrap();
        assert!(schema.columns("checkpoints").is_none());

        let cols = schema.columns("invoices").unwrap();
        assert_eq!(cols.len(), 12);
        assert_eq!(cols[0], ColumnInfo::new("invoice_id", "TEXT"));
        assert_eq!(cols[2], ColumnInfo::new("datetime", "DATE"));
        assert_eq!(cols[11].name, "category");
    }

    #[test]
    fn test_execute_script_then_query() {
        let mut store = store();
        let changed = store.execute_script(SAMPLE_INSERT).unwrap();
        assert_eq!(changed, 2);

        let table = store
            .execute("SELECT category, SUM(total_value) AS total FROM invoices GROUP BY category ORDER BY total DESC")
            .unwrap();
        assert_eq!(table.columns, vec!["category", "total"]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.rows[0][0], Value::Text("Laticínios".to_string()));
        assert_eq!(table.rows[0][1].as_f64(), Some(17.67));
    }

    #[test]
    fn test_execute_reports_raw_error() {
        let store = store();
        let err = store.execute("SELEC * FROM invoices").unwrap_err();
        assert!(err.to_string().contains("syntax error"));

        let err = store.execute("SELECT * FROM receipts").unwrap_err();
        assert!(err.to_string().contains("no such table"));
    }

    #[test]
    fn test_execute_empty_statement() {
        assert!(matches!(store().execute("   "), Err(StoreError::EmptyStatement)));
    }

    #[test]
    fn test_execute_statement_without_rows() {
        let store = store();
        let table = store.execute("DELETE FROM invoices").unwrap();
        assert_eq!(table.rows_affected, Some(0));
        assert!(table.columns.is_empty());
    }

    #[test]
    fn test_query_readonly_rejects_writes() {
        let mut store = store();
        store.execute_script(SAMPLE_INSERT).unwrap();

        for sql in [
            "DELETE FROM invoices",
            "UPDATE invoices SET total_value = 0",
            "DELETE FROM invoices RETURNING invoice_id",
            "DROP TABLE invoices",
        ] {
            assert!(
                matches!(store.query_readonly(sql), Err(StoreError::NotReadOnly(_))),
                "accepted: {}",
                sql
            );
        }

        let table = store.query_readonly("SELECT COUNT(*) AS n FROM invoices").unwrap();
        assert_eq!(table.columns, vec!["n"]);
        assert_eq!(table.rows[0][0], Value::Integer(2));
    }

    #[test]
    fn test_query_readonly_keeps_raw_errors() {
        let store = store();
        let err = store.query_readonly("SELECT nope FROM invoices").unwrap_err();
        assert!(err.to_string().contains("no such column"));
        assert!(matches!(store.query_readonly(" "), Err(StoreError::EmptyStatement)));
    }

    #[test]
    fn test_execute_script_rolls_back_on_error() {
        let mut store = store();
        let script = format!("{};\nINSERT INTO invoices (invoice_id) VALUES ('x');", SAMPLE_INSERT);
        assert!(store.execute_script(&script).is_err());

        let table = store.execute("SELECT COUNT(*) FROM invoices").unwrap();
        assert_eq!(table.rows[0][0], Value::Integer(0));
    }

    #[test]
    fn test_table_info_includes_ddl_and_samples() {
        let mut store = store();
        store.execute_script(SAMPLE_INSERT).unwrap();

        let info = store.table_info(1).unwrap();
        assert!(info.contains("CREATE TABLE invoices"));
        assert!(info.contains("1 rows from invoices table"));
        assert!(!info.contains("checkpoints"));
    }

    #[test]
    fn test_checkpoint_roundtrip() {
        let store = store();
        assert!(store.load_checkpoint("42").unwrap().is_none());

        store.save_checkpoint("42", 3, r#"{"user_query":"q"}"#).unwrap();
        store.save_checkpoint("42", 5, r#"{"user_query":"q2"}"#).unwrap();

        let cp = store.load_checkpoint("42").unwrap().unwrap();
        assert_eq!(cp.version, 5);
        assert_eq!(cp.state, r#"{"user_query":"q2"}"#);
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("spend.db");
        let store = SpendStore::open(&path).unwrap();
        store.initialize_schema().unwrap();
        assert!(path.exists());
        assert_eq!(store.path(), Some(path.as_path()));
    }
}
