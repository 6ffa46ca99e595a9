use rusqlite::Connection;

pub fn run_migrations(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS docvec_collections (
            name TEXT PRIMARY KEY,
            schema TEXT NOT NULL,
            metric TEXT,
            index_type TEXT,
            index_params TEXT,
            loaded INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS docvec_partitions (
            collection TEXT NOT NULL,
            name TEXT NOT NULL,
            PRIMARY KEY (collection, name)
        );
        ",
    )
    .map_err(|e| format!("Migration failed: {e}"))?;
    Ok(())
}

/// Data table backing one collection. `name` must already be validated.
pub fn data_table(collection: &str) -> String {
    format!("docvec_data_{collection}")
}

pub fn create_data_table(conn: &Connection, collection: &str) -> Result<(), String> {
    let table = data_table(collection);
    conn.execute_batch(&format!(
        "
        CREATE TABLE {table} (
            pk INTEGER PRIMARY KEY AUTOINCREMENT,
            doc_id TEXT UNIQUE,
            partition TEXT NOT NULL,
            vector BLOB NOT NULL,
            content TEXT NOT NULL,
            metadata TEXT NOT NULL
        );
        CREATE INDEX idx_{table}_partition ON {table}(partition);
        "
    ))
    .map_err(|e| format!("Failed to create data table for {collection}: {e}"))
}
