use rusqlite::Connection;

pub const SCHEMA_VERSION: i32 = 1;

/// Create all tables (drops existing tables first to ensure clean state)
pub fn create_tables(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        DROP TABLE IF EXISTS js_tracer_events;
        DROP TABLE IF EXISTS marker_fields;
        DROP TABLE IF EXISTS markers;
        DROP TABLE IF EXISTS js_allocations;
        DROP TABLE IF EXISTS native_allocations;
        DROP TABLE IF EXISTS samples;
        DROP TABLE IF EXISTS stacks;
        DROP TABLE IF EXISTS frames;
        DROP TABLE IF EXISTS funcs;
        DROP TABLE IF EXISTS resources;
        DROP TABLE IF EXISTS strings;
        DROP TABLE IF EXISTS threads;
        DROP TABLE IF EXISTS pages;
        DROP TABLE IF EXISTS marker_schemas;
        DROP TABLE IF EXISTS categories;
        DROP TABLE IF EXISTS meta;

        -- Metadata table
        CREATE TABLE meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE categories (
            idx INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            color TEXT NOT NULL
        );

        -- Searchable field keys joined by ','
        CREATE TABLE marker_schemas (
            name TEXT PRIMARY KEY,
            searchable TEXT NOT NULL
        );

        CREATE TABLE pages (
            idx INTEGER PRIMARY KEY,
            tab_id INTEGER NOT NULL,
            inner_window_id INTEGER NOT NULL,
            url TEXT NOT NULL
        );

        -- One row per thread; has_* columns tell absent columns/tables apart
        -- from empty ones
        CREATE TABLE threads (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            process_name TEXT,
            process_type TEXT NOT NULL,
            pid INTEGER NOT NULL,
            tid INTEGER,
            is_main_thread INTEGER NOT NULL,
            register_time REAL NOT NULL,
            unregister_time REAL,
            weight_type TEXT NOT NULL,
            has_weight INTEGER NOT NULL,
            has_cpu_delta INTEGER NOT NULL,
            has_event_delay INTEGER NOT NULL,
            has_native_allocations INTEGER NOT NULL,
            native_balanced INTEGER NOT NULL,
            has_js_allocations INTEGER NOT NULL,
            has_js_tracer INTEGER NOT NULL
        );

        CREATE TABLE strings (
            thread_id INTEGER NOT NULL,
            idx INTEGER NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY (thread_id, idx),
            FOREIGN KEY (thread_id) REFERENCES threads(id)
        );

        CREATE TABLE resources (
            thread_id INTEGER NOT NULL,
            idx INTEGER NOT NULL,
            name INTEGER NOT NULL,
            PRIMARY KEY (thread_id, idx),
            FOREIGN KEY (thread_id) REFERENCES threads(id)
        );

        CREATE TABLE funcs (
            thread_id INTEGER NOT NULL,
            idx INTEGER NOT NULL,
            name INTEGER NOT NULL,
            is_js INTEGER NOT NULL,
            relevant_for_js INTEGER NOT NULL,
            resource INTEGER,
            file_name INTEGER,
            line INTEGER,
            PRIMARY KEY (thread_id, idx),
            FOREIGN KEY (thread_id) REFERENCES threads(id)
        );

        CREATE TABLE frames (
            thread_id INTEGER NOT NULL,
            idx INTEGER NOT NULL,
            func INTEGER NOT NULL,
            category INTEGER,
            line INTEGER,
            address INTEGER,
            inner_window_id INTEGER,
            PRIMARY KEY (thread_id, idx),
            FOREIGN KEY (thread_id) REFERENCES threads(id)
        );

        CREATE TABLE stacks (
            thread_id INTEGER NOT NULL,
            idx INTEGER NOT NULL,
            prefix INTEGER,
            frame INTEGER NOT NULL,
            category INTEGER NOT NULL,
            PRIMARY KEY (thread_id, idx),
            FOREIGN KEY (thread_id) REFERENCES threads(id)
        );

        CREATE TABLE samples (
            thread_id INTEGER NOT NULL,
            idx INTEGER NOT NULL,
            time REAL NOT NULL,
            stack INTEGER,
            weight REAL,
            cpu_delta REAL,
            event_delay REAL,
            PRIMARY KEY (thread_id, idx),
            FOREIGN KEY (thread_id) REFERENCES threads(id)
        );

        CREATE TABLE native_allocations (
            thread_id INTEGER NOT NULL,
            idx INTEGER NOT NULL,
            time REAL NOT NULL,
            stack INTEGER,
            weight REAL NOT NULL,
            memory_address INTEGER,
            PRIMARY KEY (thread_id, idx),
            FOREIGN KEY (thread_id) REFERENCES threads(id)
        );

        CREATE TABLE js_allocations (
            thread_id INTEGER NOT NULL,
            idx INTEGER NOT NULL,
            time REAL NOT NULL,
            stack INTEGER,
            weight REAL NOT NULL,
            class_name INTEGER NOT NULL,
            PRIMARY KEY (thread_id, idx),
            FOREIGN KEY (thread_id) REFERENCES threads(id)
        );

        CREATE TABLE markers (
            thread_id INTEGER NOT NULL,
            idx INTEGER NOT NULL,
            name INTEGER NOT NULL,
            start_time REAL NOT NULL,
            end_time REAL,
            category INTEGER NOT NULL,
            schema TEXT,
            PRIMARY KEY (thread_id, idx),
            FOREIGN KEY (thread_id) REFERENCES threads(id)
        );

        CREATE TABLE marker_fields (
            thread_id INTEGER NOT NULL,
            marker INTEGER NOT NULL,
            position INTEGER NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY (thread_id, marker, position),
            FOREIGN KEY (thread_id, marker) REFERENCES markers(thread_id, idx)
        );

        CREATE TABLE js_tracer_events (
            thread_id INTEGER NOT NULL,
            idx INTEGER NOT NULL,
            event INTEGER NOT NULL,
            timestamp REAL NOT NULL,
            duration REAL,
            line INTEGER,
            PRIMARY KEY (thread_id, idx),
            FOREIGN KEY (thread_id) REFERENCES threads(id)
        );
        "#,
    )
}

/// Set a metadata key
pub fn set_meta(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO meta (key, value) VALUES (?, ?)",
        [key, value],
    )?;
    Ok(())
}

/// Get a metadata key
pub fn get_meta(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row("SELECT value FROM meta WHERE key = ?", [key], |row| {
        row.get(0)
    })
    .optional()
}

pub(crate) trait OptionalExt<T> {
    fn optional(self) -> rusqlite::Result<Option<T>>;
}

impl<T> OptionalExt<T> for rusqlite::Result<T> {
    fn optional(self) -> rusqlite::Result<Option<T>> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
