use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("gestiond.sqlite3");
    let conn = Connection::open(db_path)?;

    // Browser-local-storage equivalent: flat string values, no expiry.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS client_values(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

pub fn value_get(conn: &Connection, key: &str) -> anyhow::Result<Option<String>> {
    let value = conn
        .query_row(
            "SELECT value FROM client_values WHERE key = ?",
            [key],
            |r| r.get::<_, String>(0),
        )
        .optional()?;
    Ok(value)
}

pub fn value_set(conn: &Connection, key: &str, value: &str) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO client_values(key, value, updated_at) VALUES(?, ?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![key, value, chrono::Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

pub fn value_delete(conn: &Connection, key: &str) -> anyhow::Result<()> {
    conn.execute("DELETE FROM client_values WHERE key = ?", [key])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_workspace(prefix: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("{}-{}", prefix, uuid::Uuid::new_v4()))
    }

    #[test]
    fn values_round_trip_and_overwrite() {
        let ws = temp_workspace("gestiond-db");
        let conn = open_db(&ws).expect("open db");
        assert_eq!(value_get(&conn, "rolUsuario").expect("get"), None);

        value_set(&conn, "rolUsuario", "Profesor").expect("set");
        value_set(&conn, "rolUsuario", "Acudiente").expect("overwrite");
        assert_eq!(
            value_get(&conn, "rolUsuario").expect("get").as_deref(),
            Some("Acudiente")
        );

        value_delete(&conn, "rolUsuario").expect("delete");
        assert_eq!(value_get(&conn, "rolUsuario").expect("get"), None);
    }

    #[test]
    fn reopening_keeps_values() {
        let ws = temp_workspace("gestiond-db-reopen");
        {
            let conn = open_db(&ws).expect("open db");
            value_set(&conn, "nombreUsuario", "mperez").expect("set");
        }
        let conn = open_db(&ws).expect("reopen db");
        assert_eq!(
            value_get(&conn, "nombreUsuario").expect("get").as_deref(),
            Some("mperez")
        );
    }
}
