use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::schema;

const VERSION_KEY: &str = "outbox_schema_version";
const CURRENT_VERSION: u32 = 2;

/// Brings the ledger schema up to [`CURRENT_VERSION`].
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS ledger_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        );
        "#,
    )
    .context("create ledger_meta table")?;

    let found = stored_version(conn)?;
    if found > CURRENT_VERSION {
        return Err(anyhow!(
            "outbox schema version {found} is newer than supported version {CURRENT_VERSION}"
        ));
    }

    if found < 1 {
        schema::create_schema(conn).context("create outbox table")?;
        record_version(conn, CURRENT_VERSION)?;
        return Ok(());
    }

    if found < 2 {
        drop_payload_column(conn).context("drop outbox payload column (schema v2)")?;
        record_version(conn, 2)?;
    }

    Ok(())
}

/// v1 ledgers stored the serialized decision in a `payload` column that was
/// never read back.
fn drop_payload_column(conn: &Connection) -> Result<()> {
    let has_payload: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM pragma_table_info('outbox') WHERE name = 'payload'",
        [],
        |row| row.get(0),
    )?;
    if has_payload {
        conn.execute_batch("ALTER TABLE outbox DROP COLUMN payload;")?;
    }
    Ok(())
}

fn stored_version(conn: &Connection) -> Result<u32> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM ledger_meta WHERE key = ?1",
            params![VERSION_KEY],
            |row| row.get(0),
        )
        .optional()
        .context("read outbox schema version")?;

    raw.map_or(Ok(0), |version| {
        version
            .parse::<u32>()
            .with_context(|| format!("invalid outbox schema version: {version}"))
    })
}

fn record_version(conn: &Connection, version: u32) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO ledger_meta (key, value) VALUES (?1, ?2)
        ON CONFLICT(key) DO UPDATE SET
            value = excluded.value,
            updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
        "#,
        params![VERSION_KEY, version.to_string()],
    )
    .with_context(|| format!("record outbox schema version {version}"))?;

    Ok(())
}
