use anyhow::Result;
use rusqlite::Connection;

pub fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS outbox (
            id TEXT PRIMARY KEY,
            message_id TEXT NOT NULL,
            thread_id TEXT,
            label TEXT NOT NULL CHECK(label IN ('good', 'bad')),
            subject TEXT,
            sender TEXT,
            status TEXT NOT NULL CHECK(status IN ('dispatched', 'persisted', 'failed')),
            error TEXT,
            dispatched_at TEXT NOT NULL,
            completed_at TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_outbox_message_id ON outbox(message_id);
        CREATE INDEX IF NOT EXISTS idx_outbox_dispatched_at ON outbox(dispatched_at);
        CREATE INDEX IF NOT EXISTS idx_outbox_status ON outbox(status);
        "#,
    )?;

    Ok(())
}
