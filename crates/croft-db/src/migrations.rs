use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS farmer_profiles (
            id              TEXT PRIMARY KEY,
            farmer_id       TEXT NOT NULL UNIQUE,
            display_name    TEXT NOT NULL,
            avatar_url      TEXT,
            online          INTEGER NOT NULL DEFAULT 0,
            last_seen       TEXT NOT NULL DEFAULT (datetime('now')),
            created_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_profiles_online
            ON farmer_profiles(online, last_seen);

        CREATE TABLE IF NOT EXISTS farmer_community_messages (
            id                  TEXT PRIMARY KEY,
            profile_id          TEXT NOT NULL REFERENCES farmer_profiles(id),
            kind                TEXT NOT NULL CHECK (kind IN ('text', 'voice', 'system')),
            content             TEXT,
            voice_url           TEXT,
            voice_duration_secs REAL,
            reply_to            TEXT REFERENCES farmer_community_messages(id),
            edited              INTEGER NOT NULL DEFAULT 0,
            created_at          TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at          TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_messages_created
            ON farmer_community_messages(created_at);

        CREATE TABLE IF NOT EXISTS farmer_typing_indicators (
            profile_id  TEXT PRIMARY KEY REFERENCES farmer_profiles(id),
            typing      INTEGER NOT NULL DEFAULT 0,
            updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
