use crate::models::{now_ts, MessageRow, ProfileRow, TypingRow};
use crate::Database;
use anyhow::Result;
use rusqlite::Connection;
use uuid::Uuid;

/// Fields for a message insert. The id and timestamps are assigned by the
/// caller so the stored row, the HTTP response, and the broadcast event all
/// carry identical values.
pub struct NewMessage<'a> {
    pub id: &'a str,
    pub profile_id: &'a str,
    pub kind: &'a str,
    pub content: Option<&'a str>,
    pub voice_url: Option<&'a str>,
    pub voice_duration_secs: Option<f64>,
    pub reply_to: Option<&'a str>,
    pub created_at: &'a str,
}

impl Database {
    // -- Profiles --

    /// Look up a profile by external farmer id, creating it with a default
    /// display name if absent. Returns the row and whether it was created.
    pub fn ensure_profile(&self, farmer_id: &str) -> Result<(ProfileRow, bool)> {
        self.with_conn(|conn| {
            if let Some(row) = query_profile_by_farmer_id(conn, farmer_id)? {
                return Ok((row, false));
            }

            let id = Uuid::new_v4().to_string();
            let ts = now_ts();
            conn.execute(
                "INSERT INTO farmer_profiles (id, farmer_id, display_name, online, last_seen, created_at)
                 VALUES (?1, ?2, ?3, 0, ?4, ?4)",
                rusqlite::params![id, farmer_id, format!("Farmer {farmer_id}"), ts],
            )?;

            let row = query_profile_by_farmer_id(conn, farmer_id)?
                .ok_or_else(|| anyhow::anyhow!("profile vanished after insert: {farmer_id}"))?;
            Ok((row, true))
        })
    }

    pub fn get_profile(&self, id: &str) -> Result<Option<ProfileRow>> {
        self.with_conn(|conn| query_profile(conn, "id", id))
    }

    pub fn get_profile_by_farmer_id(&self, farmer_id: &str) -> Result<Option<ProfileRow>> {
        self.with_conn(|conn| query_profile_by_farmer_id(conn, farmer_id))
    }

    /// Set the online flag and refresh last_seen. Returns the updated row,
    /// or None if the profile does not exist.
    pub fn set_presence(&self, profile_id: &str, online: bool, ts: &str) -> Result<Option<ProfileRow>> {
        self.with_conn(|conn| {
            let affected = conn.execute(
                "UPDATE farmer_profiles SET online = ?2, last_seen = ?3 WHERE id = ?1",
                rusqlite::params![profile_id, online, ts],
            )?;
            if affected == 0 {
                return Ok(None);
            }
            query_profile(conn, "id", profile_id)
        })
    }

    /// All online profiles, most-recently-seen first.
    pub fn online_profiles(&self) -> Result<Vec<ProfileRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, farmer_id, display_name, avatar_url, online, last_seen, created_at
                 FROM farmer_profiles
                 WHERE online = 1
                 ORDER BY last_seen DESC",
            )?;
            let rows = stmt
                .query_map([], map_profile_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Messages --

    pub fn insert_message(&self, msg: &NewMessage<'_>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO farmer_community_messages
                     (id, profile_id, kind, content, voice_url, voice_duration_secs, reply_to, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                rusqlite::params![
                    msg.id,
                    msg.profile_id,
                    msg.kind,
                    msg.content,
                    msg.voice_url,
                    msg.voice_duration_secs,
                    msg.reply_to,
                    msg.created_at,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{MESSAGE_SELECT} WHERE m.id = ?1"))?;
            let row = stmt.query_row([id], map_message_row).optional()?;
            Ok(row)
        })
    }

    /// One page of messages, newest first. Offset pagination over a
    /// descending query; callers reverse the page for display order.
    pub fn get_messages(&self, limit: u32, offset: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{MESSAGE_SELECT} ORDER BY m.created_at DESC, m.rowid DESC LIMIT ?1 OFFSET ?2"
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![limit, offset], map_message_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Edit a message's text. The ownership check lives in the predicate:
    /// a non-owner (or a missing id) affects zero rows, indistinguishably.
    pub fn edit_message(&self, id: &str, profile_id: &str, content: &str, ts: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let affected = conn.execute(
                "UPDATE farmer_community_messages
                 SET content = ?3, edited = 1, updated_at = ?4
                 WHERE id = ?1 AND profile_id = ?2",
                rusqlite::params![id, profile_id, content, ts],
            )?;
            Ok(affected)
        })
    }

    pub fn delete_message(&self, id: &str, profile_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let affected = conn.execute(
                "DELETE FROM farmer_community_messages WHERE id = ?1 AND profile_id = ?2",
                rusqlite::params![id, profile_id],
            )?;
            Ok(affected)
        })
    }

    // -- Typing indicators --

    /// One row per profile, overwritten each time.
    pub fn upsert_typing(&self, profile_id: &str, typing: bool, ts: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO farmer_typing_indicators (profile_id, typing, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(profile_id) DO UPDATE SET typing = ?2, updated_at = ?3",
                rusqlite::params![profile_id, typing, ts],
            )?;
            Ok(())
        })
    }

    pub fn get_typing(&self, profile_id: &str) -> Result<Option<TypingRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{TYPING_SELECT} WHERE t.profile_id = ?1"))?;
            let row = stmt.query_row([profile_id], map_typing_row).optional()?;
            Ok(row)
        })
    }

    /// Clear typing rows last touched before `cutoff`. Returns the rows that
    /// were cleared so the hub can broadcast the change. A client whose
    /// clearing write was lost cannot wedge the indicator on.
    pub fn sweep_stale_typing(&self, cutoff: &str, ts: &str) -> Result<Vec<TypingRow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("{TYPING_SELECT} WHERE t.typing = 1 AND t.updated_at < ?1"))?;
            let stale = stmt
                .query_map([cutoff], map_typing_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            for row in &stale {
                conn.execute(
                    "UPDATE farmer_typing_indicators SET typing = 0, updated_at = ?2 WHERE profile_id = ?1",
                    rusqlite::params![row.profile_id, ts],
                )?;
            }

            // Return the rows as cleared, not as found
            Ok(stale
                .into_iter()
                .map(|mut row| {
                    row.typing = false;
                    row.updated_at = ts.to_string();
                    row
                })
                .collect())
        })
    }
}

const MESSAGE_SELECT: &str = "SELECT m.id, m.profile_id, p.display_name, m.kind, m.content, m.voice_url, \
     m.voice_duration_secs, m.reply_to, m.edited, m.created_at, m.updated_at
     FROM farmer_community_messages m
     LEFT JOIN farmer_profiles p ON m.profile_id = p.id";

const TYPING_SELECT: &str = "SELECT t.profile_id, p.display_name, t.typing, t.updated_at
     FROM farmer_typing_indicators t
     LEFT JOIN farmer_profiles p ON t.profile_id = p.id";

fn query_profile(conn: &Connection, column: &str, value: &str) -> Result<Option<ProfileRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, farmer_id, display_name, avatar_url, online, last_seen, created_at
         FROM farmer_profiles WHERE {column} = ?1"
    ))?;
    let row = stmt.query_row([value], map_profile_row).optional()?;
    Ok(row)
}

fn query_profile_by_farmer_id(conn: &Connection, farmer_id: &str) -> Result<Option<ProfileRow>> {
    query_profile(conn, "farmer_id", farmer_id)
}

fn map_profile_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProfileRow> {
    Ok(ProfileRow {
        id: row.get(0)?,
        farmer_id: row.get(1)?,
        display_name: row.get(2)?,
        avatar_url: row.get(3)?,
        online: row.get(4)?,
        last_seen: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn map_message_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        profile_id: row.get(1)?,
        author_name: row.get::<_, Option<String>>(2)?.unwrap_or_else(|| "unknown".to_string()),
        kind: row.get(3)?,
        content: row.get(4)?,
        voice_url: row.get(5)?,
        voice_duration_secs: row.get(6)?,
        reply_to: row.get(7)?,
        edited: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn map_typing_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TypingRow> {
    Ok(TypingRow {
        profile_id: row.get(0)?,
        display_name: row.get::<_, Option<String>>(1)?.unwrap_or_else(|| "unknown".to_string()),
        typing: row.get(2)?,
        updated_at: row.get(3)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("croft-test.db")).unwrap();
        (dir, db)
    }

    fn ts(n: u32) -> String {
        format!("2026-08-06T10:00:{:02}.000000Z", n)
    }

    fn seed_message(db: &Database, profile_id: &str, content: &str, created_at: &str) -> String {
        let id = Uuid::new_v4().to_string();
        db.insert_message(&NewMessage {
            id: &id,
            profile_id,
            kind: "text",
            content: Some(content),
            voice_url: None,
            voice_duration_secs: None,
            reply_to: None,
            created_at,
        })
        .unwrap();
        id
    }

    #[test]
    fn ensure_profile_creates_with_default_name() {
        let (_dir, db) = test_db();

        let (row, created) = db.ensure_profile("F42").unwrap();
        assert!(created);
        assert_eq!(row.display_name, "Farmer F42");
        assert!(!row.online);

        let (again, created) = db.ensure_profile("F42").unwrap();
        assert!(!created);
        assert_eq!(again.id, row.id);
    }

    #[test]
    fn presence_updates_flag_and_last_seen_ordering() {
        let (_dir, db) = test_db();
        let (a, _) = db.ensure_profile("A").unwrap();
        let (b, _) = db.ensure_profile("B").unwrap();

        db.set_presence(&a.id, true, &ts(1)).unwrap().unwrap();
        db.set_presence(&b.id, true, &ts(2)).unwrap().unwrap();

        let online = db.online_profiles().unwrap();
        let ids: Vec<_> = online.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec![b.id.as_str(), a.id.as_str()]);

        db.set_presence(&b.id, false, &ts(3)).unwrap().unwrap();
        assert_eq!(db.online_profiles().unwrap().len(), 1);

        assert!(db.set_presence("no-such-id", true, &ts(4)).unwrap().is_none());
    }

    #[test]
    fn message_pages_are_newest_first_and_disjoint() {
        let (_dir, db) = test_db();
        let (p, _) = db.ensure_profile("F1").unwrap();

        let ids: Vec<String> =
            (1..=5).map(|n| seed_message(&db, &p.id, &format!("m{n}"), &ts(n))).collect();

        let page1 = db.get_messages(2, 0).unwrap();
        let page2 = db.get_messages(2, 2).unwrap();

        let got1: Vec<_> = page1.iter().map(|m| m.id.as_str()).collect();
        let got2: Vec<_> = page2.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(got1, vec![ids[4].as_str(), ids[3].as_str()]);
        assert_eq!(got2, vec![ids[2].as_str(), ids[1].as_str()]);
    }

    #[test]
    fn edit_and_delete_are_ownership_scoped() {
        let (_dir, db) = test_db();
        let (owner, _) = db.ensure_profile("owner").unwrap();
        let (other, _) = db.ensure_profile("other").unwrap();
        let id = seed_message(&db, &owner.id, "original", &ts(1));

        assert_eq!(db.edit_message(&id, &other.id, "hijacked", &ts(2)).unwrap(), 0);
        let row = db.get_message(&id).unwrap().unwrap();
        assert_eq!(row.content.as_deref(), Some("original"));
        assert!(!row.edited);

        assert_eq!(db.edit_message(&id, &owner.id, "fixed", &ts(3)).unwrap(), 1);
        let row = db.get_message(&id).unwrap().unwrap();
        assert_eq!(row.content.as_deref(), Some("fixed"));
        assert!(row.edited);

        assert_eq!(db.delete_message(&id, &other.id).unwrap(), 0);
        assert_eq!(db.delete_message(&id, &owner.id).unwrap(), 1);
        assert!(db.get_message(&id).unwrap().is_none());
    }

    #[test]
    fn typing_upsert_keeps_one_row_per_profile() {
        let (_dir, db) = test_db();
        let (p, _) = db.ensure_profile("F1").unwrap();

        db.upsert_typing(&p.id, true, &ts(1)).unwrap();
        db.upsert_typing(&p.id, true, &ts(2)).unwrap();
        db.upsert_typing(&p.id, false, &ts(3)).unwrap();

        let row = db.get_typing(&p.id).unwrap().unwrap();
        assert!(!row.typing);
        assert_eq!(row.updated_at, ts(3));

        let count: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM farmer_typing_indicators", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn sweep_clears_only_stale_rows() {
        let (_dir, db) = test_db();
        let (stale, _) = db.ensure_profile("stale").unwrap();
        let (fresh, _) = db.ensure_profile("fresh").unwrap();

        db.upsert_typing(&stale.id, true, &ts(1)).unwrap();
        db.upsert_typing(&fresh.id, true, &ts(10)).unwrap();

        let cleared = db.sweep_stale_typing(&ts(5), &ts(11)).unwrap();
        assert_eq!(cleared.len(), 1);
        assert_eq!(cleared[0].profile_id, stale.id);
        assert!(!cleared[0].typing);

        assert!(!db.get_typing(&stale.id).unwrap().unwrap().typing);
        assert!(db.get_typing(&fresh.id).unwrap().unwrap().typing);

        // A second sweep finds nothing
        assert!(db.sweep_stale_typing(&ts(5), &ts(12)).unwrap().is_empty());
    }
}
