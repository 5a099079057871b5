use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::models::{AudioMessageRow, UserRow};
use crate::{Database, DbError, Result};

const MESSAGE_COLUMNS: &str = "m.id, m.sender_id, s.username, m.receiver_id, r.username, m.file_path, m.file_name, m.timestamp";

impl Database {
    // -- Users --

    /// Insert a user and return the stored row. A taken username fails with
    /// [`DbError::Duplicate`]; the existing row is left untouched.
    pub fn create_user(&self, username: &str, password_hash: &str) -> Result<UserRow> {
        self.with_conn(|conn| {
            let created_at = format_timestamp(&Utc::now());
            conn.execute(
                "INSERT INTO users (username, password, created_at) VALUES (?1, ?2, ?3)",
                params![username, password_hash, created_at],
            )
            .map_err(|e| unique_violation(e, || format!("username '{}' is taken", username)))?;

            let id = conn.last_insert_rowid();
            Ok(UserRow {
                id,
                username: username.to_string(),
                password: password_hash.to_string(),
                created_at,
            })
        })
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, username, password, created_at FROM users WHERE id = ?1",
                    [id],
                    user_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, username, password, created_at FROM users WHERE username = ?1",
                    [username],
                    user_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn list_users(&self) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, username, password, created_at FROM users ORDER BY id")?;
            let rows = stmt
                .query_map([], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Audio messages --

    /// Record a sent clip and return its id.
    pub fn insert_audio_message(
        &self,
        sender_id: i64,
        receiver_id: i64,
        file_path: &str,
        file_name: &str,
        timestamp: &DateTime<Utc>,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO audio_messages (sender_id, receiver_id, file_path, file_name, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![sender_id, receiver_id, file_path, file_name, format_timestamp(timestamp)],
            )
            .map_err(|e| unique_violation(e, || format!("file path '{}' already recorded", file_path)))?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Messages sent by `sender_id` to `receiver_id`, in insertion order.
    /// Direction-specific: the reverse direction is a separate call.
    pub fn get_messages_from_to(&self, sender_id: i64, receiver_id: i64) -> Result<Vec<AudioMessageRow>> {
        self.with_conn(|conn| query_messages_from_to(conn, sender_id, receiver_id))
    }
}

fn query_messages_from_to(conn: &Connection, sender_id: i64, receiver_id: i64) -> Result<Vec<AudioMessageRow>> {
    // JOIN users to fetch both usernames in a single query
    let sql = format!(
        "SELECT {MESSAGE_COLUMNS}
         FROM audio_messages m
         JOIN users s ON m.sender_id = s.id
         JOIN users r ON m.receiver_id = r.id
         WHERE m.sender_id = ?1 AND m.receiver_id = ?2
         ORDER BY m.id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![sender_id, receiver_id], message_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        password: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<AudioMessageRow> {
    Ok(AudioMessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        sender_username: row.get(2)?,
        receiver_id: row.get(3)?,
        receiver_username: row.get(4)?,
        file_path: row.get(5)?,
        file_name: row.get(6)?,
        timestamp: row.get(7)?,
    })
}

/// RFC 3339 with nanoseconds, so clips sent within the same second still order.
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn unique_violation(err: rusqlite::Error, describe: impl FnOnce() -> String) -> DbError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            DbError::Duplicate(describe())
        }
        _ => err.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_with_users(names: &[&str]) -> (Database, Vec<i64>) {
        let db = Database::open_in_memory().unwrap();
        let ids = names
            .iter()
            .map(|name| db.create_user(name, "hash").unwrap().id)
            .collect();
        (db, ids)
    }

    #[test]
    fn create_user_assigns_increasing_ids() {
        let (db, ids) = db_with_users(&["alice", "bob"]);
        assert!(ids[1] > ids[0]);

        let alice = db.get_user_by_id(ids[0]).unwrap().unwrap();
        assert_eq!(alice.username, "alice");
        assert_eq!(alice.password, "hash");
        assert!(DateTime::parse_from_rfc3339(&alice.created_at).is_ok());
    }

    #[test]
    fn duplicate_username_is_rejected_without_overwrite() {
        let (db, ids) = db_with_users(&["alice"]);

        let err = db.create_user("alice", "other-hash").unwrap_err();
        assert!(matches!(err, DbError::Duplicate(_)));

        let stored = db.get_user_by_id(ids[0]).unwrap().unwrap();
        assert_eq!(stored.password, "hash");
        assert_eq!(db.list_users().unwrap().len(), 1);
    }

    #[test]
    fn missing_users_are_none() {
        let (db, _) = db_with_users(&["alice"]);
        assert!(db.get_user_by_id(999).unwrap().is_none());
        assert!(db.get_user_by_username("nobody").unwrap().is_none());
    }

    #[test]
    fn list_users_is_ordered_by_id() {
        let (db, ids) = db_with_users(&["carol", "alice", "bob"]);
        let listed: Vec<i64> = db.list_users().unwrap().into_iter().map(|u| u.id).collect();
        assert_eq!(listed, ids);
    }

    #[test]
    fn messages_are_direction_specific() {
        let (db, ids) = db_with_users(&["alice", "bob", "carol"]);
        let (a, b, c) = (ids[0], ids[1], ids[2]);
        let now = Utc::now();

        db.insert_audio_message(a, b, "k1.webm", "hello.webm", &now).unwrap();
        db.insert_audio_message(b, a, "k2.webm", "reply.webm", &now).unwrap();
        db.insert_audio_message(a, c, "k3.webm", "other.webm", &now).unwrap();
        db.insert_audio_message(a, b, "k4.webm", "again.webm", &now).unwrap();

        let a_to_b: Vec<String> = db
            .get_messages_from_to(a, b)
            .unwrap()
            .into_iter()
            .map(|m| m.file_path)
            .collect();
        assert_eq!(a_to_b, vec!["k1.webm", "k4.webm"]);

        let b_to_a = db.get_messages_from_to(b, a).unwrap();
        assert_eq!(b_to_a.len(), 1);
        assert_eq!(b_to_a[0].sender_username, "bob");
        assert_eq!(b_to_a[0].receiver_username, "alice");
        assert_eq!(b_to_a[0].file_name, "reply.webm");
    }

    #[test]
    fn file_path_is_unique() {
        let (db, ids) = db_with_users(&["alice", "bob"]);
        let now = Utc::now();

        db.insert_audio_message(ids[0], ids[1], "k1.wav", "a.wav", &now).unwrap();
        let err = db
            .insert_audio_message(ids[1], ids[0], "k1.wav", "b.wav", &now)
            .unwrap_err();
        assert!(matches!(err, DbError::Duplicate(_)));
    }

    #[test]
    fn message_for_unknown_user_violates_foreign_key() {
        let (db, ids) = db_with_users(&["alice"]);
        let err = db
            .insert_audio_message(ids[0], 42, "k1.wav", "a.wav", &Utc::now())
            .unwrap_err();
        assert!(matches!(err, DbError::Sqlite(_)));
    }

    #[test]
    fn timestamps_round_trip_with_nanoseconds() {
        let (db, ids) = db_with_users(&["alice", "bob"]);
        let sent_at = Utc::now();

        db.insert_audio_message(ids[0], ids[1], "k1.ogg", "note.ogg", &sent_at)
            .unwrap();
        let rows = db.get_messages_from_to(ids[0], ids[1]).unwrap();

        let parsed = DateTime::parse_from_rfc3339(&rows[0].timestamp).unwrap();
        assert_eq!(parsed.with_timezone(&Utc), sent_at);
    }
}
