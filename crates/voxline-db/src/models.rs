//! Database row types, mapping directly to SQLite rows.
//! Distinct from the voxline-types wire models to keep the DB layer independent.

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    /// Credential hash (PHC string), never plaintext.
    pub password: String,
    pub created_at: String,
}

/// An `audio_messages` row joined with the sender and receiver usernames.
#[derive(Debug, Clone)]
pub struct AudioMessageRow {
    pub id: i64,
    pub sender_id: i64,
    pub sender_username: String,
    pub receiver_id: i64,
    pub receiver_username: String,
    pub file_path: String,
    pub file_name: String,
    pub timestamp: String,
}
