use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered account as exposed to clients.
///
/// The credential hash never leaves the storage layer, so it has no field here.
/// Sent and received messages are not carried either: they are looked up from
/// the message table by sender or receiver id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// The `{id, username}` pair embedded in a message for its sender and receiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: i64,
    pub username: String,
}

/// A stored audio clip sent from one user to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioMessage {
    pub id: i64,
    pub sender: UserRef,
    pub receiver: UserRef,
    /// Generated storage key of the blob in the file store.
    pub file_path: String,
    /// Name the client uploaded the clip under. Display only.
    pub file_name: String,
    pub timestamp: DateTime<Utc>,
}
