use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use voxline_db::Database;
use voxline_db::models::AudioMessageRow;
use voxline_store::{Blob, FileStore, StoreError};
use voxline_types::models::{AudioMessage, UserRef};

use crate::blocking;
use crate::error::AppError;
use crate::users::parse_timestamp;

/// Sending clips, assembling conversations and serving stored clips.
pub struct MessageService {
    db: Arc<Database>,
    store: Arc<FileStore>,
}

impl MessageService {
    pub fn new(db: Arc<Database>, store: Arc<FileStore>) -> Self {
        Self { db, store }
    }

    /// Store a clip from `sender_id` to `receiver_id` and record it.
    ///
    /// If recording the metadata fails the blob is deleted again, so a failed
    /// send leaves nothing behind in the file store.
    pub async fn send(
        &self,
        sender_id: i64,
        receiver_id: i64,
        data: &[u8],
        original_name: &str,
    ) -> Result<AudioMessage, AppError> {
        if data.is_empty() {
            return Err(AppError::Validation("audio file is empty".into()));
        }
        if original_name.trim().is_empty() {
            return Err(AppError::Validation("audio file name must not be blank".into()));
        }

        let db = self.db.clone();
        let (sender, receiver) = blocking(move || {
            let sender = db
                .get_user_by_id(sender_id)?
                .ok_or(AppError::UserNotFound(sender_id))?;
            let receiver = db
                .get_user_by_id(receiver_id)?
                .ok_or(AppError::UserNotFound(receiver_id))?;
            Ok((sender, receiver))
        })
        .await?;

        let key = self.store.store(data, original_name).await?;

        let timestamp = Utc::now();
        let db = self.db.clone();
        let (path, name) = (key.clone(), original_name.to_string());
        let inserted = blocking(move || {
            Ok(db.insert_audio_message(sender_id, receiver_id, &path, &name, &timestamp)?)
        })
        .await;

        let id = match inserted {
            Ok(id) => id,
            Err(e) => {
                warn!("Recording clip {} failed, removing blob: {}", key, e);
                if let Err(cleanup) = self.store.remove(&key).await {
                    warn!("Orphaned blob {}: {}", key, cleanup);
                }
                return Err(e);
            }
        };

        info!(
            "Clip {} sent from {} to {} ({} bytes, stored as {})",
            id,
            sender.id,
            receiver.id,
            data.len(),
            key
        );

        Ok(AudioMessage {
            id,
            sender: UserRef {
                id: sender.id,
                username: sender.username,
            },
            receiver: UserRef {
                id: receiver.id,
                username: receiver.username,
            },
            file_path: key,
            file_name: original_name.to_string(),
            timestamp,
        })
    }

    /// All clips exchanged directly between `user_a` and `user_b`, oldest first.
    ///
    /// Unknown user ids yield an empty conversation rather than an error.
    pub async fn get_conversation(&self, user_a: i64, user_b: i64) -> Result<Vec<AudioMessage>, AppError> {
        let db = self.db.clone();
        let (a_to_b, b_to_a) = blocking(move || {
            if db.get_user_by_id(user_a)?.is_none() || db.get_user_by_id(user_b)?.is_none() {
                return Ok((Vec::new(), Vec::new()));
            }

            let a_to_b = db.get_messages_from_to(user_a, user_b)?;
            // A self-conversation is a single direction
            let b_to_a = if user_a == user_b {
                Vec::new()
            } else {
                db.get_messages_from_to(user_b, user_a)?
            };
            Ok((a_to_b, b_to_a))
        })
        .await?;

        let conversation = merge_conversation(
            a_to_b.into_iter().map(message_from_row).collect(),
            b_to_a.into_iter().map(message_from_row).collect(),
        );
        debug!(
            "Conversation {} <-> {}: {} clips",
            user_a,
            user_b,
            conversation.len()
        );
        Ok(conversation)
    }

    /// Open a stored clip for download. Keys that are unknown or point outside
    /// the store are both reported as not found.
    pub async fn open_clip(&self, key: &str) -> Result<Blob, AppError> {
        match self.store.open_blob(key).await {
            Ok(blob) => Ok(blob),
            Err(StoreError::InvalidKey(_)) => {
                warn!("Rejected download of invalid key {:?}", key);
                Err(AppError::NotFound(format!("audio file {} not found", key)))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Concatenate both directions and order by timestamp.
///
/// The sort is stable: clips with equal timestamps keep the order in which
/// they were retrieved.
pub fn merge_conversation(mut first: Vec<AudioMessage>, second: Vec<AudioMessage>) -> Vec<AudioMessage> {
    first.extend(second);
    first.sort_by_key(|msg| msg.timestamp);
    first
}

fn message_from_row(row: AudioMessageRow) -> AudioMessage {
    let timestamp = parse_timestamp(&row.timestamp).unwrap_or_else(|e| {
        warn!("Corrupt timestamp '{}' on message {}: {}", row.timestamp, row.id, e);
        DateTime::default()
    });

    AudioMessage {
        id: row.id,
        sender: UserRef {
            id: row.sender_id,
            username: row.sender_username,
        },
        receiver: UserRef {
            id: row.receiver_id,
            username: row.receiver_username,
        },
        file_path: row.file_path,
        file_name: row.file_name,
        timestamp,
    }
}
