use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, Query, State, multipart::MultipartError},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use tokio_util::io::ReaderStream;
use tracing::debug;

use voxline_types::api::DownloadQuery;

use crate::error::AppError;
use crate::state::AppState;

const DEFAULT_CONTENT_TYPE: &str = "audio/mpeg";

/// POST /messages/send — multipart `senderId`, `receiverId`, `audioFile`.
pub async fn send_message(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut sender_id = None;
    let mut receiver_id = None;
    let mut audio = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("senderId") => {
                sender_id = Some(parse_id("senderId", &field.text().await.map_err(multipart_error)?)?);
            }
            Some("receiverId") => {
                receiver_id = Some(parse_id("receiverId", &field.text().await.map_err(multipart_error)?)?);
            }
            Some("audioFile") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await.map_err(multipart_error)?;
                audio = Some((file_name, data));
            }
            other => debug!("Ignoring multipart field {:?}", other),
        }
    }

    let sender_id = sender_id.ok_or_else(|| missing("senderId"))?;
    let receiver_id = receiver_id.ok_or_else(|| missing("receiverId"))?;
    let (file_name, data) = audio.ok_or_else(|| missing("audioFile"))?;

    let message = state
        .messages
        .send(sender_id, receiver_id, &data, &file_name)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /messages/conversation/{user1_id}/{user2_id} — never fails for unknown users.
pub async fn get_conversation(
    State(state): State<AppState>,
    Path((user1_id, user2_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.messages.get_conversation(user1_id, user2_id).await?))
}

/// GET /messages/download?fileName=<key> — streams the stored clip as an attachment.
pub async fn download(
    State(state): State<AppState>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, AppError> {
    let blob = state.messages.open_clip(&query.file_name).await?;

    let disposition = format!("attachment; filename=\"{}\"", blob.name.replace('"', "_"));
    let disposition = HeaderValue::from_str(&disposition)
        .map_err(|_| AppError::NotFound(format!("audio file {} not found", query.file_name)))?;

    let headers = [
        (header::CONTENT_TYPE, HeaderValue::from_static(content_type_for(&blob.name))),
        (header::CONTENT_LENGTH, HeaderValue::from(blob.len)),
        (header::CONTENT_DISPOSITION, disposition),
    ];
    let body = Body::from_stream(ReaderStream::new(blob.file));

    Ok((headers, body).into_response())
}

/// Audio MIME type from the key's extension, `audio/mpeg` when unknown.
pub fn content_type_for(key: &str) -> &'static str {
    let Some((_, ext)) = key.rsplit_once('.') else {
        return DEFAULT_CONTENT_TYPE;
    };

    match ext.to_ascii_lowercase().as_str() {
        "mp3" | "mpeg" => "audio/mpeg",
        "wav" => "audio/wav",
        "webm" => "audio/webm",
        "ogg" | "oga" | "opus" => "audio/ogg",
        "m4a" | "mp4" | "aac" => "audio/mp4",
        "flac" => "audio/flac",
        _ => DEFAULT_CONTENT_TYPE,
    }
}

fn parse_id(field: &str, raw: &str) -> Result<i64, AppError> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::Validation(format!("{} must be an integer, got {:?}", field, raw)))
}

fn missing(field: &str) -> AppError {
    AppError::Validation(format!("missing multipart field {}", field))
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge
    } else {
        AppError::Validation(err.body_text())
    }
}
