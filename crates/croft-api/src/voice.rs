use std::path::PathBuf;

use anyhow::Result;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use bytes::Bytes;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::info;

use croft_types::api::VoiceUploadResponse;

use crate::internal;
use crate::middleware::CurrentFarmer;
use crate::state::AppState;

/// Disk-backed store for voice-message audio. Each object is a single flat
/// file at `{dir}/{name}`; names are client-derived (timestamp + farmer id)
/// and re-uploads overwrite.
pub struct VoiceStore {
    dir: PathBuf,
}

impl VoiceStore {
    pub async fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Voice storage directory: {}", dir.display());
        Ok(Self { dir })
    }

    pub fn file_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Write the object and return the SHA-256 of the stored bytes.
    pub async fn save(&self, name: &str, data: &[u8]) -> Result<String> {
        let mut hasher = Sha256::new();
        hasher.update(data);
        let sha256 = hex::encode(hasher.finalize());

        let path = self.file_path(name);
        let mut file = fs::File::create(&path).await?;
        file.write_all(data).await?;
        file.flush().await?;

        Ok(sha256)
    }

    pub async fn open(&self, name: &str) -> Result<Option<(fs::File, u64)>> {
        match fs::File::open(self.file_path(name)).await {
            Ok(file) => {
                let len = file.metadata().await?.len();
                Ok(Some((file, len)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Object names come from clients; keep them strictly flat.
fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 128
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

fn content_type(name: &str) -> &'static str {
    match name.rsplit('.').next() {
        Some("webm") => "audio/webm",
        Some("ogg") | Some("oga") => "audio/ogg",
        Some("mp3") => "audio/mpeg",
        Some("m4a") => "audio/mp4",
        Some("wav") => "audio/wav",
        _ => "application/octet-stream",
    }
}

/// POST /voice/{name}: store an audio object, answer with its public URL
/// and content hash.
pub async fn upload_voice(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Extension(CurrentFarmer(current)): Extension<CurrentFarmer>,
    body: Bytes,
) -> Result<impl IntoResponse, StatusCode> {
    if !valid_name(&name) || body.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let sha256 = state.voice.save(&name, &body).await.map_err(internal)?;

    info!(
        "{} uploaded voice object {} ({} bytes)",
        current.display_name,
        name,
        body.len()
    );

    Ok((
        StatusCode::CREATED,
        Json(VoiceUploadResponse {
            url: format!("/voice/{name}"),
            sha256,
        }),
    ))
}

/// GET /voice/{name}: stream the object back as an audio response.
pub async fn serve_voice(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    if !valid_name(&name) {
        return Err(StatusCode::BAD_REQUEST);
    }

    let (file, len) = state
        .voice
        .open(&name)
        .await
        .map_err(internal)?
        .ok_or(StatusCode::NOT_FOUND)?;

    let body = Body::from_stream(ReaderStream::new(file));

    Ok((
        [
            (header::CONTENT_TYPE, content_type(&name).to_string()),
            (header::CONTENT_LENGTH, len.to_string()),
        ],
        body,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_traversal_and_hidden_names() {
        assert!(valid_name("voice_F42_1722945600.webm"));
        assert!(!valid_name(""));
        assert!(!valid_name("../etc/passwd"));
        assert!(!valid_name("a/b.webm"));
        assert!(!valid_name(".hidden"));
        assert!(!valid_name(&"x".repeat(200)));
    }

    #[test]
    fn content_type_follows_extension() {
        assert_eq!(content_type("a.webm"), "audio/webm");
        assert_eq!(content_type("a.mp3"), "audio/mpeg");
        assert_eq!(content_type("noext"), "application/octet-stream");
    }

    #[tokio::test]
    async fn save_then_open_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = VoiceStore::new(dir.path().join("voice")).await.unwrap();

        let sha = store.save("clip.webm", b"audio-bytes").await.unwrap();
        assert_eq!(sha.len(), 64);

        let (_file, len) = store.open("clip.webm").await.unwrap().unwrap();
        assert_eq!(len, 11);

        assert!(store.open("missing.webm").await.unwrap().is_none());
    }
}
