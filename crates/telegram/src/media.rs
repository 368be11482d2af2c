//! Media transfer between the room-message store and the Bot API.
//!
//! Outbound media is staged in a per-transfer scratch directory because the
//! Bot API multipart upload wants a named file. The directory is removed on
//! every exit path: explicitly after the send, or by `TempDir`'s destructor
//! when the send future panics or is dropped.

use std::{
    future::Future,
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    futures::{StreamExt, TryStreamExt},
    relaygram_bridge::{ByteStream, MediaRef, MediaStore},
    teloxide::{Bot, net::Download, prelude::Requester},
    tempfile::TempDir,
    tokio::io::AsyncWriteExt,
    tracing::{debug, warn},
};

use crate::{
    error::{Error, Result},
    normalize::normalize,
};

const SCRATCH_PREFIX: &str = "relaygram-";
const FALLBACK_FILE_NAME: &str = "attachment";

/// An outbound attachment written to local disk for the duration of a send.
#[derive(Debug, Clone)]
pub struct LocalMedia {
    pub path: PathBuf,
    pub file_name: String,
    pub content_type: Option<String>,
    pub length: u64,
}

/// A file offered by the Bot API in an incoming message.
#[derive(Debug, Clone, Copy)]
pub struct RemoteFile<'a> {
    pub file_id: &'a str,
    pub file_name: Option<&'a str>,
    pub content_type: Option<&'a str>,
    pub size: Option<u64>,
}

/// A remote file after re-upload to the room-message store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedMedia {
    pub media: MediaRef,
    pub file_name: String,
    pub content_type: Option<String>,
    pub size: Option<u64>,
}

pub struct MediaPipeline {
    store: Arc<dyn MediaStore>,
    scratch_dir: PathBuf,
}

impl MediaPipeline {
    pub fn new(store: Arc<dyn MediaStore>, scratch_dir: PathBuf) -> Self {
        Self { store, scratch_dir }
    }

    /// Download `media` into a fresh scratch directory and run `f` on it.
    ///
    /// The scratch directory is gone when this returns, whatever `f` did.
    pub async fn materialize<T, F, Fut>(
        &self,
        media: &MediaRef,
        file_name: Option<&str>,
        f: F,
    ) -> Result<T>
    where
        F: FnOnce(LocalMedia) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let scratch = create_scratch_dir(self.scratch_dir.clone()).await?;
        let outcome = async {
            let download = self.store.download(media).await?;
            let file_name = sanitize_file_name(file_name);
            let path = scratch.path().join(&file_name);
            let length = write_stream(&path, download.body).await?;
            debug!(media = %media, length, "media staged for upload");
            f(LocalMedia {
                path,
                file_name,
                content_type: download.content_type,
                length,
            })
            .await
        }
        .await;
        release_scratch_dir(scratch).await;
        outcome
    }

    /// Fetch a Bot API file and store it in the room-message store.
    pub async fn import(&self, bot: &Bot, file: RemoteFile<'_>) -> Result<ImportedMedia> {
        let remote = normalize(bot.get_file(file.file_id).await).into_result()?;
        let file_name = file
            .file_name
            .map(str::to_string)
            .unwrap_or_else(|| remote_file_name(&remote.path));

        let body: ByteStream = bot
            .download_file_stream(&remote.path)
            .map_err(std::io::Error::other)
            .boxed();
        let media = self
            .store
            .upload(body, file.content_type, Some(&file_name), file.size)
            .await?;
        debug!(file_id = file.file_id, media = %media, "telegram file imported");

        Ok(ImportedMedia {
            media,
            file_name,
            content_type: file.content_type.map(str::to_string),
            size: file.size,
        })
    }
}

async fn create_scratch_dir(parent: PathBuf) -> Result<TempDir> {
    tokio::task::spawn_blocking(move || {
        std::fs::create_dir_all(&parent)?;
        tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir_in(&parent)
    })
    .await
    .map_err(|e| Error::external("scratch directory task failed", e))?
    .map_err(Error::from)
}

async fn release_scratch_dir(scratch: TempDir) {
    let path = scratch.path().to_path_buf();
    match tokio::task::spawn_blocking(move || scratch.close()).await {
        Ok(Ok(())) => {},
        Ok(Err(e)) => warn!(path = %path.display(), error = %e, "failed to remove scratch directory"),
        Err(e) => warn!(path = %path.display(), error = %e, "scratch cleanup task failed"),
    }
}

async fn write_stream(path: &Path, mut body: ByteStream) -> Result<u64> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written = 0u64;
    while let Some(chunk) = body.try_next().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

/// Reduce a client-supplied name to a single safe path component.
fn sanitize_file_name(name: Option<&str>) -> String {
    let base = name
        .and_then(|n| n.rsplit(['/', '\\']).next())
        .unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_control() { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        FALLBACK_FILE_NAME.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Last segment of a Bot API file path (`photos/file_3.jpg` -> `file_3.jpg`).
fn remote_file_name(path: &str) -> String {
    path.rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(FALLBACK_FILE_NAME)
        .to_string()
}
