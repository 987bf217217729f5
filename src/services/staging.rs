use crate::services::error::IngestError;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Writes inbound uploads to uniquely named files under a local directory.
pub struct TempStage {
    dir: PathBuf,
    max_file_size: usize,
}

/// A local copy of an upload's bytes, exclusively owned by one ingest.
///
/// The file is removed by `release`, or on drop if the owner never got that
/// far (cancelled request, panic), so it is deleted exactly once.
#[derive(Debug)]
pub struct StagedFile {
    path: TempPath,
    pub size: u64,
    pub mime_type: String,
    pub original_name: String,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the local file.
    pub fn release(self) -> Result<(), IngestError> {
        let released = self.path.to_path_buf();
        self.path.close()?;
        tracing::debug!("🧹 Released staged file {}", released.display());
        Ok(())
    }
}

impl TempStage {
    pub fn new(dir: impl Into<PathBuf>, max_file_size: usize) -> Self {
        Self {
            dir: dir.into(),
            max_file_size,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Stream `reader` into a fresh staging file.
    ///
    /// Fails with `PayloadTooLarge` as soon as more than `max_file_size` bytes
    /// arrive; the partial file is removed before returning.
    pub async fn stage<R>(
        &self,
        original_name: &str,
        content_type: Option<&str>,
        mut reader: R,
    ) -> Result<StagedFile, IngestError>
    where
        R: AsyncRead + Unpin + Send,
    {
        tokio::fs::create_dir_all(&self.dir).await?;

        let named = tempfile::Builder::new()
            .prefix("upload-")
            .tempfile_in(&self.dir)?;
        let (file, path) = named.into_parts();
        let mut file = tokio::fs::File::from_std(file);

        let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
        let mut size: u64 = 0;

        loop {
            let n = reader.read(&mut buffer).await.map_err(|e| {
                if e.to_string().contains("length limit exceeded") {
                    IngestError::PayloadTooLarge {
                        limit: self.max_file_size,
                    }
                } else {
                    IngestError::LocalIo(e)
                }
            })?;
            if n == 0 {
                break;
            }

            size += n as u64;
            if size > self.max_file_size as u64 {
                tracing::warn!(
                    "Upload '{}' exceeded {} bytes, discarding",
                    original_name,
                    self.max_file_size
                );
                return Err(IngestError::PayloadTooLarge {
                    limit: self.max_file_size,
                });
            }

            file.write_all(&buffer[..n]).await?;
        }

        file.flush().await?;

        let mime_type = content_type
            .and_then(|ct| ct.parse::<mime::Mime>().ok())
            .unwrap_or(mime::APPLICATION_OCTET_STREAM)
            .to_string();

        tracing::info!(
            "📥 Staged '{}' ({} bytes, {}) at {}",
            original_name,
            size,
            mime_type,
            path.display()
        );

        Ok(StagedFile {
            path,
            size,
            mime_type,
            original_name: original_name.to_string(),
        })
    }
}
