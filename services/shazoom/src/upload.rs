//!
//! src/upload.rs  Oct 16th, 2026
//!
//! Locally selected audio files and the coordinator that moves them into
//! object storage: size/type checks first, then destination, then bytes
//!

use std::path::Path;

use tracing::{info, warn};

use crate::errors::ShazoomError;
use crate::types::UploadReference;
use crate::workflow::IdentifyBackend;

const FALLBACK_MIME: &str = "application/octet-stream";

/// Content type from the file extension
pub fn mime_for(name: &str) -> &'static str {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match ext.as_deref() {
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("ogg") | Some("oga") => "audio/ogg",
        Some("opus") => "audio/opus",
        Some("flac") => "audio/flac",
        Some("m4a") => "audio/mp4",
        Some("aac") => "audio/aac",
        Some("webm") => "audio/webm",
        Some("aif") | Some("aiff") => "audio/aiff",
        _ => FALLBACK_MIME
    }
}

/// An audio file picked by the user, held in memory for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    name: String,
    mime: String,
    bytes: Vec<u8>
}

impl LocalFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        let mime = mime_for(&name).to_string();
        Self { name, mime, bytes }
    }

    /// Reads a file from disk, refusing before the read when it is too large
    pub async fn read(path: impl AsRef<Path>, max_bytes: u64) -> Result<Self, ShazoomError> {
        let path = path.as_ref();
        let size = tokio::fs::metadata(path).await?.len();
        check_size(size, max_bytes)?;

        let bytes = tokio::fs::read(path).await?;
        let name = path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Ok( Self::new(name, bytes) )
    }

    /// `read` plus the remaining pre-flight checks, for callers that want
    /// a rejected file to stop before any connection is opened
    pub async fn open(path: impl AsRef<Path>, max_bytes: u64) -> Result<Self, ShazoomError> {
        let file = Self::read(path, max_bytes).await?;
        validate(&file, max_bytes)?;
        Ok(file)
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn mime(&self) -> &str { &self.mime }
    pub fn bytes(&self) -> &[u8] { &self.bytes }
    pub fn size(&self) -> u64 { self.bytes.len() as u64 }

    pub fn is_audio(&self) -> bool {
        self.mime.starts_with("audio/")
    }
}

/// Files at or above the limit are rejected
pub fn check_size(size: u64, max_bytes: u64) -> Result<(), ShazoomError> {
    if size >= max_bytes {
        return Err(ShazoomError::SizeLimit { size, limit: max_bytes });
    }
    Ok(())
}

/// Pre-flight checks that must pass before any request is made
pub fn validate(file: &LocalFile, max_bytes: u64) -> Result<(), ShazoomError> {
    check_size(file.size(), max_bytes)?;
    if !file.is_audio() {
        return Err(ShazoomError::Upload(
            format!("{} is not an audio file ({})", file.name(), file.mime())
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
pub struct UploadCoordinator {
    max_bytes: u64
}

impl UploadCoordinator {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    ///
    /// Obtain a destination, then transmit. Strictly sequential; the
    /// returned reference is only valid once the bytes are stored.
    ///
    pub async fn upload<B>(&self, backend: &B, file: &LocalFile) ->
        Result<UploadReference, ShazoomError>
    where
        B: IdentifyBackend + ?Sized
    {
        validate(file, self.max_bytes)?;

        let destination = backend.upload_destination().await
            .map_err(into_upload_error)?;
        backend.transmit(&destination.target, file).await
            .map_err(into_upload_error)?;

        info!(file_key = %destination.reference, bytes = file.size(), "upload.done");
        Ok(destination.reference)
    }
}

fn into_upload_error(e: ShazoomError) -> ShazoomError {
    match e {
        ShazoomError::Upload(_) => e,
        other => {
            warn!(error = %other, "upload.failed");
            ShazoomError::Upload(other.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::config::MAX_UPLOAD_BYTES;
    use crate::workflow::testing::FakeBackend;

    #[test]
    fn size_boundary() {
        assert!(check_size(MAX_UPLOAD_BYTES - 1, MAX_UPLOAD_BYTES).is_ok());
        assert!(matches!(
            check_size(MAX_UPLOAD_BYTES, MAX_UPLOAD_BYTES),
            Err(ShazoomError::SizeLimit { size, limit }) if size == limit
        ));
        assert!(check_size(MAX_UPLOAD_BYTES + 1, MAX_UPLOAD_BYTES).is_err());
    }

    #[test]
    fn mime_from_extension() {
        assert_eq!(mime_for("Uptown_Funk_10secs.MP3"), "audio/mpeg");
        assert_eq!(mime_for("Hey_Jude_24_secs.webm"), "audio/webm");
        assert_eq!(mime_for("notes.txt"), "application/octet-stream");
        assert_eq!(mime_for("noext"), "application/octet-stream");
        assert!(!LocalFile::new("cover.png", vec![0]).is_audio());
    }

    #[tokio::test]
    async fn oversized_file_never_reaches_backend() {
        let backend = FakeBackend::default();
        let coordinator = UploadCoordinator::new(16);
        let file = LocalFile::new("big.mp3", vec![0; 16]);

        let result = coordinator.upload(&backend, &file).await;
        assert!(matches!(result, Err(ShazoomError::SizeLimit { size: 16, limit: 16 })));
        assert_eq!(backend.calls(), Vec::<String>::new());
    }

    #[tokio::test]
    async fn non_audio_is_rejected_before_requests() {
        let backend = FakeBackend::default();
        let coordinator = UploadCoordinator::new(1024);
        let file = LocalFile::new("readme.txt", vec![0; 4]);

        assert!(matches!(
            coordinator.upload(&backend, &file).await,
            Err(ShazoomError::Upload(_))
        ));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn destination_then_transmit() -> Result<(), ShazoomError> {
        let backend = FakeBackend::default();
        let coordinator = UploadCoordinator::new(1024);
        let file = LocalFile::new("clip.wav", vec![0; 10]);

        let reference = coordinator.upload(&backend, &file).await?;
        assert_eq!(reference.as_str(), "uploads/fake.bin");
        assert_eq!(backend.calls(), vec!["upload_destination", "transmit"]);
        Ok(())
    }

    #[tokio::test]
    async fn transmit_failure_is_upload_error() {
        let backend = FakeBackend::default().failing_transmit();
        let coordinator = UploadCoordinator::new(1024);
        let file = LocalFile::new("clip.wav", vec![0; 10]);

        let result = coordinator.upload(&backend, &file).await;
        assert!(matches!(result, Err(ShazoomError::Upload(_))));
    }

    #[tokio::test]
    async fn read_checks_metadata_first() -> Result<(), ShazoomError> {
        let mut tmp = tempfile::Builder::new().suffix(".mp3").tempfile()?;
        tmp.write_all(&[7; 32])?;

        let too_big = LocalFile::read(tmp.path(), 32).await;
        assert!(matches!(too_big, Err(ShazoomError::SizeLimit { size: 32, .. })));

        let file = LocalFile::read(tmp.path(), 33).await?;
        assert_eq!(file.size(), 32);
        assert_eq!(file.mime(), "audio/mpeg");
        Ok(())
    }

    #[tokio::test]
    async fn open_rejects_before_any_request() -> Result<(), ShazoomError> {
        let mut notes = tempfile::Builder::new().suffix(".txt").tempfile()?;
        notes.write_all(b"not audio")?;
        assert!(matches!(
            LocalFile::open(notes.path(), 1024).await,
            Err(ShazoomError::Upload(_))
        ));

        let mut clip = tempfile::Builder::new().suffix(".ogg").tempfile()?;
        clip.write_all(&[1; 64])?;
        assert!(matches!(
            LocalFile::open(clip.path(), 64).await,
            Err(ShazoomError::SizeLimit { size: 64, limit: 64 })
        ));

        let file = LocalFile::open(clip.path(), 65).await?;
        assert_eq!(file.mime(), "audio/ogg");
        Ok(())
    }
}
