//! Signature evidence capture
//!
//! Decodes a submitted signature image, rejects blank or malformed ones, and
//! writes accepted images once to the evidence store. Blob names embed the
//! student id, so a reference can be checked against its caller later.

use crate::config::EvidenceConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use data_encoding::BASE64;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const DATA_URL_PREFIX: &str = "data:image/png;base64,";
/// Upper bound on decoded pixel data
const MAX_DECODED_BYTES: usize = 32 * 1024 * 1024;

/// Error types for evidence capture
#[derive(Debug, thiserror::Error)]
pub enum EvidenceError {
    /// Nothing usable was submitted (empty payload, blank canvas, bad reference)
    #[error("Signature missing: {0}")]
    Missing(String),

    /// Payload is not a decodable PNG within limits
    #[error("Malformed signature: {0}")]
    Malformed(String),

    /// Storage kept failing after all retries
    #[error("Signature upload failed: {0}")]
    UploadFailed(String),
}

/// A decoded signature image
#[derive(Debug, Clone)]
pub struct DecodedSignature {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Decode a base64 (or `data:image/png;base64,`) signature payload
pub fn decode_signature(
    payload: &str,
    max_size: u64,
    min_dimension: u32,
) -> Result<DecodedSignature, EvidenceError> {
    let trimmed = payload.trim();
    if trimmed.is_empty() {
        return Err(EvidenceError::Missing("signature is empty".to_string()));
    }

    let encoded = if let Some(rest) = trimmed.strip_prefix(DATA_URL_PREFIX) {
        rest
    } else if trimmed.starts_with("data:") {
        return Err(EvidenceError::Malformed(
            "only image/png data URLs are accepted".to_string(),
        ));
    } else {
        trimmed
    };

    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if compact.is_empty() {
        return Err(EvidenceError::Missing("signature is empty".to_string()));
    }
    if compact.len() as u64 / 4 * 3 > max_size + 3 {
        return Err(EvidenceError::Malformed(format!(
            "signature exceeds {} bytes",
            max_size
        )));
    }

    let bytes = BASE64
        .decode(compact.as_bytes())
        .map_err(|e| EvidenceError::Malformed(format!("invalid base64: {}", e)))?;

    if bytes.len() as u64 > max_size {
        return Err(EvidenceError::Malformed(format!(
            "signature exceeds {} bytes",
            max_size
        )));
    }

    let (width, height, inked) = inspect_png(&bytes)?;

    if width < min_dimension || height < min_dimension {
        return Err(EvidenceError::Missing(format!(
            "signature canvas is blank ({}x{})",
            width, height
        )));
    }
    if !inked {
        return Err(EvidenceError::Missing(
            "signature canvas has no strokes".to_string(),
        ));
    }

    Ok(DecodedSignature {
        bytes,
        width,
        height,
    })
}

/// Decode the image data and report its size and whether anything was drawn
fn inspect_png(bytes: &[u8]) -> Result<(u32, u32, bool), EvidenceError> {
    if bytes.len() < PNG_SIGNATURE.len() || bytes[..8] != PNG_SIGNATURE {
        return Err(EvidenceError::Malformed(
            "signature is not a PNG image".to_string(),
        ));
    }
    let malformed = |e: png::DecodingError| EvidenceError::Malformed(format!("invalid PNG: {}", e));

    let mut decoder = png::Decoder::new_with_limits(
        bytes,
        png::Limits {
            bytes: MAX_DECODED_BYTES,
        },
    );
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
    let mut reader = decoder.read_info().map_err(malformed)?;

    let (width, height) = (reader.info().width, reader.info().height);
    // 8 bytes covers RGBA at 16 bits before stripping
    if width as u64 * height as u64 * 8 > MAX_DECODED_BYTES as u64 {
        return Err(EvidenceError::Malformed(format!(
            "signature canvas is too large ({}x{})",
            width, height
        )));
    }

    let mut buf = vec![0; reader.output_buffer_size()];
    let frame = reader.next_frame(&mut buf).map_err(malformed)?;

    Ok((
        width,
        height,
        has_ink(&buf[..frame.buffer_size()], frame.color_type),
    ))
}

/// A canvas has ink unless every pixel looks the same. Transparent pixels
/// count as one colour whatever their RGB values.
fn has_ink(frame: &[u8], color_type: png::ColorType) -> bool {
    let channels = color_type.samples();
    let alpha = matches!(
        color_type,
        png::ColorType::GrayscaleAlpha | png::ColorType::Rgba
    )
    .then(|| channels - 1);

    let mut pixels = frame.chunks_exact(channels);
    let Some(background) = pixels.next() else {
        return false;
    };
    let background = visible(background, alpha);
    pixels.any(|pixel| visible(pixel, alpha) != background)
}

fn visible(pixel: &[u8], alpha: Option<usize>) -> Option<&[u8]> {
    match alpha {
        Some(i) if pixel[i] == 0 => None,
        _ => Some(pixel),
    }
}

/// Blob name for a capture: `student-{id}-{millis}-{random}.png`
pub fn evidence_key(student_id: i64, captured_at: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "student-{}-{}-{}.png",
        student_id,
        captured_at.timestamp_millis(),
        &suffix[..8]
    )
}

/// Write-once content storage for evidence blobs
#[async_trait]
pub trait EvidenceStore: Send + Sync {
    /// Store a new blob and return its public URL. Fails if the key exists.
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<String>;

    /// Whether a blob exists under the key
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Map a public URL back to a key of this store
    fn key_for_url(&self, url: &str) -> Option<String>;
}

/// Filesystem evidence store, served statically under `public_base_url`
pub struct LocalEvidenceStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalEvidenceStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: &str) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &EvidenceConfig) -> Self {
        Self::new(config.path.clone(), &config.public_base_url)
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }
}

fn is_plain_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        && !key.starts_with('.')
}

#[async_trait]
impl EvidenceStore for LocalEvidenceStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<String> {
        if !is_plain_key(key) {
            anyhow::bail!("Invalid evidence key: {}", key);
        }

        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("Failed to create {}", self.root.display()))?;

        let path = self.root.join(key);
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .with_context(|| format!("Failed to create {}", path.display()))?;

        let written = match file.write_all(bytes).await {
            Ok(()) => file.sync_all().await,
            Err(e) => Err(e),
        };

        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(e).with_context(|| format!("Failed to write {}", path.display()));
        }

        Ok(format!("{}/{}", self.public_base_url, key))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        if !is_plain_key(key) {
            return Ok(false);
        }
        let path = self.root.join(key);
        tokio::fs::try_exists(&path)
            .await
            .with_context(|| format!("Failed to stat {}", path.display()))
    }

    fn key_for_url(&self, url: &str) -> Option<String> {
        let key = url.strip_prefix(&self.public_base_url)?.strip_prefix('/')?;
        is_plain_key(key).then(|| key.to_string())
    }
}

/// Validates signature payloads and stores them with retries
pub struct EvidenceCapture {
    store: Arc<dyn EvidenceStore>,
    config: EvidenceConfig,
}

impl EvidenceCapture {
    pub fn new(store: Arc<dyn EvidenceStore>, config: EvidenceConfig) -> Self {
        Self { store, config }
    }

    /// Validate an inline payload without storing it
    pub fn validate(&self, payload: &str) -> Result<DecodedSignature, EvidenceError> {
        decode_signature(payload, self.config.max_size, self.config.min_dimension)
    }

    /// Store an already validated signature and return its URL
    pub async fn store(
        &self,
        student_id: i64,
        captured_at: DateTime<Utc>,
        signature: &DecodedSignature,
    ) -> Result<String, EvidenceError> {
        let attempts = self.config.upload_attempts.max(1);
        let mut last_error = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                // Exponential backoff: base, 2x base, 4x base...
                let delay = self.config.retry_backoff_ms.saturating_mul(1u64 << (attempt - 1).min(16));
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            // Fresh key per attempt so a partial write never blocks the retry
            let key = evidence_key(student_id, captured_at);
            match self.store.put(&key, &signature.bytes).await {
                Ok(url) => {
                    tracing::debug!(student_id, key = %key, "Signature stored");
                    return Ok(url);
                }
                Err(e) => {
                    tracing::warn!(
                        student_id,
                        attempt = attempt + 1,
                        "Signature upload failed: {:#}",
                        e
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(EvidenceError::UploadFailed(
            last_error
                .map(|e| format!("{:#}", e))
                .unwrap_or_else(|| "no attempts made".to_string()),
        ))
    }

    /// Validate and store an inline payload
    pub async fn capture(
        &self,
        student_id: i64,
        captured_at: DateTime<Utc>,
        payload: &str,
    ) -> Result<String, EvidenceError> {
        let signature = self.validate(payload)?;
        self.store(student_id, captured_at, &signature).await
    }

    /// Accept a pre-uploaded URL only if it names an existing blob of this caller
    pub async fn resolve_reference(
        &self,
        student_id: i64,
        url: &str,
    ) -> Result<String, EvidenceError> {
        let url = url.trim();
        let key = self.store.key_for_url(url).ok_or_else(|| {
            EvidenceError::Missing("signature reference is not an uploaded signature".to_string())
        })?;

        if !key.starts_with(&format!("student-{}-", student_id)) {
            return Err(EvidenceError::Missing(
                "signature reference belongs to another student".to_string(),
            ));
        }

        let exists = self.store.exists(&key).await.map_err(|e| {
            EvidenceError::UploadFailed(format!("could not check signature: {:#}", e))
        })?;
        if !exists {
            return Err(EvidenceError::Missing(
                "signature reference does not exist".to_string(),
            ));
        }

        Ok(url.to_string())
    }
}
