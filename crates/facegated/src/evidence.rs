//! Probe images and the evidence directory.

use crate::error::ApiError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{Datelike, Utc};
use facegate_core::EvidenceKind;
use facegate_store::evidence::NewEvidence;
use image::ImageFormat;
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};

/// A decoded, validated probe image.
#[derive(Debug, Clone)]
pub struct Photo {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
}

impl Photo {
    /// Decode base64 (optionally a `data:` URL) and make sure the bytes are
    /// an image the `image` crate can read.
    pub async fn from_base64(input: &str) -> Result<Self, ApiError> {
        let raw = match input.split_once(";base64,") {
            Some((prefix, rest)) if prefix.starts_with("data:") => rest,
            _ => input,
        };
        let bytes = STANDARD
            .decode(raw.trim())
            .map_err(|_| ApiError::BadRequest("image is not valid base64".into()))?;
        if bytes.is_empty() {
            return Err(ApiError::BadRequest("image is empty".into()));
        }
        tokio::task::spawn_blocking(move || {
            let format = image::guess_format(&bytes)
                .map_err(|_| ApiError::BadRequest("unrecognised image format".into()))?;
            image::load_from_memory_with_format(&bytes, format)
                .map_err(|e| ApiError::BadRequest(format!("image could not be decoded: {e}")))?;
            Ok(Photo { bytes, format })
        })
        .await
        .map_err(ApiError::internal)?
    }

    pub fn mime_type(&self) -> &'static str {
        self.format.to_mime_type()
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

/// Evidence files, laid out as `YYYY/MM/<uuid>.<ext>` under a root.
#[derive(Debug, Clone)]
pub struct EvidenceDir {
    root: PathBuf,
}

impl EvidenceDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Write the photo and return the metadata row to insert.
    pub async fn save(&self, kind: EvidenceKind, photo: &Photo) -> std::io::Result<NewEvidence> {
        let now = Utc::now();
        let ext = photo.format.extensions_str().first().copied().unwrap_or("bin");
        let rel = format!(
            "{:04}/{:02}/{}.{ext}",
            now.year(),
            now.month(),
            uuid::Uuid::new_v4()
        );
        let path = self.root.join(&rel);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &photo.bytes).await?;
        tracing::debug!(path = %path.display(), bytes = photo.bytes.len(), "evidence written");
        Ok(NewEvidence {
            kind,
            path: rel,
            mime_type: Some(photo.mime_type().to_string()),
            size_bytes: photo.bytes.len() as i64,
            sha256: sha256_hex(&photo.bytes),
        })
    }

    /// Read a stored file. Only plain relative paths are accepted.
    pub async fn read(&self, rel: &str) -> std::io::Result<Vec<u8>> {
        let rel = Path::new(rel);
        if !rel.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "evidence path escapes the evidence directory",
            ));
        }
        tokio::fs::read(self.root.join(rel)).await
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// A tiny valid PNG for tests.
#[cfg(test)]
pub(crate) fn sample_png() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(4, 4, image::Rgb([200, 120, 40]));
    let mut out = std::io::Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}
