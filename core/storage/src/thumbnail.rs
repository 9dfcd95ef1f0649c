//! Thumbnail derivation for image objects.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::ColorType;
use tracing::debug;

use cloudshelf_common::{Error, Result};

use crate::backend::StorageBackend;

/// Sources larger than this are not decoded; the client is redirected.
pub const SOURCE_SIZE_LIMIT: u64 = 6 * 1024 * 1024;

/// Bounding box edge for backends that do not pick their own.
pub const DEFAULT_THUMBNAIL_EDGE: u32 = 320;

const JPEG_QUALITY: u8 = 80;

/// Result of a thumbnail request.
#[derive(Debug, Clone, PartialEq)]
pub enum ThumbnailResponse {
    /// JPEG bytes.
    Image(Bytes),
    /// The source is served from this URL instead.
    Redirect(String),
}

/// Thumbnail for `key` through the local pipeline.
///
/// # Errors
/// - `NotFound` if the key is missing or the bytes are not a decodable image
/// - `OperationFailed` if the source is oversized and no direct URL exists
pub async fn generate<B>(backend: &B, key: &str) -> Result<ThumbnailResponse>
where
    B: StorageBackend + ?Sized,
{
    let entry = backend.stat(key).await?;
    if entry.size.is_some_and(|size| size > SOURCE_SIZE_LIMIT) {
        return redirect(backend, key).await;
    }

    let content = backend.read(key).await?;
    if content.bytes.len() as u64 > SOURCE_SIZE_LIMIT {
        return redirect(backend, key).await;
    }

    let jpeg = render(content.bytes, backend.thumbnail_edge()).await?;
    Ok(ThumbnailResponse::Image(jpeg))
}

async fn redirect<B>(backend: &B, key: &str) -> Result<ThumbnailResponse>
where
    B: StorageBackend + ?Sized,
{
    debug!(key = %key, "Source exceeds thumbnail limit, redirecting");
    if let Some(url) = backend.presigned_url(key, backend.presign_ttl()).await? {
        return Ok(ThumbnailResponse::Redirect(url));
    }
    if let Some(url) = backend.public_url(key).await? {
        return Ok(ThumbnailResponse::Redirect(url));
    }
    Err(Error::OperationFailed(format!(
        "{} is too large for a thumbnail and has no direct URL",
        key
    )))
}

/// Decode `source` and re-encode it as a JPEG that fits in `edge` x `edge`.
///
/// Runs on the blocking pool.
pub async fn render(source: Bytes, edge: u32) -> Result<Bytes> {
    tokio::task::spawn_blocking(move || render_blocking(&source, edge))
        .await
        .map_err(|e| Error::OperationFailed(format!("Thumbnail task failed: {}", e)))?
}

fn render_blocking(source: &[u8], edge: u32) -> Result<Bytes> {
    let img = image::load_from_memory(source)
        .map_err(|e| Error::NotFound(format!("Not a decodable image: {}", e)))?;

    // Aspect ratio is preserved; small images are not upscaled.
    let img = if img.width() > edge || img.height() > edge {
        img.resize(edge, edge, FilterType::Lanczos3)
    } else {
        img
    };
    let rgb = img.to_rgb8();

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY)
        .encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)
        .map_err(|e| Error::OperationFailed(format!("JPEG encoding failed: {}", e)))?;

    Ok(Bytes::from(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use image::{DynamicImage, ImageOutputFormat, RgbImage};
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Bytes {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([200, 30, 30])));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageOutputFormat::Png).unwrap();
        Bytes::from(buf.into_inner())
    }

    #[tokio::test]
    async fn test_render_fits_bounding_box() {
        let jpeg = render(png(640, 480), 320).await.unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (320, 240));
    }

    #[tokio::test]
    async fn test_render_keeps_small_images() {
        let jpeg = render(png(100, 50), 320).await.unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (100, 50));
    }

    #[tokio::test]
    async fn test_undecodable_source_is_not_found() {
        let result = render(Bytes::from_static(b"definitely not an image"), 200).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_generate_from_backend() {
        let backend = MemoryBackend::new();
        backend.upload("pics/wide.png", png(1000, 200), None).await.unwrap();

        match backend.thumbnail("pics/wide.png").await.unwrap() {
            ThumbnailResponse::Image(jpeg) => {
                let decoded = image::load_from_memory(&jpeg).unwrap();
                assert_eq!(decoded.width(), DEFAULT_THUMBNAIL_EDGE);
                assert_eq!(decoded.height(), 64);
            }
            other => panic!("expected image, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_oversized_without_url_fails() {
        let backend = MemoryBackend::new();
        let big = Bytes::from(vec![0u8; (SOURCE_SIZE_LIMIT + 1) as usize]);
        backend.upload("big.png", big, None).await.unwrap();

        let result = backend.thumbnail("big.png").await;
        assert!(matches!(result, Err(Error::OperationFailed(_))));
    }

    #[tokio::test]
    async fn test_missing_source_is_not_found() {
        let backend = MemoryBackend::new();
        assert!(backend.thumbnail("nope.png").await.unwrap_err().is_not_found());
    }
}
