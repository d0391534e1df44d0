//! Profile photo handling: normalise uploads to a small JPEG and keep them in
//! the blob store at a fixed per-user path.

use image::{DynamicImage, ImageOutputFormat};
use std::io::Cursor;

use crate::error::{KlusError, Result};
use crate::store::BlobStore;

/// Longest edge of a stored profile photo, in pixels.
pub const PROFILE_PHOTO_SIZE: u32 = 256;
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
const JPEG_QUALITY: u8 = 85;

pub fn profile_photo_path(uid: &str) -> String {
    format!("profile-photos/{}.jpg", uid)
}

/// Decode any supported image and re-encode it as a JPEG thumbnail.
pub fn make_thumbnail(bytes: &[u8]) -> Result<Vec<u8>> {
    if bytes.is_empty() {
        return Err(KlusError::Validation("photo is empty".into()));
    }
    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err(KlusError::Validation(format!(
            "photo exceeds {} bytes",
            MAX_UPLOAD_BYTES
        )));
    }
    let img = image::load_from_memory(bytes)?;
    let thumb = DynamicImage::ImageRgb8(img.thumbnail(PROFILE_PHOTO_SIZE, PROFILE_PHOTO_SIZE).to_rgb8());

    let mut out = Cursor::new(Vec::new());
    thumb.write_to(&mut out, ImageOutputFormat::Jpeg(JPEG_QUALITY))?;
    Ok(out.into_inner())
}

/// Store a new profile photo for `uid` and return its URL.
pub async fn store_profile_photo(blobs: &dyn BlobStore, uid: &str, bytes: &[u8]) -> Result<String> {
    let jpeg = make_thumbnail(bytes)?;
    let path = profile_photo_path(uid);
    let url = blobs
        .upload(jpeg, &path, "image/jpeg")
        .await
        .map_err(|e| KlusError::Blob(e.to_string()))?;
    tracing::info!("Profile photo stored at {}", path);
    Ok(url)
}

pub async fn delete_profile_photo(blobs: &dyn BlobStore, uid: &str) -> Result<()> {
    blobs
        .delete(&profile_photo_path(uid))
        .await
        .map_err(|e| KlusError::Blob(e.to_string()))
}

#[cfg(test)]
pub(crate) fn sample_png(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
        width,
        height,
        image::Rgb([200, 120, 40]),
    ));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageOutputFormat::Png)
        .expect("encode png");
    out.into_inner()
}
