use image::DynamicImage;
use log::debug;

use crate::domain::email::{Attachment, InlineImage};

/// Decodes an inline image part into pixels, or `None` for formats the
/// `image` crate does not handle (SVG, TIFF variants, ...).
pub fn decode_inline(part: &InlineImage) -> Option<DynamicImage> {
    if !part.mime_type.starts_with("image/") {
        return None;
    }
    match image::load_from_memory(&part.data) {
        Ok(img) => Some(img),
        Err(e) => {
            debug!("Cannot decode inline image {}: {e}", part.content_id);
            None
        }
    }
}

/// One line per inline image, for terminals without graphics support.
pub fn describe(images: &[InlineImage]) -> Vec<String> {
    images
        .iter()
        .map(|img| {
            let name = if img.content_id.is_empty() {
                "unnamed"
            } else {
                img.content_id.as_str()
            };
            format!("[image: {name} ({}, {} bytes)]", img.mime_type, img.data.len())
        })
        .collect()
}

/// One line per attachment, listed under the body.
pub fn describe_attachments(attachments: &[Attachment]) -> Vec<String> {
    attachments
        .iter()
        .map(|a| match a.size {
            Some(size) => format!("[attachment: {} ({}, {size} bytes)]", a.filename, a.mime_type),
            None => format!("[attachment: {} ({})]", a.filename, a.mime_type),
        })
        .collect()
}
