//! Conversion of cell outputs to MCP content.

use std::io::Cursor;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::ImageFormat;
use rmcp::model::Content;
use tracing::{debug, warn};

use crate::error::ThumbnailError;
use crate::notebook::{Output, PNG_MIME_TYPE};

/// Converts outputs to MCP content items, downscaling images when
/// `image_max_size` is set.
///
/// An image that cannot be downscaled is sent unchanged.
#[must_use]
pub fn to_contents(outputs: Vec<Output>, image_max_size: Option<u32>) -> Vec<Content> {
    outputs
        .into_iter()
        .map(|output| match output {
            Output::Text { text } => Content::text(text),
            Output::Image { data, mime_type } => {
                let data = match image_max_size {
                    Some(max_size) if mime_type == PNG_MIME_TYPE => {
                        thumbnail_png(&data, max_size).unwrap_or_else(|e| {
                            warn!(error = %e, "Sending image output without downscaling");
                            data
                        })
                    }
                    _ => data,
                };
                Content::image(data, mime_type)
            }
        })
        .collect()
}

/// Downscales a base64 PNG so neither edge exceeds `max_size`, keeping the
/// aspect ratio. Images already small enough come back unchanged apart from
/// stripped line breaks.
///
/// # Errors
///
/// Returns an error if the payload is not base64 encoded PNG data.
pub fn thumbnail_png(data: &str, max_size: u32) -> Result<String, ThumbnailError> {
    // nbformat allows base64 payloads wrapped over several lines
    let data: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = STANDARD.decode(&data)?;
    let image = image::load_from_memory_with_format(&bytes, ImageFormat::Png)?;

    if image.width() <= max_size && image.height() <= max_size {
        return Ok(data);
    }

    let thumbnail = image.thumbnail(max_size, max_size);
    let mut encoded = Cursor::new(Vec::new());
    thumbnail.write_to(&mut encoded, ImageFormat::Png)?;

    debug!(
        from = ?(image.width(), image.height()),
        to = ?(thumbnail.width(), thumbnail.height()),
        "Downscaled image output"
    );
    Ok(STANDARD.encode(encoded.into_inner()))
}
