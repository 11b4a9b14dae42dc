//! Conversion between rasters and the base64 payloads stored in image items.
//!
//! Payloads are always written as PNG so pixel data survives a round trip.
//! Thumbnails are PNG data URIs bounded by [`THUMBNAIL_SIZE`].

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

/// Bounding box for gallery thumbnails.
pub const THUMBNAIL_SIZE: (u32, u32) = (128, 128);

const PNG_DATA_URI_PREFIX: &str = "data:image/png;base64,";

/// Errors from the image codec.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("invalid base64 image payload: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("unsupported or corrupt raster: {0}")]
    Decode(#[source] image::ImageError),

    #[error("unable to encode raster: {0}")]
    Encode(#[source] image::ImageError),

    #[error("images with {0} channels are not supported")]
    UnsupportedChannelCount(usize),

    #[error("channel sizes differ: {expected:?} vs {found:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        found: (u32, u32),
    },
}

impl ImageError {
    /// True for failures caused by an unreadable payload.
    pub fn is_decode_error(&self) -> bool {
        matches!(self, ImageError::InvalidBase64(_) | ImageError::Decode(_))
    }
}

/// Decode a base64 payload, with or without a `data:` URI header.
pub fn decode_image(payload: &str) -> Result<DynamicImage, ImageError> {
    let bytes = STANDARD.decode(strip_data_uri(payload).trim())?;
    image::load_from_memory(&bytes).map_err(ImageError::Decode)
}

/// Encode a raster as base64 PNG, optionally wrapped in a data URI.
pub fn encode_image(img: &DynamicImage, as_data_uri: bool) -> Result<String, ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(ImageError::Encode)?;
    let encoded = STANDARD.encode(&buf);
    if as_data_uri {
        Ok(format!("{PNG_DATA_URI_PREFIX}{encoded}"))
    } else {
        Ok(encoded)
    }
}

/// Downscale into `max_size` keeping the aspect ratio. Images that already
/// fit are copied as-is, never enlarged.
pub fn make_thumbnail(img: &DynamicImage, max_size: (u32, u32)) -> Result<String, ImageError> {
    let (max_w, max_h) = max_size;
    let thumb = if img.width() <= max_w && img.height() <= max_h {
        img.clone()
    } else {
        img.resize(max_w, max_h, FilterType::Lanczos3)
    };
    encode_image(&thumb, true)
}

/// Combine per-channel rasters into one image.
///
/// One raster is returned unchanged. Three rasters become an RGB image whose
/// channel `i` is channel `i` of raster `i`.
pub fn compose_channels(mut images: Vec<DynamicImage>) -> Result<DynamicImage, ImageError> {
    match images.len() {
        1 => Ok(images.remove(0)),
        3 => merge_rgb(&images[0], &images[1], &images[2]),
        n => Err(ImageError::UnsupportedChannelCount(n)),
    }
}

fn merge_rgb(
    red: &DynamicImage,
    green: &DynamicImage,
    blue: &DynamicImage,
) -> Result<DynamicImage, ImageError> {
    let expected = (red.width(), red.height());
    for plane in [green, blue] {
        let found = (plane.width(), plane.height());
        if found != expected {
            return Err(ImageError::DimensionMismatch { expected, found });
        }
    }

    let planes = [red.to_rgb8(), green.to_rgb8(), blue.to_rgb8()];
    let merged = RgbImage::from_fn(expected.0, expected.1, |x, y| {
        Rgb([
            planes[0].get_pixel(x, y)[0],
            planes[1].get_pixel(x, y)[1],
            planes[2].get_pixel(x, y)[2],
        ])
    });
    Ok(DynamicImage::ImageRgb8(merged))
}

fn strip_data_uri(payload: &str) -> &str {
    if payload.starts_with("data:") {
        if let Some((_, data)) = payload.split_once(',') {
            return data;
        }
    }
    payload
}

/// An image handed to an upload, either already decoded or as a payload.
#[derive(Debug, Clone)]
pub enum ImageSource {
    Raster(DynamicImage),
    Base64(String),
}

impl From<DynamicImage> for ImageSource {
    fn from(img: DynamicImage) -> Self {
        ImageSource::Raster(img)
    }
}

impl From<String> for ImageSource {
    fn from(payload: String) -> Self {
        ImageSource::Base64(payload)
    }
}

impl From<&str> for ImageSource {
    fn from(payload: &str) -> Self {
        ImageSource::Base64(payload.to_string())
    }
}

/// Everything an upload needs from the source image.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedImage {
    pub width: u32,
    pub height: u32,
    /// Data URI thumbnail for the gallery tile.
    pub thumbnail: String,
    /// Base64 payload stored as the single channel of the single slice.
    pub payload: String,
}

impl PreparedImage {
    pub fn from_source(source: ImageSource) -> Result<Self, ImageError> {
        let (raster, payload) = match source {
            ImageSource::Raster(img) => {
                let payload = encode_image(&img, false)?;
                (img, payload)
            }
            ImageSource::Base64(payload) => (decode_image(&payload)?, payload),
        };
        Ok(Self {
            width: raster.width(),
            height: raster.height(),
            thumbnail: make_thumbnail(&raster, THUMBNAIL_SIZE)?,
            payload,
        })
    }

    /// Slice/channel layout written as the image item's content.
    pub fn slices(&self) -> Vec<Vec<String>> {
        vec![vec![self.payload.clone()]]
    }
}

/// Decode the first slice of an image item's content into one raster.
pub fn image_from_slices(slices: &[Vec<String>]) -> Result<DynamicImage, ImageError> {
    let channels = slices
        .first()
        .map(|slice| {
            slice
                .iter()
                .map(|channel| decode_image(channel))
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()?
        .unwrap_or_default();
    compose_channels(channels)
}
