use crate::model_config::PreprocessorConfig;
use image::{DynamicImage, ImageFormat, ImageReader};
use ndarray::Array4;
use std::io::Cursor;
use std::path::Path;

pub const ACCEPTED_MEDIA_TYPES: [&str; 3] = ["image/jpeg", "image/jpg", "image/png"];
const ACCEPTED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(thiserror::Error, Debug)]
pub enum PreprocessError {
    #[error("no image data provided")]
    EmptyImage,
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("failed to read image: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] crate::oct_model::ModelError),
}

/// Validates the optional content type and file name hints sent by the client.
pub fn check_declared_type(content_type: &str, file_name: &str) -> Result<(), PreprocessError> {
    let content_type = content_type.trim();
    if !content_type.is_empty()
        && !ACCEPTED_MEDIA_TYPES
            .iter()
            .any(|accepted| accepted.eq_ignore_ascii_case(content_type))
    {
        return Err(PreprocessError::UnsupportedMediaType(content_type.to_string()));
    }

    let file_name = file_name.trim();
    if !file_name.is_empty() {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();
        if !ACCEPTED_EXTENSIONS
            .iter()
            .any(|accepted| accepted.eq_ignore_ascii_case(extension))
        {
            return Err(PreprocessError::UnsupportedMediaType(file_name.to_string()));
        }
    }
    Ok(())
}

/// Decodes JPEG or PNG bytes. The format is sniffed from the content, not
/// taken from any client hint.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, PreprocessError> {
    if bytes.is_empty() {
        return Err(PreprocessError::EmptyImage);
    }

    let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    match reader.format() {
        Some(ImageFormat::Jpeg | ImageFormat::Png) | None => {}
        Some(other) => {
            return Err(PreprocessError::UnsupportedMediaType(
                other.to_mime_type().to_string(),
            ));
        }
    }
    Ok(reader.decode()?)
}

/// Turns raw upload bytes into an NHWC `[1, H, W, 3]` tensor.
pub fn preprocess(
    bytes: &[u8],
    config: &PreprocessorConfig,
) -> Result<Array4<f32>, PreprocessError> {
    let image = decode(bytes)?;
    to_tensor(&image, config)
}

/// Resizes first, then drops to 8-bit RGB, matching the order the
/// classifier's training images went through.
pub fn to_tensor(
    image: &DynamicImage,
    config: &PreprocessorConfig,
) -> Result<Array4<f32>, PreprocessError> {
    let (height, width) = (config.size.height, config.size.width);
    let filter = config.filter_type()?;

    let rgb_image = image
        .resize_exact(width as u32, height as u32, filter)
        .to_rgb8();

    let mut array = Array4::<f32>::zeros((1, height, width, 3));
    for (x, y, pixel) in rgb_image.enumerate_pixels() {
        for c in 0..3 {
            array[[0, y as usize, x as usize, c]] = config.scale(c, pixel[c]);
        }
    }
    Ok(array)
}
