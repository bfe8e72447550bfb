//! Reading image files and decoding them with format detection.

use image::{DynamicImage, GenericImageView, ImageFormat};
use std::path::Path;

use crate::config::LimitsConfig;
use crate::error::PipelineError;

/// Image loader with configurable limits.
#[derive(Debug, Clone)]
pub struct ImageDecoder {
    limits: LimitsConfig,
}

/// Result of decoding an image.
pub struct DecodedImage {
    /// The decoded image data
    pub image: DynamicImage,
    /// Detected image format
    pub format: ImageFormat,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
}

impl ImageDecoder {
    /// Create a new decoder with the given limits.
    pub fn new(limits: LimitsConfig) -> Self {
        Self { limits }
    }

    /// Read the whole file, rejecting files over the size limit before reading.
    pub async fn read(&self, path: &Path) -> Result<Vec<u8>, PipelineError> {
        let io_err = |source| PipelineError::Io {
            path: path.to_path_buf(),
            source,
        };

        let metadata = tokio::fs::metadata(path).await.map_err(io_err)?;
        let max_bytes = self.limits.max_file_size_mb.saturating_mul(1024 * 1024);
        if metadata.len() > max_bytes {
            return Err(PipelineError::FileTooLarge {
                path: path.to_path_buf(),
                size_mb: metadata.len() / (1024 * 1024),
                max_mb: self.limits.max_file_size_mb,
            });
        }

        tokio::fs::read(path).await.map_err(io_err)
    }

    /// Decode an in-memory image off the async runtime.
    pub async fn decode_from_bytes(
        &self,
        bytes: Vec<u8>,
        path: &Path,
    ) -> Result<DecodedImage, PipelineError> {
        let path_owned = path.to_path_buf();
        let decoded = tokio::task::spawn_blocking(move || Self::decode_bytes_sync(bytes, &path_owned))
            .await
            .map_err(|e| PipelineError::Decode {
                path: path.to_path_buf(),
                message: format!("Task join error: {}", e),
            })??;

        if decoded.width > self.limits.max_image_dimension
            || decoded.height > self.limits.max_image_dimension
        {
            return Err(PipelineError::ImageTooLarge {
                path: path.to_path_buf(),
                width: decoded.width,
                height: decoded.height,
                max_dim: self.limits.max_image_dimension,
            });
        }
        Ok(decoded)
    }

    /// Read and decode `path`.
    pub async fn load(&self, path: &Path) -> Result<DecodedImage, PipelineError> {
        let bytes = self.read(path).await?;
        self.decode_from_bytes(bytes, path).await
    }

    /// Synchronous decode from bytes. The format is detected from content,
    /// falling back to the file extension.
    pub fn decode_bytes_sync(bytes: Vec<u8>, path: &Path) -> Result<DecodedImage, PipelineError> {
        use std::io::Cursor;

        let mut reader = image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| PipelineError::Decode {
                path: path.to_path_buf(),
                message: format!("Cannot detect image format: {}", e),
            })?;
        let format = match reader.format() {
            Some(f) => f,
            None => {
                let f = ImageFormat::from_path(path).map_err(|_| PipelineError::Decode {
                    path: path.to_path_buf(),
                    message: "Unrecognized image format".to_string(),
                })?;
                reader.set_format(f);
                f
            }
        };
        let image = reader.decode().map_err(|e| PipelineError::Decode {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let (width, height) = image.dimensions();
        Ok(DecodedImage {
            image,
            format,
            width,
            height,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn test_format_detected_by_content() {
        // A PNG saved with a .jpg extension is still decoded as PNG
        let dir = tempfile::tempdir().unwrap();
        let misnamed = dir.path().join("test_misnamed.jpg");
        RgbImage::new(6, 4)
            .save_with_format(&misnamed, ImageFormat::Png)
            .unwrap();

        let bytes = std::fs::read(&misnamed).unwrap();
        let result = ImageDecoder::decode_bytes_sync(bytes, &misnamed).unwrap();
        assert_eq!(result.format, ImageFormat::Png);
        assert_eq!((result.width, result.height), (6, 4));
    }

    #[test]
    fn test_garbage_is_a_decode_error() {
        let err = ImageDecoder::decode_bytes_sync(b"not an image".to_vec(), Path::new("x.png"))
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let decoder = ImageDecoder::new(LimitsConfig::default());
        let err = decoder.load(Path::new("/definitely/not/here.png")).await.err().unwrap();
        assert!(matches!(err, PipelineError::Io { .. }));
    }

    #[tokio::test]
    async fn test_dimension_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wide.png");
        RgbImage::new(50, 2).save(&path).unwrap();

        let decoder = ImageDecoder::new(LimitsConfig {
            max_file_size_mb: 1,
            max_image_dimension: 40,
        });
        let err = decoder.load(&path).await.err().unwrap();
        assert!(matches!(err, PipelineError::ImageTooLarge { width: 50, .. }));
    }

    #[tokio::test]
    async fn test_huge_size_limit_does_not_overflow() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.png");
        RgbImage::new(3, 3).save(&path).unwrap();

        let decoder = ImageDecoder::new(LimitsConfig {
            max_file_size_mb: u64::MAX,
            max_image_dimension: 100,
        });
        let bytes = decoder.read(&path).await.unwrap();
        assert_eq!(bytes, std::fs::read(&path).unwrap());
    }
}
