//! Perceptual hashing and the resize step that precedes a hash request.

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use image_hasher::{HashAlg, HasherConfig};
use std::io::Cursor;

/// Computes 64-bit perceptual hashes.
///
/// The underlying hasher is pre-configured and cached to avoid re-allocating
/// the same `HasherConfig` for every image.
pub struct Hasher {
    phash_hasher: image_hasher::Hasher,
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher {
    /// DCT-based mean hash over an 8x8 grid, which yields exactly 64 bits.
    pub fn new() -> Self {
        let phash_hasher = HasherConfig::new()
            .hash_alg(HashAlg::Mean)
            .preproc_dct()
            .hash_size(8, 8)
            .to_hasher();
        Self { phash_hasher }
    }

    /// Perceptual hash of `image`. Similar images have a small Hamming distance.
    pub fn perceptual_hash(&self, image: &DynamicImage) -> u64 {
        let hash = self.phash_hasher.hash_image(image);
        let bytes = hash.as_bytes();

        let mut raw = [0u8; 8];
        let n = bytes.len().min(raw.len());
        raw[..n].copy_from_slice(&bytes[..n]);
        u64::from_be_bytes(raw)
    }

    /// Hash an encoded image, as received in a hash request.
    pub fn hash_encoded(&self, bytes: &[u8]) -> image::ImageResult<u64> {
        let image = image::load_from_memory(bytes)?;
        Ok(self.perceptual_hash(&image))
    }

    /// Number of differing bits between two hashes.
    pub fn distance(a: u64, b: u64) -> u32 {
        (a ^ b).count_ones()
    }
}

/// Scale `image` to a `dimension`-sized square and encode it as PNG.
///
/// This is what travels in a hash request: small enough to be cheap on the
/// wire, large enough for the hash to be stable.
pub fn resize_for_hashing(image: &DynamicImage, dimension: u32) -> image::ImageResult<Vec<u8>> {
    let resized = image.resize_exact(dimension, dimension, FilterType::Triangle);

    let mut buffer = Cursor::new(Vec::new());
    resized.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}
