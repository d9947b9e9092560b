// External data the renderer consumes: decoded texture pixels and compiled
// SPIR-V bytecode.

use anyhow::{Context, Result};
use std::io::Cursor;
use std::path::Path;

/// Tightly packed 8-bit RGBA pixels
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    /// Size a tightly packed RGBA8 image of these dimensions must have
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

/// Decode an image file into RGBA8.
///
/// A missing or undecodable file is not an error here: it is logged and the
/// caller carries on without a texture.
pub fn load_rgba(path: &Path) -> Option<DecodedImage> {
    let decoded = match image::open(path) {
        Ok(image) => image.to_rgba8(),
        Err(e) => {
            log::warn!("Could not decode texture {:?}: {}", path, e);
            return None;
        }
    };

    let (width, height) = decoded.dimensions();
    log::info!("Decoded texture {:?}: {}x{}", path, width, height);

    Some(DecodedImage {
        width,
        height,
        pixels: decoded.into_raw(),
    })
}

/// Read a compiled SPIR-V file as 32-bit words
pub fn read_spirv(path: &Path) -> Result<Vec<u32>> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read shader file: {:?}", path))?;

    ash::util::read_spv(&mut Cursor::new(bytes))
        .with_context(|| format!("Invalid SPIR-V in {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonexistent_texture_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_rgba(&dir.path().join("missing.png")).is_none());
    }

    #[test]
    fn corrupt_texture_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.png");
        std::fs::write(&path, b"definitely not a png").unwrap();

        assert!(load_rgba(&path).is_none());
    }

    #[test]
    fn texture_is_expanded_to_rgba() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checker.png");
        let rgb = image::RgbImage::from_fn(3, 2, |x, y| {
            if (x + y) % 2 == 0 {
                image::Rgb([255, 255, 255])
            } else {
                image::Rgb([0, 0, 0])
            }
        });
        rgb.save(&path).unwrap();

        let decoded = load_rgba(&path).unwrap();
        assert_eq!((decoded.width, decoded.height), (3, 2));
        assert_eq!(decoded.byte_len(), 3 * 2 * 4);
        assert_eq!(&decoded.pixels[..4], &[255, 255, 255, 255]);
        assert_eq!(&decoded.pixels[4..8], &[0, 0, 0, 255]);
    }

    #[test]
    fn spirv_words_are_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shader.spv");
        // Magic number followed by a single word
        let words: [u32; 2] = [0x0723_0203, 0x0001_0000];
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        std::fs::write(&path, bytes).unwrap();

        assert_eq!(read_spirv(&path).unwrap(), words.to_vec());
    }

    #[test]
    fn missing_shader_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_spirv(&dir.path().join("nope.spv")).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to read shader file"));
    }

    #[test]
    fn truncated_shader_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.spv");
        std::fs::write(&path, [0x03, 0x02, 0x23]).unwrap();

        assert!(read_spirv(&path).is_err());
    }
}
