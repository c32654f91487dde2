use std::path::Path;

use super::TextureError;

/// Decoded RGBA8 pixels with tightly packed rows.
#[derive(Clone)]
pub struct CpuTexture {
    width: u32,
    height: u32,
    data: Vec<u8>,
    label: Option<String>,
}

impl CpuTexture {
    /// Bytes per RGBA8 texel.
    pub const BYTES_PER_PIXEL: u32 = 4;

    /// Decode an image file from disk.
    ///
    /// Any format enabled in the `image` crate is accepted; the pixels are
    /// converted to RGBA8. The file name becomes the texture's label.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TextureError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| TextureError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let texture = Self::from_memory(&bytes)?;
        log::debug!(
            "Decoded texture {} ({}x{})",
            path.display(),
            texture.width,
            texture.height
        );
        let label = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        Ok(Self { label, ..texture })
    }

    /// Decode an encoded image held in memory.
    pub fn from_memory(bytes: &[u8]) -> Result<Self, TextureError> {
        let rgba = image::load_from_memory(bytes)?.to_rgba8();
        let (width, height) = rgba.dimensions();
        Self::from_rgba8(width, height, rgba.into_raw())
    }

    /// Wrap already-decoded RGBA8 pixels.
    pub fn from_rgba8(width: u32, height: u32, data: Vec<u8>) -> Result<Self, TextureError> {
        if width == 0 || height == 0 {
            return Err(TextureError::EmptyImage);
        }
        let expected = width as usize * height as usize * Self::BYTES_PER_PIXEL as usize;
        if data.len() != expected {
            return Err(TextureError::InvalidData {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
            label: None,
        })
    }

    /// Set a debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Bytes in one tightly packed row.
    pub fn row_pitch(&self) -> u32 {
        self.width * Self::BYTES_PER_PIXEL
    }

    /// Pixel rows, top to bottom.
    pub fn rows(&self) -> impl Iterator<Item = &[u8]> {
        self.data.chunks_exact(self.row_pitch() as usize)
    }
}

impl std::fmt::Debug for CpuTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpuTexture")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .field("label", &self.label)
            .finish()
    }
}
