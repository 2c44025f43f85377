use std::path::Path;

use anyhow::Context;

use crate::foundation::error::{FramecutError, FramecutResult};
use crate::picture::{BitDepth, Picture};

impl Picture {
    /// Decode an encoded still image. 16-bit sources keep their depth; everything else is 8-bit.
    pub fn decode(bytes: &[u8]) -> FramecutResult<Self> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| FramecutError::decode(format!("decode image from memory: {e}")))?;
        let deep = matches!(
            img,
            image::DynamicImage::ImageLuma16(_)
                | image::DynamicImage::ImageLumaA16(_)
                | image::DynamicImage::ImageRgb16(_)
                | image::DynamicImage::ImageRgba16(_)
        );
        if deep {
            let rgba = img.to_rgba16();
            let (w, h) = rgba.dimensions();
            Self::from_rgba16(w, h, rgba.as_raw())
        } else {
            let rgba = img.to_rgba8();
            let (w, h) = rgba.dimensions();
            Self::from_rgba8(w, h, rgba.as_raw())
        }
    }

    /// Read and decode an image file.
    pub fn load(path: &Path) -> FramecutResult<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("read image '{}'", path.display()))?;
        Self::decode(&bytes)
            .map(|p| p.with_step(format!("load {}", path.display())))
    }

    /// Write the picture as RGBA PNG at its own bit depth.
    pub fn save_png(&self, path: &Path) -> FramecutResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create output dir '{}'", parent.display()))?;
        }
        match self.bit_depth() {
            BitDepth::Eight => image::save_buffer_with_format(
                path,
                &self.to_rgba8(),
                self.width(),
                self.height(),
                image::ColorType::Rgba8,
                image::ImageFormat::Png,
            )
            .with_context(|| format!("write png '{}'", path.display()))?,
            BitDepth::Sixteen => {
                let buf = image::ImageBuffer::<image::Rgba<u16>, Vec<u16>>::from_raw(
                    self.width(),
                    self.height(),
                    self.to_rgba16(),
                )
                .ok_or_else(|| FramecutError::evaluation("rgba16 buffer size mismatch"))?;
                buf.save_with_format(path, image::ImageFormat::Png)
                    .with_context(|| format!("write png '{}'", path.display()))?;
            }
        }
        Ok(())
    }
}
