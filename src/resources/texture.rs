//! HDR environment panoramas.

use anyhow::Context as _;

use super::load_binary;

/// An equirectangular environment image in linear float RGBA, top row first.
#[derive(Clone, Debug, PartialEq)]
pub struct Panorama {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<f32>,
}

impl Panorama {
    /// Decodes `.hdr`, `.exr` or any other format `image` knows into linear floats.
    pub fn from_bytes(bytes: &[u8], label: &str) -> anyhow::Result<Self> {
        let image = image::load_from_memory(bytes)
            .with_context(|| format!("could not decode panorama {label}"))?
            .into_rgba32f();
        Ok(Self {
            width: image.width(),
            height: image.height(),
            pixels: image.into_raw(),
        })
    }

    /// A constant-radiance panorama.
    pub fn uniform(width: u32, height: u32, color: [f32; 3]) -> Self {
        let texel = [color[0], color[1], color[2], 1.0];
        Self {
            width,
            height,
            pixels: texel.repeat((width * height) as usize),
        }
    }

    pub fn texel(&self, x: u32, y: u32) -> Option<[f32; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = ((y * self.width + x) * 4) as usize;
        let p = self.pixels.get(i..i + 4)?;
        Some([p[0], p[1], p[2], p[3]])
    }
}

pub async fn load_panorama(file_name: &str) -> anyhow::Result<Panorama> {
    let data = load_binary(file_name).await?;
    let panorama = Panorama::from_bytes(&data, file_name)?;
    log::info!(
        "loaded panorama {file_name} ({}x{})",
        panorama.width,
        panorama.height
    );
    Ok(panorama)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_panorama_texels() {
        let p = Panorama::uniform(4, 2, [0.5, 0.25, 2.0]);
        assert_eq!(p.pixels.len(), 32);
        assert_eq!(p.texel(3, 1), Some([0.5, 0.25, 2.0, 1.0]));
        assert_eq!(p.texel(4, 0), None);
    }

    #[test]
    fn decodes_png_as_linear_floats() {
        let mut png = Vec::new();
        let image = image::RgbaImage::from_pixel(2, 1, image::Rgba([255, 0, 0, 255]));
        image::DynamicImage::ImageRgba8(image)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let p = Panorama::from_bytes(&png, "red").unwrap();
        assert_eq!((p.width, p.height), (2, 1));
        assert_eq!(p.texel(1, 0), Some([1.0, 0.0, 0.0, 1.0]));
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(Panorama::from_bytes(&[1, 2, 3], "junk").is_err());
    }
}
