//! GPU textures and texture creation utilities.
//!
//! [`Texture`] bundles a texture with a tracked view and sampler so it can be handed to a
//! sampler uniform directly. [`CubeTexture`] adds one render-target view per face for the
//! bake passes.

use half::f16;
use image::{RgbaImage, imageops::FilterType};

use crate::gpu::{Tracked, states::{PixelStore, TextureBinding}};
use crate::resources::texture::Panorama;

#[derive(Clone, Debug)]
pub struct Texture {
    pub texture: wgpu::Texture,
    pub view: Tracked<wgpu::TextureView>,
    pub sampler: Tracked<wgpu::Sampler>,
    pub dimension: wgpu::TextureViewDimension,
    pub format: wgpu::TextureFormat,
}

/// Face order matches cube array layers: +X, -X, +Y, -Y, +Z, -Z.
#[derive(Clone, Debug)]
pub struct CubeTexture {
    pub texture: Texture,
    pub faces: Vec<Tracked<wgpu::TextureView>>,
    pub size: u32,
}

impl Texture {
    /// Standard depth buffer texture format (32-bit float).
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    pub fn binding(&self) -> TextureBinding {
        TextureBinding {
            view: self.view.clone(),
            sampler: self.sampler.clone(),
            dimension: self.dimension,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.texture.width(), self.texture.height())
    }

    /// Create a depth texture for depth-testing during rendering.
    ///
    /// `size` is clamped to at least 1×1 so a minimised window still gets a valid attachment.
    pub fn create_depth_texture(device: &wgpu::Device, size: [u32; 2], label: &str) -> Self {
        let size = wgpu::Extent3d {
            width: size[0].max(1),
            height: size[1].max(1),
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[Self::DEPTH_FORMAT],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            compare: Some(wgpu::CompareFunction::LessEqual),
            lod_max_clamp: 100.0,
            ..Default::default()
        });

        Self {
            texture,
            view: Tracked::new(view),
            sampler: Tracked::new(sampler),
            dimension: wgpu::TextureViewDimension::D2,
            format: Self::DEPTH_FORMAT,
        }
    }

    /// An offscreen color target that can be sampled and read back.
    pub fn create_render_target(
        device: &wgpu::Device,
        size: [u32; 2],
        format: wgpu::TextureFormat,
        label: &str,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size[0].max(1),
                height: size[1].max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view: Tracked::new(view),
            sampler: Tracked::new(device.create_sampler(&clamped_linear_sampler())),
            dimension: wgpu::TextureViewDimension::D2,
            format,
        }
    }

    /// 1×1 opaque white, bound where a material has no texture.
    pub fn white(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let image = RgbaImage::from_pixel(1, 1, image::Rgba([255, 255, 255, 255]));
        Self::from_rgba8(
            device,
            queue,
            PixelStore::default(),
            &image,
            "white",
            &wgpu::SamplerDescriptor::default(),
            false,
        )
    }

    /// Uploads an 8-bit RGBA image. The data stays in its storage encoding; shaders
    /// linearize base colors themselves. With `mipmaps` a full chain is built on the CPU.
    pub fn from_rgba8(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        unpack: PixelStore,
        image: &RgbaImage,
        label: &str,
        sampler: &wgpu::SamplerDescriptor,
        mipmaps: bool,
    ) -> Self {
        let (width, height) = image.dimensions();
        let mip_level_count = if mipmaps { mip_count(width, height) } else { 1 };
        let format = wgpu::TextureFormat::Rgba8Unorm;
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        let base = if unpack.unpack_flip_y {
            image::imageops::flip_vertical(image)
        } else {
            image.clone()
        };
        let mut level = base;
        for mip_level in 0..mip_level_count {
            let (w, h) = level.dimensions();
            queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    aspect: wgpu::TextureAspect::All,
                    texture: &texture,
                    mip_level,
                    origin: wgpu::Origin3d::ZERO,
                },
                &level,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(4 * w),
                    rows_per_image: Some(h),
                },
                wgpu::Extent3d {
                    width: w,
                    height: h,
                    depth_or_array_layers: 1,
                },
            );
            if mip_level + 1 < mip_level_count {
                level = image::imageops::resize(
                    &level,
                    (w / 2).max(1),
                    (h / 2).max(1),
                    FilterType::Triangle,
                );
            }
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view: Tracked::new(view),
            sampler: Tracked::new(device.create_sampler(sampler)),
            dimension: wgpu::TextureViewDimension::D2,
            format,
        }
    }

    /// Uploads a float panorama as half floats so values above 1 survive.
    pub fn from_panorama(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        unpack: PixelStore,
        panorama: &Panorama,
        format: wgpu::TextureFormat,
    ) -> Self {
        let (width, height) = (panorama.width, panorama.height);
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("panorama"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        let row = width as usize * 4;
        let rows: Vec<&[f32]> = if unpack.unpack_flip_y {
            panorama.pixels.chunks(row).rev().collect()
        } else {
            panorama.pixels.chunks(row).collect()
        };
        let (data, bytes_per_texel) = if format == wgpu::TextureFormat::Rgba16Float {
            let halves: Vec<f16> = rows
                .iter()
                .flat_map(|r| r.iter().map(|v| f16::from_f32(*v)))
                .collect();
            (bytemuck::cast_slice(&halves).to_vec(), 8)
        } else {
            let bytes: Vec<u8> = rows
                .iter()
                .flat_map(|r| r.iter().map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8))
                .collect();
            (bytes, 4)
        };

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
            },
            &data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_texel * width),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view: Tracked::new(view),
            sampler: Tracked::new(device.create_sampler(&clamped_linear_sampler())),
            dimension: wgpu::TextureViewDimension::D2,
            format,
        }
    }
}

impl CubeTexture {
    pub fn new(device: &wgpu::Device, size: u32, format: wgpu::TextureFormat, label: &str) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 6,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(label),
            dimension: Some(wgpu::TextureViewDimension::Cube),
            array_layer_count: Some(6),
            ..Default::default()
        });
        let faces = (0..6)
            .map(|layer| {
                Tracked::new(texture.create_view(&wgpu::TextureViewDescriptor {
                    label: Some(label),
                    dimension: Some(wgpu::TextureViewDimension::D2),
                    base_array_layer: layer,
                    array_layer_count: Some(1),
                    ..Default::default()
                }))
            })
            .collect();

        Self {
            texture: Texture {
                texture,
                view: Tracked::new(view),
                sampler: Tracked::new(device.create_sampler(&clamped_linear_sampler())),
                dimension: wgpu::TextureViewDimension::Cube,
                format,
            },
            faces,
            size,
        }
    }
}

pub fn mip_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

fn clamped_linear_sampler() -> wgpu::SamplerDescriptor<'static> {
    wgpu::SamplerDescriptor {
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    }
}
