//! Upload-once caches for scene buffers and textures.
//!
//! Entries are keyed by the document index they were created from and live as long as the
//! cache. There is no eviction.

use std::collections::HashMap;

use wgpu::util::DeviceExt;

use super::{Tracked, states::IndexBinding};
use crate::{
    context::Context,
    data_structures::{
        scene::{self, BufferTarget, ComponentType, Document, SamplerDef},
        texture::Texture,
    },
    error::SceneError,
};

#[derive(Debug, Default)]
pub struct ResourceCache {
    buffers: HashMap<usize, Tracked<wgpu::Buffer>>,
    /// `u8` index accessors widened to `u16`, keyed by accessor.
    widened: HashMap<usize, Tracked<wgpu::Buffer>>,
    textures: HashMap<usize, Texture>,
    white: Option<Texture>,
}

impl ResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The GPU copy of a buffer view, uploaded on first request.
    pub fn buffer(
        &mut self,
        ctx: &Context,
        doc: &Document,
        view: usize,
    ) -> Result<Tracked<wgpu::Buffer>, SceneError> {
        if let Some(buffer) = self.buffers.get(&view) {
            return Ok(buffer.clone());
        }
        let bytes = doc.view_bytes(view)?;
        let usage = match doc.buffer_views[view].target {
            Some(BufferTarget::Vertex) => wgpu::BufferUsages::VERTEX,
            Some(BufferTarget::Index) => wgpu::BufferUsages::INDEX,
            None => wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::INDEX,
        };
        let buffer = Tracked::new(ctx.device.create_buffer_init(
            &wgpu::util::BufferInitDescriptor {
                label: Some(&format!("buffer view {view}")),
                contents: bytes,
                usage: usage | wgpu::BufferUsages::COPY_DST,
            },
        ));
        log::debug!("uploaded buffer view {view} ({} bytes)", bytes.len());
        self.buffers.insert(view, buffer.clone());
        Ok(buffer)
    }

    /// An index buffer binding for an accessor. `u8` indices are widened to `u16` first since
    /// wgpu only draws 16 and 32 bit indices.
    pub fn index_buffer(
        &mut self,
        ctx: &Context,
        doc: &Document,
        accessor: usize,
    ) -> Result<IndexBinding, SceneError> {
        let def = doc
            .accessors
            .get(accessor)
            .ok_or(SceneError::IndexOutOfRange {
                kind: "accessor",
                index: accessor,
                len: doc.accessors.len(),
            })?;
        let view = def
            .buffer_view
            .ok_or(SceneError::MissingBufferView(accessor))?;
        let format = match def.component_type {
            ComponentType::UnsignedShort => wgpu::IndexFormat::Uint16,
            ComponentType::UnsignedInt => wgpu::IndexFormat::Uint32,
            ComponentType::UnsignedByte => {
                return self.widened_indices(ctx, doc, accessor, view);
            }
            _ => return Err(SceneError::UnsupportedIndexType(accessor)),
        };
        Ok(IndexBinding {
            buffer: self.buffer(ctx, doc, view)?,
            format,
            offset: def.byte_offset as u64,
        })
    }

    fn widened_indices(
        &mut self,
        ctx: &Context,
        doc: &Document,
        accessor: usize,
        view: usize,
    ) -> Result<IndexBinding, SceneError> {
        let buffer = match self.widened.get(&accessor) {
            Some(buffer) => buffer.clone(),
            None => {
                let def = &doc.accessors[accessor];
                let bytes = doc.view_bytes(view)?;
                let stride = doc.buffer_views[view].byte_stride.unwrap_or(1);
                let indices = widen_u8(bytes, def.byte_offset, def.count, stride)
                    .ok_or(SceneError::AccessorOutOfBounds(accessor))?;
                let buffer = Tracked::new(ctx.device.create_buffer_init(
                    &wgpu::util::BufferInitDescriptor {
                        label: Some(&format!("widened indices {accessor}")),
                        contents: bytemuck::cast_slice(&indices),
                        usage: wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
                    },
                ));
                self.widened.insert(accessor, buffer.clone());
                buffer
            }
        };
        Ok(IndexBinding {
            buffer,
            format: wgpu::IndexFormat::Uint16,
            offset: 0,
        })
    }

    /// The GPU copy of a document texture with its sampler, uploaded on first request.
    pub fn texture(
        &mut self,
        ctx: &Context,
        doc: &Document,
        texture: usize,
    ) -> Result<&Texture, SceneError> {
        if !self.textures.contains_key(&texture) {
            let def = doc
                .textures
                .get(texture)
                .ok_or(SceneError::IndexOutOfRange {
                    kind: "texture",
                    index: texture,
                    len: doc.textures.len(),
                })?;
            let image = doc.images.get(def.source).ok_or(SceneError::IndexOutOfRange {
                kind: "image",
                index: def.source,
                len: doc.images.len(),
            })?;
            let sampler = def
                .sampler
                .and_then(|s| doc.samplers.get(s).copied())
                .unwrap_or_default();
            let (descriptor, mipmaps) = sampler_descriptor(&sampler);
            let uploaded = Texture::from_rgba8(
                &ctx.device,
                &ctx.queue,
                ctx.states.pixel_store(),
                image,
                &format!("texture {texture}"),
                &descriptor,
                mipmaps,
            );
            log::debug!("uploaded texture {texture} ({}x{})", image.width(), image.height());
            self.textures.insert(texture, uploaded);
        }
        self.textures
            .get(&texture)
            .ok_or(SceneError::IndexOutOfRange {
                kind: "texture",
                index: texture,
                len: doc.textures.len(),
            })
    }

    /// 1×1 white, standing in for absent material textures.
    pub fn white(&mut self, ctx: &Context) -> &Texture {
        self.white
            .get_or_insert_with(|| Texture::white(&ctx.device, &ctx.queue))
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len() + self.widened.len()
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }
}

/// Reads `count` byte indices starting at `offset`, `stride` bytes apart.
pub fn widen_u8(bytes: &[u8], offset: usize, count: usize, stride: usize) -> Option<Vec<u16>> {
    (0..count)
        .map(|i| {
            let at = i.checked_mul(stride)?.checked_add(offset)?;
            bytes.get(at).map(|b| *b as u16)
        })
        .collect()
}

fn address_mode(wrap: u32) -> wgpu::AddressMode {
    match wrap {
        scene::CLAMP_TO_EDGE => wgpu::AddressMode::ClampToEdge,
        scene::MIRRORED_REPEAT => wgpu::AddressMode::MirrorRepeat,
        _ => wgpu::AddressMode::Repeat,
    }
}

/// Maps GL sampler enums onto a wgpu sampler. The flag tells whether the minification
/// filter reads mip levels.
pub fn sampler_descriptor(def: &SamplerDef) -> (wgpu::SamplerDescriptor<'static>, bool) {
    use wgpu::FilterMode::{Linear, Nearest};

    let mag_filter = match def.mag_filter {
        Some(scene::LINEAR) => Linear,
        _ => Nearest,
    };
    let (min_filter, mipmap_filter, mipmaps) = match def.min_filter.unwrap_or(scene::NEAREST) {
        scene::LINEAR => (Linear, Nearest, false),
        scene::NEAREST_MIPMAP_NEAREST => (Nearest, Nearest, true),
        scene::LINEAR_MIPMAP_NEAREST => (Linear, Nearest, true),
        scene::NEAREST_MIPMAP_LINEAR => (Nearest, Linear, true),
        scene::LINEAR_MIPMAP_LINEAR => (Linear, Linear, true),
        _ => (Nearest, Nearest, false),
    };
    let descriptor = wgpu::SamplerDescriptor {
        label: Some("scene sampler"),
        address_mode_u: address_mode(def.wrap_s),
        address_mode_v: address_mode(def.wrap_t),
        address_mode_w: wgpu::AddressMode::Repeat,
        mag_filter,
        min_filter,
        mipmap_filter,
        lod_max_clamp: if mipmaps { 32.0 } else { 0.0 },
        ..Default::default()
    };
    (descriptor, mipmaps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_sampler_is_nearest_repeat() {
        let (desc, mipmaps) = sampler_descriptor(&SamplerDef::default());
        assert_eq!(desc.mag_filter, wgpu::FilterMode::Nearest);
        assert_eq!(desc.min_filter, wgpu::FilterMode::Nearest);
        assert_eq!(desc.address_mode_u, wgpu::AddressMode::Repeat);
        assert!(!mipmaps);
        assert_eq!(desc.lod_max_clamp, 0.0);
    }

    #[test]
    fn trilinear_clamped_sampler() {
        let def = SamplerDef {
            mag_filter: Some(scene::LINEAR),
            min_filter: Some(scene::LINEAR_MIPMAP_LINEAR),
            wrap_s: scene::CLAMP_TO_EDGE,
            wrap_t: scene::MIRRORED_REPEAT,
        };
        let (desc, mipmaps) = sampler_descriptor(&def);
        assert!(mipmaps);
        assert_eq!(desc.min_filter, wgpu::FilterMode::Linear);
        assert_eq!(desc.mipmap_filter, wgpu::FilterMode::Linear);
        assert_eq!(desc.address_mode_u, wgpu::AddressMode::ClampToEdge);
        assert_eq!(desc.address_mode_v, wgpu::AddressMode::MirrorRepeat);
    }

    #[test]
    fn byte_indices_widen() {
        assert_eq!(widen_u8(&[9, 0, 1, 2], 1, 3, 1), Some(vec![0, 1, 2]));
        assert_eq!(widen_u8(&[0, 7, 1, 7, 255], 0, 3, 2), Some(vec![0, 1, 255]));
        assert_eq!(widen_u8(&[0, 1], 0, 3, 1), None);
    }
}
