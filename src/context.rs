//! The explicit GPU context.
//!
//! Owns the device and queue together with every piece of state that draws share: the
//! [`GpuStates`] cache, the [`TextureUnits`] allocator, the uniform arena and the bind groups
//! built over it. Components take the context as a parameter instead of reaching for globals.

use std::{collections::HashMap, num::NonZeroU64, sync::Arc, time::Duration};

use anyhow::Context as _;
use winit::window::Window;

use crate::{
    data_structures::texture::Texture,
    gpu::{
        ResourceId, Tracked,
        frame::{DrawRange, Frame, GroupBinding, GroupResource, PassTarget},
        states::{GpuStates, PassStateCache, ScissorRect},
        units::TextureUnits,
    },
};

const MIN_ARENA_SIZE: u64 = 64 * 1024;

/// What the device can do, queried once at setup.
#[derive(Clone, Copy, Debug)]
pub struct Capabilities {
    pub max_texture_units: u32,
    /// Extended-range format for baked environment maps. Falls back to 8-bit when half floats
    /// cannot be rendered to and filtered.
    pub hdr_format: wgpu::TextureFormat,
    pub uniform_alignment: u32,
}

#[derive(Debug)]
pub(crate) struct SurfaceState {
    pub(crate) window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    depth_texture: Texture,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum EntryKey {
    Uniform(u64),
    Resource(ResourceId),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct BindGroupKey {
    layout: ResourceId,
    entries: Vec<(u32, EntryKey)>,
}

#[derive(Debug)]
pub struct Context {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub capabilities: Capabilities,
    pub states: GpuStates,
    pub units: TextureUnits,
    pub(crate) surface: Option<SurfaceState>,
    arena: wgpu::Buffer,
    bind_groups: HashMap<BindGroupKey, Tracked<wgpu::BindGroup>>,
}

impl Context {
    /// A context presenting to `window`.
    pub async fn new(window: Arc<Window>) -> anyhow::Result<Self> {
        let size = window.inner_size();

        log::info!("WGPU setup");
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            #[cfg(not(target_arch = "wasm32"))]
            backends: wgpu::Backends::PRIMARY,
            #[cfg(target_arch = "wasm32")]
            backends: wgpu::Backends::GL,
            ..Default::default()
        });
        let surface = instance
            .create_surface(window.clone())
            .context("cannot create a surface for the window")?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("no suitable GPU adapter")?;
        let (device, queue) = request_device(&adapter).await?;

        let surface_caps = surface.get_capabilities(&adapter);
        // shaders gamma-encode their output, so the surface must not
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| !f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .context("surface reports no formats")?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: surface_caps.present_modes[0],
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        if size.width > 0 && size.height > 0 {
            surface.configure(&device, &config);
        }
        let depth_texture =
            Texture::create_depth_texture(&device, [config.width, config.height], "depth_texture");

        let surface = SurfaceState {
            window,
            surface,
            config,
            depth_texture,
        };
        Ok(Self::from_parts(&adapter, device, queue, Some(surface)))
    }

    /// A context without a window, for offscreen rendering and tests.
    pub async fn headless() -> anyhow::Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .context("no suitable GPU adapter")?;
        let (device, queue) = request_device(&adapter).await?;
        Ok(Self::from_parts(&adapter, device, queue, None))
    }

    fn from_parts(
        adapter: &wgpu::Adapter,
        device: wgpu::Device,
        queue: wgpu::Queue,
        surface: Option<SurfaceState>,
    ) -> Self {
        let limits = device.limits();
        let half_float = adapter.get_texture_format_features(wgpu::TextureFormat::Rgba16Float);
        let hdr_format = if half_float
            .allowed_usages
            .contains(wgpu::TextureUsages::RENDER_ATTACHMENT)
            && half_float
                .flags
                .contains(wgpu::TextureFormatFeatureFlags::FILTERABLE)
        {
            wgpu::TextureFormat::Rgba16Float
        } else {
            log::warn!("half float render targets unavailable, environment maps are clamped to [0, 1]");
            wgpu::TextureFormat::Rgba8Unorm
        };
        let capabilities = Capabilities {
            max_texture_units: limits.max_sampled_textures_per_shader_stage,
            hdr_format,
            uniform_alignment: limits.min_uniform_buffer_offset_alignment,
        };
        log::info!(
            "max texture units {}, environment format {:?}",
            capabilities.max_texture_units,
            capabilities.hdr_format
        );

        let arena = create_arena(&device, MIN_ARENA_SIZE);
        Self {
            device,
            queue,
            capabilities,
            states: GpuStates::new(),
            units: TextureUnits::new(capabilities.max_texture_units),
            surface,
            arena,
            bind_groups: HashMap::new(),
        }
    }

    pub fn window(&self) -> Option<&Arc<Window>> {
        self.surface.as_ref().map(|s| &s.window)
    }

    pub fn surface_size(&self) -> Option<(u32, u32)> {
        self.surface
            .as_ref()
            .map(|s| (s.config.width, s.config.height))
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        if let Some(s) = self.surface.as_mut() {
            s.config.width = width;
            s.config.height = height;
            s.surface.configure(&self.device, &s.config);
            s.depth_texture =
                Texture::create_depth_texture(&self.device, [width, height], "depth_texture");
        }
    }

    /// The next swapchain image as a pass target. `Ok(None)` when headless.
    pub fn acquire_frame(
        &self,
    ) -> Result<Option<(wgpu::SurfaceTexture, PassTarget)>, wgpu::SurfaceError> {
        let Some(s) = self.surface.as_ref() else {
            return Ok(None);
        };
        let output = s.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let target = PassTarget {
            label: "surface".to_string(),
            color: Tracked::new(view),
            color_format: s.config.format,
            depth: Some((s.depth_texture.view.clone(), Texture::DEPTH_FORMAT)),
            size: (s.config.width, s.config.height),
        };
        Ok(Some((output, target)))
    }

    pub fn new_frame(&self) -> Frame {
        Frame::new(self.capabilities.uniform_alignment)
    }

    /// Uploads the frame's uniform snapshots, replays every recorded pass into one encoder
    /// and submits it.
    pub fn submit(&mut self, frame: Frame) -> wgpu::SubmissionIndex {
        let bytes = frame.uniform_bytes();
        self.ensure_arena(bytes.len() as u64);
        if !bytes.is_empty() {
            self.queue.write_buffer(&self.arena, 0, bytes);
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame encoder"),
            });
        for pass in frame.passes() {
            let target = &pass.target;
            let color_load = match pass.clear {
                Some(clear) => wgpu::LoadOp::Clear(clear.color),
                None => wgpu::LoadOp::Load,
            };
            let depth_load = match pass.clear {
                Some(clear) => wgpu::LoadOp::Clear(clear.depth),
                None => wgpu::LoadOp::Load,
            };
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(target.label.as_str()),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target.color.handle(),
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: color_load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: target.depth.as_ref().map(|(view, _)| {
                    wgpu::RenderPassDepthStencilAttachment {
                        view: view.handle(),
                        depth_ops: Some(wgpu::Operations {
                            load: depth_load,
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    }
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            let full = ScissorRect {
                x: 0,
                y: 0,
                width: target.size.0,
                height: target.size.1,
            };
            let mut cache = PassStateCache::new();
            for draw in &pass.draws {
                cache.set_viewport(&mut render_pass, draw.viewport);
                cache.set_scissor(&mut render_pass, draw.scissor.unwrap_or(full));
                cache.set_pipeline(&mut render_pass, &draw.pipeline);
                for (index, group) in draw.groups.iter().enumerate() {
                    let bind_group = self.bind_group(group);
                    cache.set_bind_group(
                        &mut render_pass,
                        index as u32,
                        &bind_group,
                        &group.dynamic_offsets,
                    );
                }
                for (slot, (buffer, offset)) in draw.vertex_buffers.iter().enumerate() {
                    cache.set_vertex_buffer(&mut render_pass, slot as u32, buffer, *offset);
                }
                if let Some((buffer, format, offset)) = &draw.index {
                    cache.set_index_buffer(&mut render_pass, buffer, *format, *offset);
                }
                cache.set_blend_constant(&mut render_pass, draw.blend_constant);
                cache.set_stencil_reference(&mut render_pass, draw.stencil_reference);
                match draw.range {
                    DrawRange::Indexed {
                        first_index,
                        count,
                        base_vertex,
                    } => render_pass.draw_indexed(first_index..first_index + count, base_vertex, 0..1),
                    DrawRange::Arrays { first, count } => render_pass.draw(first..first + count, 0..1),
                }
            }
        }
        self.queue.submit(std::iter::once(encoder.finish()))
    }

    fn ensure_arena(&mut self, needed: u64) {
        if needed <= self.arena.size() {
            return;
        }
        let size = needed.next_power_of_two().max(MIN_ARENA_SIZE);
        log::debug!("growing uniform arena to {size} bytes");
        self.arena = create_arena(&self.device, size);
        // every cached group points at the old buffer
        self.bind_groups.clear();
    }

    fn bind_group(&mut self, group: &GroupBinding) -> Tracked<wgpu::BindGroup> {
        let key = BindGroupKey {
            layout: group.layout.id(),
            entries: group
                .entries
                .iter()
                .map(|(binding, resource)| {
                    let entry = match resource {
                        GroupResource::Uniform { size } => EntryKey::Uniform(*size),
                        GroupResource::Texture(view) => EntryKey::Resource(view.id()),
                        GroupResource::Sampler(sampler) => EntryKey::Resource(sampler.id()),
                    };
                    (*binding, entry)
                })
                .collect(),
        };
        if let Some(found) = self.bind_groups.get(&key) {
            return found.clone();
        }

        let entries: Vec<wgpu::BindGroupEntry> = group
            .entries
            .iter()
            .map(|(binding, resource)| wgpu::BindGroupEntry {
                binding: *binding,
                resource: match resource {
                    GroupResource::Uniform { size } => {
                        wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                            buffer: &self.arena,
                            offset: 0,
                            size: NonZeroU64::new(*size),
                        })
                    }
                    GroupResource::Texture(view) => wgpu::BindingResource::TextureView(view),
                    GroupResource::Sampler(sampler) => wgpu::BindingResource::Sampler(sampler),
                },
            })
            .collect();
        let bind_group = Tracked::new(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("draw bind group"),
            layout: group.layout.handle(),
            entries: &entries,
        }));
        self.bind_groups.insert(key, bind_group.clone());
        bind_group
    }

    /// Copies one layer of a texture back to the CPU. Rows are tightly packed up to the
    /// pack alignment.
    pub async fn read_texture(
        &self,
        texture: &wgpu::Texture,
        layer: u32,
    ) -> anyhow::Result<Vec<u8>> {
        let (width, height) = (texture.width(), texture.height());
        let texel = texture
            .format()
            .block_copy_size(None)
            .context("texture format cannot be copied")?;
        let row = width * texel;
        let padded_row = row.next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback buffer"),
            size: (padded_row * height) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: 0,
                    y: 0,
                    z: layer,
                },
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
        let slice = buffer.slice(..);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            tx.send(result).ok();
        });
        self.device.poll(wgpu::PollType::Wait {
            submission_index: None,
            timeout: Some(Duration::from_secs(3)),
        })?;
        rx.receive()
            .await
            .context("readback mapping was dropped")??;

        let pack = self.states.pixel_store().pack_alignment.max(1) as usize;
        let out_row = (row as usize).next_multiple_of(pack);
        let mut out = Vec::with_capacity(out_row * height as usize);
        {
            let data = slice.get_mapped_range();
            for y in 0..height as usize {
                let start = y * padded_row as usize;
                out.extend_from_slice(&data[start..start + row as usize]);
                out.resize(out.len() + out_row - row as usize, 0);
            }
        }
        buffer.unmap();
        Ok(out)
    }
}

async fn request_device(adapter: &wgpu::Adapter) -> anyhow::Result<(wgpu::Device, wgpu::Queue)> {
    log::info!("device and queue");
    let device = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: None,
            required_features: wgpu::Features::empty(),
            // WebGL doesn't support all of wgpu's features, so if
            // we're building for the web we'll have to disable some.
            required_limits: if cfg!(target_arch = "wasm32") {
                wgpu::Limits::downlevel_webgl2_defaults()
            } else {
                wgpu::Limits::default()
            },
            memory_hints: Default::default(),
            ..Default::default()
        })
        .await
        .context("cannot open the GPU device")?;
    Ok(device)
}

fn create_arena(device: &wgpu::Device, size: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("uniform arena"),
        size,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}
