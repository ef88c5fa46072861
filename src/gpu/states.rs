//! Cached pipeline state.
//!
//! [`GpuStates`] lives in the context and holds everything a draw inherits from the last
//! setter call. Fixed-function state that wgpu bakes into pipelines ends up in [`RasterState`],
//! which keys the pipeline cache. Dynamic pass state is replayed through [`PassStateCache`],
//! which records a command only when the value differs from what the pass already has.

use super::{ResourceId, Tracked};

fn update<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    pub fn full(size: (u32, u32)) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: size.0 as f32,
            height: size.1 as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScissorRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// State that wgpu compiles into a render pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RasterState {
    pub depth_test: bool,
    pub depth_func: wgpu::CompareFunction,
    pub depth_write: bool,
    pub cull_face: bool,
    pub cull_mode: wgpu::Face,
    pub front_face: wgpu::FrontFace,
    pub blend: Option<wgpu::BlendState>,
    pub color_write: wgpu::ColorWrites,
    pub depth_bias: wgpu::DepthBiasState,
}

impl Default for RasterState {
    fn default() -> Self {
        Self {
            depth_test: false,
            depth_func: wgpu::CompareFunction::Less,
            depth_write: true,
            cull_face: false,
            cull_mode: wgpu::Face::Back,
            front_face: wgpu::FrontFace::Ccw,
            blend: None,
            color_write: wgpu::ColorWrites::ALL,
            depth_bias: wgpu::DepthBiasState::default(),
        }
    }
}

impl RasterState {
    pub fn cull(&self) -> Option<wgpu::Face> {
        self.cull_face.then_some(self.cull_mode)
    }

    pub fn depth_stencil(&self, format: wgpu::TextureFormat) -> wgpu::DepthStencilState {
        wgpu::DepthStencilState {
            format,
            depth_write_enabled: self.depth_test && self.depth_write,
            depth_compare: if self.depth_test {
                self.depth_func
            } else {
                wgpu::CompareFunction::Always
            },
            stencil: wgpu::StencilState::default(),
            bias: self.depth_bias,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelStore {
    pub pack_alignment: u32,
    pub unpack_alignment: u32,
    pub unpack_flip_y: bool,
}

impl Default for PixelStore {
    fn default() -> Self {
        Self {
            pack_alignment: 4,
            unpack_alignment: 4,
            unpack_flip_y: false,
        }
    }
}

/// The bound element array: buffer, index type and the byte offset of the first index.
#[derive(Clone, Debug, PartialEq)]
pub struct IndexBinding {
    pub buffer: Tracked<wgpu::Buffer>,
    pub format: wgpu::IndexFormat,
    pub offset: u64,
}

/// What a texture unit holds: the view and its sampler.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureBinding {
    pub view: Tracked<wgpu::TextureView>,
    pub sampler: Tracked<wgpu::Sampler>,
    pub dimension: wgpu::TextureViewDimension,
}

#[derive(Debug)]
pub struct GpuStates {
    clear_color: wgpu::Color,
    clear_depth: f32,
    clear_stencil: u32,
    raster: RasterState,
    viewport: Option<Viewport>,
    depth_range: (f32, f32),
    scissor_test: bool,
    scissor: ScissorRect,
    pixel_store: PixelStore,
    program: Option<ResourceId>,
    active_texture: u32,
    textures: Vec<Option<TextureBinding>>,
    array_buffer: Option<ResourceId>,
    index_buffer: Option<IndexBinding>,
    blend_constant: wgpu::Color,
    stencil_reference: u32,
}

impl Default for GpuStates {
    fn default() -> Self {
        Self {
            clear_color: wgpu::Color::TRANSPARENT,
            clear_depth: 1.0,
            clear_stencil: 0,
            raster: RasterState::default(),
            viewport: None,
            depth_range: (0.0, 1.0),
            scissor_test: false,
            scissor: ScissorRect {
                x: 0,
                y: 0,
                width: 0,
                height: 0,
            },
            pixel_store: PixelStore::default(),
            program: None,
            active_texture: 0,
            textures: Vec::new(),
            array_buffer: None,
            index_buffer: None,
            blend_constant: wgpu::Color::TRANSPARENT,
            stencil_reference: 0,
        }
    }
}

impl GpuStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_clear_color(&mut self, color: wgpu::Color) -> bool {
        update(&mut self.clear_color, color)
    }

    pub fn set_clear_depth(&mut self, depth: f32) -> bool {
        update(&mut self.clear_depth, depth)
    }

    pub fn set_clear_stencil(&mut self, stencil: u32) -> bool {
        update(&mut self.clear_stencil, stencil)
    }

    pub fn clear_color(&self) -> wgpu::Color {
        self.clear_color
    }

    pub fn clear_depth(&self) -> f32 {
        self.clear_depth
    }

    pub fn clear_stencil(&self) -> u32 {
        self.clear_stencil
    }

    pub fn set_viewport(&mut self, x: f32, y: f32, width: f32, height: f32) -> bool {
        let (min_depth, max_depth) = self.depth_range;
        update(
            &mut self.viewport,
            Some(Viewport {
                x,
                y,
                width,
                height,
                min_depth,
                max_depth,
            }),
        )
    }

    /// Back to covering the whole target of whichever pass the next draw lands in.
    pub fn reset_viewport(&mut self) -> bool {
        update(&mut self.viewport, None)
    }

    pub fn set_depth_range(&mut self, near: f32, far: f32) -> bool {
        let changed = update(&mut self.depth_range, (near, far));
        if let Some(viewport) = self.viewport.as_mut() {
            viewport.min_depth = near;
            viewport.max_depth = far;
        }
        changed
    }

    pub fn viewport_for(&self, target_size: (u32, u32)) -> Viewport {
        self.viewport.unwrap_or_else(|| {
            let (min_depth, max_depth) = self.depth_range;
            Viewport {
                min_depth,
                max_depth,
                ..Viewport::full(target_size)
            }
        })
    }

    pub fn set_depth_test(&mut self, enabled: bool) -> bool {
        update(&mut self.raster.depth_test, enabled)
    }

    pub fn set_depth_func(&mut self, func: wgpu::CompareFunction) -> bool {
        update(&mut self.raster.depth_func, func)
    }

    pub fn set_depth_mask(&mut self, write: bool) -> bool {
        update(&mut self.raster.depth_write, write)
    }

    pub fn set_cull_face(&mut self, enabled: bool) -> bool {
        update(&mut self.raster.cull_face, enabled)
    }

    pub fn set_cull_mode(&mut self, face: wgpu::Face) -> bool {
        update(&mut self.raster.cull_mode, face)
    }

    pub fn set_front_face(&mut self, front_face: wgpu::FrontFace) -> bool {
        update(&mut self.raster.front_face, front_face)
    }

    pub fn set_blend(&mut self, blend: Option<wgpu::BlendState>) -> bool {
        update(&mut self.raster.blend, blend)
    }

    pub fn set_color_mask(&mut self, mask: wgpu::ColorWrites) -> bool {
        update(&mut self.raster.color_write, mask)
    }

    pub fn set_polygon_offset(&mut self, factor: f32, units: i32) -> bool {
        update(
            &mut self.raster.depth_bias,
            wgpu::DepthBiasState {
                constant: units,
                slope_scale: factor,
                clamp: 0.0,
            },
        )
    }

    pub fn raster(&self) -> RasterState {
        self.raster
    }

    /// Replaces all pipeline-baked state at once, e.g. to restore a saved copy.
    pub fn set_raster(&mut self, raster: RasterState) -> bool {
        update(&mut self.raster, raster)
    }

    pub fn set_scissor_test(&mut self, enabled: bool) -> bool {
        update(&mut self.scissor_test, enabled)
    }

    pub fn set_scissor(&mut self, x: u32, y: u32, width: u32, height: u32) -> bool {
        update(
            &mut self.scissor,
            ScissorRect {
                x,
                y,
                width,
                height,
            },
        )
    }

    /// The scissor box when the test is on, clamped to the target.
    pub fn scissor_for(&self, target_size: (u32, u32)) -> Option<ScissorRect> {
        if !self.scissor_test {
            return None;
        }
        let x = self.scissor.x.min(target_size.0);
        let y = self.scissor.y.min(target_size.1);
        Some(ScissorRect {
            x,
            y,
            width: self.scissor.width.min(target_size.0 - x),
            height: self.scissor.height.min(target_size.1 - y),
        })
    }

    pub fn set_pack_alignment(&mut self, alignment: u32) -> bool {
        update(&mut self.pixel_store.pack_alignment, alignment)
    }

    pub fn set_unpack_alignment(&mut self, alignment: u32) -> bool {
        update(&mut self.pixel_store.unpack_alignment, alignment)
    }

    pub fn set_unpack_flip_y(&mut self, flip: bool) -> bool {
        update(&mut self.pixel_store.unpack_flip_y, flip)
    }

    pub fn pixel_store(&self) -> PixelStore {
        self.pixel_store
    }

    pub fn use_program(&mut self, program: Option<ResourceId>) -> bool {
        update(&mut self.program, program)
    }

    pub fn program(&self) -> Option<ResourceId> {
        self.program
    }

    pub fn active_texture(&mut self, unit: u32) -> bool {
        update(&mut self.active_texture, unit)
    }

    pub fn active_unit(&self) -> u32 {
        self.active_texture
    }

    /// Binds to the active unit.
    pub fn bind_texture(&mut self, binding: TextureBinding) -> bool {
        let unit = self.active_texture as usize;
        if self.textures.len() <= unit {
            self.textures.resize(unit + 1, None);
        }
        update(&mut self.textures[unit], Some(binding))
    }

    pub fn texture_unit(&self, unit: u32) -> Option<&TextureBinding> {
        self.textures.get(unit as usize).and_then(Option::as_ref)
    }

    pub fn bind_array_buffer(&mut self, buffer: Option<ResourceId>) -> bool {
        update(&mut self.array_buffer, buffer)
    }

    pub fn array_buffer(&self) -> Option<ResourceId> {
        self.array_buffer
    }

    pub fn bind_index_buffer(&mut self, binding: Option<IndexBinding>) -> bool {
        update(&mut self.index_buffer, binding)
    }

    pub fn index_buffer(&self) -> Option<&IndexBinding> {
        self.index_buffer.as_ref()
    }

    pub fn set_blend_constant(&mut self, color: wgpu::Color) -> bool {
        update(&mut self.blend_constant, color)
    }

    pub fn blend_constant(&self) -> wgpu::Color {
        self.blend_constant
    }

    pub fn set_stencil_reference(&mut self, reference: u32) -> bool {
        update(&mut self.stencil_reference, reference)
    }

    pub fn stencil_reference(&self) -> u32 {
        self.stencil_reference
    }
}

/// The subset of a render pass the replay loop drives.
pub trait PassEncoder {
    type Pipeline;
    type BindGroup;
    type Buffer;

    fn viewport(&mut self, viewport: &Viewport);
    fn scissor(&mut self, rect: &ScissorRect);
    fn pipeline(&mut self, pipeline: &Self::Pipeline);
    fn bind_group(&mut self, index: u32, group: &Self::BindGroup, offsets: &[u32]);
    fn vertex_buffer(&mut self, slot: u32, buffer: &Self::Buffer, offset: u64);
    fn index_buffer(&mut self, buffer: &Self::Buffer, format: wgpu::IndexFormat, offset: u64);
    fn blend_constant(&mut self, color: wgpu::Color);
    fn stencil_reference(&mut self, reference: u32);
}

impl PassEncoder for wgpu::RenderPass<'_> {
    type Pipeline = wgpu::RenderPipeline;
    type BindGroup = wgpu::BindGroup;
    type Buffer = wgpu::Buffer;

    fn viewport(&mut self, v: &Viewport) {
        self.set_viewport(v.x, v.y, v.width, v.height, v.min_depth, v.max_depth);
    }

    fn scissor(&mut self, rect: &ScissorRect) {
        self.set_scissor_rect(rect.x, rect.y, rect.width, rect.height);
    }

    fn pipeline(&mut self, pipeline: &wgpu::RenderPipeline) {
        self.set_pipeline(pipeline);
    }

    fn bind_group(&mut self, index: u32, group: &wgpu::BindGroup, offsets: &[u32]) {
        self.set_bind_group(index, group, offsets);
    }

    fn vertex_buffer(&mut self, slot: u32, buffer: &wgpu::Buffer, offset: u64) {
        self.set_vertex_buffer(slot, buffer.slice(offset..));
    }

    fn index_buffer(&mut self, buffer: &wgpu::Buffer, format: wgpu::IndexFormat, offset: u64) {
        self.set_index_buffer(buffer.slice(offset..), format);
    }

    fn blend_constant(&mut self, color: wgpu::Color) {
        self.set_blend_constant(color);
    }

    fn stencil_reference(&mut self, reference: u32) {
        self.set_stencil_reference(reference);
    }
}

/// Last values recorded into one pass. A fresh cache is used for every pass.
#[derive(Debug, Default)]
pub struct PassStateCache {
    viewport: Option<Viewport>,
    scissor: Option<ScissorRect>,
    pipeline: Option<ResourceId>,
    bind_groups: Vec<Option<(ResourceId, Vec<u32>)>>,
    vertex_buffers: Vec<Option<(ResourceId, u64)>>,
    index_buffer: Option<(ResourceId, wgpu::IndexFormat, u64)>,
    blend_constant: Option<wgpu::Color>,
    stencil_reference: Option<u32>,
}

impl PassStateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_viewport<E: PassEncoder>(&mut self, encoder: &mut E, viewport: Viewport) {
        if update(&mut self.viewport, Some(viewport)) {
            encoder.viewport(&viewport);
        }
    }

    pub fn set_scissor<E: PassEncoder>(&mut self, encoder: &mut E, rect: ScissorRect) {
        if update(&mut self.scissor, Some(rect)) {
            encoder.scissor(&rect);
        }
    }

    pub fn set_pipeline<E: PassEncoder>(
        &mut self,
        encoder: &mut E,
        pipeline: &Tracked<E::Pipeline>,
    ) {
        if update(&mut self.pipeline, Some(pipeline.id())) {
            encoder.pipeline(pipeline);
        }
    }

    pub fn set_bind_group<E: PassEncoder>(
        &mut self,
        encoder: &mut E,
        index: u32,
        group: &Tracked<E::BindGroup>,
        offsets: &[u32],
    ) {
        let slot = index as usize;
        if self.bind_groups.len() <= slot {
            self.bind_groups.resize(slot + 1, None);
        }
        let current = &mut self.bind_groups[slot];
        let same = matches!(current, Some((id, o)) if *id == group.id() && o.as_slice() == offsets);
        if !same {
            *current = Some((group.id(), offsets.to_vec()));
            encoder.bind_group(index, group, offsets);
        }
    }

    pub fn set_vertex_buffer<E: PassEncoder>(
        &mut self,
        encoder: &mut E,
        slot: u32,
        buffer: &Tracked<E::Buffer>,
        offset: u64,
    ) {
        let index = slot as usize;
        if self.vertex_buffers.len() <= index {
            self.vertex_buffers.resize(index + 1, None);
        }
        if update(&mut self.vertex_buffers[index], Some((buffer.id(), offset))) {
            encoder.vertex_buffer(slot, buffer, offset);
        }
    }

    pub fn set_index_buffer<E: PassEncoder>(
        &mut self,
        encoder: &mut E,
        buffer: &Tracked<E::Buffer>,
        format: wgpu::IndexFormat,
        offset: u64,
    ) {
        if update(&mut self.index_buffer, Some((buffer.id(), format, offset))) {
            encoder.index_buffer(buffer, format, offset);
        }
    }

    pub fn set_blend_constant<E: PassEncoder>(&mut self, encoder: &mut E, color: wgpu::Color) {
        if update(&mut self.blend_constant, Some(color)) {
            encoder.blend_constant(color);
        }
    }

    pub fn set_stencil_reference<E: PassEncoder>(&mut self, encoder: &mut E, reference: u32) {
        if update(&mut self.stencil_reference, Some(reference)) {
            encoder.stencil_reference(reference);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
    }

    impl PassEncoder for Recorder {
        type Pipeline = &'static str;
        type BindGroup = &'static str;
        type Buffer = &'static str;

        fn viewport(&mut self, v: &Viewport) {
            self.calls.push(format!("viewport {}x{}", v.width, v.height));
        }
        fn scissor(&mut self, r: &ScissorRect) {
            self.calls.push(format!("scissor {}x{}", r.width, r.height));
        }
        fn pipeline(&mut self, p: &&'static str) {
            self.calls.push(format!("pipeline {p}"));
        }
        fn bind_group(&mut self, index: u32, g: &&'static str, offsets: &[u32]) {
            self.calls.push(format!("group {index} {g} {offsets:?}"));
        }
        fn vertex_buffer(&mut self, slot: u32, b: &&'static str, offset: u64) {
            self.calls.push(format!("vertex {slot} {b} {offset}"));
        }
        fn index_buffer(&mut self, b: &&'static str, _format: wgpu::IndexFormat, offset: u64) {
            self.calls.push(format!("index {b} {offset}"));
        }
        fn blend_constant(&mut self, c: wgpu::Color) {
            self.calls.push(format!("blend {}", c.r));
        }
        fn stencil_reference(&mut self, reference: u32) {
            self.calls.push(format!("stencil {reference}"));
        }
    }

    #[test]
    fn setters_report_change_once() {
        let mut states = GpuStates::new();
        assert!(states.set_depth_test(true));
        assert!(!states.set_depth_test(true));
        assert!(states.set_depth_test(false));

        assert!(states.set_viewport(0.0, 0.0, 64.0, 64.0));
        assert!(!states.set_viewport(0.0, 0.0, 64.0, 64.0));
        assert!(states.set_viewport(0.0, 0.0, 32.0, 32.0));

        assert!(!states.set_clear_depth(1.0));
        assert!(states.set_clear_color(wgpu::Color::BLACK));
        assert!(!states.set_clear_color(wgpu::Color::BLACK));

        assert!(!states.set_cull_face(false));
        assert!(states.set_cull_mode(wgpu::Face::Front));
        assert!(!states.set_front_face(wgpu::FrontFace::Ccw));
        assert!(states.set_scissor_test(true));
        assert!(!states.set_pack_alignment(4));
        assert!(states.set_unpack_alignment(1));
    }

    #[test]
    fn raster_state_tracks_pipeline_inputs() {
        let mut states = GpuStates::new();
        let before = states.raster();
        states.set_depth_test(true);
        states.set_depth_func(wgpu::CompareFunction::LessEqual);
        let after = states.raster();
        assert_ne!(before, after);

        let ds = after.depth_stencil(wgpu::TextureFormat::Depth32Float);
        assert_eq!(ds.depth_compare, wgpu::CompareFunction::LessEqual);
        assert!(ds.depth_write_enabled);

        let off = before.depth_stencil(wgpu::TextureFormat::Depth32Float);
        assert_eq!(off.depth_compare, wgpu::CompareFunction::Always);
        assert!(!off.depth_write_enabled);
        assert_eq!(before.cull(), None);
    }

    #[test]
    fn depth_range_follows_into_viewport() {
        let mut states = GpuStates::new();
        assert!(states.set_depth_range(0.5, 1.0));
        assert!(!states.set_depth_range(0.5, 1.0));
        let full = states.viewport_for((8, 4));
        assert_eq!(full.width, 8.0);
        assert_eq!(full.min_depth, 0.5);
        states.set_viewport(1.0, 1.0, 2.0, 2.0);
        states.set_depth_range(0.0, 0.25);
        assert_eq!(states.viewport_for((8, 4)).max_depth, 0.25);
    }

    #[test]
    fn scissor_is_clamped_to_target() {
        let mut states = GpuStates::new();
        states.set_scissor(4, 4, 100, 100);
        assert_eq!(states.scissor_for((16, 16)), None);
        states.set_scissor_test(true);
        let rect = states.scissor_for((16, 8)).unwrap();
        assert_eq!((rect.width, rect.height), (12, 4));
    }

    #[test]
    fn program_and_buffer_bindings_dedup() {
        let mut states = GpuStates::new();
        let program = ResourceId::next();
        assert!(states.use_program(Some(program)));
        assert!(!states.use_program(Some(program)));
        assert_eq!(states.program(), Some(program));

        let buffer = ResourceId::next();
        assert!(states.bind_array_buffer(Some(buffer)));
        assert!(!states.bind_array_buffer(Some(buffer)));
        assert!(states.bind_array_buffer(None));
        assert!(states.index_buffer().is_none());
    }

    #[test]
    fn pass_cache_records_only_changes() {
        let mut pass = Recorder::default();
        let mut cache = PassStateCache::new();
        let pipeline_a = Tracked::new("a");
        let pipeline_b = Tracked::new("b");
        let group = Tracked::new("g");
        let buffer = Tracked::new("v");

        cache.set_pipeline(&mut pass, &pipeline_a);
        cache.set_pipeline(&mut pass, &pipeline_a);
        cache.set_bind_group(&mut pass, 0, &group, &[0]);
        cache.set_bind_group(&mut pass, 0, &group, &[0]);
        cache.set_bind_group(&mut pass, 0, &group, &[256]);
        cache.set_vertex_buffer(&mut pass, 0, &buffer, 0);
        cache.set_vertex_buffer(&mut pass, 0, &buffer, 0);
        cache.set_vertex_buffer(&mut pass, 1, &buffer, 0);
        cache.set_index_buffer(&mut pass, &buffer, wgpu::IndexFormat::Uint16, 0);
        cache.set_index_buffer(&mut pass, &buffer, wgpu::IndexFormat::Uint16, 0);
        cache.set_viewport(&mut pass, Viewport::full((4, 4)));
        cache.set_viewport(&mut pass, Viewport::full((4, 4)));
        cache.set_pipeline(&mut pass, &pipeline_b);
        cache.set_pipeline(&mut pass, &pipeline_a);

        assert_eq!(
            pass.calls,
            vec![
                "pipeline a",
                "group 0 g [0]",
                "group 0 g [256]",
                "vertex 0 v 0",
                "vertex 1 v 0",
                "index v 0",
                "viewport 4x4",
                "pipeline b",
                "pipeline a",
            ]
        );
    }

    #[test]
    fn pass_cache_dynamic_state() {
        let mut pass = Recorder::default();
        let mut cache = PassStateCache::new();
        cache.set_blend_constant(&mut pass, wgpu::Color::WHITE);
        cache.set_blend_constant(&mut pass, wgpu::Color::WHITE);
        cache.set_stencil_reference(&mut pass, 3);
        cache.set_stencil_reference(&mut pass, 3);
        cache.set_scissor(
            &mut pass,
            ScissorRect {
                x: 0,
                y: 0,
                width: 2,
                height: 2,
            },
        );
        assert_eq!(pass.calls, vec!["blend 1", "stencil 3", "scissor 2x2"]);
    }
}
