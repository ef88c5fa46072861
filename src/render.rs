//! Scene rendering.
//!
//! This module defines the [`SceneRenderer`], which walks a [`Document`]'s node arena, composes
//! local transforms into world matrices and records one draw per mesh primitive under the
//! Cook-Torrance shader in `pipelines/pbr.wgsl`.
//!
//! # Key types
//!
//! - [`SceneRenderer`] owns the document, the scene program and the GPU resource cache
//! - [`Lighting`] holds the per-frame light and material parameters fed to the shader
//! - [`RenderStats`] counts what a traversal recorded
//!
//! Traversal does not change any state it does not restore: the raster state is saved on
//! entry and put back on exit, whether or not a draw failed.

use cgmath::{Matrix4, SquareMatrix, Vector3};

use crate::{
    camera::{Camera, Projection},
    config::{AmbientMode, Config},
    context::Context,
    data_structures::{
        scene::{Accessor, Document, Primitive},
        texture::{CubeTexture, Texture},
    },
    error::{DrawError, SceneError},
    gpu::{
        cache::ResourceCache,
        frame::{DrawRange, Frame},
        shader::{AttributeConfig, ShaderProgram},
    },
    math,
};

/// Light and material parameters shared by every primitive of a frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Lighting {
    pub ambient_color: [f32; 3],
    pub ambient_intensity: f32,
    pub ambient_mode: AmbientMode,
    pub directional_color: [f32; 3],
    pub directional_intensity: f32,
    /// Unit vector towards the light.
    pub directional_direction: [f32; 3],
    /// Multiplied into each material's own factor.
    pub metallic_factor: f32,
    pub roughness_factor: f32,
}

impl From<&Config> for Lighting {
    fn from(config: &Config) -> Self {
        Self {
            ambient_color: config.ambient_color,
            ambient_intensity: config.ambient_intensity,
            ambient_mode: config.ambient_mode,
            directional_color: config.directional_color,
            directional_intensity: config.directional_intensity,
            directional_direction: config.directional_direction,
            metallic_factor: config.metallic_factor,
            roughness_factor: config.roughness_factor,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub draws: usize,
    /// Primitives whose topology wgpu cannot draw.
    pub skipped: usize,
}

impl std::ops::AddAssign for RenderStats {
    fn add_assign(&mut self, other: Self) {
        self.draws += other.draws;
        self.skipped += other.skipped;
    }
}

pub struct SceneRenderer {
    document: Document,
    program: ShaderProgram,
    cache: ResourceCache,
    lighting: Lighting,
    irradiance: CubeTexture,
    camera_world: Matrix4<f32>,
    camera_view: Matrix4<f32>,
    projection: Matrix4<f32>,
}

impl SceneRenderer {
    /// Takes ownership of a loaded document. The document is validated here; a malformed
    /// one is refused before anything is drawn.
    pub fn new(ctx: &Context, document: Document, config: &Config) -> anyhow::Result<Self> {
        document.validate()?;
        let program = ShaderProgram::from_wgsl(ctx, "pbr", include_str!("pipelines/pbr.wgsl"));
        if program.is_broken() {
            anyhow::bail!("the scene shader did not compile");
        }
        let irradiance = CubeTexture::new(
            &ctx.device,
            1,
            ctx.capabilities.hdr_format,
            "placeholder irradiance",
        );
        let (width, height) = ctx.surface_size().unwrap_or((1, 1));
        Ok(Self {
            document,
            program,
            cache: ResourceCache::new(),
            lighting: Lighting::from(config),
            irradiance,
            camera_world: Matrix4::identity(),
            camera_view: Matrix4::identity(),
            projection: Projection::from_config(config, width, height).calc_matrix(),
        })
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    pub fn set_camera(&mut self, camera: &Camera) {
        self.camera_world = camera.world_matrix();
        self.camera_view = camera.view_matrix();
    }

    pub fn set_projection(&mut self, projection: &Projection) {
        self.projection = projection.calc_matrix();
    }

    pub fn set_lighting(&mut self, lighting: Lighting) {
        self.lighting = lighting;
    }

    pub fn lighting(&self) -> &Lighting {
        &self.lighting
    }

    /// The map sampled when the ambient mode is [`AmbientMode::Irradiance`].
    pub fn set_irradiance(&mut self, irradiance: CubeTexture) {
        self.irradiance = irradiance;
    }

    /// The document's default scene, or the first one.
    pub fn default_scene(&self) -> Option<usize> {
        self.document
            .scene
            .or_else(|| (!self.document.scenes.is_empty()).then_some(0))
    }

    /// Records every node of `scene` into the frame's current pass, each root placed under
    /// `parent`.
    pub fn render_scene(
        &mut self,
        ctx: &mut Context,
        frame: &mut Frame,
        scene: usize,
        parent: Matrix4<f32>,
    ) -> Result<RenderStats, DrawError> {
        let roots = self
            .document
            .scenes
            .get(scene)
            .ok_or(SceneError::IndexOutOfRange {
                kind: "scene",
                index: scene,
                len: self.document.scenes.len(),
            })?
            .nodes
            .clone();
        self.render_roots(ctx, frame, &roots, parent)
    }

    /// Records `node` and its descendants.
    pub fn render_node(
        &mut self,
        ctx: &mut Context,
        frame: &mut Frame,
        node: usize,
        parent: Matrix4<f32>,
    ) -> Result<RenderStats, DrawError> {
        self.render_roots(ctx, frame, &[node], parent)
    }

    fn render_roots(
        &mut self,
        ctx: &mut Context,
        frame: &mut Frame,
        roots: &[usize],
        parent: Matrix4<f32>,
    ) -> Result<RenderStats, DrawError> {
        let saved = ctx.states.raster();
        ctx.states.set_depth_test(true);
        ctx.states.set_depth_func(wgpu::CompareFunction::Less);
        ctx.states.set_depth_mask(true);
        ctx.states.set_cull_face(true);
        let result = self.traverse(ctx, frame, roots, parent);
        ctx.states.set_raster(saved);
        result
    }

    fn traverse(
        &mut self,
        ctx: &mut Context,
        frame: &mut Frame,
        roots: &[usize],
        parent: Matrix4<f32>,
    ) -> Result<RenderStats, DrawError> {
        let mut stats = RenderStats::default();
        for (node, world) in self.document.subtree_matrices(roots, parent) {
            let Some(mesh) = self.document.nodes[node].mesh else {
                continue;
            };
            stats += self.render_mesh(ctx, frame, mesh, world)?;
        }
        Ok(stats)
    }

    fn render_mesh(
        &mut self,
        ctx: &mut Context,
        frame: &mut Frame,
        mesh: usize,
        world: Matrix4<f32>,
    ) -> Result<RenderStats, DrawError> {
        let model_view = math::multiply(&self.camera_view, &world);
        let mut stats = RenderStats::default();
        let count = self
            .document
            .meshes
            .get(mesh)
            .map_or(0, |m| m.primitives.len());
        for index in 0..count {
            let primitive = self.document.meshes[mesh].primitives[index].clone();
            let Some(topology) = primitive.mode.topology() else {
                log::warn!(
                    "mesh {mesh} primitive {index}: {:?} cannot be drawn, skipped",
                    primitive.mode
                );
                stats.skipped += 1;
                continue;
            };
            self.render_primitive(ctx, frame, (mesh, index), &primitive, world, model_view, topology)?;
            stats.draws += 1;
        }
        Ok(stats)
    }

    fn render_primitive(
        &mut self,
        ctx: &mut Context,
        frame: &mut Frame,
        (mesh, index): (usize, usize),
        primitive: &Primitive,
        world: Matrix4<f32>,
        model_view: Matrix4<f32>,
        topology: wgpu::PrimitiveTopology,
    ) -> Result<(), DrawError> {
        let Self {
            document,
            program,
            cache,
            lighting,
            irradiance,
            camera_world,
            projection,
            ..
        } = self;
        let material = primitive
            .material
            .and_then(|m| document.materials.get(m))
            .cloned()
            .unwrap_or_default();

        ctx.units.reset();
        program.use_program(ctx);
        program.set_uniform(ctx, "projection", *projection)?;
        program.set_uniform(ctx, "modelToView", model_view)?;
        program.set_uniform(ctx, "modelToWorld", world)?;

        program.set_uniform(ctx, "ambientLightColor", lighting.ambient_color)?;
        program.set_uniform(ctx, "ambientLightIntensity", lighting.ambient_intensity)?;
        program.set_uniform(ctx, "ambientMode", lighting.ambient_mode.shader_value())?;
        program.set_uniform(ctx, "directionalLightColor", lighting.directional_color)?;
        program.set_uniform(ctx, "directionalLightIntensity", lighting.directional_intensity)?;
        program.set_uniform(ctx, "directionalLightDirection", lighting.directional_direction)?;
        program.set_uniform(
            ctx,
            "metallicFactor",
            material.metallic_factor * lighting.metallic_factor,
        )?;
        program.set_uniform(
            ctx,
            "roughnessFactor",
            material.roughness_factor * lighting.roughness_factor,
        )?;
        let eye: Vector3<f32> = math::translation(camera_world);
        program.set_uniform(ctx, "cameraWorldPosition", eye)?;

        let index_count = match primitive.indices {
            Some(accessor) => {
                let binding = cache.index_buffer(ctx, document, accessor)?;
                ctx.states.bind_index_buffer(Some(binding));
                Some(document.accessors[accessor].count as u32)
            }
            None => {
                ctx.states.bind_index_buffer(None);
                None
            }
        };

        let mut vertex_count = 0;
        for (name, accessor, semantic) in [
            ("position", primitive.position, "POSITION"),
            ("normal", primitive.normal, "NORMAL"),
            ("uv", primitive.tex_coord, "TEXCOORD_0"),
        ] {
            let accessor = accessor.ok_or(SceneError::MissingAttribute {
                mesh,
                primitive: index,
                semantic,
            })?;
            let def = document.accessors[accessor];
            if name == "position" {
                vertex_count = def.count as u32;
            }
            bind_accessor(ctx, program, cache, document, name, accessor, &def)?;
        }

        bind_material_texture(
            ctx,
            program,
            cache,
            document,
            "baseColorTexture",
            material.base_color_texture,
        )?;
        bind_material_texture(
            ctx,
            program,
            cache,
            document,
            "metallicRoughnessTexture",
            material.metallic_roughness_texture,
        )?;
        program.set_uniform(ctx, "irradianceMap", &irradiance.texture)?;

        let range = match index_count {
            Some(count) => DrawRange::Indexed {
                first_index: 0,
                count,
                base_vertex: 0,
            },
            None => DrawRange::Arrays {
                first: 0,
                count: vertex_count,
            },
        };
        program.draw(ctx, frame, range, topology)
    }
}

fn bind_accessor(
    ctx: &mut Context,
    program: &mut ShaderProgram,
    cache: &mut ResourceCache,
    document: &Document,
    name: &str,
    index: usize,
    accessor: &Accessor,
) -> Result<(), DrawError> {
    let view = accessor
        .buffer_view
        .ok_or(SceneError::MissingBufferView(index))?;
    let buffer = cache.buffer(ctx, document, view)?;
    let stride = document.buffer_views[view].byte_stride.unwrap_or(0) as u32;
    program.set_attribute(
        ctx,
        name,
        AttributeConfig {
            buffer: &buffer,
            components: accessor.accessor_type.components() as u32,
            component_type: accessor.component_type,
            normalized: accessor.normalized,
            stride,
            offset: accessor.byte_offset as u64,
        },
    )?;
    Ok(())
}

/// Binds a material texture, or 1×1 white when the material has none.
fn bind_material_texture(
    ctx: &mut Context,
    program: &mut ShaderProgram,
    cache: &mut ResourceCache,
    document: &Document,
    name: &str,
    texture: Option<usize>,
) -> Result<(), DrawError> {
    let texture: &Texture = match texture {
        Some(index) => cache.texture(ctx, document, index)?,
        None => cache.white(ctx),
    };
    program.set_uniform(ctx, name, texture)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lighting_follows_config() {
        let config = Config::default().with_metallic_roughness(0.5, 0.25);
        let lighting = Lighting::from(&config);
        assert_eq!(lighting.directional_intensity, 5.0);
        assert_eq!(lighting.ambient_intensity, 0.0);
        assert_eq!(lighting.metallic_factor, 0.5);
        assert_eq!(lighting.roughness_factor, 0.25);
        assert_eq!(lighting.directional_direction, config.directional_direction);
    }

    #[test]
    fn stats_accumulate() {
        let mut stats = RenderStats::default();
        stats += RenderStats { draws: 2, skipped: 1 };
        stats += RenderStats { draws: 3, skipped: 0 };
        assert_eq!(stats, RenderStats { draws: 5, skipped: 1 });
    }
}
