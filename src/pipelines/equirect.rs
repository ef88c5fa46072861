//! Equirectangular panorama to cubemap.

use cgmath::Matrix4;

use super::cube::{UnitCube, render_cube_faces};
use crate::{
    context::Context,
    data_structures::texture::{CubeTexture, Texture},
    gpu::shader::ShaderProgram,
    resources::texture::Panorama,
};

pub struct EquirectToCube {
    program: ShaderProgram,
    cube: UnitCube,
}

impl EquirectToCube {
    pub fn new(ctx: &Context) -> Self {
        Self {
            program: ShaderProgram::from_wgsl(
                ctx,
                "equirectangular to cube",
                include_str!("equirect.wgsl"),
            ),
            cube: UnitCube::new(&ctx.device),
        }
    }

    /// Uploads a panorama in the context's HDR format, bottom row first so `v` grows upwards.
    pub fn upload_panorama(ctx: &mut Context, panorama: &Panorama) -> Texture {
        let flipped = ctx.states.pixel_store().unpack_flip_y;
        ctx.states.set_unpack_flip_y(true);
        let texture = Texture::from_panorama(
            &ctx.device,
            &ctx.queue,
            ctx.states.pixel_store(),
            panorama,
            ctx.capabilities.hdr_format,
        );
        ctx.states.set_unpack_flip_y(flipped);
        texture
    }

    /// Renders all six faces of a new `size`² cubemap from `panorama`.
    pub fn bake(
        &mut self,
        ctx: &mut Context,
        panorama: &Texture,
        size: u32,
        projection: Matrix4<f32>,
    ) -> anyhow::Result<CubeTexture> {
        let start = instant::Instant::now();
        let target = CubeTexture::new(
            &ctx.device,
            size,
            ctx.capabilities.hdr_format,
            "environment cubemap",
        );
        render_cube_faces(
            ctx,
            &mut self.program,
            &self.cube,
            &target,
            projection,
            |ctx, program| program.set_uniform(ctx, "equirectangularMap", panorama),
        )?;
        log::info!(
            "equirectangular bake submitted: {size}x{size} faces from {}x{} in {:?}",
            panorama.size().0,
            panorama.size().1,
            start.elapsed()
        );
        Ok(target)
    }
}
