//! Diffuse irradiance convolution of an environment cubemap.

use cgmath::Matrix4;

use super::cube::{UnitCube, render_cube_faces};
use crate::{context::Context, data_structures::texture::CubeTexture, gpu::shader::ShaderProgram};

pub struct IrradianceBaker {
    program: ShaderProgram,
    cube: UnitCube,
}

impl IrradianceBaker {
    pub fn new(ctx: &Context) -> Self {
        Self {
            program: ShaderProgram::from_wgsl(
                ctx,
                "irradiance convolution",
                include_str!("irradiance.wgsl"),
            ),
            cube: UnitCube::new(&ctx.device),
        }
    }

    /// Integrates `environment` over the hemisphere of every direction of a `size`² cubemap.
    /// `sample_delta` is the angular step in radians.
    pub fn bake(
        &mut self,
        ctx: &mut Context,
        environment: &CubeTexture,
        size: u32,
        projection: Matrix4<f32>,
        sample_delta: f32,
    ) -> anyhow::Result<CubeTexture> {
        let start = instant::Instant::now();
        let target = CubeTexture::new(
            &ctx.device,
            size,
            ctx.capabilities.hdr_format,
            "irradiance map",
        );
        render_cube_faces(
            ctx,
            &mut self.program,
            &self.cube,
            &target,
            projection,
            |ctx, program| {
                program.set_uniform(ctx, "sampleDelta", sample_delta)?;
                program.set_uniform(ctx, "environmentMap", &environment.texture)
            },
        )?;
        log::info!(
            "irradiance bake submitted: {size}x{size} faces, delta {sample_delta} in {:?}",
            start.elapsed()
        );
        Ok(target)
    }
}
