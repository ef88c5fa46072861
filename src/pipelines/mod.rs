//! Render passes.
//!
//! - `cube` holds the unit cube, the cube face views and the six-face bake loop
//! - `equirect` turns an equirectangular panorama into a cubemap
//! - `irradiance` convolves that cubemap into a diffuse irradiance map
//! - `skybox` draws either map as the background

pub mod cube;
pub mod equirect;
pub mod irradiance;
pub mod skybox;

use crate::{
    config::{Config, SkyboxSource},
    context::Context,
    data_structures::texture::CubeTexture,
    resources::texture::Panorama,
};

/// The baked lighting environment: the cubemap and its irradiance convolution.
pub struct Environment {
    pub cubemap: CubeTexture,
    pub irradiance: CubeTexture,
}

impl Environment {
    /// Runs both bake passes. The irradiance pass reads the cubemap the first one renders,
    /// so they are submitted in that order.
    pub fn bake(ctx: &mut Context, panorama: &Panorama, config: &Config) -> anyhow::Result<Self> {
        let source = equirect::EquirectToCube::upload_panorama(ctx, panorama);
        let projection = config.bake_projection();
        let cubemap = equirect::EquirectToCube::new(ctx).bake(
            ctx,
            &source,
            config.cubemap_size,
            projection,
        )?;
        let irradiance = irradiance::IrradianceBaker::new(ctx).bake(
            ctx,
            &cubemap,
            config.irradiance_size,
            projection,
            config.sample_delta,
        )?;
        Ok(Self {
            cubemap,
            irradiance,
        })
    }

    pub fn skybox(&self, source: SkyboxSource) -> &CubeTexture {
        match source {
            SkyboxSource::Environment => &self.cubemap,
            SkyboxSource::Irradiance => &self.irradiance,
        }
    }
}
