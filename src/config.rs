//! Renderer settings.
//!
//! `Config::default()` reproduces the demo scene: a model fifteen units in front of the
//! camera, lit by a white directional light, with a 512² environment cubemap and a 32²
//! irradiance map baked at startup.

use cgmath::{Deg, Matrix4};

use crate::math::{self, EulerOrder};

/// What the ambient term of the scene shader uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AmbientMode {
    /// `baseColor * ambientColor * ambientIntensity`
    #[default]
    Flat,
    /// The baked irradiance map in the direction of the normal, times the intensity.
    Irradiance,
}

impl AmbientMode {
    pub fn shader_value(self) -> u32 {
        match self {
            Self::Flat => 0,
            Self::Irradiance => 1,
        }
    }
}

/// Which cubemap the skybox shows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SkyboxSource {
    #[default]
    Environment,
    Irradiance,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub ambient_color: [f32; 3],
    pub ambient_intensity: f32,
    pub ambient_mode: AmbientMode,
    pub directional_color: [f32; 3],
    pub directional_intensity: f32,
    pub directional_direction: [f32; 3],
    pub metallic_factor: f32,
    pub roughness_factor: f32,
    pub fov_y: Deg<f32>,
    pub near: f32,
    pub far: f32,
    pub model_position: [f32; 3],
    /// Radians added to each Euler angle of the model every frame.
    pub spin_per_frame: f32,
    pub spin_order: EulerOrder,
    pub cubemap_size: u32,
    pub irradiance_size: u32,
    pub bake_fov: Deg<f32>,
    pub bake_near: f32,
    pub bake_far: f32,
    /// Angular step of the irradiance integral, in radians.
    pub sample_delta: f32,
    pub skybox_source: SkyboxSource,
    pub clear_color: wgpu::Color,
    pub scene_path: String,
    pub panorama_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ambient_color: [1.0, 1.0, 1.0],
            ambient_intensity: 0.0,
            ambient_mode: AmbientMode::Flat,
            directional_color: [1.0, 1.0, 1.0],
            directional_intensity: 5.0,
            directional_direction: math::normalize([1.0, 5.0, 8.0]),
            metallic_factor: 1.0,
            roughness_factor: 1.0,
            fov_y: Deg(60.0),
            near: 1.0,
            far: 100.0,
            model_position: [0.0, 0.0, -15.0],
            spin_per_frame: 0.002,
            spin_order: EulerOrder::Xyz,
            cubemap_size: 512,
            irradiance_size: 32,
            bake_fov: Deg(90.0),
            bake_near: 0.9,
            bake_far: 10.0,
            sample_delta: 0.025,
            skybox_source: SkyboxSource::Environment,
            clear_color: wgpu::Color::BLACK,
            scene_path: "glTF/MetalRoughSpheres.gltf".to_string(),
            panorama_path: "textures/equirectangular/pedestrian_overpass_1k.hdr".to_string(),
        }
    }
}

impl Config {
    pub fn with_scene(mut self, path: impl Into<String>) -> Self {
        self.scene_path = path.into();
        self
    }

    pub fn with_panorama(mut self, path: impl Into<String>) -> Self {
        self.panorama_path = path.into();
        self
    }

    pub fn with_ambient(mut self, color: [f32; 3], intensity: f32, mode: AmbientMode) -> Self {
        self.ambient_color = color;
        self.ambient_intensity = intensity;
        self.ambient_mode = mode;
        self
    }

    /// `direction` points towards the light and is normalized here.
    pub fn with_directional(mut self, color: [f32; 3], intensity: f32, direction: [f32; 3]) -> Self {
        self.directional_color = color;
        self.directional_intensity = intensity;
        self.directional_direction = math::normalize(direction);
        self
    }

    pub fn with_metallic_roughness(mut self, metallic: f32, roughness: f32) -> Self {
        self.metallic_factor = metallic;
        self.roughness_factor = roughness;
        self
    }

    pub fn with_projection(mut self, fov_y: Deg<f32>, near: f32, far: f32) -> Self {
        self.fov_y = fov_y;
        self.near = near;
        self.far = far;
        self
    }

    pub fn with_model_position(mut self, position: [f32; 3]) -> Self {
        self.model_position = position;
        self
    }

    pub fn with_spin(mut self, radians_per_frame: f32, order: EulerOrder) -> Self {
        self.spin_per_frame = radians_per_frame;
        self.spin_order = order;
        self
    }

    pub fn with_bake_sizes(mut self, cubemap: u32, irradiance: u32) -> Self {
        self.cubemap_size = cubemap.max(1);
        self.irradiance_size = irradiance.max(1);
        self
    }

    pub fn with_sample_delta(mut self, delta: f32) -> Self {
        self.sample_delta = delta;
        self
    }

    pub fn with_skybox_source(mut self, source: SkyboxSource) -> Self {
        self.skybox_source = source;
        self
    }

    pub fn with_clear_color(mut self, color: wgpu::Color) -> Self {
        self.clear_color = color;
        self
    }

    /// The square projection every cube face is rendered with.
    pub fn bake_projection(&self) -> Matrix4<f32> {
        math::to_wgpu_clip(math::perspective(
            self.bake_fov.into(),
            1.0,
            self.bake_near,
            self.bake_far,
        ))
    }

    /// Overrides the asset paths from `[scene] [panorama]` arguments.
    pub fn with_args(self, mut args: impl Iterator<Item = String>) -> Self {
        let config = match args.next() {
            Some(scene) => self.with_scene(scene),
            None => return self,
        };
        match args.next() {
            Some(panorama) => config.with_panorama(panorama),
            None => config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_demo_scene() {
        let config = Config::default();
        assert_eq!(config.ambient_intensity, 0.0);
        assert_eq!(config.directional_intensity, 5.0);
        let [x, y, z] = config.directional_direction;
        assert!(((x * x + y * y + z * z) - 1.0).abs() < 1e-6);
        assert!((y / x - 5.0).abs() < 1e-5);
        assert_eq!(config.cubemap_size, 512);
        assert_eq!(config.irradiance_size, 32);
        assert_eq!(config.ambient_mode, AmbientMode::Flat);
    }

    #[test]
    fn args_override_paths() {
        let config = Config::default()
            .with_args(["a.gltf".to_string(), "b.hdr".to_string()].into_iter());
        assert_eq!(config.scene_path, "a.gltf");
        assert_eq!(config.panorama_path, "b.hdr");
        let config = Config::default().with_args(std::iter::once("only.glb".to_string()));
        assert_eq!(config.scene_path, "only.glb");
        assert_eq!(config.panorama_path, Config::default().panorama_path);
    }

    #[test]
    fn bake_projection_is_square_ninety_degrees() {
        let p = Config::default().bake_projection();
        assert!((p.x.x - 1.0).abs() < 1e-5);
        assert!((p.y.y - 1.0).abs() < 1e-5);
    }

    #[test]
    fn builders_normalize_and_clamp() {
        let config = Config::default()
            .with_directional([1.0; 3], 2.0, [0.0, 3.0, 0.0])
            .with_bake_sizes(0, 16);
        assert_eq!(config.directional_direction, [0.0, 1.0, 0.0]);
        assert_eq!(config.cubemap_size, 1);
        assert_eq!(config.irradiance_size, 16);
    }
}
