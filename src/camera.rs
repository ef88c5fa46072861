//! Camera placement and projection.
//!
//! The camera is an ordinary object in world space: its world matrix is composed from a
//! position and an orientation, and the view matrix is the inverse of that.

use cgmath::{Matrix4, Quaternion, Rad, Vector3, Zero};

use crate::{config::Config, math};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub position: Vector3<f32>,
    pub rotation: Quaternion<f32>,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vector3::zero(),
            rotation: Quaternion::new(1.0, 0.0, 0.0, 0.0),
        }
    }
}

impl Camera {
    pub fn new<V: Into<Vector3<f32>>>(position: V, rotation: Quaternion<f32>) -> Self {
        Self {
            position: position.into(),
            rotation,
        }
    }

    /// An unrotated camera at `position`, looking down -Z.
    pub fn at<V: Into<Vector3<f32>>>(position: V) -> Self {
        Self {
            position: position.into(),
            ..Default::default()
        }
    }

    pub fn world_matrix(&self) -> Matrix4<f32> {
        math::compose(self.position, self.rotation, Vector3::new(1.0, 1.0, 1.0))
    }

    pub fn view_matrix(&self) -> Matrix4<f32> {
        math::invert(&self.world_matrix())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Projection {
    aspect: f32,
    fovy: Rad<f32>,
    znear: f32,
    zfar: f32,
}

impl Projection {
    pub fn new<F: Into<Rad<f32>>>(width: u32, height: u32, fovy: F, znear: f32, zfar: f32) -> Self {
        Self {
            aspect: width as f32 / height.max(1) as f32,
            fovy: fovy.into(),
            znear,
            zfar,
        }
    }

    pub fn from_config(config: &Config, width: u32, height: u32) -> Self {
        Self::new(width, height, config.fov_y, config.near, config.far)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.aspect = width as f32 / height.max(1) as f32;
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    /// Projection into wgpu clip space (depth in `[0, 1]`).
    pub fn calc_matrix(&self) -> Matrix4<f32> {
        math::to_wgpu_clip(math::perspective(self.fovy, self.aspect, self.znear, self.zfar))
    }
}
