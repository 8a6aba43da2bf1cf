// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Cameras: a projection plus a world transform.

use super::layers::Layers;
use crate::math::{Frustum, Mat4, Quat, Vec3};

/// The projection of a camera. Angles are in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// A perspective projection.
    Perspective {
        /// Vertical field of view in degrees.
        fov: f32,
        /// Width over height.
        aspect: f32,
        /// Near plane.
        near: f32,
        /// Far plane.
        far: f32,
    },
    /// An orthographic projection.
    Orthographic {
        /// Left plane.
        left: f32,
        /// Right plane.
        right: f32,
        /// Top plane.
        top: f32,
        /// Bottom plane.
        bottom: f32,
        /// Near plane.
        near: f32,
        /// Far plane.
        far: f32,
    },
}

impl Projection {
    /// Builds the OpenGL-convention projection matrix.
    pub fn matrix(&self) -> Mat4 {
        match *self {
            Projection::Perspective {
                fov,
                aspect,
                near,
                far,
            } => Mat4::perspective_rh_gl(fov.to_radians(), aspect, near, far),
            Projection::Orthographic {
                left,
                right,
                top,
                bottom,
                near,
                far,
            } => Mat4::orthographic_rh_gl(left, right, bottom, top, near, far),
        }
    }

    /// Near and far planes.
    pub fn near_far(&self) -> (f32, f32) {
        match *self {
            Projection::Perspective { near, far, .. } => (near, far),
            Projection::Orthographic { near, far, .. } => (near, far),
        }
    }
}

/// A camera. Cameras live outside the scene graph and carry their own transform.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    /// The projection.
    pub projection: Projection,
    /// Layers the camera sees.
    pub layers: Layers,
    position: Vec3,
    rotation: Quat,
    matrix_world: Mat4,
    matrix_world_inverse: Mat4,
    projection_matrix: Mat4,
}

impl Camera {
    /// Creates a camera at the origin looking down `-Z`.
    pub fn new(projection: Projection) -> Self {
        Self {
            projection,
            layers: Layers::default(),
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            matrix_world: Mat4::IDENTITY,
            matrix_world_inverse: Mat4::IDENTITY,
            projection_matrix: projection.matrix(),
        }
    }

    /// A perspective camera.
    pub fn perspective(fov: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self::new(Projection::Perspective {
            fov,
            aspect,
            near,
            far,
        })
    }

    /// An orthographic camera.
    pub fn orthographic(left: f32, right: f32, top: f32, bottom: f32, near: f32, far: f32) -> Self {
        Self::new(Projection::Orthographic {
            left,
            right,
            top,
            bottom,
            near,
            far,
        })
    }

    /// Moves the camera.
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.update_matrix_world();
    }

    /// Rotates the camera.
    pub fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation;
        self.update_matrix_world();
    }

    /// Rotates the camera so it faces `target`, with `+Y` up.
    pub fn look_at(&mut self, target: Vec3) {
        let view = Mat4::look_at_rh(self.position, target, Vec3::Y);
        let (_, rotation, _) = view.inverse().to_scale_rotation_translation();
        self.rotation = rotation;
        self.update_matrix_world();
    }

    /// Overrides the world matrix directly.
    pub fn set_matrix_world(&mut self, matrix: Mat4) {
        let (_, rotation, translation) = matrix.to_scale_rotation_translation();
        self.position = translation;
        self.rotation = rotation;
        self.matrix_world = matrix;
        self.matrix_world_inverse = matrix.inverse();
    }

    /// Recomputes the world matrices from position and rotation.
    pub fn update_matrix_world(&mut self) {
        self.matrix_world = Mat4::from_rotation_translation(self.rotation, self.position);
        self.matrix_world_inverse = self.matrix_world.inverse();
    }

    /// Recomputes the projection matrix after `projection` changed.
    pub fn update_projection_matrix(&mut self) {
        self.projection_matrix = self.projection.matrix();
    }

    /// World position.
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// World matrix.
    pub fn matrix_world(&self) -> Mat4 {
        self.matrix_world
    }

    /// View matrix.
    pub fn matrix_world_inverse(&self) -> Mat4 {
        self.matrix_world_inverse
    }

    /// Projection matrix.
    pub fn projection_matrix(&self) -> Mat4 {
        self.projection_matrix
    }

    /// Projection times view.
    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix * self.matrix_world_inverse
    }

    /// The view frustum in world space.
    pub fn frustum(&self) -> Frustum {
        Frustum::from_view_projection(&self.view_projection())
    }

    /// Whether the projection is a perspective one.
    pub fn is_perspective(&self) -> bool {
        matches!(self.projection, Projection::Perspective { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_look_at_faces_target() {
        let mut camera = Camera::perspective(60.0, 1.0, 0.1, 100.0);
        camera.set_position(Vec3::new(0.0, 0.0, 10.0));
        camera.look_at(Vec3::ZERO);
        let view_space = camera.matrix_world_inverse().transform_point3(Vec3::ZERO);
        assert_relative_eq!(view_space.z, -10.0, epsilon = 1e-4);
        assert!(camera.frustum().contains_point(Vec3::ZERO));
    }

    #[test]
    fn test_orthographic_projection() {
        let camera = Camera::orthographic(-1.0, 1.0, 1.0, -1.0, 0.1, 10.0);
        assert!(!camera.is_perspective());
        let clip = camera.projection_matrix().project_point3(Vec3::new(1.0, 1.0, -0.1));
        assert_relative_eq!(clip.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(clip.z, -1.0, epsilon = 1e-5);
    }
}
