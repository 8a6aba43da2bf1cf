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

//! Math primitives used across the renderer.
//!
//! Vectors, matrices and quaternions come from `glam`; this module adds the bounding
//! and culling volumes the renderer needs (`Sphere`, `Plane`, `Frustum`). All matrices
//! are column-major and follow the OpenGL clip-space convention (`z` in `[-1, 1]`).

pub use glam::{Mat3, Mat4, Quat, UVec2, Vec2, Vec3, Vec4};

/// A small constant for floating-point comparisons.
pub const EPSILON: f32 = 1e-5;

/// A bounding sphere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    /// The center of the sphere.
    pub center: Vec3,
    /// The radius of the sphere. A negative radius marks an empty sphere.
    pub radius: f32,
}

impl Sphere {
    /// An empty sphere that intersects nothing.
    pub const EMPTY: Self = Self {
        center: Vec3::ZERO,
        radius: -1.0,
    };

    /// Creates a new sphere.
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Computes a sphere enclosing every point, centered on their bounding box.
    ///
    /// Returns [`Sphere::EMPTY`] for an empty iterator.
    pub fn from_points<I>(points: I) -> Self
    where
        I: IntoIterator<Item = Vec3> + Clone,
    {
        let mut min = Vec3::splat(f32::MAX);
        let mut max = Vec3::splat(f32::MIN);
        let mut any = false;
        for p in points.clone() {
            min = min.min(p);
            max = max.max(p);
            any = true;
        }
        if !any {
            return Self::EMPTY;
        }
        let center = (min + max) * 0.5;
        let radius_sq = points
            .into_iter()
            .map(|p| center.distance_squared(p))
            .fold(0.0_f32, f32::max);
        Self::new(center, radius_sq.sqrt())
    }

    /// Returns `true` if the sphere has no extent.
    pub fn is_empty(&self) -> bool {
        self.radius < 0.0
    }

    /// Returns the sphere transformed by an affine matrix.
    ///
    /// The radius is scaled by the largest axis scale of the matrix so the result
    /// still encloses the transformed volume.
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        if self.is_empty() {
            return *self;
        }
        let scale_x = matrix.x_axis.truncate().length_squared();
        let scale_y = matrix.y_axis.truncate().length_squared();
        let scale_z = matrix.z_axis.truncate().length_squared();
        let max_scale = scale_x.max(scale_y).max(scale_z).sqrt();
        Self::new(matrix.transform_point3(self.center), self.radius * max_scale)
    }
}

/// A plane in Hessian normal form: `normal . p + constant = 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// The unit normal of the plane.
    pub normal: Vec3,
    /// The signed distance of the plane from the origin.
    pub constant: f32,
}

impl Plane {
    /// Builds a normalized plane from raw `(a, b, c, d)` coefficients.
    pub fn from_coefficients(v: Vec4) -> Self {
        let normal = v.truncate();
        let inv_len = 1.0 / normal.length().max(EPSILON);
        Self {
            normal: normal * inv_len,
            constant: v.w * inv_len,
        }
    }

    /// Signed distance from the plane to a point.
    #[inline]
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.constant
    }

    /// Packs the plane as a `Vec4` (`xyz` normal, `w` constant) for uniform upload.
    pub fn to_vec4(&self) -> Vec4 {
        self.normal.extend(self.constant)
    }
}

/// A view frustum made of six inward-facing planes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    /// Planes in the order left, right, bottom, top, far, near.
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Extracts the frustum planes from a view-projection matrix.
    pub fn from_view_projection(m: &Mat4) -> Self {
        let r0 = m.row(0);
        let r1 = m.row(1);
        let r2 = m.row(2);
        let r3 = m.row(3);
        Self {
            planes: [
                Plane::from_coefficients(r3 + r0),
                Plane::from_coefficients(r3 - r0),
                Plane::from_coefficients(r3 + r1),
                Plane::from_coefficients(r3 - r1),
                Plane::from_coefficients(r3 - r2),
                Plane::from_coefficients(r3 + r2),
            ],
        }
    }

    /// Returns `true` if the sphere is at least partially inside the frustum.
    pub fn intersects_sphere(&self, sphere: &Sphere) -> bool {
        if sphere.is_empty() {
            return false;
        }
        self.planes
            .iter()
            .all(|plane| plane.distance_to_point(sphere.center) >= -sphere.radius)
    }

    /// Returns `true` if the point is inside the frustum.
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.distance_to_point(point) >= 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn camera_frustum() -> Frustum {
        let proj = Mat4::perspective_rh_gl(60f32.to_radians(), 1.0, 0.1, 100.0);
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
        Frustum::from_view_projection(&(proj * view))
    }

    #[test]
    fn test_frustum_contains_origin() {
        let frustum = camera_frustum();
        assert!(frustum.contains_point(Vec3::ZERO));
        assert!(!frustum.contains_point(Vec3::new(0.0, 0.0, 10.0)));
    }

    #[test]
    fn test_frustum_sphere_culling() {
        let frustum = camera_frustum();
        assert!(frustum.intersects_sphere(&Sphere::new(Vec3::ZERO, 1.0)));
        // Behind the camera.
        assert!(!frustum.intersects_sphere(&Sphere::new(Vec3::new(0.0, 0.0, 20.0), 1.0)));
        // Far to the side but large enough to straddle the left plane.
        assert!(frustum.intersects_sphere(&Sphere::new(Vec3::new(-6.0, 0.0, 0.0), 4.0)));
        assert!(!frustum.intersects_sphere(&Sphere::EMPTY));
    }

    #[test]
    fn test_sphere_from_points() {
        let sphere = Sphere::from_points([Vec3::new(-1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0)]);
        assert_eq!(sphere.center, Vec3::ZERO);
        assert_relative_eq!(sphere.radius, 1.0);
        assert!(Sphere::from_points(Vec::<Vec3>::new()).is_empty());
    }

    #[test]
    fn test_sphere_transform_scales_radius() {
        let sphere = Sphere::new(Vec3::ZERO, 1.0);
        let matrix = Mat4::from_scale_rotation_translation(
            Vec3::new(1.0, 3.0, 2.0),
            Quat::IDENTITY,
            Vec3::new(5.0, 0.0, 0.0),
        );
        let moved = sphere.transformed(&matrix);
        assert_relative_eq!(moved.center.x, 5.0);
        assert_relative_eq!(moved.radius, 3.0);
    }
}
