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

//! World-matrix propagation through the scene hierarchy.

use super::object::Object3D;
use lumen_core::math::Mat4;
use lumen_core::resource::ObjectKey;
use slotmap::SlotMap;
use std::collections::VecDeque;

/// Propagates local transforms down the hierarchy to compute every world matrix.
///
/// This performs a breadth-first traversal starting from the roots, so a parent's
/// world matrix is always final before any of its children is computed.
pub(crate) fn propagate_world_matrices(
    objects: &mut SlotMap<ObjectKey, Object3D>,
    roots: &[ObjectKey],
) {
    let mut queue: VecDeque<(ObjectKey, Mat4)> =
        roots.iter().map(|&key| (key, Mat4::IDENTITY)).collect();

    while let Some((key, parent_world)) = queue.pop_front() {
        let Some(object) = objects.get_mut(key) else {
            continue;
        };
        object.update_matrix();
        object.matrix_world = parent_world * object.matrix;

        let world = object.matrix_world;
        queue.extend(object.children.iter().map(|&child| (child, world)));
    }
}

#[cfg(test)]
mod tests {
    use super::super::{Object3D, Scene};
    use approx::assert_abs_diff_eq;
    use lumen_core::math::{Mat4, Quat, Vec3};

    fn assert_matrix_approx_eq(a: Mat4, b: Mat4) {
        let (a, b) = (a.to_cols_array(), b.to_cols_array());
        for i in 0..16 {
            assert_abs_diff_eq!(a[i], b[i], epsilon = 1e-5);
        }
    }

    #[test]
    fn test_transform_propagation_simple_hierarchy() {
        // --- 1. ARRANGE ---
        let mut scene = Scene::new();
        let parent = scene.add(Object3D::group().with_position(Vec3::new(10.0, 0.0, 0.0)));
        let child = scene.add_child(parent, Object3D::group().with_position(Vec3::new(0.0, 2.0, 0.0)));

        // --- 2. ACT ---
        scene.update_world_matrices();

        // --- 3. ASSERT ---
        let expected = Mat4::from_translation(Vec3::new(10.0, 2.0, 0.0));
        assert_matrix_approx_eq(scene.get(child).unwrap().matrix_world(), expected);
    }

    #[test]
    fn test_transform_propagation_rotation_and_manual_matrix() {
        // --- 1. ARRANGE ---
        let mut scene = Scene::new();
        let mut root = Object3D::group();
        root.rotation = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);
        let root = scene.add(root);
        let mut fixed = Object3D::group();
        fixed.set_matrix(Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0)));
        fixed.position = Vec3::new(100.0, 0.0, 0.0);
        let fixed = scene.add_child(root, fixed);
        let leaf = scene.add_child(fixed, Object3D::group());

        // --- 2. ACT ---
        scene.update_world_matrices();

        // --- 3. ASSERT ---
        // The manual matrix wins over `position`, then the root rotation maps +X to -Z.
        let leaf_world = scene.get(leaf).unwrap().world_position();
        assert!((leaf_world - Vec3::new(0.0, 0.0, -1.0)).length() < 1e-5);
    }
}
