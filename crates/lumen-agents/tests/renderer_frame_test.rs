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

//! Integration tests for whole frames: batching, bucket order, caching and the
//! context loss cycle, observed through the headless device's call log.

use anyhow::Result;
use lumen_agents::{Lifecycle, Renderer};
use lumen_core::{
    math::Vec3,
    renderer::{DiagnosticKind, RenderError, RendererSettings, ToneMapping, UniformValue},
    resource::{
        BasicParams, Camera, DirectionalLight, Geometry, Light, LightKind, Material, MaterialKind,
        RenderTargetDescriptor,
    },
    Color,
};
use lumen_data::{Assets, Object3D, Scene};
use lumen_infra::{DeviceCall, HeadlessDevice};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Helper: a renderer drawing into a fresh headless device, and a probe on it.
fn headless_renderer() -> Result<(Renderer, HeadlessDevice)> {
    init_logging();
    let probe = HeadlessDevice::new();
    let renderer = Renderer::new(Box::new(probe.clone()), RendererSettings::default())?;
    Ok((renderer, probe))
}

fn camera() -> Camera {
    Camera::perspective(50.0, 800.0 / 600.0, 0.1, 100.0)
}

fn draw_index_counts(calls: &[DeviceCall]) -> Vec<u32> {
    calls
        .iter()
        .filter_map(|call| match call {
            DeviceCall::DrawElements { count, .. } => Some(*count),
            _ => None,
        })
        .collect()
}

#[test]
fn test_meshes_sharing_a_material_share_one_program() -> Result<()> {
    // --- 1. ARRANGE ---
    let (mut renderer, probe) = headless_renderer()?;
    let mut assets = Assets::new();
    let mut scene = Scene::new();
    let geometry = assets.add_geometry(Geometry::cuboid(1.0, 1.0, 1.0));
    let material = assets.add_material(Material::basic(Color::rgb(1.0, 0.0, 0.0)));
    scene.add(Object3D::mesh(geometry, material).with_position(Vec3::new(-1.0, 0.0, -5.0)));
    scene.add(Object3D::mesh(geometry, material).with_position(Vec3::new(1.0, 0.0, -5.0)));

    // --- 2. ACT ---
    renderer.render(&mut scene, &camera(), &mut assets)?;

    // --- 3. ASSERT ---
    assert_eq!(renderer.info().programs, 1);
    assert_eq!(probe.live_programs(), 1);
    assert_eq!(probe.draw_calls().len(), 2);
    assert_eq!(renderer.info().render.calls, 2);
    assert_eq!(renderer.info().memory.geometries, 1);
    Ok(())
}

#[test]
fn test_opaque_objects_draw_before_transparent_ones() -> Result<()> {
    // --- 1. ARRANGE ---
    let (mut renderer, probe) = headless_renderer()?;
    let mut assets = Assets::new();
    let mut scene = Scene::new();
    let cuboid = assets.add_geometry(Geometry::cuboid(1.0, 1.0, 1.0));
    let plane = assets.add_geometry(Geometry::plane(1.0, 1.0));
    let opaque = assets.add_material(Material::basic(Color::WHITE));
    let mut glass = Material::basic(Color::rgb(0.2, 0.4, 1.0));
    glass.transparent = true;
    glass.opacity = 0.5;
    let glass = assets.add_material(glass);
    // The transparent plane is closer to the camera and added first.
    scene.add(Object3D::mesh(plane, glass).with_position(Vec3::new(0.0, 0.0, -3.0)));
    scene.add(Object3D::mesh(cuboid, opaque).with_position(Vec3::new(0.0, 0.0, -8.0)));

    // --- 2. ACT ---
    renderer.render(&mut scene, &camera(), &mut assets)?;

    // --- 3. ASSERT ---
    let counts = draw_index_counts(&probe.draw_calls());
    assert_eq!(counts.len(), 2);
    assert_ne!(counts[0], 6, "the opaque cuboid must be drawn first");
    assert_eq!(counts[1], 6, "the transparent plane must be drawn last");
    Ok(())
}

#[test]
fn test_group_render_order_outranks_depth() -> Result<()> {
    // --- 1. ARRANGE ---
    let (mut renderer, probe) = headless_renderer()?;
    let mut assets = Assets::new();
    let mut scene = Scene::new();
    let cuboid = assets.add_geometry(Geometry::cuboid(1.0, 1.0, 1.0));
    let plane = assets.add_geometry(Geometry::plane(1.0, 1.0));
    let material = assets.add_material(Material::basic(Color::WHITE));
    let late = scene.add(Object3D::group());
    if let Some(group) = scene.get_mut(late) {
        group.render_order = 10;
    }
    let early = scene.add(Object3D::group());
    // The plane is nearer, so depth alone would draw it first.
    scene.add_child(
        late,
        Object3D::mesh(plane, material).with_position(Vec3::new(0.0, 0.0, -3.0)),
    );
    scene.add_child(
        early,
        Object3D::mesh(cuboid, material).with_position(Vec3::new(0.0, 0.0, -8.0)),
    );

    // --- 2. ACT ---
    renderer.render(&mut scene, &camera(), &mut assets)?;

    // --- 3. ASSERT ---
    let counts = draw_index_counts(&probe.draw_calls());
    assert_eq!(counts.len(), 2);
    assert_eq!(counts[0], 36, "the group with the lower render order draws first");
    assert_eq!(counts[1], 6, "the plane's group has render order 10");
    Ok(())
}

#[test]
fn test_second_frame_uploads_nothing_unchanged() -> Result<()> {
    // --- 1. ARRANGE ---
    let (mut renderer, probe) = headless_renderer()?;
    let mut assets = Assets::new();
    let mut scene = Scene::new();
    let geometry = assets.add_geometry(Geometry::cuboid(1.0, 1.0, 1.0));
    let material = assets.add_material(Material::basic(Color::WHITE));
    scene.add(Object3D::mesh(geometry, material).with_position(Vec3::new(0.0, 0.0, -5.0)));
    renderer.render(&mut scene, &camera(), &mut assets)?;
    let first_uniforms = probe.count_calls(|c| matches!(c, DeviceCall::Uniform(..)));
    probe.clear_calls();

    // --- 2. ACT ---
    renderer.render(&mut scene, &camera(), &mut assets)?;

    // --- 3. ASSERT ---
    assert!(first_uniforms > 0);
    assert_eq!(probe.count_calls(|c| matches!(c, DeviceCall::BufferData { .. })), 0);
    assert_eq!(probe.count_calls(|c| matches!(c, DeviceCall::CreateProgram(_))), 0);
    assert_eq!(probe.count_calls(|c| matches!(c, DeviceCall::Uniform(..))), 0);
    assert_eq!(probe.draw_calls().len(), 1);
    Ok(())
}

#[test]
fn test_changed_uniform_is_the_only_one_uploaded() -> Result<()> {
    // --- 1. ARRANGE ---
    let (mut renderer, probe) = headless_renderer()?;
    let mut assets = Assets::new();
    let mut scene = Scene::new();
    let geometry = assets.add_geometry(Geometry::cuboid(1.0, 1.0, 1.0));
    let material = assets.add_material(Material::basic(Color::WHITE));
    scene.add(Object3D::mesh(geometry, material).with_position(Vec3::new(0.0, 0.0, -5.0)));
    renderer.render(&mut scene, &camera(), &mut assets)?;
    probe.clear_calls();

    // --- 2. ACT ---
    if let Some(material) = assets.material_mut(material) {
        material.kind = MaterialKind::Basic(BasicParams {
            color: Color::rgb(0.25, 0.5, 0.75),
        });
    }
    renderer.render(&mut scene, &camera(), &mut assets)?;

    // --- 3. ASSERT ---
    assert_eq!(probe.count_calls(|c| matches!(c, DeviceCall::Uniform(..))), 1);
    let program = probe.current_program().expect("a program should be in use");
    match probe.uniform_value(program, "diffuse") {
        Some(UniformValue::Vec3(color)) => {
            approx::assert_relative_eq!(color.x, 0.25);
            approx::assert_relative_eq!(color.y, 0.5);
            approx::assert_relative_eq!(color.z, 0.75);
        }
        other => panic!("unexpected diffuse uniform: {other:?}"),
    }
    Ok(())
}

#[test]
fn test_compile_builds_programs_ahead_of_the_first_frame() -> Result<()> {
    // --- 1. ARRANGE ---
    let (mut renderer, probe) = headless_renderer()?;
    let mut assets = Assets::new();
    let mut scene = Scene::new();
    let geometry = assets.add_geometry(Geometry::cuboid(1.0, 1.0, 1.0));
    let red = assets.add_material(Material::basic(Color::rgb(1.0, 0.0, 0.0)));
    let lit = assets.add_material(Material::lambert(Color::WHITE));
    scene.add(Object3D::mesh(geometry, red).with_position(Vec3::new(-1.0, 0.0, -5.0)));
    scene.add(Object3D::mesh(geometry, lit).with_position(Vec3::new(1.0, 0.0, -5.0)));

    // --- 2. ACT ---
    let created = renderer.compile(&scene, &camera(), &assets)?;
    probe.clear_calls();
    renderer.render(&mut scene, &camera(), &mut assets)?;

    // --- 3. ASSERT ---
    assert_eq!(created, 2);
    assert_eq!(probe.count_calls(|c| matches!(c, DeviceCall::CreateProgram(_))), 0);
    assert_eq!(probe.draw_calls().len(), 2);
    Ok(())
}

#[test]
fn test_compile_accounts_for_shadowed_lights() -> Result<()> {
    // --- 1. ARRANGE ---
    init_logging();
    let probe = HeadlessDevice::new();
    let mut settings = RendererSettings::default();
    settings.shadow_map.enabled = true;
    let mut renderer = Renderer::new(Box::new(probe.clone()), settings)?;
    let mut assets = Assets::new();
    let mut scene = Scene::new();
    let sun = Light::new(LightKind::Directional(DirectionalLight::default())).with_shadow();
    scene.add(Object3D::light(sun).with_position(Vec3::new(0.0, 10.0, 0.0)));
    let geometry = assets.add_geometry(Geometry::cuboid(1.0, 1.0, 1.0));
    let material = assets.add_material(Material::lambert(Color::WHITE));
    let mut mesh = Object3D::mesh(geometry, material).with_position(Vec3::new(0.0, 0.0, -5.0));
    mesh.receive_shadow = true;
    scene.add(mesh);

    // --- 2. ACT ---
    let created = renderer.compile(&scene, &camera(), &assets)?;
    probe.clear_calls();
    renderer.render(&mut scene, &camera(), &mut assets)?;

    // --- 3. ASSERT ---
    assert_eq!(created, 1);
    assert_eq!(probe.count_calls(|c| matches!(c, DeviceCall::CreateProgram(_))), 0);
    assert_eq!(renderer.info().programs, 1);
    Ok(())
}

#[test]
fn test_transmission_pass_draws_opaque_objects_linear() -> Result<()> {
    // --- 1. ARRANGE ---
    init_logging();
    let probe = HeadlessDevice::new();
    let mut settings = RendererSettings::default();
    settings.tone_mapping = ToneMapping::AcesFilmic;
    let mut renderer = Renderer::new(Box::new(probe.clone()), settings)?;
    let mut assets = Assets::new();
    let mut scene = Scene::new();
    let geometry = assets.add_geometry(Geometry::cuboid(1.0, 1.0, 1.0));
    let opaque = assets.add_material(Material::basic(Color::WHITE));
    let glass = assets.add_material(Material::physical(Color::WHITE, 0.8));
    scene.add(Object3D::mesh(geometry, opaque).with_position(Vec3::new(0.0, 0.0, -8.0)));
    scene.add(Object3D::mesh(geometry, glass).with_position(Vec3::new(0.0, 0.0, -4.0)));

    // --- 2. ACT ---
    let created = renderer.compile(&scene, &camera(), &assets)?;
    probe.clear_calls();
    renderer.render(&mut scene, &camera(), &mut assets)?;

    // --- 3. ASSERT ---
    // Opaque offscreen, opaque on screen and the tone-mapped glass.
    assert_eq!(created, 3);
    assert_eq!(probe.count_calls(|c| matches!(c, DeviceCall::CreateProgram(_))), 0);
    assert_eq!(renderer.info().programs, 3);
    Ok(())
}

#[test]
fn test_shader_compile_failure_does_not_abort_the_frame() -> Result<()> {
    // --- 1. ARRANGE ---
    let (mut renderer, probe) = headless_renderer()?;
    let mut assets = Assets::new();
    let mut scene = Scene::new();
    let geometry = assets.add_geometry(Geometry::cuboid(1.0, 1.0, 1.0));
    let broken = assets.add_material(Material::shader(
        "void main() {\n  gl_Position = projectionMatrix * modelViewMatrix * vec4(position, 1.0);\n}\n",
        "void main() {}\n#error broken shader\n",
    ));
    let valid = assets.add_material(Material::basic(Color::WHITE));
    scene.add(Object3D::mesh(geometry, broken).with_position(Vec3::new(-1.0, 0.0, -5.0)));
    scene.add(Object3D::mesh(geometry, valid).with_position(Vec3::new(1.0, 0.0, -5.0)));

    // --- 2. ACT ---
    let result = renderer.render(&mut scene, &camera(), &mut assets);

    // --- 3. ASSERT ---
    assert!(result.is_ok(), "a bad shader must not abort the frame");
    // The broken program keeps its program object, so both objects still draw.
    assert_eq!(probe.draw_calls().len(), 2);
    assert_eq!(renderer.info().programs, 2);
    let failures = renderer
        .diagnostics()
        .count(|kind| matches!(kind, DiagnosticKind::ShaderCompile { .. }));
    assert!(failures >= 1);
    let logged = renderer.diagnostics().iter().any(|d| match &d.kind {
        DiagnosticKind::ShaderCompile { log, .. } => log.contains("broken shader"),
        _ => false,
    });
    assert!(logged, "the driver log should be kept in the diagnostic");
    Ok(())
}

#[test]
fn test_context_loss_pauses_and_restoration_resumes() -> Result<()> {
    // --- 1. ARRANGE ---
    let (mut renderer, probe) = headless_renderer()?;
    let mut assets = Assets::new();
    let mut scene = Scene::new();
    let geometry = assets.add_geometry(Geometry::cuboid(1.0, 1.0, 1.0));
    let material = assets.add_material(Material::lambert(Color::WHITE));
    scene.add(Object3D::mesh(geometry, material).with_position(Vec3::new(0.0, 0.0, -5.0)));
    renderer.render(&mut scene, &camera(), &mut assets)?;
    let first_frame = probe.draw_calls();

    // --- 2. ACT ---
    probe.clear_calls();
    probe.lose_context();
    renderer.render(&mut scene, &camera(), &mut assets)?;
    let while_lost = probe.draw_calls();
    let lifecycle_while_lost = renderer.lifecycle();

    probe.restore_context();
    probe.clear_calls();
    renderer.render(&mut scene, &camera(), &mut assets)?;

    // --- 3. ASSERT ---
    assert!(while_lost.is_empty());
    assert_eq!(lifecycle_while_lost, Lifecycle::Lost);
    assert_eq!(renderer.lifecycle(), Lifecycle::Active);
    assert_eq!(probe.draw_calls(), first_frame);
    assert_eq!(probe.live_programs(), 1);
    let diagnostics = renderer.diagnostics();
    assert_eq!(diagnostics.count(|k| matches!(k, DiagnosticKind::ContextLost)), 1);
    assert_eq!(diagnostics.count(|k| matches!(k, DiagnosticKind::ContextRestored)), 1);
    Ok(())
}

#[test]
fn test_assets_from_another_store_are_rejected() -> Result<()> {
    // --- 1. ARRANGE ---
    let (mut renderer, _probe) = headless_renderer()?;
    let mut scene = Scene::new();
    let mut first = Assets::new();
    let mut second = Assets::new();
    renderer.render(&mut scene, &camera(), &mut first)?;

    // --- 2. ACT ---
    let result = renderer.render(&mut scene, &camera(), &mut second);

    // --- 3. ASSERT ---
    assert!(matches!(result, Err(RenderError::InvalidUsage(_))));
    Ok(())
}

#[test]
fn test_render_target_face_and_level_are_validated() -> Result<()> {
    // --- 1. ARRANGE ---
    let (mut renderer, _probe) = headless_renderer()?;
    let mut descriptor = RenderTargetDescriptor::new(256, 256);
    descriptor.generate_mipmaps = false;
    let target = renderer.create_render_target(descriptor);

    // --- 2. ACT ---
    let bad_face = renderer.set_render_target(Some(target), 1, 0);
    let bad_level = renderer.set_render_target(Some(target), 0, 3);
    let good = renderer.set_render_target(Some(target), 0, 0);

    // --- 3. ASSERT ---
    assert!(matches!(bad_face, Err(RenderError::InvalidUsage(_))));
    assert!(matches!(bad_level, Err(RenderError::InvalidUsage(_))));
    assert!(good.is_ok());
    assert_eq!(renderer.render_target(), Some(target));
    Ok(())
}

#[test]
fn test_frame_into_render_target_uses_its_size() -> Result<()> {
    // --- 1. ARRANGE ---
    let (mut renderer, probe) = headless_renderer()?;
    let mut assets = Assets::new();
    let mut scene = Scene::new();
    let geometry = assets.add_geometry(Geometry::cuboid(1.0, 1.0, 1.0));
    let material = assets.add_material(Material::basic(Color::WHITE));
    scene.add(Object3D::mesh(geometry, material).with_position(Vec3::new(0.0, 0.0, -5.0)));
    let target = renderer.create_render_target(RenderTargetDescriptor::new(128, 64));
    renderer.set_render_target(Some(target), 0, 0)?;

    // --- 2. ACT ---
    renderer.render(&mut scene, &camera(), &mut assets)?;

    // --- 3. ASSERT ---
    assert!(probe.current_framebuffer().is_some());
    let viewport = probe.calls().into_iter().rev().find_map(|call| match call {
        DeviceCall::Viewport(rect) => Some(rect),
        _ => None,
    });
    let viewport = viewport.expect("a viewport should have been set");
    assert_eq!((viewport.width, viewport.height), (128, 64));
    assert_eq!(renderer.info().memory.render_targets, 1);
    assert_eq!(probe.draw_calls().len(), 1);
    Ok(())
}
