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

//! Integration tests for resource lifetimes: garbage collection of disposed
//! assets, degraded textures and shadow maps, and full disposal.

use anyhow::Result;
use lumen_agents::Renderer;
use lumen_core::{
    math::{UVec2, Vec3},
    renderer::{DiagnosticKind, Limit, MemoryInfo, RendererSettings},
    resource::{
        Camera, DirectionalLight, Geometry, Image, Light, LightKind, MapSource, Material,
        Texture,
    },
    Color,
};
use lumen_data::{Assets, Object3D, Scene};
use lumen_infra::HeadlessDevice;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn camera() -> Camera {
    Camera::perspective(50.0, 800.0 / 600.0, 0.1, 100.0)
}

#[test]
fn test_collect_garbage_returns_memory_to_its_initial_state() -> Result<()> {
    // --- 1. ARRANGE ---
    init_logging();
    let probe = HeadlessDevice::new();
    let mut renderer = Renderer::new(Box::new(probe.clone()), RendererSettings::default())?;
    let before = renderer.info().memory;
    let mut assets = Assets::new();
    let mut scene = Scene::new();
    let geometry = assets.add_geometry(Geometry::cuboid(1.0, 1.0, 1.0));
    let material = assets.add_material(Material::basic(Color::WHITE));
    let mesh = scene.add(Object3D::mesh(geometry, material).with_position(Vec3::new(0.0, 0.0, -5.0)));
    renderer.render(&mut scene, &camera(), &mut assets)?;
    assert_eq!(renderer.info().memory.geometries, 1);
    assert_eq!(renderer.info().programs, 1);

    // --- 2. ACT ---
    scene.remove(mesh);
    assets.dispose_geometry(geometry);
    assets.dispose_material(material);
    let handled = renderer.collect_garbage(&mut assets);

    // --- 3. ASSERT ---
    assert_eq!(handled, 2);
    assert_eq!(renderer.info().memory, before);
    assert_eq!(renderer.info().programs, 0);
    assert_eq!(probe.live_programs(), 0);
    assert_eq!(probe.live_buffers(), 0);
    Ok(())
}

#[test]
fn test_oversized_texture_falls_back_and_is_reported_once() -> Result<()> {
    // --- 1. ARRANGE ---
    init_logging();
    let probe = HeadlessDevice::new().with_limit(Limit::MaxTextureSize, 64);
    let mut renderer = Renderer::new(Box::new(probe.clone()), RendererSettings::default())?;
    let mut assets = Assets::new();
    let mut scene = Scene::new();
    let texture = assets.add_texture(Texture::new(Image::solid_rgba8(128, 128, [255, 0, 0, 255])));
    let geometry = assets.add_geometry(Geometry::plane(1.0, 1.0));
    let mut material = Material::basic(Color::WHITE);
    material.maps.map = Some(MapSource::Texture(texture));
    let material = assets.add_material(material);
    scene.add(Object3D::mesh(geometry, material).with_position(Vec3::new(0.0, 0.0, -5.0)));

    // --- 2. ACT ---
    renderer.render(&mut scene, &camera(), &mut assets)?;
    renderer.render(&mut scene, &camera(), &mut assets)?;

    // --- 3. ASSERT ---
    let fallbacks = renderer
        .diagnostics()
        .count(|kind| matches!(kind, DiagnosticKind::TextureFallback { .. }));
    assert_eq!(fallbacks, 1);
    assert_eq!(renderer.info().render.calls, 1, "the mesh still draws with the placeholder");
    Ok(())
}

#[test]
fn test_oversized_shadow_map_is_clamped_and_reported_once() -> Result<()> {
    // --- 1. ARRANGE ---
    init_logging();
    let device = HeadlessDevice::new().with_limit(Limit::MaxTextureSize, 1024);
    let mut settings = RendererSettings::default();
    settings.shadow_map.enabled = true;
    let mut renderer = Renderer::new(Box::new(device), settings)?;

    let mut assets = Assets::new();
    let mut scene = Scene::new();
    let mut sun = Light::new(LightKind::Directional(DirectionalLight::default())).with_shadow();
    if let Some(shadow) = sun.shadow.as_mut() {
        shadow.map_size = UVec2::splat(4096);
    }
    let light = scene.add(Object3D::light(sun).with_position(Vec3::new(0.0, 10.0, 0.0)));
    let geometry = assets.add_geometry(Geometry::cuboid(1.0, 1.0, 1.0));
    let material = assets.add_material(Material::lambert(Color::WHITE));
    let mut mesh = Object3D::mesh(geometry, material).with_position(Vec3::new(0.0, 0.0, -5.0));
    mesh.cast_shadow = true;
    mesh.receive_shadow = true;
    scene.add(mesh);

    // --- 2. ACT ---
    renderer.render(&mut scene, &camera(), &mut assets)?;
    renderer.render(&mut scene, &camera(), &mut assets)?;

    // --- 3. ASSERT ---
    let map = renderer
        .shadow_map(scene.id(), light)
        .expect("the light should own a shadow map");
    let descriptor = renderer
        .render_target_descriptor(map)
        .expect("the shadow map should be a live render target");
    assert_eq!((descriptor.width, descriptor.height), (1024, 1024));

    let stored = scene
        .get(light)
        .and_then(|object| object.kind.light())
        .and_then(|light| light.shadow)
        .map(|shadow| shadow.map_size);
    assert_eq!(stored, Some(UVec2::splat(1024)));

    let clamped = renderer
        .diagnostics()
        .count(|kind| matches!(kind, DiagnosticKind::ShadowMapClamped { .. }));
    assert_eq!(clamped, 1);
    Ok(())
}

#[test]
fn test_dispose_releases_every_device_object() -> Result<()> {
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
    mesh.cast_shadow = true;
    scene.add(mesh);
    renderer.render(&mut scene, &camera(), &mut assets)?;
    assert!(probe.live_textures() > 0);

    // --- 2. ACT ---
    renderer.dispose();

    // --- 3. ASSERT ---
    assert_eq!(probe.live_programs(), 0);
    assert_eq!(probe.live_buffers(), 0);
    assert_eq!(probe.live_textures(), 0);
    assert_eq!(probe.live_framebuffers(), 0);
    assert_eq!(renderer.info().memory, MemoryInfo::default());

    // The renderer stays usable.
    probe.clear_calls();
    renderer.render(&mut scene, &camera(), &mut assets)?;
    assert!(!probe.draw_calls().is_empty());
    assert_eq!(probe.live_programs(), renderer.info().programs);
    Ok(())
}
