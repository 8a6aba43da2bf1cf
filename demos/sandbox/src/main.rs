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

// Lumen Sandbox
// Renders a few frames of a lit scene on the headless device.
//
// Usage: sandbox [settings.ron] [frames]

use anyhow::{Context, Result};
use lumen_agents::Renderer;
use lumen_core::{
    math::{Mat4, Quat, Vec3},
    renderer::RendererSettings,
    resource::{
        AmbientLight, Camera, DirectionalLight, Geometry, Light, LightKind, Material, PointLight,
    },
    Color,
};
use lumen_data::{Assets, Fog, InstancedMesh, Object3D, ObjectKind, Renderable, Scene};
use lumen_infra::HeadlessDevice;

const DEFAULT_SETTINGS: &str = include_str!("../renderer.ron");
const DEFAULT_FRAMES: u32 = 3;
const INSTANCES: u32 = 16;

fn load_settings(path: Option<&str>) -> Result<RendererSettings> {
    let text = match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read renderer settings from '{path}'"))?,
        None => DEFAULT_SETTINGS.to_string(),
    };
    RendererSettings::from_ron_str(&text).context("Invalid renderer settings")
}

fn build_scene(assets: &mut Assets) -> Scene {
    let mut scene = Scene::new();
    scene.fog = Some(Fog::Linear {
        color: Color::rgb(0.02, 0.02, 0.04),
        near: 10.0,
        far: 60.0,
    });

    // Lights.
    scene.add(Object3D::light(Light::new(LightKind::Ambient(AmbientLight {
        color: Color::WHITE,
        intensity: 0.2,
    }))));
    let sun = Light::new(LightKind::Directional(DirectionalLight::default())).with_shadow();
    scene.add(Object3D::light(sun).with_position(Vec3::new(4.0, 10.0, 2.0)));
    let lamp = Light::new(LightKind::Point(PointLight {
        color: Color::rgb(1.0, 0.8, 0.6),
        ..PointLight::default()
    }))
    .with_shadow();
    scene.add(Object3D::light(lamp).with_position(Vec3::new(-2.0, 3.0, -4.0)));

    // Ground.
    let plane = assets.add_geometry(Geometry::plane(20.0, 20.0));
    let ground = assets.add_material(Material::standard(Color::rgb(0.5, 0.5, 0.5), 0.9, 0.0));
    let mut floor = Object3D::mesh(plane, ground).with_position(Vec3::new(0.0, -1.0, -6.0));
    floor.rotation = Quat::from_rotation_x(-std::f32::consts::FRAC_PI_2);
    floor.receive_shadow = true;
    scene.add(floor);

    // A row of shadow-casting boxes sharing one geometry.
    let cuboid = assets.add_geometry(Geometry::cuboid(1.0, 1.0, 1.0));
    let red = assets.add_material(Material::phong(Color::rgb(0.8, 0.1, 0.1), 30.0));
    let metal = assets.add_material(Material::standard(Color::rgb(0.9, 0.9, 0.95), 0.3, 1.0));
    for (index, material) in [red, metal, red].into_iter().enumerate() {
        let x = index as f32 * 2.0 - 2.0;
        let mut mesh = Object3D::mesh(cuboid, material).with_position(Vec3::new(x, 0.0, -6.0));
        mesh.cast_shadow = true;
        mesh.receive_shadow = true;
        scene.add(mesh);
    }

    // A glass pane in front of them.
    let glass = assets.add_material({
        let mut material = Material::basic(Color::rgb(0.3, 0.6, 1.0));
        material.transparent = true;
        material.opacity = 0.4;
        material
    });
    let pane = assets.add_geometry(Geometry::plane(6.0, 2.0));
    scene.add(Object3D::mesh(pane, glass).with_position(Vec3::new(0.0, 0.0, -4.0)));

    // A ring of instanced boxes drawn in a single call.
    let lambert = assets.add_material(Material::lambert(Color::rgb(0.2, 0.7, 0.3)));
    let mut ring = InstancedMesh::new(Renderable::new(cuboid, lambert), INSTANCES);
    for index in 0..INSTANCES {
        let angle = index as f32 / INSTANCES as f32 * std::f32::consts::TAU;
        let position = Vec3::new(angle.cos() * 6.0, 0.0, angle.sin() * 6.0 - 12.0);
        let matrix = Mat4::from_translation(position) * Mat4::from_scale(Vec3::splat(0.3));
        ring.set_matrix_at(index as usize, matrix);
    }
    scene.add(Object3D::new(ObjectKind::InstancedMesh(ring)));

    scene
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let settings = load_settings(args.first().map(String::as_str))?;
    let frames = match args.get(1) {
        Some(frames) => frames
            .parse()
            .with_context(|| format!("'{frames}' is not a frame count"))?,
        None => DEFAULT_FRAMES,
    };

    let device = HeadlessDevice::new().with_drawing_buffer_size(1280, 720);
    let probe = device.clone();
    let mut renderer = Renderer::new(Box::new(device), settings)?;

    let mut assets = Assets::new();
    let mut scene = build_scene(&mut assets);
    let mut camera = Camera::perspective(60.0, 1280.0 / 720.0, 0.1, 100.0);

    let created = renderer.compile(&scene, &camera, &assets)?;
    log::info!("Compiled {created} program(s) ahead of the first frame.");

    for frame in 0..frames {
        let angle = frame as f32 * 0.2;
        camera.set_position(Vec3::new(angle.sin() * 3.0, 2.0, angle.cos() * 3.0 + 2.0));
        camera.look_at(Vec3::new(0.0, 0.0, -6.0));

        probe.clear_calls();
        renderer.render(&mut scene, &camera, &mut assets)?;

        let info = renderer.info();
        log::info!(
            "Frame {}: {} draw call(s), {} triangle(s), {} device call(s).",
            info.render.frame,
            info.render.calls,
            info.render.triangles,
            probe.call_count()
        );
    }

    let info = renderer.info();
    log::info!(
        "Memory: {} geometries, {} textures, {} render targets, {} bytes. {} program(s).",
        info.memory.geometries,
        info.memory.textures,
        info.memory.render_targets,
        info.memory.gpu_bytes,
        info.programs
    );
    for diagnostic in renderer.diagnostics().iter() {
        log::warn!("Frame {}: {:?}", diagnostic.frame, diagnostic.kind);
    }
    for error in probe.errors() {
        log::error!("Device error: {error}");
    }

    renderer.dispose();
    Ok(())
}
