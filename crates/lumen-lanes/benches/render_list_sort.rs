use criterion::{criterion_group, criterion_main, Criterion};
use lumen_core::resource::{GeometryKey, Material, MaterialKey, ObjectKey};
use lumen_core::Color;
use lumen_lanes::render_lane::{RenderItem, RenderList};
use slotmap::SlotMap;
use std::hint::black_box;

fn bench_sort(c: &mut Criterion) {
    let mut objects: SlotMap<ObjectKey, ()> = SlotMap::with_key();
    let materials: Vec<Material> = (0..16)
        .map(|i| {
            let mut material = Material::lambert(Color::WHITE);
            material.transparent = i % 4 == 0;
            material
        })
        .collect();

    // 10,000 items spread over 16 materials, a quarter of them transparent
    let items: Vec<(RenderItem, usize)> = (0..10_000u64)
        .map(|i| {
            let slot = (i as usize * 7) % materials.len();
            let item = RenderItem {
                object: objects.insert(()),
                object_id: i,
                geometry: GeometryKey::default(),
                material: MaterialKey::default(),
                material_id: materials[slot].id(),
                group_order: 0,
                render_order: (i % 3) as i32,
                z: ((i * 7919) % 1000) as f32 * 0.1,
                group: None,
            };
            (item, slot)
        })
        .collect();

    let mut group = c.benchmark_group("Render List");

    group.bench_function("Build and sort 10k items", |b| {
        let mut list = RenderList::new();
        b.iter(|| {
            list.init();
            for (item, slot) in &items {
                list.push(item.clone(), &materials[*slot]);
            }
            list.finish();
            list.sort(None, None);
            black_box(list.len());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_sort);
criterion_main!(benches);
