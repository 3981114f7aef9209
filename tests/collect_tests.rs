//! Call collection and ordering over whole scenes.

mod common;

use glam::Vec3;
use rstest::rstest;

use common::{box_at, camera};
use viewer_render::pipeline::{collect_calls, RenderCallLists, RenderPriority};
use viewer_render::resources::{AlphaMode, Material};
use viewer_render::scene::Scene;

/// Opaque and blended boxes interleaved, several at the same distance
fn mixed_scene() -> Scene {
    let mut scene = Scene::new();
    let glass = Material::glass();
    let masked = Material::plastic(Vec3::ONE).with_alpha_mode(AlphaMode::Mask);
    scene.add_entity(box_at("opaque_near", Vec3::new(0.0, 0.0, 2.0), Material::default()));
    scene.add_entity(box_at("glass_near", Vec3::new(0.0, 0.0, 4.0), glass.clone()));
    scene.add_entity(box_at("glass_far", Vec3::new(0.0, 0.0, -10.0), glass.clone()));
    scene.add_entity(box_at("tie_left", Vec3::new(-2.0, 0.0, 0.0), glass.clone()));
    scene.add_entity(box_at("opaque_far", Vec3::new(0.0, 0.0, -20.0), Material::default()));
    scene.add_entity(box_at("tie_right", Vec3::new(2.0, 0.0, 0.0), masked));
    scene
}

fn names(lists: &RenderCallLists) -> Vec<String> {
    lists.iter().map(|call| call.mesh.name.clone()).collect()
}

#[rstest]
#[case::no_priority(
    RenderPriority::NoPriority,
    &["opaque_near", "glass_near", "glass_far", "tie_left", "opaque_far", "tie_right"]
)]
#[case::alpha_first(
    RenderPriority::AlphaFirst,
    &["opaque_near", "opaque_far", "glass_near", "glass_far", "tie_left", "tie_right"]
)]
#[case::distance_sorted(
    RenderPriority::DistanceSorted,
    &["opaque_near", "opaque_far", "glass_far", "tie_left", "tie_right", "glass_near"]
)]
fn test_draw_order(#[case] policy: RenderPriority, #[case] expected: &[&str]) {
    let scene = mixed_scene();
    let mut lists = RenderCallLists::new(policy);
    let stats = collect_calls(&scene, &camera(), false, &mut lists);
    assert_eq!(stats.emitted, 6);
    assert_eq!(names(&lists), expected);
}

#[rstest]
#[case(RenderPriority::AlphaFirst)]
#[case(RenderPriority::DistanceSorted)]
fn test_partition_by_alpha_mode(#[case] policy: RenderPriority) {
    let scene = mixed_scene();
    let mut lists = RenderCallLists::new(policy);
    collect_calls(&scene, &camera(), false, &mut lists);
    assert_eq!(lists.opaque.len(), 2);
    assert!(lists.opaque.iter().all(|call| call.is_opaque()));
    assert!(lists.default.iter().all(|call| !call.is_opaque()));
    assert_eq!(lists.transparent().count(), 4);
}

#[test]
fn test_distance_sort_is_stable_across_frames() {
    let scene = mixed_scene();
    let mut lists = RenderCallLists::new(RenderPriority::DistanceSorted);
    collect_calls(&scene, &camera(), false, &mut lists);
    let first = names(&lists);
    for _ in 0..5 {
        collect_calls(&scene, &camera(), false, &mut lists);
        assert_eq!(names(&lists), first);
    }
}

#[test]
fn test_frustum_culling_counts() {
    let mut scene = mixed_scene();
    scene.add_entity(box_at("behind", Vec3::new(0.0, 0.0, 40.0), Material::default()));
    scene.add_entity(box_at("aside", Vec3::new(80.0, 0.0, 0.0), Material::default()));
    let mut lists = RenderCallLists::new(RenderPriority::DistanceSorted);

    let stats = collect_calls(&scene, &camera(), false, &mut lists);
    assert_eq!((stats.emitted, stats.culled), (6, 2));

    let stats = collect_calls(&scene, &camera(), true, &mut lists);
    assert_eq!((stats.emitted, stats.culled), (8, 0));
}
