//! Basic landscape example
//!
//! Cooks a single sine heightfield into a landscape using bevy_houdini_landscape.
//!
//! Run with: `cargo run -p bevy_houdini_landscape --example basic`

use bevy::prelude::*;
use bevy_houdini_landscape::cook::CookRequest;
use bevy_houdini_landscape::prelude::*;

const SIZE: i32 = 64;

fn main() {
    App::new()
        .add_plugins(DefaultPlugins)
        .add_plugins(LandscapePlugin::builder().asset_name("basic").build())
        .add_systems(Startup, setup)
        .run();
}

fn setup(mut commands: Commands, mut cook: ResMut<LandscapeCook>) {
    let mut source = MemorySource::new();
    let heights = (0..SIZE * SIZE)
        .map(|i| {
            let (x, y) = ((i % SIZE) as f32, (i / SIZE) as f32);
            (x * 0.2).sin() * (y * 0.15).cos() * 4.0
        })
        .collect();
    let info = VolumeInfo::heightfield("height", SIZE, SIZE)
        .with_transform(Transform::from_scale(Vec3::new(0.5, 0.5, 0.5)));
    let part = source.add_volume(PartKey::new(1, 1, 0), info, heights);

    cook.request(CookRequest {
        outputs: vec![LandscapeOutput::new(OutputId(0), vec![part])],
        ..Default::default()
    });
    commands.insert_resource(LandscapeSource(Box::new(source)));

    // Camera
    commands.spawn((
        Camera3d::default(),
        Transform::from_xyz(32.0, 40.0, 90.0).looking_at(Vec3::new(32.0, 0.0, 32.0), Vec3::Y),
    ));

    // Directional light (sun)
    commands.spawn((
        DirectionalLight {
            shadows_enabled: true,
            illuminance: 15_000.0,
            ..default()
        },
        Transform::from_rotation(Quat::from_euler(
            EulerRot::XYZ,
            -std::f32::consts::FRAC_PI_3,
            -std::f32::consts::FRAC_PI_4,
            0.0,
        )),
    ));
}
