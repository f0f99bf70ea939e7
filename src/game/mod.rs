use bevy::prelude::*;
use bevy_houdini_landscape::prelude::*;

pub struct GamePlugin;

impl Plugin for GamePlugin {
    fn build(&self, app: &mut App) {
        let landscapes = LandscapePlugin::builder()
            .asset_name("procedural_terrain")
            .component_guid("5c1e9a4b0d2f4e87")
            .build();

        app.add_plugins(landscapes)
            .add_plugins(camera::CameraPlugin)
            .add_plugins(session::SessionPlugin)
            .add_systems(Startup, setup_lights);
    }
}

mod camera;
mod session;

fn setup_lights(mut commands: Commands) {
    // Directional light (sun)
    commands.spawn((
        DirectionalLight {
            shadows_enabled: true,
            illuminance: 12_000.0,
            ..default()
        },
        Transform::from_rotation(Quat::from_euler(
            EulerRot::XYZ,
            -std::f32::consts::FRAC_PI_4,
            -std::f32::consts::FRAC_PI_6,
            0.0,
        )),
    ));
}
