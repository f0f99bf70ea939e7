use bevy::input::mouse::AccumulatedMouseMotion;
use bevy::input::mouse::AccumulatedMouseScroll;
use bevy::prelude::*;
use bevy_houdini_landscape::Landscape;

pub struct CameraPlugin;

impl Plugin for CameraPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<OrbitFocus>()
            .add_systems(Startup, setup_camera)
            .add_systems(Update, (frame_landscapes, camera_movement).chain());
    }
}

/// Point the camera orbits around, recentered whenever landscapes change
#[derive(Resource, Default)]
struct OrbitFocus {
    target: Vec3,
    framed: usize,
}

fn setup_camera(mut commands: Commands) {
    commands.spawn((
        Camera3d::default(),
        Transform::from_xyz(0.0, 220.0, 260.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));
}

/// Recenter the orbit on the landscapes when their count changes.
fn frame_landscapes(
    mut focus: ResMut<OrbitFocus>,
    landscapes: Query<(&Landscape, &Transform)>,
    mut camera: Query<&mut Transform, (With<Camera3d>, Without<Landscape>)>,
) {
    let count = landscapes.iter().count();
    if count == 0 || count == focus.framed {
        return;
    }

    let mut bounds_min = Vec3::splat(f32::MAX);
    let mut bounds_max = Vec3::splat(f32::MIN);
    for (landscape, transform) in &landscapes {
        let far_corner = Vec3::new(landscape.size.x as f32 - 1.0, 0.0, landscape.size.y as f32 - 1.0);
        bounds_min = bounds_min.min(transform.translation);
        bounds_max = bounds_max.max(transform.transform_point(far_corner));
    }

    let center = (bounds_min + bounds_max) * 0.5;
    let radius = (bounds_max - bounds_min).length().max(10.0);
    let offset = center - focus.target;
    focus.target = center;
    focus.framed = count;

    for mut transform in &mut camera {
        if offset.length_squared() > 1.0 {
            transform.translation = center + Vec3::new(0.0, radius * 0.6, radius * 0.8);
            transform.look_at(center, Vec3::Y);
        }
    }
}

fn camera_movement(
    time: Res<Time>,
    keyboard: Res<ButtonInput<KeyCode>>,
    mouse_buttons: Res<ButtonInput<MouseButton>>,
    scroll: Res<AccumulatedMouseScroll>,
    mouse_motion: Res<AccumulatedMouseMotion>,
    mut focus: ResMut<OrbitFocus>,
    mut query: Query<&mut Transform, With<Camera3d>>,
) {
    let speed = 60.0;
    let zoom_speed = 0.1;
    let rotation_speed = 0.005;

    for mut transform in &mut query {
        let forward = transform.forward();
        let right = transform.right();

        // Pan on the XZ plane, dragging the orbit focus along
        let forward_xz = Vec3::new(forward.x, 0.0, forward.z).normalize_or_zero();
        let right_xz = Vec3::new(right.x, 0.0, right.z).normalize_or_zero();
        let mut velocity = Vec3::ZERO;
        if keyboard.pressed(KeyCode::KeyW) {
            velocity += forward_xz;
        }
        if keyboard.pressed(KeyCode::KeyS) {
            velocity -= forward_xz;
        }
        if keyboard.pressed(KeyCode::KeyA) {
            velocity -= right_xz;
        }
        if keyboard.pressed(KeyCode::KeyD) {
            velocity += right_xz;
        }
        let step = velocity * speed * time.delta_secs();
        transform.translation += step;
        focus.target += step;

        let to_camera = transform.translation - focus.target;

        // Mouse wheel zooms toward the focus
        if scroll.delta.y != 0.0 {
            let distance = (to_camera.length() * (1.0 - scroll.delta.y * zoom_speed)).clamp(5.0, 2000.0);
            transform.translation = focus.target + to_camera.normalize_or_zero() * distance;
        }

        // Right mouse button orbits (yaw + pitch) around the focus
        if mouse_buttons.pressed(MouseButton::Right) {
            let delta = mouse_motion.delta;
            let to_camera = transform.translation - focus.target;
            let distance = to_camera.length();
            let horizontal = Vec2::new(to_camera.x, to_camera.z);

            let yaw = horizontal.y.atan2(horizontal.x) - delta.x * rotation_speed;
            let pitch = (to_camera.y.atan2(horizontal.length()) + delta.y * rotation_speed).clamp(0.1, 1.45);

            transform.translation = focus.target
                + Vec3::new(
                    distance * pitch.cos() * yaw.cos(),
                    distance * pitch.sin(),
                    distance * pitch.cos() * yaw.sin(),
                );
        }

        let target = focus.target;
        transform.look_at(target, Vec3::Y);
    }
}
