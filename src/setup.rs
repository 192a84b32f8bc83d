use bevy::prelude::*;
use crate::input::CameraOrbit;

#[derive(Component)]
pub struct MainCamera;

pub fn setup(
    mut commands: Commands,
) {
    // 1) Light
    commands.spawn((
        PointLight {
            intensity: 8_000_000.0,
            range: 150.0,
            shadows_enabled: true,
            ..default()
        },
        Transform::from_xyz(6.0, 26.0, 10.0),
    ));

    // 2) Camera
    commands.spawn((
        Camera3d::default(),
        Transform::from_xyz(-30.0, 20.0, 28.0).looking_at(Vec3::ZERO, Vec3::Y),
        MainCamera,
        CameraOrbit {
            focus: Vec3::ZERO,
            radius: 45.0,
            yaw: 2.4,
            pitch: 0.45,
        },
    ));
}
