use bevy::input::mouse::{MouseScrollUnit, MouseWheel};
use bevy::prelude::*;
use bevy::input::{mouse::MouseMotion, keyboard::KeyCode, ButtonInput};

use crate::crowd::{CrowdState, RespawnCrowd};
use crate::setup::MainCamera;

pub const ROTATE_SPEED: f32 = 0.2;
pub const MAX_CAMERA_DT: f32 = 0.05; // never use a dt larger than 50ms

/// Crowd sizes on the number row; Digit0 clears, KeyR re-rolls.
pub const CROWD_PRESETS: [(KeyCode, usize); 5] = [
    (KeyCode::Digit1, 100),
    (KeyCode::Digit2, 250),
    (KeyCode::Digit3, 500),
    (KeyCode::Digit4, 1000),
    (KeyCode::Digit5, 2000),
];

#[derive(Component)]
pub struct CameraOrbit {
    pub focus: Vec3,
    pub radius: f32,
    pub yaw: f32,
    pub pitch: f32,
}

/// Map the number row to respawn requests.
pub fn crowd_hotkeys(
    keys: Res<ButtonInput<KeyCode>>,
    state: Res<CrowdState>,
    mut respawns: EventWriter<RespawnCrowd>,
) {
    for (key, count) in CROWD_PRESETS {
        if keys.just_pressed(key) {
            respawns.write(RespawnCrowd { count });
            return;
        }
    }
    if keys.just_pressed(KeyCode::Digit0) {
        respawns.write(RespawnCrowd { count: 0 });
    } else if keys.just_pressed(KeyCode::KeyR) && state.population > 0 {
        // Re-roll the same crowd size onto fresh positions.
        respawns.write(RespawnCrowd { count: state.population });
    }
}

pub fn camera_controller(
    time: Res<Time>,
    mouse_buttons: Res<ButtonInput<MouseButton>>,
    mut motion_evr: EventReader<MouseMotion>,
    mut scroll_evr: EventReader<MouseWheel>,
    mut query: Query<(&mut Transform, &mut CameraOrbit), With<MainCamera>>,
) {
    // 0) Clamp delta
    let mut dt = time.delta_secs();
    if dt > MAX_CAMERA_DT {
        dt = MAX_CAMERA_DT;
    }

    let Ok((mut tf, mut orbit)) = query.single_mut() else { return; };

    // 1) Zoom
    for ev in scroll_evr.read() {
        let amount = match ev.unit {
            MouseScrollUnit::Line => ev.y * 1.0,
            MouseScrollUnit::Pixel => ev.y * 0.02,
        };
        orbit.radius = (orbit.radius - amount).clamp(5.0, 200.0);
    }

    // 2) Orbit
    if mouse_buttons.pressed(MouseButton::Middle) {
        for ev in motion_evr.read() {
            orbit.yaw += ev.delta.x * ROTATE_SPEED * dt;
            orbit.pitch += ev.delta.y * ROTATE_SPEED * dt;
        }
    }

    orbit.pitch = orbit.pitch.clamp(
        0.05,
        std::f32::consts::FRAC_PI_2 - 0.01,
    );

    // 3) Position camera (stage floor is flat; focus stays on it)
    let xz_radius = orbit.radius * orbit.pitch.cos();
    let offset = Vec3::new(
        xz_radius * orbit.yaw.cos(),
        orbit.radius * orbit.pitch.sin(),
        xz_radius * orbit.yaw.sin(),
    );

    tf.translation = orbit.focus + offset;
    tf.look_at(orbit.focus, Vec3::Y);
}
