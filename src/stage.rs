// src/stage.rs
//! Stage-set glue: builds the spectator floor and the set pieces around it.
//!
//! The floor meshes carry the typed `SpawnArea` marker; the crowd engine
//! reads them through that component instead of hunting the scene graph for
//! a mesh by name. The stage front faces +X.

use bevy::pbr::MeshMaterial3d;
use bevy::prelude::*;
use bevy::render::mesh::{Indices, Mesh, PrimitiveTopology};

use crate::crowd::SpawnArea;

pub struct StagePlugin;

impl Plugin for StagePlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, spawn_stage);
    }
}

fn spawn_stage(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    // Spectator floor: an irregular apron, marked as the spawn area.
    let floor_mesh = meshes.add(build_apron_floor());
    let floor_mat = materials.add(StandardMaterial {
        base_color: Color::linear_rgb(0.23, 0.21, 0.20),
        perceptual_roughness: 0.95,
        metallic: 0.0,
        ..default()
    });
    commands.spawn((
        SpawnArea,
        Mesh3d(floor_mesh),
        MeshMaterial3d(floor_mat),
        Transform::default(),
        GlobalTransform::default(),
        Visibility::Visible,
        Name::new("SpawnArea Floor"),
    ));

    // Raised stage platform along the +X edge of the floor.
    let platform_mat = materials.add(StandardMaterial {
        base_color: Color::linear_rgb(0.30, 0.26, 0.22),
        perceptual_roughness: 0.8,
        ..default()
    });
    commands.spawn((
        Mesh3d(meshes.add(Cuboid::new(8.0, 2.0, 16.0))),
        MeshMaterial3d(platform_mat),
        Transform::from_xyz(23.0, 1.0, 0.0),
        GlobalTransform::default(),
        Visibility::Visible,
        Name::new("Stage Platform"),
    ));

    // Backdrop wall behind the platform.
    let backdrop_mat = materials.add(StandardMaterial {
        base_color: Color::linear_rgb(0.12, 0.12, 0.16),
        perceptual_roughness: 1.0,
        ..default()
    });
    commands.spawn((
        Mesh3d(meshes.add(Cuboid::new(1.0, 14.0, 22.0))),
        MeshMaterial3d(backdrop_mat),
        Transform::from_xyz(28.0, 7.0, 0.0),
        GlobalTransform::default(),
        Visibility::Visible,
        Name::new("Stage Backdrop"),
    ));
}

/// Flat six-sided apron around the origin, fan-triangulated about its
/// center. Irregular on purpose: the sampler must not assume a rectangle.
fn build_apron_floor() -> Mesh {
    // Ring in XZ, widest along x toward the stage.
    let ring = [
        Vec2::new(-15.0, -10.0),
        Vec2::new(15.0, -10.0),
        Vec2::new(19.0, 0.0),
        Vec2::new(15.0, 10.0),
        Vec2::new(-15.0, 10.0),
        Vec2::new(-19.0, 0.0),
    ];

    let mut positions: Vec<[f32; 3]> = vec![[0.0, 0.0, 0.0]];
    positions.extend(ring.iter().map(|p| [p.x, 0.0, p.y]));
    let normals = vec![[0.0f32, 1.0, 0.0]; positions.len()];
    let uvs: Vec<[f32; 2]> = positions
        .iter()
        .map(|p| [(p[0] + 19.0) / 38.0, (p[2] + 10.0) / 20.0])
        .collect();

    // Fan: center is index 0; wind each segment so the normal faces +Y.
    let n = ring.len() as u32;
    let mut indices: Vec<u32> = Vec::with_capacity(ring.len() * 3);
    for i in 0..n {
        let cur = 1 + i;
        let next = 1 + (i + 1) % n;
        indices.extend_from_slice(&[0, next, cur]);
    }

    let mut mesh = Mesh::new(PrimitiveTopology::TriangleList, Default::default());
    mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, positions);
    mesh.insert_attribute(Mesh::ATTRIBUTE_NORMAL, normals);
    mesh.insert_attribute(Mesh::ATTRIBUTE_UV_0, uvs);
    mesh.insert_indices(Indices::U32(indices));
    mesh
}
