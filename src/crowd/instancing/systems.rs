// src/crowd/instancing/systems.rs

use bevy::pbr::MeshMaterial3d;
use bevy::prelude::*;
use bevy::render::mesh::{Indices, Mesh, VertexAttributeValues};

use super::components::{BatchStats, InstanceBatch};

#[derive(Resource)]
pub struct CrowdInstancingConfig {
    /// Merge budget per frame; keeps large respawns from spiking a frame.
    pub max_merges_per_frame: usize,
}
impl Default for CrowdInstancingConfig {
    fn default() -> Self {
        Self { max_merges_per_frame: 2 }
    }
}

/// Bake each dirty batch's source mesh + instance transforms into one merged
/// mesh (one draw per archetype), within a small per-frame budget.
pub fn rebuild_dirty_batches(
    mut commands: Commands,
    mut q_batches: Query<(Entity, &mut InstanceBatch, &mut BatchStats)>,
    cfg: Res<CrowdInstancingConfig>,
    mut meshes: ResMut<Assets<Mesh>>,
) {
    if q_batches.is_empty() {
        return;
    }
    let mut merged_this_frame = 0usize;

    for (e, mut batch, mut stats) in q_batches.iter_mut() {
        if !batch.dirty {
            continue;
        }
        if merged_this_frame >= cfg.max_merges_per_frame {
            break;
        }

        let Some(src_mesh) = meshes.get(&batch.base_mesh).cloned() else {
            // Base mesh not ready yet
            continue;
        };

        let Some(merged) = merge_spectator_instances(&src_mesh, &batch.instances) else {
            warn!("Instancing: batch {:?} source mesh has no positions; dropping.", batch.archetype);
            batch.dirty = false;
            continue;
        };

        stats.instance_count = batch.instances.len() as u32;
        stats.merged_vertex_count = merged.count_vertices() as u32;

        let merged_handle = meshes.add(merged);
        commands.entity(e).insert((
            Mesh3d(merged_handle),
            // Shared crowd material; never forked per batch.
            MeshMaterial3d(batch.material.clone()),
            Visibility::Visible,
        ));

        batch.dirty = false;
        merged_this_frame += 1;
    }
}

/// Duplicate the source mesh once per instance transform. Positions take the
/// full transform; normals take rotation only (instances are unit-scale).
fn merge_spectator_instances(src: &Mesh, instances: &[Transform]) -> Option<Mesh> {
    let positions: Vec<[f32; 3]> = match src.attribute(Mesh::ATTRIBUTE_POSITION)? {
        VertexAttributeValues::Float32x3(v) => v.clone(),
        _ => return None,
    };

    let normals: Option<Vec<[f32; 3]>> = src
        .attribute(Mesh::ATTRIBUTE_NORMAL)
        .and_then(|vals| match vals {
            VertexAttributeValues::Float32x3(v) => Some(v.clone()),
            _ => None,
        });

    let uvs: Option<Vec<[f32; 2]>> = src
        .attribute(Mesh::ATTRIBUTE_UV_0)
        .and_then(|vals| match vals {
            VertexAttributeValues::Float32x2(v) => Some(v.clone()),
            _ => None,
        });

    let src_indices: Option<Vec<u32>> = match src.indices() {
        Some(Indices::U32(v)) => Some(v.clone()),
        Some(Indices::U16(v)) => Some(v.iter().map(|&x| x as u32).collect()),
        None => None,
    };

    let src_vtx = positions.len() as u32;
    let inst_n = instances.len().max(1);

    let mut out_positions = Vec::with_capacity(src_vtx as usize * inst_n);
    let mut out_normals: Option<Vec<[f32; 3]>> =
        normals.as_ref().map(|_| Vec::with_capacity(src_vtx as usize * inst_n));
    let mut out_uvs: Option<Vec<[f32; 2]>> =
        uvs.as_ref().map(|_| Vec::with_capacity(src_vtx as usize * inst_n));
    let mut out_indices: Vec<u32> =
        Vec::with_capacity(src_indices.as_ref().map(|ix| ix.len()).unwrap_or(0) * inst_n);

    for (inst_id, t) in instances.iter().enumerate() {
        let trs = Mat4::from_scale_rotation_translation(t.scale, t.rotation, t.translation);

        for (i, p) in positions.iter().enumerate() {
            let wp = trs * Vec4::new(p[0], p[1], p[2], 1.0);
            out_positions.push([wp.x, wp.y, wp.z]);

            if let (Some(src_n), Some(dst_n)) = (normals.as_ref(), out_normals.as_mut()) {
                let n = t.rotation * Vec3::from_array(src_n[i]);
                dst_n.push([n.x, n.y, n.z]);
            }
            if let (Some(src_uv), Some(dst_uv)) = (uvs.as_ref(), out_uvs.as_mut()) {
                dst_uv.push(src_uv[i]);
            }
        }

        if let Some(ix) = &src_indices {
            let base = (inst_id as u32) * src_vtx;
            out_indices.extend(ix.iter().map(|&i| i + base));
        }
    }

    let mut mesh = Mesh::new(bevy::render::mesh::PrimitiveTopology::TriangleList, Default::default());
    mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, out_positions);
    if let Some(n) = out_normals {
        mesh.insert_attribute(Mesh::ATTRIBUTE_NORMAL, n);
    }
    if let Some(uv) = out_uvs {
        mesh.insert_attribute(Mesh::ATTRIBUTE_UV_0, uv);
    }
    if src_indices.is_some() {
        mesh.insert_indices(Indices::U32(out_indices));
    }
    Some(mesh)
}
