// src/crowd/instancing/mod.rs
//! Turning allocated positions into per-archetype instance batches.
//!
//! Archetype choice is uniform and independent per placement; yaw varies a
//! little around a fixed base orientation so no two spectators line up
//! perfectly. Grouping produces one transform list per archetype, which the
//! batch systems bake into a single draw each.

use bevy::prelude::*;
use rand::Rng;

use super::core::{CrowdPlacement, SpectatorArchetypeId, SurfacePoint};

pub mod components;
pub mod systems;

pub use components::{BatchStats, InstanceBatch};
pub use systems::{rebuild_dirty_batches, CrowdInstancingConfig};

/// Base facing: toward the stage front (+X in stage space).
pub const BASE_YAW: f32 = -std::f32::consts::FRAC_PI_2;

/// Half-range of the yaw variation around `BASE_YAW` (±10°).
pub const YAW_JITTER: f32 = std::f32::consts::PI / 18.0;

/// Assign a geometry and a yaw to each position.
pub fn assign_archetypes(
    positions: Vec<SurfacePoint>,
    archetype_count: usize,
    rng: &mut impl Rng,
) -> Vec<CrowdPlacement> {
    if archetype_count == 0 {
        return Vec::new();
    }

    positions
        .into_iter()
        .map(|p| CrowdPlacement {
            position: p.to_vec3(),
            archetype: SpectatorArchetypeId(rng.random_range(0..archetype_count) as u32),
            yaw: BASE_YAW + rng.random_range(-YAW_JITTER..YAW_JITTER),
        })
        .collect()
}

/// Group placements by archetype into per-instance transforms.
///
/// Translation drops each geometry by its bottom offset so the visual base
/// rests on the sampled point; rotation is the placement yaw; scale is unit.
pub fn group_transforms(
    placements: &[CrowdPlacement],
    bottom_offsets: &[f32],
) -> Vec<Vec<Transform>> {
    let mut groups: Vec<Vec<Transform>> = vec![Vec::new(); bottom_offsets.len()];

    for placement in placements {
        let idx = placement.archetype.0 as usize;
        let Some(group) = groups.get_mut(idx) else { continue };
        let offset = bottom_offsets[idx];
        group.push(Transform {
            translation: Vec3::new(
                placement.position.x,
                placement.position.y - offset,
                placement.position.z,
            ),
            rotation: Quat::from_rotation_y(placement.yaw),
            scale: Vec3::ONE,
        });
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn positions(n: usize) -> Vec<SurfacePoint> {
        (0..n).map(|i| SurfacePoint::new(i as f32, 1.0, 0.0)).collect()
    }

    #[test]
    fn every_position_gets_a_valid_archetype_and_yaw() {
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let placements = assign_archetypes(positions(1_000), 3, &mut rng);

        assert_eq!(placements.len(), 1_000);
        for p in &placements {
            assert!((p.archetype.0 as usize) < 3);
            assert!(p.yaw >= BASE_YAW - YAW_JITTER && p.yaw <= BASE_YAW + YAW_JITTER);
        }
    }

    #[test]
    fn all_archetypes_get_used_over_many_draws() {
        let mut rng = ChaCha8Rng::seed_from_u64(22);
        let placements = assign_archetypes(positions(1_000), 4, &mut rng);
        for arch in 0..4u32 {
            assert!(placements.iter().any(|p| p.archetype.0 == arch));
        }
    }

    #[test]
    fn grouping_partitions_placements_and_applies_offsets() {
        let mut rng = ChaCha8Rng::seed_from_u64(23);
        let placements = assign_archetypes(positions(500), 2, &mut rng);
        let groups = group_transforms(&placements, &[0.0, -0.5]);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].len() + groups[1].len(), 500);

        // Archetype 1 has its pivot 0.5 below the base, so instances lift.
        for t in &groups[1] {
            assert!((t.translation.y - 1.5).abs() < 1e-5);
            assert_eq!(t.scale, Vec3::ONE);
        }
        for t in &groups[0] {
            assert!((t.translation.y - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn zero_archetypes_yields_no_placements() {
        let mut rng = ChaCha8Rng::seed_from_u64(24);
        assert!(assign_archetypes(positions(10), 0, &mut rng).is_empty());
    }
}
