// src/crowd/instancing/components.rs

use bevy::prelude::*;

use crate::crowd::core::SpectatorArchetypeId;

/// One logical batch per spectator archetype with a nonzero instance count.
/// Destroyed and rebuilt on every respawn; never shared across archetypes.
#[derive(Component)]
pub struct InstanceBatch {
    pub archetype: SpectatorArchetypeId,
    /// The shared source mesh to duplicate.
    pub base_mesh: Handle<Mesh>,
    /// The crowd-wide shared material; owned elsewhere, never forked here.
    pub material: Handle<StandardMaterial>,
    /// Final world-space instance transforms.
    pub instances: Vec<Transform>,
    /// True until the merged mesh has been built.
    pub dirty: bool,
}

#[derive(Component, Default)]
pub struct BatchStats {
    pub instance_count: u32,
    pub merged_vertex_count: u32,
}
