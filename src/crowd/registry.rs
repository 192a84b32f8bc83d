// src/crowd/registry.rs
//! Data-driven spectator archetypes + loader.
//!
//! The manifest (`.crowd.ron`) lists the population geometries a crowd may
//! draw from; the pool resolves those entries into mesh handles and
//! precomputes each geometry's bottom offset once the asset arrives.

use bevy::asset::{io::Reader, AssetLoader, LoadContext, LoadState};
use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::core::SpectatorArchetypeId;
use super::plugin::RegistryHandle;

// ---------- Public plugin to register asset+loader ----------

pub struct SpectatorRegistryAssetPlugin;

impl Plugin for SpectatorRegistryAssetPlugin {
    fn build(&self, app: &mut App) {
        app.init_asset::<SpectatorRegistry>()
            .register_asset_loader(SpectatorRegistryLoader);
    }
}

// ---------- Archetype definition (data form) ----------

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SpectatorDef {
    /// Unique human-readable name (used for lookup and batch naming).
    pub name: String,
    /// Asset path of the spectator mesh (e.g. a labeled glTF primitive).
    pub mesh: String,
}

// ---------- Runtime registry asset ----------

#[derive(Asset, TypePath, Clone)]
pub struct SpectatorRegistry {
    /// Ordered list; index in this vector is the `SpectatorArchetypeId.0`.
    pub spectators: Vec<SpectatorDef>,
    /// Name → index for quick lookups.
    pub name_to_index: HashMap<String, u32>,
}

impl SpectatorRegistry {
    pub fn index_of(&self, name: &str) -> Option<SpectatorArchetypeId> {
        self.name_to_index.get(name).map(|&i| SpectatorArchetypeId(i))
    }

    pub fn get(&self, id: SpectatorArchetypeId) -> Option<&SpectatorDef> {
        self.spectators.get(id.0 as usize)
    }
}

// ---------- Asset loader for `.crowd.ron` ----------

#[derive(Default)]
pub struct SpectatorRegistryLoader;

impl AssetLoader for SpectatorRegistryLoader {
    type Asset = SpectatorRegistry;
    type Settings = ();
    type Error = RegistryLoadError;

    fn extensions(&self) -> &[&str] {
        &["crowd.ron"]
    }

    async fn load(
        &self,
        reader: &mut dyn Reader,
        _settings: &Self::Settings,
        _load_context: &mut LoadContext<'_>,
    ) -> Result<Self::Asset, Self::Error> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).await?;
        let defs: Vec<SpectatorDef> =
            ron::de::from_bytes(&bytes).map_err(|e| RegistryLoadError::Ron(e.to_string()))?;

        let mut name_to_index = HashMap::with_capacity(defs.len());
        for (i, def) in defs.iter().enumerate() {
            if let Some(prev) = name_to_index.insert(def.name.clone(), i as u32) {
                return Err(RegistryLoadError::DuplicateName {
                    name: def.name.clone(),
                    first: prev,
                    second: i as u32,
                });
            }
        }

        Ok(SpectatorRegistry { spectators: defs, name_to_index })
    }
}

// ---------- Loader errors ----------

#[derive(thiserror::Error, Debug)]
pub enum RegistryLoadError {
    #[error("I/O while reading registry: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON parse error: {0}")]
    Ron(String),
    #[error("Duplicate spectator name '{name}' (first idx {first}, second idx {second})")]
    DuplicateName { name: String, first: u32, second: u32 },
}

// ---------- Resolved geometry pool ----------

/// One loaded population geometry, ready for batching.
#[derive(Clone, Debug)]
pub struct SpectatorGeometry {
    pub name: String,
    pub mesh: Handle<Mesh>,
    /// Minimum local-space Y of the mesh; subtracting it rests the visual
    /// base exactly on the sampled surface point, whatever the pivot.
    pub bottom_offset: f32,
}

/// Registry entries resolved into loaded meshes. Entries whose asset fails
/// to load are dropped; the crowd proceeds with whatever survived.
#[derive(Resource, Default)]
pub struct SpectatorPool {
    pub entries: Vec<SpectatorGeometry>,
    loading: Vec<(String, Handle<Mesh>)>,
    resolved: bool,
}

impl SpectatorPool {
    /// True once the manifest is parsed and no mesh load is still in flight.
    pub fn ready(&self) -> bool {
        self.resolved && self.loading.is_empty()
    }
}

/// Update: kick off mesh loads when the manifest arrives, then graduate
/// handles into pool entries as their meshes finish loading.
pub fn resolve_spectator_pool(
    registries: Res<Assets<SpectatorRegistry>>,
    handle: Res<RegistryHandle>,
    asset_server: Res<AssetServer>,
    meshes: Res<Assets<Mesh>>,
    mut pool: ResMut<SpectatorPool>,
) {
    if !pool.resolved {
        let Some(registry) = registries.get(&handle.0) else { return };
        for def in &registry.spectators {
            pool.loading.push((def.name.clone(), asset_server.load(def.mesh.as_str())));
        }
        pool.resolved = true;
        info!("Crowd: registry loaded, {} spectator archetypes", registry.spectators.len());
    }

    if pool.loading.is_empty() {
        return;
    }

    let mut still_loading = Vec::new();
    for (name, mesh_handle) in std::mem::take(&mut pool.loading) {
        if let Some(mesh) = meshes.get(&mesh_handle) {
            let bottom_offset = mesh_bottom_offset(mesh);
            debug!("Crowd: '{name}' ready, bottom offset {bottom_offset:.3}");
            pool.entries.push(SpectatorGeometry { name, mesh: mesh_handle, bottom_offset });
        } else if matches!(asset_server.load_state(&mesh_handle), LoadState::Failed(_)) {
            warn!("Crowd: spectator mesh '{name}' failed to load; skipping archetype.");
        } else {
            still_loading.push((name, mesh_handle));
        }
    }
    pool.loading = still_loading;
}

/// Minimum Y of the mesh's positions in local space; 0.0 for meshes without
/// readable positions.
pub fn mesh_bottom_offset(mesh: &Mesh) -> f32 {
    use bevy::render::mesh::VertexAttributeValues;

    let positions = match mesh.attribute(Mesh::ATTRIBUTE_POSITION) {
        Some(VertexAttributeValues::Float32x3(v)) => v,
        _ => return 0.0,
    };
    let min_y = positions.iter().map(|p| p[1]).fold(f32::INFINITY, f32::min);
    if min_y.is_finite() {
        min_y
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::render::mesh::PrimitiveTopology;

    #[test]
    fn bottom_offset_is_min_local_y() {
        let mut mesh = Mesh::new(PrimitiveTopology::TriangleList, Default::default());
        mesh.insert_attribute(
            Mesh::ATTRIBUTE_POSITION,
            vec![[0.0f32, -0.4, 0.0], [1.0, 1.8, 0.0], [0.0, 0.2, 1.0]],
        );
        assert!((mesh_bottom_offset(&mesh) - (-0.4)).abs() < 1e-6);
    }
}
