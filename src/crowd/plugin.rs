// src/crowd/plugin.rs
//! Crowd plugin wiring (glue).
//! - Registry asset/loader + handle
//! - Settings + shared crowd material
//! - Respawn event + lifecycle/instancing system chain

use std::path::PathBuf;

use bevy::prelude::*;

use super::core::DEFAULT_NUM_SAMPLES;
use super::instancing::{rebuild_dirty_batches, CrowdInstancingConfig};
use super::lifecycle::{
    collect_sample_points, ensure_sample_points, extract_floor_surface, handle_respawn_events,
    request_initial_crowd, spawn_pending_crowd, CachedPoints, CrowdState, FloorSurface,
    RespawnCrowd, SamplingTask,
};
use super::registry::{resolve_spectator_pool, SpectatorPool, SpectatorRegistry, SpectatorRegistryAssetPlugin};

/// Where the manifest lives, how many points one sampling pass produces, and
/// the reproducibility knobs.
#[derive(Resource, Clone)]
pub struct CrowdSettings {
    pub registry_path: String,
    pub cache_dir: PathBuf,
    pub num_samples: usize,
    /// Deterministic sampling/placement when set; `None` keeps the original
    /// unseeded behavior.
    pub seed: Option<u64>,
    /// Spawned once at startup, as soon as points and geometry are ready.
    pub initial_count: usize,
}
impl Default for CrowdSettings {
    fn default() -> Self {
        Self {
            registry_path: "crowd/spectators.crowd.ron".to_string(),
            cache_dir: PathBuf::from("cache"),
            num_samples: DEFAULT_NUM_SAMPLES,
            seed: None,
            initial_count: 500,
        }
    }
}

/// Handle to the loaded SpectatorRegistry asset.
#[derive(Resource, Default)]
pub struct RegistryHandle(pub Handle<SpectatorRegistry>);

/// The one material every spectator batch shares.
#[derive(Resource, Default)]
pub struct CrowdMaterial(pub Handle<StandardMaterial>);

/// Live-editable shading knobs; changes flow into the shared material
/// without rebuilding any batch.
#[derive(Resource, Clone)]
pub struct CrowdMaterialSettings {
    pub base_color: Color,
    pub perceptual_roughness: f32,
    pub reflectance: f32,
}
impl Default for CrowdMaterialSettings {
    fn default() -> Self {
        Self {
            base_color: Color::linear_rgb(0.35, 0.37, 0.42),
            perceptual_roughness: 0.85,
            reflectance: 0.4,
        }
    }
}

pub struct CrowdPlugin;
impl Plugin for CrowdPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(SpectatorRegistryAssetPlugin)
            .init_resource::<CrowdSettings>()
            .init_resource::<RegistryHandle>()
            .init_resource::<SpectatorPool>()
            .init_resource::<CrowdState>()
            .init_resource::<FloorSurface>()
            .init_resource::<CachedPoints>()
            .init_resource::<SamplingTask>()
            .init_resource::<CrowdMaterial>()
            .init_resource::<CrowdMaterialSettings>()
            .init_resource::<CrowdInstancingConfig>()
            .add_event::<RespawnCrowd>()
            .add_systems(Startup, (load_registry, init_crowd_material))

            // ---- point pipeline: floor -> cache/sampling -> points ----
            .add_systems(Update, extract_floor_surface)
            .add_systems(Update, ensure_sample_points.after(extract_floor_surface))
            .add_systems(Update, collect_sample_points.after(ensure_sample_points))

            // ---- geometry pipeline ----
            .add_systems(Update, resolve_spectator_pool)

            // ---- respawn cycle ----
            .add_systems(Update, request_initial_crowd.after(collect_sample_points))
            .add_systems(Update, handle_respawn_events.after(request_initial_crowd))
            .add_systems(Update, spawn_pending_crowd.after(handle_respawn_events))
            .add_systems(Update, rebuild_dirty_batches.after(spawn_pending_crowd))

            .add_systems(Update, apply_material_settings);
    }
}

/// Startup: request loading the registry manifest, store handle.
fn load_registry(
    mut handle_res: ResMut<RegistryHandle>,
    settings: Res<CrowdSettings>,
    assets: Res<AssetServer>,
) {
    if handle_res.0.is_strong() {
        return;
    }
    handle_res.0 = assets.load(settings.registry_path.as_str());
    info!("Crowd: loading spectator registry from '{}'", settings.registry_path);
}

/// Startup: create the shared material from the current settings.
fn init_crowd_material(
    settings: Res<CrowdMaterialSettings>,
    mut material: ResMut<CrowdMaterial>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    material.0 = materials.add(StandardMaterial {
        base_color: settings.base_color,
        perceptual_roughness: settings.perceptual_roughness,
        reflectance: settings.reflectance,
        ..default()
    });
}

/// Update: propagate shading-knob edits into the shared material.
fn apply_material_settings(
    settings: Res<CrowdMaterialSettings>,
    material: Res<CrowdMaterial>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    if !settings.is_changed() {
        return;
    }
    let Some(mat) = materials.get_mut(&material.0) else { return };
    mat.base_color = settings.base_color;
    mat.perceptual_roughness = settings.perceptual_roughness;
    mat.reflectance = settings.reflectance;
}
