use bevy::prelude::*;

mod crowd;
mod input;
mod setup;
mod stage;
mod ui;

use crowd::CrowdPlugin;
use input::{camera_controller, crowd_hotkeys};
use stage::StagePlugin;
use ui::{spawn_hud, update_hud};

fn main() {
    App::new()
        .add_plugins(DefaultPlugins)
        // your domain plugins
        .add_plugins(StagePlugin)   // builds the stage set + spawn-area floor
        .add_plugins(CrowdPlugin)   // samples, allocates, batches the crowd
        // camera, lights, whatever your setup.rs does
        .add_systems(Startup, setup::setup)
        .add_systems(Startup, spawn_hud)
        // input + camera + HUD each frame
        .add_systems(Update, (camera_controller, crowd_hotkeys, update_hud))
        .run();
}
