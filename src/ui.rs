use bevy::prelude::*;

use crate::crowd::CrowdState;

#[derive(Component)]
pub struct CrowdHud;

pub fn spawn_hud(mut commands: Commands) {
    commands.spawn((
        Text::new("Crowd: 0"),
        TextFont {
            font_size: 20.0,
            ..default()
        },
        TextColor(Color::WHITE),
        Node {
            position_type: PositionType::Absolute,
            left: Val::Px(12.0),
            bottom: Val::Px(12.0),
            ..default()
        },
        CrowdHud,
    ));
}

pub fn update_hud(
    state: Res<CrowdState>,
    mut query: Query<&mut Text, With<CrowdHud>>,
) {
    if !state.is_changed() {
        return;
    }
    for mut text in &mut query {
        text.0 = format!("Crowd: {}", state.population);
    }
}
