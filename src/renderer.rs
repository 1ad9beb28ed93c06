use macroquad::prelude::*;

use crate::arena::{Arena, TickOutput};
use crate::entity::Palette;

const BG_COLOR: Color = BLACK;
const HUD_COLOR: Color = Color::new(0.7, 0.75, 0.8, 1.0);
const HUD_SHADOW: Color = Color::new(0.0, 0.0, 0.0, 0.5);
const BORDER_COLOR: Color = Color::new(0.15, 0.18, 0.25, 1.0);
const TARGET_COLOR: Color = Color::new(0.3, 0.9, 1.0, 0.6);

/// What the viewer shows besides the arena itself.
pub struct HudInfo<'a> {
    pub round: u64,
    pub round_limit: u64,
    pub peak_level: u32,
    pub status: &'a str,
    pub manual: bool,
}

/// Fit the arena into the window, keeping its aspect ratio.
fn arena_camera(arena: &Arena) -> Camera2D {
    let world = arena.world;
    let scale = (screen_width() / world.width).min(screen_height() / world.height);
    Camera2D {
        target: world.center(),
        zoom: vec2(scale * 2.0 / screen_width(), -scale * 2.0 / screen_height()),
        ..Default::default()
    }
}

pub fn draw(arena: &Arena, last_tick: Option<&TickOutput>, hud: &HudInfo) {
    clear_background(BG_COLOR);
    set_camera(&arena_camera(arena));

    let world = arena.world;
    draw_rectangle_lines(0.0, 0.0, world.width, world.height, 2.0, BORDER_COLOR);

    for particle in &arena.particles {
        draw_palette(particle.pos, &particle.palette);
    }
    for killer in &arena.killers {
        draw_palette(killer.pos, &killer.palette);
    }
    draw_palette(arena.player.pos, &arena.player.palette);

    // Where the potential field was pulling the player last tick.
    if let Some(tick) = last_tick {
        let from = arena.player.pos;
        let to = from + tick.target * 30.0;
        draw_line(from.x, from.y, to.x, to.y, 1.5, TARGET_COLOR);
    }

    set_default_camera();
    draw_hud(arena, hud);
}

/// Outline of radius `size`; `fill` is the ring thickness.
fn draw_palette(pos: Vec2, palette: &Palette) {
    let radius = f32::from(palette.size);
    let thickness = f32::from(palette.fill).min(radius);
    draw_circle_lines(pos.x, pos.y, radius - thickness * 0.5, thickness, palette.color());
}

fn draw_hud(arena: &Arena, hud: &HudInfo) {
    let lines = [
        format!("Level: {}", arena.player.level),
        format!("Round: {}/{}", hud.round, hud.round_limit),
        format!("Peak: {}", hud.peak_level),
        format!("FPS: {}", get_fps()),
    ];
    for (i, line) in lines.iter().enumerate() {
        let y = 20.0 + i as f32 * 20.0;
        draw_text(line, 11.0, y + 1.0, 18.0, HUD_SHADOW);
        draw_text(line, 10.0, y, 18.0, HUD_COLOR);
    }

    if hud.manual {
        draw_text("MANUAL (arrow keys)", 10.0, 100.0, 18.0, YELLOW);
    }

    if !hud.status.is_empty() {
        let tw = measure_text(hud.status, None, 24, 1.0).width;
        let x = screen_width() * 0.5 - tw * 0.5;
        draw_text(hud.status, x + 1.0, 31.0, 24.0, HUD_SHADOW);
        draw_text(hud.status, x, 30.0, 24.0, Color::new(1.0, 0.8, 0.2, 0.9));
    }
}
