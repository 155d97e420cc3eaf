use crate::game::{Bird, Ground, Pipe, HEIGHT, WIDTH};
use crate::sprite::{Sprite, Sprites};
use std::collections::VecDeque;

/// Read-only view of one frame.
pub struct Scene<'s> {
    pub birds: Vec<&'s Bird>,
    pub pipes: &'s VecDeque<Pipe>,
    pub ground: &'s Ground,
    pub score: u32,
    pub generation: u32,
    pub best_per_generation: &'s [f64],
}

const SKY_TOP: (u8, u8, u8) = (70, 180, 200);
const SKY_BOTTOM: (u8, u8, u8) = (190, 232, 245);
const TEXT: (u8, u8, u8, u8) = (255, 255, 255, 255);
const TEXT_SCALE: u32 = 5;

pub fn draw_scene(frame: &mut [u8], sprites: &Sprites, scene: &Scene<'_>) {
    draw_sky(frame);
    // pipes reach below the ground line and are drawn over it
    blit(frame, &sprites.ground, scene.ground.x, scene.ground.y);
    for pipe in scene.pipes {
        blit(frame, &sprites.pipe_top, pipe.x, pipe.top);
        blit(frame, &sprites.pipe_bottom, pipe.x, pipe.bottom);
    }
    for bird in &scene.birds {
        blit(frame, &sprites.bird[bird.frame()], bird.x, bird.y);
    }

    draw_text(frame, &format!("SCORE: {}", scene.score), 10, 60, TEXT_SCALE, TEXT);
    draw_text(frame, &format!("GEN: {}", scene.generation), 10, 10, TEXT_SCALE, TEXT);
    draw_text(frame, &format!("ALIVE: {}", scene.birds.len()), 10, 110, 2, TEXT);
    draw_chart(frame, WIDTH - 130, 10, 120, 60, scene.best_per_generation);
}

fn draw_sky(frame: &mut [u8]) {
    for (y, row) in frame.chunks_exact_mut((WIDTH * 4) as usize).enumerate() {
        let t = y as u32 * 256 / HEIGHT;
        let lerp = |a: u8, b: u8| (a as i32 + (b as i32 - a as i32) * t as i32 / 256) as u8;
        let (r, g, b) = (
            lerp(SKY_TOP.0, SKY_BOTTOM.0),
            lerp(SKY_TOP.1, SKY_BOTTOM.1),
            lerp(SKY_TOP.2, SKY_BOTTOM.2),
        );
        for px in row.chunks_exact_mut(4) {
            px[0] = r;
            px[1] = g;
            px[2] = b;
            px[3] = 255;
        }
    }
}

/// Alpha-blends `sprite` with its top-left corner at (x, y), clipped to the frame.
fn blit(frame: &mut [u8], sprite: &Sprite, x: i32, y: i32) {
    let x0 = (-x).max(0) as u32;
    let y0 = (-y).max(0) as u32;
    let x1 = (WIDTH as i32 - x).clamp(0, sprite.width as i32) as u32;
    let y1 = (HEIGHT as i32 - y).clamp(0, sprite.height as i32) as u32;
    for sy in y0..y1 {
        for sx in x0..x1 {
            let [r, g, b, a] = sprite.pixel(sx, sy);
            if a > 0 {
                blend_pixel(frame, (x + sx as i32) as u32, (y + sy as i32) as u32, r, g, b, a);
            }
        }
    }
}

fn blend_pixel(frame: &mut [u8], x: u32, y: u32, r: u8, g: u8, b: u8, a: u8) {
    if x >= WIDTH || y >= HEIGHT {
        return;
    }
    let idx = ((y * WIDTH + x) * 4) as usize;
    if idx + 3 >= frame.len() {
        return;
    }
    let ar = a as u16;
    let iar = (255 - a) as u16;
    frame[idx] = (((r as u16) * ar + frame[idx] as u16 * iar) / 255) as u8;
    frame[idx + 1] = (((g as u16) * ar + frame[idx + 1] as u16 * iar) / 255) as u8;
    frame[idx + 2] = (((b as u16) * ar + frame[idx + 2] as u16 * iar) / 255) as u8;
    frame[idx + 3] = 255;
}

fn fill_rect_rgba(frame: &mut [u8], x: u32, y: u32, w: u32, h: u32, r: u8, g: u8, b: u8, a: u8) {
    let x2 = (x + w).min(WIDTH);
    let y2 = (y + h).min(HEIGHT);
    for py in y..y2 {
        for px in x..x2 {
            blend_pixel(frame, px, py, r, g, b, a);
        }
    }
}

fn stroke_rect_rgba(frame: &mut [u8], x: u32, y: u32, w: u32, h: u32, r: u8, g: u8, b: u8, a: u8) {
    if w == 0 || h == 0 {
        return;
    }
    let x2 = (x + w - 1).min(WIDTH - 1);
    let y2 = (y + h - 1).min(HEIGHT - 1);
    for px in x..=x2 {
        blend_pixel(frame, px, y, r, g, b, a);
        blend_pixel(frame, px, y2, r, g, b, a);
    }
    for py in y..=y2 {
        blend_pixel(frame, x, py, r, g, b, a);
        blend_pixel(frame, x2, py, r, g, b, a);
    }
}

/// Bars of the best fitness per generation, newest on the right.
fn draw_chart(frame: &mut [u8], x: u32, y: u32, w: u32, h: u32, data: &[f64]) {
    fill_rect_rgba(frame, x, y, w, h, 0, 0, 0, 90);
    stroke_rect_rgba(frame, x, y, w, h, 255, 255, 255, 120);
    let max_val = data.iter().copied().fold(0.0, f64::max);
    if data.is_empty() || max_val <= 0.0 {
        return;
    }
    let bars = data.len().min(w as usize / 4).max(1);
    let bar_w = (w / bars as u32).max(2);
    for (i, &v) in data[data.len() - bars..].iter().enumerate() {
        let bh = ((v.max(0.0) / max_val) * (h - 2) as f64) as u32;
        let bx = x + 1 + i as u32 * bar_w;
        let by = y + h - 1 - bh;
        fill_rect_rgba(frame, bx, by, bar_w - 1, bh, 255, 220, 90, 200);
    }
}

fn glyph_5x7(ch: char) -> Option<[u8; 7]> {
    let c = ch.to_ascii_uppercase();
    Some(match c {
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'E' => [0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b11111],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01110],
        'I' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b11111],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'N' => [0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b10000, 0b01110, 0b00001, 0b00001, 0b11110],
        'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11110, 0b00001, 0b00001, 0b01110, 0b00001, 0b00001, 0b11110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        ':' => [0b00000, 0b00100, 0b00000, 0b00000, 0b00100, 0b00000, 0b00000],
        ' ' => [0b00000; 7],
        _ => return None,
    })
}

fn draw_char(frame: &mut [u8], ch: char, x: u32, y: u32, scale: u32, col: (u8, u8, u8, u8)) -> u32 {
    if let Some(rows) = glyph_5x7(ch) {
        for (ry, row) in rows.iter().enumerate() {
            for rx in 0..5 {
                if (row >> (4 - rx)) & 1 == 1 {
                    for sy in 0..scale {
                        for sx in 0..scale {
                            let (px, py) = (x + rx * scale + sx, y + ry as u32 * scale + sy);
                            blend_pixel(frame, px, py, col.0, col.1, col.2, col.3);
                        }
                    }
                }
            }
        }
    }
    6 * scale
}

fn draw_text(frame: &mut [u8], text: &str, x: u32, y: u32, scale: u32, col: (u8, u8, u8, u8)) {
    let mut cx = x;
    for ch in text.chars() {
        cx += draw_char(frame, ch, cx, y, scale, col);
    }
}
