//! Procedurally painted RGBA sprites and the 1-bit alpha masks used for
//! pixel-exact collision.

pub const BIRD_WIDTH: u32 = 51;
pub const BIRD_HEIGHT: u32 = 36;
pub const PIPE_WIDTH: u32 = 104;
pub const PIPE_HEIGHT: u32 = 640;
pub const GROUND_WIDTH: u32 = 1000;
pub const GROUND_HEIGHT: u32 = 200;

const PIPE_LIP: u32 = 30;
const PIPE_INSET: u32 = 5;

type Rgba = [u8; 4];

const BIRD_BODY: Rgba = [245, 200, 66, 255];
const BIRD_BELLY: Rgba = [255, 225, 100, 255];
const BIRD_WING: Rgba = [215, 165, 35, 255];
const BIRD_EYE: Rgba = [255, 255, 255, 255];
const BIRD_PUPIL: Rgba = [20, 20, 20, 255];
const BIRD_BEAK: Rgba = [225, 75, 35, 255];
const PIPE_DARK: Rgba = [74, 122, 26, 255];
const PIPE_MID: Rgba = [100, 170, 40, 255];
const PIPE_LIGHT: Rgba = [145, 215, 62, 255];
const PIPE_EDGE: Rgba = [60, 100, 20, 255];
const GRASS: Rgba = [84, 168, 55, 255];
const GRASS_LIGHT: Rgba = [110, 200, 70, 255];
const DIRT: Rgba = [210, 185, 110, 255];
const DIRT_DARK: Rgba = [185, 160, 90, 255];

#[derive(Clone, Debug)]
pub struct Sprite {
    pub width: u32,
    pub height: u32,
    pixels: Vec<u8>,
}

impl Sprite {
    /// Fully transparent sprite.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height, pixels: vec![0; (width * height * 4) as usize] }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Rgba {
        let idx = ((y * self.width + x) * 4) as usize;
        [self.pixels[idx], self.pixels[idx + 1], self.pixels[idx + 2], self.pixels[idx + 3]]
    }

    fn put(&mut self, x: i32, y: i32, c: Rgba) {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return;
        }
        let idx = ((y as u32 * self.width + x as u32) * 4) as usize;
        self.pixels[idx..idx + 4].copy_from_slice(&c);
    }

    fn fill_rect(&mut self, x: i32, y: i32, w: i32, h: i32, c: Rgba) {
        for py in y..y + h {
            for px in x..x + w {
                self.put(px, py, c);
            }
        }
    }

    fn fill_ellipse(&mut self, cx: f32, cy: f32, rx: f32, ry: f32, c: Rgba) {
        let x0 = (cx - rx).floor() as i32;
        let x1 = (cx + rx).ceil() as i32;
        let y0 = (cy - ry).floor() as i32;
        let y1 = (cy + ry).ceil() as i32;
        for py in y0..=y1 {
            for px in x0..=x1 {
                let dx = (px as f32 + 0.5 - cx) / rx;
                let dy = (py as f32 + 0.5 - cy) / ry;
                if dx * dx + dy * dy <= 1.0 {
                    self.put(px, py, c);
                }
            }
        }
    }

    /// Opaque pixels become set bits.
    pub fn mask(&self) -> Mask {
        let mut bits = Vec::with_capacity((self.width * self.height) as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                bits.push(self.pixel(x, y)[3] > 0);
            }
        }
        Mask { width: self.width, height: self.height, bits }
    }
}

#[derive(Clone, Debug)]
pub struct Mask {
    pub width: u32,
    pub height: u32,
    bits: Vec<bool>,
}

impl Mask {
    #[cfg(test)]
    pub fn filled(width: u32, height: u32) -> Self {
        Self { width, height, bits: vec![true; (width * height) as usize] }
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        self.bits[(y * self.width + x) as usize]
    }

    /// True when any set bit of `other`, placed at `offset` relative to this
    /// mask's origin, lands on a set bit of this mask.
    pub fn overlap(&self, other: &Mask, offset: (i32, i32)) -> bool {
        let (ox, oy) = offset;
        let x0 = ox.max(0);
        let y0 = oy.max(0);
        let x1 = (ox + other.width as i32).min(self.width as i32);
        let y1 = (oy + other.height as i32).min(self.height as i32);
        for y in y0..y1 {
            for x in x0..x1 {
                if self.get(x as u32, y as u32) && other.get((x - ox) as u32, (y - oy) as u32) {
                    return true;
                }
            }
        }
        false
    }
}

/// Every image the game draws, painted once at startup.
pub struct Sprites {
    pub bird: [Sprite; 2],
    pub bird_masks: [Mask; 2],
    pub pipe_top: Sprite,
    pub pipe_top_mask: Mask,
    pub pipe_bottom: Sprite,
    pub pipe_bottom_mask: Mask,
    pub ground: Sprite,
}

impl Sprites {
    pub fn new() -> Self {
        let bird = [paint_bird(false), paint_bird(true)];
        let bird_masks = [bird[0].mask(), bird[1].mask()];
        let pipe_top = paint_pipe(true);
        let pipe_bottom = paint_pipe(false);
        Self {
            bird_masks,
            bird,
            pipe_top_mask: pipe_top.mask(),
            pipe_top,
            pipe_bottom_mask: pipe_bottom.mask(),
            pipe_bottom,
            ground: paint_ground(),
        }
    }
}

impl Default for Sprites {
    fn default() -> Self {
        Self::new()
    }
}

fn paint_bird(wing_down: bool) -> Sprite {
    let mut s = Sprite::new(BIRD_WIDTH, BIRD_HEIGHT);
    s.fill_ellipse(23.0, 18.0, 22.0, 17.0, BIRD_BODY);
    s.fill_ellipse(25.0, 25.0, 14.0, 8.0, BIRD_BELLY);
    // beak
    s.fill_rect(40, 17, 11, 4, BIRD_BEAK);
    s.fill_rect(40, 21, 9, 4, BIRD_BEAK);
    s.fill_ellipse(33.0, 11.0, 6.5, 6.5, BIRD_EYE);
    s.fill_rect(35, 9, 3, 4, BIRD_PUPIL);
    if wing_down {
        s.fill_ellipse(13.0, 22.0, 9.0, 6.0, BIRD_WING);
    } else {
        s.fill_ellipse(13.0, 13.0, 9.0, 6.0, BIRD_WING);
    }
    s
}

/// The lip sits at the gap end: the bottom of a top pipe, the top of a
/// bottom pipe. The shaft is inset so its side columns stay transparent.
fn paint_pipe(top: bool) -> Sprite {
    let mut s = Sprite::new(PIPE_WIDTH, PIPE_HEIGHT);
    let (w, h) = (PIPE_WIDTH as i32, PIPE_HEIGHT as i32);
    let inset = PIPE_INSET as i32;
    let lip = PIPE_LIP as i32;
    let lip_y = if top { h - lip } else { 0 };
    let (shaft_y, shaft_h) = if top { (0, h - lip) } else { (lip, h - lip) };

    shade_column(&mut s, inset, shaft_y, w - 2 * inset, shaft_h);
    shade_column(&mut s, 0, lip_y, w, lip);
    s.fill_rect(0, lip_y, w, 2, PIPE_EDGE);
    s.fill_rect(0, lip_y + lip - 2, w, 2, PIPE_EDGE);
    s
}

fn shade_column(s: &mut Sprite, x: i32, y: i32, w: i32, h: i32) {
    s.fill_rect(x, y, w, h, PIPE_MID);
    s.fill_rect(x, y, 3, h, PIPE_EDGE);
    s.fill_rect(x + 3, y, w / 6, h, PIPE_DARK);
    s.fill_rect(x + w / 2, y, w / 8, h, PIPE_LIGHT);
    s.fill_rect(x + w - 3, y, 3, h, PIPE_EDGE);
}

/// Stripe period divides 500 so the strip wraps seamlessly.
fn paint_ground() -> Sprite {
    let mut s = Sprite::new(GROUND_WIDTH, GROUND_HEIGHT);
    let w = GROUND_WIDTH as i32;
    s.fill_rect(0, 0, w, GROUND_HEIGHT as i32, DIRT);
    s.fill_rect(0, 0, w, 18, GRASS);
    for x in 0..w {
        for y in 0..18 {
            if (x + y) % 25 < 12 {
                s.put(x, y, GRASS_LIGHT);
            }
        }
    }
    s.fill_rect(0, 18, w, 4, DIRT_DARK);
    for x in (0..w).step_by(25) {
        s.fill_rect(x + 6, 40, 8, 4, DIRT_DARK);
        s.fill_rect(x + 16, 90, 6, 4, DIRT_DARK);
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_respects_offset() {
        let a = Mask::filled(10, 10);
        let b = Mask::filled(4, 4);
        assert!(a.overlap(&b, (0, 0)));
        assert!(a.overlap(&b, (9, 9)));
        assert!(a.overlap(&b, (-3, -3)));
        assert!(!a.overlap(&b, (10, 0)));
        assert!(!a.overlap(&b, (-4, 2)));
    }

    #[test]
    fn transparent_pixels_never_collide() {
        let sprites = Sprites::new();
        let bird = &sprites.bird_masks[0];
        // top-left corner of the bird is outside the body ellipse
        assert!(!bird.get(0, 0));
        // a single opaque pixel touching only the transparent corner
        let dot = Mask::filled(1, 1);
        assert!(!bird.overlap(&dot, (0, 0)));
        assert!(bird.overlap(&dot, (23, 18)));
    }

    #[test]
    fn pipe_shaft_is_narrower_than_lip() {
        let sprites = Sprites::new();
        let top = &sprites.pipe_top_mask;
        assert!(!top.get(0, 0));
        assert!(top.get(0, PIPE_HEIGHT - 1));
        let bottom = &sprites.pipe_bottom_mask;
        assert!(bottom.get(0, 0));
        assert!(!bottom.get(0, PIPE_HEIGHT - 1));
    }

    #[test]
    fn flap_frames_share_dimensions() {
        let sprites = Sprites::new();
        assert_eq!(sprites.bird[0].height, sprites.bird[1].height);
        assert_eq!(sprites.bird[0].width, BIRD_WIDTH);
    }
}
