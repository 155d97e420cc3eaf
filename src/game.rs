use crate::sprite::{Mask, Sprites, BIRD_HEIGHT, PIPE_WIDTH};
use rand::Rng;

pub const WIDTH: u32 = 500;
pub const HEIGHT: u32 = 900;

pub const BIRD_X: i32 = 230;
pub const BIRD_Y: i32 = 350;
pub const JUMP_VELOCITY: i32 = -15;
pub const CEILING: i32 = -50;
pub const GROUND_Y: i32 = 700;

pub const PIPE_GAP: i32 = 200;
pub const PIPE_SPEED: i32 = 5;
pub const FIRST_PIPE_X: i32 = 700;
pub const NEXT_PIPE_X: i32 = 500;
pub const PIPE_DESPAWN_X: i32 = -100;
pub const PASS_MARGIN: i32 = 30;

pub const GROUND_SPEED: i32 = 4;
pub const GROUND_TILE: i32 = 500;

const FLAP_FRAMES: f32 = 2.0;
const FLAP_STEP: f32 = 0.1;

#[derive(Clone, Debug)]
pub struct Bird {
    pub x: i32,
    pub y: i32,
    pub gravity: i32, // vertical velocity
    pub flap: f32,
}

impl Bird {
    pub fn new() -> Self {
        Self { x: BIRD_X, y: BIRD_Y, gravity: 0, flap: 0.0 }
    }

    pub fn jump(&mut self) {
        self.gravity = JUMP_VELOCITY;
    }

    pub fn apply_gravity(&mut self) {
        self.gravity += 1;
        self.y += self.gravity;
    }

    pub fn animate(&mut self) {
        self.flap += FLAP_STEP;
        if self.flap >= FLAP_FRAMES {
            self.flap = 0.0;
        }
    }

    pub fn frame(&self) -> usize {
        self.flap as usize
    }

    pub fn mask<'s>(&self, sprites: &'s Sprites) -> &'s Mask {
        &sprites.bird_masks[self.frame()]
    }

    /// Below the ground line or above the play area.
    pub fn out_of_bounds(&self) -> bool {
        self.y + BIRD_HEIGHT as i32 - 10 >= GROUND_Y || self.y < CEILING
    }
}

impl Default for Bird {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug)]
pub struct Pipe {
    pub x: i32,
    /// Bottom edge of the top pipe, i.e. the top of the gap.
    pub y: i32,
    /// Where the top pipe sprite is drawn.
    pub top: i32,
    /// Top edge of the bottom pipe.
    pub bottom: i32,
    pub passed: bool,
}

impl Pipe {
    pub fn new<R: Rng + ?Sized>(x: i32, rng: &mut R) -> Self {
        Self::with_gap(x, rng.gen_range(50..500))
    }

    pub fn with_gap(x: i32, y: i32) -> Self {
        Self { x, y, top: y - crate::sprite::PIPE_HEIGHT as i32, bottom: y + PIPE_GAP, passed: false }
    }

    pub fn animate(&mut self) {
        self.x -= PIPE_SPEED;
    }

    pub fn width(&self) -> i32 {
        PIPE_WIDTH as i32
    }

    pub fn collide(&self, bird: &Bird, sprites: &Sprites) -> bool {
        let bird_mask = bird.mask(sprites);
        let top_offset = (self.x - bird.x, self.top - bird.y);
        let bottom_offset = (self.x - bird.x, self.bottom - bird.y);
        bird_mask.overlap(&sprites.pipe_bottom_mask, bottom_offset)
            || bird_mask.overlap(&sprites.pipe_top_mask, top_offset)
    }

    /// The pass line sits `PASS_MARGIN` behind the bird.
    pub fn is_behind(&self, bird: &Bird) -> bool {
        self.x < bird.x - PASS_MARGIN
    }

    pub fn off_screen(&self) -> bool {
        self.x <= PIPE_DESPAWN_X
    }
}

#[derive(Clone, Debug)]
pub struct Ground {
    pub x: i32,
    pub y: i32,
}

impl Ground {
    pub fn new(y: i32) -> Self {
        Self { x: 0, y }
    }

    pub fn animate(&mut self) {
        self.x -= GROUND_SPEED;
        if self.x <= -GROUND_TILE {
            self.x = 0;
        }
    }
}
