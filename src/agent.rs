//! Seams between the game and whatever trains its players.
//!
//! The game only knows that a candidate can build a [`Brain`] and carries a
//! fitness value; the trainer only knows that something implementing
//! [`Evaluate`] fills in those fitness values once per generation.

use crate::game::{Bird, Pipe};

pub type GenomeKey = u64;

/// Output above this makes the bird jump.
pub const JUMP_THRESHOLD: f64 = 0.5;

pub trait Brain {
    fn activate(&mut self, inputs: &[f64]) -> Vec<f64>;
}

impl<F> Brain for F
where
    F: FnMut(&[f64]) -> Vec<f64>,
{
    fn activate(&mut self, inputs: &[f64]) -> Vec<f64> {
        self(inputs)
    }
}

pub trait Candidate {
    type Brain: Brain;
    type Context;

    fn brain(&self, context: &Self::Context) -> Self::Brain;
    fn fitness(&self) -> f64;
    fn fitness_mut(&mut self) -> &mut f64;
}

pub trait Evaluate<C: Candidate> {
    /// Must leave a final fitness in every candidate before returning.
    fn evaluate(&mut self, population: &mut [(GenomeKey, C)], context: &C::Context) -> anyhow::Result<()>;
}

/// What a bird sees of the pipe it is flying towards.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Observation {
    pub height: f64,
    pub to_gap_top: f64,
    pub to_gap_bottom: f64,
}

impl Observation {
    pub fn new(bird: &Bird, pipe: &Pipe) -> Self {
        Self {
            height: bird.y as f64,
            to_gap_top: (bird.y - pipe.y).abs() as f64,
            to_gap_bottom: (bird.y - pipe.bottom).abs() as f64,
        }
    }

    pub fn as_inputs(&self) -> [f64; 3] {
        [self.height, self.to_gap_top, self.to_gap_bottom]
    }
}

/// An empty output never jumps.
pub fn wants_jump<B: Brain + ?Sized>(brain: &mut B, observation: &Observation) -> bool {
    brain.activate(&observation.as_inputs()).first().is_some_and(|&out| out > JUMP_THRESHOLD)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observation_measures_distance_to_both_edges() {
        let mut bird = Bird::new();
        bird.y = 320;
        let pipe = Pipe::with_gap(700, 300);
        let obs = Observation::new(&bird, &pipe);
        assert_eq!(obs.as_inputs(), [320.0, 20.0, 180.0]);
    }

    #[test]
    fn jump_needs_output_strictly_above_half() {
        let obs = Observation { height: 0.0, to_gap_top: 0.0, to_gap_bottom: 0.0 };
        let mut half = |_: &[f64]| vec![0.5];
        let mut more = |_: &[f64]| vec![0.51, -1.0];
        let mut nothing = |_: &[f64]| Vec::<f64>::new();
        assert!(!wants_jump(&mut half, &obs));
        assert!(wants_jump(&mut more, &obs));
        assert!(!wants_jump(&mut nothing, &obs));
    }
}
