use crate::agent::{wants_jump, Candidate, Evaluate, GenomeKey, Observation};
use crate::config::GameConfig;
use crate::draw::Scene;
use crate::frontend::Frontend;
use crate::game::{Bird, Ground, Pipe, FIRST_PIPE_X, GROUND_Y, NEXT_PIPE_X};
use crate::sprite::Sprites;
use log::{debug, info};
use rand::Rng;
use rand::rngs::SmallRng;
use std::collections::VecDeque;

pub const FITNESS_PER_FRAME: f64 = 0.1;

/// Raised when the player closes the window; ends the whole run.
#[derive(Debug, thiserror::Error)]
#[error("quit requested")]
pub struct QuitRequested;

/// One bird, the genome it scores for and the brain flying it.
pub struct Player<'a, C: Candidate> {
    pub bird: Bird,
    pub genome: &'a mut C,
    pub brain: C::Brain,
}

/// A single generation's run: every genome gets a bird, all birds share one
/// pipe queue, and the episode is over once the last bird is gone.
pub struct Episode<'a, C: Candidate> {
    pub players: Vec<Player<'a, C>>,
    pub pipes: VecDeque<Pipe>,
    pub ground: Ground,
    pub score: u32,
    pub frames: u64,
}

impl<'a, C: Candidate> Episode<'a, C> {
    pub fn new<R: Rng + ?Sized>(population: &'a mut [(GenomeKey, C)], context: &C::Context, rng: &mut R) -> Self {
        let players = population
            .iter_mut()
            .map(|(_, genome)| {
                *genome.fitness_mut() = 0.0;
                let brain = genome.brain(context);
                Player { bird: Bird::new(), genome, brain }
            })
            .collect();
        Self {
            players,
            pipes: VecDeque::from([Pipe::new(FIRST_PIPE_X, rng)]),
            ground: Ground::new(GROUND_Y),
            score: 0,
            frames: 0,
        }
    }

    pub fn is_over(&self) -> bool {
        self.players.is_empty()
    }

    /// First surviving bird in slot order. Drives pipe selection and passing.
    pub fn lead(&self) -> Option<&Bird> {
        self.players.first().map(|p| &p.bird)
    }

    /// Index of the pipe the birds are told about.
    pub fn active_pipe(&self) -> usize {
        match (self.lead(), self.pipes.front()) {
            (Some(lead), Some(first)) if self.pipes.len() > 1 && lead.x > first.x + first.width() => 1,
            _ => 0,
        }
    }

    pub fn step<R: Rng + ?Sized>(&mut self, sprites: &Sprites, rng: &mut R) {
        self.frames += 1;
        self.ground.animate();

        let target = self.pipes.get(self.active_pipe()).cloned();
        self.players.retain_mut(|player| {
            *player.genome.fitness_mut() += FITNESS_PER_FRAME;
            player.bird.apply_gravity();
            if let Some(pipe) = &target {
                let observation = Observation::new(&player.bird, pipe);
                if wants_jump(&mut player.brain, &observation) {
                    player.bird.jump();
                }
            }
            !player.bird.out_of_bounds()
        });

        // Pipes appended during this pass are visited too; removal waits
        // until the pass is done.
        let mut i = 0;
        while i < self.pipes.len() {
            self.pipes[i].animate();
            let pipe = &self.pipes[i];
            self.players.retain(|p| !pipe.collide(&p.bird, sprites));
            let passed = !pipe.passed && self.players.first().is_some_and(|lead| pipe.is_behind(&lead.bird));
            if passed {
                self.pipes[i].passed = true;
                self.score += 1;
                self.pipes.push_back(Pipe::new(NEXT_PIPE_X, rng));
            }
            i += 1;
        }
        self.pipes.retain(|pipe| !pipe.off_screen());

        for player in &mut self.players {
            player.bird.animate();
        }
    }

    pub fn scene<'s>(&'s self, generation: u32, best_per_generation: &'s [f64]) -> Scene<'s> {
        Scene {
            birds: self.players.iter().map(|p| &p.bird).collect(),
            pipes: &self.pipes,
            ground: &self.ground,
            score: self.score,
            generation,
            best_per_generation,
        }
    }
}

/// Plays generations on a frontend. This is the evaluator handed to the
/// trainer.
pub struct Arcade<F> {
    frontend: F,
    sprites: Sprites,
    rng: SmallRng,
    settings: GameConfig,
    generation: u32,
    best_per_generation: Vec<f64>,
}

impl<F: Frontend> Arcade<F> {
    pub fn new(frontend: F, settings: GameConfig, rng: SmallRng) -> Self {
        Self { frontend, sprites: Sprites::new(), rng, settings, generation: 0, best_per_generation: Vec::new() }
    }

    /// Number of generations played so far.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl<F: Frontend, C: Candidate> Evaluate<C> for Arcade<F> {
    fn evaluate(&mut self, population: &mut [(GenomeKey, C)], context: &C::Context) -> anyhow::Result<()> {
        self.generation += 1;
        let shown = self.generation - 1;
        let mut episode = Episode::new(population, context, &mut self.rng);

        while !episode.is_over() {
            if self.frontend.quit_requested() {
                return Err(QuitRequested.into());
            }
            self.frontend.wait_frame();
            episode.step(&self.sprites, &mut self.rng);
            self.frontend.present(&self.sprites, &episode.scene(shown, &self.best_per_generation))?;

            if self.settings.max_frames.is_some_and(|cap| episode.frames >= cap) {
                debug!("generation {shown} hit the frame cap with {} birds alive", episode.players.len());
                break;
            }
        }

        let (frames, score) = (episode.frames, episode.score);
        drop(episode);
        let best = population.iter().map(|(_, c)| c.fitness()).fold(f64::NEG_INFINITY, f64::max);
        self.best_per_generation.push(best);
        info!("generation {shown}: {frames} frames, score {score}, best fitness {best:.1}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Brain;
    use crate::frontend::Headless;
    use crate::game::{BIRD_X, PIPE_DESPAWN_X};
    use rand::SeedableRng;

    /// Brain with a fixed rule, scored by a plain fitness cell.
    #[derive(Clone, Copy)]
    enum Pilot {
        Constant(f64),
        /// Jump whenever the bird sinks below this height.
        Hover(f64),
    }

    impl Brain for Pilot {
        fn activate(&mut self, inputs: &[f64]) -> Vec<f64> {
            match *self {
                Pilot::Constant(out) => vec![out],
                Pilot::Hover(target) => vec![if inputs[0] > target { 1.0 } else { 0.0 }],
            }
        }
    }

    struct Dummy {
        pilot: Pilot,
        fitness: f64,
    }

    impl Candidate for Dummy {
        type Brain = Pilot;
        type Context = ();

        fn brain(&self, _: &()) -> Pilot {
            self.pilot
        }

        fn fitness(&self) -> f64 {
            self.fitness
        }

        fn fitness_mut(&mut self) -> &mut f64 {
            &mut self.fitness
        }
    }

    fn population(pilots: &[Pilot]) -> Vec<(GenomeKey, Dummy)> {
        pilots
            .iter()
            .enumerate()
            .map(|(i, &pilot)| (i as GenomeKey, Dummy { pilot, fitness: -1.0 }))
            .collect()
    }

    #[derive(Default)]
    struct Recorder {
        alive: Vec<usize>,
        quit_after: Option<usize>,
    }

    impl Frontend for Recorder {
        fn quit_requested(&mut self) -> bool {
            self.quit_after.is_some_and(|n| self.alive.len() >= n)
        }

        fn wait_frame(&mut self) {}

        fn present(&mut self, _: &Sprites, scene: &Scene<'_>) -> anyhow::Result<()> {
            self.alive.push(scene.birds.len());
            Ok(())
        }
    }

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(42)
    }

    #[test]
    fn falling_bird_scores_a_tenth_per_frame() {
        let mut pop = population(&[Pilot::Constant(0.0)]);
        let mut arcade = Arcade::new(Headless, GameConfig::default(), rng());
        arcade.evaluate(&mut pop[..], &()).unwrap();
        assert!((pop[0].1.fitness - 2.5).abs() < 1e-9);
    }

    #[test]
    fn jumping_bird_never_touches_the_floor() {
        let mut pop = population(&[Pilot::Constant(1.0)]);
        let sprites = Sprites::new();
        let mut rng = rng();
        let mut episode = Episode::new(&mut pop, &(), &mut rng);
        episode.pipes[0] = Pipe::with_gap(FIRST_PIPE_X, 300);
        let mut frames = 0;
        while let Some(bird) = episode.lead().cloned() {
            assert!(bird.y + crate::sprite::BIRD_HEIGHT as i32 - 10 < GROUND_Y);
            episode.step(&sprites, &mut rng);
            frames += 1;
        }
        // rises 14 units a frame and leaves through the ceiling first
        assert_eq!(frames, 30);
        drop(episode);
        assert!((pop[0].1.fitness - 3.0).abs() < 1e-9);
    }

    #[test]
    fn passing_a_pipe_scores_once_and_spawns_once() {
        let mut pop = population(&[Pilot::Hover(380.0)]);
        let sprites = Sprites::new();
        let mut rng = rng();
        let mut episode = Episode::new(&mut pop, &(), &mut rng);
        episode.pipes[0] = Pipe::with_gap(FIRST_PIPE_X, 250);

        let mut frames = 0;
        while !episode.pipes[0].passed {
            assert_eq!(episode.score, 0);
            assert_eq!(episode.pipes.len(), 1);
            episode.step(&sprites, &mut rng);
            frames += 1;
            assert!(!episode.is_over(), "bird died before the first pass");
        }
        assert_eq!(frames, 101);
        assert_eq!(episode.score, 1);
        assert_eq!(episode.pipes.len(), 2);
        // the new pipe was moved in the frame it was created
        assert_eq!(episode.pipes[1].x, NEXT_PIPE_X - 5);

        for _ in 0..20 {
            episode.step(&sprites, &mut rng);
            assert!(!episode.is_over());
            assert!(episode.pipes[0].passed);
            assert_eq!(episode.score, 1);
            assert_eq!(episode.pipes.len(), 2);
        }
    }

    #[test]
    fn bird_hitting_a_pipe_leaves_in_that_frame() {
        let mut pop = population(&[Pilot::Constant(0.0), Pilot::Constant(0.0)]);
        let sprites = Sprites::new();
        let mut rng = rng();
        let mut episode = Episode::new(&mut pop[..], &(), &mut rng);
        episode.players[0].bird.y = 380;
        episode.players[1].bird.y = 250;
        episode.pipes[0] = Pipe::with_gap(BIRD_X - 20, 200);

        episode.step(&sprites, &mut rng);
        assert_eq!(episode.players.len(), 1);
        assert_eq!(episode.players[0].bird.y, 251);
        assert!(!episode.pipes[0].passed);

        for _ in 0..3 {
            episode.step(&sprites, &mut rng);
        }
        assert_eq!(episode.players.len(), 1);
        drop(episode);
        assert!((pop[0].1.fitness - 0.1).abs() < 1e-9);
        assert!((pop[1].1.fitness - 0.4).abs() < 1e-9);
    }

    #[test]
    fn pipe_is_dropped_once_it_scrolls_off() {
        let mut pop = population(&[Pilot::Hover(380.0)]);
        let sprites = Sprites::new();
        let mut rng = rng();
        let mut episode = Episode::new(&mut pop[..], &(), &mut rng);
        episode.pipes[0] = Pipe::with_gap(FIRST_PIPE_X, 250);

        for frame in 1..=160 {
            let before = episode.pipes.len();
            episode.step(&sprites, &mut rng);
            if episode.pipes.len() > before {
                let fresh = episode.pipes.back_mut().unwrap();
                *fresh = Pipe::with_gap(fresh.x, 250);
            }
            assert!(!episode.is_over(), "bird died in frame {frame}");
            if frame == 159 {
                assert_eq!(episode.pipes.len(), 2);
                assert_eq!(episode.pipes[0].x, PIPE_DESPAWN_X + 5);
            }
        }

        assert_eq!(episode.pipes.len(), 1);
        assert_eq!(episode.pipes[0].x, 200);
        assert!(!episode.pipes[0].passed);
        assert_eq!(episode.score, 1);
    }

    #[test]
    fn pipe_spawned_mid_pass_is_collision_tested() {
        let mut pop = population(&[Pilot::Constant(0.0), Pilot::Constant(0.0)]);
        let sprites = Sprites::new();
        let mut rng = rng();
        let mut episode = Episode::new(&mut pop[..], &(), &mut rng);
        episode.pipes[0] = Pipe::with_gap(200, 300);
        // far right and high up: inside the upper pipe for any gap height
        episode.players[1].bird.x = NEXT_PIPE_X;
        episode.players[1].bird.y = -40;

        episode.step(&sprites, &mut rng);
        assert_eq!(episode.score, 1);
        assert_eq!(episode.pipes.len(), 2);
        assert_eq!(episode.pipes[1].x, NEXT_PIPE_X - 5);
        assert_eq!(episode.players.len(), 1);
        assert_eq!(episode.players[0].bird.x, BIRD_X);
    }

    #[test]
    fn active_pipe_moves_on_once_the_lead_is_past() {
        let mut pop = population(&[Pilot::Constant(0.0)]);
        let mut rng = rng();
        let mut episode = Episode::new(&mut pop, &(), &mut rng);
        episode.pipes = VecDeque::from([Pipe::with_gap(200, 300), Pipe::with_gap(500, 300)]);
        assert_eq!(episode.active_pipe(), 0);
        episode.pipes[0].x = 100;
        assert_eq!(episode.active_pipe(), 1);
        episode.pipes.pop_back();
        assert_eq!(episode.active_pipe(), 0);
    }

    #[test]
    fn evaluation_returns_when_the_last_bird_is_gone() {
        let mut pop = population(&[Pilot::Constant(0.0), Pilot::Constant(1.0)]);
        let mut arcade = Arcade::new(Recorder::default(), GameConfig::default(), rng());
        arcade.evaluate(&mut pop[..], &()).unwrap();

        let alive = &arcade.frontend.alive;
        assert_eq!(alive.len(), 30);
        assert_eq!(alive.last(), Some(&0));
        assert!(alive[..alive.len() - 1].iter().all(|&n| n > 0));
        assert_eq!(alive[23], 2);
        assert_eq!(alive[24], 1);
        assert!((pop[0].1.fitness - 2.5).abs() < 1e-9);
        assert!((pop[1].1.fitness - 3.0).abs() < 1e-9);
        assert_eq!(arcade.generation(), 1);
    }

    #[test]
    fn quitting_aborts_the_generation() {
        let mut pop = population(&[Pilot::Constant(0.0)]);
        let frontend = Recorder { quit_after: Some(3), ..Recorder::default() };
        let mut arcade = Arcade::new(frontend, GameConfig::default(), rng());
        let err = arcade.evaluate(&mut pop[..], &()).unwrap_err();
        assert!(err.is::<QuitRequested>());
        assert_eq!(arcade.frontend.alive.len(), 3);
    }

    #[test]
    fn frame_cap_keeps_survivor_fitness() {
        let mut pop = population(&[Pilot::Hover(380.0)]);
        let settings = GameConfig { max_frames: Some(50), ..GameConfig::default() };
        let mut arcade = Arcade::new(Headless, settings, rng());
        arcade.evaluate(&mut pop[..], &()).unwrap();
        assert!((pop[0].1.fitness - 5.0).abs() < 1e-9);
    }
}
