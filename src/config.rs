use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Inputs the game feeds every brain: height and the two gap distances.
pub const GAME_INPUTS: usize = 3;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub neat: NeatConfig,
    pub game: GameConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Config =
            serde_json::from_str(&text).with_context(|| format!("failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let genome = &self.neat.genome;
        if genome.num_inputs != GAME_INPUTS {
            bail!("num_inputs must be {GAME_INPUTS}, got {}", genome.num_inputs);
        }
        if genome.num_outputs == 0 {
            bail!("num_outputs must be at least 1");
        }
        if self.neat.pop_size == 0 {
            bail!("pop_size must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.neat.reproduction.survival_threshold) {
            bail!("survival_threshold must lie in [0, 1]");
        }
        if self.game.fps == 0 {
            bail!("fps must be at least 1");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub fps: u32,
    /// Ends a generation early even if birds survive. None plays until the last bird dies.
    pub max_frames: Option<u64>,
    pub seed: Option<u64>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self { fps: 30, max_frames: None, seed: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NeatConfig {
    pub fitness_threshold: f64,
    pub no_fitness_termination: bool,
    pub pop_size: usize,
    pub reset_on_extinction: bool,
    pub genome: GenomeConfig,
    pub species: SpeciesConfig,
    pub reproduction: ReproductionConfig,
}

impl Default for NeatConfig {
    fn default() -> Self {
        Self {
            fitness_threshold: 100.0,
            no_fitness_termination: false,
            pop_size: 50,
            reset_on_extinction: true,
            genome: GenomeConfig::default(),
            species: SpeciesConfig::default(),
            reproduction: ReproductionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Tanh,
    Sigmoid,
    Relu,
    Identity,
}

impl Activation {
    pub fn apply(self, z: f64) -> f64 {
        match self {
            Activation::Tanh => (2.5 * z).clamp(-60.0, 60.0).tanh(),
            Activation::Sigmoid => 1.0 / (1.0 + (-(5.0 * z).clamp(-60.0, 60.0)).exp()),
            Activation::Relu => z.max(0.0),
            Activation::Identity => z,
        }
    }
}

/// Initial distribution, bounds and mutation of one numeric gene attribute.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct FloatGene {
    pub init_mean: f64,
    pub init_stdev: f64,
    pub min: f64,
    pub max: f64,
    pub mutate_power: f64,
    pub mutate_rate: f64,
    pub replace_rate: f64,
}

impl Default for FloatGene {
    fn default() -> Self {
        Self {
            init_mean: 0.0,
            init_stdev: 1.0,
            min: -30.0,
            max: 30.0,
            mutate_power: 0.5,
            mutate_rate: 0.7,
            replace_rate: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenomeConfig {
    pub num_inputs: usize,
    pub num_outputs: usize,
    pub num_hidden: usize,
    pub activation: Activation,
    pub bias: FloatGene,
    pub weight: FloatGene,
    pub conn_add_prob: f64,
    pub conn_delete_prob: f64,
    pub node_add_prob: f64,
    pub node_delete_prob: f64,
    pub enabled_mutate_rate: f64,
    pub compatibility_disjoint_coefficient: f64,
    pub compatibility_weight_coefficient: f64,
}

impl Default for GenomeConfig {
    fn default() -> Self {
        Self {
            num_inputs: GAME_INPUTS,
            num_outputs: 1,
            num_hidden: 0,
            activation: Activation::Tanh,
            bias: FloatGene::default(),
            weight: FloatGene { mutate_rate: 0.8, ..FloatGene::default() },
            conn_add_prob: 0.5,
            conn_delete_prob: 0.5,
            node_add_prob: 0.2,
            node_delete_prob: 0.2,
            enabled_mutate_rate: 0.01,
            compatibility_disjoint_coefficient: 1.0,
            compatibility_weight_coefficient: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeciesConfig {
    pub compatibility_threshold: f64,
    pub max_stagnation: u32,
    pub species_elitism: usize,
}

impl Default for SpeciesConfig {
    fn default() -> Self {
        Self { compatibility_threshold: 3.0, max_stagnation: 20, species_elitism: 2 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReproductionConfig {
    pub elitism: usize,
    pub survival_threshold: f64,
    pub min_species_size: usize,
}

impl Default for ReproductionConfig {
    fn default() -> Self {
        Self { elitism: 2, survival_threshold: 0.2, min_species_size: 2 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_yields_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        config.validate().unwrap();
        assert_eq!(config.neat.pop_size, 50);
        assert_eq!(config.neat.genome.num_inputs, 3);
        assert_eq!(config.neat.genome.activation, Activation::Tanh);
        assert_eq!(config.game.fps, 30);
        assert!(config.game.max_frames.is_none());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let text = r#"{ "neat": { "pop_size": 8, "genome": { "weight": { "mutate_power": 1.5 } } } }"#;
        let config: Config = serde_json::from_str(text).unwrap();
        assert_eq!(config.neat.pop_size, 8);
        assert_eq!(config.neat.genome.weight.mutate_power, 1.5);
        assert_eq!(config.neat.genome.weight.max, 30.0);
        assert_eq!(config.neat.species.max_stagnation, 20);
    }

    #[test]
    fn wrong_input_count_is_rejected() {
        let text = r#"{ "neat": { "genome": { "num_inputs": 4 } } }"#;
        let config: Config = serde_json::from_str(text).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn shipped_config_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config.json");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.neat.genome.num_outputs, 1);
    }

    #[test]
    fn missing_file_fails_loudly() {
        let err = Config::load(Path::new("does/not/exist.json")).unwrap_err();
        assert!(format!("{err:#}").contains("failed to read config"));
    }

    #[test]
    fn tanh_is_steepened_and_bounded() {
        let act = Activation::Tanh;
        assert_eq!(act.apply(0.0), 0.0);
        assert!((act.apply(0.2) - 0.5f64.tanh()).abs() < 1e-12);
        assert_eq!(act.apply(1e9), 1.0);
    }
}
