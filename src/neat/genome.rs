//! Node and connection genes, structural mutation, crossover and the
//! compatibility distance used for speciation.

use crate::agent::Candidate;
use crate::config::{Activation, FloatGene, GenomeConfig};
use crate::neat::network::FeedForwardNetwork;
use rand::Rng;
use rand::seq::IteratorRandom;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Inputs are -1, -2, ...; outputs 0..num_outputs; hidden nodes above that.
pub type NodeKey = i64;
pub type ConnectionKey = (NodeKey, NodeKey);

/// Gaussian sample via Box-Muller.
pub fn gauss<R: Rng + ?Sized>(rng: &mut R, mean: f64, stdev: f64) -> f64 {
    let u1: f64 = rng.r#gen::<f64>().max(f64::MIN_POSITIVE);
    let u2: f64 = rng.r#gen();
    mean + stdev * (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

impl FloatGene {
    pub fn init<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        gauss(rng, self.init_mean, self.init_stdev).clamp(self.min, self.max)
    }

    pub fn mutate<R: Rng + ?Sized>(&self, value: f64, rng: &mut R) -> f64 {
        let r: f64 = rng.r#gen();
        if r < self.mutate_rate {
            (value + gauss(rng, 0.0, self.mutate_power)).clamp(self.min, self.max)
        } else if r < self.mutate_rate + self.replace_rate {
            self.init(rng)
        } else {
            value
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeGene {
    pub bias: f64,
    pub response: f64,
    pub activation: Activation,
}

impl NodeGene {
    fn distance(&self, other: &NodeGene, config: &GenomeConfig) -> f64 {
        let mut d = (self.bias - other.bias).abs() + (self.response - other.response).abs();
        if self.activation != other.activation {
            d += 1.0;
        }
        d * config.compatibility_weight_coefficient
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionGene {
    pub weight: f64,
    pub enabled: bool,
}

impl ConnectionGene {
    fn distance(&self, other: &ConnectionGene, config: &GenomeConfig) -> f64 {
        let mut d = (self.weight - other.weight).abs();
        if self.enabled != other.enabled {
            d += 1.0;
        }
        d * config.compatibility_weight_coefficient
    }
}

/// Hands out hidden node keys so that splits in different genomes never
/// reuse a key for unrelated nodes.
#[derive(Debug, Clone)]
pub struct NodeIndexer {
    next: NodeKey,
}

impl NodeIndexer {
    pub fn new(config: &GenomeConfig) -> Self {
        Self { next: (config.num_outputs + config.num_hidden) as NodeKey }
    }

    pub fn next_key(&mut self) -> NodeKey {
        let key = self.next;
        self.next += 1;
        key
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Genome {
    pub nodes: BTreeMap<NodeKey, NodeGene>,
    #[serde(with = "connection_list")]
    pub connections: BTreeMap<ConnectionKey, ConnectionGene>,
    pub fitness: f64,
}

pub fn input_keys(config: &GenomeConfig) -> Vec<NodeKey> {
    (1..=config.num_inputs as NodeKey).map(|k| -k).collect()
}

pub fn output_keys(config: &GenomeConfig) -> Vec<NodeKey> {
    (0..config.num_outputs as NodeKey).collect()
}

impl Genome {
    /// Fully connected genome: inputs to hidden to outputs, or inputs
    /// straight to outputs when there are no hidden nodes.
    pub fn configure_new<R: Rng + ?Sized>(config: &GenomeConfig, rng: &mut R) -> Self {
        let mut genome = Genome::default();
        let outputs = output_keys(config);
        let hidden: Vec<NodeKey> =
            (config.num_outputs..config.num_outputs + config.num_hidden).map(|k| k as NodeKey).collect();
        for &key in outputs.iter().chain(&hidden) {
            genome.nodes.insert(key, new_node(config, rng));
        }

        let inputs = input_keys(config);
        let mut pairs = Vec::new();
        if hidden.is_empty() {
            for &i in &inputs {
                pairs.extend(outputs.iter().map(|&o| (i, o)));
            }
        } else {
            for &i in &inputs {
                pairs.extend(hidden.iter().map(|&h| (i, h)));
            }
            for &h in &hidden {
                pairs.extend(outputs.iter().map(|&o| (h, o)));
            }
        }
        for key in pairs {
            genome.connections.insert(key, ConnectionGene { weight: config.weight.init(rng), enabled: true });
        }
        genome
    }

    /// (node count, enabled connection count)
    pub fn size(&self) -> (usize, usize) {
        (self.nodes.len(), self.connections.values().filter(|c| c.enabled).count())
    }

    pub fn mutate<R: Rng + ?Sized>(&mut self, config: &GenomeConfig, indexer: &mut NodeIndexer, rng: &mut R) {
        if rng.r#gen::<f64>() < config.node_add_prob {
            self.mutate_add_node(config, indexer, rng);
        }
        if rng.r#gen::<f64>() < config.node_delete_prob {
            self.mutate_delete_node(config, rng);
        }
        if rng.r#gen::<f64>() < config.conn_add_prob {
            self.mutate_add_connection(config, rng);
        }
        if rng.r#gen::<f64>() < config.conn_delete_prob {
            self.mutate_delete_connection(rng);
        }

        for conn in self.connections.values_mut() {
            conn.weight = config.weight.mutate(conn.weight, rng);
            if rng.r#gen::<f64>() < config.enabled_mutate_rate {
                conn.enabled = !conn.enabled;
            }
        }
        for node in self.nodes.values_mut() {
            node.bias = config.bias.mutate(node.bias, rng);
        }
    }

    /// Splits a random connection: in -> new (weight 1), new -> out (old weight).
    pub fn mutate_add_node<R: Rng + ?Sized>(&mut self, config: &GenomeConfig, indexer: &mut NodeIndexer, rng: &mut R) {
        if self.connections.is_empty() {
            if config.conn_add_prob > 0.0 {
                self.mutate_add_connection(config, rng);
            }
            return;
        }
        let Some((&(i, o), conn)) = self.connections.iter_mut().choose(rng) else {
            return;
        };
        conn.enabled = false;
        let weight = conn.weight;

        let key = indexer.next_key();
        self.nodes.insert(key, new_node(config, rng));
        self.connections.insert((i, key), ConnectionGene { weight: 1.0, enabled: true });
        self.connections.insert((key, o), ConnectionGene { weight, enabled: true });
    }

    /// Removes a random hidden node with every connection touching it.
    pub fn mutate_delete_node<R: Rng + ?Sized>(&mut self, config: &GenomeConfig, rng: &mut R) {
        let outputs = config.num_outputs as NodeKey;
        let Some(&key) = self.nodes.keys().filter(|&&k| k >= outputs).choose(rng) else {
            return;
        };
        self.nodes.remove(&key);
        self.connections.retain(|&(i, o), _| i != key && o != key);
    }

    /// Adds a feed-forward connection, or re-enables it if it already exists.
    pub fn mutate_add_connection<R: Rng + ?Sized>(&mut self, config: &GenomeConfig, rng: &mut R) {
        let Some(&out_node) = self.nodes.keys().choose(rng) else {
            return;
        };
        let Some(in_node) = self.nodes.keys().copied().chain(input_keys(config)).choose(rng) else {
            return;
        };

        if let Some(existing) = self.connections.get_mut(&(in_node, out_node)) {
            existing.enabled = true;
            return;
        }
        let outputs = config.num_outputs as NodeKey;
        if (0..outputs).contains(&in_node) && (0..outputs).contains(&out_node) {
            return;
        }
        if creates_cycle(self.connections.keys(), (in_node, out_node)) {
            return;
        }
        self.connections.insert((in_node, out_node), ConnectionGene { weight: config.weight.init(rng), enabled: true });
    }

    pub fn mutate_delete_connection<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        if let Some(&key) = self.connections.keys().choose(rng) {
            self.connections.remove(&key);
        }
    }

    /// Child of `self` and `other`, where `self` is the fitter parent. Genes
    /// present in both are inherited attribute by attribute at random; the
    /// rest come from `self`.
    pub fn crossover<R: Rng + ?Sized>(&self, other: &Genome, rng: &mut R) -> Genome {
        let mut child = Genome::default();
        for (key, gene) in &self.connections {
            let gene = match other.connections.get(key) {
                Some(theirs) => ConnectionGene {
                    weight: if rng.r#gen() { gene.weight } else { theirs.weight },
                    enabled: if rng.r#gen() { gene.enabled } else { theirs.enabled },
                },
                None => gene.clone(),
            };
            child.connections.insert(*key, gene);
        }
        for (key, gene) in &self.nodes {
            let gene = match other.nodes.get(key) {
                Some(theirs) => NodeGene {
                    bias: if rng.r#gen() { gene.bias } else { theirs.bias },
                    response: if rng.r#gen() { gene.response } else { theirs.response },
                    activation: if rng.r#gen() { gene.activation } else { theirs.activation },
                },
                None => gene.clone(),
            };
            child.nodes.insert(*key, gene);
        }
        child
    }

    /// Genetic distance: disjoint genes plus attribute differences of the
    /// shared ones, normalised by the larger genome, for nodes and
    /// connections separately.
    pub fn distance(&self, other: &Genome, config: &GenomeConfig) -> f64 {
        let nodes = gene_distance(&self.nodes, &other.nodes, config, NodeGene::distance);
        let connections = gene_distance(&self.connections, &other.connections, config, ConnectionGene::distance);
        nodes + connections
    }
}

/// JSON object keys must be strings, so connections are written as a list
/// of `[[in, out], gene]` pairs.
mod connection_list {
    use super::{ConnectionGene, ConnectionKey};
    use serde::{Deserialize, Deserializer, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S: Serializer>(map: &BTreeMap<ConnectionKey, ConnectionGene>, s: S) -> Result<S::Ok, S::Error> {
        s.collect_seq(map.iter())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<BTreeMap<ConnectionKey, ConnectionGene>, D::Error> {
        let list = Vec::<(ConnectionKey, ConnectionGene)>::deserialize(d)?;
        Ok(list.into_iter().collect())
    }
}

fn new_node<R: Rng + ?Sized>(config: &GenomeConfig, rng: &mut R) -> NodeGene {
    NodeGene { bias: config.bias.init(rng), response: 1.0, activation: config.activation }
}

fn gene_distance<K: Ord, G>(
    a: &BTreeMap<K, G>,
    b: &BTreeMap<K, G>,
    config: &GenomeConfig,
    pair: impl Fn(&G, &G, &GenomeConfig) -> f64,
) -> f64 {
    let largest = a.len().max(b.len());
    if largest == 0 {
        return 0.0;
    }
    let mut disjoint = 0usize;
    let mut shared = 0.0;
    for (key, gene) in a {
        match b.get(key) {
            Some(theirs) => shared += pair(gene, theirs, config),
            None => disjoint += 1,
        }
    }
    disjoint += b.keys().filter(|k| !a.contains_key(k)).count();
    (shared + config.compatibility_disjoint_coefficient * disjoint as f64) / largest as f64
}

/// True if adding `test` to a feed-forward graph would close a loop.
pub fn creates_cycle<'c>(connections: impl Iterator<Item = &'c ConnectionKey> + Clone, test: ConnectionKey) -> bool {
    let (i, o) = test;
    if i == o {
        return true;
    }
    let mut visited = BTreeSet::from([o]);
    loop {
        let mut added = 0;
        for &(a, b) in connections.clone() {
            if visited.contains(&a) && !visited.contains(&b) {
                if b == i {
                    return true;
                }
                visited.insert(b);
                added += 1;
            }
        }
        if added == 0 {
            return false;
        }
    }
}

impl Candidate for Genome {
    type Brain = FeedForwardNetwork;
    type Context = GenomeConfig;

    fn brain(&self, config: &GenomeConfig) -> FeedForwardNetwork {
        FeedForwardNetwork::create(self, config)
    }

    fn fitness(&self) -> f64 {
        self.fitness
    }

    fn fitness_mut(&mut self) -> &mut f64 {
        &mut self.fitness
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn config() -> GenomeConfig {
        GenomeConfig::default()
    }

    #[test]
    fn new_genome_is_fully_connected() {
        let mut rng = SmallRng::seed_from_u64(1);
        let genome = Genome::configure_new(&config(), &mut rng);
        assert_eq!(genome.nodes.keys().copied().collect::<Vec<_>>(), vec![0]);
        let keys: Vec<_> = genome.connections.keys().copied().collect();
        assert_eq!(keys, vec![(-3, 0), (-2, 0), (-1, 0)]);
        assert_eq!(genome.size(), (1, 3));
    }

    #[test]
    fn hidden_layer_sits_between_inputs_and_outputs() {
        let mut rng = SmallRng::seed_from_u64(1);
        let cfg = GenomeConfig { num_hidden: 2, ..config() };
        let genome = Genome::configure_new(&cfg, &mut rng);
        assert_eq!(genome.nodes.len(), 3);
        assert_eq!(genome.connections.len(), 3 * 2 + 2);
        assert!(!genome.connections.contains_key(&(-1, 0)));
    }

    #[test]
    fn add_node_splits_a_connection() {
        let mut rng = SmallRng::seed_from_u64(2);
        let cfg = config();
        let mut indexer = NodeIndexer::new(&cfg);
        let mut genome = Genome::configure_new(&cfg, &mut rng);
        genome.mutate_add_node(&cfg, &mut indexer, &mut rng);

        assert_eq!(genome.nodes.len(), 2);
        assert!(genome.nodes.contains_key(&1));
        let disabled: Vec<_> = genome.connections.iter().filter(|(_, c)| !c.enabled).map(|(k, _)| *k).collect();
        assert_eq!(disabled.len(), 1);
        let (i, o) = disabled[0];
        assert_eq!(genome.connections[&(i, 1)].weight, 1.0);
        assert_eq!(genome.connections[&(1, o)].weight, genome.connections[&(i, o)].weight);
    }

    #[test]
    fn mutation_never_creates_cycles() {
        let mut rng = SmallRng::seed_from_u64(3);
        let cfg = GenomeConfig { node_add_prob: 0.6, conn_add_prob: 0.9, ..config() };
        let mut indexer = NodeIndexer::new(&cfg);
        let mut genome = Genome::configure_new(&cfg, &mut rng);
        for _ in 0..200 {
            genome.mutate(&cfg, &mut indexer, &mut rng);
        }
        let keys: Vec<_> = genome.connections.keys().copied().collect();
        for (n, &key) in keys.iter().enumerate() {
            let others: Vec<_> = keys.iter().enumerate().filter(|&(m, _)| m != n).map(|(_, k)| *k).collect();
            assert!(!creates_cycle(others.iter(), key), "cycle through {key:?}");
        }
    }

    #[test]
    fn cycle_detection() {
        let conns = [(-1, 2), (2, 3), (3, 0)];
        assert!(creates_cycle(conns.iter(), (3, 2)));
        assert!(creates_cycle(conns.iter(), (0, 2)));
        assert!(creates_cycle(conns.iter(), (2, 2)));
        assert!(!creates_cycle(conns.iter(), (-1, 3)));
        assert!(!creates_cycle(conns.iter(), (2, 0)));
    }

    #[test]
    fn identical_genomes_have_zero_distance() {
        let mut rng = SmallRng::seed_from_u64(4);
        let cfg = config();
        let genome = Genome::configure_new(&cfg, &mut rng);
        assert_eq!(genome.distance(&genome.clone(), &cfg), 0.0);
        let other = Genome::configure_new(&cfg, &mut rng);
        let d = genome.distance(&other, &cfg);
        assert!(d > 0.0);
        assert!((d - other.distance(&genome, &cfg)).abs() < 1e-12);
    }

    #[test]
    fn crossover_keeps_the_fitter_parents_structure() {
        let mut rng = SmallRng::seed_from_u64(5);
        let cfg = config();
        let mut indexer = NodeIndexer::new(&cfg);
        let mut fit = Genome::configure_new(&cfg, &mut rng);
        fit.mutate_add_node(&cfg, &mut indexer, &mut rng);
        let weak = Genome::configure_new(&cfg, &mut rng);

        let child = fit.crossover(&weak, &mut rng);
        assert_eq!(child.nodes.keys().collect::<Vec<_>>(), fit.nodes.keys().collect::<Vec<_>>());
        assert_eq!(
            child.connections.keys().collect::<Vec<_>>(),
            fit.connections.keys().collect::<Vec<_>>()
        );
        for (key, gene) in &child.connections {
            let from_fit = fit.connections[key].weight;
            let from_weak = weak.connections.get(key).map(|c| c.weight);
            assert!(gene.weight == from_fit || Some(gene.weight) == from_weak);
        }
    }

    #[test]
    fn float_genes_stay_in_bounds() {
        let mut rng = SmallRng::seed_from_u64(6);
        let gene = FloatGene { mutate_power: 50.0, mutate_rate: 1.0, ..FloatGene::default() };
        let mut v = 0.0;
        for _ in 0..500 {
            v = gene.mutate(v, &mut rng);
            assert!((gene.min..=gene.max).contains(&v));
        }
    }

    #[test]
    fn gauss_has_roughly_the_requested_moments() {
        let mut rng = SmallRng::seed_from_u64(7);
        let n = 20_000;
        let samples: Vec<f64> = (0..n).map(|_| gauss(&mut rng, 2.0, 0.5)).collect();
        let mean = samples.iter().sum::<f64>() / n as f64;
        let var = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n as f64;
        assert!((mean - 2.0).abs() < 0.05);
        assert!((var.sqrt() - 0.5).abs() < 0.05);
    }

    #[test]
    fn genome_survives_a_json_file() {
        let mut rng = SmallRng::seed_from_u64(8);
        let cfg = config();
        let mut indexer = NodeIndexer::new(&cfg);
        let mut genome = Genome::configure_new(&cfg, &mut rng);
        genome.mutate_add_node(&cfg, &mut indexer, &mut rng);
        genome.fitness = 42.5;

        let json = serde_json::to_string(&genome).unwrap();
        let back: Genome = serde_json::from_str(&json).unwrap();
        assert_eq!(back.size(), genome.size());
        assert!(back.connections.keys().eq(genome.connections.keys()));
        assert!(back.nodes.keys().eq(genome.nodes.keys()));
        assert_eq!(back.fitness, 42.5);
    }
}
