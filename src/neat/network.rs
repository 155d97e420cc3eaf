use crate::agent::Brain;
use crate::config::{Activation, GenomeConfig};
use crate::neat::genome::{input_keys, output_keys, ConnectionKey, Genome, NodeKey};
use ahash::{AHashMap, AHashSet};
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
struct NodeEval {
    node: NodeKey,
    activation: Activation,
    bias: f64,
    response: f64,
    links: Vec<(NodeKey, f64)>,
}

/// Phenotype of a genome: nodes evaluated layer by layer from the inputs.
#[derive(Debug, Clone)]
pub struct FeedForwardNetwork {
    inputs: Vec<NodeKey>,
    outputs: Vec<NodeKey>,
    evals: Vec<NodeEval>,
    values: AHashMap<NodeKey, f64>,
}

impl FeedForwardNetwork {
    pub fn create(genome: &Genome, config: &GenomeConfig) -> Self {
        let inputs = input_keys(config);
        let outputs = output_keys(config);
        let connections: Vec<ConnectionKey> =
            genome.connections.iter().filter(|(_, c)| c.enabled).map(|(k, _)| *k).collect();

        let mut evals = Vec::new();
        for layer in feed_forward_layers(&inputs, &outputs, &connections) {
            for node in layer {
                let Some(gene) = genome.nodes.get(&node) else {
                    continue;
                };
                let links = genome
                    .connections
                    .iter()
                    .filter(|((_, o), c)| *o == node && c.enabled)
                    .map(|(&(i, _), c)| (i, c.weight))
                    .collect();
                evals.push(NodeEval {
                    node,
                    activation: gene.activation,
                    bias: gene.bias,
                    response: gene.response,
                    links,
                });
            }
        }

        let values = inputs.iter().chain(&outputs).map(|&k| (k, 0.0)).collect();
        Self { inputs, outputs, evals, values }
    }

    pub fn activate(&mut self, inputs: &[f64]) -> Vec<f64> {
        debug_assert_eq!(inputs.len(), self.inputs.len());
        for (key, value) in self.inputs.iter().zip(inputs) {
            self.values.insert(*key, *value);
        }
        for eval in &self.evals {
            let sum: f64 = eval.links.iter().map(|(i, w)| self.values.get(i).copied().unwrap_or(0.0) * w).sum();
            self.values.insert(eval.node, eval.activation.apply(eval.bias + eval.response * sum));
        }
        self.outputs.iter().map(|k| self.values.get(k).copied().unwrap_or(0.0)).collect()
    }
}

impl Brain for FeedForwardNetwork {
    fn activate(&mut self, inputs: &[f64]) -> Vec<f64> {
        FeedForwardNetwork::activate(self, inputs)
    }
}

/// Non-input nodes whose values can influence an output.
pub fn required_for_output(
    inputs: &[NodeKey],
    outputs: &[NodeKey],
    connections: &[ConnectionKey],
) -> AHashSet<NodeKey> {
    let inputs: AHashSet<NodeKey> = inputs.iter().copied().collect();
    let mut required: AHashSet<NodeKey> = outputs.iter().copied().collect();
    let mut frontier = required.clone();
    loop {
        let upstream: AHashSet<NodeKey> = connections
            .iter()
            .filter(|(a, b)| frontier.contains(b) && !frontier.contains(a))
            .map(|&(a, _)| a)
            .collect();
        let layer: Vec<NodeKey> = upstream.iter().copied().filter(|n| !inputs.contains(n)).collect();
        if layer.is_empty() {
            break;
        }
        required.extend(layer);
        frontier.extend(upstream);
    }
    required
}

/// Groups required nodes into layers that only depend on earlier layers.
/// Links from nodes the inputs never reach are dropped first, so a dangling
/// hidden node cannot block its targets.
pub fn feed_forward_layers(
    inputs: &[NodeKey],
    outputs: &[NodeKey],
    connections: &[ConnectionKey],
) -> Vec<BTreeSet<NodeKey>> {
    let mut reachable: AHashSet<NodeKey> = inputs.iter().copied().collect();
    loop {
        let before = reachable.len();
        for &(a, b) in connections {
            if reachable.contains(&a) {
                reachable.insert(b);
            }
        }
        if reachable.len() == before {
            break;
        }
    }
    let connections: Vec<ConnectionKey> = connections.iter().copied().filter(|(a, _)| reachable.contains(a)).collect();

    let required = required_for_output(inputs, outputs, &connections);
    let mut done: AHashSet<NodeKey> = inputs.iter().copied().collect();
    let mut layers = Vec::new();
    loop {
        let candidates: BTreeSet<NodeKey> =
            connections.iter().filter(|(a, b)| done.contains(a) && !done.contains(b)).map(|&(_, b)| b).collect();
        let layer: BTreeSet<NodeKey> = candidates
            .into_iter()
            .filter(|n| required.contains(n))
            .filter(|&n| connections.iter().filter(|(_, b)| *b == n).all(|(a, _)| done.contains(a)))
            .collect();
        if layer.is_empty() {
            break;
        }
        done.extend(layer.iter().copied());
        layers.push(layer);
    }
    layers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neat::genome::{ConnectionGene, NodeGene};
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn node(bias: f64) -> NodeGene {
        NodeGene { bias, response: 1.0, activation: Activation::Identity }
    }

    fn link(weight: f64, enabled: bool) -> ConnectionGene {
        ConnectionGene { weight, enabled }
    }

    #[test]
    fn weighted_sum_plus_bias() {
        let mut genome = Genome::default();
        genome.nodes.insert(0, node(0.5));
        genome.connections.insert((-1, 0), link(2.0, true));
        genome.connections.insert((-2, 0), link(-1.0, true));
        genome.connections.insert((-3, 0), link(100.0, false));
        let mut net = FeedForwardNetwork::create(&genome, &GenomeConfig::default());
        assert_eq!(net.activate(&[1.0, 2.0, 3.0]), vec![0.5]);
    }

    #[test]
    fn hidden_nodes_feed_forward() {
        let mut genome = Genome::default();
        genome.nodes.insert(0, node(0.0));
        genome.nodes.insert(1, node(1.0));
        genome.connections.insert((-1, 1), link(1.0, true));
        genome.connections.insert((1, 0), link(3.0, true));
        let mut net = FeedForwardNetwork::create(&genome, &GenomeConfig::default());
        assert_eq!(net.activate(&[2.0, 0.0, 0.0]), vec![9.0]);
    }

    #[test]
    fn dangling_hidden_node_is_ignored() {
        let mut genome = Genome::default();
        genome.nodes.insert(0, node(0.0));
        genome.nodes.insert(7, node(5.0));
        genome.connections.insert((-1, 0), link(1.0, true));
        genome.connections.insert((7, 0), link(1.0, true));
        let mut net = FeedForwardNetwork::create(&genome, &GenomeConfig::default());
        assert_eq!(net.activate(&[4.0, 0.0, 0.0]), vec![4.0]);
    }

    #[test]
    fn layers_respect_dependencies() {
        let conns = [(-1, 2), (-2, 3), (2, 3), (3, 0), (-1, 0)];
        let layers = feed_forward_layers(&[-1, -2], &[0], &conns);
        assert_eq!(layers, vec![BTreeSet::from([2]), BTreeSet::from([3]), BTreeSet::from([0])]);
    }

    #[test]
    fn nodes_off_the_output_path_are_not_required() {
        let conns = [(-1, 2), (-1, 0), (2, 4)];
        let required = required_for_output(&[-1], &[0], &conns);
        assert!(required.contains(&0));
        assert!(!required.contains(&2));
        assert!(!required.contains(&4));
    }

    #[test]
    fn tanh_output_is_bounded() {
        let mut rng = SmallRng::seed_from_u64(9);
        let cfg = GenomeConfig::default();
        let genome = Genome::configure_new(&cfg, &mut rng);
        let mut net = FeedForwardNetwork::create(&genome, &cfg);
        for inputs in [[350.0, 50.0, 150.0], [-40.0, 300.0, 500.0], [0.0, 0.0, 0.0]] {
            let out = net.activate(&inputs);
            assert_eq!(out.len(), 1);
            assert!(out[0] >= -1.0 && out[0] <= 1.0);
        }
    }
}
