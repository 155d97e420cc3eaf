//! NEAT: evolving the weights and topology of small feed-forward networks.

pub mod genome;
pub mod network;
pub mod population;

pub use genome::Genome;
pub use population::Population;
