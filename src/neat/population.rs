use crate::agent::{Evaluate, GenomeKey};
use crate::config::NeatConfig;
use crate::neat::genome::{Genome, NodeIndexer};
use anyhow::{anyhow, bail, Result};
use log::{debug, info};
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

pub type SpeciesKey = u32;

#[derive(Debug, Clone)]
pub struct Species {
    pub key: SpeciesKey,
    pub created: u32,
    pub last_improved: u32,
    pub representative: Genome,
    pub members: Vec<GenomeKey>,
    pub fitness: Option<f64>,
    pub adjusted_fitness: f64,
    pub fitness_history: Vec<f64>,
}

/// Per-generation summary, oldest first.
#[derive(Debug, Clone, Default)]
pub struct Statistics {
    pub best_fitness: Vec<f64>,
    pub mean_fitness: Vec<f64>,
    pub species_count: Vec<usize>,
}

pub struct Population {
    config: NeatConfig,
    rng: SmallRng,
    indexer: NodeIndexer,
    next_genome: GenomeKey,
    next_species: SpeciesKey,
    genomes: Vec<(GenomeKey, Genome)>,
    species: BTreeMap<SpeciesKey, Species>,
    generation: u32,
    best: Option<Genome>,
    stats: Statistics,
}

impl Population {
    pub fn new(config: NeatConfig, rng: SmallRng) -> Self {
        let indexer = NodeIndexer::new(&config.genome);
        let mut population = Self {
            config,
            rng,
            indexer,
            next_genome: 1,
            next_species: 1,
            genomes: Vec::new(),
            species: BTreeMap::new(),
            generation: 0,
            best: None,
            stats: Statistics::default(),
        };
        population.genomes = population.create_new(population.config.pop_size);
        population.speciate();
        population
    }

    pub fn genomes(&self) -> &[(GenomeKey, Genome)] {
        &self.genomes
    }

    pub fn species(&self) -> &BTreeMap<SpeciesKey, Species> {
        &self.species
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn statistics(&self) -> &Statistics {
        &self.stats
    }

    fn create_new(&mut self, count: usize) -> Vec<(GenomeKey, Genome)> {
        (0..count)
            .map(|_| {
                let key = self.next_genome;
                self.next_genome += 1;
                (key, Genome::configure_new(&self.config.genome, &mut self.rng))
            })
            .collect()
    }

    /// Runs up to `generations` generations (unbounded when None) and
    /// returns the fittest genome seen.
    pub fn run<E: Evaluate<Genome>>(&mut self, evaluator: &mut E, generations: Option<u32>) -> Result<Genome> {
        let mut done = 0;
        while generations.is_none_or(|n| done < n) {
            done += 1;
            let started = Instant::now();
            info!("****** Running generation {} ******", self.generation);

            evaluator.evaluate(&mut self.genomes, &self.config.genome)?;

            let (best_key, best) = self
                .genomes
                .iter()
                .max_by(|a, b| a.1.fitness.total_cmp(&b.1.fitness))
                .map(|(k, g)| (*k, g.clone()))
                .ok_or_else(|| anyhow!("population is empty"))?;
            self.report(best_key, &best);
            if self.best.as_ref().is_none_or(|b| best.fitness > b.fitness) {
                self.best = Some(best.clone());
            }

            if !self.config.no_fitness_termination && best.fitness >= self.config.fitness_threshold {
                info!(
                    "Best individual in generation {} meets fitness threshold - complexity: {:?}",
                    self.generation,
                    best.size()
                );
                break;
            }

            self.reproduce()?;
            self.speciate();
            info!("Generation time: {:.3} sec", started.elapsed().as_secs_f64());
            self.generation += 1;
        }

        self.best.clone().ok_or_else(|| anyhow!("no generation was evaluated"))
    }

    fn report(&mut self, best_key: GenomeKey, best: &Genome) {
        let fitnesses: Vec<f64> = self.genomes.iter().map(|(_, g)| g.fitness).collect();
        let (mean, stdev) = mean_stdev(&fitnesses);
        let species_of_best = self
            .species
            .values()
            .find(|s| s.members.contains(&best_key))
            .map(|s| s.key)
            .unwrap_or_default();
        info!("Population's average fitness: {mean:.5} stdev: {stdev:.5}");
        info!(
            "Best fitness: {:.5} - size: {:?} - species {} - id {}",
            best.fitness,
            best.size(),
            species_of_best,
            best_key
        );
        self.stats.best_fitness.push(best.fitness);
        self.stats.mean_fitness.push(mean);
        self.stats.species_count.push(self.species.len());
    }

    /// Each surviving species keeps the closest genome to its old
    /// representative; everyone else joins the closest species within the
    /// threshold or founds a new one.
    fn speciate(&mut self) {
        let threshold = self.config.species.compatibility_threshold;
        let cfg = &self.config.genome;
        let genomes = &self.genomes;
        let mut unspeciated: BTreeSet<usize> = (0..genomes.len()).collect();
        let mut reps: BTreeMap<SpeciesKey, usize> = BTreeMap::new();
        let mut members: BTreeMap<SpeciesKey, Vec<usize>> = BTreeMap::new();

        for (&sid, species) in &self.species {
            let closest = unspeciated
                .iter()
                .copied()
                .min_by(|&a, &b| {
                    let da = species.representative.distance(&genomes[a].1, cfg);
                    let db = species.representative.distance(&genomes[b].1, cfg);
                    da.total_cmp(&db)
                });
            if let Some(idx) = closest {
                unspeciated.remove(&idx);
                reps.insert(sid, idx);
                members.insert(sid, vec![idx]);
            }
        }

        let mut founded = Vec::new();
        for idx in unspeciated {
            let closest = reps
                .iter()
                .map(|(&sid, &rep)| (sid, genomes[rep].1.distance(&genomes[idx].1, cfg)))
                .filter(|&(_, d)| d < threshold)
                .min_by(|a, b| a.1.total_cmp(&b.1));
            match closest {
                Some((sid, _)) => members.entry(sid).or_default().push(idx),
                None => {
                    let sid = self.next_species;
                    self.next_species += 1;
                    reps.insert(sid, idx);
                    members.insert(sid, vec![idx]);
                    founded.push(sid);
                }
            }
        }

        let generation = self.generation;
        self.species.retain(|sid, _| reps.contains_key(sid));
        for (sid, rep) in reps {
            let member_keys = members.remove(&sid).unwrap_or_default().into_iter().map(|i| genomes[i].0).collect();
            let species = self.species.entry(sid).or_insert_with(|| Species {
                key: sid,
                created: generation,
                last_improved: generation,
                representative: Genome::default(),
                members: Vec::new(),
                fitness: None,
                adjusted_fitness: 0.0,
                fitness_history: Vec::new(),
            });
            species.representative = genomes[rep].1.clone();
            species.members = member_keys;
        }
        if !founded.is_empty() {
            debug!("new species {founded:?}");
        }

        info!("Population of {} members in {} species", self.genomes.len(), self.species.len());
        for s in self.species.values() {
            debug!(
                "species {:>4} age {:>4} size {:>4} fitness {:>9} adj fit {:.3} stag {:>4}",
                s.key,
                generation - s.created,
                s.members.len(),
                s.fitness.map_or_else(|| "--".to_string(), |f| format!("{f:.1}")),
                s.adjusted_fitness,
                generation - s.last_improved
            );
        }
    }

    /// Records this generation's species fitness and drops species that
    /// have not improved for `max_stagnation` generations. The best
    /// `species_elitism` species are always kept.
    fn remove_stagnant(&mut self, genomes: &BTreeMap<GenomeKey, Genome>) {
        let generation = self.generation;
        let mut ranked: Vec<(SpeciesKey, f64)> = Vec::new();
        for (&sid, s) in self.species.iter_mut() {
            let fitness = member_fitness(s, genomes).into_iter().fold(f64::NEG_INFINITY, f64::max);
            let prev_best = s.fitness_history.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            s.fitness = Some(fitness);
            s.fitness_history.push(fitness);
            if fitness > prev_best {
                s.last_improved = generation;
            }
            ranked.push((sid, fitness));
        }
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1));

        let elitism = self.config.species.species_elitism;
        let total = ranked.len();
        let mut non_stagnant = total;
        for (idx, (sid, _)) in ranked.iter().enumerate() {
            let stagnant_for = generation - self.species[sid].last_improved;
            let stagnant = non_stagnant > elitism
                && stagnant_for >= self.config.species.max_stagnation
                && total - idx > elitism;
            if stagnant {
                non_stagnant -= 1;
                debug!("species {sid} removed after {stagnant_for} generations without improvement");
                self.species.remove(sid);
            }
        }
    }

    fn reproduce(&mut self) -> Result<()> {
        let old: BTreeMap<GenomeKey, Genome> = std::mem::take(&mut self.genomes).into_iter().collect();
        self.remove_stagnant(&old);
        if self.species.is_empty() {
            if !self.config.reset_on_extinction {
                bail!("complete extinction in generation {}", self.generation);
            }
            info!("All species extinct; starting over with a fresh population");
            self.genomes = self.create_new(self.config.pop_size);
            return Ok(());
        }

        let repro = self.config.reproduction.clone();
        let min_species_size = repro.min_species_size.max(repro.elitism);

        let all: Vec<f64> = self.species.values().flat_map(|s| member_fitness(s, &old)).collect();
        let min_f = all.iter().copied().fold(f64::INFINITY, f64::min);
        let max_f = all.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let range = (max_f - min_f).max(1.0);
        for s in self.species.values_mut() {
            let (mean, _) = mean_stdev(&member_fitness(s, &old));
            s.adjusted_fitness = (mean - min_f) / range;
        }

        let adjusted: Vec<f64> = self.species.values().map(|s| s.adjusted_fitness).collect();
        let previous: Vec<usize> = self.species.values().map(|s| s.members.len()).collect();
        let spawns = compute_spawn(&adjusted, &previous, self.config.pop_size, min_species_size);

        let mut next = Vec::with_capacity(self.config.pop_size);
        for (species, spawn) in self.species.values_mut().zip(spawns) {
            let mut spawn = spawn.max(repro.elitism);
            let mut parents: Vec<(GenomeKey, &Genome)> =
                std::mem::take(&mut species.members).into_iter().filter_map(|k| old.get(&k).map(|g| (k, g))).collect();
            parents.sort_by(|a, b| b.1.fitness.total_cmp(&a.1.fitness));

            for (key, genome) in parents.iter().take(repro.elitism) {
                next.push((*key, (*genome).clone()));
                spawn -= 1;
            }
            if spawn == 0 || parents.is_empty() {
                continue;
            }

            let cutoff = ((repro.survival_threshold * parents.len() as f64).ceil() as usize).max(2).min(parents.len());
            parents.truncate(cutoff);
            for _ in 0..spawn {
                let (Some(&(_, p1)), Some(&(_, p2))) = (parents.choose(&mut self.rng), parents.choose(&mut self.rng))
                else {
                    break;
                };
                let (fitter, other) = if p1.fitness > p2.fitness { (p1, p2) } else { (p2, p1) };
                let mut child = fitter.crossover(other, &mut self.rng);
                child.mutate(&self.config.genome, &mut self.indexer, &mut self.rng);
                child.fitness = 0.0;
                let key = self.next_genome;
                self.next_genome += 1;
                next.push((key, child));
            }
        }
        self.genomes = next;
        Ok(())
    }
}

fn member_fitness(species: &Species, genomes: &BTreeMap<GenomeKey, Genome>) -> Vec<f64> {
    species.members.iter().filter_map(|k| genomes.get(k)).map(|g| g.fitness).collect()
}

fn mean_stdev(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// Offspring per species: each moves half way towards its share of the
/// adjusted fitness, then everything is scaled back to `pop_size`.
pub fn compute_spawn(adjusted: &[f64], previous: &[usize], pop_size: usize, min_species_size: usize) -> Vec<usize> {
    let af_sum: f64 = adjusted.iter().sum();
    let amounts: Vec<i64> = adjusted
        .iter()
        .zip(previous)
        .map(|(&af, &prev)| {
            let target = if af_sum > 0.0 {
                (af / af_sum * pop_size as f64).max(min_species_size as f64)
            } else {
                min_species_size as f64
            };
            let d = (target - prev as f64) * 0.5;
            let c = d.round() as i64;
            let mut spawn = prev as i64;
            if c.abs() > 0 {
                spawn += c;
            } else if d > 0.0 {
                spawn += 1;
            } else if d < 0.0 {
                spawn -= 1;
            }
            spawn
        })
        .collect();

    let total = amounts.iter().sum::<i64>().max(1);
    let norm = pop_size as f64 / total as f64;
    amounts.into_iter().map(|n| ((n as f64 * norm).round().max(0.0) as usize).max(min_species_size)).collect()
}
