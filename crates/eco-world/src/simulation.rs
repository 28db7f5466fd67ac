//! Tick engine.
//!
//! One tick runs three passes over the grid, always in the same row-major
//! order (y, then x, then population index):
//!
//! 1. **Intent**: every organism alive at tick start gains energy, decides
//!    whether it is ready to replicate, and picks a target neighbor.
//! 2. **Arbitration**: every slot that was empty at tick start picks one
//!    winner among the same-population neighbors targeting it, by reservoir
//!    sampling. The winner moves in, or places its offspring there.
//! 3. **Consequence**: organisms eat co-located prey one trophic level below,
//!    starve at zero energy, and are clamped to their energy maximum.
//!
//! All random draws come from one stream, consumed in that fixed order, so a
//! seed fully determines the trajectory.

use crate::grid::World;
use crate::organism::Organism;
use eco_core::{PopulationId, Result, SimRng, SimulationConfig, UniformSource, NEIGHBOR_COUNT};
use serde::Serialize;
use tracing::{debug, instrument, trace};

/// Per-slot scratch state for one tick. Reset at the start of every tick.
#[derive(Debug, Clone, Copy, Default)]
struct Intent {
    /// Slot held a living organism when the tick started
    existed: bool,
    /// Organism is replicating rather than moving this tick
    ready: bool,
    /// Organism was created during this tick
    newborn: bool,
    /// Site index of the cell the organism wants to move or replicate into
    target: usize,
}

/// Demographic flow of one population during one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PopulationFlow {
    pub births: u32,
    pub moves: u32,
    /// Organisms of this population eaten by predators
    pub eaten: u32,
    pub starved: u32,
}

impl PopulationFlow {
    pub fn accumulate(&mut self, other: &PopulationFlow) {
        self.births += other.births;
        self.moves += other.moves;
        self.eaten += other.eaten;
        self.starved += other.starved;
    }
}

/// What happened during one tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// The tick that was computed
    pub tick: u64,
    /// Indexed by population
    pub flows: Vec<PopulationFlow>,
}

/// The three-phase state transition, with scratch buffers reused across ticks.
#[derive(Debug, Default)]
pub struct TickEngine {
    intents: Vec<Intent>,
}

impl TickEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance `world` by one tick. Cannot fail: the world was validated when
    /// it was built.
    pub fn step<R: UniformSource + ?Sized>(&mut self, world: &mut World, rng: &mut R) -> TickReport {
        self.intents.clear();
        self.intents.resize(world.slot_count(), Intent::default());

        let mut report = TickReport {
            tick: world.tick(),
            flows: vec![PopulationFlow::default(); world.population_count()],
        };

        self.intent_phase(world, rng);
        self.arbitration_phase(world, rng, &mut report);
        self.consequence_phase(world, &mut report);

        world.advance_tick();
        trace!(tick = report.tick, counts = ?world.counts(), "Tick complete");
        report
    }

    fn intent_phase<R: UniformSource + ?Sized>(&mut self, world: &mut World, rng: &mut R) {
        let population_count = world.population_count();
        for y in 0..world.height() {
            for x in 0..world.width() {
                let site = world.site_index(x, y);
                let neighbors = world.neighbor_sites(x, y);
                for p in 0..population_count {
                    let index = world.slot_index(site, p);
                    if world.slot(index).is_none() {
                        continue;
                    }

                    let params = world.population(PopulationId(p as u16));
                    let gain = params.energy_gain as u32;
                    let threshold = params.energy_threshold_replicate as u32;
                    let space_needed = params.replication_space_needed;
                    let motile = params.motile;

                    let living_neighbors = neighbors
                        .iter()
                        .filter(|&&n| world.slot(world.slot_index(n, p)).is_some())
                        .count() as u32;

                    let Some(organism) = world.slot_mut(index) else {
                        continue;
                    };
                    organism.add_energy(gain);
                    let ready = organism.energy >= threshold
                        && living_neighbors + space_needed as u32 <= NEIGHBOR_COUNT as u32;

                    // The direction is drawn among all eight neighbors,
                    // occupied or not; arbitration sorts out who gets in.
                    let target = if motile || ready {
                        neighbors[rng.uniform(0, NEIGHBOR_COUNT as u32 - 1) as usize]
                    } else {
                        site
                    };

                    self.intents[index] = Intent {
                        existed: true,
                        ready,
                        newborn: false,
                        target,
                    };
                }
            }
        }
    }

    fn arbitration_phase<R: UniformSource + ?Sized>(
        &mut self,
        world: &mut World,
        rng: &mut R,
        report: &mut TickReport,
    ) {
        let population_count = world.population_count();
        let tick = world.tick();
        for y in 0..world.height() {
            for x in 0..world.width() {
                let site = world.site_index(x, y);
                let neighbors = world.neighbor_sites(x, y);
                for p in 0..population_count {
                    let index = world.slot_index(site, p);
                    if self.intents[index].existed {
                        continue;
                    }
                    debug_assert!(world.slot(index).is_none());

                    let Some(winner) = self.pick_winner(world, site, &neighbors, p, rng) else {
                        continue;
                    };

                    let params = world.population(PopulationId(p as u16));
                    let birth_energy = params.energy_at_birth.min(params.energy_maximum) as u32;
                    let cost_replicate = params.energy_cost_replicate as u32;
                    let cost_move = params.energy_cost_move as u32;

                    if self.intents[winner].ready {
                        world.occupy(index, Organism::new(birth_energy, tick));
                        self.intents[index].newborn = true;
                        if let Some(parent) = world.slot_mut(winner) {
                            // Pay now, die later: predation may still refill the parent.
                            parent.consume_energy(cost_replicate);
                        }
                        report.flows[p].births += 1;
                    } else {
                        world.relocate(winner, index);
                        if let Some(mover) = world.slot_mut(index) {
                            mover.consume_energy(cost_move);
                        }
                        report.flows[p].moves += 1;
                    }
                }
            }
        }
    }

    /// Reservoir-sample one organism among the distinct neighbors whose target
    /// is `site`. The k-th contender replaces the current pick with probability 1/k.
    fn pick_winner<R: UniformSource + ?Sized>(
        &self,
        world: &World,
        site: usize,
        neighbors: &[usize; 8],
        population: usize,
        rng: &mut R,
    ) -> Option<usize> {
        let mut winner = None;
        let mut contenders = 0u32;
        for (i, &neighbor) in neighbors.iter().enumerate() {
            // Narrow grids list the same cell more than once.
            if neighbor == site || neighbors[..i].contains(&neighbor) {
                continue;
            }
            let index = world.slot_index(neighbor, population);
            let intent = &self.intents[index];
            if !intent.existed || intent.target != site || world.slot(index).is_none() {
                continue;
            }
            contenders += 1;
            if rng.uniform(1, contenders) == contenders {
                winner = Some(index);
            }
        }
        winner
    }

    fn consequence_phase(&mut self, world: &mut World, report: &mut TickReport) {
        let population_count = world.population_count();
        let prey_of: Vec<Vec<usize>> = world
            .populations()
            .iter()
            .enumerate()
            .map(|(p, predator)| {
                world
                    .populations()
                    .iter()
                    .enumerate()
                    .filter(|&(q, prey)| q != p && predator.preys_on(prey))
                    .map(|(q, _)| q)
                    .collect()
            })
            .collect();

        for y in 0..world.height() {
            for x in 0..world.width() {
                let site = world.site_index(x, y);
                for p in 0..population_count {
                    let index = world.slot_index(site, p);
                    if world.slot(index).is_none() || self.intents[index].newborn {
                        continue;
                    }

                    let maximum = world.population(PopulationId(p as u16)).energy_maximum as u32;

                    let mut meal = 0u32;
                    let mut kills = 0u32;
                    for &q in &prey_of[p] {
                        let prey_index = world.slot_index(site, q);
                        if let Some(prey) = world.vacate(prey_index) {
                            meal = meal.saturating_add(prey.energy);
                            kills += 1;
                            report.flows[q].eaten += 1;
                        }
                    }

                    let Some(organism) = world.slot_mut(index) else {
                        continue;
                    };
                    organism.add_energy(meal);
                    for _ in 0..kills {
                        organism.record_kill();
                    }

                    if organism.is_starved() {
                        world.vacate(index);
                        report.flows[p].starved += 1;
                    } else {
                        organism.clamp_energy(maximum);
                    }
                }
            }
        }
    }
}

/// A world bundled with its random stream and tick engine.
#[derive(Debug)]
pub struct Simulation {
    world: World,
    engine: TickEngine,
    rng: SimRng,
}

impl Simulation {
    /// Build the world described by `config`, seeding from its `random_seed`
    /// (or OS entropy when absent).
    pub fn new(config: &SimulationConfig) -> Result<Self> {
        Self::with_rng(config, SimRng::from_optional_seed(config.random_seed))
    }

    pub fn with_rng(config: &SimulationConfig, mut rng: SimRng) -> Result<Self> {
        let world = World::from_config(config, &mut rng)?;
        debug!(
            seed = rng.seed(),
            width = world.width(),
            height = world.height(),
            counts = ?world.counts(),
            "World created"
        );
        Ok(Self {
            world,
            engine: TickEngine::new(),
            rng,
        })
    }

    /// Advance one tick
    #[instrument(level = "trace", skip(self), fields(tick = self.world.tick()))]
    pub fn step(&mut self) -> TickReport {
        self.engine.step(&mut self.world, &mut self.rng)
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn tick(&self) -> u64 {
        self.world.tick()
    }

    /// Seed of the random stream, for replaying the run
    pub fn seed(&self) -> u64 {
        self.rng.seed()
    }
}
