//! Toroidal grid of organism slots.
//!
//! The world is an arena of `width * height * population_count` slots. Slot
//! `(x, y, population)` lives at `population_count * (y * width + x) + population`,
//! so all populations sharing a cell are adjacent in memory. Callers address
//! slots through [`Cell`] values produced by [`World::locate`]; raw offsets stay
//! inside the crate.

use crate::organism::Organism;
use eco_core::{
    combination, ConfigIssue, Direction, Error, PopulationId, PopulationParams, Position, Result,
    SimulationConfig, UniformSource,
};
use tracing::debug;

/// Address of one slot: a grid cell and a population
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cell {
    pub x: u16,
    pub y: u16,
    pub population: PopulationId,
}

/// The grid store and per-population tallies
#[derive(Debug, Clone)]
pub struct World {
    width: u16,
    height: u16,
    populations: Vec<PopulationParams>,
    tally: Vec<u32>,
    slots: Vec<Option<Organism>>,
    tick: u64,
}

impl World {
    /// An empty world with no organisms placed.
    ///
    /// # Panics
    ///
    /// Panics if a dimension is zero or there are more than `u16::MAX` populations.
    /// Population parameters are not range-checked here; [`World::create`] does that.
    pub fn empty(width: u16, height: u16, populations: Vec<PopulationParams>) -> Self {
        assert!(width > 0 && height > 0, "grid dimensions must be positive");
        assert!(
            populations.len() <= u16::MAX as usize,
            "too many populations"
        );
        let size = width as usize * height as usize * populations.len();
        Self {
            width,
            height,
            tally: vec![0; populations.len()],
            populations,
            slots: vec![None; size],
            tick: 0,
        }
    }

    /// Create a world and place each population's initial organisms on
    /// distinct cells chosen uniformly at random.
    ///
    /// Populations are seeded in order from the same random stream. Fails with
    /// [`Error::InvalidConfig`] if a population's parameters are out of range.
    pub fn create<R: UniformSource + ?Sized>(
        width: u16,
        height: u16,
        populations: Vec<PopulationParams>,
        rng: &mut R,
    ) -> Result<Self> {
        let issues: Vec<ConfigIssue> = populations
            .iter()
            .enumerate()
            .flat_map(|(i, params)| params.issues(&format!("populations[{}]", i)))
            .collect();
        if !issues.is_empty() {
            return Err(Error::InvalidConfig(issues));
        }

        let mut world = Self::empty(width, height, populations);
        for index in 0..world.populations.len() {
            world.seed_population(PopulationId(index as u16), rng)?;
        }
        Ok(world)
    }

    /// Create a world from a validated configuration.
    pub fn from_config<R: UniformSource + ?Sized>(
        config: &SimulationConfig,
        rng: &mut R,
    ) -> Result<Self> {
        Self::create(config.width, config.height, config.populations.clone(), rng)
    }

    fn seed_population<R: UniformSource + ?Sized>(
        &mut self,
        population: PopulationId,
        rng: &mut R,
    ) -> Result<()> {
        let params = &self.populations[population.index()];
        let requested = params.initial_population_size;
        let available = self.cell_count();
        if requested > available {
            return Err(Error::Capacity {
                population: params.name.clone(),
                requested,
                available,
            });
        }
        let organism = Organism::new(
            params.energy_at_birth.min(params.energy_maximum) as u32,
            self.tick,
        );

        let occupancy = combination(available, requested, rng);
        for (site, _) in occupancy.iter().enumerate().filter(|(_, chosen)| **chosen) {
            let index = self.slot_index(site, population.index());
            if self.slots[index].is_none() {
                self.occupy(index, organism);
            }
        }

        let achieved = self.tally[population.index()];
        if achieved != requested {
            return Err(Error::InvalidState(format!(
                "population {} created with {}/{} organisms",
                self.populations[population.index()].name,
                achieved,
                requested
            )));
        }
        debug!(
            population = %self.populations[population.index()].name,
            organisms = achieved,
            "Seeded population"
        );
        Ok(())
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn cell_count(&self) -> u32 {
        self.width as u32 * self.height as u32
    }

    pub fn population_count(&self) -> usize {
        self.populations.len()
    }

    pub fn populations(&self) -> &[PopulationParams] {
        &self.populations
    }

    pub fn population(&self, id: PopulationId) -> &PopulationParams {
        &self.populations[id.index()]
    }

    /// Ticks completed so far
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Address of `(x, y, population)`, wrapping coordinates around the torus.
    ///
    /// # Panics
    ///
    /// Panics if `population` is not a population of this world.
    pub fn locate(&self, x: i32, y: i32, population: PopulationId) -> Cell {
        assert!(
            population.index() < self.populations.len(),
            "unknown population {}",
            population
        );
        let pos = Position::new(x, y).wrap(self.width as i32, self.height as i32);
        Cell {
            x: pos.x as u16,
            y: pos.y as u16,
            population,
        }
    }

    pub fn get(&self, cell: Cell) -> Option<&Organism> {
        self.slots[self.cell_index(cell)].as_ref()
    }

    /// Mutable access to the organism at a located slot.
    pub fn get_mut(&mut self, cell: Cell) -> Option<&mut Organism> {
        let index = self.cell_index(cell);
        self.slots[index].as_mut()
    }

    pub fn is_occupied(&self, cell: Cell) -> bool {
        self.get(cell).is_some()
    }

    /// Put `organism` into an empty slot.
    pub fn place(&mut self, cell: Cell, organism: Organism) -> Result<()> {
        let index = self.cell_index(cell);
        if self.slots[index].is_some() {
            return Err(Error::InvalidState(format!(
                "cell ({}, {}) already holds an organism of population {}",
                cell.x, cell.y, cell.population
            )));
        }
        self.occupy(index, organism);
        Ok(())
    }

    /// Take the organism out of a slot, if any.
    pub fn remove(&mut self, cell: Cell) -> Option<Organism> {
        let index = self.cell_index(cell);
        self.vacate(index)
    }

    /// Live organism count per population.
    pub fn counts(&self) -> Vec<u32> {
        self.tally.clone()
    }

    /// Count organisms by scanning every slot. Only for verification; the
    /// engine keeps [`World::counts`] current incrementally.
    pub fn recount(&self) -> Vec<u32> {
        let mut counts = vec![0; self.populations.len()];
        for (index, slot) in self.slots.iter().enumerate() {
            if slot.is_some() {
                counts[index % self.populations.len()] += 1;
            }
        }
        counts
    }

    /// All living organisms in row-major order.
    pub fn organisms(&self) -> impl Iterator<Item = (Cell, &Organism)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(move |(index, slot)| slot.as_ref().map(|org| (self.index_to_cell(index), org)))
    }

    /// The eight neighbors of a cell, in [`Direction::all`] order, with wraparound.
    /// On grids narrower than three cells the same position can appear more than once.
    pub fn neighbors(&self, cell: Cell) -> [Cell; 8] {
        let sites = self.neighbor_sites(cell.x, cell.y);
        sites.map(|site| self.site_cell(site, cell.population))
    }

    /// Highest-index population with an organism at `(x, y)`.
    pub fn top_population_at(&self, x: u16, y: u16) -> Option<PopulationId> {
        let base = self.slot_index(self.site_index(x, y), 0);
        self.slots[base..base + self.populations.len()]
            .iter()
            .rposition(|slot| slot.is_some())
            .map(|p| PopulationId(p as u16))
    }

    // Flat-index plumbing for the tick engine.

    pub(crate) fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn site_index(&self, x: u16, y: u16) -> usize {
        y as usize * self.width as usize + x as usize
    }

    pub(crate) fn slot_index(&self, site: usize, population: usize) -> usize {
        site * self.populations.len() + population
    }

    pub(crate) fn neighbor_sites(&self, x: u16, y: u16) -> [usize; 8] {
        let origin = Position::new(x as i32, y as i32);
        Direction::all().map(|direction| {
            let pos = origin
                .step(direction)
                .wrap(self.width as i32, self.height as i32);
            self.site_index(pos.x as u16, pos.y as u16)
        })
    }

    pub(crate) fn slot(&self, index: usize) -> Option<&Organism> {
        self.slots[index].as_ref()
    }

    pub(crate) fn slot_mut(&mut self, index: usize) -> Option<&mut Organism> {
        self.slots[index].as_mut()
    }

    pub(crate) fn occupy(&mut self, index: usize, organism: Organism) {
        debug_assert!(self.slots[index].is_none(), "slot {} already occupied", index);
        self.slots[index] = Some(organism);
        self.tally[index % self.populations.len()] += 1;
    }

    pub(crate) fn vacate(&mut self, index: usize) -> Option<Organism> {
        let organism = self.slots[index].take();
        if organism.is_some() {
            self.tally[index % self.populations.len()] -= 1;
        }
        organism
    }

    /// Move an organism between two slots of the same population; tallies are unchanged.
    pub(crate) fn relocate(&mut self, from: usize, to: usize) {
        debug_assert!(self.slots[to].is_none(), "slot {} already occupied", to);
        self.slots[to] = self.slots[from].take();
    }

    pub(crate) fn advance_tick(&mut self) {
        self.tick += 1;
    }

    fn cell_index(&self, cell: Cell) -> usize {
        self.slot_index(self.site_index(cell.x, cell.y), cell.population.index())
    }

    fn site_cell(&self, site: usize, population: PopulationId) -> Cell {
        Cell {
            x: (site % self.width as usize) as u16,
            y: (site / self.width as usize) as u16,
            population,
        }
    }

    fn index_to_cell(&self, index: usize) -> Cell {
        let count = self.populations.len();
        self.site_cell(index / count, PopulationId((index % count) as u16))
    }
}
