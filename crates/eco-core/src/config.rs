//! Configuration types for the simulation.
//!
//! A configuration document is JSON. Loading is validate-all: every missing or
//! malformed field is collected into one [`Error::InvalidConfig`] instead of
//! stopping at the first problem, and no config value is produced unless the
//! whole document is valid.

use crate::error::{ConfigIssue, Error, Result};
use crate::types::Color;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, warn};

/// Largest accepted grid side
pub const MAX_DIMENSION: u16 = 10_000;

/// Number of cells surrounding a cell
pub const NEIGHBOR_COUNT: u8 = 8;

/// Immutable parameters of one population
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopulationParams {
    /// Display name
    pub name: String,
    /// Display color
    pub color: Color,
    /// Whether organisms move when not replicating
    pub motile: bool,
    /// Predates only populations exactly one level below
    pub trophic_level: u8,
    /// Organisms placed when the world is created
    pub initial_population_size: u32,
    /// Energy of a newborn organism
    pub energy_at_birth: u16,
    /// Energy cap applied at the end of every tick
    pub energy_maximum: u16,
    /// Minimum energy to attempt replication
    pub energy_threshold_replicate: u16,
    /// Energy paid by the parent per offspring
    pub energy_cost_replicate: u16,
    /// Energy gained passively every tick
    pub energy_gain: u16,
    /// Energy paid per move
    pub energy_cost_move: u16,
    /// Free neighboring cells required to replicate (0..=8)
    pub replication_space_needed: u8,
}

impl PopulationParams {
    /// The rabbit population of the classic foxes-and-rabbits setup.
    pub fn rabbit(initial_population_size: u32) -> Self {
        Self {
            name: "rabbit".to_string(),
            color: Color::WHITE,
            motile: true,
            trophic_level: 1,
            initial_population_size,
            energy_at_birth: 5,
            energy_maximum: 15,
            energy_threshold_replicate: 15,
            energy_cost_replicate: 10,
            energy_gain: 2,
            energy_cost_move: 1,
            replication_space_needed: 5,
        }
    }

    /// The fox population of the classic foxes-and-rabbits setup.
    pub fn fox(initial_population_size: u32) -> Self {
        Self {
            name: "fox".to_string(),
            color: Color::RED,
            motile: true,
            trophic_level: 2,
            initial_population_size,
            energy_at_birth: 20,
            energy_maximum: 100,
            energy_threshold_replicate: 80,
            energy_cost_replicate: 40,
            energy_gain: 0,
            energy_cost_move: 1,
            replication_space_needed: 8,
        }
    }

    /// Range checks for parameters built in code rather than loaded from a
    /// document. `path` prefixes the field names of the reported issues.
    pub fn issues(&self, path: &str) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        if self.replication_space_needed > NEIGHBOR_COUNT {
            issues.push(ConfigIssue::new(
                format!("{}.replication_space_needed", path),
                format!(
                    "{} exceeds the maximum of {}",
                    self.replication_space_needed, NEIGHBOR_COUNT
                ),
            ));
        }
        if self.energy_at_birth > self.energy_maximum {
            issues.push(ConfigIssue::new(
                format!("{}.energy_at_birth", path),
                format!(
                    "{} exceeds energy_maximum {}",
                    self.energy_at_birth, self.energy_maximum
                ),
            ));
        }
        issues
    }

    /// Whether this population eats `prey`.
    pub fn preys_on(&self, prey: &PopulationParams) -> bool {
        self.trophic_level > 0 && prey.trophic_level == self.trophic_level - 1
    }
}

/// Validated simulation configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationConfig {
    /// Width of the world grid
    pub width: u16,
    /// Height of the world grid
    pub height: u16,
    /// Ignore `num_steps` and run until stopped
    pub run_forever: bool,
    /// Ticks to run when not running forever
    pub num_steps: u32,
    /// Whether frames are rendered
    pub visual: bool,
    /// Seed for the RNG; `None` seeds from OS entropy
    pub random_seed: Option<u64>,
    pub populations: Vec<PopulationParams>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self::foxes_and_rabbits(200, 200)
    }
}

impl SimulationConfig {
    /// Two-population predator/prey setup on a `width` x `height` torus.
    pub fn foxes_and_rabbits(width: u16, height: u16) -> Self {
        let cells = width as u32 * height as u32;
        Self {
            width,
            height,
            run_forever: false,
            num_steps: 1000,
            visual: false,
            random_seed: None,
            populations: vec![
                PopulationParams::rabbit(cells / 10),
                PopulationParams::fox(cells / 100),
            ],
        }
    }

    /// Number of cells in the grid
    pub fn capacity(&self) -> u32 {
        self.width as u32 * self.height as u32
    }

    /// Read, parse and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&text)?;
        debug!(path = %path.display(), populations = config.populations.len(), "Loaded configuration");
        Ok(config)
    }

    /// Parse and validate a configuration document.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(&value)
    }

    /// Validate an already parsed document, reporting every problem found.
    pub fn from_value(value: &Value) -> Result<Self> {
        let mut issues = Vec::new();
        let config = read_config(value, &mut issues);
        match config {
            Some(config) if issues.is_empty() => Ok(config),
            _ => Err(Error::InvalidConfig(issues)),
        }
    }

    /// Serialize to the document format accepted by [`SimulationConfig::from_json_str`].
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

const CONFIG_FIELDS: &[&str] = &[
    "width",
    "height",
    "run_forever",
    "num_steps",
    "visual",
    "random_seed",
    "populations",
];

const POPULATION_FIELDS: &[&str] = &[
    "name",
    "color",
    "motile",
    "trophic_level",
    "initial_population_size",
    "initial_population_fraction",
    "energy_at_birth",
    "energy_maximum",
    "energy_threshold_replicate",
    "energy_cost_replicate",
    "energy_gain",
    "energy_cost_move",
    "replication_space_needed",
];

/// Typed access to the fields of one JSON object, recording problems instead
/// of returning early.
struct Fields<'v> {
    object: &'v Map<String, Value>,
    path: String,
}

impl<'v> Fields<'v> {
    fn new(value: &'v Value, path: &str, issues: &mut Vec<ConfigIssue>) -> Option<Self> {
        match value.as_object() {
            Some(object) => Some(Self {
                object,
                path: path.to_string(),
            }),
            None => {
                let field = if path.is_empty() { "<root>" } else { path };
                issues.push(ConfigIssue::new(field, "expected an object"));
                None
            }
        }
    }

    fn field_path(&self, name: &str) -> String {
        if self.path.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.path, name)
        }
    }

    fn warn_unknown(&self, known: &[&str]) {
        for key in self.object.keys() {
            if !known.contains(&key.as_str()) {
                warn!(field = %self.field_path(key), "Ignoring unknown configuration field");
            }
        }
    }

    fn get(&self, name: &str, issues: &mut Vec<ConfigIssue>) -> Option<&'v Value> {
        let value = self.object.get(name);
        if value.is_none() {
            issues.push(ConfigIssue::new(self.field_path(name), "missing field"));
        }
        value
    }

    fn bool(&self, name: &str, issues: &mut Vec<ConfigIssue>) -> Option<bool> {
        let value = self.get(name, issues)?;
        let parsed = value.as_bool();
        if parsed.is_none() {
            issues.push(ConfigIssue::new(self.field_path(name), "expected a boolean"));
        }
        parsed
    }

    fn uint(&self, name: &str, max: u64, issues: &mut Vec<ConfigIssue>) -> Option<u64> {
        let value = self.get(name, issues)?;
        self.uint_value(name, value, max, issues)
    }

    fn uint_value(
        &self,
        name: &str,
        value: &Value,
        max: u64,
        issues: &mut Vec<ConfigIssue>,
    ) -> Option<u64> {
        match value.as_u64() {
            Some(n) if n <= max => Some(n),
            Some(n) => {
                issues.push(ConfigIssue::new(
                    self.field_path(name),
                    format!("{} exceeds the maximum of {}", n, max),
                ));
                None
            }
            None => {
                issues.push(ConfigIssue::new(
                    self.field_path(name),
                    "expected a non-negative integer",
                ));
                None
            }
        }
    }

    fn string(&self, name: &str, issues: &mut Vec<ConfigIssue>) -> Option<&'v str> {
        let value = self.get(name, issues)?;
        let parsed = value.as_str();
        if parsed.is_none() {
            issues.push(ConfigIssue::new(self.field_path(name), "expected a string"));
        }
        parsed
    }
}

fn read_config(value: &Value, issues: &mut Vec<ConfigIssue>) -> Option<SimulationConfig> {
    let fields = Fields::new(value, "", issues)?;
    fields.warn_unknown(CONFIG_FIELDS);

    let width = read_dimension(&fields, "width", issues);
    let height = read_dimension(&fields, "height", issues);
    let run_forever = fields.bool("run_forever", issues);
    let num_steps = fields.uint("num_steps", u32::MAX as u64, issues);
    let visual = fields.bool("visual", issues);
    let random_seed = fields.get("random_seed", issues).and_then(|seed| {
        if seed.is_null() {
            Some(None)
        } else {
            fields
                .uint_value("random_seed", seed, u64::MAX, issues)
                .map(Some)
        }
    });

    let capacity = match (width, height) {
        (Some(w), Some(h)) => Some(w as u32 * h as u32),
        _ => None,
    };
    let populations = read_populations(&fields, capacity, issues);

    Some(SimulationConfig {
        width: width?,
        height: height?,
        run_forever: run_forever?,
        num_steps: num_steps? as u32,
        visual: visual?,
        random_seed: random_seed?,
        populations: populations?,
    })
}

fn read_dimension(fields: &Fields<'_>, name: &str, issues: &mut Vec<ConfigIssue>) -> Option<u16> {
    let n = fields.uint(name, MAX_DIMENSION as u64, issues)?;
    if n == 0 {
        issues.push(ConfigIssue::new(fields.field_path(name), "must be positive"));
        return None;
    }
    Some(n as u16)
}

fn read_populations(
    fields: &Fields<'_>,
    capacity: Option<u32>,
    issues: &mut Vec<ConfigIssue>,
) -> Option<Vec<PopulationParams>> {
    let list = fields.get("populations", issues)?;
    let Some(entries) = list.as_array() else {
        issues.push(ConfigIssue::new("populations", "expected an array"));
        return None;
    };
    if entries.is_empty() {
        issues.push(ConfigIssue::new("populations", "at least one population is required"));
        return None;
    }
    if entries.len() > u16::MAX as usize {
        issues.push(ConfigIssue::new(
            "populations",
            format!("at most {} populations are supported", u16::MAX),
        ));
        return None;
    }

    // Read every entry before bailing so each one reports its own issues.
    let parsed: Vec<Option<PopulationParams>> = entries
        .iter()
        .enumerate()
        .map(|(i, entry)| read_population(entry, &format!("populations[{}]", i), capacity, issues))
        .collect();

    let mut seen = HashSet::new();
    for (i, population) in parsed.iter().enumerate() {
        if let Some(population) = population {
            if !seen.insert(population.name.as_str()) {
                issues.push(ConfigIssue::new(
                    format!("populations[{}].name", i),
                    format!("duplicate population name '{}'", population.name),
                ));
            }
        }
    }

    parsed.into_iter().collect()
}

fn read_population(
    value: &Value,
    path: &str,
    capacity: Option<u32>,
    issues: &mut Vec<ConfigIssue>,
) -> Option<PopulationParams> {
    let fields = Fields::new(value, path, issues)?;
    fields.warn_unknown(POPULATION_FIELDS);

    let name = fields.string("name", issues).and_then(|name| {
        if name.trim().is_empty() {
            issues.push(ConfigIssue::new(fields.field_path("name"), "must not be empty"));
            None
        } else {
            Some(name.to_string())
        }
    });
    let color = fields.string("color", issues).and_then(|text| match text.parse::<Color>() {
        Ok(color) => Some(color),
        Err(message) => {
            issues.push(ConfigIssue::new(fields.field_path("color"), message));
            None
        }
    });
    let motile = fields.bool("motile", issues);
    let trophic_level = fields.uint("trophic_level", u8::MAX as u64, issues);
    let initial_population_size = read_population_size(&fields, capacity, issues);

    let energy = |name: &str, issues: &mut Vec<ConfigIssue>| {
        fields.uint(name, u16::MAX as u64, issues).map(|n| n as u16)
    };
    let energy_at_birth = energy("energy_at_birth", issues);
    let energy_maximum = energy("energy_maximum", issues);
    let energy_threshold_replicate = energy("energy_threshold_replicate", issues);
    let energy_cost_replicate = energy("energy_cost_replicate", issues);
    let energy_gain = energy("energy_gain", issues);
    let energy_cost_move = energy("energy_cost_move", issues);
    let replication_space_needed =
        fields.uint("replication_space_needed", NEIGHBOR_COUNT as u64, issues);

    if let (Some(birth), Some(maximum)) = (energy_at_birth, energy_maximum) {
        if birth > maximum {
            issues.push(ConfigIssue::new(
                fields.field_path("energy_at_birth"),
                format!("{} exceeds energy_maximum {}", birth, maximum),
            ));
        }
    }

    Some(PopulationParams {
        name: name?,
        color: color?,
        motile: motile?,
        trophic_level: trophic_level? as u8,
        initial_population_size: initial_population_size?,
        energy_at_birth: energy_at_birth?,
        energy_maximum: energy_maximum?,
        energy_threshold_replicate: energy_threshold_replicate?,
        energy_cost_replicate: energy_cost_replicate?,
        energy_gain: energy_gain?,
        energy_cost_move: energy_cost_move?,
        replication_space_needed: replication_space_needed? as u8,
    })
}

/// Either `initial_population_size` (a count) or `initial_population_fraction`
/// (share of the grid's cells, rounded down), never both.
fn read_population_size(
    fields: &Fields<'_>,
    capacity: Option<u32>,
    issues: &mut Vec<ConfigIssue>,
) -> Option<u32> {
    let count = fields.object.get("initial_population_size");
    let fraction = fields.object.get("initial_population_fraction");

    let size = match (count, fraction) {
        (Some(_), Some(_)) => {
            issues.push(ConfigIssue::new(
                fields.field_path("initial_population_size"),
                "give either initial_population_size or initial_population_fraction, not both",
            ));
            return None;
        }
        (None, None) => {
            issues.push(ConfigIssue::new(
                fields.field_path("initial_population_size"),
                "missing field (or initial_population_fraction)",
            ));
            return None;
        }
        (Some(count), None) => fields
            .uint_value("initial_population_size", count, u32::MAX as u64, issues)?
            as u32,
        (None, Some(fraction)) => {
            let name = "initial_population_fraction";
            let share = match fraction.as_f64() {
                Some(share) if (0.0..=1.0).contains(&share) => share,
                _ => {
                    issues.push(ConfigIssue::new(
                        fields.field_path(name),
                        "expected a number between 0 and 1",
                    ));
                    return None;
                }
            };
            // Without valid dimensions the width/height issues already explain the failure.
            (share * capacity? as f64).floor() as u32
        }
    };

    if let Some(capacity) = capacity {
        if size > capacity {
            issues.push(ConfigIssue::new(
                fields.field_path("initial_population_size"),
                format!("{} organisms do not fit in a grid of {} cells", size, capacity),
            ));
            return None;
        }
    }
    Some(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rabbit_json() -> Value {
        json!({
            "name": "rabbit",
            "color": "FF'FF'FF",
            "motile": true,
            "trophic_level": 1,
            "initial_population_size": 10,
            "energy_at_birth": 5,
            "energy_maximum": 15,
            "energy_threshold_replicate": 15,
            "energy_cost_replicate": 10,
            "energy_gain": 2,
            "energy_cost_move": 1,
            "replication_space_needed": 5
        })
    }

    fn config_json() -> Value {
        json!({
            "width": 20,
            "height": 10,
            "run_forever": false,
            "num_steps": 100,
            "visual": false,
            "random_seed": 42,
            "populations": [rabbit_json()]
        })
    }

    fn issues_of(value: &Value) -> Vec<ConfigIssue> {
        match SimulationConfig::from_value(value) {
            Err(Error::InvalidConfig(issues)) => issues,
            other => panic!("expected invalid config, got {:?}", other),
        }
    }

    #[test]
    fn test_default_configs() {
        let config = SimulationConfig::default();
        assert_eq!(config.width, 200);
        assert_eq!(config.populations.len(), 2);
        assert!(config.populations[1].preys_on(&config.populations[0]));
        assert!(!config.populations[0].preys_on(&config.populations[1]));
    }

    #[test]
    fn test_valid_document() {
        let config = SimulationConfig::from_value(&config_json()).unwrap();
        assert_eq!(config.width, 20);
        assert_eq!(config.height, 10);
        assert_eq!(config.random_seed, Some(42));
        assert_eq!(config.capacity(), 200);
        assert_eq!(config.populations[0], PopulationParams::rabbit(10));
    }

    #[test]
    fn test_null_seed() {
        let mut doc = config_json();
        doc["random_seed"] = Value::Null;
        let config = SimulationConfig::from_value(&doc).unwrap();
        assert_eq!(config.random_seed, None);
    }

    #[test]
    fn test_population_fraction() {
        let mut doc = config_json();
        let pop = doc["populations"][0].as_object_mut().unwrap();
        pop.remove("initial_population_size");
        pop.insert("initial_population_fraction".into(), json!(0.25));
        let config = SimulationConfig::from_value(&doc).unwrap();
        assert_eq!(config.populations[0].initial_population_size, 50);
    }

    #[test]
    fn test_reports_every_issue() {
        let mut doc = config_json();
        doc.as_object_mut().unwrap().remove("width");
        doc["visual"] = json!("yes");
        doc["populations"][0]["color"] = json!("purple");
        doc["populations"][0]["replication_space_needed"] = json!(9);

        let issues = issues_of(&doc);
        let fields: Vec<&str> = issues.iter().map(|i| i.field.as_str()).collect();
        assert!(fields.contains(&"width"));
        assert!(fields.contains(&"visual"));
        assert!(fields.contains(&"populations[0].color"));
        assert!(fields.contains(&"populations[0].replication_space_needed"));
    }

    #[test]
    fn test_issues_in_several_populations() {
        let mut doc = config_json();
        let mut second = rabbit_json();
        second["energy_gain"] = json!(70000);
        doc["populations"][0]["motile"] = json!(1);
        doc["populations"].as_array_mut().unwrap().push(second);

        let issues = issues_of(&doc);
        let fields: Vec<&str> = issues.iter().map(|i| i.field.as_str()).collect();
        assert!(fields.contains(&"populations[0].motile"));
        assert!(fields.contains(&"populations[1].energy_gain"));
    }

    #[test]
    fn test_population_exceeding_capacity() {
        let mut doc = config_json();
        doc["populations"][0]["initial_population_size"] = json!(201);
        let issues = issues_of(&doc);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field, "populations[0].initial_population_size");
    }

    #[test]
    fn test_size_and_fraction_conflict() {
        let mut doc = config_json();
        doc["populations"][0]["initial_population_fraction"] = json!(0.1);
        assert_eq!(issues_of(&doc).len(), 1);
    }

    #[test]
    fn test_duplicate_names() {
        let mut doc = config_json();
        doc["populations"].as_array_mut().unwrap().push(rabbit_json());
        let issues = issues_of(&doc);
        assert_eq!(issues[0].field, "populations[1].name");
    }

    #[test]
    fn test_birth_energy_above_maximum() {
        let mut doc = config_json();
        doc["populations"][0]["energy_at_birth"] = json!(16);
        let issues = issues_of(&doc);
        assert_eq!(issues[0].field, "populations[0].energy_at_birth");
    }

    #[test]
    fn test_zero_dimension_and_empty_populations() {
        let mut doc = config_json();
        doc["height"] = json!(0);
        doc["populations"] = json!([]);
        let fields: Vec<String> = issues_of(&doc).into_iter().map(|i| i.field).collect();
        assert_eq!(fields, vec!["height".to_string(), "populations".to_string()]);
    }

    #[test]
    fn test_malformed_json() {
        let err = SimulationConfig::from_json_str("{ \"width\": ").unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_root_must_be_object() {
        let issues = issues_of(&json!([1, 2, 3]));
        assert_eq!(issues[0].field, "<root>");
    }

    #[test]
    fn test_round_trip_through_json() {
        let mut config = SimulationConfig::foxes_and_rabbits(30, 40);
        config.random_seed = Some(9);
        let text = config.to_json_string().unwrap();
        let parsed = SimulationConfig::from_json_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, config_json().to_string()).unwrap();
        let config = SimulationConfig::load(&path).unwrap();
        assert_eq!(config.num_steps, 100);

        let missing = SimulationConfig::load(dir.path().join("absent.json"));
        assert!(matches!(missing, Err(Error::Io(_))));
    }

    #[test]
    fn test_bundled_config_matches_classic_setup() {
        let text = include_str!("../../../config/foxes_and_rabbits.json");
        // The plotting script adds its own '#' when it reads colors back.
        let raw: Value = serde_json::from_str(text).unwrap();
        for population in raw["populations"].as_array().unwrap() {
            assert!(!population["color"].as_str().unwrap().starts_with('#'));
        }
        let mut config = SimulationConfig::from_json_str(text).unwrap();
        assert_eq!(config.random_seed, None);
        config.random_seed = Some(0);
        let mut classic = SimulationConfig::foxes_and_rabbits(200, 200);
        classic.random_seed = Some(0);
        assert_eq!(config, classic);
    }
}
