//! Core type definitions for the simulation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Index of a population within the simulation's population list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PopulationId(pub u16);

impl PopulationId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PopulationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 2D position on the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn add(&self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    /// Apply toroidal wrapping for given world dimensions
    pub fn wrap(&self, width: i32, height: i32) -> Self {
        Self {
            x: self.x.rem_euclid(width),
            y: self.y.rem_euclid(height),
        }
    }

    pub fn step(&self, direction: Direction) -> Self {
        let (dx, dy) = direction.to_delta();
        self.add(dx, dy)
    }
}

/// One of the eight moves to a neighboring cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    NorthWest,
    North,
    NorthEast,
    West,
    East,
    SouthWest,
    South,
    SouthEast,
}

impl Direction {
    pub fn to_delta(&self) -> (i32, i32) {
        match self {
            Direction::NorthWest => (-1, -1),
            Direction::North => (0, -1),
            Direction::NorthEast => (1, -1),
            Direction::West => (-1, 0),
            Direction::East => (1, 0),
            Direction::SouthWest => (-1, 1),
            Direction::South => (0, 1),
            Direction::SouthEast => (1, 1),
        }
    }

    /// All directions in row-major order (top row first, left to right).
    ///
    /// Every neighbor scan in the engine uses this order, which keeps the
    /// sequence of random draws reproducible.
    pub fn all() -> [Direction; 8] {
        [
            Direction::NorthWest,
            Direction::North,
            Direction::NorthEast,
            Direction::West,
            Direction::East,
            Direction::SouthWest,
            Direction::South,
            Direction::SouthEast,
        ]
    }
}

/// A 24-bit RGB color, stored as `0xRRGGBB`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Color(pub u32);

impl Color {
    pub const BLACK: Color = Color(0x00_00_00);
    pub const WHITE: Color = Color(0xFF_FF_FF);
    pub const RED: Color = Color(0xFF_00_00);

    pub fn rgb(self) -> [u8; 3] {
        [(self.0 >> 16) as u8, (self.0 >> 8) as u8, self.0 as u8]
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06X}", self.0)
    }
}

/// Parses `RRGGBB`, with an optional leading `#`. Apostrophes are accepted
/// as digit separators (`FF'33'00`).
impl FromStr for Color {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let digits: String = s
            .trim()
            .trim_start_matches('#')
            .chars()
            .filter(|c| *c != '\'')
            .collect();
        if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!("'{}' is not a hex RGB color (expected RRGGBB)", s));
        }
        u32::from_str_radix(&digits, 16)
            .map(Color)
            .map_err(|e| e.to_string())
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}
