//! Terrain tile grid.
//!
//! The grid is regenerated from the map document on every load and is never
//! serialized. The only runtime mutation is dynamic wall placement.

use serde::{Deserialize, Serialize};

use crate::geometry::{Point, Rect};

/// Terrain category of a tile. Walkability follows from the category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Terrain {
    /// Outside every zone. Not walkable.
    #[default]
    Void,
    Floor,
    Stone,
    Wood,
    Carpet,
    Grass,
    Gravel,
    Sand,
    Water,
    /// Walkable tile under a passage footprint.
    Threshold,
    Wall,
}

impl Terrain {
    pub fn is_walkable(self) -> bool {
        !matches!(self, Terrain::Void | Terrain::Water | Terrain::Wall)
    }

    pub fn is_wall(self) -> bool {
        self == Terrain::Wall
    }
}

/// One grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tile {
    pub terrain: Terrain,
    pub walkable: bool,
}

impl Tile {
    pub fn new(terrain: Terrain) -> Self {
        Self {
            terrain,
            walkable: terrain.is_walkable(),
        }
    }
}

/// Row-major 2D terrain array anchored at (0, 0).
#[derive(Debug, Clone)]
pub struct TileGrid {
    width: u32,
    height: u32,
    tiles: Vec<Tile>,
}

impl TileGrid {
    /// A grid filled with [`Terrain::Void`].
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            tiles: vec![Tile::new(Terrain::Void); width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width as i32 - 1, self.height as i32 - 1)
    }

    pub fn in_bounds(&self, p: &Point) -> bool {
        p.x >= 0 && p.y >= 0 && (p.x as u32) < self.width && (p.y as u32) < self.height
    }

    fn index(&self, p: &Point) -> Option<usize> {
        self.in_bounds(p)
            .then(|| p.y as usize * self.width as usize + p.x as usize)
    }

    pub fn get(&self, p: &Point) -> Option<&Tile> {
        self.index(p).map(|i| &self.tiles[i])
    }

    /// Terrain at `p`; out-of-bounds reads as [`Terrain::Void`].
    pub fn terrain(&self, p: &Point) -> Terrain {
        self.get(p).map(|t| t.terrain).unwrap_or_default()
    }

    pub fn is_walkable(&self, p: &Point) -> bool {
        self.get(p).is_some_and(|t| t.walkable)
    }

    pub fn is_wall(&self, p: &Point) -> bool {
        self.terrain(p).is_wall()
    }

    pub fn set(&mut self, p: &Point, terrain: Terrain) -> bool {
        match self.index(p) {
            Some(i) => {
                self.tiles[i] = Tile::new(terrain);
                true
            }
            None => false,
        }
    }

    /// Paint every in-bounds tile of `area`. Returns the number painted.
    pub fn fill(&mut self, area: &Rect, terrain: Terrain) -> usize {
        let mut painted = 0;
        for p in area.points() {
            if self.set(&p, terrain) {
                painted += 1;
            }
        }
        painted
    }

    /// Whether any wall tile lies inside `area`.
    pub fn any_wall_in(&self, area: &Rect) -> bool {
        area.points().any(|p| self.is_wall(&p))
    }
}
