//! Tile-space geometry shared by every subsystem.
//!
//! All coordinates are whole tiles. A [`Rect`] is inclusive on both ends, so
//! `Rect::point(p)` covers exactly one tile and has width and height 1.

use serde::{Deserialize, Serialize};

/// A tile coordinate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const ORIGIN: Self = Self { x: 0, y: 0 };

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn manhattan(&self, other: &Self) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    pub fn chebyshev(&self, other: &Self) -> u32 {
        self.x.abs_diff(other.x).max(self.y.abs_diff(other.y))
    }

    /// Straight-line (cartesian) distance in tiles.
    pub fn distance(&self, other: &Self) -> f32 {
        let dx = (self.x - other.x) as f32;
        let dy = (self.y - other.y) as f32;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn offset(&self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    pub fn step(&self, direction: Direction) -> Self {
        let (dx, dy) = direction.delta();
        self.offset(dx, dy)
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Compass direction. North is +y.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    North,
    East,
    South,
    West,
    NorthEast,
    SouthEast,
    SouthWest,
    NorthWest,
}

impl Direction {
    /// Expansion order for 4-connected search. Never reorder: path tie-breaking
    /// depends on it.
    pub const CARDINAL: [Direction; 4] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
    ];

    /// Expansion order for 8-connected search (cardinals first).
    pub const ALL: [Direction; 8] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
        Direction::NorthEast,
        Direction::SouthEast,
        Direction::SouthWest,
        Direction::NorthWest,
    ];

    pub const fn delta(self) -> (i32, i32) {
        match self {
            Direction::North => (0, 1),
            Direction::East => (1, 0),
            Direction::South => (0, -1),
            Direction::West => (-1, 0),
            Direction::NorthEast => (1, 1),
            Direction::SouthEast => (1, -1),
            Direction::SouthWest => (-1, -1),
            Direction::NorthWest => (-1, 1),
        }
    }

    /// The direction that best matches a step from `from` to `to`, if they differ.
    pub fn between(from: &Point, to: &Point) -> Option<Direction> {
        let dx = (to.x - from.x).signum();
        let dy = (to.y - from.y).signum();
        Direction::ALL.into_iter().find(|d| d.delta() == (dx, dy))
    }
}

/// Axis-aligned, inclusive tile rectangle. Used as footprint, zone area and
/// query region alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Rect {
    /// Build a rectangle from two corners in any order.
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
        }
    }

    pub fn point(p: Point) -> Self {
        Self::new(p.x, p.y, p.x, p.y)
    }

    /// The bounding rectangle of two points.
    pub fn spanning(a: Point, b: Point) -> Self {
        Self::new(a.x, a.y, b.x, b.y)
    }

    /// Same rectangle with corners sorted. Deserialized rectangles may arrive
    /// with swapped corners.
    pub fn normalized(&self) -> Self {
        Self::new(self.x1, self.y1, self.x2, self.y2)
    }

    pub fn width(&self) -> u32 {
        self.x1.abs_diff(self.x2) + 1
    }

    pub fn height(&self) -> u32 {
        self.y1.abs_diff(self.y2) + 1
    }

    pub fn area(&self) -> u32 {
        self.width() * self.height()
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x1, self.y1)
    }

    pub fn center(&self) -> Point {
        Point::new((self.x1 + self.x2) / 2, (self.y1 + self.y2) / 2)
    }

    /// A rectangle one tile thick in at least one dimension. Ray-style
    /// obstruction tests only make sense on lines.
    pub fn is_line(&self) -> bool {
        self.width() == 1 || self.height() == 1
    }

    pub fn contains(&self, p: &Point) -> bool {
        p.x >= self.x1 && p.x <= self.x2 && p.y >= self.y1 && p.y <= self.y2
    }

    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.x1 >= self.x1 && other.x2 <= self.x2 && other.y1 >= self.y1 && other.y2 <= self.y2
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x1 <= other.x2 && other.x1 <= self.x2 && self.y1 <= other.y2 && other.y1 <= self.y2
    }

    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        if !self.intersects(other) {
            return None;
        }
        Some(Rect {
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
            x2: self.x2.min(other.x2),
            y2: self.y2.min(other.y2),
        })
    }

    /// Manhattan distance from `p` to the nearest tile of this rectangle
    /// (0 when `p` is inside).
    pub fn manhattan_to(&self, p: &Point) -> u32 {
        let dx = (self.x1 - p.x).max(0).max(p.x - self.x2);
        let dy = (self.y1 - p.y).max(0).max(p.y - self.y2);
        (dx + dy) as u32
    }

    /// Every tile of the rectangle, row by row from `(x1, y1)`.
    pub fn points(&self) -> impl Iterator<Item = Point> + '_ {
        (self.y1..=self.y2).flat_map(move |y| (self.x1..=self.x2).map(move |x| Point::new(x, y)))
    }

    /// The tiles strictly between the two endpoints of an axis-aligned
    /// segment. `None` for diagonal segments and for segments too short to
    /// have an interior.
    pub fn line_interior(a: Point, b: Point) -> Option<Rect> {
        if a.x == b.x {
            let (lo, hi) = (a.y.min(b.y), a.y.max(b.y));
            (hi - lo >= 2).then(|| Rect::new(a.x, lo + 1, a.x, hi - 1))
        } else if a.y == b.y {
            let (lo, hi) = (a.x.min(b.x), a.x.max(b.x));
            (hi - lo >= 2).then(|| Rect::new(lo + 1, a.y, hi - 1, a.y))
        } else {
            None
        }
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{},{} → {},{}]", self.x1, self.y1, self.x2, self.y2)
    }
}
