//! Constrained grid pathfinding.
//!
//! Breadth-first search over the tile grid. Every step costs 1 (diagonal
//! steps too, when 8-connected), so BFS order is uniform-cost order. Neighbor
//! expansion follows [`Direction::CARDINAL`] / [`Direction::ALL`], which makes
//! tie-breaking between equal-length paths identical on every run.
//!
//! A cell is walkable when:
//! - its terrain is walkable (or `allow_through_impermeable_terrain`),
//! - no other entity stands on it (or `allow_through_objects`); the goal cell
//!   is exempt so a walker can path up to an actor,
//! - no closed passage covers it (or `allow_through_closed_doors`),
//! - it lies in the start zone, when `restrict_to_start_zone` is set.
//!
//! "No path" is an ordinary outcome and comes back as `None`.

use std::collections::{HashMap, VecDeque};

use crate::config::Connectivity;
use crate::geometry::{Direction, Point};

/// The view of the world the pathfinder needs.
pub trait WalkMap {
    fn in_bounds(&self, p: &Point) -> bool;
    fn terrain_walkable(&self, p: &Point) -> bool;
    /// Whether an entity other than `mover` stands on `p`.
    fn occupied(&self, p: &Point, mover: Option<&str>) -> bool;
    fn closed_passage(&self, p: &Point) -> bool;
    fn zone_name(&self, p: &Point) -> Option<&str>;
}

/// Parameters for one search.
#[derive(Debug, Clone)]
pub struct PathRequest<'a> {
    pub start: Point,
    pub goal: Point,
    /// The walker, excluded from occupancy checks.
    pub mover: Option<&'a str>,
    pub allow_through_objects: bool,
    pub allow_through_closed_doors: bool,
    pub allow_through_impermeable_terrain: bool,
    pub restrict_to_start_zone: bool,
    pub include_start: bool,
    pub include_goal: bool,
    /// Grid-cost cap; cells farther than this are never expanded.
    pub max_distance: u32,
    pub connectivity: Connectivity,
}

impl<'a> PathRequest<'a> {
    pub fn new(start: Point, goal: Point) -> Self {
        Self {
            start,
            goal,
            mover: None,
            allow_through_objects: false,
            allow_through_closed_doors: false,
            allow_through_impermeable_terrain: false,
            restrict_to_start_zone: false,
            include_start: false,
            include_goal: true,
            max_distance: 256,
            connectivity: Connectivity::Four,
        }
    }

    pub fn mover(mut self, name: &'a str) -> Self {
        self.mover = Some(name);
        self
    }

    pub fn through_objects(mut self, allow: bool) -> Self {
        self.allow_through_objects = allow;
        self
    }

    pub fn through_closed_doors(mut self, allow: bool) -> Self {
        self.allow_through_closed_doors = allow;
        self
    }

    pub fn through_impermeable_terrain(mut self, allow: bool) -> Self {
        self.allow_through_impermeable_terrain = allow;
        self
    }

    pub fn within_start_zone(mut self, restrict: bool) -> Self {
        self.restrict_to_start_zone = restrict;
        self
    }

    pub fn include_start(mut self, include: bool) -> Self {
        self.include_start = include;
        self
    }

    pub fn include_goal(mut self, include: bool) -> Self {
        self.include_goal = include;
        self
    }

    pub fn max_distance(mut self, max_distance: u32) -> Self {
        self.max_distance = max_distance;
        self
    }

    pub fn connectivity(mut self, connectivity: Connectivity) -> Self {
        self.connectivity = connectivity;
        self
    }
}

/// Whether `p` passes the walkability predicate built from `request`.
pub fn is_walkable(map: &dyn WalkMap, request: &PathRequest<'_>, p: &Point) -> bool {
    if !map.in_bounds(p) {
        return false;
    }
    if !request.allow_through_impermeable_terrain && !map.terrain_walkable(p) {
        return false;
    }
    if !request.allow_through_objects && *p != request.goal && map.occupied(p, request.mover) {
        return false;
    }
    if !request.allow_through_closed_doors && map.closed_passage(p) {
        return false;
    }
    true
}

/// Find a path from `request.start` to `request.goal`.
///
/// The returned sequence runs start to goal, trimmed according to
/// `include_start` / `include_goal`. The start cell itself is never tested
/// for walkability.
pub fn find_path(map: &dyn WalkMap, request: &PathRequest<'_>) -> Option<Vec<Point>> {
    let start = request.start;
    let goal = request.goal;

    if start == goal {
        let keep = request.include_start || request.include_goal;
        return Some(if keep { vec![start] } else { vec![] });
    }

    let start_zone = if request.restrict_to_start_zone {
        map.zone_name(&start).map(str::to_owned)
    } else {
        None
    };
    let in_zone = |p: &Point| -> bool {
        !request.restrict_to_start_zone || map.zone_name(p) == start_zone.as_deref()
    };

    if !is_walkable(map, request, &goal) || !in_zone(&goal) {
        return None;
    }

    let directions: &[Direction] = match request.connectivity {
        Connectivity::Four => &Direction::CARDINAL,
        Connectivity::Eight => &Direction::ALL,
    };

    let mut frontier: VecDeque<(Point, u32)> = VecDeque::new();
    let mut came_from: HashMap<Point, Point> = HashMap::new();
    frontier.push_back((start, 0));
    came_from.insert(start, start);

    while let Some((current, cost)) = frontier.pop_front() {
        if current == goal {
            return Some(trim(reconstruct(&came_from, start, goal), request));
        }
        if cost >= request.max_distance {
            continue;
        }

        for &direction in directions {
            let next = current.step(direction);
            if came_from.contains_key(&next) {
                continue;
            }
            if !is_walkable(map, request, &next) || !in_zone(&next) {
                continue;
            }
            if is_diagonal(direction) && !corner_clear(map, request, &current, direction) {
                continue;
            }
            came_from.insert(next, current);
            frontier.push_back((next, cost + 1));
        }
    }

    None
}

fn is_diagonal(direction: Direction) -> bool {
    let (dx, dy) = direction.delta();
    dx != 0 && dy != 0
}

/// Diagonal steps may not cut a blocked corner.
fn corner_clear(map: &dyn WalkMap, request: &PathRequest<'_>, from: &Point, direction: Direction) -> bool {
    let (dx, dy) = direction.delta();
    is_walkable(map, request, &from.offset(dx, 0)) && is_walkable(map, request, &from.offset(0, dy))
}

fn reconstruct(came_from: &HashMap<Point, Point>, start: Point, goal: Point) -> Vec<Point> {
    let mut path = vec![goal];
    let mut node = goal;
    while node != start {
        match came_from.get(&node) {
            Some(&prev) => {
                path.push(prev);
                node = prev;
            }
            None => break,
        }
    }
    path.reverse();
    path
}

fn trim(mut path: Vec<Point>, request: &PathRequest<'_>) -> Vec<Point> {
    if !request.include_goal {
        path.pop();
    }
    if !request.include_start && !path.is_empty() && path[0] == request.start {
        path.remove(0);
    }
    path
}
