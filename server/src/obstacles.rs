//! Static obstacle placement that never splits the free interior.
//!
//! Each candidate cell is tentatively blocked and kept only if a breadth-first
//! search from [`REFERENCE_CELL`] still reaches every free interior cell.

use crate::board::{Extent, Position, Snake};
use log::{debug, info};
use rand::Rng;
use shared::Direction;
use std::collections::VecDeque;

/// BFS origin. Adjacent to the top-left interior corner and never blocked.
pub const REFERENCE_CELL: Position = Position { x: 1, y: 1 };

const ATTEMPTS_PER_OBSTACLE: usize = 50;
const MIN_ATTEMPTS: usize = 100;

#[derive(Debug, Clone)]
pub struct ObstacleGrid {
    extent: Extent,
    blocked: Vec<bool>,
}

/// Outcome of a generation run. `placed < target` when the attempt budget ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub target: usize,
    pub placed: usize,
    pub attempts: usize,
}

impl ObstacleGrid {
    pub fn empty(extent: Extent) -> Self {
        Self {
            extent,
            blocked: vec![false; extent.cell_count()],
        }
    }

    pub fn is_blocked(&self, pos: Position) -> bool {
        self.extent.contains(pos) && self.blocked[self.extent.index(pos)]
    }

    pub fn count(&self) -> usize {
        self.blocked.iter().filter(|b| **b).count()
    }

    pub fn positions(&self) -> impl Iterator<Item = Position> + '_ {
        self.extent
            .interior_positions()
            .filter(move |pos| self.is_blocked(*pos))
    }

    /// Marks `pos` blocked. Only interior cells can hold obstacles.
    pub fn block(&mut self, pos: Position) -> bool {
        if !self.extent.is_interior(pos) {
            return false;
        }
        let index = self.extent.index(pos);
        self.blocked[index] = true;
        true
    }

    fn unblock(&mut self, pos: Position) {
        if self.extent.contains(pos) {
            let index = self.extent.index(pos);
            self.blocked[index] = false;
        }
    }

    /// Number of interior cells without an obstacle, counted from scratch.
    pub fn free_interior_cells(&self) -> usize {
        self.extent
            .interior_positions()
            .filter(|pos| !self.is_blocked(*pos))
            .count()
    }

    /// Number of free interior cells reachable from `start` by four-directional moves.
    pub fn reachable_from(&self, start: Position) -> usize {
        if !self.extent.is_interior(start) || self.is_blocked(start) {
            return 0;
        }

        let mut visited = vec![false; self.extent.cell_count()];
        let mut queue = VecDeque::new();
        visited[self.extent.index(start)] = true;
        queue.push_back(start);
        let mut reached = 0;

        while let Some(pos) = queue.pop_front() {
            reached += 1;
            for dir in Direction::ALL {
                let next = pos.step(dir);
                if !self.extent.is_interior(next) || self.is_blocked(next) {
                    continue;
                }
                let index = self.extent.index(next);
                if !visited[index] {
                    visited[index] = true;
                    queue.push_back(next);
                }
            }
        }

        reached
    }

    pub fn is_fully_connected(&self) -> bool {
        self.reachable_from(REFERENCE_CELL) == self.free_interior_cells()
    }

    /// Places up to `density` of the interior as obstacles, keeping them off the
    /// snake, the reference cell and the cell directly ahead of the head.
    pub fn generate<R: Rng>(
        extent: Extent,
        density: f64,
        snake: &Snake,
        rng: &mut R,
    ) -> (Self, Placement) {
        let mut grid = Self::empty(extent);
        let interior = extent.interior_cell_count();
        let target = (interior as f64 * density.clamp(0.0, 1.0)).round() as usize;
        let budget = (target * ATTEMPTS_PER_OBSTACLE).max(MIN_ATTEMPTS);
        let ahead = snake.head().step(snake.direction);

        let mut placement = Placement {
            target,
            placed: 0,
            attempts: 0,
        };

        if target == 0 || extent.rows < 3 || extent.cols < 3 {
            return (grid, placement);
        }

        while placement.placed < target && placement.attempts < budget {
            placement.attempts += 1;

            let candidate = Position::new(
                rng.gen_range(1..extent.cols as i32 - 1),
                rng.gen_range(1..extent.rows as i32 - 1),
            );
            if candidate == REFERENCE_CELL
                || candidate == ahead
                || grid.is_blocked(candidate)
                || snake.occupies(candidate)
            {
                continue;
            }

            grid.block(candidate);
            if grid.is_fully_connected() {
                placement.placed += 1;
            } else {
                debug!("Rejected obstacle at {:?}: splits the free area", candidate);
                grid.unblock(candidate);
            }
        }

        info!(
            "Placed {}/{} obstacles after {} attempts",
            placement.placed, placement.target, placement.attempts
        );
        (grid, placement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use shared::{INITIAL_SNAKE_LEN, MAX_COLS, MAX_ROWS, MIN_COLS, MIN_ROWS, OBSTACLE_DENSITY};

    #[test]
    fn test_empty_grid_is_connected() {
        let grid = ObstacleGrid::empty(Extent::new(10, 10));
        assert_eq!(grid.free_interior_cells(), 64);
        assert_eq!(grid.reachable_from(REFERENCE_CELL), 64);
        assert!(grid.is_fully_connected());
    }

    #[test]
    fn test_block_only_interior() {
        let mut grid = ObstacleGrid::empty(Extent::new(10, 10));
        assert!(!grid.block(Position::new(0, 3)));
        assert!(!grid.block(Position::new(9, 3)));
        assert!(grid.block(Position::new(3, 3)));
        assert_eq!(grid.count(), 1);
        assert_eq!(grid.positions().collect::<Vec<_>>(), vec![Position::new(3, 3)]);
    }

    #[test]
    fn test_detects_isolated_pocket() {
        // Wall off the bottom-right interior corner (8, 8).
        let mut grid = ObstacleGrid::empty(Extent::new(10, 10));
        grid.block(Position::new(7, 8));
        assert!(grid.is_fully_connected());
        grid.block(Position::new(8, 7));
        assert!(!grid.is_fully_connected());
        assert_eq!(grid.free_interior_cells(), 62);
        assert_eq!(grid.reachable_from(REFERENCE_CELL), 61);
    }

    #[test]
    fn test_detects_split_board() {
        let extent = Extent::new(10, 10);
        let mut grid = ObstacleGrid::empty(extent);
        for y in 1..9 {
            grid.block(Position::new(5, y));
        }
        assert!(!grid.is_fully_connected());
        assert_eq!(grid.reachable_from(REFERENCE_CELL), 4 * 8);
    }

    #[test]
    fn test_blocked_start_reaches_nothing() {
        let mut grid = ObstacleGrid::empty(Extent::new(10, 10));
        grid.block(REFERENCE_CELL);
        assert_eq!(grid.reachable_from(REFERENCE_CELL), 0);
        assert_eq!(grid.reachable_from(Position::new(0, 0)), 0);
    }

    #[test]
    fn test_generate_keeps_connectivity_across_extents() {
        let mut rng = StdRng::seed_from_u64(7);
        let cases = [
            (Extent::new(MIN_ROWS, MIN_COLS), vec![0.0, OBSTACLE_DENSITY, 0.2, 0.5]),
            (Extent::new(12, 9), vec![OBSTACLE_DENSITY, 0.3, 0.6]),
            (Extent::new(20, 40), vec![OBSTACLE_DENSITY, 0.2]),
            (Extent::new(MAX_ROWS, MAX_COLS), vec![OBSTACLE_DENSITY]),
        ];

        for (extent, densities) in cases {
            for density in densities {
                let snake = Snake::spawn_centered(extent, INITIAL_SNAKE_LEN);
                let (grid, placement) = ObstacleGrid::generate(extent, density, &snake, &mut rng);

                assert!(grid.is_fully_connected(), "{:?} at {}", extent, density);
                assert_eq!(grid.count(), placement.placed);
                assert!(placement.placed <= placement.target);
                assert!(!grid.is_blocked(REFERENCE_CELL));
                for segment in snake.segments() {
                    assert!(!grid.is_blocked(*segment));
                }
                assert!(!grid.is_blocked(snake.head().step(snake.direction)));
            }
        }
    }

    #[test]
    fn test_generate_reaches_default_density() {
        let extent = Extent::new(20, 40);
        let snake = Snake::spawn_centered(extent, INITIAL_SNAKE_LEN);
        let mut rng = StdRng::seed_from_u64(42);
        let (grid, placement) = ObstacleGrid::generate(extent, OBSTACLE_DENSITY, &snake, &mut rng);

        // 4% of a sparse board is always achievable within the budget.
        assert_eq!(placement.target, 27);
        assert_eq!(placement.placed, placement.target);
        let ratio = grid.count() as f64 / extent.interior_cell_count() as f64;
        assert_approx_eq!(ratio, OBSTACLE_DENSITY, 0.005);
    }

    #[test]
    fn test_generate_zero_density() {
        let extent = Extent::new(20, 40);
        let snake = Snake::spawn_centered(extent, INITIAL_SNAKE_LEN);
        let mut rng = StdRng::seed_from_u64(1);
        let (grid, placement) = ObstacleGrid::generate(extent, 0.0, &snake, &mut rng);
        assert_eq!(grid.count(), 0);
        assert_eq!(placement.attempts, 0);
    }
}
