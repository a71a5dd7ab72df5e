//! Grid geometry, the snake entity and the render scratch board.
//!
//! The [`Board`] is derived state: it is wiped and painted from scratch on
//! every frame so no cell can survive from a previous tick.

use crate::obstacles::ObstacleGrid;
use shared::{Direction, WorldType, MAX_SNAKE_LEN};

pub const GLYPH_EMPTY: u8 = b' ';
pub const GLYPH_WALL_HORIZONTAL: u8 = b'_';
pub const GLYPH_WALL_VERTICAL: u8 = b'|';
pub const GLYPH_WRAP_BORDER: u8 = b'#';
pub const GLYPH_OBSTACLE: u8 = b'X';
pub const GLYPH_FRUIT: u8 = b'o';
pub const GLYPH_HEAD: u8 = b'@';
pub const GLYPH_BODY: u8 = b'*';

/// A cell coordinate. `x` is the column, `y` the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The neighbouring cell one step in `dir`, without any boundary handling.
    pub fn step(self, dir: Direction) -> Self {
        let (dx, dy) = dir.offset();
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

/// Board dimensions, border included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub rows: usize,
    pub cols: usize,
}

impl Extent {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    pub fn cell_count(self) -> usize {
        self.rows * self.cols
    }

    pub fn interior_cell_count(self) -> usize {
        self.rows.saturating_sub(2) * self.cols.saturating_sub(2)
    }

    pub fn contains(self, pos: Position) -> bool {
        pos.x >= 0 && pos.y >= 0 && (pos.x as usize) < self.cols && (pos.y as usize) < self.rows
    }

    /// True for cells strictly inside the border.
    pub fn is_interior(self, pos: Position) -> bool {
        pos.x >= 1
            && pos.y >= 1
            && (pos.x as usize) < self.cols.saturating_sub(1)
            && (pos.y as usize) < self.rows.saturating_sub(1)
    }

    /// Row-major index of `pos`. Callers must check [`Extent::contains`] first.
    pub fn index(self, pos: Position) -> usize {
        pos.y as usize * self.cols + pos.x as usize
    }

    pub fn interior_positions(self) -> impl Iterator<Item = Position> {
        let max_x = self.cols.saturating_sub(1) as i32;
        let max_y = self.rows.saturating_sub(1) as i32;
        (1..max_y).flat_map(move |y| (1..max_x).map(move |x| Position::new(x, y)))
    }
}

/// The player's snake. Segment 0 is the head.
#[derive(Debug, Clone)]
pub struct Snake {
    segments: Vec<Position>,
    pub direction: Direction,
    pub alive: bool,
}

impl Snake {
    /// Builds a straight snake whose body trails behind `head`, opposite to `direction`.
    pub fn new(head: Position, len: usize, direction: Direction) -> Self {
        let len = len.clamp(1, MAX_SNAKE_LEN);
        let trail = direction.opposite();
        let mut segments = Vec::with_capacity(len);
        let mut pos = head;
        for _ in 0..len {
            segments.push(pos);
            pos = pos.step(trail);
        }

        Self {
            segments,
            direction,
            alive: true,
        }
    }

    /// Starting snake: centred on the board, heading right.
    pub fn spawn_centered(extent: Extent, len: usize) -> Self {
        let head = Position::new((extent.cols / 2) as i32, (extent.rows / 2) as i32);
        Self::new(head, len, Direction::Right)
    }

    pub fn head(&self) -> Position {
        self.segments[0]
    }

    pub fn segments(&self) -> &[Position] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Scans segments head-first and stops at the first match.
    pub fn occupies(&self, pos: Position) -> bool {
        self.segments.iter().any(|segment| *segment == pos)
    }

    /// Applies a requested direction unless it would reverse into the neck.
    /// Returns whether the direction changed.
    pub fn turn(&mut self, dir: Direction) -> bool {
        if dir == self.direction.opposite() || dir == self.direction {
            return false;
        }
        self.direction = dir;
        true
    }

    /// Moves the head to `new_head`, growing by one segment when `grow` is set
    /// and the capacity allows it.
    pub fn advance(&mut self, new_head: Position, grow: bool) {
        if grow && self.segments.len() < MAX_SNAKE_LEN {
            let tail = self.segments[self.segments.len() - 1];
            self.segments.push(tail);
        }

        // Tail first, so every segment reads its predecessor before it is overwritten.
        for i in (1..self.segments.len()).rev() {
            self.segments[i] = self.segments[i - 1];
        }
        self.segments[0] = new_head;
    }
}

/// Render scratch surface.
#[derive(Debug, Clone)]
pub struct Board {
    extent: Extent,
    cells: Vec<u8>,
}

impl Board {
    pub fn new(extent: Extent) -> Self {
        Self {
            extent,
            cells: vec![GLYPH_EMPTY; extent.cell_count()],
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = &[u8]> {
        self.cells.chunks(self.extent.cols.max(1))
    }

    pub fn glyph_at(&self, pos: Position) -> Option<u8> {
        self.extent
            .contains(pos)
            .then(|| self.cells[self.extent.index(pos)])
    }

    /// Repaints everything in fixed layer order: border, obstacles, fruit, snake.
    pub fn clear_and_redraw(
        &mut self,
        world: WorldType,
        obstacles: Option<&ObstacleGrid>,
        fruit: Option<Position>,
        snake: &Snake,
    ) {
        self.cells.fill(GLYPH_EMPTY);

        match world {
            WorldType::Walls => self.draw_border(GLYPH_WALL_HORIZONTAL, GLYPH_WALL_VERTICAL),
            WorldType::Wrap => self.draw_border(GLYPH_WRAP_BORDER, GLYPH_WRAP_BORDER),
        }

        if let Some(grid) = obstacles {
            for pos in grid.positions() {
                self.paint(pos, GLYPH_OBSTACLE);
            }
        }

        if let Some(fruit) = fruit {
            self.paint(fruit, GLYPH_FRUIT);
        }

        for (i, segment) in snake.segments().iter().enumerate() {
            let glyph = if i == 0 { GLYPH_HEAD } else { GLYPH_BODY };
            self.paint(*segment, glyph);
        }
    }

    fn draw_border(&mut self, horizontal: u8, vertical: u8) {
        let Extent { rows, cols } = self.extent;
        if rows == 0 || cols == 0 {
            return;
        }

        for x in 0..cols {
            self.cells[x] = horizontal;
            self.cells[(rows - 1) * cols + x] = horizontal;
        }
        for y in 0..rows {
            self.cells[y * cols] = vertical;
            self.cells[y * cols + cols - 1] = vertical;
        }
    }

    fn paint(&mut self, pos: Position, glyph: u8) {
        if self.extent.contains(pos) {
            let index = self.extent.index(pos);
            self.cells[index] = glyph;
        }
    }
}
