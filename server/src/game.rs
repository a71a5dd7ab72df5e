use crate::board::{Board, Extent, Position, Snake};
use crate::obstacles::ObstacleGrid;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use shared::{
    Direction, GameMode, StartParams, WorldType, FRUIT_REWARD, INITIAL_SNAKE_LEN, OBSTACLE_DENSITY,
};
use std::time::{Duration, Instant};

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndCause {
    Collision,
    TimeExpired,
    Quit,
    Disconnected,
}

impl EndCause {
    /// The line shown inside the terminal frame's map block.
    pub fn summary_line(self) -> &'static str {
        match self {
            EndCause::Collision => "GAME OVER",
            EndCause::TimeExpired => "TIME UP",
            EndCause::Quit => "QUIT",
            EndCause::Disconnected => "DISCONNECTED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Nothing moved: the game is over, the snake is dead or play is paused.
    Idle,
    Moved,
    Ate,
    Died,
}

/// Authoritative state of one game.
#[derive(Debug)]
pub struct GameState {
    pub extent: Extent,
    pub world: WorldType,
    pub mode: GameMode,
    pub snake: Snake,
    pub fruit: Option<Position>,
    pub obstacles: Option<ObstacleGrid>,
    pub score: u32,
    pub running: bool,
    pub end_cause: Option<EndCause>,
    started_at: Instant,
    pause_started: Option<Instant>,
    paused_total: Duration,
    rng: StdRng,
    board: Board,
}

impl GameState {
    pub fn new(params: StartParams, seed: Option<u64>, now: Instant) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::with_rng(params, rng, now)
    }

    pub fn with_rng(params: StartParams, mut rng: StdRng, now: Instant) -> Self {
        let extent = Extent::new(params.rows, params.cols);
        let snake = Snake::spawn_centered(extent, INITIAL_SNAKE_LEN);

        let obstacles = params.obstacles.then(|| {
            let (grid, _) = ObstacleGrid::generate(extent, OBSTACLE_DENSITY, &snake, &mut rng);
            grid
        });

        let mut game = Self {
            extent,
            world: params.world,
            mode: params.mode,
            snake,
            fruit: None,
            obstacles,
            score: 0,
            running: true,
            end_cause: None,
            started_at: now,
            pause_started: None,
            paused_total: Duration::ZERO,
            rng,
            board: Board::new(extent),
        };
        game.spawn_fruit();

        info!(
            "New game {}x{} {} {} obstacles={}",
            extent.rows,
            extent.cols,
            params.world.as_str(),
            params.mode.as_str(),
            game.obstacles.as_ref().map_or(0, ObstacleGrid::count)
        );
        game
    }

    pub fn is_obstacle(&self, pos: Position) -> bool {
        self.obstacles
            .as_ref()
            .is_some_and(|grid| grid.is_blocked(pos))
    }

    /// Forwards a requested direction through the anti-reversal rule.
    pub fn set_direction(&mut self, dir: Direction) -> bool {
        self.snake.turn(dir)
    }

    /// Advances the snake by one cell.
    pub fn step(&mut self) -> StepOutcome {
        if !self.running || !self.snake.alive || self.is_paused() {
            return StepOutcome::Idle;
        }

        let mut candidate = self.snake.head().step(self.snake.direction);

        match self.world {
            WorldType::Wrap => {
                candidate.x = wrap_axis(candidate.x, self.extent.cols);
                candidate.y = wrap_axis(candidate.y, self.extent.rows);
            }
            WorldType::Walls => {
                if !self.extent.is_interior(candidate) {
                    return self.die(candidate);
                }
            }
        }

        if self.is_obstacle(candidate) || self.snake.occupies(candidate) {
            return self.die(candidate);
        }

        let ate = self.fruit == Some(candidate);
        if ate {
            self.score += FRUIT_REWARD;
        }
        self.snake.advance(candidate, ate);

        if ate {
            self.spawn_fruit();
            StepOutcome::Ate
        } else {
            StepOutcome::Moved
        }
    }

    fn die(&mut self, at: Position) -> StepOutcome {
        debug!("Snake died moving into {:?}", at);
        self.snake.alive = false;
        self.end(EndCause::Collision);
        StepOutcome::Died
    }

    /// Stops the game. The first recorded cause wins.
    pub fn end(&mut self, cause: EndCause) {
        self.running = false;
        if self.end_cause.is_none() {
            self.end_cause = Some(cause);
        }
    }

    /// Moves the fruit to a uniformly random interior cell that is neither
    /// snake nor obstacle. Leaves no fruit if the board is full.
    pub fn spawn_fruit(&mut self) {
        let free: Vec<Position> = self
            .extent
            .interior_positions()
            .filter(|pos| !self.snake.occupies(*pos) && !self.is_obstacle(*pos))
            .collect();

        self.fruit = free.choose(&mut self.rng).copied();
        if self.fruit.is_none() {
            debug!("No free cell left for fruit");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.pause_started.is_some()
    }

    pub fn pause(&mut self, now: Instant) -> bool {
        if self.is_paused() {
            return false;
        }
        self.pause_started = Some(now);
        true
    }

    pub fn resume(&mut self, now: Instant) -> bool {
        match self.pause_started.take() {
            Some(started) => {
                self.paused_total += now.saturating_duration_since(started);
                true
            }
            None => false,
        }
    }

    /// Unpaused play time. Frozen at the pause instant while paused.
    pub fn elapsed(&self, now: Instant) -> Duration {
        let until = self.pause_started.unwrap_or(now);
        until
            .saturating_duration_since(self.started_at)
            .saturating_sub(self.paused_total)
    }

    pub fn elapsed_secs(&self, now: Instant) -> u64 {
        self.elapsed(now).as_secs()
    }

    /// Seconds left in TIMED mode, `None` in STANDARD.
    pub fn remaining_secs(&self, now: Instant) -> Option<u64> {
        self.mode
            .time_limit_secs()
            .map(|limit| limit.saturating_sub(self.elapsed_secs(now)))
    }

    pub fn time_expired(&self, now: Instant) -> bool {
        self.mode
            .time_limit_secs()
            .is_some_and(|limit| self.elapsed(now) >= Duration::from_secs(limit))
    }

    /// Repaints the render board from the current entities.
    pub fn redraw(&mut self) -> &Board {
        self.board.clear_and_redraw(
            self.world,
            self.obstacles.as_ref(),
            self.fruit,
            &self.snake,
        );
        &self.board
    }
}

/// Maps a coordinate that left the interior onto the opposite interior edge.
pub fn wrap_axis(value: i32, extent: usize) -> i32 {
    let last_interior = extent as i32 - 2;
    if value <= 0 {
        last_interior
    } else if value > last_interior {
        1
    } else {
        value
    }
}
