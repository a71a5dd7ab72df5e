//! Text wire protocol shared by the snake server and its clients.
//!
//! Every message is a single newline-terminated line of space-separated,
//! case-sensitive tokens. Inbound lines are tokenized into a [`Command`];
//! outbound frames are assembled by the server from the markers below.

use std::fmt;
use std::str::FromStr;

pub const SERVER_PORT: u16 = 5555;
pub const TICK_INTERVAL_MS: u64 = 150;
pub const DISCONNECT_GRACE_SECS: u64 = 10;
pub const DEFAULT_TIME_LIMIT_SECS: u64 = 60;

pub const FRUIT_REWARD: u32 = 10;
pub const INITIAL_SNAKE_LEN: usize = 3;
pub const MAX_SNAKE_LEN: usize = 256;

pub const MIN_ROWS: usize = 8;
pub const MAX_ROWS: usize = 50;
pub const MIN_COLS: usize = 8;
pub const MAX_COLS: usize = 100;

/// Fraction of interior cells turned into obstacles when `OBS` is requested.
pub const OBSTACLE_DENSITY: f64 = 0.04;

pub const CMD_START: &str = "START";
pub const CMD_MOVE: &str = "MOVE";
pub const CMD_PAUSE: &str = "PAUSE";
pub const CMD_RESUME: &str = "RESUME";
pub const CMD_QUIT: &str = "QUIT";

pub const FRAME_SCORE: &str = "SCORE";
pub const FRAME_MODE: &str = "MODE";
pub const FRAME_TIME: &str = "TIME";
pub const FRAME_MAP: &str = "MAP";
pub const FRAME_END_MAP: &str = "ENDMAP";
pub const FRAME_GAME_OVER: &str = "GAME_OVER";
pub const PAUSED_BANNER: &str = "=== PAUSED (ESC to resume) ===";

/// Cardinal movement direction, keyed the way the client sends it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Left,
    Down,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Left,
        Direction::Down,
        Direction::Right,
    ];

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "w" => Some(Direction::Up),
            "a" => Some(Direction::Left),
            "s" => Some(Direction::Down),
            "d" => Some(Direction::Right),
            _ => None,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }

    /// Grid offset of one step. Rows grow downward.
    pub fn offset(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }
}

/// Boundary behaviour of the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldType {
    /// Touching the border ends the game.
    Walls,
    /// Leaving the interior re-enters from the opposite edge.
    Wrap,
}

impl WorldType {
    pub fn as_str(self) -> &'static str {
        match self {
            WorldType::Walls => "WALLS",
            WorldType::Wrap => "WRAP",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameMode {
    Standard,
    /// Game ends once `limit_secs` of unpaused time has elapsed.
    Timed { limit_secs: u64 },
}

impl GameMode {
    pub fn as_str(self) -> &'static str {
        match self {
            GameMode::Standard => "STANDARD",
            GameMode::Timed { .. } => "TIMED",
        }
    }

    pub fn time_limit_secs(self) -> Option<u64> {
        match self {
            GameMode::Standard => None,
            GameMode::Timed { limit_secs } => Some(limit_secs),
        }
    }
}

/// Session parameters carried by a `START` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartParams {
    pub rows: usize,
    pub cols: usize,
    pub world: WorldType,
    pub obstacles: bool,
    pub mode: GameMode,
}

/// A tokenized inbound line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start(StartParams),
    Move(Direction),
    Pause,
    Resume,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    Empty,
    UnknownCommand(String),
    MissingArgument(&'static str),
    InvalidArgument { name: &'static str, value: String },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Empty => write!(f, "empty line"),
            ParseError::UnknownCommand(cmd) => write!(f, "unknown command '{}'", cmd),
            ParseError::MissingArgument(name) => write!(f, "missing argument <{}>", name),
            ParseError::InvalidArgument { name, value } => {
                write!(f, "invalid value '{}' for <{}>", value, name)
            }
        }
    }
}

impl std::error::Error for ParseError {}

impl Command {
    /// Tokenizes one protocol line. Tokens past the ones a command needs are ignored.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let mut tokens = line.split_whitespace();
        let keyword = tokens.next().ok_or(ParseError::Empty)?;

        match keyword {
            CMD_START => parse_start(&mut tokens).map(Command::Start),
            CMD_MOVE => {
                let key = tokens.next().ok_or(ParseError::MissingArgument("dir"))?;
                Direction::from_key(key)
                    .map(Command::Move)
                    .ok_or_else(|| invalid("dir", key))
            }
            CMD_PAUSE => Ok(Command::Pause),
            CMD_RESUME => Ok(Command::Resume),
            CMD_QUIT => Ok(Command::Quit),
            other => Err(ParseError::UnknownCommand(other.to_string())),
        }
    }
}

impl FromStr for Command {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Command::parse(s)
    }
}

fn invalid(name: &'static str, value: &str) -> ParseError {
    ParseError::InvalidArgument {
        name,
        value: value.to_string(),
    }
}

fn next_token<'a>(
    tokens: &mut impl Iterator<Item = &'a str>,
    name: &'static str,
) -> Result<&'a str, ParseError> {
    tokens.next().ok_or(ParseError::MissingArgument(name))
}

fn parse_extent(token: &str, name: &'static str, min: usize, max: usize) -> Result<usize, ParseError> {
    token
        .parse::<usize>()
        .map(|value| value.clamp(min, max))
        .map_err(|_| invalid(name, token))
}

fn parse_start<'a>(tokens: &mut impl Iterator<Item = &'a str>) -> Result<StartParams, ParseError> {
    let rows = parse_extent(next_token(tokens, "rows")?, "rows", MIN_ROWS, MAX_ROWS)?;
    let cols = parse_extent(next_token(tokens, "cols")?, "cols", MIN_COLS, MAX_COLS)?;

    let world = match next_token(tokens, "world")? {
        "WALLS" => WorldType::Walls,
        "WRAP" => WorldType::Wrap,
        other => return Err(invalid("world", other)),
    };

    let obstacles = match next_token(tokens, "obstacles")? {
        "OBS" => true,
        "NOOBS" => false,
        other => return Err(invalid("obstacles", other)),
    };

    let mode = match next_token(tokens, "mode")? {
        "STANDARD" => GameMode::Standard,
        "TIMED" => {
            // Absent, unparsable or zero limits fall back to the default.
            let limit_secs = tokens
                .next()
                .and_then(|t| t.parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_TIME_LIMIT_SECS);
            GameMode::Timed { limit_secs }
        }
        other => return Err(invalid("mode", other)),
    };

    Ok(StartParams {
        rows,
        cols,
        world,
        obstacles,
        mode,
    })
}
