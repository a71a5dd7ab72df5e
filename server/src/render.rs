//! Text frames sent to the client once per tick.

use crate::board::Extent;
use crate::game::{EndCause, GameState};
use shared::{
    FRAME_END_MAP, FRAME_GAME_OVER, FRAME_MAP, FRAME_MODE, FRAME_SCORE, FRAME_TIME, PAUSED_BANNER,
};
use std::time::Instant;

/// Room for the SCORE/MODE/TIME header lines and map markers.
const HEADER_CAPACITY: usize = 128;

/// Append-only text buffer that never grows past its capacity.
/// Writes that do not fit are cut off and flag the buffer as truncated.
#[derive(Debug)]
pub struct FrameBuffer {
    text: String,
    capacity: usize,
    truncated: bool,
}

impl FrameBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            text: String::with_capacity(capacity),
            capacity,
            truncated: false,
        }
    }

    pub fn push_str(&mut self, s: &str) {
        let room = self.capacity - self.text.len();
        if s.len() <= room {
            self.text.push_str(s);
            return;
        }

        let mut cut = room;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        self.text.push_str(&s[..cut]);
        self.truncated = true;
    }

    pub fn push_line(&mut self, s: &str) {
        self.push_str(s);
        self.push_str("\n");
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

/// Bytes needed for a full status frame on a board of this size.
pub fn frame_capacity(extent: Extent) -> usize {
    HEADER_CAPACITY + PAUSED_BANNER.len() + 1 + extent.rows * (extent.cols + 1)
}

/// Writes `MAP`, the optional pause banner, every board row and `ENDMAP`.
pub fn write_map(out: &mut FrameBuffer, game: &mut GameState) {
    let paused = game.is_paused();
    out.push_line(FRAME_MAP);
    if paused {
        out.push_line(PAUSED_BANNER);
    }

    let board = game.redraw();
    for row in board.rows() {
        let line: String = row.iter().map(|&glyph| char::from(glyph)).collect();
        out.push_line(&line);
    }

    out.push_line(FRAME_END_MAP);
}

/// Formats the `TIME` value: remaining seconds in TIMED mode, elapsed otherwise.
pub fn time_line(game: &GameState, now: Instant) -> String {
    match game.remaining_secs(now) {
        Some(remaining) => format!("{} {}s LEFT", FRAME_TIME, remaining),
        None => format!("{} {}s", FRAME_TIME, game.elapsed_secs(now)),
    }
}

/// Per-tick frame: score, mode, time and the map.
pub fn status_frame(game: &mut GameState, now: Instant) -> String {
    let mut out = FrameBuffer::with_capacity(frame_capacity(game.extent));
    write_status(&mut out, game, now);
    out.into_string()
}

pub fn write_status(out: &mut FrameBuffer, game: &mut GameState, now: Instant) {
    out.push_line(&format!("{} {}", FRAME_SCORE, game.score));
    out.push_line(&format!("{} {}", FRAME_MODE, game.mode.as_str()));
    out.push_line(&time_line(game, now));
    write_map(out, game);
}

/// Final frame: summary fields plus the cause line inside the map block.
pub fn game_over_frame(game: &GameState, now: Instant) -> String {
    let cause = game.end_cause.unwrap_or(EndCause::Collision);
    let mut out = FrameBuffer::with_capacity(HEADER_CAPACITY);
    out.push_line(FRAME_GAME_OVER);
    out.push_line(&format!("{} {}", FRAME_SCORE, game.score));
    out.push_line(&format!("{} {}", FRAME_MODE, game.mode.as_str()));
    out.push_line(&format!("{} {}s", FRAME_TIME, game.elapsed_secs(now)));
    out.push_line(FRAME_MAP);
    out.push_line(cause.summary_line());
    out.push_line(FRAME_END_MAP);
    out.into_string()
}
