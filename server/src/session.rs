//! Per-connection state machine and the lock that guards it.
//!
//! A [`Session`] interprets inbound protocol lines against the connection's
//! current [`ConnectionState`] and advances its game once per tick. Both the
//! receive task and the tick task reach it only through a [`SessionHandle`],
//! which serializes every access behind a single mutex:
//!
//! - acquire the lock,
//! - operate on the whole session,
//! - release before doing any I/O.

use crate::game::{EndCause, GameState};
use crate::render;
use log::{debug, info, warn};
use shared::{Command, GameMode};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Notify};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Waiting,
    Running,
    Paused,
    GameOver,
}

/// Final numbers of a finished session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub score: u32,
    pub mode: GameMode,
    pub elapsed_secs: u64,
    pub cause: EndCause,
}

/// Result of one scheduler iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// No game has been started on this connection.
    Idle,
    /// A status frame. `deliver` is false once the peer is gone.
    Frame { frame: String, deliver: bool },
    /// The game ended during this tick.
    Finished {
        frame: String,
        deliver: bool,
        summary: SessionSummary,
    },
}

#[derive(Debug)]
pub struct Session {
    state: ConnectionState,
    game: Option<GameState>,
    peer_disconnected: bool,
    disconnected_since: Option<Instant>,
    seed: Option<u64>,
}

impl Session {
    /// A fresh connection waiting for `START`. `seed` makes the game's RNG reproducible.
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            state: ConnectionState::Waiting,
            game: None,
            peer_disconnected: false,
            disconnected_since: None,
            seed,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn game(&self) -> Option<&GameState> {
        self.game.as_ref()
    }

    pub fn game_mut(&mut self) -> Option<&mut GameState> {
        self.game.as_mut()
    }

    pub fn is_peer_disconnected(&self) -> bool {
        self.peer_disconnected
    }

    /// Parses and applies one inbound line. Malformed lines are dropped.
    pub fn handle_line(&mut self, line: &str, now: Instant) -> bool {
        match Command::parse(line) {
            Ok(cmd) => self.apply(cmd, now),
            Err(e) => {
                debug!("Ignoring line {:?}: {}", line.trim_end(), e);
                false
            }
        }
    }

    /// Applies a command if the current state allows it. Returns whether it took effect.
    pub fn apply(&mut self, cmd: Command, now: Instant) -> bool {
        match (self.state, cmd) {
            (ConnectionState::Waiting, Command::Start(params)) => {
                info!(
                    "START {}x{} {} obstacles={} {}",
                    params.rows,
                    params.cols,
                    params.world.as_str(),
                    params.obstacles,
                    params.mode.as_str()
                );
                self.game = Some(GameState::new(params, self.seed, now));
                self.state = ConnectionState::Running;
                true
            }
            (ConnectionState::Running, Command::Move(dir)) => self
                .game
                .as_mut()
                .is_some_and(|game| game.set_direction(dir)),
            (ConnectionState::Running, Command::Pause) => {
                let paused = self.game.as_mut().is_some_and(|game| game.pause(now));
                if paused {
                    self.state = ConnectionState::Paused;
                }
                paused
            }
            (ConnectionState::Paused, Command::Resume) => {
                let resumed = self.game.as_mut().is_some_and(|game| game.resume(now));
                if resumed {
                    self.state = ConnectionState::Running;
                }
                resumed
            }
            (ConnectionState::Waiting, Command::Quit) => {
                // No tick loop exists yet to observe the flag.
                self.state = ConnectionState::GameOver;
                true
            }
            (ConnectionState::Running | ConnectionState::Paused, Command::Quit) => {
                match self.game.as_mut() {
                    Some(game) if game.running => {
                        game.end(EndCause::Quit);
                        true
                    }
                    _ => false,
                }
            }
            (state, cmd) => {
                debug!("Ignoring {:?} in state {:?}", cmd, state);
                false
            }
        }
    }

    /// Records that the peer went away at `now`. The game keeps ticking until
    /// the grace period, counted from that instant, runs out.
    pub fn mark_disconnected(&mut self, now: Instant) {
        if !self.peer_disconnected {
            info!("Peer disconnected in state {:?}", self.state);
            self.peer_disconnected = true;
            self.disconnected_since = Some(now);
        }
    }

    /// One scheduler iteration: grace period, time limit, simulation step, frame.
    pub fn tick(&mut self, now: Instant, grace: Duration) -> TickOutcome {
        let deliver = !self.peer_disconnected;
        let Some(game) = self.game.as_mut() else {
            return TickOutcome::Idle;
        };
        if self.state == ConnectionState::GameOver {
            return TickOutcome::Idle;
        }

        if let Some(since) = self.disconnected_since {
            if game.running && now.saturating_duration_since(since) >= grace {
                warn!("Peer gone for {:?}, ending session", grace);
                game.end(EndCause::Disconnected);
            }
        }

        if game.running && game.time_expired(now) {
            game.end(EndCause::TimeExpired);
        } else if self.state == ConnectionState::Running {
            game.step();
        }

        if !game.running {
            self.state = ConnectionState::GameOver;
            let summary = SessionSummary {
                score: game.score,
                mode: game.mode,
                elapsed_secs: game.elapsed_secs(now),
                cause: game.end_cause.unwrap_or(EndCause::Collision),
            };
            return TickOutcome::Finished {
                frame: render::game_over_frame(game, now),
                deliver,
                summary,
            };
        }

        TickOutcome::Frame {
            frame: render::status_frame(game, now),
            deliver,
        }
    }
}

/// Shared access to one [`Session`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    session: Arc<Mutex<Session>>,
    wake: Arc<Notify>,
}

impl SessionHandle {
    pub fn new(session: Session) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
            wake: Arc::new(Notify::new()),
        }
    }

    /// Runs `f` with the session locked. The lock is released when `f` returns.
    pub async fn with<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut session = self.session.lock().await;
        f(&mut session)
    }

    /// Wakes a task blocked in [`SessionHandle::wait_for_start`].
    pub fn notify(&self) {
        self.wake.notify_one();
    }

    /// Waits until the connection leaves `Waiting`. Returns true if a game started,
    /// false if the peer quit or disconnected first.
    pub async fn wait_for_start(&self) -> bool {
        loop {
            let (state, disconnected) = self
                .with(|session| (session.state(), session.is_peer_disconnected()))
                .await;
            match state {
                ConnectionState::Running | ConnectionState::Paused => return true,
                ConnectionState::GameOver => return false,
                ConnectionState::Waiting if disconnected => return false,
                ConnectionState::Waiting => self.wake.notified().await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Position;
    use shared::Direction;

    const START: &str = "START 20 40 WALLS NOOBS STANDARD";

    fn started(now: Instant) -> Session {
        let mut session = Session::new(Some(4));
        assert!(session.handle_line(START, now));
        session.game_mut().unwrap().fruit = Some(Position::new(1, 1));
        session
    }

    #[test]
    fn test_new_session_waits() {
        let session = Session::new(None);
        assert_eq!(session.state(), ConnectionState::Waiting);
        assert!(session.game().is_none());
        assert!(!session.is_peer_disconnected());
    }

    #[test]
    fn test_commands_ignored_while_waiting() {
        let now = Instant::now();
        let mut session = Session::new(None);
        for line in ["MOVE w", "PAUSE", "RESUME", "garbage", ""] {
            assert!(!session.handle_line(line, now), "line {:?}", line);
        }
        assert_eq!(session.state(), ConnectionState::Waiting);
        assert!(session.game().is_none());
    }

    #[test]
    fn test_start_moves_to_running() {
        let session = started(Instant::now());
        assert_eq!(session.state(), ConnectionState::Running);
        let game = session.game().unwrap();
        assert_eq!(game.extent.rows, 20);
        assert_eq!(game.extent.cols, 40);
    }

    #[test]
    fn test_second_start_ignored() {
        let now = Instant::now();
        let mut session = started(now);
        assert!(!session.handle_line("START 10 10 WRAP OBS TIMED 5", now));
        assert_eq!(session.game().unwrap().extent.cols, 40);
        assert_eq!(session.game().unwrap().mode, GameMode::Standard);
    }

    #[test]
    fn test_move_applies_direction_rule() {
        let now = Instant::now();
        let mut session = started(now);
        assert!(!session.handle_line("MOVE a", now));
        assert_eq!(session.game().unwrap().snake.direction, Direction::Right);
        assert!(session.handle_line("MOVE w", now));
        assert_eq!(session.game().unwrap().snake.direction, Direction::Up);
    }

    #[test]
    fn test_pause_resume_cycle() {
        let now = Instant::now();
        let mut session = started(now);

        assert!(session.handle_line("PAUSE", now));
        assert_eq!(session.state(), ConnectionState::Paused);
        assert!(session.game().unwrap().is_paused());

        assert!(!session.handle_line("PAUSE", now));
        assert!(!session.handle_line("MOVE w", now));
        assert_eq!(session.game().unwrap().snake.direction, Direction::Right);

        assert!(session.handle_line("RESUME", now));
        assert_eq!(session.state(), ConnectionState::Running);
        assert!(!session.handle_line("RESUME", now));
    }

    #[test]
    fn test_quit_stops_game_on_next_tick() {
        let now = Instant::now();
        let mut session = started(now);
        assert!(session.handle_line("QUIT", now));
        assert_eq!(session.state(), ConnectionState::Running);

        match session.tick(now, Duration::from_secs(10)) {
            TickOutcome::Finished {
                frame,
                deliver,
                summary,
            } => {
                assert!(deliver);
                assert_eq!(summary.cause, EndCause::Quit);
                assert!(frame.starts_with("GAME_OVER\nSCORE 0\n"));
                assert!(frame.contains("MAP\nQUIT\nENDMAP\n"));
            }
            other => panic!("Expected Finished, got {:?}", other),
        }
        assert_eq!(session.state(), ConnectionState::GameOver);
        assert_eq!(session.tick(now, Duration::from_secs(10)), TickOutcome::Idle);
        assert!(!session.handle_line("START 20 40 WALLS NOOBS STANDARD", now));
    }

    #[test]
    fn test_quit_while_waiting_ends_connection() {
        let mut session = Session::new(None);
        assert!(session.handle_line("QUIT", Instant::now()));
        assert_eq!(session.state(), ConnectionState::GameOver);
    }

    #[test]
    fn test_tick_without_game_is_idle() {
        let mut session = Session::new(None);
        assert_eq!(
            session.tick(Instant::now(), Duration::from_secs(10)),
            TickOutcome::Idle
        );
    }

    #[test]
    fn test_tick_advances_snake() {
        let now = Instant::now();
        let mut session = started(now);
        match session.tick(now, Duration::from_secs(10)) {
            TickOutcome::Frame { frame, deliver } => {
                assert!(deliver);
                assert!(frame.starts_with("SCORE 0\nMODE STANDARD\nTIME 0s\nMAP\n"));
            }
            other => panic!("Expected Frame, got {:?}", other),
        }
        assert_eq!(session.game().unwrap().snake.head(), Position::new(21, 10));
    }

    #[test]
    fn test_paused_tick_does_not_move() {
        let now = Instant::now();
        let mut session = started(now);
        session.handle_line("PAUSE", now);
        session.tick(now, Duration::from_secs(10));
        assert_eq!(session.game().unwrap().snake.head(), Position::new(20, 10));
    }

    #[test]
    fn test_timed_session_expires() {
        let t0 = Instant::now();
        let mut session = Session::new(Some(4));
        session.handle_line("START 20 40 WRAP NOOBS TIMED 30", t0);
        session.game_mut().unwrap().fruit = Some(Position::new(1, 1));

        let grace = Duration::from_secs(10);
        assert!(matches!(
            session.tick(t0 + Duration::from_secs(29), grace),
            TickOutcome::Frame { .. }
        ));

        match session.tick(t0 + Duration::from_secs(30), grace) {
            TickOutcome::Finished { frame, summary, .. } => {
                assert_eq!(summary.cause, EndCause::TimeExpired);
                assert_eq!(summary.elapsed_secs, 30);
                assert!(frame.contains("MODE TIMED\nTIME 30s\nMAP\nTIME UP\n"));
            }
            other => panic!("Expected Finished, got {:?}", other),
        }
    }

    #[test]
    fn test_disconnect_grace_period() {
        let t0 = Instant::now();
        let grace = Duration::from_secs(10);
        let mut session = Session::new(Some(4));
        session.handle_line("START 20 40 WRAP NOOBS STANDARD", t0);
        session.game_mut().unwrap().fruit = Some(Position::new(1, 1));
        session.mark_disconnected(t0);

        match session.tick(t0, grace) {
            TickOutcome::Frame { deliver, .. } => assert!(!deliver),
            other => panic!("Expected Frame, got {:?}", other),
        }
        assert!(matches!(
            session.tick(t0 + Duration::from_secs(9), grace),
            TickOutcome::Frame { .. }
        ));

        match session.tick(t0 + Duration::from_secs(10), grace) {
            TickOutcome::Finished {
                deliver, summary, ..
            } => {
                assert!(!deliver);
                assert_eq!(summary.cause, EndCause::Disconnected);
            }
            other => panic!("Expected Finished, got {:?}", other),
        }
    }

    #[test]
    fn test_grace_counts_from_disconnect_instant() {
        let t0 = Instant::now();
        let grace = Duration::from_secs(10);
        let mut session = Session::new(Some(4));
        session.handle_line("START 20 40 WRAP NOOBS STANDARD", t0);
        session.game_mut().unwrap().fruit = Some(Position::new(1, 1));

        // No tick runs between the disconnect and the end of the grace period.
        session.mark_disconnected(t0 + Duration::from_secs(1));
        session.mark_disconnected(t0 + Duration::from_secs(5));
        assert!(matches!(
            session.tick(t0 + Duration::from_millis(10_999), grace),
            TickOutcome::Frame { deliver: false, .. }
        ));
        match session.tick(t0 + Duration::from_secs(11), grace) {
            TickOutcome::Finished { summary, .. } => {
                assert_eq!(summary.cause, EndCause::Disconnected);
            }
            other => panic!("Expected Finished, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_wait_for_start_after_start() {
        let handle = SessionHandle::new(Session::new(Some(1)));
        let waiter = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.wait_for_start().await })
        };

        handle
            .with(|session| session.handle_line(START, Instant::now()))
            .await;
        handle.notify();

        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_wait_for_start_after_disconnect() {
        let handle = SessionHandle::new(Session::new(None));
        handle
            .with(|session| session.mark_disconnected(Instant::now()))
            .await;
        handle.notify();
        assert!(!handle.wait_for_start().await);
    }
}
