//! # Snake Game Server Library
//!
//! This library provides the authoritative server for a single-player, grid-based
//! snake game played over a persistent TCP connection. The server owns all game
//! truth; the client only sends commands and prints the text frames it receives.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! The snake, fruit, obstacles, score and clock all live on the server. Each
//! tick advances the snake one cell, resolves wall, obstacle and self
//! collisions, and handles growth and fruit respawn.
//!
//! ### Connection State Machine
//! Every accepted connection starts in `Waiting` and moves through `Running`
//! and `Paused` to a terminal `GameOver`. Commands that do not fit the current
//! state, and lines that do not parse, are ignored without dropping the peer.
//!
//! ### Frame Streaming
//! Once per tick the server renders the board with a score, mode and time
//! header and streams it to the client. The final frame names why the game
//! ended.
//!
//! ## Architecture Design
//!
//! ### Two Tasks, One Lock
//! Each session runs a receive task and a tick task. Both reach the session
//! only through [`session::SessionHandle::with`], which holds a single mutex
//! for the whole closure. Frames are rendered under the lock and written after
//! it is released, so inbound commands become visible on the next tick.
//!
//! ### Cooperative Shutdown
//! `QUIT` and peer disconnects only set flags. The tick task observes them,
//! sends the final frame if anyone is listening, and then stops and joins the
//! receive task.
//!
//! ## Module Organization
//!
//! ### Board Module (`board`)
//! Positions, the snake and the render scratch board.
//!
//! ### Obstacles Module (`obstacles`)
//! Obstacle placement guarded by a breadth-first reachability check.
//!
//! ### Game Module (`game`)
//! The per-session `GameState`: simulation step, direction rule, pause
//! bookkeeping and the game clock.
//!
//! ### Render Module (`render`)
//! Bounded text frames for ticks and for the end of the game.
//!
//! ### Session Module (`session`)
//! Connection state machine and the shared-state handle.
//!
//! ### Network Module (`network`)
//! Polled TCP accept loop, receive loop and tick scheduler.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::new("0.0.0.0:5555", SessionConfig::default()).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod board;
pub mod game;
pub mod network;
pub mod obstacles;
pub mod render;
pub mod session;
