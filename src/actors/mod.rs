//! Ingestion pipeline actors
//!
//! Every moving part runs as an independent tokio task and talks to the
//! others over channels.
//!
//! ## Architecture Overview
//!
//! ```text
//!   session (agent A)   session (agent B)   session (agent N)
//!          │                   │                   │
//!          └─────────┬─────────┴─────────┬─────────┘
//!                    │ submit (blocks when full)
//!           ┌────────▼─────────────────────────┐
//!           │ Dispatcher (bounded, routed by   │
//!           │ hash of service id)              │
//!           └──┬───────────┬───────────┬───────┘
//!              │           │           │
//!         ┌────▼───┐  ┌────▼───┐  ┌────▼───┐
//!         │Worker 0│  │Worker 1│  │Worker N│ ──► LiveState
//!         └────┬───┘  └────┬───┘  └────┬───┘
//!              └───────────┼───────────┘
//!                          │ AlertEvent
//!                 ┌────────▼────────┐
//!                 │ AlertSinkActor  │ ──► AlertStore, webhook, websocket feed
//!                 └─────────────────┘
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Work items**: routed mpsc queues, one per worker, sharing one capacity budget
//! 2. **Commands**: the sink has an mpsc command channel; queries answer over oneshot
//! 3. **Events**: raised alerts are broadcast to live subscribers

pub mod dispatcher;
pub mod messages;
pub mod sink;
pub mod worker;
