//! Actor-based monitoring core
//!
//! Each actor runs as an independent async task communicating via Tokio
//! channels.
//!
//! ## Architecture Overview
//!
//! ```text
//!   CheckerActor (icmp)  ─┐
//!   CheckerActor (http)  ─┤
//!   CheckerActor (port)  ─┼── ApplyProbe ──→ StateActor ──→ EventBroadcaster ──→ subscribers
//!   CheckerActor (dns)   ─┤                    ↑    │
//!   StaleDetectorActor   ─┘   IngestReport ────┘    └──→ SnapshotStore (debounced)
//! ```
//!
//! ## Actor Types
//!
//! - **StateActor**: Owns targets, samples, processes and alerts
//! - **CheckerActor**: Probes all targets of one method on a schedule
//! - **StaleDetectorActor**: Forces agents that stopped reporting offline
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: Each actor has an mpsc command channel
//! 2. **Events**: The state actor publishes live events to a broadcast channel
//! 3. **Request/Response**: oneshot channels for queries

pub mod messages;
pub mod scheduler;
pub mod stale;
pub mod state;

pub use scheduler::CheckerHandle;
pub use stale::StaleDetectorHandle;
pub use state::StateHandle;
