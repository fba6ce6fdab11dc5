//! Discord ingress listener
//!
//! This crate turns gateway events from one configured channel into
//! submissions and keeps their `verified` flag in step with approve reactions:
//! - **Events** (`events`) - event model, dispatcher, message and reaction handlers
//! - **Gateway** (`gateway`) - transport seam and the runner that pumps events
//!
//! # Architecture
//!
//! ```text
//! Gateway transport → GatewayRunner → EventDispatcher → Handlers → SubmissionStore
//!                                          ↑
//!                                    readiness guard
//! ```
//!
//! # Key Types
//!
//! - `GatewayRunner` - event loop with reconnection logic
//! - `EventDispatcher` - routes events to handlers once the feed is ready
//! - `SubmissionService` - trait the handlers write through
//! - `ListenerSettings` - configured channel and approve emoji

pub mod events;
pub mod gateway;
