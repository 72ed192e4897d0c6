//! Batch aggregator - double-buffered, timer-driven flow merging
//!
//! # Architecture
//!
//! ```text
//! capture loop ── insert() ──► active buffer ─┐
//!                                             │ rotate() on every tick
//!                              retired buffer ◄┘
//!                                   │
//!                          merge_window (LIFO, per FlowKey)
//!                                   │
//!                          FlowSink::accept, one call per FlowRecord
//! ```
//!
//! The active-buffer index and the append share one mutex, so a rotation's
//! swap is ordered against every insert: inserts that returned before the swap
//! are in the retired buffer, later ones land in the other buffer.

pub mod processor;
pub mod window;

pub use processor::{BatchProcessor, RotationHandle, RotationSummary};
pub use window::merge_window;
