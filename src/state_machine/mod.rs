//! Per-item workflow state.
//!
//! The state of an item is never stored. It is recomputed on every call from
//! the marker files next to the input, so the process can exit between steps.

mod item;
mod state;

pub use item::{Item, Stage};
pub use state::{ItemState, LogStatus, MarkerSnapshot};
