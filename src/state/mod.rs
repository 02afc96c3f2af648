//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `Stage`: the three sequential crawl phases
//! - `WorkItem`: one URL at one stage with bounded retry state
//! - `WorkerSlot`: one concurrent execution context and its session generation

mod slot;
mod work_item;

pub use slot::{SlotBusy, SlotState, WorkerSlot};
pub use work_item::{item_identifier, InvalidTransition, ItemStatus, Stage, WorkItem};
