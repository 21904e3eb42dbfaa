//! Core module containing the task model and the task processor
//!
//! This module contains:
//! - The task record, its type and its status state machine
//! - The handler registry mapping task types to pipeline entry points
//! - The single-consumer processor that drains the task store

mod handler;
mod processor;
mod task;
mod task_state;

pub use handler::*;
pub use processor::*;
pub use task::*;
pub use task_state::*;
