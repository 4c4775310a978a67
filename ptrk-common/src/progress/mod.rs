//! Component progress: the weighted calculator and the component store

pub mod calculator;
pub mod components;

pub use calculator::{calculate_from_milestones, calculate_percent, MilestoneState, MilestoneValue};
pub use components::{check_state, Component, ComponentStore, NewComponent, ProgressUpdate};
