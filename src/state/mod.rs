//! State module for tracking pipeline progress
//!
//! # Components
//!
//! - `PipelineState`: the coordinator's lifecycle
//!   (`Idle -> Provisioning -> Running -> Draining -> Done`, or `Failed`)

mod pipeline_state;

pub use pipeline_state::PipelineState;
