//! finger-daemon library: argument parsing and node lifecycle.
//!
//! Kept separate from `main.rs` so the configuration logic can be tested.

pub mod args;
pub mod node;

pub use args::{Args, NodeConfig};
pub use node::Node;
