//! Conflux - Core Library
//! Trade coordination and authorization pipeline

// Public modules
pub mod broker;
pub mod bus;
pub mod confluence;
pub mod core;
pub mod engine;
pub mod execution;
pub mod killswitch;
pub mod risk;
pub mod sizing;

// Re-exports
pub use core::{Config, Error, Result};
