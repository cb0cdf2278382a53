pub mod execution;
pub mod indicators;
pub mod position_registry;
pub mod reconciliation;
pub mod signal_engine;
