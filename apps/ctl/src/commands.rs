//! Command implementations.

pub mod create_exec;
