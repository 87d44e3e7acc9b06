//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - DuckDB for the LedgerStore port
//! - An in-process row lock table the DuckDB store uses for exclusive
//!   wallet locks

pub mod duckdb;
pub mod row_locks;
