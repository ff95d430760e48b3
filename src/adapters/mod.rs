//! Concrete adapter implementations for ports.

pub mod csv_adapter;
pub mod csv_ledger_writer;
pub mod file_config_adapter;
