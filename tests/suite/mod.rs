//! Integration test modules

mod cli;
mod scan;
