//! agentcheck: a test execution engine that hands declarative YAML
//! scenarios to an autonomous agent CLI, serves the scenario's tools back
//! to that agent over stdio, and normalizes whatever happens into exactly
//! one PASS/FAIL/UNCLEAR verdict.

pub mod cli_args;
pub mod events;
pub mod interpolate;
pub mod protocol;
pub mod registry;
pub mod render;
pub mod runner;
pub mod server;
pub mod spec;
pub mod verdict;
