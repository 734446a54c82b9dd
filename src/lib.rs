//! httpcap library crate: re-exports modules for the binary, benchmarks and
//! integration tests.

pub mod assembly;
pub mod capture;
pub mod cli;
pub mod config;
pub mod flow;
pub mod http;
pub mod output;
pub mod pipeline;
pub mod protocol;
