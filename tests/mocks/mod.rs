//! Shared fixtures for integration tests

pub mod adapters;
pub mod test_server;

#[allow(unused_imports)]
pub use adapters::ScriptedSources;
#[allow(unused_imports)]
pub use test_server::TestServer;
