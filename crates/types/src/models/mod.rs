//! Shared models used across adapters, services and settings

pub mod secret_string;

pub use secret_string::SecretString;
