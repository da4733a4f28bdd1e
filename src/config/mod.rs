//! Project-level settings for opening a vault.

pub mod settings;

pub use settings::Settings;
