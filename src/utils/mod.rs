//! Utilities shared by the CLI.

pub mod browser;

pub use browser::open_browser;
