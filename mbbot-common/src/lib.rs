//! # mbbot Common Library
//!
//! Shared code for the mbbot crates:
//! - Error type
//! - Configuration loading (TOML bootstrap file + credentials file)
//! - User-agent string sent to MusicBrainz

pub mod config;
pub mod error;

pub use error::{Error, Result};
