//! Public embedding API

pub mod public;
