//! Wire types shared by the Voxline crates.

pub mod api;
pub mod models;
