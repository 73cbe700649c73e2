//! # Rox Engine
//!
//! Records the state of a 3D scene tick by tick and replays it deterministically
//! to render color, depth, normal and instance mask images for every camera.
//!
//! This crate re-exports the engine ([`rox_core`]) and the on-disk document
//! model ([`rox_data`]) so applications can depend on a single package.

pub use rox_core::*;
pub use rox_data as data;
