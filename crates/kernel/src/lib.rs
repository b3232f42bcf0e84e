//! Diffuse-Particle Simulation Kernel
//!
//! This crate provides the compute core for generating and evolving diffuse
//! particles (spray, foam, bubbles) on top of a sequence of SPH fluid
//! snapshots. It is designed to be separable and compute-focused: no file
//! formats, no configuration, no driver loop -- those live in the
//! orchestrator crate.
//!
//! # Modules
//! - [`particle`] -- Struct-of-arrays storage for fluid frames, scratch
//!   fields and the persistent diffuse pool; the `DiffuseClass` tag.
//! - [`sph`] -- Linear spike, Wendland quintic and Poly6 kernels.
//! - [`neighbor`] -- Uniform-grid bucket index with 27-cell lookup; bucket
//!   sorts the frame so parallel passes write disjoint slices.
//! - [`fields`] -- The neighborhood summation passes, the clamp function
//!   and the spawn-count reduction.
//! - [`spawn`] -- Cylindrical diffuse-particle spawning with deterministic
//!   id assignment.
//! - [`diffuse`] -- Density recount, per-class advection and the
//!   age-cull-append lifecycle.

#![warn(missing_docs)]

pub mod diffuse;
pub mod fields;
pub mod neighbor;
pub mod particle;
pub mod spawn;
pub mod sph;

pub use diffuse::{AdvectParams, GRAVITY};
pub use fields::SURFACE;
pub use neighbor::BucketGrid;
pub use particle::{DiffuseClass, DiffusePool, FieldBuffers, FluidFrame};
