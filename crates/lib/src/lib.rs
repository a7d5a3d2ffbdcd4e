//! xcache-lib: prebuilt module cache for multi-project native builds
//!
//! The crate decides which dependency modules of a target actually need
//! compiling and substitutes previously built products for the rest:
//! - `graph`: dependency graph of the modules behind one cached dependency
//! - `fingerprint`: content fingerprints over settings, inputs and dependencies
//! - `evaluate`: hit/miss decision against the artifact store
//! - `store`: fingerprint-keyed artifact storage with atomic publish
//! - `extract`: unpacking cached bundles into the working area
//! - `product`: finding build products after a real build
//! - `fixer`: rewiring project settings to link cached products
//! - `runner`: the per-target pipeline tying it together

pub mod config;
pub mod consts;
pub mod evaluate;
pub mod executor;
pub mod extract;
pub mod fingerprint;
pub mod fixer;
pub mod graph;
pub mod platform;
pub mod product;
pub mod project;
pub mod runner;
pub mod store;
pub mod util;
