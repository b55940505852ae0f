//! Generators for the EcoSIM grid, climate and PFT input files.
//!
//! Builders return an in-memory [`ecosim_core::dataset::Dataset`] that already satisfies the
//! fixed EcoSIM schema; a [`writer::DatasetWriter`] then puts it on disk in one step.
pub mod climate;
pub mod grid;
pub mod pft;
pub mod pft_file;
pub mod schema;
pub mod soil;
pub mod warming;
pub mod writer;
