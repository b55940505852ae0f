//! Assembles EcoSIM model inputs for field warming experiments.
//!
//! Experimental sites are read from the experiment-metadata table, ranked by how well they
//! are documented and measured, and each selected site is given a grid, climate and plant
//! functional type file. The building blocks live in `ecosim-core` and
//! `ecosim-components`; this crate wires them together behind the `ecosim-prep` binary.
pub mod config;
pub mod pipeline;

pub use config::PipelineConfig;
pub use pipeline::{generate_site_files, run, run_with, GeneratedFiles, Providers, RunSummary};
