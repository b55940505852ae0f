//! Experimental-site data model, tolerant field parsers and the in-memory array dataset
//! model used to assemble EcoSIM input files.
pub mod dataset;
pub mod era5;
pub mod loaders;
pub mod measurement;
pub mod parsers;
pub mod selection;
pub mod site;

pub mod errors;
