//! readscope-core: Assessment composition, grading, and scoring.
//!
//! This crate defines the data model, collaborator traits, and the pure
//! scoring pipeline (compose → evaluate → aggregate / metacognition /
//! timing → synthesize) that the rest of readscope builds on.

pub mod access;
pub mod composer;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod metacognition;
pub mod model;
pub mod parser;
pub mod report;
pub mod repository;
pub mod scoring;
pub mod synthesis;
pub mod taxonomy;
pub mod timing;
pub mod traits;
