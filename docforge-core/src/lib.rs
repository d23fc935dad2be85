//! Docforge Core
//!
//! Core types and abstractions for the docforge document generator.
//!
//! This crate contains:
//! - Domain types: jobs, code artifacts, generation results, templates
//! - DTOs: generation requests, progress events, completion wire format
//! - The error taxonomy shared by every generation stage

pub mod domain;
pub mod dto;
pub mod error;

pub use error::GenerationError;
