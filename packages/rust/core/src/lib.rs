//! Core pipeline orchestration and domain logic for mediaqa.
//!
//! This crate ties together fetching, document parsing, cache-checked media
//! description, question answering and submission into a single run
//! ([`pipeline::Pipeline::run`]).

pub mod answering;
pub mod capability;
pub mod describer;
pub mod openai;
pub mod pipeline;
pub mod submission;
