// THEORY:
// This file is the main entry point for the `ratio_vision` library crate. It
// exposes the two pipeline flavors (sequential and fork-join) and the data
// structures a consumer needs to drive them: the configuration object, the
// detector trait with its production implementation, and the composed output
// types. The internal layers (`core_modules`) stay encapsulated behind the
// pipeline API.

pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;

pub use error::RatioVisionError;
