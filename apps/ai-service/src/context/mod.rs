//! Read-only grounding data for the prompt.

pub mod loaders;
pub mod store;

#[cfg(test)]
pub mod testing;
