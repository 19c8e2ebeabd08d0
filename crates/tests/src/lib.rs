//! Cross-crate integration tests

#[cfg(test)]
mod engine_integration;
