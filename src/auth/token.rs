//! Token values handed between providers, the cache, and callers.

pub mod access;
pub mod secret;
