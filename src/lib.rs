//! runcfg library
//!
//! Named run configurations for a local inference backend: device rules,
//! strategy derivation, persistence and live parameter sync.

pub mod backend;
pub mod configs;
pub mod notify;
pub mod storage;
pub mod types;
