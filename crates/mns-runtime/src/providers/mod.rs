//! Queue provider implementations.

pub mod memory;
pub mod mns;

pub use memory::InMemoryProvider;
pub use mns::{AliyunMnsProvider, MnsError};
