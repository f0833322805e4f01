//! Core value types

mod lifetime;

pub use lifetime::KeyLifetime;
