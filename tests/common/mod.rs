#![allow(dead_code)]

pub mod fixtures;
pub mod registries;

pub use fixtures::*;
#[allow(unused_imports)]
pub use registries::*;
