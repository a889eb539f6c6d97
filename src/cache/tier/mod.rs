//! Cache tier implementations
//!
//! `memory` is the bounded in-process tier (L1); `shared` is the pooled
//! client for the out-of-process store (L2).

pub mod memory;
pub mod shared;
