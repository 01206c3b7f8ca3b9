// src/matching/mod.rs
pub mod geospatial;
pub mod npmi;
pub mod pairwise;
pub mod range_join;
pub mod session;
pub mod time;

pub use npmi::{filter_by_npmi, npmi};
pub use pairwise::pairwise_filter;
pub use range_join::{InMemoryJoin, JoinEngine, PostgresJoin, RangeJoin};
