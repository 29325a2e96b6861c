pub mod delta;
pub mod filter;
pub mod models;
pub mod tree;
