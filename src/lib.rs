// src/lib.rs
pub mod rl;
pub mod simulation;
pub mod store;
pub mod utils;
