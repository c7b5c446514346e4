// src/utils/mod.rs
pub mod db_connect;
pub mod env;
pub mod rl_config;
