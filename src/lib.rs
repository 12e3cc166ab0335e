pub mod authorization;
pub mod backend;
pub mod capacity;
pub mod config;
pub mod consts;
pub mod db;
pub mod models;
pub mod queue;
pub mod services;
pub mod sessions;
pub mod utils;
