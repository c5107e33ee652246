pub mod action;
pub mod api;
pub mod brew;
pub mod buffer;
pub mod config;
pub mod correction;
pub mod engine;
pub mod error;
pub mod scale;
pub mod sink;
pub mod state;
