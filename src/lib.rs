pub mod classify;
pub mod config;
pub mod llm;
pub mod main_module;
pub mod shared;
pub mod tickets;
