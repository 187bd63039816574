pub mod api;
pub mod cli;
pub mod error;
pub mod export;
pub mod import;
pub mod mapping;
pub mod models;
pub mod pacing;
pub mod retry;
pub mod services;
pub mod settings;
pub mod staging;
pub mod timestamps;
