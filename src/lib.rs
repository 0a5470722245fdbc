pub mod collaborators;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod models;
pub mod session;
pub mod storage;
pub mod utils;
