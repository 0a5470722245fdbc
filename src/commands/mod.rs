pub mod config;
pub mod history;
pub mod program;
pub mod run;
