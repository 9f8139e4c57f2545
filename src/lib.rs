pub mod auth;
pub mod config;
pub mod error;
pub mod execution;
pub mod execution_loop;
pub mod interpreter;
pub mod llm;
pub mod metadata;
pub mod question;
pub mod service;
pub mod synthesizer;
