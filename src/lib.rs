//! Library crate for trivia-back: question cache, session orchestration and the HTTP adapter.

pub mod cache;
pub mod config;
pub mod dao;
pub mod dto;
pub mod error;
pub mod generator;
pub mod routes;
pub mod services;
pub mod state;
