pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod evaluation;
pub mod factorization;
pub mod ledger;
pub mod models;
pub mod recommend;

pub use config::Config;
pub use engine::Engine;
pub use error::{AppError, Result};
