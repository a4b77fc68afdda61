//! Client side of the public document link: an emailed PIN gates access to an
//! invoice or estimate, which the customer then agrees to and signs.

pub mod config;
pub mod dtos;
pub mod errors;
pub mod flows;
pub mod models;
pub mod preview;
pub mod services;

#[cfg(test)]
mod testing;

pub use errors::{AppError, Result};
