// src/lib.rs

pub mod config;
pub mod error;
pub mod project;
pub mod recipe;
pub mod sys;

pub use error::{RecipeError, Result};
