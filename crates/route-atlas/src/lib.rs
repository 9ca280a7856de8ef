//! Route Atlas - Application Library
//!
//! Command-line application that ties the route-atlas library to persistent
//! storage, an async render loop and a headless map surface.

pub mod app;

pub use app::{AppError, run};
