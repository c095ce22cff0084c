//! Printmaps build service
//!
//! Picks map build orders from a file-system queue, renders them through the
//! Nik4/Mapnik driver with user overlays merged into the base style, and
//! publishes the zipped result next to the map's state document.

pub mod app_state;
pub mod config;
pub mod models;
pub mod services;
