//! Endpoint handlers organized by domain

pub mod files;
pub mod records;
