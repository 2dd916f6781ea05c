//! Core library functions for the cohort clusterer

pub mod config;
pub mod data;
pub mod graph;
pub mod cluster;
pub mod vector;
pub mod report;
pub mod storage;
pub mod viz;
pub mod pipeline;

pub use anyhow::{Result, anyhow};
