//! Demand forecast HTTP service

pub mod api;
pub mod config;
pub mod startup;
