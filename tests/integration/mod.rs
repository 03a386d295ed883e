//! Integration tests module
//!
//! This module organizes all integration tests for the pulse-rx application.

pub mod bridge_test;
pub mod bus_test;
pub mod config_test;
