//! Business logic services
//!
//! This module contains the device workflows separated from HTTP concerns.

pub mod wifi;
