//! Core utilities for the NB-IoT eNB stack
//!
//! This crate provides fundamental types and utilities used across the stack:
//! - SubframeTime for NB-IoT frame timing
//! - Rnti and RntiAllocator
//! - CoverageClass and Direction
//! - PHY lookup tables (repetitions, transport block sizes)
//! - Common macros and debug utilities

pub mod coverage;
pub mod debug;
pub mod direction;
pub mod nbiot_common;
pub mod nbiot_entities;
pub mod pdu_parse_error;
pub mod phy_tables;
pub mod rnti;
pub mod subframe_time;

// Re-export commonly used items
pub use coverage::CoverageClass;
pub use direction::Direction;
pub use nbiot_common::*;
pub use pdu_parse_error::PduParseErr;
pub use rnti::{Rnti, RntiAllocator};
pub use subframe_time::SubframeTime;

/// Identifies one HARQ process within a UE's pool
pub type HarqProcessId = u8;

/// Logical channel identifier
pub type Lcid = u8;
