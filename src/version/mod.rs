//! Version identity layer
//!
//! ```text
//! ┌──────────────┐  fingerprint  ┌──────────────────┐
//! │   Detector   │──────────────▶│     Registry     │
//! │ (modules→fp) │               │ (versions/links) │
//! └──────────────┘               └──────────────────┘
//! ```
//!
//! - [`detector`]: Fingerprint of a target's installed module set
//! - [`registry`]: Global versions, targets, active links and pruning

pub mod detector;
pub mod registry;
