//! Vendor-specific transports.
pub mod openai;
