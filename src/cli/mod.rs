//! CLI command implementations.

pub mod fields;
pub mod firmware;
pub mod parsers;
pub mod print;
pub mod run;
pub mod vmx;
