//! System requirements validation.
//!
//! This module provides functions to check that the host has a working
//! execution engine before the server starts accepting tool calls.

mod requirements;

pub use requirements::{
    EngineRequirements, MIN_NBCONVERT_VERSION, check_all, check_nbconvert, list_kernels,
    parse_kernelspecs,
};
