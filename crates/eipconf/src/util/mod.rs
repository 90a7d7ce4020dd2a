//! Utility functions.

pub mod ifname;
