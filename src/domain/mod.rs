//! Domain types and the ports the dispatch pipeline talks through.

pub mod payment;
pub mod ports;
