//! tcpscope library crate: per-flow TCP analysis of packet captures.

pub mod analysis;
pub mod capture;
pub mod config;
pub mod display;
pub mod flow;
pub mod health;
pub mod packet;
pub mod pipeline;
