#![cfg_attr(not(test), no_std)]
#![cfg_attr(feature = "strict", deny(warnings))]

extern crate alloc;

pub(crate) mod commands;
pub mod datapath;
pub mod ledger;
pub mod oob;
pub(crate) mod parser;
pub mod queue;
pub mod reconnect;
pub(crate) mod responses;
pub mod signal;
pub mod stack;
pub mod transport;
pub mod urc;
pub mod wifi;

#[cfg(test)]
mod tests;
