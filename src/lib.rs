pub mod config;
pub mod cp;
pub mod error;
pub mod handshake;
pub mod lcp;
pub mod link;
pub mod log;
pub mod ppp;
pub mod pppd;
pub mod session;
pub mod sstp;
pub mod types;

use std::sync::atomic::AtomicBool;
pub static DEBUG_PARSE: AtomicBool = AtomicBool::new(false);
