#![cfg_attr(not(test), warn(unused_crate_dependencies))]
use dotenvy as _;
use tracing_subscriber as _;

pub mod client;
pub mod config;
pub mod constants;
pub mod dispatch;
pub mod error;
pub mod kv;
pub mod monitor;
pub mod storage;
