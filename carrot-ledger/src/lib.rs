pub mod clock;
pub mod config;
pub mod ledger;
pub mod service;
pub mod storage;
