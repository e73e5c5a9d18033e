pub mod application;
pub mod config;
pub mod desk;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod loan;
pub mod report;
pub mod repayment;
pub mod service;
pub mod store;
pub mod utils;
