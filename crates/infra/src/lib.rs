//! Infrastructure layer: stores, orchestration, config, DB bootstrap.

pub mod config;
pub mod db;
pub mod marketplace_service;
pub mod store;


pub use marketplace_service::{MarketplaceService, PurchaseReceipt};
