pub mod account_service;
pub mod bid_service;
pub mod error;
pub mod escrow_service;
pub mod notification_service;
pub mod payment_gateway;
pub mod task_service;
#[cfg(test)]
pub mod testing;
pub mod webhook;
