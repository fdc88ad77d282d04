//! HTTP handlers

pub mod health;
pub mod transfer;

pub use health::{HealthResponse, health_check};
pub use transfer::{
    approve_transfer, create_transfer, deliver_transfer, get_transfer, get_transfer_items,
    list_transfers, reject_transfer, update_transfer,
};
