pub mod client;
pub mod inventory;
pub mod types;

pub use client::NetBoxClient;
pub use inventory::NetBoxInventory;
