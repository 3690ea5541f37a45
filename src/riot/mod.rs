pub mod client;
pub mod region;
pub mod types;

pub use client::RiotClient;
pub use region::{Platform, Region};
