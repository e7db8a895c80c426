pub mod client;
pub mod entities;

pub use client::TestrailClient;
