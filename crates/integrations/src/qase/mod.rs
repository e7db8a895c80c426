pub mod client;

pub use client::QaseClient;
