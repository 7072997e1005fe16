pub mod btle;
pub mod codec;
pub mod connection;
pub mod constants;
pub mod events;
pub mod link;
pub mod session;
pub mod types;

#[cfg(test)]
pub mod mock;
