pub mod config;
mod consumer;
pub mod engine;
mod topic;

pub use config::BrokerConfig;
pub use engine::BrokerClient;

#[cfg(test)]
mod tests;
