//! Network module - Connection handles and the shared registry
//!
//! Provides:
//! - Per-client handles with a serialized outbound queue
//! - The registry broadcast handlers iterate
//! - The writer loop that turns queued packets into frames
//!
//! Accepting sockets is left to the embedding server.

mod connection;
mod registry;

pub use connection::*;
pub use registry::*;

use serde::{Deserialize, Serialize};

use crate::protocol::DEFAULT_MAX_PACKET_SIZE;

/// Configuration for network operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Packets buffered per connection before sends start failing
    #[serde(default = "default_send_queue_capacity")]
    pub send_queue_capacity: usize,
    /// Largest frame accepted from a client
    #[serde(default = "default_max_packet_size")]
    pub max_packet_size: usize,
}

fn default_send_queue_capacity() -> usize {
    256
}

fn default_max_packet_size() -> usize {
    DEFAULT_MAX_PACKET_SIZE
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            send_queue_capacity: default_send_queue_capacity(),
            max_packet_size: default_max_packet_size(),
        }
    }
}

impl NetworkConfig {
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.send_queue_capacity = capacity;
        self
    }
}
