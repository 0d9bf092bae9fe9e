// Simulation bridge over a WebRTC data channel, signaled through mailbox files

pub mod bridge;
pub mod cli;
pub mod config;
pub mod connector;
pub mod logging;
pub mod network;
pub mod shutdown;
pub mod signaling;
pub mod sim;
