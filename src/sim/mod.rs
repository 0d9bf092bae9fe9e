// Simulation side of the bridge
// Owns the frame buffers and the metadata handshake with the simulation server

pub mod layout;
pub mod standalone;

pub use layout::{attribute_size, BufferLayout};
pub use standalone::StandaloneSimulation;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("unknown attribute {attribute:?} on object {object:?}")]
    UnknownAttribute { object: String, attribute: String },

    #[error("simulation is not connected")]
    NotConnected,
}

/// Non-owning view of both frame buffers
///
/// `send` is filled from inbound frames, `receive` is what goes back out.
pub struct FrameBuffers<'a> {
    pub send: &'a mut [f64],
    pub receive: &'a [f64],
}

/// Simulation client the connector drives once the data channel is open
pub trait Simulation {
    fn connect(&mut self) -> Result<(), SimulationError>;

    fn is_connected(&self) -> bool;

    /// One exchange with the simulation at `world_time` seconds
    fn communicate(&mut self, world_time: f64, resend_meta_data: bool)
        -> Result<(), SimulationError>;

    fn disconnect(&mut self);

    fn frame_buffers(&mut self) -> FrameBuffers<'_>;
}
