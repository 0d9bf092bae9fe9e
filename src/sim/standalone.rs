// In-process simulation endpoint
// Sizes and owns the buffers from the metadata; no simulation server behind it

use tracing::{debug, info};

use super::{BufferLayout, FrameBuffers, Simulation, SimulationError};
use crate::config::Metadata;

pub struct StandaloneSimulation {
    metadata: Metadata,
    send_layout: BufferLayout,
    receive_layout: BufferLayout,
    send: Vec<f64>,
    receive: Vec<f64>,
    connected: bool,
}

impl StandaloneSimulation {
    pub fn new(metadata: &Metadata) -> Result<Self, SimulationError> {
        let send_layout = BufferLayout::from_objects(&metadata.send)?;
        let receive_layout = BufferLayout::from_objects(&metadata.receive)?;
        debug!(
            "Buffer sizes: send={} receive={}",
            send_layout.len(),
            receive_layout.len()
        );

        Ok(Self {
            metadata: metadata.clone(),
            send: vec![0.0; send_layout.len()],
            receive: vec![0.0; receive_layout.len()],
            send_layout,
            receive_layout,
            connected: false,
        })
    }

    pub fn send_layout(&self) -> &BufferLayout {
        &self.send_layout
    }

    pub fn receive_layout(&self) -> &BufferLayout {
        &self.receive_layout
    }

    pub fn send_buffer(&self) -> &[f64] {
        &self.send
    }

    pub fn receive_buffer(&self) -> &[f64] {
        &self.receive
    }

    /// Values this side reports to the peer
    pub fn receive_buffer_mut(&mut self) -> &mut [f64] {
        &mut self.receive
    }

    fn log_request(&self) {
        info!(
            "Meta data request for {}: {}",
            self.metadata.server_endpoint(),
            self.metadata.request_meta_data()
        );
    }
}

impl Simulation for StandaloneSimulation {
    fn connect(&mut self) -> Result<(), SimulationError> {
        info!(
            "Simulation {} connected (client {})",
            self.metadata.simulation_name,
            self.metadata.client_endpoint()
        );
        self.connected = true;
        self.log_request();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn communicate(
        &mut self,
        world_time: f64,
        resend_meta_data: bool,
    ) -> Result<(), SimulationError> {
        if !self.connected {
            return Err(SimulationError::NotConnected);
        }
        if resend_meta_data {
            self.log_request();
        }
        self.send[0] = world_time;
        self.receive[0] = world_time;
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.connected {
            info!("Simulation {} disconnected", self.metadata.simulation_name);
        }
        self.connected = false;
    }

    fn frame_buffers(&mut self) -> FrameBuffers<'_> {
        FrameBuffers {
            send: &mut self.send,
            receive: &self.receive,
        }
    }
}
