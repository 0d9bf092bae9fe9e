// Connection lifecycle for one simulation/peer pair
// Signaling through the mailbox, then the data channel loop, then teardown

pub mod role;

pub use role::Role;

use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::bridge;
use crate::network::protocol::encode_frame;
use crate::network::{PeerTransport, TransportError, TransportEvent};
use crate::shutdown::ShutdownToken;
use crate::signaling::mailbox::DEFAULT_POLL_INTERVAL;
use crate::signaling::{LocalSignal, Mailbox, MailboxExchange, MailboxSlot};
use crate::sim::{Simulation, SimulationError};

/// How long the steady loop waits for a transport event before ticking
const TICK: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Created,
    AwaitingRemoteSignal,
    Negotiating,
    ChannelOpen,
    Communicating,
    ShuttingDown,
    Closed,
}

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Simulation(#[from] SimulationError),
}

#[derive(Debug, Clone)]
pub struct ConnectorOptions {
    /// Label of the data channel the offerer creates
    pub channel_label: String,

    /// Mailbox polling cadence
    pub poll_interval: Duration,
}

impl Default for ConnectorOptions {
    fn default() -> Self {
        Self {
            channel_label: "teleop".to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Drives one peer session from the mailbox handshake to teardown
///
/// The connector is the only consumer of the transport's event queue, so the
/// local signaling state and the frame buffers need no locking.
pub struct Connector<S, T> {
    client_id: String,
    role: Role,
    mailbox: Mailbox,
    transport: T,
    events: Receiver<TransportEvent>,
    sim: S,
    state: ConnectionState,
    local: LocalSignal,
    exchange: MailboxExchange,
    label: String,

    // Reset when the channel opens; world time is measured from here
    clock: Instant,

    // Non-signaling events that arrived while waiting for the remote mailbox
    backlog: VecDeque<TransportEvent>,
    last_trickle_poll: Instant,
}

impl<S: Simulation, T: PeerTransport> Connector<S, T> {
    pub fn new(
        client_id: &str,
        role: Role,
        mailbox: Mailbox,
        transport: T,
        events: Receiver<TransportEvent>,
        sim: S,
        options: ConnectorOptions,
    ) -> Self {
        let exchange = MailboxExchange::new(mailbox.path(role.awaits), role.remote_kind())
            .with_interval(options.poll_interval);
        Self {
            client_id: client_id.to_string(),
            role,
            mailbox,
            transport,
            events,
            sim,
            state: ConnectionState::Created,
            local: LocalSignal::new(),
            exchange,
            label: options.channel_label,
            clock: Instant::now(),
            backlog: VecDeque::new(),
            last_trickle_poll: Instant::now(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn simulation(&self) -> &S {
        &self.sim
    }

    /// Clear stale mailbox files and, on the offering side, create the channel
    pub fn start(&mut self) -> Result<(), ConnectorError> {
        if self.state != ConnectionState::Created {
            return Ok(());
        }
        info!(
            "[{}] {} starting, mailbox {}",
            self.client_id,
            self.role.name,
            self.mailbox.dir().display()
        );

        for slot in self.role.clears_on_start {
            self.mailbox.remove(*slot);
        }
        if self.role.creates_channel {
            self.transport.create_data_channel(&self.label)?;
            debug!("[{}] Data channel '{}' requested", self.client_id, self.label);
        }

        self.state = ConnectionState::AwaitingRemoteSignal;
        Ok(())
    }

    /// Run the session until `shutdown` is cancelled, then tear down
    ///
    /// Teardown also happens when an error ends the session early.
    pub fn run(&mut self, shutdown: &ShutdownToken) -> Result<(), ConnectorError> {
        let result = self.run_inner(shutdown);
        if let Err(e) = &result {
            warn!("[{}] Session ended with error: {}", self.client_id, e);
        }
        self.close();
        result
    }

    fn run_inner(&mut self, shutdown: &ShutdownToken) -> Result<(), ConnectorError> {
        self.start()?;

        if self.state == ConnectionState::AwaitingRemoteSignal {
            if !self.await_remote_signal(shutdown)? {
                return Ok(());
            }
            self.state = ConnectionState::Negotiating;
            self.last_trickle_poll = Instant::now();
            info!("[{}] Remote signal applied, negotiating", self.client_id);

            while let Some(event) = self.backlog.pop_front() {
                self.handle_event(event)?;
            }
        }

        loop {
            if shutdown.is_cancelled() {
                info!("[{}] Shutdown requested", self.client_id);
                return Ok(());
            }

            match self.events.recv_timeout(TICK) {
                Ok(event) => self.handle_event(event)?,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return Err(TransportError::Closed.into()),
            }

            if self.state == ConnectionState::Negotiating
                && self.last_trickle_poll.elapsed() >= self.exchange.interval()
            {
                self.exchange.apply_new_candidates(&mut self.transport);
                self.last_trickle_poll = Instant::now();
            }

            if self.state == ConnectionState::Communicating {
                self.sim.communicate(self.world_time(), false)?;
            }
        }
    }

    /// Block on the remote mailbox while publishing local signaling
    ///
    /// `Ok(false)` means shutdown was requested during the wait.
    fn await_remote_signal(&mut self, shutdown: &ShutdownToken) -> Result<bool, ConnectorError> {
        let Self {
            mailbox,
            transport,
            events,
            local,
            exchange,
            backlog,
            role,
            ..
        } = self;
        let slot = role.writes;

        let mut transport_gone = false;
        let applied = exchange.await_remote(transport, shutdown, || {
            let flow = pump_signaling(events, local, mailbox, slot, backlog);
            transport_gone = flow.is_break();
            flow
        });

        match applied {
            Some(_) => Ok(true),
            None if transport_gone => Err(TransportError::Closed.into()),
            None => Ok(false),
        }
    }

    fn handle_event(&mut self, event: TransportEvent) -> Result<(), ConnectorError> {
        let Some(event) = self.local.absorb(event, &self.mailbox, self.role.writes) else {
            return Ok(());
        };

        match event {
            TransportEvent::ChannelOpen { label } => self.on_channel_open(&label),
            TransportEvent::Message(payload) => {
                if self.state != ConnectionState::Communicating {
                    warn!(
                        "[{}] Dropping message received in state {:?}",
                        self.client_id, self.state
                    );
                    return Ok(());
                }
                let buffers = self.sim.frame_buffers();
                match bridge::exchange(&payload, buffers.send, buffers.receive) {
                    Ok(reply) => self.send_frame(reply),
                    Err(e) => {
                        warn!("[{}] Dropping frame: {}", self.client_id, e);
                        Ok(())
                    }
                }
            }
            TransportEvent::Disconnected => {
                warn!("[{}] Peer disconnected", self.client_id);
                Ok(())
            }
            // absorbed above
            TransportEvent::LocalDescription(_) | TransportEvent::LocalCandidate(_) => Ok(()),
        }
    }

    /// Simulation handshake, then the offerer's opening frame
    fn on_channel_open(&mut self, label: &str) -> Result<(), ConnectorError> {
        if self.state != ConnectionState::Negotiating {
            debug!(
                "[{}] Ignoring channel '{}' opened in state {:?}",
                self.client_id, label, self.state
            );
            return Ok(());
        }
        self.state = ConnectionState::ChannelOpen;
        info!("[{}] ✅ Data channel '{}' open", self.client_id, label);

        self.sim.connect()?;
        self.clock = Instant::now();
        self.sim.communicate(self.world_time(), true)?;
        self.sim.communicate(self.world_time(), false)?;
        self.state = ConnectionState::Communicating;

        if self.role.speaks_first {
            let frame = encode_frame(self.sim.frame_buffers().receive);
            self.send_frame(frame)?;
        }
        Ok(())
    }

    fn send_frame(&mut self, frame: Vec<u8>) -> Result<(), ConnectorError> {
        match self.transport.send(frame) {
            Ok(()) => Ok(()),
            Err(TransportError::Closed) => Err(TransportError::Closed.into()),
            Err(e) => {
                warn!("[{}] Sending frame failed: {}", self.client_id, e);
                Ok(())
            }
        }
    }

    fn world_time(&self) -> f64 {
        self.clock.elapsed().as_secs_f64()
    }

    /// Disconnect the simulation, delete both mailbox files, close the transport
    pub fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.state = ConnectionState::ShuttingDown;

        if self.sim.is_connected() {
            self.sim.disconnect();
        }
        self.mailbox.remove(MailboxSlot::Offer);
        self.mailbox.remove(MailboxSlot::Answer);
        self.transport.close();

        self.state = ConnectionState::Closed;
        info!("[{}] Closed", self.client_id);
    }
}

/// Publish queued local signaling; everything else is kept for later
///
/// Breaks once the transport reports the connection lost or its queue closes.
fn pump_signaling(
    events: &Receiver<TransportEvent>,
    local: &mut LocalSignal,
    mailbox: &Mailbox,
    slot: MailboxSlot,
    backlog: &mut VecDeque<TransportEvent>,
) -> ControlFlow<()> {
    loop {
        match events.try_recv() {
            Ok(event) => match local.absorb(event, mailbox, slot) {
                Some(TransportEvent::Disconnected) => {
                    warn!("Peer connection lost before negotiation finished");
                    return ControlFlow::Break(());
                }
                Some(other) => backlog.push_back(other),
                None => {}
            },
            Err(TryRecvError::Empty) => return ControlFlow::Continue(()),
            Err(TryRecvError::Disconnected) => return ControlFlow::Break(()),
        }
    }
}
