// WebRTC transport runtime using str0m Sans-I/O implementation
// One thread owns the Rtc and its UDP socket and drives it with explicit I/O

use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use str0m::change::{SdpAnswer, SdpOffer, SdpPendingOffer};
use str0m::channel::{ChannelConfig, ChannelId, Reliability};
use str0m::net::{Protocol, Receive};
use str0m::{Candidate, Event, IceConnectionState, Input, Output, Rtc};

use super::client::{Reply, TransportCommand};
use super::{Payload, SdpKind, TransportError, TransportEvent};

/// Public STUN server used when the configuration does not name one
pub const DEFAULT_STUN_SERVER: &str = "stun.l.google.com:19302";

/// Longest the driver blocks on the socket before looking at commands again
const SOCKET_POLL: Duration = Duration::from_millis(10);

const STUN_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest datagram we expect on the ICE socket
const RECV_BUFFER_SIZE: usize = 2000;

/// Settings for the transport thread
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// `host:port` of a STUN server; `None` gathers host candidates only
    pub stun_server: Option<String>,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            stun_server: Some(DEFAULT_STUN_SERVER.to_string()),
        }
    }
}

type Spawned = (
    mpsc::Sender<TransportCommand>,
    mpsc::Receiver<TransportEvent>,
    JoinHandle<()>,
);

/// Start the transport thread and wait until it has gathered its candidates
pub(crate) fn spawn_transport_thread(options: TransportOptions) -> Result<Spawned, TransportError> {
    let (event_tx, event_rx) = mpsc::channel();
    let (cmd_tx, cmd_rx) = mpsc::channel();
    let (ready_tx, ready_rx) = mpsc::channel();

    let thread = thread::Builder::new()
        .name("rtc-transport".to_string())
        .spawn(move || {
            let (rtc, udp_socket) = match setup_rtc(&options, &event_tx) {
                Ok(setup) => {
                    let _ = ready_tx.send(Ok(()));
                    setup
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            if let Err(e) = run_str0m_loop(rtc, udp_socket, &cmd_rx, &event_tx) {
                error!("Transport loop error: {}", e);
            }
            debug!("Transport thread ending");
        })?;

    match ready_rx.recv() {
        Ok(Ok(())) => Ok((cmd_tx, event_rx, thread)),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(TransportError::Setup(
            "transport thread exited during setup".to_string(),
        )),
    }
}

/// Create the Rtc, bind the ICE socket and gather local candidates
///
/// Each gathered candidate is reported as a [`TransportEvent::LocalCandidate`].
fn setup_rtc(
    options: &TransportOptions,
    event_tx: &mpsc::Sender<TransportEvent>,
) -> Result<(Rtc, UdpSocket), TransportError> {
    let mut rtc = new_rtc();

    let local_ip = discover_local_ip().unwrap_or_else(|e| {
        warn!("Local IP discovery failed ({}), using 127.0.0.1", e);
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    });

    // Bind to the specific local IP (not 0.0.0.0) so local_addr() matches the host candidate
    let udp_socket = UdpSocket::bind(SocketAddr::new(local_ip, 0))?;
    let host_addr = udp_socket.local_addr()?;
    info!("Bound UDP socket: {}", host_addr);

    let host = Candidate::host(host_addr, "udp")
        .map_err(|e| TransportError::Setup(format!("host candidate: {}", e)))?;
    let host_line = host.to_sdp_string();
    rtc.add_local_candidate(host)
        .ok_or_else(|| TransportError::Setup("Rtc refused the host candidate".to_string()))?;
    let _ = event_tx.send(TransportEvent::LocalCandidate(host_line));

    match options.stun_server.as_deref() {
        Some(_) if local_ip.is_loopback() => {
            debug!("Loopback socket, skipping STUN");
        }
        Some(stun_server) => match query_stun_server(&udp_socket, stun_server) {
            Ok(public_addr) => {
                info!("🌐 Public address from STUN: {}", public_addr);
                match Candidate::server_reflexive(public_addr, host_addr, "udp") {
                    Ok(srflx) => {
                        let srflx_line = srflx.to_sdp_string();
                        if rtc.add_local_candidate(srflx).is_some() {
                            let _ = event_tx.send(TransportEvent::LocalCandidate(srflx_line));
                        } else {
                            warn!("Rtc refused the server reflexive candidate");
                        }
                    }
                    Err(e) => warn!("Failed to create server reflexive candidate: {}", e),
                }
            }
            Err(e) => {
                // Host candidate alone still works on a LAN
                warn!("STUN query failed: {}, using host candidate only", e);
            }
        },
        None => debug!("No STUN server configured"),
    }

    Ok((rtc, udp_socket))
}

fn new_rtc() -> Rtc {
    Rtc::builder()
        .set_rtp_mode(false) // Data channels only, no RTP media
        .build()
}

/// Pick the local IPv4 address for the ICE socket
///
/// A home network (192.168.x.x) address wins unless a VPN (10.x.x.x) is also
/// up, in which case the VPN address goes first since STUN only works through
/// it. Corporate ranges come next, anything else last.
fn discover_local_ip() -> Result<IpAddr, TransportError> {
    let interfaces = if_addrs::get_if_addrs()?;

    let mut candidates: Vec<(String, Ipv4Addr)> = interfaces
        .into_iter()
        .filter_map(|iface| match iface.addr.ip() {
            IpAddr::V4(ipv4) if !ipv4.is_loopback() => Some((iface.name, ipv4)),
            _ => None,
        })
        .collect();

    if candidates.is_empty() {
        return Err(TransportError::Setup(
            "no suitable network interfaces found".to_string(),
        ));
    }

    let has_vpn = candidates.iter().any(|(_, ip)| ip.octets()[0] == 10);
    let has_home_network = candidates
        .iter()
        .any(|(_, ip)| ip.octets()[0] == 192 && ip.octets()[1] == 168);

    candidates.sort_by_key(|(_, ip)| {
        let octets = ip.octets();
        if octets[0] == 10 {
            if has_home_network {
                0
            } else {
                2
            }
        } else if octets[0] == 192 && octets[1] == 168 {
            if has_vpn {
                1
            } else {
                0
            }
        } else if octets[0] == 172 && (16..=31).contains(&octets[1]) {
            1
        } else {
            3
        }
    });

    let (name, ip) = &candidates[0];
    debug!("Selected interface {} with IP {}", name, ip);
    Ok(IpAddr::V4(*ip))
}

/// Ask a STUN server for our public address
///
/// Must use the ICE socket itself, otherwise the NAT mapping differs from the
/// one the remote peer will see.
fn query_stun_server(udp_socket: &UdpSocket, stun_server: &str) -> Result<SocketAddr, TransportError> {
    let server = stun_server.trim().trim_start_matches("stun:");
    let stun_addr = server
        .to_socket_addrs()?
        .find(|addr| addr.is_ipv4())
        .ok_or_else(|| TransportError::Setup(format!("cannot resolve STUN server {}", server)))?;
    debug!("STUN server {} resolved to {}", server, stun_addr);

    udp_socket.set_read_timeout(Some(STUN_TIMEOUT))?;
    let client = stunclient::StunClient::new(stun_addr);
    client
        .query_external_address(udp_socket)
        .map_err(|e| TransportError::Setup(format!("STUN query failed: {}", e)))
}

/// Driver state that lives next to the Rtc
#[derive(Default)]
struct DriverState {
    /// Set once the data channel opens, on either side
    channel: Option<ChannelId>,

    /// Offer we created and are waiting to pair with the remote answer
    pending_offer: Option<SdpPendingOffer>,
}

/// Main synchronous polling loop for str0m
///
/// Each pass handles queued commands, drains Rtc outputs, then waits briefly
/// for one datagram. Returns when the connector asks to close.
fn run_str0m_loop(
    mut rtc: Rtc,
    udp_socket: UdpSocket,
    cmd_rx: &mpsc::Receiver<TransportCommand>,
    event_tx: &mpsc::Sender<TransportEvent>,
) -> Result<(), TransportError> {
    info!("🔄 Starting WebRTC polling loop");

    let local_addr = udp_socket.local_addr()?;
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];
    let mut state = DriverState::default();

    // str0m must be told when its requested deadline passes (ICE keepalives)
    let mut str0m_deadline: Option<Instant> = None;

    loop {
        // Phase 1: commands from the connector (non-blocking)
        loop {
            match cmd_rx.try_recv() {
                Ok(TransportCommand::Close) | Err(mpsc::TryRecvError::Disconnected) => {
                    info!("Closing peer connection");
                    rtc.disconnect();
                    return Ok(());
                }
                Ok(command) => {
                    if let Err(e) = handle_command(command, &mut rtc, &mut state, event_tx) {
                        warn!("Peer connection is no longer usable: {}", e);
                        rtc.disconnect();
                        let _ = event_tx.send(TransportEvent::Disconnected);
                        wait_for_close(cmd_rx);
                        return Ok(());
                    }
                }
                Err(mpsc::TryRecvError::Empty) => break,
            }
        }

        // Phase 2: drain str0m outputs
        loop {
            match rtc.poll_output().map_err(engine_error)? {
                Output::Transmit(transmit) => {
                    if let Err(e) = udp_socket.send_to(&transmit.contents, transmit.destination) {
                        warn!("Failed to send UDP packet: {}", e);
                    }
                }
                Output::Timeout(deadline) => {
                    str0m_deadline = Some(deadline);
                    break;
                }
                Output::Event(event) => handle_str0m_event(event, &mut state, event_tx),
            }
        }

        if !rtc.is_alive() {
            warn!("Peer connection is no longer alive");
            let _ = event_tx.send(TransportEvent::Disconnected);
            wait_for_close(cmd_rx);
            return Ok(());
        }

        // Phase 3: wait for one datagram or the deadline, whichever comes first
        let now = Instant::now();
        let wait = str0m_deadline
            .map(|deadline| deadline.saturating_duration_since(now))
            .unwrap_or(SOCKET_POLL)
            .clamp(Duration::from_millis(1), SOCKET_POLL);
        udp_socket.set_read_timeout(Some(wait))?;

        match udp_socket.recv_from(&mut buf) {
            Ok((n, source)) => {
                let input = match buf[..n].try_into() {
                    Ok(contents) => Input::Receive(
                        Instant::now(),
                        Receive {
                            proto: Protocol::Udp,
                            source,
                            destination: local_addr,
                            contents,
                        },
                    ),
                    Err(_) => {
                        debug!("Dropping unrecognised datagram from {}", source);
                        continue;
                    }
                };
                rtc.handle_input(input).map_err(engine_error)?;

                // str0m sets a new deadline after processing this packet
                str0m_deadline = None;
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                let now = Instant::now();
                if str0m_deadline.map_or(true, |deadline| now >= deadline) {
                    rtc.handle_input(Input::Timeout(now)).map_err(engine_error)?;
                    str0m_deadline = None;
                }
            }
            Err(e) => {
                error!("UDP socket error: {}", e);
                return Err(e.into());
            }
        }
    }
}

fn engine_error(e: str0m::RtcError) -> TransportError {
    TransportError::Engine(e.to_string())
}

/// Park until the connector closes us, refusing any further requests
fn wait_for_close(cmd_rx: &mpsc::Receiver<TransportCommand>) {
    for command in cmd_rx.iter() {
        match command {
            TransportCommand::Close => break,
            TransportCommand::CreateChannel { reply, .. }
            | TransportCommand::SetRemoteDescription { reply, .. }
            | TransportCommand::AddRemoteCandidate { reply, .. } => {
                let _ = reply.send(Err(TransportError::Closed));
            }
            TransportCommand::Send(_) => {}
        }
    }
}

/// Execute one connector command
///
/// An error means the engine can no longer negotiate and the caller must
/// report the connection as lost.
fn handle_command(
    command: TransportCommand,
    rtc: &mut Rtc,
    state: &mut DriverState,
    event_tx: &mpsc::Sender<TransportEvent>,
) -> Result<(), TransportError> {
    match command {
        TransportCommand::CreateChannel { label, reply } => {
            respond(reply, create_channel(rtc, state, event_tx, label));
        }
        TransportCommand::SetRemoteDescription { sdp, kind, reply } => {
            let result = match kind {
                SdpKind::Offer => accept_offer(rtc, event_tx, &sdp),
                SdpKind::Answer => accept_answer(rtc, state, &sdp),
            };
            let result = match result {
                Err(_) if !rtc.is_alive() => Err(TransportError::Closed),
                other => other,
            };
            let wedged = matches!(result, Err(TransportError::Closed));
            respond(reply, result);
            if wedged {
                error!("Remote {} left the peer connection unusable", kind);
                return Err(TransportError::Closed);
            }
        }
        TransportCommand::AddRemoteCandidate { candidate, reply } => {
            let line = candidate.trim().trim_start_matches("a=");
            let result = Candidate::from_sdp_string(line)
                .map(|candidate| {
                    rtc.add_remote_candidate(candidate);
                })
                .map_err(|e| TransportError::Rejected(format!("candidate {:?}: {}", line, e)));
            respond(reply, result);
        }
        TransportCommand::Send(frame) => {
            let Some(cid) = state.channel else {
                warn!("Dropping {} byte frame, no data channel open", frame.len());
                return Ok(());
            };
            match rtc.channel(cid) {
                Some(mut channel) => {
                    if let Err(e) = channel.write(true, &frame) {
                        warn!("Failed to send frame: {}", e);
                    }
                }
                None => warn!("Data channel {:?} is gone", cid),
            }
        }
        TransportCommand::Close => {}
    }
    Ok(())
}

fn respond(reply: Reply, result: Result<(), TransportError>) {
    let _ = reply.send(result);
}

/// Offering side: add the data channel and publish the offer
fn create_channel(
    rtc: &mut Rtc,
    state: &mut DriverState,
    event_tx: &mpsc::Sender<TransportEvent>,
    label: String,
) -> Result<(), TransportError> {
    let mut change = rtc.sdp_api();
    let channel_id = change.add_channel_with_config(ChannelConfig {
        label: label.clone(),
        ordered: true,
        reliability: Reliability::Reliable,
        negotiated: None,
        protocol: String::new(),
    });
    let (offer, pending) = change
        .apply()
        .ok_or_else(|| TransportError::Rejected("no SDP changes to offer".to_string()))?;

    info!("📨 Created data channel {} ({:?})", label, channel_id);
    state.pending_offer = Some(pending);
    let _ = event_tx.send(TransportEvent::LocalDescription(offer.to_sdp_string()));
    Ok(())
}

/// Refuse descriptions str0m would fail on after consuming state
///
/// str0m drops the pending offer on any rejected answer and disconnects the
/// Rtc when the DTLS fingerprint is missing, so these must be caught first.
fn check_description(sdp: &str, kind: SdpKind) -> Result<(), TransportError> {
    for attribute in ["a=ice-ufrag:", "a=ice-pwd:", "a=fingerprint:"] {
        if !sdp.lines().any(|line| line.trim_start().starts_with(attribute)) {
            return Err(TransportError::Rejected(format!(
                "{} has no {} line",
                kind,
                attribute.trim_end_matches(':')
            )));
        }
    }
    Ok(())
}

/// Answering side: accept the remote offer and publish our answer
fn accept_offer(
    rtc: &mut Rtc,
    event_tx: &mpsc::Sender<TransportEvent>,
    sdp: &str,
) -> Result<(), TransportError> {
    check_description(sdp, SdpKind::Offer)?;
    let offer = SdpOffer::from_sdp_string(sdp)
        .map_err(|e| TransportError::Rejected(format!("offer: {}", e)))?;
    let answer = rtc
        .sdp_api()
        .accept_offer(offer)
        .map_err(|e| TransportError::Rejected(format!("accept offer: {}", e)))?;

    let _ = event_tx.send(TransportEvent::LocalDescription(answer.to_sdp_string()));
    Ok(())
}

/// Offering side: pair the remote answer with our pending offer
fn accept_answer(rtc: &mut Rtc, state: &mut DriverState, sdp: &str) -> Result<(), TransportError> {
    // Everything that can fail without consuming the pending offer goes first
    check_description(sdp, SdpKind::Answer)?;
    let answer = SdpAnswer::from_sdp_string(sdp)
        .map_err(|e| TransportError::Rejected(format!("answer: {}", e)))?;
    let pending = state
        .pending_offer
        .take()
        .ok_or_else(|| TransportError::Rejected("no local offer pending".to_string()))?;

    // The pending offer is gone now; no later answer can be paired with it
    if let Err(e) = rtc.sdp_api().accept_answer(pending, answer) {
        error!("Answer rejected by str0m: {}", e);
        return Err(TransportError::Closed);
    }
    info!("✅ SDP negotiation complete");
    Ok(())
}

/// Translate str0m events into transport events
fn handle_str0m_event(event: Event, state: &mut DriverState, event_tx: &mpsc::Sender<TransportEvent>) {
    match event {
        Event::Connected => {
            // ICE + DTLS are both ready
            info!("🔗 WebRTC connection established (ICE + DTLS)");
        }
        Event::IceConnectionStateChange(ice_state) => {
            debug!("ICE state: {:?}", ice_state);
            if matches!(ice_state, IceConnectionState::Disconnected) {
                info!("❌ ICE connection disconnected");
                let _ = event_tx.send(TransportEvent::Disconnected);
            }
        }
        Event::ChannelOpen(cid, label) => {
            info!("📨 Data channel opened: {}", label);
            state.channel = Some(cid);
            let _ = event_tx.send(TransportEvent::ChannelOpen { label });
        }
        Event::ChannelData(channel_data) => {
            let _ = event_tx.send(TransportEvent::Message(Payload {
                binary: channel_data.binary,
                data: channel_data.data,
            }));
        }
        Event::ChannelClose(cid) => {
            info!("Data channel {:?} closed", cid);
            if state.channel == Some(cid) {
                state.channel = None;
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_use_public_stun() {
        let options = TransportOptions::default();
        assert_eq!(options.stun_server.as_deref(), Some(DEFAULT_STUN_SERVER));
    }

    #[test]
    fn test_wait_for_close_refuses_requests() {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (reply_tx, reply_rx) = mpsc::channel();
        cmd_tx
            .send(TransportCommand::AddRemoteCandidate {
                candidate: "candidate:1".to_string(),
                reply: reply_tx,
            })
            .unwrap();
        cmd_tx.send(TransportCommand::Close).unwrap();

        wait_for_close(&cmd_rx);

        assert!(matches!(reply_rx.recv().unwrap(), Err(TransportError::Closed)));
    }

    fn rtc_with_host(port: u16) -> Rtc {
        let mut rtc = new_rtc();
        let addr: SocketAddr = format!("127.0.0.1:{}", port).parse().unwrap();
        rtc.add_local_candidate(Candidate::host(addr, "udp").unwrap())
            .unwrap();
        rtc
    }

    fn local_description(events: &mpsc::Receiver<TransportEvent>) -> String {
        events
            .try_iter()
            .find_map(|event| match event {
                TransportEvent::LocalDescription(sdp) => Some(sdp),
                _ => None,
            })
            .unwrap()
    }

    fn without_ice_credentials(sdp: &str) -> String {
        sdp.lines()
            .filter(|line| !line.starts_with("a=ice-ufrag:") && !line.starts_with("a=ice-pwd:"))
            .map(|line| format!("{}\r\n", line))
            .collect()
    }

    #[test]
    fn test_check_description_requires_ice_and_dtls_lines() {
        let sdp = "v=0\r\na=ice-ufrag:abcd\r\na=ice-pwd:secret\r\na=fingerprint:sha-256 AA:BB\r\n";
        assert!(check_description(sdp, SdpKind::Answer).is_ok());

        let no_fingerprint = "v=0\r\na=ice-ufrag:abcd\r\na=ice-pwd:secret\r\n";
        let err = check_description(no_fingerprint, SdpKind::Offer).unwrap_err();
        assert!(matches!(err, TransportError::Rejected(ref msg) if msg.contains("a=fingerprint")));
    }

    #[test]
    fn test_rejected_answer_keeps_offer_pending() {
        let (offer_tx, offer_rx) = mpsc::channel();
        let mut offerer = rtc_with_host(5000);
        let mut state = DriverState::default();
        create_channel(&mut offerer, &mut state, &offer_tx, "teleop".to_string()).unwrap();
        let offer = local_description(&offer_rx);

        let (answer_tx, answer_rx) = mpsc::channel();
        let mut answerer = rtc_with_host(5001);
        accept_offer(&mut answerer, &answer_tx, &offer).unwrap();
        let answer = local_description(&answer_rx);

        let err = accept_answer(&mut offerer, &mut state, &without_ice_credentials(&answer))
            .unwrap_err();
        assert!(matches!(err, TransportError::Rejected(_)));
        assert!(state.pending_offer.is_some());
        assert!(offerer.is_alive());

        accept_answer(&mut offerer, &mut state, &answer).unwrap();
        assert!(state.pending_offer.is_none());
    }

    #[test]
    fn test_offer_without_fingerprint_leaves_rtc_alive() {
        let (offer_tx, offer_rx) = mpsc::channel();
        let mut offerer = rtc_with_host(5002);
        let mut state = DriverState::default();
        create_channel(&mut offerer, &mut state, &offer_tx, "teleop".to_string()).unwrap();
        let offer: String = local_description(&offer_rx)
            .lines()
            .filter(|line| !line.starts_with("a=fingerprint:"))
            .map(|line| format!("{}\r\n", line))
            .collect();

        let (answer_tx, _answer_rx) = mpsc::channel();
        let mut answerer = rtc_with_host(5003);
        let err = accept_offer(&mut answerer, &answer_tx, &offer).unwrap_err();
        assert!(matches!(err, TransportError::Rejected(_)));
        assert!(answerer.is_alive());
    }

    #[test]
    fn test_answer_without_offer_is_rejected() {
        let mut rtc = new_rtc();
        let mut state = DriverState::default();
        let sdp = "v=0\r\na=ice-ufrag:abcd\r\na=ice-pwd:secret\r\na=fingerprint:sha-256 AA:BB\r\n";
        // Either parsing or the missing offer refuses it; nothing is consumed
        assert!(matches!(
            accept_answer(&mut rtc, &mut state, sdp),
            Err(TransportError::Rejected(_))
        ));
    }
}
