use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

use crate::commands::{CommandContext, dispatch};
use crate::config::BmcConfig;
use crate::error::{Error, Result};
use crate::machine::Machine;
use crate::message::IpmiMessage;
use crate::network::{AddressBinder, BmcNetwork, IpCommandBinder, Ipv4Cidr, find_network};
use crate::protocol::{
    AUTH_TYPE_RMCPPLUS, RmcpPlusHeader, build_status_response, decode_rmcpplus,
    decode_session_wrapper, decrypt_payload, encode_rmcpplus, encode_session_wrapper,
    encrypt_payload, parse_open_session_request, parse_rakp_message_1, parse_rakp_message_3,
    payload_type, verify_integrity,
};
use crate::rmcp;
use crate::session::SessionStore;
use crate::types::BmcInfo;
use crate::users::UserTable;

/// IPMI datagrams are small; anything larger is truncated and then rejected.
const MAX_DATAGRAM_SIZE: usize = 4096;

/// Protocol state shared by every IPMI listener of a server: the user table
/// and the RMCP+ session store.
#[derive(Debug)]
pub(crate) struct Bmc {
    users: UserTable,
    sessions: SessionStore,
}

impl Bmc {
    pub(crate) fn new(users: UserTable) -> Self {
        Self {
            users,
            sessions: SessionStore::new(),
        }
    }

    /// Process one inbound datagram and produce its reply.
    ///
    /// An error means the datagram is dropped without a reply.
    pub(crate) fn handle_datagram(&self, machine: &dyn Machine, datagram: &[u8]) -> Result<Vec<u8>> {
        let (header, body) = rmcp::decode(datagram)?;
        tracing::trace!(rmcp_sequence = header.sequence, len = datagram.len(), "rmcp datagram");
        let auth_type = *body
            .first()
            .ok_or(Error::Protocol("missing session header"))?;

        let reply = if auth_type == AUTH_TYPE_RMCPPLUS {
            self.handle_rmcpplus(machine, body)?
        } else {
            self.handle_v15(machine, body)?
        };
        Ok(rmcp::encode_reply(&reply))
    }

    fn handle_v15(&self, machine: &dyn Machine, body: &[u8]) -> Result<Vec<u8>> {
        let (wrapper, message) = decode_session_wrapper(body)?;
        if wrapper.session_id != 0 {
            // v1.5 sessions are never activated.
            return Err(Error::UnknownSession(wrapper.session_id));
        }
        tracing::trace!(
            sequence = wrapper.sequence,
            authenticated = wrapper.auth_code.is_some(),
            "session-less v1.5 request"
        );

        let request = IpmiMessage::decode_request(message)?;
        let ctx = CommandContext {
            machine,
            sessions: &self.sessions,
            session_id: None,
        };
        let response = dispatch(&request, &ctx)?;
        encode_session_wrapper(&response.encode())
    }

    fn handle_rmcpplus(&self, machine: &dyn Machine, body: &[u8]) -> Result<Vec<u8>> {
        let (header, payload) = decode_rmcpplus(body)?;

        match header.payload_type {
            payload_type::OPEN_SESSION_REQUEST => {
                let request = parse_open_session_request(payload)?;
                let reply = self.sessions.open(&request).unwrap_or_else(|err| {
                    tracing::warn!(error = %err, "open session rejected");
                    build_status_response(
                        request.message_tag,
                        err.rmcpplus_status_code(),
                        request.remote_console_session_id,
                    )
                });
                encode_rmcpplus(payload_type::OPEN_SESSION_RESPONSE, 0, 0, &reply, false, None)
            }
            payload_type::RAKP_1 => {
                let rakp1 = parse_rakp_message_1(payload)?;
                let id = rakp1.managed_system_session_id;
                let reply = self.sessions.rakp1(&self.users, &rakp1).unwrap_or_else(|err| {
                    tracing::warn!(session_id = id, error = %err, "RAKP message 1 rejected");
                    build_status_response(
                        rakp1.message_tag,
                        err.rmcpplus_status_code(),
                        self.sessions.remote_console_session_id(id).unwrap_or(0),
                    )
                });
                encode_rmcpplus(payload_type::RAKP_2, 0, 0, &reply, false, None)
            }
            payload_type::RAKP_3 => {
                let rakp3 = parse_rakp_message_3(payload)?;
                let id = rakp3.managed_system_session_id;
                // A failed RAKP 3 removes the session, so look the console id up first.
                let console_id = self.sessions.remote_console_session_id(id).unwrap_or(0);
                let reply = self.sessions.rakp3(&self.users, &rakp3).unwrap_or_else(|err| {
                    tracing::warn!(session_id = id, error = %err, "RAKP message 3 rejected");
                    build_status_response(rakp3.message_tag, err.rmcpplus_status_code(), console_id)
                });
                encode_rmcpplus(payload_type::RAKP_4, 0, 0, &reply, false, None)
            }
            payload_type::IPMI => self.handle_session_message(machine, body, &header, payload),
            other => Err(Error::protocol_owned(format!(
                "unsupported RMCP+ payload type {other:#04x}"
            ))),
        }
    }

    fn handle_session_message(
        &self,
        machine: &dyn Machine,
        body: &[u8],
        header: &RmcpPlusHeader,
        payload: &[u8],
    ) -> Result<Vec<u8>> {
        if header.session_id == 0 {
            if header.authenticated || header.encrypted {
                return Err(Error::Protocol("session-less payload must be sent in the clear"));
            }
            let request = IpmiMessage::decode_request(payload)?;
            let ctx = CommandContext {
                machine,
                sessions: &self.sessions,
                session_id: None,
            };
            let response = dispatch(&request, &ctx)?;
            return encode_rmcpplus(payload_type::IPMI, 0, 0, &response.encode(), false, None);
        }

        if !(header.authenticated && header.encrypted) {
            return Err(Error::Protocol(
                "session payload must be authenticated and encrypted",
            ));
        }

        tracing::trace!(
            session_id = header.session_id,
            sequence = header.sequence,
            "rmcp+ session request"
        );
        let session = self.sessions.established(header.session_id)?;
        verify_integrity(body, header, &session.keys.k1)?;
        let aes_key = session.keys.aes_key();
        let plaintext = decrypt_payload(payload, &aes_key)?;
        let request = IpmiMessage::decode_request(&plaintext)?;

        // Allocated before dispatch: Close Session removes the session.
        let sequence = self.sessions.next_sequence(header.session_id)?;
        let ctx = CommandContext {
            machine,
            sessions: &self.sessions,
            session_id: Some(header.session_id),
        };
        let response = dispatch(&request, &ctx)?;

        let encrypted = encrypt_payload(&response.encode(), &aes_key)?;
        encode_rmcpplus(
            payload_type::IPMI,
            session.remote_console_session_id,
            sequence,
            &encrypted,
            true,
            Some(&session.keys.k1),
        )
    }
}

/// Resolves once the shutdown flag is raised (or its sender is gone).
async fn stopped(mut shutdown: watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stopped| *stopped).await;
}

/// Receive loop of one node's IPMI listener. Rejected datagrams are logged
/// and the loop keeps serving.
pub(crate) async fn serve_ipmi(
    socket: UdpSocket,
    bmc: Arc<Bmc>,
    machine: Arc<dyn Machine>,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let local = socket.local_addr()?;
    tracing::info!(%local, "ipmi listener started");

    let stop = stopped(shutdown);
    tokio::pin!(stop);
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        tokio::select! {
            _ = &mut stop => break,
            received = socket.recv_from(&mut buf) => {
                let (len, peer) = match received {
                    Ok(received) => received,
                    Err(err) => {
                        tracing::warn!(%local, error = %err, "ipmi receive failed");
                        continue;
                    }
                };
                let peer_str = peer.to_string();
                let datagram = &buf[..len];
                crate::debug::dump_hex("in", &peer_str, datagram);

                match bmc.handle_datagram(&*machine, datagram) {
                    Ok(reply) => {
                        crate::debug::dump_hex("out", &peer_str, &reply);
                        if let Err(err) = socket.send_to(&reply, peer).await {
                            tracing::warn!(peer = %peer_str, error = %err, "ipmi reply failed");
                        }
                    }
                    Err(err) => crate::observe::record_rejected(&peer_str, &err),
                }
            }
        }
    }

    tracing::info!(%local, "ipmi listener stopped");
    Ok(())
}

/// Serve the Redfish API of one node until shutdown.
pub(crate) async fn serve_redfish(
    listener: TcpListener,
    machine: Arc<dyn Machine>,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let local = listener.local_addr()?;
    tracing::info!(%local, "redfish listener started");
    axum::serve(listener, crate::redfish::router(machine))
        .with_graceful_shutdown(stopped(shutdown))
        .await?;
    tracing::info!(%local, "redfish listener stopped");
    Ok(())
}

/// Addresses a node's listeners ended up bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeEndpoints {
    /// UDP address of the IPMI listener.
    pub ipmi: SocketAddr,
    /// TCP address of the Redfish listener.
    pub redfish: SocketAddr,
}

/// Stops a running [`BmcServer`] and every listener it started.
#[derive(Debug, Clone)]
pub struct ShutdownHandle(Arc<watch::Sender<bool>>);

impl ShutdownHandle {
    /// Raise the shutdown flag. Idempotent.
    pub fn shutdown(&self) {
        self.0.send_replace(true);
    }
}

/// Starts BMC listeners for nodes as their registrations arrive.
pub struct BmcServer {
    config: BmcConfig,
    bmc: Arc<Bmc>,
    machines: RwLock<HashMap<String, Arc<dyn Machine>>>,
    binder: Arc<dyn AddressBinder>,
    shutdown: Arc<watch::Sender<bool>>,
    tasks: Mutex<JoinSet<Result<()>>>,
}

impl BmcServer {
    /// Create a [`BmcServerBuilder`].
    pub fn builder() -> BmcServerBuilder {
        BmcServerBuilder::new()
    }

    /// Register the machine a node serial refers to.
    pub fn add_machine(&self, serial: impl Into<String>, machine: Arc<dyn Machine>) {
        self.machines.write().insert(serial.into(), machine);
    }

    /// Handle for stopping the server from another task.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(Arc::clone(&self.shutdown))
    }

    /// Bind a node's BMC address and start its IPMI and Redfish listeners.
    pub async fn start_node(&self, info: &BmcInfo) -> Result<NodeEndpoints> {
        let address: Ipv4Addr = info
            .bmc_address
            .parse()
            .map_err(|_| Error::InvalidArgument("invalid BMC address"))?;
        let machine = self
            .machines
            .read()
            .get(&info.serial)
            .cloned()
            .ok_or_else(|| Error::UnknownSerial(info.serial.clone()))?;

        let network = find_network(&self.config.networks, address)?;
        self.binder
            .bind(&network.bridge, address, network.cidr.prefix_len())
            .await?;

        let socket = UdpSocket::bind((address, self.config.ipmi_port)).await?;
        let listener = TcpListener::bind((address, self.config.redfish_port)).await?;
        let endpoints = NodeEndpoints {
            ipmi: socket.local_addr()?,
            redfish: listener.local_addr()?,
        };

        let mut tasks = self.tasks.lock();
        tasks.spawn(serve_ipmi(
            socket,
            Arc::clone(&self.bmc),
            Arc::clone(&machine),
            self.shutdown.subscribe(),
        ));
        tasks.spawn(serve_redfish(listener, machine, self.shutdown.subscribe()));

        tracing::info!(
            serial = %info.serial,
            ipmi = %endpoints.ipmi,
            redfish = %endpoints.redfish,
            "bmc started"
        );
        Ok(endpoints)
    }

    /// Consume registration events until shutdown, then wait for every
    /// listener to stop.
    ///
    /// A node whose BMC cannot start is logged and skipped; the others keep
    /// running.
    pub async fn run(self, mut events: mpsc::Receiver<BmcInfo>) -> Result<()> {
        let stop = stopped(self.shutdown.subscribe());
        tokio::pin!(stop);

        loop {
            tokio::select! {
                _ = &mut stop => break,
                event = events.recv() => match event {
                    Some(info) => {
                        if let Err(err) = self.start_node(&info).await {
                            tracing::error!(
                                serial = %info.serial,
                                address = %info.bmc_address,
                                error = %err,
                                "failed to start bmc"
                            );
                        }
                    }
                    None => {
                        // No more registrations; keep serving.
                        (&mut stop).await;
                        break;
                    }
                },
            }
        }

        let mut tasks = std::mem::take(&mut *self.tasks.lock());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => tracing::warn!(error = %err, "bmc listener failed"),
                Err(err) => tracing::warn!(error = %err, "bmc listener panicked"),
            }
        }
        Ok(())
    }
}

/// Builder for [`BmcServer`].
pub struct BmcServerBuilder {
    config: BmcConfig,
    binder: Option<Arc<dyn AddressBinder>>,
    machines: Vec<(String, Arc<dyn Machine>)>,
}

impl BmcServerBuilder {
    /// Create a builder with [`BmcConfig::default`].
    pub fn new() -> Self {
        Self {
            config: BmcConfig::default(),
            binder: None,
            machines: Vec::new(),
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: BmcConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the credential accepted by RAKP.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.username = username.into();
        self.config.password = password.into();
        self
    }

    /// Set the UDP port of IPMI listeners (0 picks an ephemeral port).
    pub fn ipmi_port(mut self, port: u16) -> Self {
        self.config.ipmi_port = port;
        self
    }

    /// Set the TCP port of Redfish listeners (0 picks an ephemeral port).
    pub fn redfish_port(mut self, port: u16) -> Self {
        self.config.redfish_port = port;
        self
    }

    /// Add a BMC network.
    pub fn network(mut self, bridge: impl Into<String>, cidr: Ipv4Cidr) -> Self {
        self.config.networks.push(BmcNetwork {
            bridge: bridge.into(),
            cidr,
        });
        self
    }

    /// Use a custom [`AddressBinder`] instead of [`IpCommandBinder`].
    pub fn binder(mut self, binder: impl AddressBinder + 'static) -> Self {
        self.binder = Some(Arc::new(binder));
        self
    }

    /// Register the machine of a node serial.
    pub fn machine(mut self, serial: impl Into<String>, machine: Arc<dyn Machine>) -> Self {
        self.machines.push((serial.into(), machine));
        self
    }

    /// Build the [`BmcServer`].
    pub fn build(self) -> Result<BmcServer> {
        if self.config.username.is_empty() {
            return Err(Error::InvalidArgument("username is required"));
        }
        if self.config.username.len() > 16 {
            return Err(Error::InvalidArgument("username longer than 16 bytes"));
        }

        let users = UserTable::with_user(
            self.config.username.as_bytes(),
            self.config.password.as_bytes(),
        );
        let binder: Arc<dyn AddressBinder> = match self.binder {
            Some(binder) => binder,
            None => Arc::new(IpCommandBinder),
        };
        let (shutdown, _) = watch::channel(false);

        Ok(BmcServer {
            bmc: Arc::new(Bmc::new(users)),
            machines: RwLock::new(self.machines.into_iter().collect()),
            binder,
            shutdown: Arc::new(shutdown),
            tasks: Mutex::new(JoinSet::new()),
            config: self.config,
        })
    }
}

impl Default for BmcServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SessionKeys;
    use crate::machine::SimulatedMachine;
    use crate::protocol::{
        console, rakp3_key_exchange_auth_code, rakp4_integrity_check_value,
        session_integrity_key,
    };

    const CONSOLE_ID: u32 = 0xC0C0_0042;
    const ROLE: u8 = 0x14;

    fn bmc() -> Bmc {
        Bmc::new(UserTable::with_user("cybozu", "cybozu"))
    }

    fn rmcpplus_datagram(payload_type_num: u8, payload: &[u8]) -> Vec<u8> {
        rmcp::encode_reply(
            &encode_rmcpplus(payload_type_num, 0, 0, payload, false, None).expect("encode"),
        )
    }

    fn reply_payload(reply: &[u8], expected_type: u8) -> Vec<u8> {
        let (_, body) = rmcp::decode(reply).expect("rmcp");
        let (header, payload) = decode_rmcpplus(body).expect("rmcp+");
        assert_eq!(header.payload_type, expected_type);
        payload.to_vec()
    }

    #[derive(Debug)]
    struct Console {
        managed_id: u32,
        keys: SessionKeys,
        seq: u32,
    }

    fn handshake(bmc: &Bmc, machine: &dyn Machine, password: &[u8]) -> Result<Console> {
        let open = console::open_session_request(1, 0x04, CONSOLE_ID);
        let reply = bmc.handle_datagram(
            machine,
            &rmcpplus_datagram(payload_type::OPEN_SESSION_REQUEST, &open),
        )?;
        let response = reply_payload(&reply, payload_type::OPEN_SESSION_RESPONSE);
        assert_eq!(response.len(), 36);
        let managed_id = u32::from_le_bytes(response[8..12].try_into().expect("id"));
        assert_ne!(managed_id, 0);

        let console_random = [0x7Eu8; 16];
        let rakp1 = console::rakp_message_1(2, managed_id, &console_random, ROLE, b"cybozu");
        let reply = bmc.handle_datagram(machine, &rmcpplus_datagram(payload_type::RAKP_1, &rakp1))?;
        let rakp2 = reply_payload(&reply, payload_type::RAKP_2);
        assert_eq!(rakp2[1], 0x00);
        let managed_random: [u8; 16] = rakp2[8..24].try_into().expect("random");
        let guid: [u8; 16] = rakp2[24..40].try_into().expect("guid");

        let code =
            rakp3_key_exchange_auth_code(password, &managed_random, CONSOLE_ID, ROLE, b"cybozu")?;
        let rakp3 = console::rakp_message_3(3, managed_id, &code);
        let reply = bmc.handle_datagram(machine, &rmcpplus_datagram(payload_type::RAKP_3, &rakp3))?;
        let rakp4 = reply_payload(&reply, payload_type::RAKP_4);
        if rakp4[1] != 0x00 {
            return Err(Error::AuthenticationFailed("rakp4 status"));
        }

        let sik = session_integrity_key(password, &console_random, &managed_random, ROLE, b"cybozu")?;
        let icv = rakp4_integrity_check_value(&sik, &console_random, managed_id, &guid)?;
        assert_eq!(&rakp4[8..20], &icv);

        Ok(Console {
            managed_id,
            keys: SessionKeys::derive(sik)?,
            seq: 1,
        })
    }

    fn request(netfn: u8, cmd: u8, data: &[u8]) -> IpmiMessage {
        IpmiMessage {
            target_address: 0x20,
            target_lun: netfn << 2,
            source_address: 0x81,
            source_lun: 0x04,
            command: cmd,
            completion_code: None,
            data: data.to_vec(),
        }
    }

    fn send(
        bmc: &Bmc,
        machine: &dyn Machine,
        console: &mut Console,
        msg: &IpmiMessage,
    ) -> Result<IpmiMessage> {
        let aes_key = console.keys.aes_key();
        let encrypted = encrypt_payload(&msg.encode(), &aes_key)?;
        let packet = encode_rmcpplus(
            payload_type::IPMI,
            console.managed_id,
            console.seq,
            &encrypted,
            true,
            Some(&console.keys.k1),
        )?;
        console.seq += 1;

        let reply = bmc.handle_datagram(machine, &rmcp::encode_reply(&packet))?;
        let (_, body) = rmcp::decode(&reply)?;
        let (header, payload) = decode_rmcpplus(body)?;
        assert_eq!(header.session_id, CONSOLE_ID);
        verify_integrity(body, &header, &console.keys.k1)?;
        let plaintext = decrypt_payload(payload, &aes_key)?;
        IpmiMessage::decode_response(&plaintext)
    }

    #[test]
    fn handshake_then_chassis_control_powers_machine_on() {
        let bmc = bmc();
        let machine = SimulatedMachine::default();
        let mut console = handshake(&bmc, &machine, b"cybozu").expect("handshake");

        let response = send(&bmc, &machine, &mut console, &request(0x00, 0x02, &[0x01]))
            .expect("chassis control");
        assert_eq!(response.completion_code, Some(0x00));
        assert!(machine.is_running());

        let response =
            send(&bmc, &machine, &mut console, &request(0x00, 0x01, &[])).expect("status");
        assert_eq!(response.data[0] & 0x01, 0x01);

        let response = send(&bmc, &machine, &mut console, &request(0x00, 0x02, &[0x01]))
            .expect("chassis control");
        assert_eq!(response.completion_code, Some(0xD5));
        assert!(machine.is_running());
    }

    #[test]
    fn close_session_invalidates_session() {
        let bmc = bmc();
        let machine = SimulatedMachine::default();
        let mut console = handshake(&bmc, &machine, b"cybozu").expect("handshake");

        let id = console.managed_id.to_le_bytes();
        let response =
            send(&bmc, &machine, &mut console, &request(0x06, 0x3C, &id)).expect("close");
        assert_eq!(response.completion_code, Some(0x00));

        let err = send(&bmc, &machine, &mut console, &request(0x00, 0x01, &[])).unwrap_err();
        assert!(matches!(err, Error::UnknownSession(_)));
    }

    #[test]
    fn set_session_privilege_echoes_level() {
        let bmc = bmc();
        let machine = SimulatedMachine::default();
        let mut console = handshake(&bmc, &machine, b"cybozu").expect("handshake");

        let response =
            send(&bmc, &machine, &mut console, &request(0x06, 0x3B, &[0x03])).expect("set priv");
        assert_eq!(response.completion_code, Some(0x00));
        assert_eq!(response.data, vec![0x03]);
    }

    #[test]
    fn wrong_password_gets_rakp4_error_status() {
        let bmc = bmc();
        let machine = SimulatedMachine::default();
        let err = handshake(&bmc, &machine, b"wrong").unwrap_err();
        assert!(matches!(err, Error::AuthenticationFailed("rakp4 status")));
    }

    #[test]
    fn tampered_packet_is_rejected() {
        let bmc = bmc();
        let machine = SimulatedMachine::default();
        let console = handshake(&bmc, &machine, b"cybozu").expect("handshake");

        let encrypted =
            encrypt_payload(&request(0x00, 0x02, &[0x01]).encode(), &console.keys.aes_key())
                .expect("encrypt");
        let mut packet = encode_rmcpplus(
            payload_type::IPMI,
            console.managed_id,
            1,
            &encrypted,
            true,
            Some(&console.keys.k1),
        )
        .expect("encode");
        packet[20] ^= 0xFF;

        let err = bmc
            .handle_datagram(&machine, &rmcp::encode_reply(&packet))
            .unwrap_err();
        assert!(matches!(err, Error::AuthenticationFailed(_)));
        assert!(!machine.is_running());
    }

    #[test]
    fn unknown_user_gets_rakp2_error_status() {
        let bmc = bmc();
        let machine = SimulatedMachine::default();
        let open = console::open_session_request(1, 0x04, CONSOLE_ID);
        let reply = bmc
            .handle_datagram(
                &machine,
                &rmcpplus_datagram(payload_type::OPEN_SESSION_REQUEST, &open),
            )
            .expect("open");
        let response = reply_payload(&reply, payload_type::OPEN_SESSION_RESPONSE);
        let managed_id = u32::from_le_bytes(response[8..12].try_into().expect("id"));

        let rakp1 = console::rakp_message_1(2, managed_id, &[0u8; 16], ROLE, b"root");
        let reply = bmc
            .handle_datagram(&machine, &rmcpplus_datagram(payload_type::RAKP_1, &rakp1))
            .expect("rakp1");
        let rakp2 = reply_payload(&reply, payload_type::RAKP_2);
        assert_eq!(rakp2.len(), 8);
        assert_eq!(rakp2[1], 0x0D);
        assert_eq!(&rakp2[4..8], &CONSOLE_ID.to_le_bytes());
    }

    #[test]
    fn v15_channel_auth_capabilities_without_session() {
        let bmc = bmc();
        let machine = SimulatedMachine::default();
        let message = request(0x06, 0x38, &[0x8E, 0x04]).encode();
        let datagram = rmcp::encode_reply(&encode_session_wrapper(&message).expect("wrap"));

        let reply = bmc.handle_datagram(&machine, &datagram).expect("reply");
        let (_, body) = rmcp::decode(&reply).expect("rmcp");
        let (_, message) = decode_session_wrapper(body).expect("v1.5");
        let response = IpmiMessage::decode_response(message).expect("response");
        assert_eq!(response.completion_code, Some(0x00));
        assert_eq!(response.netfn(), 0x07);
        assert_eq!(response.data[1] & 0x80, 0x80);
    }

    #[test]
    fn v15_power_control_is_dropped() {
        let bmc = bmc();
        let machine = SimulatedMachine::default();
        let message = request(0x00, 0x02, &[0x01]).encode();
        let datagram = rmcp::encode_reply(&encode_session_wrapper(&message).expect("wrap"));
        assert!(bmc.handle_datagram(&machine, &datagram).is_err());
        assert!(!machine.is_running());
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let bmc = bmc();
        let machine = SimulatedMachine::default();
        let mut message = request(0x06, 0x38, &[0x8E, 0x04]).encode();
        message[2] ^= 0x01;
        let datagram = rmcp::encode_reply(&encode_session_wrapper(&message).expect("wrap"));
        assert!(matches!(
            bmc.handle_datagram(&machine, &datagram).unwrap_err(),
            Error::Protocol("invalid IPMI header checksum")
        ));
    }
}
