use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::RngCore;

use crate::crypto::{SessionKeys, ct_eq, random_bytes};
use crate::error::{Error, Result};
use crate::protocol::{
    OpenSessionRequest, RakpMessage1, RakpMessage3, build_open_session_response,
    build_rakp_message_2, build_rakp_message_4, rakp2_key_exchange_auth_code,
    rakp3_key_exchange_auth_code, rakp4_integrity_check_value, session_integrity_key,
};
use crate::types::PrivilegeLevel;
use crate::users::UserTable;

/// Handshake progress of a live session. Sessions that do not exist (never
/// opened, closed, or failed authentication) are simply absent from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionState {
    /// Open Session Response sent, waiting for RAKP 1.
    OpenRequested,
    /// RAKP 2 sent, waiting for RAKP 3.
    Rakp2Sent,
    /// RAKP 4 sent; keys derived.
    Established,
}

#[derive(Debug)]
struct RmcpPlusSession {
    remote_console_session_id: u32,
    max_privilege: u8,
    state: SessionState,
    remote_console_random: [u8; 16],
    managed_system_random: [u8; 16],
    managed_system_guid: [u8; 16],
    role: u8,
    username: Vec<u8>,
    privilege: u8,
    keys: Option<SessionKeys>,
    next_out_seq: u32,
    opened_at: Instant,
}

/// Snapshot of an established session, handed to the payload codec and the
/// command layer.
#[derive(Debug, Clone)]
pub(crate) struct ActiveSession {
    pub remote_console_session_id: u32,
    pub privilege: u8,
    pub keys: SessionKeys,
}

/// Live sessions a store holds before Open Session is refused.
const MAX_SESSIONS: usize = 256;
/// Unfinished handshakes older than this are reclaimed.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(60);

/// RMCP+ sessions of every BMC served by one server, keyed by the managed
/// system session id.
#[derive(Debug)]
pub(crate) struct SessionStore {
    sessions: Mutex<HashMap<u32, RmcpPlusSession>>,
    max_sessions: usize,
    handshake_timeout: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_limits(MAX_SESSIONS, HANDSHAKE_TIMEOUT)
    }
}

impl SessionStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_limits(max_sessions: usize, handshake_timeout: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_sessions,
            handshake_timeout,
        }
    }

    /// Handle an Open Session Request: allocate a fresh managed system session
    /// id and answer with the RAKP-HMAC-SHA1 / HMAC-SHA1-96 / AES-CBC-128 suite.
    pub(crate) fn open(&self, request: &OpenSessionRequest) -> Result<Vec<u8>> {
        let max_privilege = match request.requested_privilege {
            0x00 => PrivilegeLevel::Administrator.as_u8(),
            level => PrivilegeLevel::from_u8(level)
                .ok_or(Error::InvalidArgument("invalid requested privilege"))?
                .as_u8(),
        };

        let mut sessions = self.sessions.lock();
        let now = Instant::now();
        let before = sessions.len();
        sessions.retain(|_, s| {
            s.state == SessionState::Established
                || now.duration_since(s.opened_at) < self.handshake_timeout
        });
        if sessions.len() < before {
            tracing::debug!(reclaimed = before - sessions.len(), "stale rmcp+ handshakes dropped");
        }
        if sessions.len() >= self.max_sessions {
            return Err(Error::SessionLimit(self.max_sessions));
        }

        let mut rng = rand::rng();
        let id = loop {
            let candidate = rng.next_u32();
            if candidate != 0 && !sessions.contains_key(&candidate) {
                break candidate;
            }
        };

        sessions.insert(
            id,
            RmcpPlusSession {
                remote_console_session_id: request.remote_console_session_id,
                max_privilege,
                state: SessionState::OpenRequested,
                remote_console_random: [0u8; 16],
                managed_system_random: [0u8; 16],
                managed_system_guid: [0u8; 16],
                role: 0,
                username: Vec::new(),
                privilege: max_privilege,
                keys: None,
                next_out_seq: 1,
                opened_at: now,
            },
        );
        tracing::debug!(
            managed_session_id = id,
            remote_session_id = request.remote_console_session_id,
            proposed_auth = request.auth_algorithm,
            proposed_integrity = request.integrity_algorithm,
            proposed_confidentiality = request.confidentiality_algorithm,
            "rmcp+ session opened"
        );

        Ok(build_open_session_response(
            request.message_tag,
            max_privilege,
            request.remote_console_session_id,
            id,
        ))
    }

    /// Handle RAKP Message 1 and produce RAKP Message 2.
    ///
    /// Nothing is recorded unless the session exists and the user is known.
    pub(crate) fn rakp1(&self, users: &UserTable, msg: &RakpMessage1) -> Result<Vec<u8>> {
        let mut sessions = self.sessions.lock();
        let session = sessions
            .get_mut(&msg.managed_system_session_id)
            .ok_or(Error::UnknownSession(msg.managed_system_session_id))?;
        if session.state == SessionState::Established {
            return Err(Error::Protocol("RAKP message 1 on an established session"));
        }

        let requested = PrivilegeLevel::from_u8(msg.role)
            .ok_or(Error::InvalidArgument("invalid requested role"))?;
        if requested.as_u8() > session.max_privilege {
            return Err(Error::InvalidArgument("role above negotiated maximum"));
        }

        let password = users.password(&msg.username).ok_or(Error::UserNotFound)?;
        let user_key = password.to_key_sha1();

        let managed_system_random: [u8; 16] = random_bytes();
        let managed_system_guid: [u8; 16] = random_bytes();
        let auth_code = rakp2_key_exchange_auth_code(
            &*user_key,
            session.remote_console_session_id,
            msg.managed_system_session_id,
            &msg.remote_console_random,
            &managed_system_random,
            &managed_system_guid,
            msg.role,
            &msg.username,
        )?;

        session.remote_console_random = msg.remote_console_random;
        session.managed_system_random = managed_system_random;
        session.managed_system_guid = managed_system_guid;
        session.role = msg.role;
        session.privilege = requested.as_u8();
        session.username.clone_from(&msg.username);
        session.state = SessionState::Rakp2Sent;

        Ok(build_rakp_message_2(
            msg.message_tag,
            session.remote_console_session_id,
            &managed_system_random,
            &managed_system_guid,
            &auth_code,
        ))
    }

    /// Handle RAKP Message 3: authenticate the console, derive SIK/K1/K2 and
    /// produce RAKP Message 4.
    ///
    /// A failed handshake removes the session; the console has to start over.
    pub(crate) fn rakp3(&self, users: &UserTable, msg: &RakpMessage3) -> Result<Vec<u8>> {
        let mut sessions = self.sessions.lock();
        let id = msg.managed_system_session_id;
        let session = sessions.get_mut(&id).ok_or(Error::UnknownSession(id))?;
        if session.state != SessionState::Rakp2Sent {
            return Err(Error::Protocol("RAKP message 3 out of order"));
        }

        let outcome = Self::authenticate(session, users, msg, id);
        match outcome {
            Ok(icv) => {
                tracing::debug!(managed_session_id = id, "rmcp+ session established");
                Ok(build_rakp_message_4(
                    msg.message_tag,
                    session.remote_console_session_id,
                    &icv,
                ))
            }
            Err(err) => {
                sessions.remove(&id);
                Err(err)
            }
        }
    }

    fn authenticate(
        session: &mut RmcpPlusSession,
        users: &UserTable,
        msg: &RakpMessage3,
        id: u32,
    ) -> Result<[u8; 12]> {
        let Some(auth_code) = msg.key_exchange_auth_code else {
            tracing::debug!(
                managed_session_id = id,
                status = msg.status_code,
                "console aborted the handshake"
            );
            return Err(Error::AuthenticationFailed("console aborted the handshake"));
        };

        let password = users.password(&session.username).ok_or(Error::UserNotFound)?;
        let user_key = password.to_key_sha1();

        let expected = rakp3_key_exchange_auth_code(
            &*user_key,
            &session.managed_system_random,
            session.remote_console_session_id,
            session.role,
            &session.username,
        )?;
        if !ct_eq(&expected, &auth_code) {
            return Err(Error::AuthenticationFailed(
                "RAKP message 3 authentication code mismatch",
            ));
        }

        // One-key login: Kg is the user key.
        let sik = session_integrity_key(
            &*user_key,
            &session.remote_console_random,
            &session.managed_system_random,
            session.role,
            &session.username,
        )?;
        let icv = rakp4_integrity_check_value(
            &sik,
            &session.remote_console_random,
            id,
            &session.managed_system_guid,
        )?;

        session.keys = Some(SessionKeys::derive(sik)?);
        session.state = SessionState::Established;
        Ok(icv)
    }

    /// Remote console session id of a live session, for error responses.
    pub(crate) fn remote_console_session_id(&self, id: u32) -> Option<u32> {
        self.sessions
            .lock()
            .get(&id)
            .map(|s| s.remote_console_session_id)
    }

    /// Look up an established session.
    pub(crate) fn established(&self, id: u32) -> Result<ActiveSession> {
        let sessions = self.sessions.lock();
        let session = sessions.get(&id).ok_or(Error::UnknownSession(id))?;
        match (&session.keys, session.state) {
            (Some(keys), SessionState::Established) => Ok(ActiveSession {
                remote_console_session_id: session.remote_console_session_id,
                privilege: session.privilege,
                keys: keys.clone(),
            }),
            _ => Err(Error::UnknownSession(id)),
        }
    }

    /// Allocate the next outbound session sequence number.
    pub(crate) fn next_sequence(&self, id: u32) -> Result<u32> {
        let mut sessions = self.sessions.lock();
        let session = sessions.get_mut(&id).ok_or(Error::UnknownSession(id))?;
        let current = session.next_out_seq;
        session.next_out_seq = session.next_out_seq.wrapping_add(1).max(1);
        Ok(current)
    }

    /// Change the operating privilege of an established session.
    pub(crate) fn set_privilege(&self, id: u32, level: PrivilegeLevel) -> Result<u8> {
        let mut sessions = self.sessions.lock();
        let session = sessions.get_mut(&id).ok_or(Error::UnknownSession(id))?;
        if level.as_u8() > session.max_privilege {
            return Err(Error::InvalidArgument("privilege above negotiated maximum"));
        }
        session.privilege = level.as_u8();
        Ok(session.privilege)
    }

    /// Remove a session. Later messages referencing it are rejected.
    pub(crate) fn close(&self, id: u32) -> Result<()> {
        self.sessions
            .lock()
            .remove(&id)
            .map(|_| ())
            .ok_or(Error::UnknownSession(id))
    }

    #[cfg(test)]
    pub(crate) fn state(&self, id: u32) -> Option<SessionState> {
        self.sessions.lock().get(&id).map(|s| s.state)
    }
}
