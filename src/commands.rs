//! IPMI command layer: NetFn/command identification and the handlers the
//! emulator implements.

use std::time::Instant;

use crate::error::{Error, Result};
use crate::machine::{self, Machine};
use crate::message::IpmiMessage;
use crate::session::SessionStore;
use crate::types::{ChassisControl, CompletionCode, PrivilegeLevel};

/// Network functions with at least one implemented command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NetFn {
    Chassis,
    App,
}

impl NetFn {
    pub(crate) const CHASSIS: u8 = 0x00;
    pub(crate) const APP: u8 = 0x06;

    fn from_u8(value: u8) -> Option<Self> {
        match value {
            Self::CHASSIS => Some(Self::Chassis),
            Self::APP => Some(Self::App),
            _ => None,
        }
    }
}

/// Implemented commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    /// `Get Chassis Status` (Chassis NetFn, cmd 0x01).
    GetChassisStatus,
    /// `Chassis Control` (Chassis NetFn, cmd 0x02).
    ChassisControl,
    /// `Get Channel Authentication Capabilities` (App NetFn, cmd 0x38).
    GetChannelAuthCapabilities,
    /// `Set Session Privilege Level` (App NetFn, cmd 0x3B).
    SetSessionPrivilegeLevel,
    /// `Close Session` (App NetFn, cmd 0x3C).
    CloseSession,
}

impl Command {
    pub(crate) fn identify(netfn: u8, cmd: u8) -> Result<Self> {
        let unsupported = Error::UnsupportedCommand { netfn, cmd };
        match (NetFn::from_u8(netfn).ok_or(unsupported)?, cmd) {
            (NetFn::Chassis, 0x01) => Ok(Self::GetChassisStatus),
            (NetFn::Chassis, 0x02) => Ok(Self::ChassisControl),
            (NetFn::App, 0x38) => Ok(Self::GetChannelAuthCapabilities),
            (NetFn::App, 0x3B) => Ok(Self::SetSessionPrivilegeLevel),
            (NetFn::App, 0x3C) => Ok(Self::CloseSession),
            _ => Err(Error::UnsupportedCommand { netfn, cmd }),
        }
    }

    /// Commands a console may send before it has a session.
    fn allowed_without_session(self) -> bool {
        matches!(self, Self::GetChannelAuthCapabilities)
    }
}

/// What a command may touch while it runs.
pub(crate) struct CommandContext<'a> {
    pub machine: &'a dyn Machine,
    pub sessions: &'a SessionStore,
    /// Managed system session id the request arrived on, if any.
    pub session_id: Option<u32>,
}

/// Run one request and build its response.
///
/// Handler failures become a `CouldNotExecuteCommand` response. Unsupported
/// commands, and session-bound commands sent outside a session, are errors:
/// the caller drops the datagram.
pub(crate) fn dispatch(request: &IpmiMessage, ctx: &CommandContext<'_>) -> Result<IpmiMessage> {
    let start = Instant::now();
    let netfn = request.netfn();
    let command = Command::identify(netfn, request.command)?;
    if ctx.session_id.is_none() && !command.allowed_without_session() {
        return Err(Error::Protocol("command requires an established session"));
    }

    let (completion_code, data) = match handle(command, &request.data, ctx) {
        Ok(data) => (CompletionCode::Ok, data),
        Err(err) => {
            tracing::warn!(?command, error = %err, "ipmi command failed");
            (CompletionCode::CouldNotExecuteCommand, Vec::new())
        }
    };

    crate::observe::record_command(
        netfn,
        request.command,
        start.elapsed(),
        completion_code.as_u8(),
    );
    Ok(request.response(completion_code.as_u8(), data))
}

fn handle(command: Command, data: &[u8], ctx: &CommandContext<'_>) -> Result<Vec<u8>> {
    match command {
        Command::GetChassisStatus => Ok(chassis_status(ctx.machine)),
        Command::ChassisControl => {
            let control = data
                .first()
                .and_then(|&b| ChassisControl::from_u8(b))
                .ok_or(Error::InvalidArgument("invalid chassis control request"))?;
            chassis_control(ctx.machine, control)?;
            Ok(Vec::new())
        }
        Command::GetChannelAuthCapabilities => channel_auth_capabilities(data),
        Command::SetSessionPrivilegeLevel => {
            let id = ctx
                .session_id
                .ok_or(Error::Protocol("no session to change privilege of"))?;
            set_session_privilege_level(ctx.sessions, id, data)
        }
        Command::CloseSession => {
            let raw: [u8; 4] = data
                .get(..4)
                .ok_or(Error::InvalidArgument("close session request too short"))?
                .try_into()
                .map_err(|_| Error::InvalidArgument("invalid session id"))?;
            ctx.sessions.close(u32::from_le_bytes(raw))?;
            Ok(Vec::new())
        }
    }
}

fn chassis_status(machine: &dyn Machine) -> Vec<u8> {
    let power_on = u8::from(machine.power_status().is_on());
    // current power state, last power event, misc chassis state
    vec![power_on, 0x00, 0x00]
}

fn chassis_control(machine: &dyn Machine, control: ChassisControl) -> Result<()> {
    tracing::info!(?control, "chassis control");
    match control {
        ChassisControl::PowerUp => machine::power_on(machine),
        ChassisControl::PowerDown | ChassisControl::AcpiSoft => machine::power_off(machine),
        ChassisControl::PowerCycle | ChassisControl::HardReset => machine::power_cycle(machine),
        ChassisControl::PulseDiagnostic => {
            Err(Error::InvalidArgument("diagnostic interrupt is not emulated"))
        }
    }
}

fn channel_auth_capabilities(data: &[u8]) -> Result<Vec<u8>> {
    let channel = *data
        .first()
        .ok_or(Error::InvalidArgument("channel auth capabilities request too short"))?;
    let v2_requested = channel & 0x80 != 0;

    // 0x0E means "the channel this request arrived on".
    let channel_number = match channel & 0x0F {
        0x0E => 0x01,
        n => n,
    };

    let mut auth_types = 0x01; // none
    let mut connections = 0x00;
    if v2_requested {
        auth_types |= 0x80; // extended capabilities available
        connections |= 0x02; // IPMI v2.0
    }

    Ok(vec![
        channel_number,
        auth_types,
        0x04, // non-null user names enabled
        connections,
        0x00,
        0x00,
        0x00,
        0x00,
    ])
}

fn set_session_privilege_level(sessions: &SessionStore, id: u32, data: &[u8]) -> Result<Vec<u8>> {
    let requested = *data
        .first()
        .ok_or(Error::InvalidArgument("set session privilege request too short"))?;

    let level = match requested & 0x0F {
        // No change: report the current level.
        0x00 => sessions.established(id)?.privilege,
        _ => {
            let level = PrivilegeLevel::from_u8(requested)
                .ok_or(Error::InvalidArgument("invalid privilege level"))?;
            sessions.set_privilege(id, level)?
        }
    };
    Ok(vec![level])
}
