use serde::{Deserialize, Serialize};

/// Power state reported by a [`crate::Machine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerState {
    /// Powered on.
    On,
    /// Powered off.
    Off,
    /// Power-on in progress.
    PoweringOn,
    /// Power-off in progress.
    PoweringOff,
}

impl PowerState {
    /// `true` for `On` and `PoweringOn`.
    pub fn is_on(self) -> bool {
        matches!(self, Self::On | Self::PoweringOn)
    }

    /// `true` for `Off` and `PoweringOff`.
    pub fn is_off(self) -> bool {
        !self.is_on()
    }
}

/// The privilege level carried by RAKP and `Set Session Privilege Level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PrivilegeLevel {
    /// Callback privilege.
    Callback = 0x01,
    /// User privilege.
    User = 0x02,
    /// Operator privilege.
    Operator = 0x03,
    /// Administrator privilege.
    Administrator = 0x04,
    /// OEM-defined privilege.
    Oem = 0x05,
}

impl PrivilegeLevel {
    pub(crate) fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decode the low nibble of a role/privilege byte.
    pub(crate) fn from_u8(value: u8) -> Option<Self> {
        match value & 0x0F {
            0x01 => Some(Self::Callback),
            0x02 => Some(Self::User),
            0x03 => Some(Self::Operator),
            0x04 => Some(Self::Administrator),
            0x05 => Some(Self::Oem),
            _ => None,
        }
    }
}

/// `Chassis Control` operations (IPMI v2.0 Table 28-4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChassisControl {
    /// Power down the system.
    PowerDown,
    /// Power up the system.
    PowerUp,
    /// Power cycle the system.
    PowerCycle,
    /// Hard reset the system.
    HardReset,
    /// Pulse diagnostic interrupt.
    PulseDiagnostic,
    /// ACPI soft shutdown.
    AcpiSoft,
}

impl ChassisControl {
    pub(crate) fn from_u8(value: u8) -> Option<Self> {
        match value & 0x0F {
            0x00 => Some(Self::PowerDown),
            0x01 => Some(Self::PowerUp),
            0x02 => Some(Self::PowerCycle),
            0x03 => Some(Self::HardReset),
            0x04 => Some(Self::PulseDiagnostic),
            0x05 => Some(Self::AcpiSoft),
            _ => None,
        }
    }
}

/// IPMI completion codes returned by this emulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CompletionCode {
    /// Command completed normally.
    Ok = 0x00,
    /// Command not supported in present state.
    CouldNotExecuteCommand = 0xD5,
}

impl CompletionCode {
    pub(crate) fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Registration record announced once per node when its guest reports the
/// address assigned on the BMC network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BmcInfo {
    /// Node serial, used to find the node's machine handle.
    pub serial: String,
    /// Address the node's BMC listeners bind to.
    pub bmc_address: String,
}
