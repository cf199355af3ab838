use core::fmt;

use serde::Deserialize;

use crate::network::BmcNetwork;

/// Default credential accepted by RAKP.
pub const DEFAULT_USERNAME: &str = "cybozu";
/// Default password of [`DEFAULT_USERNAME`].
pub const DEFAULT_PASSWORD: &str = "cybozu";
/// RMCP port.
pub const DEFAULT_IPMI_PORT: u16 = 623;
/// Redfish port.
pub const DEFAULT_REDFISH_PORT: u16 = 443;

/// Settings shared by every BMC a [`crate::BmcServer`] starts.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct BmcConfig {
    /// User name accepted by RAKP.
    pub username: String,
    /// Password of `username`.
    pub password: String,
    /// UDP port of the IPMI listener.
    pub ipmi_port: u16,
    /// TCP port of the Redfish listener.
    pub redfish_port: u16,
    /// Networks BMC addresses may belong to.
    pub networks: Vec<BmcNetwork>,
}

impl Default for BmcConfig {
    fn default() -> Self {
        Self {
            username: DEFAULT_USERNAME.to_string(),
            password: DEFAULT_PASSWORD.to_string(),
            ipmi_port: DEFAULT_IPMI_PORT,
            redfish_port: DEFAULT_REDFISH_PORT,
            networks: Vec::new(),
        }
    }
}

impl fmt::Debug for BmcConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BmcConfig")
            .field("username", &self.username)
            .field("password", &"<secret>")
            .field("ipmi_port", &self.ipmi_port)
            .field("redfish_port", &self.redfish_port)
            .field("networks", &self.networks)
            .finish()
    }
}
