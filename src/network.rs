use core::fmt;
use core::future::Future;
use core::pin::Pin;
use core::str::FromStr;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::error::{Error, Result};

/// An IPv4 subnet in CIDR notation (`10.72.16.0/20`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ipv4Cidr {
    network: Ipv4Addr,
    prefix_len: u8,
}

impl Ipv4Cidr {
    /// Create a subnet; host bits of `address` are cleared.
    pub fn new(address: Ipv4Addr, prefix_len: u8) -> Result<Self> {
        if prefix_len > 32 {
            return Err(Error::InvalidArgument("prefix length above 32"));
        }
        Ok(Self {
            network: Ipv4Addr::from(u32::from(address) & Self::mask(prefix_len)),
            prefix_len,
        })
    }

    fn mask(prefix_len: u8) -> u32 {
        u32::MAX.checked_shl(32 - u32::from(prefix_len)).unwrap_or(0)
    }

    /// Prefix length in bits.
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Whether `address` lies inside this subnet.
    pub fn contains(&self, address: Ipv4Addr) -> bool {
        u32::from(address) & Self::mask(self.prefix_len) == u32::from(self.network)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (address, prefix) = s
            .split_once('/')
            .ok_or(Error::InvalidArgument("CIDR without prefix length"))?;
        let address: Ipv4Addr = address
            .parse()
            .map_err(|_| Error::InvalidArgument("invalid CIDR address"))?;
        let prefix_len: u8 = prefix
            .parse()
            .map_err(|_| Error::InvalidArgument("invalid CIDR prefix length"))?;
        Self::new(address, prefix_len)
    }
}

impl TryFrom<String> for Ipv4Cidr {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Ipv4Cidr> for String {
    fn from(value: Ipv4Cidr) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

/// A BMC network: the bridge BMC addresses inside `cidr` are bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BmcNetwork {
    /// Bridge interface name.
    pub bridge: String,
    /// Subnet served by the bridge.
    pub cidr: Ipv4Cidr,
}

/// Find the BMC network containing `address`.
pub(crate) fn find_network(networks: &[BmcNetwork], address: Ipv4Addr) -> Result<&BmcNetwork> {
    networks
        .iter()
        .find(|n| n.cidr.contains(address))
        .ok_or(Error::NoBmcNetwork(address))
}

/// Attaches a BMC address to the bridge of its network so listeners can bind it.
pub trait AddressBinder: Send + Sync {
    /// Assign `address/prefix_len` to `bridge`. Assigning an address twice is not an error.
    fn bind<'a>(
        &'a self,
        bridge: &'a str,
        address: Ipv4Addr,
        prefix_len: u8,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// Binds addresses with `ip address add <addr>/<len> dev <bridge>`.
#[derive(Debug, Clone, Default)]
pub struct IpCommandBinder;

impl IpCommandBinder {
    async fn bind_impl(&self, bridge: &str, address: Ipv4Addr, prefix_len: u8) -> Result<()> {
        let output = Command::new("ip")
            .arg("address")
            .arg("add")
            .arg(format!("{address}/{prefix_len}"))
            .arg("dev")
            .arg(bridge)
            .output()
            .await?;

        if output.status.success() {
            tracing::info!(%address, bridge, "bmc address bound");
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("File exists") {
            return Ok(());
        }
        Err(Error::Binding(format!(
            "ip address add {address}/{prefix_len} dev {bridge}: {}",
            stderr.trim()
        )))
    }
}

impl AddressBinder for IpCommandBinder {
    fn bind<'a>(
        &'a self,
        bridge: &'a str,
        address: Ipv4Addr,
        prefix_len: u8,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move { self.bind_impl(bridge, address, prefix_len).await })
    }
}

/// Leaves interfaces alone; for addresses that are already configured.
#[derive(Debug, Clone, Default)]
pub struct NoopBinder;

impl AddressBinder for NoopBinder {
    fn bind<'a>(
        &'a self,
        _bridge: &'a str,
        _address: Ipv4Addr,
        _prefix_len: u8,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_matches_cidr() {
        let cidr: Ipv4Cidr = "10.72.17.0/20".parse().expect("cidr");
        assert_eq!(cidr.to_string(), "10.72.16.0/20");
        assert!(cidr.contains(Ipv4Addr::new(10, 72, 31, 255)));
        assert!(!cidr.contains(Ipv4Addr::new(10, 72, 32, 0)));

        let all: Ipv4Cidr = "0.0.0.0/0".parse().expect("cidr");
        assert!(all.contains(Ipv4Addr::new(192, 0, 2, 1)));

        assert!("10.0.0.0".parse::<Ipv4Cidr>().is_err());
        assert!("10.0.0.0/33".parse::<Ipv4Cidr>().is_err());
    }

    #[test]
    fn finds_network_owning_address() {
        let networks = vec![
            BmcNetwork {
                bridge: "bmc0".into(),
                cidr: "10.72.16.0/20".parse().expect("cidr"),
            },
            BmcNetwork {
                bridge: "bmc1".into(),
                cidr: "10.88.0.0/24".parse().expect("cidr"),
            },
        ];
        let found = find_network(&networks, Ipv4Addr::new(10, 88, 0, 7)).expect("network");
        assert_eq!(found.bridge, "bmc1");

        assert!(matches!(
            find_network(&networks, Ipv4Addr::new(192, 168, 0, 1)).unwrap_err(),
            Error::NoBmcNetwork(_)
        ));
    }

    #[test]
    fn cidr_deserializes_from_string() {
        let network: BmcNetwork =
            serde_json::from_str(r#"{"bridge":"bmc0","cidr":"10.72.16.0/20"}"#).expect("json");
        assert_eq!(network.cidr.prefix_len(), 20);
        assert!(serde_json::from_str::<BmcNetwork>(r#"{"bridge":"b","cidr":"nope"}"#).is_err());
    }
}
