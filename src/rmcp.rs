//! RMCP envelope (IPMI v2.0 section 13.1.3).

use crate::error::{Error, Result};

pub(crate) const RMCP_HEADER_LEN: usize = 4;

const RMCP_VERSION: u8 = 0x06;
const RMCP_RESERVED: u8 = 0x00;
const RMCP_SEQ_NO_ACK: u8 = 0xFF;

/// Message class carried in the low 5 bits of the class byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RmcpClass {
    Asf,
    Ipmi,
    Oem,
}

impl RmcpClass {
    fn from_u8(value: u8) -> Result<Self> {
        match value & 0x1F {
            0x06 => Ok(Self::Asf),
            0x07 => Ok(Self::Ipmi),
            0x08 => Ok(Self::Oem),
            _ => Err(Error::UnsupportedClass(value)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RmcpHeader {
    pub sequence: u8,
    pub class: RmcpClass,
}

/// Split a datagram into its RMCP header and the IPMI session payload.
///
/// Only the IPMI class is served; ASF pings and OEM messages are rejected.
pub(crate) fn decode(bytes: &[u8]) -> Result<(RmcpHeader, &[u8])> {
    if bytes.len() < RMCP_HEADER_LEN {
        return Err(Error::Protocol("RMCP header too short"));
    }
    if bytes[0] != RMCP_VERSION {
        return Err(Error::Protocol("unexpected RMCP version"));
    }

    let header = RmcpHeader {
        sequence: bytes[2],
        class: RmcpClass::from_u8(bytes[3])?,
    };
    if header.class != RmcpClass::Ipmi {
        return Err(Error::UnsupportedClass(bytes[3]));
    }

    Ok((header, &bytes[RMCP_HEADER_LEN..]))
}

/// Prefix `body` with the reply header (`06 00 ff 07`).
pub(crate) fn encode_reply(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(RMCP_HEADER_LEN + body.len());
    out.extend_from_slice(&[RMCP_VERSION, RMCP_RESERVED, RMCP_SEQ_NO_ACK, 0x07]);
    out.extend_from_slice(body);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_ipmi_class() {
        let (header, rest) = decode(&[0x06, 0x00, 0xFF, 0x07, 0xAA]).expect("decode");
        assert_eq!(header.class, RmcpClass::Ipmi);
        assert_eq!(header.sequence, 0xFF);
        assert_eq!(rest, &[0xAA]);
    }

    #[test]
    fn rejects_asf_and_oem_classes() {
        for class in [0x06, 0x08] {
            let err = decode(&[0x06, 0x00, 0xFF, class]).unwrap_err();
            assert!(matches!(err, Error::UnsupportedClass(c) if c == class));
        }
    }

    #[test]
    fn rejects_truncated_header() {
        assert!(matches!(
            decode(&[0x06, 0x00]).unwrap_err(),
            Error::Protocol(_)
        ));
    }

    #[test]
    fn reply_header_is_fixed() {
        assert_eq!(encode_reply(&[0x01]), vec![0x06, 0x00, 0xFF, 0x07, 0x01]);
    }
}
