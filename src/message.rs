use crate::error::{Error, Result};

/// An IPMI LAN message (request or response), checksums excluded.
///
/// Wire layout:
///
/// ```text
/// rsAddr | netFn/rsLUN | chk1 | rqAddr | rqSeq/rqLUN | cmd | [cc] | data.. | chk2
/// ```
///
/// `chk1` covers the first two bytes, `chk2` everything from `rqAddr` up to
/// the last data byte. Responses carry a completion code, requests do not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct IpmiMessage {
    pub target_address: u8,
    /// Network function in the upper 6 bits, target LUN in the lower 2.
    pub target_lun: u8,
    pub source_address: u8,
    /// Request sequence in the upper 6 bits, source LUN in the lower 2.
    pub source_lun: u8,
    pub command: u8,
    pub completion_code: Option<u8>,
    pub data: Vec<u8>,
}

/// Two's complement checksum: `0x100 - (sum mod 256)`.
pub(crate) fn checksum(bytes: &[u8]) -> u8 {
    let sum = bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    sum.wrapping_neg()
}

const MIN_REQUEST_LEN: usize = 7;

impl IpmiMessage {
    pub(crate) fn netfn(&self) -> u8 {
        self.target_lun >> 2
    }

    pub(crate) fn header_checksum(&self) -> u8 {
        checksum(&[self.target_address, self.target_lun])
    }

    pub(crate) fn data_checksum(&self) -> u8 {
        let mut covered = vec![self.source_address, self.source_lun, self.command];
        covered.extend(self.completion_code);
        covered.extend_from_slice(&self.data);
        checksum(&covered)
    }

    pub(crate) fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(MIN_REQUEST_LEN + 1 + self.data.len());
        out.push(self.target_address);
        out.push(self.target_lun);
        out.push(self.header_checksum());
        out.push(self.source_address);
        out.push(self.source_lun);
        out.push(self.command);
        out.extend(self.completion_code);
        out.extend_from_slice(&self.data);
        out.push(self.data_checksum());
        out
    }

    pub(crate) fn decode_request(bytes: &[u8]) -> Result<Self> {
        Self::decode(bytes, false)
    }

    #[cfg(test)]
    pub(crate) fn decode_response(bytes: &[u8]) -> Result<Self> {
        Self::decode(bytes, true)
    }

    fn decode(bytes: &[u8], has_completion_code: bool) -> Result<Self> {
        let min_len = MIN_REQUEST_LEN + usize::from(has_completion_code);
        if bytes.len() < min_len {
            return Err(Error::Protocol("IPMI message too short"));
        }

        if checksum(&bytes[..2]) != bytes[2] {
            return Err(Error::Protocol("invalid IPMI header checksum"));
        }
        let last = bytes.len() - 1;
        if checksum(&bytes[3..last]) != bytes[last] {
            return Err(Error::Protocol("invalid IPMI data checksum"));
        }

        let (completion_code, data_start) = if has_completion_code {
            (Some(bytes[6]), 7)
        } else {
            (None, 6)
        };

        Ok(Self {
            target_address: bytes[0],
            target_lun: bytes[1],
            source_address: bytes[3],
            source_lun: bytes[4],
            command: bytes[5],
            completion_code,
            data: bytes[data_start..last].to_vec(),
        })
    }

    /// Build the response to this request: addresses swapped, response NetFn,
    /// request sequence preserved.
    pub(crate) fn response(&self, completion_code: u8, data: Vec<u8>) -> Self {
        Self {
            target_address: self.source_address,
            target_lun: ((self.netfn() | 0x01) << 2) | (self.source_lun & 0x03),
            source_address: self.target_address,
            source_lun: (self.source_lun & 0xFC) | (self.target_lun & 0x03),
            command: self.command,
            completion_code: Some(completion_code),
            data,
        }
    }
}
