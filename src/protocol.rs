use crate::crypto::{
    AES_BLOCK, aes128_cbc_decrypt, aes128_cbc_encrypt, ct_eq, hmac_sha1, hmac_sha1_96,
    random_bytes,
};
use crate::error::{Error, Result};

/// Session authentication type announcing an RMCP+ (IPMI v2.0) header.
pub(crate) const AUTH_TYPE_RMCPPLUS: u8 = 0x06;

/// IPMI v1.5 authentication type "none".
pub(crate) const AUTH_TYPE_NONE: u8 = 0x00;

/// RMCP+ session trailer next header value.
const RMCPPLUS_NEXT_HEADER: u8 = 0x07;

const RMCPPLUS_HEADER_LEN: usize = 12;
const AUTH_CODE_LEN: usize = 12;

/// Payload type numbers (see IPMI v2.0 Table 13-16).
pub(crate) mod payload_type {
    /// Standard IPMI payload (lan message) wrapped in RMCP+.
    pub const IPMI: u8 = 0x00;
    /// OEM explicit payload.
    pub const OEM_EXPLICIT: u8 = 0x02;
    /// RMCP+ Open Session Request.
    pub const OPEN_SESSION_REQUEST: u8 = 0x10;
    /// RMCP+ Open Session Response.
    pub const OPEN_SESSION_RESPONSE: u8 = 0x11;
    /// RAKP Message 1.
    pub const RAKP_1: u8 = 0x12;
    /// RAKP Message 2.
    pub const RAKP_2: u8 = 0x13;
    /// RAKP Message 3.
    pub const RAKP_3: u8 = 0x14;
    /// RAKP Message 4.
    pub const RAKP_4: u8 = 0x15;
}

/// Algorithm numbers of the one cipher suite the managed system offers.
pub(crate) mod algorithm {
    /// Authentication algorithm: RAKP-HMAC-SHA1.
    pub const AUTH_RAKP_HMAC_SHA1: u8 = 0x01;
    /// Integrity algorithm: HMAC-SHA1-96.
    pub const INTEGRITY_HMAC_SHA1_96: u8 = 0x01;
    /// Confidentiality algorithm: AES-CBC-128.
    pub const CONFIDENTIALITY_AES_CBC_128: u8 = 0x01;
}

/// IPMI v1.5 session header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SessionWrapper {
    pub sequence: u32,
    pub session_id: u32,
    /// Present only when `session_id != 0`.
    pub auth_code: Option<[u8; 16]>,
}

/// Decode an IPMI v1.5 session header and return the wrapped IPMI message.
///
/// Only authentication type "none" is accepted: this emulator never issues
/// v1.5 sessions, the framing is used for capability probing only.
pub(crate) fn decode_session_wrapper(bytes: &[u8]) -> Result<(SessionWrapper, &[u8])> {
    if bytes.len() < 10 {
        return Err(Error::Protocol("IPMI v1.5 session header too short"));
    }
    let auth_type = bytes[0];
    if auth_type != AUTH_TYPE_NONE {
        return Err(Error::UnsupportedAuthType(auth_type));
    }

    let sequence = read_u32_le(&bytes[1..5])?;
    let session_id = read_u32_le(&bytes[5..9])?;

    let (auth_code, len_offset) = if session_id != 0 {
        if bytes.len() < 26 {
            return Err(Error::Protocol("IPMI v1.5 auth code truncated"));
        }
        let code: [u8; 16] = bytes[9..25]
            .try_into()
            .map_err(|_| Error::Protocol("invalid v1.5 auth code"))?;
        (Some(code), 25)
    } else {
        (None, 9)
    };

    let message_len = bytes[len_offset];
    let start = len_offset + 1;
    let end = start + usize::from(message_len);
    if bytes.len() < end {
        return Err(Error::Protocol("truncated IPMI v1.5 message"));
    }

    Ok((
        SessionWrapper {
            sequence,
            session_id,
            auth_code,
        },
        &bytes[start..end],
    ))
}

/// Wrap an IPMI message in a session-less v1.5 header.
pub(crate) fn encode_session_wrapper(message: &[u8]) -> Result<Vec<u8>> {
    let len: u8 = message
        .len()
        .try_into()
        .map_err(|_| Error::Protocol("IPMI v1.5 message too large"))?;

    let mut out = Vec::with_capacity(10 + message.len());
    out.push(AUTH_TYPE_NONE);
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.push(len);
    out.extend_from_slice(message);
    Ok(out)
}

/// RMCP+ session header (IPMI v2.0 Table 13-8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RmcpPlusHeader {
    /// 6-bit payload type.
    pub payload_type: u8,
    pub authenticated: bool,
    pub encrypted: bool,
    pub session_id: u32,
    pub sequence: u32,
    pub payload_len: u16,
}

impl RmcpPlusHeader {
    fn payload_type_byte(&self) -> u8 {
        let mut b = self.payload_type & 0x3F;
        if self.authenticated {
            b |= 0x40;
        }
        if self.encrypted {
            b |= 0x80;
        }
        b
    }
}

/// Parse an RMCP+ session header; `bytes` starts at the authentication type.
pub(crate) fn decode_rmcpplus(bytes: &[u8]) -> Result<(RmcpPlusHeader, &[u8])> {
    if bytes.len() < RMCPPLUS_HEADER_LEN {
        return Err(Error::Protocol("RMCP+ header too short"));
    }
    if bytes[0] != AUTH_TYPE_RMCPPLUS {
        return Err(Error::UnsupportedAuthType(bytes[0]));
    }

    let header = RmcpPlusHeader {
        payload_type: bytes[1] & 0x3F,
        authenticated: bytes[1] & 0x40 != 0,
        encrypted: bytes[1] & 0x80 != 0,
        session_id: read_u32_le(&bytes[2..6])?,
        sequence: read_u32_le(&bytes[6..10])?,
        payload_len: u16::from_le_bytes([bytes[10], bytes[11]]),
    };
    if header.payload_type == payload_type::OEM_EXPLICIT {
        return Err(Error::protocol_owned(format!(
            "unsupported RMCP+ payload type {:#04x}",
            header.payload_type
        )));
    }

    let end = RMCPPLUS_HEADER_LEN + usize::from(header.payload_len);
    if bytes.len() < end {
        return Err(Error::Protocol("truncated RMCP+ payload"));
    }

    Ok((header, &bytes[RMCPPLUS_HEADER_LEN..end]))
}

/// Verify the session trailer and HMAC-SHA1-96 auth code of an authenticated packet.
///
/// The authenticated range runs from the authentication type through the
/// next header byte.
pub(crate) fn verify_integrity(
    bytes: &[u8],
    header: &RmcpPlusHeader,
    k1: &[u8; 20],
) -> Result<()> {
    let payload_end = RMCPPLUS_HEADER_LEN + usize::from(header.payload_len);
    if bytes.len() < payload_end + 2 + AUTH_CODE_LEN {
        return Err(Error::Protocol("authenticated packet too short"));
    }

    let auth_code_start = bytes.len() - AUTH_CODE_LEN;
    let expected = hmac_sha1_96(k1, &[&bytes[..auth_code_start]])?;
    if !ct_eq(&bytes[auth_code_start..], &expected) {
        return Err(Error::AuthenticationFailed("invalid packet auth code"));
    }

    let pad_len = bytes[auth_code_start - 2];
    let next_header = bytes[auth_code_start - 1];
    if next_header != RMCPPLUS_NEXT_HEADER {
        return Err(Error::Protocol("unexpected next header"));
    }
    if auth_code_start - 2 - payload_end != usize::from(pad_len) {
        return Err(Error::Protocol("integrity pad length mismatch"));
    }

    Ok(())
}

/// Encode an RMCP+ packet (without the RMCP envelope).
///
/// When `k1` is given the packet is marked authenticated and gets the
/// integrity pad, pad length, next header and HMAC-SHA1-96 trailer.
pub(crate) fn encode_rmcpplus(
    payload_type_num: u8,
    session_id: u32,
    sequence: u32,
    payload: &[u8],
    encrypted: bool,
    k1: Option<&[u8; 20]>,
) -> Result<Vec<u8>> {
    let payload_len: u16 = payload
        .len()
        .try_into()
        .map_err(|_| Error::Protocol("payload too large"))?;

    let header = RmcpPlusHeader {
        payload_type: payload_type_num,
        authenticated: k1.is_some(),
        encrypted,
        session_id,
        sequence,
        payload_len,
    };

    let mut packet = Vec::with_capacity(RMCPPLUS_HEADER_LEN + payload.len() + 4 + AUTH_CODE_LEN);
    packet.push(AUTH_TYPE_RMCPPLUS);
    packet.push(header.payload_type_byte());
    packet.extend_from_slice(&session_id.to_le_bytes());
    packet.extend_from_slice(&sequence.to_le_bytes());
    packet.extend_from_slice(&payload_len.to_le_bytes());
    packet.extend_from_slice(payload);

    if let Some(k1) = k1 {
        // Pad so that header + payload + pad + pad length + next header is a
        // multiple of 4.
        let pad_len = (4 - (packet.len() + 2) % 4) % 4;
        packet.extend(std::iter::repeat_n(0xFF, pad_len));
        packet.push(pad_len as u8);
        packet.push(RMCPPLUS_NEXT_HEADER);

        let auth_code = hmac_sha1_96(k1, &[&packet[..]])?;
        packet.extend_from_slice(&auth_code);
    }

    Ok(packet)
}

/// Decrypt an AES-CBC-128 payload (`iv || ciphertext`) and strip the
/// confidentiality trailer (pad bytes followed by the pad length).
pub(crate) fn decrypt_payload(payload: &[u8], aes_key: &[u8; 16]) -> Result<Vec<u8>> {
    if payload.len() < 2 * AES_BLOCK {
        return Err(Error::Protocol("encrypted payload too short"));
    }

    let (iv, ciphertext) = payload.split_at(AES_BLOCK);
    let iv: [u8; AES_BLOCK] = iv.try_into().map_err(|_| Error::Protocol("invalid IV"))?;
    if !ciphertext.len().is_multiple_of(AES_BLOCK) {
        return Err(Error::Protocol("invalid AES-CBC ciphertext length"));
    }

    let mut plaintext = aes128_cbc_decrypt(aes_key, &iv, ciphertext)?;
    let pad_len = usize::from(
        *plaintext
            .last()
            .ok_or(Error::Protocol("missing confidentiality pad length"))?,
    );
    if pad_len + 1 > plaintext.len() {
        return Err(Error::Protocol("invalid confidentiality pad length"));
    }

    plaintext.truncate(plaintext.len() - 1 - pad_len);
    Ok(plaintext)
}

/// Encrypt a payload with AES-CBC-128 under a fresh random IV.
///
/// Returns `iv || ciphertext`.
pub(crate) fn encrypt_payload(plaintext: &[u8], aes_key: &[u8; 16]) -> Result<Vec<u8>> {
    encrypt_payload_with_iv(plaintext, aes_key, &random_bytes())
}

fn encrypt_payload_with_iv(
    plaintext: &[u8],
    aes_key: &[u8; 16],
    iv: &[u8; AES_BLOCK],
) -> Result<Vec<u8>> {
    let pad_len = (AES_BLOCK - (plaintext.len() + 1) % AES_BLOCK) % AES_BLOCK;

    let mut to_encrypt = Vec::with_capacity(plaintext.len() + pad_len + 1);
    to_encrypt.extend_from_slice(plaintext);
    to_encrypt.extend((1..=pad_len).map(|i| i as u8));
    to_encrypt.push(pad_len as u8);

    let ciphertext = aes128_cbc_encrypt(aes_key, iv, &to_encrypt)?;

    let mut out = Vec::with_capacity(AES_BLOCK + ciphertext.len());
    out.extend_from_slice(iv);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Open Session Request (Table 13-9).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OpenSessionRequest {
    pub message_tag: u8,
    pub requested_privilege: u8,
    pub remote_console_session_id: u32,
    pub auth_algorithm: u8,
    pub integrity_algorithm: u8,
    pub confidentiality_algorithm: u8,
}

pub(crate) fn parse_open_session_request(payload: &[u8]) -> Result<OpenSessionRequest> {
    if payload.len() < 32 {
        return Err(Error::Protocol("open session request payload too short"));
    }

    Ok(OpenSessionRequest {
        message_tag: payload[0],
        requested_privilege: payload[1] & 0x0F,
        remote_console_session_id: read_u32_le(&payload[4..8])?,
        // The algorithm is byte 5 of each 8-byte proposal.
        auth_algorithm: payload[12] & 0x3F,
        integrity_algorithm: payload[20] & 0x3F,
        confidentiality_algorithm: payload[28] & 0x3F,
    })
}

/// Build the Open Session Response payload (Table 13-10).
pub(crate) fn build_open_session_response(
    message_tag: u8,
    max_privilege: u8,
    remote_console_session_id: u32,
    managed_system_session_id: u32,
) -> Vec<u8> {
    let mut p = Vec::with_capacity(36);
    p.push(message_tag);
    p.push(0x00);
    p.push(max_privilege);
    p.push(0x00);
    p.extend_from_slice(&remote_console_session_id.to_le_bytes());
    p.extend_from_slice(&managed_system_session_id.to_le_bytes());
    p.extend_from_slice(&algorithm_block(0x00, algorithm::AUTH_RAKP_HMAC_SHA1));
    p.extend_from_slice(&algorithm_block(0x01, algorithm::INTEGRITY_HMAC_SHA1_96));
    p.extend_from_slice(&algorithm_block(0x02, algorithm::CONFIDENTIALITY_AES_CBC_128));
    p
}

fn algorithm_block(payload_type: u8, algorithm: u8) -> [u8; 8] {
    [payload_type, 0x00, 0x00, 0x08, algorithm, 0x00, 0x00, 0x00]
}

/// Error form shared by Open Session Response, RAKP 2 and RAKP 4:
/// tag, status, two reserved bytes and the console's session id.
pub(crate) fn build_status_response(
    message_tag: u8,
    status_code: u8,
    remote_console_session_id: u32,
) -> Vec<u8> {
    let mut p = Vec::with_capacity(8);
    p.push(message_tag);
    p.push(status_code);
    p.extend_from_slice(&[0x00, 0x00]);
    p.extend_from_slice(&remote_console_session_id.to_le_bytes());
    p
}

/// RAKP Message 1 (Table 13-11).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RakpMessage1 {
    pub message_tag: u8,
    pub managed_system_session_id: u32,
    pub remote_console_random: [u8; 16],
    /// Requested role byte, kept verbatim because it enters the RAKP HMACs.
    pub role: u8,
    pub username: Vec<u8>,
}

pub(crate) fn parse_rakp_message_1(payload: &[u8]) -> Result<RakpMessage1> {
    if payload.len() < 28 {
        return Err(Error::Protocol("RAKP message 1 payload too short"));
    }

    let username_len = usize::from(payload[27]);
    if username_len > 16 {
        return Err(Error::InvalidArgument("username longer than 16 bytes"));
    }
    if payload.len() < 28 + username_len {
        return Err(Error::Protocol("RAKP message 1 username truncated"));
    }

    Ok(RakpMessage1 {
        message_tag: payload[0],
        managed_system_session_id: read_u32_le(&payload[4..8])?,
        remote_console_random: payload[8..24]
            .try_into()
            .map_err(|_| Error::Protocol("invalid console random"))?,
        role: payload[24],
        username: payload[28..28 + username_len].to_vec(),
    })
}

/// Build RAKP Message 2 (Table 13-12).
pub(crate) fn build_rakp_message_2(
    message_tag: u8,
    remote_console_session_id: u32,
    managed_system_random: &[u8; 16],
    managed_system_guid: &[u8; 16],
    key_exchange_auth_code: &[u8; 20],
) -> Vec<u8> {
    let mut p = build_status_response(message_tag, 0x00, remote_console_session_id);
    p.extend_from_slice(managed_system_random);
    p.extend_from_slice(managed_system_guid);
    p.extend_from_slice(key_exchange_auth_code);
    p
}

/// RAKP Message 3 (Table 13-13).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RakpMessage3 {
    pub message_tag: u8,
    pub status_code: u8,
    pub managed_system_session_id: u32,
    /// Absent when the console reports a non-zero status.
    pub key_exchange_auth_code: Option<[u8; 20]>,
}

pub(crate) fn parse_rakp_message_3(payload: &[u8]) -> Result<RakpMessage3> {
    if payload.len() < 8 {
        return Err(Error::Protocol("RAKP message 3 payload too short"));
    }

    let status_code = payload[1];
    let key_exchange_auth_code = if status_code == 0x00 {
        let code: [u8; 20] = payload
            .get(8..28)
            .ok_or(Error::Protocol("RAKP message 3 auth code truncated"))?
            .try_into()
            .map_err(|_| Error::Protocol("invalid key exchange auth code"))?;
        Some(code)
    } else {
        None
    };

    Ok(RakpMessage3 {
        message_tag: payload[0],
        status_code,
        managed_system_session_id: read_u32_le(&payload[4..8])?,
        key_exchange_auth_code,
    })
}

/// Build RAKP Message 4 (Table 13-14).
pub(crate) fn build_rakp_message_4(
    message_tag: u8,
    remote_console_session_id: u32,
    integrity_check_value: &[u8; 12],
) -> Vec<u8> {
    let mut p = build_status_response(message_tag, 0x00, remote_console_session_id);
    p.extend_from_slice(integrity_check_value);
    p
}

/// RAKP Message 2 key exchange authentication code:
/// HMAC(K[UID], SIDm | SIDc | Rm | Rc | GUIDc | Role | ULen | UName).
#[allow(clippy::too_many_arguments)]
pub(crate) fn rakp2_key_exchange_auth_code(
    user_key: &[u8],
    remote_console_session_id: u32,
    managed_system_session_id: u32,
    remote_console_random: &[u8; 16],
    managed_system_random: &[u8; 16],
    managed_system_guid: &[u8; 16],
    role: u8,
    username: &[u8],
) -> Result<[u8; 20]> {
    hmac_sha1(
        user_key,
        &[
            &remote_console_session_id.to_le_bytes(),
            &managed_system_session_id.to_le_bytes(),
            remote_console_random,
            managed_system_random,
            managed_system_guid,
            &[role, username.len() as u8],
            username,
        ],
    )
}

/// RAKP Message 3 key exchange authentication code:
/// HMAC(K[UID], Rc | SIDm | Role | ULen | UName).
pub(crate) fn rakp3_key_exchange_auth_code(
    user_key: &[u8],
    managed_system_random: &[u8; 16],
    remote_console_session_id: u32,
    role: u8,
    username: &[u8],
) -> Result<[u8; 20]> {
    hmac_sha1(
        user_key,
        &[
            managed_system_random,
            &remote_console_session_id.to_le_bytes(),
            &[role, username.len() as u8],
            username,
        ],
    )
}

/// Session Integrity Key: HMAC(Kg, Rm | Rc | Role | ULen | UName).
pub(crate) fn session_integrity_key(
    kg: &[u8],
    remote_console_random: &[u8; 16],
    managed_system_random: &[u8; 16],
    role: u8,
    username: &[u8],
) -> Result<[u8; 20]> {
    hmac_sha1(
        kg,
        &[
            remote_console_random,
            managed_system_random,
            &[role, username.len() as u8],
            username,
        ],
    )
}

/// RAKP Message 4 integrity check value: HMAC-SHA1-96(SIK, Rm | SIDc | GUIDc).
pub(crate) fn rakp4_integrity_check_value(
    sik: &[u8; 20],
    remote_console_random: &[u8; 16],
    managed_system_session_id: u32,
    managed_system_guid: &[u8; 16],
) -> Result<[u8; 12]> {
    hmac_sha1_96(
        sik,
        &[
            remote_console_random,
            &managed_system_session_id.to_le_bytes(),
            managed_system_guid,
        ],
    )
}

fn read_u32_le(bytes: &[u8]) -> Result<u32> {
    let raw: [u8; 4] = bytes
        .get(..4)
        .ok_or(Error::Protocol("truncated u32 field"))?
        .try_into()
        .map_err(|_| Error::Protocol("invalid u32 field"))?;
    Ok(u32::from_le_bytes(raw))
}

/// Console-side payload builders, used to drive the managed system in tests.
#[cfg(test)]
pub(crate) mod console {
    pub(crate) fn open_session_request(
        message_tag: u8,
        max_privilege: u8,
        remote_console_session_id: u32,
    ) -> Vec<u8> {
        let mut p = Vec::with_capacity(32);
        p.push(message_tag);
        p.push(max_privilege);
        p.extend_from_slice(&[0x00, 0x00]);
        p.extend_from_slice(&remote_console_session_id.to_le_bytes());
        p.extend_from_slice(&super::algorithm_block(0x00, 0x01));
        p.extend_from_slice(&super::algorithm_block(0x01, 0x01));
        p.extend_from_slice(&super::algorithm_block(0x02, 0x01));
        p
    }

    pub(crate) fn rakp_message_1(
        message_tag: u8,
        managed_system_session_id: u32,
        remote_console_random: &[u8; 16],
        role: u8,
        username: &[u8],
    ) -> Vec<u8> {
        let mut p = Vec::with_capacity(28 + username.len());
        p.push(message_tag);
        p.extend_from_slice(&[0x00, 0x00, 0x00]);
        p.extend_from_slice(&managed_system_session_id.to_le_bytes());
        p.extend_from_slice(remote_console_random);
        p.push(role);
        p.extend_from_slice(&[0x00, 0x00]);
        p.push(username.len() as u8);
        p.extend_from_slice(username);
        p
    }

    pub(crate) fn rakp_message_3(
        message_tag: u8,
        managed_system_session_id: u32,
        key_exchange_auth_code: &[u8; 20],
    ) -> Vec<u8> {
        let mut p = Vec::with_capacity(28);
        p.push(message_tag);
        p.push(0x00);
        p.extend_from_slice(&[0x00, 0x00]);
        p.extend_from_slice(&managed_system_session_id.to_le_bytes());
        p.extend_from_slice(key_exchange_auth_code);
        p
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v15_wrapper_without_session_has_no_auth_code() {
        let mut bytes = vec![0x00, 0, 0, 0, 0, 0, 0, 0, 0, 0x03, 0xAA, 0xBB, 0xCC];
        let (wrapper, msg) = decode_session_wrapper(&bytes).expect("decode");
        assert_eq!(wrapper.session_id, 0);
        assert_eq!(wrapper.auth_code, None);
        assert_eq!(msg, &[0xAA, 0xBB, 0xCC]);

        bytes[0] = 0x02; // MD5
        assert!(matches!(
            decode_session_wrapper(&bytes).unwrap_err(),
            Error::UnsupportedAuthType(0x02)
        ));
    }

    #[test]
    fn v15_wrapper_with_session_reads_auth_code() {
        let mut bytes = vec![0x00, 1, 0, 0, 0, 0x78, 0x56, 0x34, 0x12];
        bytes.extend_from_slice(&[0x5A; 16]);
        bytes.push(0x01);
        bytes.push(0xEE);

        let (wrapper, msg) = decode_session_wrapper(&bytes).expect("decode");
        assert_eq!(wrapper.sequence, 1);
        assert_eq!(wrapper.session_id, 0x1234_5678);
        assert_eq!(wrapper.auth_code, Some([0x5A; 16]));
        assert_eq!(msg, &[0xEE]);
    }

    #[test]
    fn v15_reply_round_trips() {
        let reply = encode_session_wrapper(&[0x01, 0x02]).expect("encode");
        let (wrapper, msg) = decode_session_wrapper(&reply).expect("decode");
        assert_eq!(wrapper.session_id, 0);
        assert_eq!(msg, &[0x01, 0x02]);
    }

    #[test]
    fn authenticated_packet_verifies_and_detects_tampering() {
        let k1 = [0x11u8; 20];
        let payload = [0xAB; 32];
        let mut packet =
            encode_rmcpplus(payload_type::IPMI, 0xCAFE_F00D, 7, &payload, true, Some(&k1))
                .expect("encode");

        let (header, body) = decode_rmcpplus(&packet).expect("decode");
        assert!(header.authenticated && header.encrypted);
        assert_eq!(header.session_id, 0xCAFE_F00D);
        assert_eq!(header.sequence, 7);
        assert_eq!(body, &payload);
        // 12 + 32 + pad + 2 is aligned to four bytes with a two byte pad.
        assert_eq!(packet.len(), 12 + 32 + 2 + 2 + 12);
        verify_integrity(&packet, &header, &k1).expect("verify");

        packet[20] ^= 0x01;
        let (header, _) = decode_rmcpplus(&packet).expect("decode");
        assert!(matches!(
            verify_integrity(&packet, &header, &k1).unwrap_err(),
            Error::AuthenticationFailed(_)
        ));
    }

    #[test]
    fn unauthenticated_packet_has_no_trailer() {
        let packet = encode_rmcpplus(payload_type::RAKP_2, 0, 0, &[1, 2, 3], false, None)
            .expect("encode");
        assert_eq!(packet, vec![0x06, 0x13, 0, 0, 0, 0, 0, 0, 0, 0, 0x03, 0x00, 1, 2, 3]);
    }

    #[test]
    fn truncated_rmcpplus_payload_is_rejected() {
        let packet = [0x06, 0x00, 0, 0, 0, 0, 0, 0, 0, 0, 0x10, 0x00, 0x01];
        assert!(matches!(
            decode_rmcpplus(&packet).unwrap_err(),
            Error::Protocol("truncated RMCP+ payload")
        ));
    }

    #[test]
    fn confidentiality_pad_follows_ipmi_layout() {
        let key = [0x42u8; 16];
        let iv = [0x24u8; 16];
        let plaintext = [0x20, 0x18, 0xC8, 0x81, 0x04, 0x3B, 0x04, 0x3C];

        let encrypted = encrypt_payload_with_iv(&plaintext, &key, &iv).expect("encrypt");
        assert_eq!(encrypted.len(), 32);
        assert_eq!(&encrypted[..16], &iv);

        let padded = aes128_cbc_decrypt(&key, &iv, &encrypted[16..]).expect("decrypt");
        assert_eq!(&padded[8..], &[1, 2, 3, 4, 5, 6, 7, 7]);

        assert_eq!(decrypt_payload(&encrypted, &key).expect("decrypt"), plaintext);
    }

    #[test]
    fn encryption_round_trips_every_length() {
        let key = [0x5Cu8; 16];
        for len in 0..=40 {
            let plaintext: Vec<u8> = (0..len as u8).collect();
            let encrypted = encrypt_payload(&plaintext, &key).expect("encrypt");
            assert!(encrypted.len().is_multiple_of(16));
            assert_eq!(decrypt_payload(&encrypted, &key).expect("decrypt"), plaintext);
        }
    }

    #[test]
    fn open_session_request_parses_console_proposal() {
        let payload = console::open_session_request(0x2A, 0x04, 0xA0A1_A2A3);
        let request = parse_open_session_request(&payload).expect("parse");
        assert_eq!(request.message_tag, 0x2A);
        assert_eq!(request.requested_privilege, 0x04);
        assert_eq!(request.remote_console_session_id, 0xA0A1_A2A3);
        assert_eq!(request.auth_algorithm, algorithm::AUTH_RAKP_HMAC_SHA1);
        assert_eq!(request.integrity_algorithm, algorithm::INTEGRITY_HMAC_SHA1_96);
        assert_eq!(
            request.confidentiality_algorithm,
            algorithm::CONFIDENTIALITY_AES_CBC_128
        );
    }

    #[test]
    fn open_session_response_selects_mandatory_suite() {
        let response = build_open_session_response(0x2A, 0x04, 0xA0A1_A2A3, 0x0102_0304);
        assert_eq!(response.len(), 36);
        assert_eq!(&response[..4], &[0x2A, 0x00, 0x04, 0x00]);
        assert_eq!(&response[4..8], &0xA0A1_A2A3u32.to_le_bytes());
        assert_eq!(&response[8..12], &0x0102_0304u32.to_le_bytes());
        assert_eq!(response[16], algorithm::AUTH_RAKP_HMAC_SHA1);
        assert_eq!(response[20], 0x01);
        assert_eq!(response[24], algorithm::INTEGRITY_HMAC_SHA1_96);
        assert_eq!(response[28], 0x02);
        assert_eq!(response[32], algorithm::CONFIDENTIALITY_AES_CBC_128);
    }

    #[test]
    fn rakp1_rejects_long_usernames() {
        let payload = console::rakp_message_1(0, 1, &[0u8; 16], 0x14, &[b'a'; 17]);
        assert!(matches!(
            parse_rakp_message_1(&payload).unwrap_err(),
            Error::InvalidArgument(_)
        ));

        let payload = console::rakp_message_1(9, 1, &[7u8; 16], 0x14, b"cybozu");
        let rakp1 = parse_rakp_message_1(&payload).expect("parse");
        assert_eq!(rakp1.message_tag, 9);
        assert_eq!(rakp1.role, 0x14);
        assert_eq!(rakp1.username, b"cybozu");
    }

    #[test]
    fn rakp3_with_error_status_has_no_auth_code() {
        let rakp3 = parse_rakp_message_3(&[0x05, 0x0F, 0, 0, 1, 0, 0, 0]).expect("parse");
        assert_eq!(rakp3.status_code, 0x0F);
        assert_eq!(rakp3.managed_system_session_id, 1);
        assert_eq!(rakp3.key_exchange_auth_code, None);

        assert!(parse_rakp_message_3(&[0x05, 0x00, 0, 0, 1, 0, 0, 0]).is_err());
    }
}
