use core::fmt;

use aes::Aes128;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha1::Sha1;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, Zeroizing};

use crate::error::{Error, Result};

/// AES block size (and CBC IV length).
pub(crate) const AES_BLOCK: usize = 16;

/// A minimal secret container that zeroizes its contents on drop.
#[derive(Clone)]
pub(crate) struct SecretBytes(Vec<u8>);

impl SecretBytes {
    pub(crate) fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    #[cfg(test)]
    pub(crate) fn expose(&self) -> &[u8] {
        &self.0
    }

    /// The user key `K[UID]` as used by RAKP-HMAC-SHA1: the password
    /// truncated/zero-padded to 20 bytes.
    pub(crate) fn to_key_sha1(&self) -> Zeroizing<[u8; 20]> {
        let mut out = [0u8; 20];
        let n = self.0.len().min(out.len());
        out[..n].copy_from_slice(&self.0[..n]);
        Zeroizing::new(out)
    }
}

impl fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<secret>")
    }
}

impl Drop for SecretBytes {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

type HmacSha1 = Hmac<Sha1>;

pub(crate) fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// HMAC-SHA1 over the concatenation of `parts`.
pub(crate) fn hmac_sha1(key: &[u8], parts: &[&[u8]]) -> Result<[u8; 20]> {
    let mut mac =
        <HmacSha1 as Mac>::new_from_slice(key).map_err(|_| Error::Crypto("invalid HMAC key"))?;
    for part in parts {
        mac.update(part);
    }
    let bytes = mac.finalize().into_bytes();
    let mut out = [0u8; 20];
    out.copy_from_slice(&bytes[..]);
    Ok(out)
}

/// HMAC-SHA1-96: the first 12 bytes of HMAC-SHA1.
pub(crate) fn hmac_sha1_96(key: &[u8], parts: &[&[u8]]) -> Result<[u8; 12]> {
    let full = hmac_sha1(key, parts)?;
    let mut out = [0u8; 12];
    out.copy_from_slice(&full[..12]);
    Ok(out)
}

/// Keying material of an established RMCP+ session.
#[derive(Clone)]
pub(crate) struct SessionKeys {
    pub(crate) sik: [u8; 20],
    /// Integrity key K1.
    pub(crate) k1: [u8; 20],
    /// Confidentiality key K2 (its first 16 bytes are the AES-128 key).
    pub(crate) k2: [u8; 20],
}

impl SessionKeys {
    /// Derive K1 = HMAC(SIK, 0x01 * 20) and K2 = HMAC(SIK, 0x02 * 20).
    pub(crate) fn derive(sik: [u8; 20]) -> Result<Self> {
        let k1 = hmac_sha1(&sik, &[&[0x01u8; 20]])?;
        let k2 = hmac_sha1(&sik, &[&[0x02u8; 20]])?;
        Ok(Self { sik, k1, k2 })
    }

    pub(crate) fn aes_key(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out.copy_from_slice(&self.k2[..16]);
        out
    }
}

impl fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKeys(<secret>)")
    }
}

impl Drop for SessionKeys {
    fn drop(&mut self) {
        self.sik.zeroize();
        self.k1.zeroize();
        self.k2.zeroize();
    }
}

pub(crate) fn random_bytes<const N: usize>() -> [u8; N] {
    let mut out = [0u8; N];
    rand::rng().fill_bytes(&mut out);
    out
}

/// AES-128-CBC encryption without padding.
///
/// The caller must ensure `plaintext.len()` is a multiple of 16.
pub(crate) fn aes128_cbc_encrypt(
    key: &[u8; 16],
    iv: &[u8; AES_BLOCK],
    plaintext: &[u8],
) -> Result<Vec<u8>> {
    if !plaintext.len().is_multiple_of(AES_BLOCK) {
        return Err(Error::Crypto(
            "AES-CBC plaintext length must be a multiple of 16",
        ));
    }

    let cipher = Aes128::new_from_slice(key).map_err(|_| Error::Crypto("invalid AES-128 key"))?;

    let mut out = Vec::with_capacity(plaintext.len());
    let mut prev = *iv;
    for block in plaintext.chunks(AES_BLOCK) {
        let mut ga = GenericArray::clone_from_slice(block);
        for (b, p) in ga.iter_mut().zip(prev.iter()) {
            *b ^= p;
        }
        cipher.encrypt_block(&mut ga);
        prev.copy_from_slice(&ga);
        out.extend_from_slice(&prev);
    }

    Ok(out)
}

/// AES-128-CBC decryption without padding.
///
/// The caller must ensure `ciphertext.len()` is a multiple of 16.
pub(crate) fn aes128_cbc_decrypt(
    key: &[u8; 16],
    iv: &[u8; AES_BLOCK],
    ciphertext: &[u8],
) -> Result<Vec<u8>> {
    if !ciphertext.len().is_multiple_of(AES_BLOCK) {
        return Err(Error::Crypto(
            "AES-CBC ciphertext length must be a multiple of 16",
        ));
    }

    let cipher = Aes128::new_from_slice(key).map_err(|_| Error::Crypto("invalid AES-128 key"))?;

    let mut out = Vec::with_capacity(ciphertext.len());
    let mut prev: &[u8] = iv;
    for block in ciphertext.chunks(AES_BLOCK) {
        let mut ga = GenericArray::clone_from_slice(block);
        cipher.decrypt_block(&mut ga);
        out.extend(ga.iter().zip(prev.iter()).map(|(b, p)| b ^ p));
        prev = block;
    }

    Ok(out)
}
