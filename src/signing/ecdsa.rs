//! Signature primitive and its DER encoding

use crate::errors::AppResult;
use crate::keys::derivation::SECP;
use bitcoin::secp256k1::{Message, SecretKey};

/// Elliptic-curve signing capability: `sign(digest, key) -> (r, s)`
pub trait EcdsaSigner: Send + Sync {
    fn sign(&self, digest: &[u8; 32], private_key: &SecretKey) -> AppResult<([u8; 32], [u8; 32])>;
}

/// libsecp256k1 with RFC 6979 nonces; `s` is always in the lower half of the order
#[derive(Debug, Clone, Copy, Default)]
pub struct Secp256k1Signer;

impl EcdsaSigner for Secp256k1Signer {
    fn sign(&self, digest: &[u8; 32], private_key: &SecretKey) -> AppResult<([u8; 32], [u8; 32])> {
        let mut signature = SECP.sign_ecdsa(&Message::from_digest(*digest), private_key);
        signature.normalize_s();

        let compact = signature.serialize_compact();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&compact[..32]);
        s.copy_from_slice(&compact[32..]);
        Ok((r, s))
    }
}

/// Minimal positive DER INTEGER: leading zeros stripped, one zero re-added if the sign bit is set
fn encode_integer(out: &mut Vec<u8>, value: &[u8]) {
    let first = value.iter().position(|b| *b != 0).unwrap_or(value.len() - 1);
    let digits = &value[first..];

    out.push(0x02);
    if digits[0] & 0x80 != 0 {
        out.push(digits.len() as u8 + 1);
        out.push(0x00);
    } else {
        out.push(digits.len() as u8);
    }
    out.extend_from_slice(digits);
}

/// `30 len 02 len(r) r 02 len(s) s`
pub fn encode_der(r: &[u8; 32], s: &[u8; 32]) -> Vec<u8> {
    let mut body = Vec::with_capacity(70);
    encode_integer(&mut body, r);
    encode_integer(&mut body, s);

    let mut der = Vec::with_capacity(body.len() + 2);
    der.push(0x30);
    der.push(body.len() as u8);
    der.extend_from_slice(&body);
    der
}

/// Structural check for `DER || hash type` as found in input scripts
pub fn is_signature_push(data: &[u8]) -> bool {
    // 8 bytes minimum: 30 len 02 01 r 02 01 s + hash type
    if data.len() < 9 || data.len() > 73 || data[0] != 0x30 {
        return false;
    }
    data[1] as usize == data.len() - 3
}
