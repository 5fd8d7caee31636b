//! Field-exact binary codec for legacy (non-witness) transactions
//!
//! Layout:
//! - version: 4-byte little-endian
//! - input count: variable-length integer
//! - inputs: prev txid (32 bytes, wire order), prev index (4-byte LE),
//!   length-prefixed script, sequence (4-byte LE)
//! - output count: variable-length integer
//! - outputs: amount (8-byte LE satoshis), length-prefixed script
//! - lock time: 4-byte LE
//!
//! `encode(parse(bytes)) == bytes` for every input `parse` accepts, so parsing
//! rejects non-minimal variable-length integers and trailing data.

use super::error::{CodecError, CodecResult};
use bitcoin::hashes::{sha256d, Hash};
use byteorder::{LittleEndian, ReadBytesExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Cursor, Read};
use std::str::FromStr;

/// Sequence value for inputs that opt out of replacement and lock time
pub const SEQUENCE_FINAL: u32 = 0xffff_ffff;

/// Transaction id in wire byte order; displayed reversed like the ledger does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Txid([u8; 32]);

impl Txid {
    pub fn from_wire_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_wire_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Txid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut display = self.0;
        display.reverse();
        write!(f, "{}", hex::encode(display))
    }
}

impl FromStr for Txid {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| CodecError::InvalidTxid(s.to_string()))?;
        let mut wire: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CodecError::InvalidTxid(s.to_string()))?;
        wire.reverse();
        Ok(Self(wire))
    }
}

impl Serialize for Txid {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Txid {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Txid::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawInput {
    pub prev_txid: Txid,
    pub prev_index: u32,
    #[serde(with = "hex::serde")]
    pub script: Vec<u8>,
    pub sequence: u32,
}

impl RawInput {
    /// Unsigned input spending `prev_txid:prev_index`
    pub fn spending(prev_txid: Txid, prev_index: u32) -> Self {
        Self {
            prev_txid,
            prev_index,
            script: Vec::new(),
            sequence: SEQUENCE_FINAL,
        }
    }

    pub fn spends(&self, txid: &Txid, index: u32) -> bool {
        self.prev_txid == *txid && self.prev_index == index
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawOutput {
    /// Satoshis
    pub amount: u64,
    #[serde(with = "hex::serde")]
    pub script: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTransaction {
    pub version: u32,
    pub inputs: Vec<RawInput>,
    pub outputs: Vec<RawOutput>,
    pub lock_time: u32,
}

impl Default for RawTransaction {
    fn default() -> Self {
        Self {
            version: 1,
            inputs: Vec::new(),
            outputs: Vec::new(),
            lock_time: 0,
        }
    }
}

impl RawTransaction {
    /// Parse raw transaction bytes
    ///
    /// A zero input count followed by `0x01` is also the segwit marker and
    /// flag. Such bytes are read as a legacy transaction first and only
    /// reported as witness data when that fails.
    pub fn parse(bytes: &[u8]) -> CodecResult<Self> {
        match Self::parse_legacy(bytes) {
            Err(_) if bytes.get(4..6) == Some(&[0x00, 0x01][..]) => {
                Err(CodecError::UnsupportedWitness)
            }
            result => result,
        }
    }

    fn parse_legacy(bytes: &[u8]) -> CodecResult<Self> {
        let mut reader = Reader::new(bytes);

        let version = reader.u32("version")?;

        let input_count = reader.var_int("input count")?;
        // Smallest possible input is 41 bytes
        reader.check_count("input", input_count, 41)?;
        let mut inputs = Vec::with_capacity(input_count as usize);
        for _ in 0..input_count {
            let prev_txid = Txid(reader.array::<32>("previous txid")?);
            let prev_index = reader.u32("previous output index")?;
            let script = reader.var_bytes("input script")?;
            let sequence = reader.u32("sequence")?;
            inputs.push(RawInput {
                prev_txid,
                prev_index,
                script,
                sequence,
            });
        }

        let output_count = reader.var_int("output count")?;
        // Smallest possible output is 9 bytes
        reader.check_count("output", output_count, 9)?;
        let mut outputs = Vec::with_capacity(output_count as usize);
        for _ in 0..output_count {
            let amount = reader.u64("amount")?;
            let script = reader.var_bytes("output script")?;
            outputs.push(RawOutput { amount, script });
        }

        let lock_time = reader.u32("lock time")?;

        let remaining = reader.remaining();
        if remaining > 0 {
            return Err(CodecError::TrailingBytes(remaining));
        }

        Ok(Self {
            version,
            inputs,
            outputs,
            lock_time,
        })
    }

    pub fn from_hex(tx_hex: &str) -> CodecResult<Self> {
        Self::parse(&hex::decode(tx_hex.trim())?)
    }

    /// Serialise to raw transaction bytes
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.size_hint());
        out.extend_from_slice(&self.version.to_le_bytes());

        write_var_int(&mut out, self.inputs.len() as u64);
        for input in &self.inputs {
            out.extend_from_slice(input.prev_txid.as_wire_bytes());
            out.extend_from_slice(&input.prev_index.to_le_bytes());
            write_var_bytes(&mut out, &input.script);
            out.extend_from_slice(&input.sequence.to_le_bytes());
        }

        write_var_int(&mut out, self.outputs.len() as u64);
        for output in &self.outputs {
            out.extend_from_slice(&output.amount.to_le_bytes());
            write_var_bytes(&mut out, &output.script);
        }

        out.extend_from_slice(&self.lock_time.to_le_bytes());
        out
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.encode())
    }

    /// Double SHA-256 of the serialisation, as shown by the ledger
    pub fn txid(&self) -> Txid {
        Txid(sha256d::Hash::hash(&self.encode()).to_byte_array())
    }

    /// Copy of the transaction with every input script cleared
    pub fn with_stripped_input_scripts(&self) -> Self {
        let mut stripped = self.clone();
        for input in &mut stripped.inputs {
            input.script.clear();
        }
        stripped
    }

    pub fn total_output_amount(&self) -> u64 {
        self.outputs.iter().map(|o| o.amount).sum()
    }

    fn size_hint(&self) -> usize {
        let inputs: usize = self.inputs.iter().map(|i| 41 + 8 + i.script.len()).sum();
        let outputs: usize = self.outputs.iter().map(|o| 9 + 8 + o.script.len()).sum();
        8 + 18 + inputs + outputs
    }
}

/// Append a variable-length integer: one byte below 0xfd, otherwise a marker
/// byte followed by a 2, 4 or 8 byte little-endian value
pub fn write_var_int(out: &mut Vec<u8>, value: u64) {
    match value {
        0..=0xfc => out.push(value as u8),
        0xfd..=0xffff => {
            out.push(0xfd);
            out.extend_from_slice(&(value as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            out.push(0xfe);
            out.extend_from_slice(&(value as u32).to_le_bytes());
        }
        _ => {
            out.push(0xff);
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
}

fn write_var_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    write_var_int(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

/// Cursor that reports which field ran out of data
struct Reader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(bytes),
        }
    }

    fn offset(&self) -> usize {
        self.cursor.position() as usize
    }

    fn remaining(&self) -> usize {
        self.cursor.get_ref().len().saturating_sub(self.offset())
    }

    fn truncated(&self, field: &'static str) -> CodecError {
        CodecError::Truncated {
            field,
            offset: self.offset(),
        }
    }

    fn u8(&mut self, field: &'static str) -> CodecResult<u8> {
        self.cursor.read_u8().map_err(|_| self.truncated(field))
    }

    fn u16(&mut self, field: &'static str) -> CodecResult<u16> {
        self.cursor
            .read_u16::<LittleEndian>()
            .map_err(|_| self.truncated(field))
    }

    fn u32(&mut self, field: &'static str) -> CodecResult<u32> {
        self.cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| self.truncated(field))
    }

    fn u64(&mut self, field: &'static str) -> CodecResult<u64> {
        self.cursor
            .read_u64::<LittleEndian>()
            .map_err(|_| self.truncated(field))
    }

    fn array<const N: usize>(&mut self, field: &'static str) -> CodecResult<[u8; N]> {
        let mut buf = [0u8; N];
        self.cursor
            .read_exact(&mut buf)
            .map_err(|_| self.truncated(field))?;
        Ok(buf)
    }

    fn var_int(&mut self, field: &'static str) -> CodecResult<u64> {
        let start = self.offset();
        let non_canonical = CodecError::NonCanonicalVarInt {
            field,
            offset: start,
        };
        match self.u8(field)? {
            0xfd => {
                let value = self.u16(field)? as u64;
                if value < 0xfd {
                    return Err(non_canonical);
                }
                Ok(value)
            }
            0xfe => {
                let value = self.u32(field)? as u64;
                if value <= 0xffff {
                    return Err(non_canonical);
                }
                Ok(value)
            }
            0xff => {
                let value = self.u64(field)?;
                if value <= 0xffff_ffff {
                    return Err(non_canonical);
                }
                Ok(value)
            }
            small => Ok(small as u64),
        }
    }

    fn var_bytes(&mut self, field: &'static str) -> CodecResult<Vec<u8>> {
        let len = self.var_int(field)?;
        if len > self.remaining() as u64 {
            return Err(self.truncated(field));
        }
        let mut buf = vec![0u8; len as usize];
        self.cursor
            .read_exact(&mut buf)
            .map_err(|_| self.truncated(field))?;
        Ok(buf)
    }

    fn check_count(&self, field: &'static str, count: u64, min_size: u64) -> CodecResult<()> {
        let remaining = self.remaining();
        if count.saturating_mul(min_size) > remaining as u64 {
            return Err(CodecError::InconsistentCount {
                field,
                count,
                remaining,
            });
        }
        Ok(())
    }
}
