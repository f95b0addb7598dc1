//! TON Address Normalization
//!
//! The same account has three common spellings: raw (`0:<hex>`), bounceable
//! user-friendly (`EQ...`), and non-bounceable user-friendly (`UQ...`).
//! They are not byte-equal, so every address is normalized to one canonical
//! form (non-bounceable, mainnet, url-safe base64) before it is stored,
//! compared, or sent anywhere.

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use thiserror::Error;

/// Address parsing errors
#[derive(Debug, Error)]
pub enum AddressError {
    #[error("invalid address length: {0}")]
    InvalidLength(usize),

    #[error("invalid workchain: {0}")]
    InvalidWorkchain(String),

    #[error("invalid address encoding: {0}")]
    InvalidEncoding(String),

    #[error("address checksum mismatch")]
    ChecksumMismatch,

    #[error("unknown address tag: {0:#x}")]
    UnknownTag(u8),
}

/// A parsed TON account address: workchain + 32-byte account hash
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TonAddress {
    pub workchain: i8,
    pub hash: [u8; 32],
}

const TAG_BOUNCEABLE: u8 = 0x11;
const TAG_NON_BOUNCEABLE: u8 = 0x51;
const TAG_TESTNET: u8 = 0x80;

impl TonAddress {
    /// Parse any of the three spellings
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        let s = s.trim();
        if s.contains(':') {
            Self::parse_raw(s)
        } else {
            Self::parse_friendly(s)
        }
    }

    /// Parse the raw `<workchain>:<64 hex chars>` form
    fn parse_raw(s: &str) -> Result<Self, AddressError> {
        let (wc, hash_hex) = s
            .split_once(':')
            .ok_or_else(|| AddressError::InvalidEncoding(s.to_string()))?;

        let workchain: i8 = wc
            .parse()
            .map_err(|_| AddressError::InvalidWorkchain(wc.to_string()))?;

        if hash_hex.len() != 64 {
            return Err(AddressError::InvalidLength(hash_hex.len()));
        }

        let bytes =
            hex::decode(hash_hex).map_err(|e| AddressError::InvalidEncoding(e.to_string()))?;
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&bytes);

        Ok(Self { workchain, hash })
    }

    /// Parse the 48-character user-friendly form (either base64 alphabet)
    fn parse_friendly(s: &str) -> Result<Self, AddressError> {
        if s.len() != 48 {
            return Err(AddressError::InvalidLength(s.len()));
        }

        let bytes = URL_SAFE
            .decode(s)
            .or_else(|_| STANDARD.decode(s))
            .map_err(|e| AddressError::InvalidEncoding(e.to_string()))?;

        if bytes.len() != 36 {
            return Err(AddressError::InvalidLength(bytes.len()));
        }

        let expected = crc16_xmodem(&bytes[..34]);
        let actual = u16::from_be_bytes([bytes[34], bytes[35]]);
        if expected != actual {
            return Err(AddressError::ChecksumMismatch);
        }

        let tag = bytes[0] & !TAG_TESTNET;
        if tag != TAG_BOUNCEABLE && tag != TAG_NON_BOUNCEABLE {
            return Err(AddressError::UnknownTag(bytes[0]));
        }

        let workchain = bytes[1] as i8;
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&bytes[2..34]);

        Ok(Self { workchain, hash })
    }

    /// Render the user-friendly form
    pub fn to_friendly(&self, bounceable: bool, testnet: bool) -> String {
        let mut tag = if bounceable {
            TAG_BOUNCEABLE
        } else {
            TAG_NON_BOUNCEABLE
        };
        if testnet {
            tag |= TAG_TESTNET;
        }

        let mut bytes = Vec::with_capacity(36);
        bytes.push(tag);
        bytes.push(self.workchain as u8);
        bytes.extend_from_slice(&self.hash);

        let crc = crc16_xmodem(&bytes);
        bytes.extend_from_slice(&crc.to_be_bytes());

        URL_SAFE.encode(bytes)
    }

    /// Render the raw form
    pub fn to_raw(&self) -> String {
        format!("{}:{}", self.workchain, hex::encode(self.hash))
    }

    /// The canonical spelling used everywhere in this service:
    /// non-bounceable, mainnet, url-safe
    pub fn to_canonical(&self) -> String {
        self.to_friendly(false, false)
    }
}

impl std::fmt::Display for TonAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_canonical())
    }
}

/// Normalize any spelling to the canonical form
pub fn normalize(addr: &str) -> Result<String, AddressError> {
    Ok(TonAddress::parse(addr)?.to_canonical())
}

/// Whether two address strings denote the same account. Falls back to a
/// prefix-insensitive string compare when either side fails to parse, so a
/// malformed external value cannot panic a comparison path.
pub fn same_account(a: &str, b: &str) -> bool {
    match (TonAddress::parse(a), TonAddress::parse(b)) {
        (Ok(left), Ok(right)) => left == right,
        _ => {
            let strip = |s: &str| s.trim().trim_start_matches("0:").to_string();
            strip(a) == strip(b)
        }
    }
}

/// CRC-16/XMODEM, as used by TON user-friendly addresses
fn crc16_xmodem(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}
