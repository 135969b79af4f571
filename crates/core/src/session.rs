//! Opaque session tokens.
//!
//! A token carries `(offset, nonce)`: the nonce names the visitor's session
//! for the day and the offset is the event count the recorder last returned.
//! Numbers are zigzag varints behind one salted checksum byte, then URL-safe
//! base64 without padding, so a token fits in a cookie or a query parameter.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::limits::{MAX_NONCE, MAX_TOKEN_LEN, NEW_SESSION_OFFSET, SPAM_MARKER};

/// Decoded session identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionToken {
    pub offset: i64,
    pub nonce: u32,
}

impl SessionToken {
    /// A token for a brand new session with a random nonce.
    pub fn fresh<R: Rng>(rng: &mut R) -> Self {
        Self {
            offset: NEW_SESSION_OFFSET,
            nonce: rng.gen_range(1..=MAX_NONCE),
        }
    }

    pub fn is_new(&self) -> bool {
        self.offset == NEW_SESSION_OFFSET
    }

    /// Same session, advanced to the offset returned by the store.
    pub fn with_offset(self, offset: i64) -> Self {
        Self { offset, ..self }
    }
}

/// Salted token encoder shared by every request handler.
#[derive(Clone)]
pub struct SessionCodec {
    salt: Vec<u8>,
}

impl std::fmt::Debug for SessionCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCodec").finish_non_exhaustive()
    }
}

impl SessionCodec {
    pub fn new(salt: impl AsRef<[u8]>) -> Self {
        Self {
            salt: salt.as_ref().to_vec(),
        }
    }

    pub fn encode(&self, token: &SessionToken) -> String {
        self.encode_numbers(&[token.offset, i64::from(token.nonce)])
    }

    /// Decodes a token produced by [`SessionCodec::encode`] with the same salt.
    ///
    /// Neutered spam tokens, foreign salts and truncated input all fail with
    /// `InvalidToken`; callers start a new session in that case.
    pub fn decode(&self, raw: &str) -> Result<SessionToken> {
        let numbers = self.decode_numbers(raw)?;
        let &[offset, nonce] = numbers.as_slice() else {
            return Err(Error::invalid_token(format!(
                "expected 2 numbers, got {}",
                numbers.len()
            )));
        };

        let nonce = u32::try_from(nonce)
            .ok()
            .filter(|n| *n <= MAX_NONCE)
            .ok_or_else(|| Error::invalid_token(format!("nonce {nonce} out of range")))?;

        if offset < NEW_SESSION_OFFSET {
            return Err(Error::invalid_token(format!("offset {offset} out of range")));
        }

        Ok(SessionToken { offset, nonce })
    }

    /// A syntactically valid token that never decodes to a session.
    ///
    /// Handed to blacklisted referrers so the response is indistinguishable
    /// from a real one.
    pub fn neutered_token<R: Rng>(&self, rng: &mut R) -> String {
        self.encode_numbers(&[
            NEW_SESSION_OFFSET,
            i64::from(rng.gen_range(0..=MAX_NONCE)),
            i64::from(rng.gen_range(0..=MAX_NONCE)),
            SPAM_MARKER,
        ])
    }

    /// True for tokens minted by [`SessionCodec::neutered_token`].
    pub fn is_neutered(&self, raw: &str) -> bool {
        matches!(
            self.decode_numbers(raw).as_deref(),
            Ok([_, _, _, marker]) if *marker == SPAM_MARKER
        )
    }

    fn encode_numbers(&self, numbers: &[i64]) -> String {
        let mut payload = Vec::with_capacity(numbers.len() * 5 + 1);
        payload.push(0);
        for n in numbers {
            write_varint(&mut payload, zigzag(*n));
        }
        payload[0] = self.checksum(&payload[1..]);
        URL_SAFE_NO_PAD.encode(payload)
    }

    fn decode_numbers(&self, raw: &str) -> Result<Vec<i64>> {
        let raw = raw.trim();
        if raw.is_empty() || raw.len() > MAX_TOKEN_LEN {
            return Err(Error::invalid_token(format!("bad length {}", raw.len())));
        }

        let bytes = URL_SAFE_NO_PAD
            .decode(raw)
            .map_err(|e| Error::invalid_token(e.to_string()))?;

        let Some((&check, body)) = bytes.split_first() else {
            return Err(Error::invalid_token("empty payload"));
        };
        if body.is_empty() || check != self.checksum(body) {
            return Err(Error::invalid_token("checksum mismatch"));
        }

        let mut numbers = Vec::new();
        let mut rest = body;
        while !rest.is_empty() {
            let (value, used) = read_varint(rest)?;
            numbers.push(unzigzag(value));
            rest = &rest[used..];
        }
        Ok(numbers)
    }

    fn checksum(&self, body: &[u8]) -> u8 {
        let digest = Sha256::new()
            .chain_update(&self.salt)
            .chain_update(body)
            .finalize();
        digest[0]
    }
}

fn zigzag(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

fn unzigzag(z: u64) -> i64 {
    ((z >> 1) as i64) ^ -((z & 1) as i64)
}

fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

fn read_varint(bytes: &[u8]) -> Result<(u64, usize)> {
    let mut value = 0u64;
    for (i, byte) in bytes.iter().enumerate().take(10) {
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(Error::invalid_token("truncated varint"))
}
