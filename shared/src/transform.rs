//! Byte-transform pair applied at the link margins
//!
//! Stand-ins for the packetization and encryption a real mission inserts
//! between the logical JSON payload and the radio. Both directions are
//! total: they never fail on input produced by the paired half, and
//! `decode(encode(payload)) == payload` holds for every payload.

use bytes::Bytes;

/// Placeholder for packetization
pub fn packetize(data: Bytes) -> Bytes {
    data
}

/// Placeholder for depacketization
pub fn depacketize(data: Bytes) -> Bytes {
    data
}

/// Placeholder for encryption
pub fn encrypt(data: Bytes) -> Bytes {
    data
}

/// Placeholder for decryption
pub fn decrypt(data: Bytes) -> Bytes {
    data
}

/// Logical payload -> transport bytes
pub fn encode(payload: Bytes) -> Bytes {
    encrypt(packetize(payload))
}

/// Transport bytes -> logical payload
pub fn decode(bytes: Bytes) -> Bytes {
    depacketize(decrypt(bytes))
}
