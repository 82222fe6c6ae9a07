//! # Authenticated session state
//!
//! A successful mutual authentication installs a [`Session`]: the cipher
//! family and number of the key that authenticated, the session key derived
//! from the exchanged nonces, and the init vector threaded through every
//! subsequent command of a 3K3DES or AES session. DES and 2K3DES sessions
//! keep the legacy behaviour of starting every cryptographic operation from
//! a zero vector, so their stored IV is never consulted between commands.
//!
//! The session owns key material: it is wiped when the value drops, which
//! happens on re-authentication, on any error that voids the card-side
//! authentication state, and on disconnect.

use zeroize::Zeroize;

/// Cipher family of a card key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    /// Single DES, 8-byte key
    Des,
    /// Two-key triple DES, 16-byte key
    Tdes,
    /// Three-key triple DES, 24-byte key
    Tktdes,
    /// AES-128, 16-byte key
    Aes,
}

impl KeyType {
    /// Expected key length in bytes
    pub fn key_len(&self) -> usize {
        match self {
            KeyType::Des => 8,
            KeyType::Tdes => 16,
            KeyType::Tktdes => 24,
            KeyType::Aes => 16,
        }
    }

    /// Cipher block size in bytes
    pub fn block_size(&self) -> usize {
        match self {
            KeyType::Aes => 16,
            _ => 8,
        }
    }

    /// True for the DES/2K3DES family using the MF3ICD40 compatible wrapping
    pub fn is_legacy(&self) -> bool {
        matches!(self, KeyType::Des | KeyType::Tdes)
    }

    /// Authenticate command opcode for this key family
    pub fn auth_ins(&self) -> u8 {
        match self {
            KeyType::Des | KeyType::Tdes => 0x0A,
            KeyType::Tktdes => 0x1A,
            KeyType::Aes => 0xAA,
        }
    }
}

/// State installed by a successful Authenticate
pub struct Session {
    key_type: KeyType,
    key_no: u8,
    key: Vec<u8>,
    iv: Vec<u8>,
}

impl Session {
    /// Create a fresh session with a zero init vector
    pub fn new(key_type: KeyType, key_no: u8, key: Vec<u8>) -> Session {
        Session {
            key_type,
            key_no,
            key,
            iv: vec![0; key_type.block_size()],
        }
    }

    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    /// Number of the authenticated key (low nibble is significant)
    pub fn key_no(&self) -> u8 {
        self.key_no & 0x0F
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn iv(&self) -> &[u8] {
        &self.iv
    }

    /// Replace the session IV with the last MAC or ciphertext block
    pub fn set_iv(&mut self, iv: &[u8]) {
        self.iv.clear();
        self.iv.extend_from_slice(iv);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.key.zeroize();
        self.iv.zeroize();
    }
}

/// Derive the session key from the authentication nonces
pub fn session_key(key_type: KeyType, rnd_a: &[u8], rnd_b: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(key_type.key_len());
    match key_type {
        KeyType::Des => {
            key.extend_from_slice(&rnd_a[0..4]);
            key.extend_from_slice(&rnd_b[0..4]);
        }
        KeyType::Tdes => {
            key.extend_from_slice(&rnd_a[0..4]);
            key.extend_from_slice(&rnd_b[0..4]);
            key.extend_from_slice(&rnd_a[4..8]);
            key.extend_from_slice(&rnd_b[4..8]);
        }
        KeyType::Tktdes => {
            key.extend_from_slice(&rnd_a[0..4]);
            key.extend_from_slice(&rnd_b[0..4]);
            key.extend_from_slice(&rnd_a[6..10]);
            key.extend_from_slice(&rnd_b[6..10]);
            key.extend_from_slice(&rnd_a[12..16]);
            key.extend_from_slice(&rnd_b[12..16]);
        }
        KeyType::Aes => {
            key.extend_from_slice(&rnd_a[0..4]);
            key.extend_from_slice(&rnd_b[0..4]);
            key.extend_from_slice(&rnd_a[12..16]);
            key.extend_from_slice(&rnd_b[12..16]);
        }
    }
    key
}

/// Clear the version bits DES family keys carry in the LSB of each byte
pub(crate) fn clear_version_bits(key: &mut [u8]) {
    for b in key.iter_mut() {
        *b &= 0xFE;
    }
}

/// Encode an 8-bit key version into the LSBs of the first 8 key bytes, MSB first
pub(crate) fn set_version_bits(key: &mut [u8], version: u8) {
    for (i, b) in key.iter_mut().take(8).enumerate() {
        *b = (*b & 0xFE) | ((version >> (7 - i)) & 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn key_lengths_and_blocks() {
        assert_eq!(KeyType::Des.key_len(), 8);
        assert_eq!(KeyType::Tdes.key_len(), 16);
        assert_eq!(KeyType::Tktdes.key_len(), 24);
        assert_eq!(KeyType::Aes.key_len(), 16);
        assert_eq!(KeyType::Aes.block_size(), 16);
        assert_eq!(KeyType::Tktdes.block_size(), 8);
        assert!(KeyType::Des.is_legacy());
        assert!(KeyType::Tdes.is_legacy());
        assert!(!KeyType::Tktdes.is_legacy());
        assert_eq!(KeyType::Tktdes.auth_ins(), 0x1A);
        assert_eq!(KeyType::Aes.auth_ins(), 0xAA);
    }

    #[test]
    fn derive_aes_session_key() {
        let rnd_a = hex!("000102030405060708090a0b0c0d0e0f");
        let rnd_b = hex!("101112131415161718191a1b1c1d1e1f");
        let key = session_key(KeyType::Aes, &rnd_a, &rnd_b);
        assert_eq!(key, hex!("00010203101112130c0d0e0f1c1d1e1f"));
    }

    #[test]
    fn derive_legacy_session_keys() {
        let rnd_a = hex!("0011223344556677");
        let rnd_b = hex!("8899aabbccddeeff");
        assert_eq!(session_key(KeyType::Des, &rnd_a, &rnd_b), hex!("001122338899aabb"));
        assert_eq!(
            session_key(KeyType::Tdes, &rnd_a, &rnd_b),
            hex!("001122338899aabb44556677ccddeeff")
        );
    }

    #[test]
    fn derive_tktdes_session_key() {
        let rnd_a = hex!("000102030405060708090a0b0c0d0e0f");
        let rnd_b = hex!("101112131415161718191a1b1c1d1e1f");
        assert_eq!(
            session_key(KeyType::Tktdes, &rnd_a, &rnd_b),
            hex!("000102031011121306070809161718190c0d0e0f1c1d1e1f")
        );
    }

    #[test]
    fn version_bits() {
        let mut key = hex!("0102030405060708");
        set_version_bits(&mut key, 0x55);
        assert_eq!(key, hex!("0003020504070609"));
        clear_version_bits(&mut key);
        assert_eq!(key, hex!("0002020504060608"));
    }

    #[test]
    fn session_masks_key_number() {
        let s = Session::new(KeyType::Aes, 0x83, vec![0; 16]);
        assert_eq!(s.key_no(), 0x03);
        assert_eq!(s.iv(), &[0u8; 16]);
    }
}
