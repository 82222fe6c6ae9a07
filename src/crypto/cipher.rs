//! # Block cipher chaining
//!
//! CBC encryption and decryption with a caller supplied init vector for the
//! two cipher families the cards use, plus the two legacy chaining modes of
//! the MF3ICD40 generation. In those legacy modes the PCD always runs the
//! block cipher in decrypt direction, even to encipher data: the card runs
//! the encrypt direction on its side. SEND mode XORs each plaintext block
//! with the previous ciphertext block before deciphering; RECEIVE mode
//! deciphers first and XORs with the previous plaintext block.
//!
//! Buffers are processed in place and must be a multiple of the block size;
//! the secure messaging layer zero-pads before calling in here.

use aes::Aes128;
use cipher::generic_array::GenericArray;
use cipher::{BlockDecrypt, BlockDecryptMut, BlockEncryptMut, KeyInit, KeyIvInit};
use des::TdesEde3;

use crate::MifareError;
use crate::session::KeyType;

/// Block size of the DES family
pub const DES_BLOCK: usize = 8;
/// Block size of AES-128
pub const AES_BLOCK: usize = 16;

/// Expand an 8/16/24-byte DES family key to the 24 bytes 3DES expects
/// (K1‖K1‖K1 for single DES, K1‖K2‖K1 for two-key 3DES)
pub fn expand_des_key(key: &[u8]) -> Result<[u8; 24], MifareError> {
    let mut out = [0u8; 24];
    match key.len() {
        8 => {
            out[0..8].copy_from_slice(key);
            out[8..16].copy_from_slice(key);
            out[16..24].copy_from_slice(key);
        }
        16 => {
            out[0..16].copy_from_slice(key);
            out[16..24].copy_from_slice(&key[0..8]);
        }
        24 => out.copy_from_slice(key),
        _ => return Err(MifareError::InvalidArgument("bad DES family key length")),
    }
    Ok(out)
}

fn tdes_cipher(key: &[u8]) -> Result<TdesEde3, MifareError> {
    let key = expand_des_key(key)?;
    TdesEde3::new_from_slice(&key).map_err(|_| MifareError::InvalidArgument("bad 3DES key"))
}

/// AES-128 CBC encryption with explicit IV
pub fn aes_cbc_encrypt(key: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<(), MifareError> {
    let mut enc = cbc::Encryptor::<Aes128>::new_from_slices(key, iv)
        .map_err(|_| MifareError::InvalidArgument("bad AES key or IV"))?;
    for block in buf.chunks_exact_mut(AES_BLOCK) {
        enc.encrypt_block_mut(GenericArray::from_mut_slice(block));
    }
    Ok(())
}

/// AES-128 CBC decryption with explicit IV
pub fn aes_cbc_decrypt(key: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<(), MifareError> {
    let mut dec = cbc::Decryptor::<Aes128>::new_from_slices(key, iv)
        .map_err(|_| MifareError::InvalidArgument("bad AES key or IV"))?;
    for block in buf.chunks_exact_mut(AES_BLOCK) {
        dec.decrypt_block_mut(GenericArray::from_mut_slice(block));
    }
    Ok(())
}

/// 3DES CBC encryption with explicit IV
pub fn tdes_cbc_encrypt(key: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<(), MifareError> {
    let key = expand_des_key(key)?;
    let mut enc = cbc::Encryptor::<TdesEde3>::new_from_slices(&key, iv)
        .map_err(|_| MifareError::InvalidArgument("bad 3DES key or IV"))?;
    for block in buf.chunks_exact_mut(DES_BLOCK) {
        enc.encrypt_block_mut(GenericArray::from_mut_slice(block));
    }
    Ok(())
}

/// 3DES CBC decryption with explicit IV
pub fn tdes_cbc_decrypt(key: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<(), MifareError> {
    let key = expand_des_key(key)?;
    let mut dec = cbc::Decryptor::<TdesEde3>::new_from_slices(&key, iv)
        .map_err(|_| MifareError::InvalidArgument("bad 3DES key or IV"))?;
    for block in buf.chunks_exact_mut(DES_BLOCK) {
        dec.decrypt_block_mut(GenericArray::from_mut_slice(block));
    }
    Ok(())
}

/// Legacy SEND mode: XOR with the previous ciphertext block, then decipher
pub fn des_send(key: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<(), MifareError> {
    let cipher = tdes_cipher(key)?;
    let mut prev = [0u8; DES_BLOCK];
    prev.copy_from_slice(iv);
    for block in buf.chunks_exact_mut(DES_BLOCK) {
        for (b, p) in block.iter_mut().zip(prev.iter()) {
            *b ^= *p;
        }
        cipher.decrypt_block(GenericArray::from_mut_slice(block));
        prev.copy_from_slice(block);
    }
    Ok(())
}

/// Legacy RECEIVE mode: decipher, then XOR with the previous plaintext block
pub fn des_receive(key: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<(), MifareError> {
    let cipher = tdes_cipher(key)?;
    let mut prev = [0u8; DES_BLOCK];
    prev.copy_from_slice(iv);
    for block in buf.chunks_exact_mut(DES_BLOCK) {
        cipher.decrypt_block(GenericArray::from_mut_slice(block));
        for (b, p) in block.iter_mut().zip(prev.iter()) {
            *b ^= *p;
        }
        prev.copy_from_slice(block);
    }
    Ok(())
}

/// Encipher an outbound buffer the way the session's key family requires
pub(crate) fn encipher(
    key_type: KeyType,
    key: &[u8],
    iv: &[u8],
    buf: &mut [u8],
) -> Result<(), MifareError> {
    match key_type {
        KeyType::Des | KeyType::Tdes => des_send(key, iv, buf),
        KeyType::Tktdes => tdes_cbc_encrypt(key, iv, buf),
        KeyType::Aes => aes_cbc_encrypt(key, iv, buf),
    }
}

/// Decipher an inbound buffer the way the session's key family requires
pub(crate) fn decipher(
    key_type: KeyType,
    key: &[u8],
    iv: &[u8],
    buf: &mut [u8],
) -> Result<(), MifareError> {
    match key_type {
        KeyType::Des | KeyType::Tdes => des_receive(key, iv, buf),
        KeyType::Tktdes => tdes_cbc_decrypt(key, iv, buf),
        KeyType::Aes => aes_cbc_decrypt(key, iv, buf),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cipher::BlockEncrypt;
    use hex_literal::hex;

    #[test]
    fn expand_key_variants() {
        let k8 = hex!("0011223344556677");
        assert_eq!(
            expand_des_key(&k8).unwrap(),
            hex!("001122334455667700112233445566770011223344556677")
        );
        let k16 = hex!("00112233445566778899aabbccddeeff");
        assert_eq!(
            expand_des_key(&k16).unwrap(),
            hex!("00112233445566778899aabbccddeeff0011223344556677")
        );
        assert!(expand_des_key(&[0u8; 7]).is_err());
    }

    #[test]
    fn aes_cbc_nist_vector() {
        let key = hex!("2b7e151628aed2a6abf7158809cf4f3c");
        let iv = hex!("000102030405060708090a0b0c0d0e0f");
        let mut buf = hex!("6bc1bee22e409f96e93d7e117393172a");
        aes_cbc_encrypt(&key, &iv, &mut buf).unwrap();
        assert_eq!(buf, hex!("7649abac8119b246cee98e9b12e9197d"));
        aes_cbc_decrypt(&key, &iv, &mut buf).unwrap();
        assert_eq!(buf, hex!("6bc1bee22e409f96e93d7e117393172a"));
    }

    #[test]
    fn tdes_cbc_round_trip() {
        let key = hex!("0123456789abcdef23456789abcdef010123456789abcdef");
        let iv = hex!("fedcba9876543210");
        let plain = hex!("00112233445566778899aabbccddeeff");
        let mut buf = plain;
        tdes_cbc_encrypt(&key, &iv, &mut buf).unwrap();
        assert_ne!(buf, plain);
        tdes_cbc_decrypt(&key, &iv, &mut buf).unwrap();
        assert_eq!(buf, plain);
    }

    // The card enciphers with the encrypt direction, so a raw block encrypt
    // must undo a single-block SEND transform.
    #[test]
    fn send_mode_is_decrypt_direction() {
        let key = hex!("00112233445566778899aabbccddeeff");
        let plain = hex!("0123456789abcdef");
        let mut buf = plain;
        des_send(&key, &[0u8; 8], &mut buf).unwrap();
        let cipher = TdesEde3::new_from_slice(&expand_des_key(&key).unwrap()).unwrap();
        let mut block = buf;
        cipher.encrypt_block(GenericArray::from_mut_slice(&mut block));
        assert_eq!(block, plain);
    }

    #[test]
    fn receive_mode_inverts_card_encryption() {
        let key = hex!("00112233445566778899aabbccddeeff");
        let plain = hex!("0123456789abcdef");
        let cipher = TdesEde3::new_from_slice(&expand_des_key(&key).unwrap()).unwrap();
        let mut buf = plain;
        cipher.encrypt_block(GenericArray::from_mut_slice(&mut buf));
        des_receive(&key, &[0u8; 8], &mut buf).unwrap();
        assert_eq!(buf, plain);
    }

    #[test]
    fn send_mode_chains_on_ciphertext() {
        let key = hex!("00112233445566778899aabbccddeeff");
        let mut two = hex!("01234567 89abcdef fedcba98 76543210");
        let first = {
            let mut b = hex!("0123456789abcdef");
            des_send(&key, &[0u8; 8], &mut b).unwrap();
            b
        };
        des_send(&key, &[0u8; 8], &mut two).unwrap();
        assert_eq!(two[0..8], first);
        // second block was XORed with the first ciphertext block
        let mut second = hex!("fedcba9876543210");
        des_send(&key, &first, &mut second).unwrap();
        assert_eq!(two[8..16], second);
    }

    #[test]
    fn receive_mode_chains_on_plaintext() {
        let key = hex!("00112233445566778899aabbccddeeff");
        let cipher = TdesEde3::new_from_slice(&expand_des_key(&key).unwrap()).unwrap();
        let mut c1 = hex!("0123456789abcdef");
        let mut c2 = hex!("fedcba9876543210");
        let mut both = [0u8; 16];
        both[0..8].copy_from_slice(&c1);
        both[8..16].copy_from_slice(&c2);
        des_receive(&key, &[0u8; 8], &mut both).unwrap();
        cipher.decrypt_block(GenericArray::from_mut_slice(&mut c1));
        assert_eq!(both[0..8], c1);
        cipher.decrypt_block(GenericArray::from_mut_slice(&mut c2));
        for (b, p) in c2.iter_mut().zip(c1.iter()) {
            *b ^= *p;
        }
        assert_eq!(both[8..16], c2);
    }
}
