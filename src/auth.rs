//! # Authentication and key management API
//!
//! Mutual authentication is a three pass challenge/response: the card sends
//! an enciphered nonce, the host answers with its own nonce chained to the
//! rotated card nonce, and the card proves knowledge of the key by sending
//! the rotated host nonce back. A successful run derives the session key
//! from both nonces and arms the secure messaging layer.
//!
//! All four key families share this shape and differ only in the opcode,
//! the block size and the derivation of the session key. DES and 2K3DES
//! run the cipher in the legacy decrypt-to-encipher modes; 3K3DES and AES
//! use plain CBC.
//!
//! ## Available Methods
//!
//! - [`authenticate`](Desfire::authenticate) - Run mutual authentication for a key
//! - [`change_key`](Desfire::change_key) - Replace a card key
//!
//! Changing the key that authenticated the session invalidates the session,
//! on the card and in the driver alike.

use log::debug;
use rand::RngCore;

use crate::cmd::additional_frame_cmd;
use crate::cmd::cmd_app::{authenticate_cmd, change_key_cmd};
use crate::crypto::cipher::{self, DES_BLOCK};
use crate::crypto::crc::{crc16, crc32};
use crate::secure::CommMode;
use crate::session::{self, KeyType, Session, clear_version_bits, set_version_bits};
use crate::status::{ADDITIONAL_FRAME, Status};
use crate::{Desfire, MifareError, SmartCardTransport};

/// Left rotation by one byte
pub(crate) fn rol(data: &[u8]) -> Vec<u8> {
    let mut out = data[1..].to_vec();
    out.push(data[0]);
    out
}

impl<T: SmartCardTransport> Desfire<T> {
    /// Run mutual authentication with the given key and install the session.
    /// Returns the derived session key.
    pub fn authenticate(
        &mut self,
        key: &[u8],
        key_no: u8,
        key_type: KeyType,
    ) -> Result<Vec<u8>, MifareError> {
        if key.len() != key_type.key_len() {
            return Err(MifareError::InvalidArgument("key length does not match key type"));
        }
        // a new authentication voids the previous one, success or not
        self.reset_session();

        let mut key = key.to_vec();
        if key_type != KeyType::Aes {
            clear_version_bits(&mut key);
        }
        let block = key_type.block_size();
        let zero_iv = vec![0u8; block];

        let resp = self.transceive(&authenticate_cmd(key_type.auth_ins(), key_no))?;
        let st = Status::from_slice(&resp);
        if st.sw2() != ADDITIONAL_FRAME {
            return Err(MifareError::UnexpectedStatus(st.sw2()));
        }
        if resp.len() != block + 2 {
            return Err(MifareError::AuthenticationRejected);
        }
        let ek_rnd_b = &resp[..block];
        let mut rnd_b = ek_rnd_b.to_vec();
        cipher::decipher(key_type, &key, &zero_iv, &mut rnd_b)?;

        let mut rnd_a = vec![0u8; block];
        rand::thread_rng().fill_bytes(&mut rnd_a);

        let mut token = rnd_a.clone();
        token.extend_from_slice(&rol(&rnd_b));
        // chain on the last ciphertext block received
        cipher::encipher(key_type, &key, ek_rnd_b, &mut token)?;

        let resp = self.transceive(&additional_frame_cmd(&token))?;
        Status::from_slice(&resp).check()?;
        if resp.len() != block + 2 {
            return Err(MifareError::AuthenticationRejected);
        }
        let mut rnd_a_card = resp[..block].to_vec();
        cipher::decipher(key_type, &key, &token[token.len() - block..], &mut rnd_a_card)?;
        if rnd_a_card != rol(&rnd_a) {
            return Err(MifareError::AuthenticationRejected);
        }

        let session_key = session::session_key(key_type, &rnd_a, &rnd_b);
        self.set_session(Session::new(key_type, key_no, session_key.clone()));
        debug!("authenticated key {:#04x} ({:?})", key_no, key_type);
        Ok(session_key)
    }

    /// Replace a card key. `old_key` is required when changing a key other
    /// than the one that authenticated the session. At PICC level only key 0
    /// exists and the new key family is signalled in the key number.
    pub fn change_key(
        &mut self,
        key_no: u8,
        version: u8,
        new_type: KeyType,
        new_key: &[u8],
        old_key: Option<&[u8]>,
    ) -> Result<(), MifareError> {
        let (session_type, auth_key_no) = match self.session() {
            Some(s) => (s.key_type(), s.key_no()),
            None => return Err(MifareError::NotAuthenticated),
        };
        if new_key.len() != new_type.key_len() {
            return Err(MifareError::InvalidArgument("key length does not match key type"));
        }

        let mut key_no_wire = key_no & 0x0F;
        if self.aid() == [0, 0, 0] {
            if key_no_wire != 0 {
                return Err(MifareError::InvalidArgument("only key 0 exists at PICC level"));
            }
            key_no_wire |= match new_type {
                KeyType::Tktdes => 0x40,
                KeyType::Aes => 0x80,
                _ => 0x00,
            };
        }
        let same_key = (key_no & 0x0F) == auth_key_no;

        // staging buffer, block multiple, zero padded by construction
        let mut plain = vec![0u8; if session_type.is_legacy() { 24 } else { 32 }];

        // single DES keys go on the wire doubled to 16 bytes
        let mut key_field = new_key.to_vec();
        if new_type == KeyType::Des {
            key_field.extend_from_slice(new_key);
        }
        plain[..key_field.len()].copy_from_slice(&key_field);

        let mut crc_span = key_field.len();
        if new_type == KeyType::Aes {
            plain[16] = version;
            crc_span = 17;
        } else {
            set_version_bits(&mut plain[..8], version);
        }

        if !same_key {
            let old = old_key
                .filter(|k| !k.is_empty())
                .ok_or(MifareError::InvalidArgument("old key required for a foreign key"))?;
            for (i, b) in plain[..key_field.len()].iter_mut().enumerate() {
                *b ^= old[i % old.len()];
            }
        }

        let mut idx = crc_span;
        if session_type.is_legacy() {
            let crc = crc16(&plain[..crc_span]);
            plain[idx..idx + 2].copy_from_slice(&crc);
            idx += 2;
            if !same_key {
                let crc = crc16(new_key);
                plain[idx..idx + 2].copy_from_slice(&crc);
            }
        } else {
            let mut buf = Vec::with_capacity(2 + crc_span);
            buf.push(0xC4);
            buf.push(key_no_wire);
            buf.extend_from_slice(&plain[..crc_span]);
            let crc = crc32(&buf);
            plain[idx..idx + 4].copy_from_slice(&crc);
            idx += 4;
            if !same_key {
                let crc = crc32(new_key);
                plain[idx..idx + 4].copy_from_slice(&crc);
            }
        }

        {
            let Some(session) = self.session_mut() else {
                return Err(MifareError::NotAuthenticated);
            };
            if session_type.is_legacy() {
                cipher::encipher(session_type, session.key(), &[0u8; DES_BLOCK], &mut plain)?;
            } else {
                let iv = session.iv().to_vec();
                cipher::encipher(session_type, session.key(), &iv, &mut plain)?;
                session.set_iv(&plain[plain.len() - session_type.block_size()..]);
            }
        }

        let resp = self.transceive(&change_key_cmd(key_no_wire, &plain))?;
        if same_key {
            // the card dropped its authentication state with the old key
            self.reset_session();
            Status::from_slice(&resp).check()?;
            debug!("changed key {:#04x}, session closed", key_no);
            Ok(())
        } else {
            self.postprocess(&resp, 0, CommMode::Plain).map(|_| ())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::cipher::{aes_cbc_decrypt, expand_des_key};
    use crate::testutil::{MockTransport, SimTransport, aes_card, aes_card_lenient, des_card};
    use ::cipher::generic_array::GenericArray;
    use ::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
    use hex_literal::hex;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn aes_authentication_installs_session() {
        let key = hex!("000102030405060708090a0b0c0d0e0f");
        let rnd_b = hex!("f0e1d2c3b4a5968778695a4b3c2d1e0f");
        let mut card = Desfire::new(SimTransport::new(aes_card(key, rnd_b)));
        let skey = card.authenticate(&key, 0, KeyType::Aes).unwrap();
        assert_eq!(skey.len(), 16);
        // session key carries the card nonce halves at fixed offsets
        assert_eq!(&skey[4..8], &rnd_b[0..4]);
        assert_eq!(&skey[12..16], &rnd_b[12..16]);
        let session = card.session().unwrap();
        assert_eq!(session.key_type(), KeyType::Aes);
        assert_eq!(session.iv(), &[0u8; 16]);
    }

    #[test]
    fn aes_authentication_with_wrong_card_key_fails() {
        let key = hex!("000102030405060708090a0b0c0d0e0f");
        let other = hex!("ffeeddccbbaa99887766554433221100");
        let rnd_b = [0x11u8; 16];
        let mut card = Desfire::new(SimTransport::new(aes_card_lenient(other, rnd_b)));
        let err = card.authenticate(&key, 0, KeyType::Aes).unwrap_err();
        assert_eq!(err, MifareError::AuthenticationRejected);
        assert!(card.session().is_none());
    }

    #[test]
    fn des_authentication_installs_session() {
        let key = hex!("0011223344556677");
        let rnd_b = hex!("8899aabbccddeeff");
        let mut card = Desfire::new(SimTransport::new(des_card(key, rnd_b)));
        let skey = card.authenticate(&key, 0, KeyType::Des).unwrap();
        assert_eq!(skey.len(), 8);
        assert_eq!(&skey[4..8], &rnd_b[0..4]);
        assert!(card.session().unwrap().key_type().is_legacy());
    }

    #[test]
    fn authenticate_rejects_bad_key_length() {
        let mut card = Desfire::new(MockTransport::new(&[]));
        let err = card.authenticate(&[0u8; 8], 0, KeyType::Aes).unwrap_err();
        assert!(matches!(err, MifareError::InvalidArgument(_)));
    }

    #[test]
    fn authenticate_propagates_card_refusal() {
        let mut card = Desfire::new(MockTransport::new(&[(
            &[0x90, 0xAA, 0x00, 0x00, 0x01, 0x03, 0x00],
            &[0x91, 0xAE],
        )]));
        let err = card.authenticate(&[0u8; 16], 3, KeyType::Aes).unwrap_err();
        assert_eq!(err, MifareError::UnexpectedStatus(0xAE));
    }

    #[test]
    fn change_key_requires_session() {
        let mut card = Desfire::new(MockTransport::new(&[]));
        let err = card
            .change_key(0, 0, KeyType::Aes, &[0u8; 16], None)
            .unwrap_err();
        assert_eq!(err, MifareError::NotAuthenticated);
    }

    #[test]
    fn change_key_of_auth_key_closes_session() {
        let key = hex!("000102030405060708090a0b0c0d0e0f");
        let rnd_b = [0x22u8; 16];
        let new_key = hex!("ffeeddccbbaa99887766554433221100");
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        let mut auth = aes_card(key, rnd_b);
        let mut card = Desfire::new(SimTransport::new(move |apdu: &[u8]| {
            if apdu[1] == 0xC4 {
                log.borrow_mut().push(apdu.to_vec());
                vec![0x91, 0x00]
            } else {
                auth(apdu)
            }
        }));
        let skey = card.authenticate(&key, 0, KeyType::Aes).unwrap();
        card.change_key(0, 0x10, KeyType::Aes, &new_key, None).unwrap();
        assert!(card.session().is_none());

        let frames = seen.borrow();
        let apdu = &frames[0];
        // PICC level AES change announces the family in the key number
        assert_eq!(apdu[5], 0x80);
        assert_eq!(apdu[4], 1 + 32);
        let mut cryptogram = apdu[6..38].to_vec();
        // session IV was zero right after authentication
        aes_cbc_decrypt(&skey, &[0u8; 16], &mut cryptogram).unwrap();
        assert_eq!(&cryptogram[..16], &new_key);
        assert_eq!(cryptogram[16], 0x10);
        let mut crc_buf = vec![0xC4, 0x80];
        crc_buf.extend_from_slice(&cryptogram[..17]);
        assert_eq!(&cryptogram[17..21], &crc32(&crc_buf));
    }

    #[test]
    fn change_foreign_key_xors_old_key_and_keeps_session() {
        let key = hex!("000102030405060708090a0b0c0d0e0f");
        let rnd_b = [0x33u8; 16];
        let new_key = hex!("a0a1a2a3a4a5a6a7a8a9aaabacadaeaf");
        let old_key = hex!("5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a");
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        let mut auth = aes_card(key, rnd_b);
        let skey = Rc::new(RefCell::new(Vec::new()));
        let skey_for_card = skey.clone();
        let mut card = Desfire::new(SimTransport::new(move |apdu: &[u8]| {
            if apdu[1] == 0xC4 {
                log.borrow_mut().push(apdu.to_vec());
                // answer with a valid CMAC over the empty payload
                let sk = skey_for_card.borrow();
                let mut iv = [0u8; 16];
                // the outbound cryptogram is the IV for the response MAC
                iv.copy_from_slice(&apdu[apdu.len() - 17..apdu.len() - 1]);
                let tag = crate::crypto::cmac::cmac_aes(&sk, &iv, &[0x00]).unwrap();
                let mut resp = tag[..8].to_vec();
                resp.extend_from_slice(&[0x91, 0x00]);
                resp
            } else {
                auth(apdu)
            }
        }));
        // work inside an application so key 2 is a legal target
        card.set_aid([0x01, 0x02, 0x03]);
        *skey.borrow_mut() = card.authenticate(&key, 0, KeyType::Aes).unwrap();
        card.change_key(2, 0, KeyType::Aes, &new_key, Some(&old_key)).unwrap();
        assert!(card.session().is_some());

        let frames = seen.borrow();
        let apdu = &frames[0];
        assert_eq!(apdu[5], 0x02);
        let mut cryptogram = apdu[6..38].to_vec();
        aes_cbc_decrypt(&skey.borrow(), &[0u8; 16], &mut cryptogram).unwrap();
        let xored: Vec<u8> = new_key.iter().zip(old_key.iter()).map(|(n, o)| n ^ o).collect();
        assert_eq!(&cryptogram[..16], &xored[..]);
        // second CRC covers the raw new key
        assert_eq!(&cryptogram[21..25], &crc32(&new_key));
    }

    #[test]
    fn change_key_picc_level_rejects_nonzero_number() {
        let key = hex!("000102030405060708090a0b0c0d0e0f");
        let mut card = Desfire::new(SimTransport::new(aes_card(key, [0x44u8; 16])));
        card.authenticate(&key, 0, KeyType::Aes).unwrap();
        let err = card
            .change_key(1, 0, KeyType::Aes, &[0u8; 16], Some(&[0u8; 16]))
            .unwrap_err();
        assert!(matches!(err, MifareError::InvalidArgument(_)));
    }

    #[test]
    fn rol_rotates_left_by_one() {
        assert_eq!(super::rol(&[1, 2, 3, 4]), vec![2, 3, 4, 1]);
    }

    #[test]
    fn des_card_model_is_consistent() {
        let key = hex!("0011223344556677");
        let tdes = des::TdesEde3::new_from_slice(&expand_des_key(&key).unwrap()).unwrap();
        let mut block = hex!("0123456789abcdef");
        let orig = block;
        tdes.encrypt_block(GenericArray::from_mut_slice(&mut block));
        tdes.decrypt_block(GenericArray::from_mut_slice(&mut block));
        assert_eq!(block, orig);
    }
}
