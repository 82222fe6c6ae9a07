//! # MIFARE Ultralight C driver
//!
//! The Ultralight C is a far smaller card than the DESFire: 48 pages of
//! 4 bytes, a 2K3DES authentication key stored in pages 0x2C..=0x2F and no
//! secure messaging at all. Commands travel as reader level pseudo APDUs
//! (`FF` class); the three pass authentication tunnels the native `0x1A`
//! exchange and shares the legacy 3DES chaining modes with the DESFire
//! driver.
//!
//! ## Available Methods
//!
//! - [`authenticate`](UltralightC::authenticate) - Run the 3DES mutual authentication
//! - [`read_page`](UltralightC::read_page) - Read one 4-byte page
//! - [`update_page`](UltralightC::update_page) - Write one user memory page
//! - [`change_key`](UltralightC::change_key) - Write a new authentication key
//!
//! The key pages are write only; after [`change_key`](UltralightC::change_key)
//! the new key proves itself by authenticating again.

use log::debug;
use rand::RngCore;

use crate::auth::rol;
use crate::crypto::cipher::{DES_BLOCK, des_receive, des_send};
use crate::status::Status;
use crate::{MifareError, SmartCardTransport};

/// Highest readable page
const READ_MAX_PAGE: u8 = 43;
/// First and last page of user memory
const USER_FIRST_PAGE: u8 = 4;
const USER_LAST_PAGE: u8 = 39;
/// The 16-byte key lives in these four pages, write only
const KEY_PAGE_BASE: u8 = 0x2C;

/// MIFARE Ultralight C driver
pub struct UltralightC<T: SmartCardTransport> {
    transport: T,
    last_sw: (u8, u8),
}

impl<T: SmartCardTransport> UltralightC<T> {
    /// Create a driver on top of a reader channel
    pub fn new(transport: T) -> Self {
        UltralightC { transport, last_sw: (0, 0) }
    }

    /// Acquire the reader and card channel
    pub fn connect(&mut self) -> bool {
        self.transport.connect()
    }

    /// Release the reader
    pub fn disconnect(&mut self) -> bool {
        self.transport.disconnect()
    }

    /// Status word of the last exchanged frame, for diagnostics
    pub fn last_status_word(&self) -> (u8, u8) {
        self.last_sw
    }

    fn transceive(&mut self, apdu: &[u8]) -> Result<Vec<u8>, MifareError> {
        let resp = self.transport.transmit(apdu)?;
        if resp.len() < 2 {
            return Err(MifareError::Transport("short response".into()));
        }
        let st = Status::from_slice(&resp);
        self.last_sw = (st.sw1(), st.sw2());
        if !st.is_iso_ok() {
            return Err(MifareError::UnexpectedStatus(st.sw2()));
        }
        Ok(resp[..resp.len() - 2].to_vec())
    }

    /// Tunnel a native command through the reader
    fn transceive_native(&mut self, data: &[u8]) -> Result<Vec<u8>, MifareError> {
        let mut apdu = vec![0xFF, 0xEF, 0x00, 0x00, data.len() as u8];
        apdu.extend_from_slice(data);
        apdu.push(0x00);
        self.transceive(&apdu)
    }

    /// Run the three pass 3DES mutual authentication
    pub fn authenticate(&mut self, key: &[u8; 16]) -> Result<(), MifareError> {
        let data = self.transceive_native(&[0x1A, 0x00])?;
        if data.len() != 1 + DES_BLOCK || data[0] != 0xAF {
            return Err(MifareError::AuthenticationRejected);
        }
        let ek_rnd_b = &data[1..1 + DES_BLOCK];
        let mut rnd_b = ek_rnd_b.to_vec();
        des_receive(key, &[0u8; DES_BLOCK], &mut rnd_b)?;

        let mut rnd_a = [0u8; DES_BLOCK];
        rand::thread_rng().fill_bytes(&mut rnd_a);
        let mut token = rnd_a.to_vec();
        token.extend_from_slice(&rol(&rnd_b));
        des_send(key, ek_rnd_b, &mut token)?;

        let mut frame = vec![0xAF];
        frame.extend_from_slice(&token);
        let data = self.transceive_native(&frame)?;
        if data.len() != 1 + DES_BLOCK || data[0] != 0x00 {
            return Err(MifareError::AuthenticationRejected);
        }
        let mut rnd_a_card = data[1..1 + DES_BLOCK].to_vec();
        des_receive(key, &token[DES_BLOCK..], &mut rnd_a_card)?;
        if rnd_a_card != rol(&rnd_a) {
            return Err(MifareError::AuthenticationRejected);
        }
        debug!("ultralight c authenticated");
        Ok(())
    }

    /// Read one 4-byte page (pages 0..=43)
    pub fn read_page(&mut self, page: u8) -> Result<[u8; 4], MifareError> {
        if page > READ_MAX_PAGE {
            return Err(MifareError::InvalidArgument("page out of range"));
        }
        let data = self.transceive(&[0xFF, 0xB0, 0x00, page, 0x04])?;
        if data.len() < 4 {
            return Err(MifareError::UnexpectedStatus(self.last_sw.1));
        }
        let mut out = [0u8; 4];
        out.copy_from_slice(&data[..4]);
        Ok(out)
    }

    /// Write one page of user memory (pages 4..=39)
    pub fn update_page(&mut self, page: u8, data: [u8; 4]) -> Result<(), MifareError> {
        if !(USER_FIRST_PAGE..=USER_LAST_PAGE).contains(&page) {
            return Err(MifareError::InvalidArgument("page outside user memory"));
        }
        self.write_page(page, data)
    }

    fn write_page(&mut self, page: u8, data: [u8; 4]) -> Result<(), MifareError> {
        self.transceive(&[0xFF, 0xD6, 0x00, page, 0x04, data[0], data[1], data[2], data[3]])
            .map(|_| ())
    }

    /// Write a new 16-byte authentication key. The key pages expect the
    /// key bytes in a fixed permuted order, four pages, little endian
    /// within each half.
    pub fn change_key(&mut self, key: &[u8; 16]) -> Result<(), MifareError> {
        self.write_page(KEY_PAGE_BASE, [key[7], key[6], key[5], key[4]])?;
        self.write_page(KEY_PAGE_BASE + 1, [key[3], key[2], key[1], key[0]])?;
        self.write_page(KEY_PAGE_BASE + 2, [key[15], key[14], key[13], key[12]])?;
        self.write_page(KEY_PAGE_BASE + 3, [key[11], key[10], key[9], key[8]])?;
        debug!("ultralight c key replaced");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::cipher::expand_des_key;
    use crate::testutil::{MockTransport, SimTransport, rol};
    use ::cipher::generic_array::GenericArray;
    use ::cipher::{BlockEncrypt, KeyInit};
    use hex_literal::hex;

    /// Card side of the tunnelled 3DES authentication
    fn ulc_card(key: [u8; 16], rnd_b: [u8; 8]) -> impl FnMut(&[u8]) -> Vec<u8> {
        let tdes = des::TdesEde3::new_from_slice(&expand_des_key(&key).unwrap()).unwrap();
        let mut ek_rnd_b = rnd_b;
        tdes.encrypt_block(GenericArray::from_mut_slice(&mut ek_rnd_b));
        let mut stage = 0;
        move |apdu: &[u8]| {
            assert_eq!(&apdu[..4], &[0xFF, 0xEF, 0x00, 0x00]);
            let data = &apdu[5..apdu.len() - 1];
            stage += 1;
            match stage {
                1 => {
                    assert_eq!(data, [0x1A, 0x00]);
                    let mut resp = vec![0xAF];
                    resp.extend_from_slice(&ek_rnd_b);
                    resp.extend_from_slice(&[0x90, 0x00]);
                    resp
                }
                2 => {
                    assert_eq!(data[0], 0xAF);
                    let token = &data[1..17];
                    // undo the host's send-mode chain
                    let mut plain = [0u8; 16];
                    let mut prev = ek_rnd_b;
                    for (i, chunk) in token.chunks(8).enumerate() {
                        let mut block = [0u8; 8];
                        block.copy_from_slice(chunk);
                        tdes.encrypt_block(GenericArray::from_mut_slice(&mut block));
                        for (b, p) in block.iter_mut().zip(prev.iter()) {
                            *b ^= *p;
                        }
                        plain[i * 8..(i + 1) * 8].copy_from_slice(&block);
                        prev.copy_from_slice(chunk);
                    }
                    assert_eq!(&plain[8..16], &rol(&rnd_b)[..]);
                    let rol_a = rol(&plain[..8]);
                    let mut resp_block = [0u8; 8];
                    for (i, b) in resp_block.iter_mut().enumerate() {
                        *b = rol_a[i] ^ token[8 + i];
                    }
                    tdes.encrypt_block(GenericArray::from_mut_slice(&mut resp_block));
                    let mut resp = vec![0x00];
                    resp.extend_from_slice(&resp_block);
                    resp.extend_from_slice(&[0x90, 0x00]);
                    resp
                }
                _ => panic!("unexpected frame"),
            }
        }
    }

    #[test]
    fn authentication_succeeds_with_matching_key() {
        let key = hex!("49454d4b41455242214e4143554f5946");
        let mut card = UltralightC::new(SimTransport::new(ulc_card(key, hex!("0102030405060708"))));
        card.authenticate(&key).unwrap();
    }

    #[test]
    fn authentication_fails_with_wrong_key() {
        let key = hex!("49454d4b41455242214e4143554f5946");
        let other = hex!("00000000000000000000000000000000");
        // lenient card: answers with its own key, skips the nonce check
        let card_key = other;
        let mut stage = 0;
        let tdes = des::TdesEde3::new_from_slice(&expand_des_key(&card_key).unwrap()).unwrap();
        let mut ek_rnd_b = hex!("1112131415161718");
        tdes.encrypt_block(GenericArray::from_mut_slice(&mut ek_rnd_b));
        let mut card = UltralightC::new(SimTransport::new(move |_apdu: &[u8]| {
            stage += 1;
            match stage {
                1 => {
                    let mut resp = vec![0xAF];
                    resp.extend_from_slice(&ek_rnd_b);
                    resp.extend_from_slice(&[0x90, 0x00]);
                    resp
                }
                _ => {
                    // whatever the host sent, answer garbage
                    let mut resp = vec![0x00];
                    resp.extend_from_slice(&[0u8; 8]);
                    resp.extend_from_slice(&[0x90, 0x00]);
                    resp
                }
            }
        }));
        assert_eq!(card.authenticate(&key).unwrap_err(), MifareError::AuthenticationRejected);
    }

    #[test]
    fn change_key_writes_permuted_pages() {
        let key = hex!("48000000000000004800000000000000");
        let mut card = UltralightC::new(MockTransport::new(&[
            (
                &[0xFF, 0xD6, 0x00, 0x2C, 0x04, 0x00, 0x00, 0x00, 0x00],
                &[0x90, 0x00],
            ),
            (
                &[0xFF, 0xD6, 0x00, 0x2D, 0x04, 0x00, 0x00, 0x00, 0x48],
                &[0x90, 0x00],
            ),
            (
                &[0xFF, 0xD6, 0x00, 0x2E, 0x04, 0x00, 0x00, 0x00, 0x00],
                &[0x90, 0x00],
            ),
            (
                &[0xFF, 0xD6, 0x00, 0x2F, 0x04, 0x00, 0x00, 0x00, 0x48],
                &[0x90, 0x00],
            ),
        ]));
        card.change_key(&key).unwrap();
    }

    #[test]
    fn read_page_validates_range_and_frame() {
        let mut card = UltralightC::new(MockTransport::new(&[(
            &[0xFF, 0xB0, 0x00, 0x08, 0x04],
            &[0xDE, 0xAD, 0xBE, 0xEF, 0x90, 0x00],
        )]));
        assert_eq!(card.read_page(8).unwrap(), [0xDE, 0xAD, 0xBE, 0xEF]);
        assert!(matches!(
            card.read_page(44).unwrap_err(),
            MifareError::InvalidArgument(_)
        ));
    }

    #[test]
    fn update_page_rejects_pages_outside_user_memory() {
        let mut card = UltralightC::new(MockTransport::new(&[]));
        for page in [0u8, 3, 40, 0x2C] {
            assert!(matches!(
                card.update_page(page, [0; 4]).unwrap_err(),
                MifareError::InvalidArgument(_)
            ));
        }
    }

    #[test]
    fn update_page_surfaces_card_refusal() {
        let mut card = UltralightC::new(MockTransport::new(&[(
            &[0xFF, 0xD6, 0x00, 0x04, 0x04, 0x01, 0x02, 0x03, 0x04],
            &[0x63, 0x00],
        )]));
        assert_eq!(
            card.update_page(4, [1, 2, 3, 4]).unwrap_err(),
            MifareError::UnexpectedStatus(0x00)
        );
        assert_eq!(card.last_status_word(), (0x63, 0x00));
    }
}
