//! # Secure messaging pipeline
//!
//! Every command leaves through [`preprocess`](Desfire::preprocess) and every
//! response comes back through [`postprocess`](Desfire::postprocess). The
//! communication mode decides the wrapping:
//!
//! - `Plain`: nothing on the wire, but 3K3DES/AES sessions still run a CMAC
//!   over opcode and body to keep the card and host MAC state in step.
//! - `Maced`: legacy sessions append a 4-byte retail MAC over the body;
//!   3K3DES/AES sessions append the first 8 bytes of the chained CMAC.
//! - `Enciphered`: the body (after a clear prefix of `offset` bytes) is
//!   extended with a CRC, zero padded and enciphered.
//!
//! A single session IV is threaded through the whole exchange history of a
//! 3K3DES or AES session: after every successful command it equals either
//! the last CMAC or the last ciphertext block. Legacy DES/2K3DES sessions
//! start every operation from a zero vector instead. Any MAC or CRC
//! mismatch, and any terminal status other than OPERATION_OK, voids the
//! session, mirroring the card's own behaviour.

use crate::crypto::cipher::{self, DES_BLOCK};
use crate::crypto::cmac::{cmac_aes, cmac_tdes};
use crate::crypto::crc::{crc16, crc32};
use crate::session::KeyType;
use crate::status::{OPERATION_OK, Status};
use crate::{Desfire, MifareError, SmartCardTransport};

/// Communication mode of a command or response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommMode {
    Plain,
    Maced,
    Enciphered,
}

impl CommMode {
    /// Map a file communication setting byte to a mode
    pub fn from_setting(value: u8) -> CommMode {
        match value {
            1 => CommMode::Maced,
            3 => CommMode::Enciphered,
            _ => CommMode::Plain,
        }
    }

    /// Communication setting byte stored in a file settings block
    pub fn setting_byte(&self) -> u8 {
        match self {
            CommMode::Plain => 0,
            CommMode::Maced => 1,
            CommMode::Enciphered => 3,
        }
    }
}

/// Zero pad a buffer to a multiple of the cipher block size
pub(crate) fn pad_zero(buf: &mut Vec<u8>, block: usize) {
    let rem = buf.len() % block;
    if rem != 0 {
        buf.resize(buf.len() + block - rem, 0);
    }
}

/// Legacy retail MAC: send-mode chain over the zero padded body, keeping the
/// first four bytes of the last block
fn legacy_mac(key: &[u8], body: &[u8]) -> Result<[u8; 4], MifareError> {
    let mut buf = body.to_vec();
    pad_zero(&mut buf, DES_BLOCK);
    if buf.is_empty() {
        buf.resize(DES_BLOCK, 0);
    }
    cipher::des_send(key, &[0u8; DES_BLOCK], &mut buf)?;
    let mut mac = [0u8; 4];
    mac.copy_from_slice(&buf[buf.len() - DES_BLOCK..][..4]);
    Ok(mac)
}

impl<T: SmartCardTransport> Desfire<T> {
    /// Wrap an outbound APDU for the given communication mode. `offset`
    /// counts the body bytes that stay in clear in front of an enciphered
    /// payload (the file number of Credit, the 7-byte write header, ...).
    pub(crate) fn preprocess(
        &mut self,
        apdu: Vec<u8>,
        offset: usize,
        mode: CommMode,
    ) -> Result<Vec<u8>, MifareError> {
        if self.session().is_none() {
            return match mode {
                CommMode::Plain => Ok(apdu),
                _ => Err(MifareError::NotAuthenticated),
            };
        }
        match mode {
            CommMode::Plain => {
                self.outbound_cmac(&apdu)?;
                Ok(apdu)
            }
            CommMode::Maced => self.preprocess_maced(apdu),
            CommMode::Enciphered => self.preprocess_enciphered(apdu, offset),
        }
    }

    /// CMAC over opcode and body for 3K3DES/AES sessions, threading the IV.
    /// Returns the 8 bytes that go on the wire in MACed mode.
    fn outbound_cmac(&mut self, apdu: &[u8]) -> Result<Option<[u8; 8]>, MifareError> {
        let Some(session) = self.session_mut() else {
            return Err(MifareError::NotAuthenticated);
        };
        if session.key_type().is_legacy() {
            return Ok(None);
        }
        let mut buf = Vec::with_capacity(apdu.len());
        buf.push(apdu[1]);
        if apdu.len() > 6 {
            buf.extend_from_slice(&apdu[5..apdu.len() - 1]);
        }
        let tag: Vec<u8> = match session.key_type() {
            KeyType::Tktdes => cmac_tdes(session.key(), session.iv(), &buf)?.to_vec(),
            _ => cmac_aes(session.key(), session.iv(), &buf)?.to_vec(),
        };
        session.set_iv(&tag);
        let mut wire = [0u8; 8];
        wire.copy_from_slice(&tag[..8]);
        Ok(Some(wire))
    }

    fn preprocess_maced(&mut self, mut apdu: Vec<u8>) -> Result<Vec<u8>, MifareError> {
        let legacy = match self.session() {
            Some(s) => s.key_type().is_legacy(),
            None => return Err(MifareError::NotAuthenticated),
        };
        if legacy {
            let mac = {
                let session = self.session().ok_or(MifareError::NotAuthenticated)?;
                legacy_mac(session.key(), &apdu[5..apdu.len() - 1])?
            };
            apdu.pop();
            apdu.extend_from_slice(&mac);
            apdu.push(0x00);
            apdu[4] += 4;
        } else if let Some(mac) = self.outbound_cmac(&apdu)? {
            apdu.pop();
            apdu.extend_from_slice(&mac);
            apdu.push(0x00);
            apdu[4] += 8;
        }
        Ok(apdu)
    }

    fn preprocess_enciphered(
        &mut self,
        mut apdu: Vec<u8>,
        offset: usize,
    ) -> Result<Vec<u8>, MifareError> {
        let Some(session) = self.session_mut() else {
            return Err(MifareError::NotAuthenticated);
        };
        let kt = session.key_type();
        let body_end = apdu.len() - 1;
        let mut plain = apdu[5 + offset..body_end].to_vec();
        if kt.is_legacy() {
            plain.extend_from_slice(&crc16(&apdu[5 + offset..body_end]));
        } else {
            // the CRC covers opcode and full body, clear prefix included
            let mut crc_buf = Vec::with_capacity(body_end - 4);
            crc_buf.push(apdu[1]);
            crc_buf.extend_from_slice(&apdu[5..body_end]);
            plain.extend_from_slice(&crc32(&crc_buf));
        }
        pad_zero(&mut plain, kt.block_size());
        if kt.is_legacy() {
            cipher::encipher(kt, session.key(), &[0u8; DES_BLOCK], &mut plain)?;
        } else {
            let iv = session.iv().to_vec();
            cipher::encipher(kt, session.key(), &iv, &mut plain)?;
            session.set_iv(&plain[plain.len() - kt.block_size()..]);
        }
        apdu.truncate(5 + offset);
        apdu.extend_from_slice(&plain);
        apdu.push(0x00);
        apdu[4] = (offset + plain.len()) as u8;
        Ok(apdu)
    }

    /// Unwrap a response (data followed by SW1 SW2) for the given mode.
    /// `plain_len` is the expected plaintext length of an enciphered
    /// response, used to locate the CRC trailer.
    pub(crate) fn postprocess(
        &mut self,
        resp: &[u8],
        plain_len: usize,
        mode: CommMode,
    ) -> Result<Vec<u8>, MifareError> {
        let st = Status::from_slice(resp);
        if !st.is_ok() {
            self.reset_session();
            return Err(MifareError::UnexpectedStatus(st.sw2()));
        }
        let data = &resp[..resp.len() - 2];
        let legacy = match self.session() {
            Some(session) => session.key_type().is_legacy(),
            None => return Ok(data.to_vec()),
        };
        match (mode, legacy) {
            (CommMode::Plain, true) => Ok(data.to_vec()),
            (CommMode::Plain, false) | (CommMode::Maced, false) => {
                self.verify_cmac(data, st.sw2())
            }
            (CommMode::Maced, true) => self.verify_legacy_mac(data),
            (CommMode::Enciphered, _) => self.postprocess_enciphered(data, plain_len),
        }
    }

    fn verify_cmac(&mut self, data: &[u8], sw2: u8) -> Result<Vec<u8>, MifareError> {
        if data.len() < 8 {
            self.reset_session();
            return Err(MifareError::CmacMismatch);
        }
        let (payload, mac) = data.split_at(data.len() - 8);
        let mut buf = payload.to_vec();
        buf.push(sw2);
        let ok = {
            let Some(session) = self.session_mut() else {
                return Err(MifareError::NotAuthenticated);
            };
            let tag: Vec<u8> = match session.key_type() {
                KeyType::Tktdes => cmac_tdes(session.key(), session.iv(), &buf)?.to_vec(),
                _ => cmac_aes(session.key(), session.iv(), &buf)?.to_vec(),
            };
            let ok = tag[..8] == *mac;
            if ok {
                session.set_iv(&tag);
            }
            ok
        };
        if !ok {
            self.reset_session();
            return Err(MifareError::CmacMismatch);
        }
        Ok(payload.to_vec())
    }

    fn verify_legacy_mac(&mut self, data: &[u8]) -> Result<Vec<u8>, MifareError> {
        if data.len() < 4 {
            self.reset_session();
            return Err(MifareError::CmacMismatch);
        }
        let (payload, mac) = data.split_at(data.len() - 4);
        let expect = {
            let Some(session) = self.session() else {
                return Err(MifareError::NotAuthenticated);
            };
            legacy_mac(session.key(), payload)?
        };
        if expect[..] != *mac {
            self.reset_session();
            return Err(MifareError::CmacMismatch);
        }
        Ok(payload.to_vec())
    }

    fn postprocess_enciphered(
        &mut self,
        data: &[u8],
        plain_len: usize,
    ) -> Result<Vec<u8>, MifareError> {
        let (ok, mut buf) = {
            let Some(session) = self.session_mut() else {
                return Err(MifareError::NotAuthenticated);
            };
            let kt = session.key_type();
            let block = kt.block_size();
            let trailer = if kt.is_legacy() { 2 } else { 4 };
            if data.is_empty() || data.len() % block != 0 || plain_len + trailer > data.len() {
                (false, Vec::new())
            } else {
                let mut buf = data.to_vec();
                if kt.is_legacy() {
                    cipher::decipher(kt, session.key(), &[0u8; DES_BLOCK], &mut buf)?;
                    let crc = crc16(&buf[..plain_len]);
                    (buf[plain_len..plain_len + 2] == crc, buf)
                } else {
                    let next_iv = data[data.len() - block..].to_vec();
                    let iv = session.iv().to_vec();
                    cipher::decipher(kt, session.key(), &iv, &mut buf)?;
                    session.set_iv(&next_iv);
                    // the status byte participates in the CRC
                    let mut crc_buf = buf[..plain_len].to_vec();
                    crc_buf.push(OPERATION_OK);
                    let crc = crc32(&crc_buf);
                    (buf[plain_len..plain_len + 4] == crc, buf)
                }
            }
        };
        if !ok {
            self.reset_session();
            return Err(MifareError::CrcMismatch);
        }
        buf.truncate(plain_len);
        Ok(buf)
    }
}
