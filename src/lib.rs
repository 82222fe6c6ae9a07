//! # MIFARE DESFire EV1 / Ultralight C client driver
//!
//! This crate drives two contactless card products over ISO/IEC 7816-4
//! command/response units (APDUs): the MIFARE DESFire EV1 and the MIFARE
//! Ultralight C. The caller supplies a reader channel through the
//! [`SmartCardTransport`] trait; the driver translates every high level
//! operation into the right wire frames, handles the mutual authentication
//! protocols, wraps and unwraps secure messaging, and follows multi frame
//! chaining.
//!
//! The [`Desfire`] driver owns all per card state: the authenticated
//! session (key, init vector), the selected application and a one entry
//! file settings cache. A card session is strictly sequential; the driver
//! is single owner and never shares state.
//!
//! ## Quick Start
//!
//! ```no_run
//! use mifare::{Desfire, KeyType, MifareError, SmartCardTransport};
//!
//! struct Reader;
//! impl SmartCardTransport for Reader {
//!     fn connect(&mut self) -> bool { true }
//!     fn disconnect(&mut self) -> bool { true }
//!     fn transmit(&mut self, _cmd: &[u8]) -> Result<Vec<u8>, MifareError> {
//!         Ok(vec![0x91, 0x00])
//!     }
//! }
//!
//! let mut card = Desfire::new(Reader);
//! card.connect();
//! card.select_application([0x01, 0x02, 0x03]).unwrap();
//! card.authenticate(&[0u8; 16], 0, KeyType::Aes).unwrap();
//! let data = card.read_data(1, 0, 0).unwrap();
//! println!("{}", hex::encode(data));
//! card.disconnect();
//! ```

use log::{debug, trace};
use thiserror::Error;

pub mod application;
pub mod auth;
pub mod cmd;
pub mod crypto;
pub mod data;
pub mod file;
pub mod secure;
pub mod session;
pub mod status;
pub mod ultralight;

pub use file::FileAccess;
pub use secure::CommMode;
pub use session::{KeyType, Session};
pub use status::{CardStatus, Status};
pub use ultralight::UltralightC;

use cmd::next_frame_req;
use cmd::cmd_file::FileSettings;

/// Errors surfaced by the drivers
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MifareError {
    /// The reader channel failed; the response buffer is not authoritative
    #[error("transport failure: {0}")]
    Transport(String),
    /// The card ended the command with a status other than OPERATION_OK
    #[error("unexpected card status {0:#04x}")]
    UnexpectedStatus(u8),
    /// A response MAC did not verify
    #[error("response MAC verification failed")]
    CmacMismatch,
    /// A deciphered response failed its CRC check
    #[error("response CRC verification failed")]
    CrcMismatch,
    /// The card nonce did not match during mutual authentication
    #[error("card failed mutual authentication")]
    AuthenticationRejected,
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// A secure messaging command was attempted without a session
    #[error("operation requires an authenticated session")]
    NotAuthenticated,
    /// No key nibble grants the requested file operation
    #[error("no access right grants this operation")]
    PermissionDenied,
}

/// Reader side APDU channel the drivers run on
///
/// One exchange is a full request/response with the card acting as server.
/// The response buffer always carries the two status bytes at the end.
pub trait SmartCardTransport {
    /// Acquire a reader and a card channel
    fn connect(&mut self) -> bool;
    /// Release the reader
    fn disconnect(&mut self) -> bool;
    /// Exchange one APDU
    fn transmit(&mut self, cmd: &[u8]) -> Result<Vec<u8>, MifareError>;
}

/// Largest data chunk of a host driven chained write
pub(crate) const FRAME_MAX: usize = 52;

/// DESFire EV1 driver
pub struct Desfire<T: SmartCardTransport> {
    transport: T,
    session: Option<Session>,
    aid: [u8; 3],
    file_cache: Option<(u8, FileSettings)>,
    last_code: u8,
}

impl<T: SmartCardTransport> Desfire<T> {
    /// Create a driver on top of a reader channel
    pub fn new(transport: T) -> Self {
        Desfire {
            transport,
            session: None,
            aid: [0; 3],
            file_cache: None,
            last_code: 0,
        }
    }

    /// Acquire the reader and card channel
    pub fn connect(&mut self) -> bool {
        self.transport.connect()
    }

    /// Release the reader. Also tears down the session and wipes key material.
    pub fn disconnect(&mut self) -> bool {
        self.reset_session();
        self.aid = [0; 3];
        self.transport.disconnect()
    }

    /// Raw status byte of the last exchanged frame, for diagnostics
    pub fn last_status_code(&self) -> u8 {
        self.last_code
    }

    /// Currently selected application identifier
    pub fn aid(&self) -> [u8; 3] {
        self.aid
    }

    /// Authenticated session, if any
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub(crate) fn set_session(&mut self, session: Session) {
        self.session = Some(session);
    }

    pub(crate) fn session_mut(&mut self) -> Option<&mut Session> {
        self.session.as_mut()
    }

    /// Drop the session; the key material is wiped on drop
    pub(crate) fn reset_session(&mut self) {
        if self.session.take().is_some() {
            debug!("session reset");
        }
    }

    pub(crate) fn set_aid(&mut self, aid: [u8; 3]) {
        self.aid = aid;
    }

    pub(crate) fn cache_file_settings(&mut self, file_no: u8, settings: FileSettings) {
        self.file_cache = Some((file_no, settings));
    }

    pub(crate) fn cached_file_settings(&self, file_no: u8) -> Option<&FileSettings> {
        match &self.file_cache {
            Some((no, settings)) if *no == file_no => Some(settings),
            _ => None,
        }
    }

    pub(crate) fn invalidate_file_cache(&mut self) {
        self.file_cache = None;
    }

    /// Exchange one APDU and record the trailing status byte
    pub(crate) fn transceive(&mut self, apdu: &[u8]) -> Result<Vec<u8>, MifareError> {
        trace!("pcd  > {}", hex::encode(apdu));
        let resp = self.transport.transmit(apdu)?;
        trace!("picc < {}", hex::encode(&resp));
        if resp.len() < 2 {
            return Err(MifareError::Transport("short response".into()));
        }
        self.last_code = resp[resp.len() - 1];
        Ok(resp)
    }

    /// Transmit and follow ADDITIONAL_FRAME answers, concatenating the data
    /// portions. Returns the aggregate data followed by the final SW1 SW2.
    pub(crate) fn transceive_chained(&mut self, apdu: &[u8]) -> Result<Vec<u8>, MifareError> {
        let mut resp = self.transceive(apdu)?;
        let mut data = Vec::new();
        loop {
            let st = Status::from_slice(&resp);
            data.extend_from_slice(&resp[..resp.len() - 2]);
            if !st.is_additional_frame() {
                data.push(st.sw1());
                data.push(st.sw2());
                return Ok(data);
            }
            resp = self.transceive(&next_frame_req())?;
        }
    }

    /// Transmit a command whose body may exceed one frame. The host splits
    /// the wrapped body into chunks: the first frame keeps the original
    /// opcode, every following frame goes out as ADDITIONAL_FRAME.
    pub(crate) fn transceive_write(&mut self, apdu: &[u8]) -> Result<Vec<u8>, MifareError> {
        let body = &apdu[5..apdu.len() - 1];
        if body.len() <= FRAME_MAX {
            return self.transceive(apdu);
        }
        let mut ins = apdu[1];
        let mut offset = 0;
        loop {
            let take = FRAME_MAX.min(body.len() - offset);
            let mut frame = vec![0x90, ins, 0x00, 0x00, take as u8];
            frame.extend_from_slice(&body[offset..offset + take]);
            frame.push(0x00);
            let resp = self.transceive(&frame)?;
            offset += take;
            if offset >= body.len() || !Status::from_slice(&resp).is_additional_frame() {
                return Ok(resp);
            }
            ins = status::ADDITIONAL_FRAME;
        }
    }
}
