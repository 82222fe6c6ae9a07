//! # Card status words
//!
//! Every response frame ends with a two byte status word `SW1 SW2`. DESFire
//! native commands wrapped in ISO 7816-4 always answer with `SW1 = 0x91` and
//! carry the card status in `SW2`; the reader-level pseudo APDUs used for
//! Ultralight C answer with plain ISO `90 00` on success.
//!
//! [`Status`] wraps the trailing word of a response buffer, [`CardStatus`]
//! names the DESFire status codes the driver interprets. `OPERATION_OK`
//! (0x00) terminates a command successfully and `ADDITIONAL_FRAME` (0xAF)
//! asks for, or announces, another frame of a chained exchange.

use crate::MifareError;

/// Card made the requested change
pub const OPERATION_OK: u8 = 0x00;
/// More frames follow (or are expected) for the current command
pub const ADDITIONAL_FRAME: u8 = 0xAF;

/// Status word of a response: the last two bytes of the frame
#[derive(Default, Clone, Copy)]
pub struct Status(u8, u8);

/// DESFire status codes carried in SW2
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardStatus {
    OperationOk = 0x00,
    NoChanges = 0x0C,
    OutOfEeprom = 0x0E,
    IllegalCommand = 0x1C,
    IntegrityError = 0x1E,
    NoSuchKey = 0x40,
    LengthError = 0x7E,
    PermissionDenied = 0x9D,
    ParameterError = 0x9E,
    ApplicationNotFound = 0xA0,
    ApplicationIntegrityError = 0xA1,
    AuthenticationError = 0xAE,
    AdditionalFrame = 0xAF,
    BoundaryError = 0xBE,
    PiccIntegrityError = 0xC1,
    CommandAborted = 0xCA,
    PiccDisabled = 0xCD,
    CountError = 0xCE,
    DuplicateError = 0xDE,
    EepromError = 0xEE,
    FileNotFound = 0xF0,
    FileIntegrityError = 0xF1,
    Unknown = 0xFF,
}

impl From<u8> for CardStatus {
    fn from(value: u8) -> Self {
        match value {
            0x00 => CardStatus::OperationOk,
            0x0C => CardStatus::NoChanges,
            0x0E => CardStatus::OutOfEeprom,
            0x1C => CardStatus::IllegalCommand,
            0x1E => CardStatus::IntegrityError,
            0x40 => CardStatus::NoSuchKey,
            0x7E => CardStatus::LengthError,
            0x9D => CardStatus::PermissionDenied,
            0x9E => CardStatus::ParameterError,
            0xA0 => CardStatus::ApplicationNotFound,
            0xA1 => CardStatus::ApplicationIntegrityError,
            0xAE => CardStatus::AuthenticationError,
            0xAF => CardStatus::AdditionalFrame,
            0xBE => CardStatus::BoundaryError,
            0xC1 => CardStatus::PiccIntegrityError,
            0xCA => CardStatus::CommandAborted,
            0xCD => CardStatus::PiccDisabled,
            0xCE => CardStatus::CountError,
            0xDE => CardStatus::DuplicateError,
            0xEE => CardStatus::EepromError,
            0xF0 => CardStatus::FileNotFound,
            0xF1 => CardStatus::FileIntegrityError,
            _ => CardStatus::Unknown,
        }
    }
}

impl CardStatus {
    /// Check the status and return Ok/Err
    pub fn check(&self, raw: u8) -> Result<(), MifareError> {
        match self {
            CardStatus::OperationOk => Ok(()),
            _ => Err(MifareError::UnexpectedStatus(raw)),
        }
    }
}

impl Status {
    /// Create a status from the last two bytes of a response buffer
    /// Handle gracefully case where the buffer is shorter than two bytes
    pub fn from_slice(resp: &[u8]) -> Status {
        let n = resp.len();
        let sw1 = if n >= 2 { resp[n - 2] } else { 0 };
        let sw2 = *resp.last().unwrap_or(&0);
        Status(sw1, sw2)
    }

    pub fn sw1(&self) -> u8 {
        self.0
    }

    pub fn sw2(&self) -> u8 {
        self.1
    }

    /// Return the DESFire status carried in SW2
    pub fn code(&self) -> CardStatus {
        self.1.into()
    }

    pub fn is_ok(&self) -> bool {
        self.1 == OPERATION_OK
    }

    /// True when the card announces another frame of a chained exchange
    pub fn is_additional_frame(&self) -> bool {
        self.1 == ADDITIONAL_FRAME
    }

    /// Check the status and return Ok/Err
    pub fn check(&self) -> Result<(), MifareError> {
        self.code().check(self.1)
    }

    /// True for the plain ISO success word used by reader-level commands
    pub fn is_iso_ok(&self) -> bool {
        self.0 == 0x90 && self.1 == 0x00
    }
}
