//! # Application and PICC management API
//!
//! Applications are directories identified by a 3-byte AID, each with its
//! own key set. AID `00 00 00` addresses the PICC level. Selecting an
//! application drops the current authentication, matching the card.
//!
//! ## Available Methods
//!
//! ### Application directory
//! - [`select_application`](Desfire::select_application) - Select an application (or the PICC level)
//! - [`create_application`](Desfire::create_application) - Create an application with its key set
//! - [`delete_application`](Desfire::delete_application) - Delete an application
//! - [`get_applications_ids`](Desfire::get_applications_ids) - List all application identifiers
//! - [`format_picc`](Desfire::format_picc) - Release all applications and files
//!
//! ### Card information
//! - [`get_version`](Desfire::get_version) - Read manufacturing data
//! - [`get_card_uid`](Desfire::get_card_uid) - Read the real 7-byte UID (enciphered)
//! - [`free_memory`](Desfire::free_memory) - Read the free EEPROM space
//!
//! ### Key set management
//! - [`get_key_settings`](Desfire::get_key_settings) - Read the key settings
//! - [`change_key_settings`](Desfire::change_key_settings) - Change the key settings
//! - [`get_key_version`](Desfire::get_key_version) - Read the version of a key

use crate::cmd::cmd_app::*;
use crate::secure::CommMode;
use crate::session::KeyType;
use crate::{Desfire, MifareError, SmartCardTransport};

impl<T: SmartCardTransport> Desfire<T> {
    /// Select an application by AID; `[0, 0, 0]` selects the PICC level.
    /// Any authentication is dropped, on the card and in the driver.
    pub fn select_application(&mut self, aid: [u8; 3]) -> Result<(), MifareError> {
        self.reset_session();
        self.invalidate_file_cache();
        let resp = self.transceive(&select_application_cmd(aid))?;
        self.postprocess(&resp, 0, CommMode::Plain)?;
        self.set_aid(aid);
        Ok(())
    }

    /// Create an application. `app_keys` counts the keys (1..=14) and the
    /// key family of the whole application is fixed at creation.
    pub fn create_application(
        &mut self,
        aid: [u8; 3],
        key_settings: u8,
        app_keys: u8,
        key_type: KeyType,
    ) -> Result<(), MifareError> {
        if app_keys == 0 || app_keys > 14 {
            return Err(MifareError::InvalidArgument("an application holds 1 to 14 keys"));
        }
        let flags = match key_type {
            KeyType::Tktdes => 0x40,
            KeyType::Aes => 0x80,
            _ => 0x00,
        };
        let apdu = create_application_cmd(aid, key_settings, app_keys | flags);
        let apdu = self.preprocess(apdu.to_vec(), 0, CommMode::Plain)?;
        let resp = self.transceive(&apdu)?;
        self.postprocess(&resp, 0, CommMode::Plain).map(|_| ())
    }

    /// Delete an application and release its memory
    pub fn delete_application(&mut self, aid: [u8; 3]) -> Result<(), MifareError> {
        let apdu = delete_application_cmd(aid);
        let apdu = self.preprocess(apdu.to_vec(), 0, CommMode::Plain)?;
        let resp = self.transceive(&apdu)?;
        self.postprocess(&resp, 0, CommMode::Plain)?;
        if self.aid() == aid {
            self.reset_session();
            self.invalidate_file_cache();
            self.set_aid([0; 3]);
        }
        Ok(())
    }

    /// List the identifiers of all applications on the card
    pub fn get_applications_ids(&mut self) -> Result<Vec<[u8; 3]>, MifareError> {
        let apdu = self.preprocess(get_applications_ids_req().to_vec(), 0, CommMode::Plain)?;
        let resp = self.transceive_chained(&apdu)?;
        let data = self.postprocess(&resp, 0, CommMode::Plain)?;
        if data.len() % 3 != 0 {
            return Err(MifareError::UnexpectedStatus(self.last_status_code()));
        }
        Ok(data
            .chunks_exact(3)
            .map(|c| [c[0], c[1], c[2]])
            .collect())
    }

    /// Release all applications and files of the card.
    /// Needs a PICC master key session.
    pub fn format_picc(&mut self) -> Result<(), MifareError> {
        let apdu = self.preprocess(format_picc_cmd().to_vec(), 0, CommMode::Plain)?;
        let resp = self.transceive(&apdu)?;
        self.invalidate_file_cache();
        self.postprocess(&resp, 0, CommMode::Plain).map(|_| ())
    }

    /// Read the manufacturing data, collected over three chained frames
    pub fn get_version(&mut self) -> Result<VersionRsp, MifareError> {
        let apdu = self.preprocess(get_version_req().to_vec(), 0, CommMode::Plain)?;
        let resp = self.transceive_chained(&apdu)?;
        let data = self.postprocess(&resp, 0, CommMode::Plain)?;
        Ok(VersionRsp::from_slice(&data))
    }

    /// Read the real 7-byte UID. The response travels enciphered, so this
    /// needs an authenticated session.
    pub fn get_card_uid(&mut self) -> Result<[u8; 7], MifareError> {
        if self.session().is_none() {
            return Err(MifareError::NotAuthenticated);
        }
        let apdu = self.preprocess(get_card_uid_req().to_vec(), 0, CommMode::Plain)?;
        let resp = self.transceive(&apdu)?;
        let data = self.postprocess(&resp, 7, CommMode::Enciphered)?;
        let mut uid = [0u8; 7];
        uid.copy_from_slice(&data[..7]);
        Ok(uid)
    }

    /// Read the free EEPROM space in bytes
    pub fn free_memory(&mut self) -> Result<u32, MifareError> {
        let apdu = self.preprocess(free_memory_req().to_vec(), 0, CommMode::Plain)?;
        let resp = self.transceive(&apdu)?;
        let data = self.postprocess(&resp, 0, CommMode::Plain)?;
        if data.len() < 3 {
            return Err(MifareError::UnexpectedStatus(self.last_status_code()));
        }
        Ok((data[0] as u32) | ((data[1] as u32) << 8) | ((data[2] as u32) << 16))
    }

    /// Read the key settings of the selected application or PICC
    pub fn get_key_settings(&mut self) -> Result<KeySettingsRsp, MifareError> {
        let apdu = self.preprocess(get_key_settings_req().to_vec(), 0, CommMode::Plain)?;
        let resp = self.transceive(&apdu)?;
        let data = self.postprocess(&resp, 0, CommMode::Plain)?;
        Ok(KeySettingsRsp::from_slice(&data))
    }

    /// Change the key settings of the selected application or PICC.
    /// The settings byte always travels enciphered.
    pub fn change_key_settings(&mut self, settings: u8) -> Result<(), MifareError> {
        let apdu = change_key_settings_cmd(settings);
        let apdu = self.preprocess(apdu.to_vec(), 0, CommMode::Enciphered)?;
        let resp = self.transceive(&apdu)?;
        self.postprocess(&resp, 0, CommMode::Plain).map(|_| ())
    }

    /// Read the version of the given key
    pub fn get_key_version(&mut self, key_no: u8) -> Result<u8, MifareError> {
        let apdu = self.preprocess(get_key_version_req(key_no).to_vec(), 0, CommMode::Plain)?;
        let resp = self.transceive(&apdu)?;
        let data = self.postprocess(&resp, 0, CommMode::Plain)?;
        data.first()
            .copied()
            .ok_or(MifareError::UnexpectedStatus(self.last_status_code()))
    }
}
