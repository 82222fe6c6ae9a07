//! # File management API
//!
//! Every file of an application carries a communication setting and four
//! access nibbles (read, write, read-write, change). Before a data
//! operation the driver resolves which communication mode the exchange must
//! use: a nibble naming the authenticated key selects the file's own
//! setting, the free-access nibble falls back to plain, anything else is
//! denied. The resolved settings block is cached per file number so a run
//! of operations on one file asks the card only once.
//!
//! ## Available Methods
//!
//! - [`get_file_ids`](Desfire::get_file_ids) - List the files of the selected application
//! - [`get_file_settings`](Desfire::get_file_settings) - Read (and cache) a settings block
//! - [`change_file_settings`](Desfire::change_file_settings) - Change communication setting and access rights
//! - [`create_std_data_file`](Desfire::create_std_data_file) - Create a standard data file
//! - [`create_backup_data_file`](Desfire::create_backup_data_file) - Create a backup data file
//! - [`create_value_file`](Desfire::create_value_file) - Create a value file
//! - [`create_linear_record_file`](Desfire::create_linear_record_file) - Create a linear record file
//! - [`create_cyclic_record_file`](Desfire::create_cyclic_record_file) - Create a cyclic record file
//! - [`delete_file`](Desfire::delete_file) - Delete a file

use crate::cmd::cmd_file::*;
use crate::secure::CommMode;
use crate::{Desfire, MifareError, SmartCardTransport};

/// Access category of a file operation, deciding which nibbles may grant it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAccess {
    /// Reading data, records or a value (read or read-write nibble)
    Read,
    /// Writing data, records, credits (write or read-write nibble)
    Write,
    /// Debit style operations open to any of the three data nibbles
    ReadWrite,
    /// Changing the file settings (change nibble only)
    ChangeAccess,
}

impl<T: SmartCardTransport> Desfire<T> {
    /// List the file numbers of the selected application
    pub fn get_file_ids(&mut self) -> Result<Vec<u8>, MifareError> {
        let apdu = self.preprocess(get_file_ids_req().to_vec(), 0, CommMode::Plain)?;
        let resp = self.transceive(&apdu)?;
        self.postprocess(&resp, 0, CommMode::Plain)
    }

    /// Read the settings block of a file and refresh the cache
    pub fn get_file_settings(&mut self, file_no: u8) -> Result<FileSettings, MifareError> {
        let apdu = self.preprocess(get_file_settings_req(file_no).to_vec(), 0, CommMode::Plain)?;
        let resp = self.transceive(&apdu)?;
        let data = self.postprocess(&resp, 0, CommMode::Plain)?;
        let settings = FileSettings::from_slice(&data);
        self.cache_file_settings(file_no, settings.clone());
        Ok(settings)
    }

    /// Settings of a file, served from the cache when it matches
    pub(crate) fn file_settings_cached(&mut self, file_no: u8) -> Result<FileSettings, MifareError> {
        if let Some(settings) = self.cached_file_settings(file_no) {
            return Ok(settings.clone());
        }
        self.get_file_settings(file_no)
    }

    /// Resolve the communication mode a file operation must use
    pub(crate) fn file_comm_mode(
        &mut self,
        file_no: u8,
        access: FileAccess,
    ) -> Result<CommMode, MifareError> {
        let settings = self.file_settings_cached(file_no)?;
        let ar = settings.access_rights();
        let key = self.session().map(|s| s.key_no());

        if access == FileAccess::ChangeAccess {
            // settings changes are always enciphered under the change key
            if key == Some(ar.change) {
                return Ok(CommMode::Enciphered);
            }
            if ar.change == AR_FREE {
                return Ok(CommMode::Plain);
            }
            return Err(match key {
                None => MifareError::NotAuthenticated,
                Some(_) => MifareError::PermissionDenied,
            });
        }

        let granted: Vec<u8> = match access {
            FileAccess::Read => vec![ar.read, ar.read_write],
            FileAccess::Write => vec![ar.write, ar.read_write],
            _ => vec![ar.read, ar.write, ar.read_write],
        };
        if let Some(k) = key {
            if granted.contains(&k) {
                return Ok(CommMode::from_setting(settings.comm_setting()));
            }
        }
        if granted.contains(&AR_FREE) {
            return Ok(CommMode::Plain);
        }
        Err(match key {
            None => MifareError::NotAuthenticated,
            Some(_) => MifareError::PermissionDenied,
        })
    }

    /// Change communication setting and access rights of a file.
    /// The file number stays in clear in front of the enciphered settings.
    pub fn change_file_settings(
        &mut self,
        file_no: u8,
        comm_setting: CommMode,
        access: AccessRights,
    ) -> Result<(), MifareError> {
        let mode = self.file_comm_mode(file_no, FileAccess::ChangeAccess)?;
        let apdu = change_file_settings_cmd(
            file_no,
            comm_setting.setting_byte(),
            access.ar1(),
            access.ar2(),
        );
        let apdu = self.preprocess(apdu.to_vec(), 1, mode)?;
        let resp = self.transceive(&apdu)?;
        self.invalidate_file_cache();
        self.postprocess(&resp, 0, CommMode::Plain).map(|_| ())
    }

    /// Create a standard data file of the given size
    pub fn create_std_data_file(
        &mut self,
        file_no: u8,
        comm_setting: CommMode,
        access: AccessRights,
        size: u32,
    ) -> Result<(), MifareError> {
        let apdu = create_std_data_file_cmd(
            file_no,
            comm_setting.setting_byte(),
            access.ar1(),
            access.ar2(),
            size,
        );
        self.create_file(&apdu)
    }

    /// Create a backup data file; writes only become readable on commit
    pub fn create_backup_data_file(
        &mut self,
        file_no: u8,
        comm_setting: CommMode,
        access: AccessRights,
        size: u32,
    ) -> Result<(), MifareError> {
        let apdu = create_backup_data_file_cmd(
            file_no,
            comm_setting.setting_byte(),
            access.ar1(),
            access.ar2(),
            size,
        );
        self.create_file(&apdu)
    }

    /// Create a value file with bounds, initial value and limited credit flag
    #[allow(clippy::too_many_arguments)]
    pub fn create_value_file(
        &mut self,
        file_no: u8,
        comm_setting: CommMode,
        access: AccessRights,
        lower: i32,
        upper: i32,
        value: i32,
        limited_credit: bool,
    ) -> Result<(), MifareError> {
        if lower > upper {
            return Err(MifareError::InvalidArgument("lower bound above upper bound"));
        }
        let apdu = create_value_file_cmd(
            file_no,
            comm_setting.setting_byte(),
            access.ar1(),
            access.ar2(),
            lower,
            upper,
            value,
            limited_credit,
        );
        self.create_file(&apdu)
    }

    /// Create a linear record file
    pub fn create_linear_record_file(
        &mut self,
        file_no: u8,
        comm_setting: CommMode,
        access: AccessRights,
        record_size: u32,
        max_records: u32,
    ) -> Result<(), MifareError> {
        let apdu = create_linear_record_file_cmd(
            file_no,
            comm_setting.setting_byte(),
            access.ar1(),
            access.ar2(),
            record_size,
            max_records,
        );
        self.create_file(&apdu)
    }

    /// Create a cyclic record file; the oldest record is overwritten once
    /// the file holds `max_records - 1` records
    pub fn create_cyclic_record_file(
        &mut self,
        file_no: u8,
        comm_setting: CommMode,
        access: AccessRights,
        record_size: u32,
        max_records: u32,
    ) -> Result<(), MifareError> {
        if max_records < 2 {
            return Err(MifareError::InvalidArgument("a cyclic file needs at least 2 records"));
        }
        let apdu = create_cyclic_record_file_cmd(
            file_no,
            comm_setting.setting_byte(),
            access.ar1(),
            access.ar2(),
            record_size,
            max_records,
        );
        self.create_file(&apdu)
    }

    fn create_file(&mut self, apdu: &[u8]) -> Result<(), MifareError> {
        let apdu = self.preprocess(apdu.to_vec(), 0, CommMode::Plain)?;
        let resp = self.transceive(&apdu)?;
        self.invalidate_file_cache();
        self.postprocess(&resp, 0, CommMode::Plain).map(|_| ())
    }

    /// Delete a file from the selected application
    pub fn delete_file(&mut self, file_no: u8) -> Result<(), MifareError> {
        let apdu = self.preprocess(delete_file_cmd(file_no).to_vec(), 0, CommMode::Plain)?;
        let resp = self.transceive(&apdu)?;
        self.invalidate_file_cache();
        self.postprocess(&resp, 0, CommMode::Plain).map(|_| ())
    }
}
