//! # Data manipulation API
//!
//! Reading and writing files, record handling and the value file
//! operations. Reads follow the card's frame chaining and are verified in
//! one piece at the end; writes above one frame are split by the host into
//! 52-byte chunks. Backup data, value and record files stage every change
//! until [`commit_transaction`](Desfire::commit_transaction) makes it
//! permanent, or [`abort_transaction`](Desfire::abort_transaction) drops it.
//!
//! ## Available Methods
//!
//! ### Data files
//! - [`read_data`](Desfire::read_data) - Read from a standard or backup data file
//! - [`write_data`](Desfire::write_data) - Write to a standard or backup data file
//!
//! ### Record files
//! - [`read_records`](Desfire::read_records) - Read records, oldest first
//! - [`write_record`](Desfire::write_record) - Append a record
//! - [`clear_record_file`](Desfire::clear_record_file) - Drop all records
//!
//! ### Value files
//! - [`get_value`](Desfire::get_value) - Read the current value
//! - [`credit`](Desfire::credit) - Raise the value
//! - [`debit`](Desfire::debit) - Lower the value
//! - [`limited_credit`](Desfire::limited_credit) - Raise within the limited credit allowance
//!
//! ### Transactions
//! - [`commit_transaction`](Desfire::commit_transaction) - Validate all staged changes
//! - [`abort_transaction`](Desfire::abort_transaction) - Discard all staged changes

use crate::cmd::cmd_data::*;
use crate::file::FileAccess;
use crate::secure::CommMode;
use crate::{Desfire, MifareError, SmartCardTransport};

impl<T: SmartCardTransport> Desfire<T> {
    /// Read from a data file. `length` 0 reads from `offset` to the end.
    pub fn read_data(&mut self, file_no: u8, offset: u32, length: u32) -> Result<Vec<u8>, MifareError> {
        let mode = self.file_comm_mode(file_no, FileAccess::Read)?;
        let expected = if length == 0 {
            let settings = self.file_settings_cached(file_no)?;
            (settings.data_size() as usize).saturating_sub(offset as usize)
        } else {
            length as usize
        };
        let apdu = self.preprocess(read_data_cmd(file_no, offset, length).to_vec(), 0, CommMode::Plain)?;
        let resp = self.transceive_chained(&apdu)?;
        self.postprocess(&resp, expected, mode)
    }

    /// Write to a data file at the given byte offset
    pub fn write_data(&mut self, file_no: u8, offset: u32, data: &[u8]) -> Result<(), MifareError> {
        if data.is_empty() {
            return Err(MifareError::InvalidArgument("nothing to write"));
        }
        let mode = self.file_comm_mode(file_no, FileAccess::Write)?;
        let apdu = write_data_cmd(file_no, offset, data);
        // file number, offset and length stay in clear
        let apdu = self.preprocess(apdu, 7, mode)?;
        let resp = self.transceive_write(&apdu)?;
        self.postprocess(&resp, 0, CommMode::Plain).map(|_| ())
    }

    /// Read records, oldest first. `count` 0 reads all records from `first`.
    pub fn read_records(&mut self, file_no: u8, first: u32, count: u32) -> Result<Vec<u8>, MifareError> {
        let mode = self.file_comm_mode(file_no, FileAccess::Read)?;
        // the record count moves with every commit, ask the card
        let settings = self.get_file_settings(file_no)?;
        let records = if count == 0 {
            settings.current_records().saturating_sub(first)
        } else {
            count
        };
        let expected = (records as usize) * (settings.record_size() as usize);
        let apdu = self.preprocess(read_records_cmd(file_no, first, count).to_vec(), 0, CommMode::Plain)?;
        let resp = self.transceive_chained(&apdu)?;
        self.postprocess(&resp, expected, mode)
    }

    /// Append a record to a record file, staged until commit
    pub fn write_record(&mut self, file_no: u8, offset: u32, data: &[u8]) -> Result<(), MifareError> {
        if data.is_empty() {
            return Err(MifareError::InvalidArgument("nothing to write"));
        }
        let mode = self.file_comm_mode(file_no, FileAccess::Write)?;
        let apdu = write_record_cmd(file_no, offset, data);
        let apdu = self.preprocess(apdu, 7, mode)?;
        let resp = self.transceive_write(&apdu)?;
        self.postprocess(&resp, 0, CommMode::Plain).map(|_| ())
    }

    /// Drop all records of a record file, staged until commit
    pub fn clear_record_file(&mut self, file_no: u8) -> Result<(), MifareError> {
        let apdu = self.preprocess(clear_record_file_cmd(file_no).to_vec(), 0, CommMode::Plain)?;
        let resp = self.transceive(&apdu)?;
        self.postprocess(&resp, 0, CommMode::Plain).map(|_| ())
    }

    /// Read the current value of a value file
    pub fn get_value(&mut self, file_no: u8) -> Result<i32, MifareError> {
        let mode = self.file_comm_mode(file_no, FileAccess::Read)?;
        let apdu = self.preprocess(get_value_req(file_no).to_vec(), 0, CommMode::Plain)?;
        let resp = self.transceive(&apdu)?;
        let data = self.postprocess(&resp, 4, mode)?;
        if data.len() < 4 {
            return Err(MifareError::UnexpectedStatus(self.last_status_code()));
        }
        Ok(i32::from_le_bytes([data[0], data[1], data[2], data[3]]))
    }

    /// Raise the value of a value file, staged until commit
    pub fn credit(&mut self, file_no: u8, amount: i32) -> Result<(), MifareError> {
        self.value_op(credit_cmd(file_no, amount), file_no, FileAccess::Write)
    }

    /// Lower the value of a value file, staged until commit.
    /// A read only key may debit; that is the vending use case.
    pub fn debit(&mut self, file_no: u8, amount: i32) -> Result<(), MifareError> {
        self.value_op(debit_cmd(file_no, amount), file_no, FileAccess::ReadWrite)
    }

    /// Raise the value within the limited credit allowance
    pub fn limited_credit(&mut self, file_no: u8, amount: i32) -> Result<(), MifareError> {
        self.value_op(limited_credit_cmd(file_no, amount), file_no, FileAccess::Write)
    }

    fn value_op(&mut self, apdu: [u8; 11], file_no: u8, access: FileAccess) -> Result<(), MifareError> {
        let mode = self.file_comm_mode(file_no, access)?;
        // the file number stays in clear in front of the amount
        let apdu = self.preprocess(apdu.to_vec(), 1, mode)?;
        let resp = self.transceive(&apdu)?;
        self.postprocess(&resp, 0, CommMode::Plain).map(|_| ())
    }

    /// Validate all staged changes of the selected application
    pub fn commit_transaction(&mut self) -> Result<(), MifareError> {
        let apdu = self.preprocess(commit_transaction_cmd().to_vec(), 0, CommMode::Plain)?;
        let resp = self.transceive(&apdu)?;
        self.postprocess(&resp, 0, CommMode::Plain).map(|_| ())
    }

    /// Discard all staged changes of the selected application
    pub fn abort_transaction(&mut self) -> Result<(), MifareError> {
        let apdu = self.preprocess(abort_transaction_cmd().to_vec(), 0, CommMode::Plain)?;
        let resp = self.transceive(&apdu)?;
        self.postprocess(&resp, 0, CommMode::Plain).map(|_| ())
    }
}
