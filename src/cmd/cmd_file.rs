// File management commands API

/// Access nibble granting an operation to any reader, even unauthenticated
pub const AR_FREE: u8 = 0xE;
/// Access nibble denying an operation to every key
pub const AR_DENY: u8 = 0xF;

/// File type byte of the settings block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    StandardData = 0,
    BackupData = 1,
    Value = 2,
    LinearRecord = 3,
    CyclicRecord = 4,
    Unknown = 255,
}

impl From<u8> for FileType {
    fn from(value: u8) -> Self {
        match value {
            0 => FileType::StandardData,
            1 => FileType::BackupData,
            2 => FileType::Value,
            3 => FileType::LinearRecord,
            4 => FileType::CyclicRecord,
            _ => FileType::Unknown,
        }
    }
}

/// The four access nibbles of a file
///
/// Each nibble names a key number in 0..=13, or grants the operation freely
/// ([`AR_FREE`]) or to nobody ([`AR_DENY`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessRights {
    pub read: u8,
    pub write: u8,
    pub read_write: u8,
    pub change: u8,
}

impl AccessRights {
    pub fn new(read: u8, write: u8, read_write: u8, change: u8) -> AccessRights {
        AccessRights { read, write, read_write, change }
    }

    /// Unpack from the two wire bytes
    pub fn from_bytes(ar1: u8, ar2: u8) -> AccessRights {
        AccessRights {
            read_write: ar1 >> 4,
            change: ar1 & 0x0F,
            read: ar2 >> 4,
            write: ar2 & 0x0F,
        }
    }

    /// First wire byte: read-write and change-access nibbles
    pub fn ar1(&self) -> u8 {
        (self.read_write << 4) | (self.change & 0x0F)
    }

    /// Second wire byte: read and write nibbles
    pub fn ar2(&self) -> u8 {
        (self.read << 4) | (self.write & 0x0F)
    }
}

/// List the file numbers of the selected application
pub fn get_file_ids_req() -> [u8; 5] {
    [0x90, 0x6F, 0x00, 0x00, 0x00]
}

/// Return the settings block of a file
pub fn get_file_settings_req(file_no: u8) -> [u8; 7] {
    [0x90, 0xF5, 0x00, 0x00, 0x01, file_no, 0x00]
}

/// Change communication setting and access rights of a file.
/// Everything after the file number travels enciphered when the change
/// nibble names a key.
pub fn change_file_settings_cmd(file_no: u8, comm_setting: u8, ar1: u8, ar2: u8) -> [u8; 10] {
    let mut cmd = [0u8; 10];
    cmd[0] = 0x90;
    cmd[1] = 0x5F;
    cmd[4] = 0x04;

    cmd[5] |= file_no;
    cmd[6] |= comm_setting;
    cmd[7] |= ar1;
    cmd[8] |= ar2;
    cmd
}

fn create_data_file_cmd(ins: u8, file_no: u8, comm_setting: u8, ar1: u8, ar2: u8, size: u32) -> [u8; 13] {
    let mut cmd = [0u8; 13];
    cmd[0] = 0x90;
    cmd[1] = ins;
    cmd[4] = 0x07;

    cmd[5] |= file_no;
    cmd[6] |= comm_setting;
    cmd[7] |= ar1;
    cmd[8] |= ar2;
    cmd[9] |= (size & 0xFF) as u8;
    cmd[10] |= ((size >> 8) & 0xFF) as u8;
    cmd[11] |= ((size >> 16) & 0xFF) as u8;
    cmd
}

/// Create a standard data file of the given size
pub fn create_std_data_file_cmd(file_no: u8, comm_setting: u8, ar1: u8, ar2: u8, size: u32) -> [u8; 13] {
    create_data_file_cmd(0xCD, file_no, comm_setting, ar1, ar2, size)
}

/// Create a backup data file; writes become visible on commit
pub fn create_backup_data_file_cmd(file_no: u8, comm_setting: u8, ar1: u8, ar2: u8, size: u32) -> [u8; 13] {
    create_data_file_cmd(0xCB, file_no, comm_setting, ar1, ar2, size)
}

/// Create a value file with bounds, initial value and limited credit flag
#[allow(clippy::too_many_arguments)]
pub fn create_value_file_cmd(
    file_no: u8,
    comm_setting: u8,
    ar1: u8,
    ar2: u8,
    lower: i32,
    upper: i32,
    value: i32,
    limited_credit: bool,
) -> [u8; 23] {
    let mut cmd = [0u8; 23];
    cmd[0] = 0x90;
    cmd[1] = 0xCC;
    cmd[4] = 0x11;

    cmd[5] |= file_no;
    cmd[6] |= comm_setting;
    cmd[7] |= ar1;
    cmd[8] |= ar2;
    cmd[9..13].copy_from_slice(&lower.to_le_bytes());
    cmd[13..17].copy_from_slice(&upper.to_le_bytes());
    cmd[17..21].copy_from_slice(&value.to_le_bytes());
    if limited_credit {
        cmd[21] |= 0x01;
    }
    cmd
}

fn create_record_file_cmd(
    ins: u8,
    file_no: u8,
    comm_setting: u8,
    ar1: u8,
    ar2: u8,
    record_size: u32,
    max_records: u32,
) -> [u8; 16] {
    let mut cmd = [0u8; 16];
    cmd[0] = 0x90;
    cmd[1] = ins;
    cmd[4] = 0x0A;

    cmd[5] |= file_no;
    cmd[6] |= comm_setting;
    cmd[7] |= ar1;
    cmd[8] |= ar2;
    cmd[9] |= (record_size & 0xFF) as u8;
    cmd[10] |= ((record_size >> 8) & 0xFF) as u8;
    cmd[11] |= ((record_size >> 16) & 0xFF) as u8;
    cmd[12] |= (max_records & 0xFF) as u8;
    cmd[13] |= ((max_records >> 8) & 0xFF) as u8;
    cmd[14] |= ((max_records >> 16) & 0xFF) as u8;
    cmd
}

/// Create a linear record file
pub fn create_linear_record_file_cmd(
    file_no: u8,
    comm_setting: u8,
    ar1: u8,
    ar2: u8,
    record_size: u32,
    max_records: u32,
) -> [u8; 16] {
    create_record_file_cmd(0xC1, file_no, comm_setting, ar1, ar2, record_size, max_records)
}

/// Create a cyclic record file; the oldest record is overwritten when full
pub fn create_cyclic_record_file_cmd(
    file_no: u8,
    comm_setting: u8,
    ar1: u8,
    ar2: u8,
    record_size: u32,
    max_records: u32,
) -> [u8; 16] {
    create_record_file_cmd(0xC0, file_no, comm_setting, ar1, ar2, record_size, max_records)
}

/// Delete a file from the selected application
pub fn delete_file_cmd(file_no: u8) -> [u8; 7] {
    [0x90, 0xDF, 0x00, 0x00, 0x01, file_no, 0x00]
}

// Response structs

/// Settings block of a file as returned by GetFileSettings.
/// The layout after the common four bytes depends on the file type.
#[derive(Clone)]
pub struct FileSettings(Vec<u8>);

impl FileSettings {
    pub fn from_slice(bytes: &[u8]) -> FileSettings {
        FileSettings(bytes.to_vec())
    }

    fn byte(&self, idx: usize) -> u8 {
        *self.0.get(idx).unwrap_or(&0)
    }

    fn le24(&self, idx: usize) -> u32 {
        (self.byte(idx) as u32)
            | ((self.byte(idx + 1) as u32) << 8)
            | ((self.byte(idx + 2) as u32) << 16)
    }

    fn le32(&self, idx: usize) -> i32 {
        i32::from_le_bytes([
            self.byte(idx),
            self.byte(idx + 1),
            self.byte(idx + 2),
            self.byte(idx + 3),
        ])
    }

    pub fn file_type(&self) -> FileType {
        self.byte(0).into()
    }

    /// Raw communication setting byte (0 plain, 1 MACed, 3 enciphered)
    pub fn comm_setting(&self) -> u8 {
        self.byte(1)
    }

    pub fn access_rights(&self) -> AccessRights {
        AccessRights::from_bytes(self.byte(2), self.byte(3))
    }

    /// Size in bytes of a standard or backup data file
    pub fn data_size(&self) -> u32 {
        self.le24(4)
    }

    /// Lower bound of a value file
    pub fn lower_limit(&self) -> i32 {
        self.le32(4)
    }

    /// Upper bound of a value file
    pub fn upper_limit(&self) -> i32 {
        self.le32(8)
    }

    /// Maximum amount available for limited credit
    pub fn limited_credit_value(&self) -> i32 {
        self.le32(12)
    }

    pub fn limited_credit_enabled(&self) -> bool {
        self.byte(16) & 0x01 != 0
    }

    /// Record size in bytes of a record file
    pub fn record_size(&self) -> u32 {
        self.le24(4)
    }

    /// Capacity in records of a record file
    pub fn max_records(&self) -> u32 {
        self.le24(7)
    }

    /// Records currently stored in a record file
    pub fn current_records(&self) -> u32 {
        self.le24(10)
    }
}
