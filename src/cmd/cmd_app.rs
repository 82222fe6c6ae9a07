// Application and PICC level commands API

use crate::session::KeyType;

/// Start mutual authentication for the given key number. The opcode selects
/// the key family: 0x0A for DES/2K3DES, 0x1A for 3K3DES, 0xAA for AES.
pub fn authenticate_cmd(auth_ins: u8, key_no: u8) -> [u8; 7] {
    [0x90, auth_ins, 0x00, 0x00, 0x01, key_no, 0x00]
}

/// Select an application by its 3-byte identifier (all zero for PICC level)
pub fn select_application_cmd(aid: [u8; 3]) -> [u8; 9] {
    let mut cmd = [0u8; 9];
    cmd[0] = 0x90;
    cmd[1] = 0x5A;
    cmd[4] = 0x03;

    cmd[5] |= aid[0];
    cmd[6] |= aid[1];
    cmd[7] |= aid[2];
    cmd
}

/// Create an application with the given key settings and key count byte
pub fn create_application_cmd(aid: [u8; 3], key_settings: u8, app_keys: u8) -> [u8; 11] {
    let mut cmd = [0u8; 11];
    cmd[0] = 0x90;
    cmd[1] = 0xCA;
    cmd[4] = 0x05;

    cmd[5] |= aid[0];
    cmd[6] |= aid[1];
    cmd[7] |= aid[2];
    cmd[8] |= key_settings;
    cmd[9] |= app_keys;
    cmd
}

/// Delete an application and release its memory
pub fn delete_application_cmd(aid: [u8; 3]) -> [u8; 9] {
    let mut cmd = [0u8; 9];
    cmd[0] = 0x90;
    cmd[1] = 0xDA;
    cmd[4] = 0x03;

    cmd[5] |= aid[0];
    cmd[6] |= aid[1];
    cmd[7] |= aid[2];
    cmd
}

/// List the identifiers of all applications on the card
pub fn get_applications_ids_req() -> [u8; 5] {
    [0x90, 0x6A, 0x00, 0x00, 0x00]
}

/// Return the free EEPROM space in bytes
pub fn free_memory_req() -> [u8; 5] {
    [0x90, 0x6E, 0x00, 0x00, 0x00]
}

/// Release all applications and files of the card
pub fn format_picc_cmd() -> [u8; 5] {
    [0x90, 0xFC, 0x00, 0x00, 0x00]
}

/// Return manufacturing related data (three chained frames)
pub fn get_version_req() -> [u8; 5] {
    [0x90, 0x60, 0x00, 0x00, 0x00]
}

/// Return the key settings of the selected application or PICC
pub fn get_key_settings_req() -> [u8; 5] {
    [0x90, 0x45, 0x00, 0x00, 0x00]
}

/// Return the version of the given key
pub fn get_key_version_req(key_no: u8) -> [u8; 7] {
    [0x90, 0x64, 0x00, 0x00, 0x01, key_no, 0x00]
}

/// Change the key settings of the selected application or PICC.
/// The one byte body travels enciphered.
pub fn change_key_settings_cmd(settings: u8) -> [u8; 7] {
    [0x90, 0x54, 0x00, 0x00, 0x01, settings, 0x00]
}

/// Return the 7-byte unique identifier (enciphered response)
pub fn get_card_uid_req() -> [u8; 5] {
    [0x90, 0x51, 0x00, 0x00, 0x00]
}

/// Replace a key with an already enciphered key block
pub fn change_key_cmd(key_no: u8, cryptogram: &[u8]) -> Vec<u8> {
    let mut cmd = vec![0x90, 0xC4, 0x00, 0x00, (1 + cryptogram.len()) as u8, key_no];
    cmd.extend_from_slice(cryptogram);
    cmd.push(0x00);
    cmd
}

// Response structs

/// Response for GetKeySettings
#[derive(Default)]
pub struct KeySettingsRsp([u8; 2]);

impl KeySettingsRsp {
    /// Create a response from the settings and key count bytes
    /// Handle gracefully case where slice is shorter than expected
    pub fn from_slice(bytes: &[u8]) -> KeySettingsRsp {
        let mut rsp = KeySettingsRsp::default();
        let n = bytes.len().min(2);
        rsp.0[..n].copy_from_slice(&bytes[..n]);
        rsp
    }

    /// Raw key settings byte
    pub fn settings(&self) -> u8 {
        self.0[0]
    }

    /// Master key may be changed
    pub fn master_key_changeable(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    /// Directory listing allowed without master key authentication
    pub fn free_listing(&self) -> bool {
        self.0[0] & 0x02 != 0
    }

    /// File or application create/delete allowed without master key authentication
    pub fn free_create_delete(&self) -> bool {
        self.0[0] & 0x04 != 0
    }

    /// Key settings may still be changed
    pub fn configuration_changeable(&self) -> bool {
        self.0[0] & 0x08 != 0
    }

    /// Key number allowed to change keys (0xE: same key, 0xF: frozen)
    pub fn change_key_access(&self) -> u8 {
        self.0[0] >> 4
    }

    /// Number of keys of the application
    pub fn max_keys(&self) -> u8 {
        self.0[1] & 0x0F
    }

    /// Key family of the application
    pub fn key_type(&self) -> KeyType {
        match self.0[1] & 0xC0 {
            0x40 => KeyType::Tktdes,
            0x80 => KeyType::Aes,
            _ => KeyType::Des,
        }
    }
}

/// Response for GetVersion, 28 bytes collected over three frames
#[derive(Default)]
pub struct VersionRsp([u8; 28]);

impl VersionRsp {
    /// Create a response from the aggregated frame data
    /// Handle gracefully case where slice is shorter than expected
    pub fn from_slice(bytes: &[u8]) -> VersionRsp {
        let mut rsp = VersionRsp::default();
        let n = bytes.len().min(28);
        rsp.0[..n].copy_from_slice(&bytes[..n]);
        rsp
    }

    /// Hardware vendor (NXP is 0x04)
    pub fn hw_vendor(&self) -> u8 {
        self.0[0]
    }

    /// Hardware type and subtype
    pub fn hw_type(&self) -> (u8, u8) {
        (self.0[1], self.0[2])
    }

    /// Hardware version as (major, minor)
    pub fn hw_version(&self) -> (u8, u8) {
        (self.0[3], self.0[4])
    }

    /// Hardware storage size code (0x18 is 4kB)
    pub fn hw_storage(&self) -> u8 {
        self.0[5]
    }

    /// Hardware protocol code
    pub fn hw_protocol(&self) -> u8 {
        self.0[6]
    }

    /// Software vendor
    pub fn sw_vendor(&self) -> u8 {
        self.0[7]
    }

    /// Software version as (major, minor)
    pub fn sw_version(&self) -> (u8, u8) {
        (self.0[10], self.0[11])
    }

    /// 7-byte unique identifier
    pub fn uid(&self) -> [u8; 7] {
        let mut uid = [0u8; 7];
        uid.copy_from_slice(&self.0[14..21]);
        uid
    }

    /// 5-byte production batch number
    pub fn batch(&self) -> [u8; 5] {
        let mut batch = [0u8; 5];
        batch.copy_from_slice(&self.0[21..26]);
        batch
    }

    /// Calendar week of production, BCD coded
    pub fn production_week(&self) -> u8 {
        self.0[26]
    }

    /// Year of production, BCD coded
    pub fn production_year(&self) -> u8 {
        self.0[27]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_application_frame() {
        assert_eq!(
            select_application_cmd([0x01, 0x02, 0x03]),
            [0x90, 0x5A, 0x00, 0x00, 0x03, 0x01, 0x02, 0x03, 0x00]
        );
    }

    #[test]
    fn create_application_frame() {
        assert_eq!(
            create_application_cmd([0xAA, 0xBB, 0xCC], 0x0F, 0x83),
            [0x90, 0xCA, 0x00, 0x00, 0x05, 0xAA, 0xBB, 0xCC, 0x0F, 0x83, 0x00]
        );
    }

    #[test]
    fn change_key_frame() {
        let cmd = change_key_cmd(0x80, &[0x11; 32]);
        assert_eq!(cmd.len(), 5 + 1 + 32 + 1);
        assert_eq!(&cmd[..6], &[0x90, 0xC4, 0x00, 0x00, 0x21, 0x80]);
        assert_eq!(cmd[cmd.len() - 1], 0x00);
    }

    #[test]
    fn key_settings_bits() {
        let rsp = KeySettingsRsp::from_slice(&[0xE9, 0x85]);
        assert!(rsp.master_key_changeable());
        assert!(!rsp.free_listing());
        assert!(rsp.configuration_changeable());
        assert_eq!(rsp.change_key_access(), 0xE);
        assert_eq!(rsp.max_keys(), 5);
        assert_eq!(rsp.key_type(), KeyType::Aes);
    }

    #[test]
    fn version_fields() {
        let mut raw = [0u8; 28];
        raw[0] = 0x04;
        raw[3] = 1;
        raw[4] = 2;
        raw[5] = 0x18;
        raw[14..21].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7]);
        raw[26] = 0x25;
        raw[27] = 0x16;
        let rsp = VersionRsp::from_slice(&raw);
        assert_eq!(rsp.hw_vendor(), 0x04);
        assert_eq!(rsp.hw_version(), (1, 2));
        assert_eq!(rsp.hw_storage(), 0x18);
        assert_eq!(rsp.uid(), [1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(rsp.production_week(), 0x25);
        assert_eq!(rsp.production_year(), 0x16);
    }
}
