//! APDU builders and response parsing for the DESFire EV1 command set.
//!
//! Native commands are wrapped in short form ISO 7816-4 frames:
//! `CLA=0x90, INS, P1=0, P2=0, Lc, body..., Le=0x00`. Builders return the
//! full frame; the secure messaging layer rewrites the body and `Lc` in
//! place when a command travels MACed or enciphered.

pub mod cmd_app;
pub mod cmd_data;
pub mod cmd_file;

/// Ask the card for the next frame of a chained response
pub fn next_frame_req() -> [u8; 5] {
    [0x90, 0xAF, 0x00, 0x00, 0x00]
}

/// Continue a chained exchange with a data carrying frame
pub fn additional_frame_cmd(data: &[u8]) -> Vec<u8> {
    let mut cmd = vec![0x90, 0xAF, 0x00, 0x00, data.len() as u8];
    cmd.extend_from_slice(data);
    cmd.push(0x00);
    cmd
}
