// Transport-safe encoding for the viewer stream
//
// Printable ASCII other than backslash passes through; every other byte
// becomes `\` plus two lowercase hex digits. Backslash followed by a letter
// is reserved for markers, which can therefore never collide with data.

const HEX: &[u8; 16] = b"0123456789abcdef";

/// Marker: viewer is now on the primary screen
pub const MARK_PRIMARY: &[u8] = b"\\s1";
/// Marker: viewer is now on the alternate screen
pub const MARK_ALTERNATE: &[u8] = b"\\s2";
/// Marker: clear the screen
pub const MARK_CLEAR: &[u8] = b"\\cl";
/// Marker: save cursor and state
pub const MARK_SAVE: &[u8] = b"\\ss";
/// Marker: restore cursor and state
pub const MARK_RESTORE: &[u8] = b"\\rs";

pub fn is_passthrough(byte: u8) -> bool {
    (0x20..=0x7e).contains(&byte) && byte != b'\\'
}

pub fn encode_byte(byte: u8, out: &mut Vec<u8>) {
    if is_passthrough(byte) {
        out.push(byte);
    } else {
        out.push(b'\\');
        out.push(HEX[(byte >> 4) as usize]);
        out.push(HEX[(byte & 0x0f) as usize]);
    }
}

pub fn encode_into(bytes: &[u8], out: &mut Vec<u8>) {
    for &b in bytes {
        encode_byte(b, out);
    }
}

pub fn encode(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    encode_into(bytes, &mut out);
    out
}
