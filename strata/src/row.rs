//! The fixed row layout: a 32-bit key followed by two null-padded string
//! buffers, laid out back to back with no padding.

/// Longest username a row can hold, in bytes.
pub const USERNAME_MAX_LENGTH: usize = 32;
/// Longest email a row can hold, in bytes.
pub const EMAIL_MAX_LENGTH: usize = 255;

const ID_SIZE: usize = 4;
// Each string buffer reserves one byte past the longest legal value, so a
// maximum-length field still ends in a null.
const USERNAME_SIZE: usize = USERNAME_MAX_LENGTH + 1;
const EMAIL_SIZE: usize = EMAIL_MAX_LENGTH + 1;

const ID_OFFSET: usize = 0;
const USERNAME_OFFSET: usize = ID_OFFSET + ID_SIZE;
const EMAIL_OFFSET: usize = USERNAME_OFFSET + USERNAME_SIZE;

/// On-disk size of one serialized row.
pub const ROW_SIZE: usize = ID_SIZE + USERNAME_SIZE + EMAIL_SIZE;

/// A single table row. Field lengths are validated at the statement
/// boundary; the codec itself truncates rather than overruns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub id: u32,
    pub username: String,
    pub email: String,
}

impl Row {
    pub fn new(id: u32, username: &str, email: &str) -> Self {
        Row {
            id,
            username: username.to_string(),
            email: email.to_string(),
        }
    }

    /// Writes the row into a `ROW_SIZE` destination buffer.
    pub fn serialize(&self, destination: &mut [u8]) {
        destination[ID_OFFSET..ID_OFFSET + ID_SIZE].copy_from_slice(&self.id.to_le_bytes());
        write_padded(
            &mut destination[USERNAME_OFFSET..USERNAME_OFFSET + USERNAME_SIZE],
            self.username.as_bytes(),
        );
        write_padded(
            &mut destination[EMAIL_OFFSET..EMAIL_OFFSET + EMAIL_SIZE],
            self.email.as_bytes(),
        );
    }

    /// Reads a row back out of a `ROW_SIZE` source buffer.
    pub fn deserialize(source: &[u8]) -> Row {
        let mut id_bytes = [0u8; ID_SIZE];
        id_bytes.copy_from_slice(&source[ID_OFFSET..ID_OFFSET + ID_SIZE]);
        Row {
            id: u32::from_le_bytes(id_bytes),
            username: read_padded(&source[USERNAME_OFFSET..USERNAME_OFFSET + USERNAME_SIZE]),
            email: read_padded(&source[EMAIL_OFFSET..EMAIL_OFFSET + EMAIL_SIZE]),
        }
    }
}

fn write_padded(destination: &mut [u8], source: &[u8]) {
    // The final byte of the buffer is never written, so a trailing null
    // always survives even for maximum-length values.
    let len = source.len().min(destination.len() - 1);
    destination[..len].copy_from_slice(&source[..len]);
    for byte in destination[len..].iter_mut() {
        *byte = 0;
    }
}

fn read_padded(source: &[u8]) -> String {
    let end = source.iter().position(|&b| b == 0).unwrap_or(source.len());
    String::from_utf8_lossy(&source[..end]).into_owned()
}
