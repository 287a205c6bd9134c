//! Recording file listing and deletion
//!
//! The file-list body is a sequence of entries, optionally preceded by a
//! `FF FF` marker plus a u32 total count:
//!
//! ```text
//! [u8 entry version][u24 BE name length][name bytes]
//! [u32 BE file size][6 reserved bytes][16 byte signature]
//! ```
//!
//! Recording timestamps are not carried in the entry; the firmware encodes
//! them in the filename (`2025May12-093045-Rec44.hda`), so they are parsed
//! from the name where the pattern matches.

use bytes::Bytes;

use super::clock::DeviceTime;
use crate::protocol::command_id;
use crate::session::{DeviceSession, SessionError, SessionResult};
use crate::transport::Transport;

const ENTRY_FIXED_TAIL: usize = 4 + 6 + 16;

/// One recording as reported by the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingFile {
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// Entry format version byte
    pub version: u8,
    /// Recording start time, when the filename carries one
    pub created: Option<DeviceTime>,
}

impl RecordingFile {
    /// Parse `2025May12-093045-Rec44.hda` style names
    fn created_from_name(name: &str) -> Option<DeviceTime> {
        let stem = name.split('-').collect::<Vec<_>>();
        if stem.len() < 2 {
            return None;
        }
        let date = stem[0]; // 2025May12
        let time = stem[1]; // 093045
        if date.len() != 9 || time.len() != 6 || !date.is_ascii() || !time.is_ascii() {
            return None;
        }

        let year: u16 = date[..4].parse().ok()?;
        let month = match &date[4..7] {
            "Jan" => 1,
            "Feb" => 2,
            "Mar" => 3,
            "Apr" => 4,
            "May" => 5,
            "Jun" => 6,
            "Jul" => 7,
            "Aug" => 8,
            "Sep" => 9,
            "Oct" => 10,
            "Nov" => 11,
            "Dec" => 12,
            _ => return None,
        };
        let day: u8 = date[7..9].parse().ok()?;
        let hour: u8 = time[..2].parse().ok()?;
        let minute: u8 = time[2..4].parse().ok()?;
        let second: u8 = time[4..6].parse().ok()?;

        let t = DeviceTime {
            year,
            month,
            day,
            hour,
            minute,
            second,
        };
        t.is_plausible().then_some(t)
    }
}

/// Parse the file-list response body
fn parse_file_list(body: &[u8]) -> Option<Vec<RecordingFile>> {
    let mut offset = 0;

    // Optional count header
    if body.len() >= 6 && body[0] == 0xff && body[1] == 0xff {
        offset = 6;
    }

    let mut files = Vec::new();
    while offset < body.len() {
        if body.len() - offset < 4 {
            return None;
        }
        let version = body[offset];
        let name_len =
            u32::from_be_bytes([0, body[offset + 1], body[offset + 2], body[offset + 3]]) as usize;
        offset += 4;

        if body.len() - offset < name_len + ENTRY_FIXED_TAIL {
            return None;
        }
        let name = String::from_utf8_lossy(&body[offset..offset + name_len]).to_string();
        offset += name_len;

        let size = u32::from_be_bytes([
            body[offset],
            body[offset + 1],
            body[offset + 2],
            body[offset + 3],
        ]) as u64;
        // Reserved bytes and per-file signature are not interpreted
        offset += ENTRY_FIXED_TAIL;

        let created = RecordingFile::created_from_name(&name);
        files.push(RecordingFile {
            name,
            size,
            version,
            created,
        });
    }

    Some(files)
}

impl<T: Transport> DeviceSession<T> {
    /// Number of recordings on the device
    pub async fn file_count(&self) -> SessionResult<u32> {
        let response = self
            .send_command(command_id::GET_FILE_COUNT, Bytes::new())
            .await?;
        if response.body.is_empty() {
            return Ok(0);
        }
        if response.body.len() < 4 {
            return Err(SessionError::BadResponse {
                id: command_id::GET_FILE_COUNT,
            });
        }
        let b = &response.body;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// List all recordings on the device
    pub async fn list_files(&self) -> SessionResult<Vec<RecordingFile>> {
        if self.file_count().await? == 0 {
            return Ok(Vec::new());
        }

        let response = self
            .send_command(command_id::GET_FILE_LIST, Bytes::new())
            .await?;
        parse_file_list(&response.body).ok_or(SessionError::BadResponse {
            id: command_id::GET_FILE_LIST,
        })
    }

    /// Delete one recording by name.
    ///
    /// Not retried on timeout: a resend after an unknown outcome could
    /// delete a second file that reused the slot.
    pub async fn delete_file(&self, name: &str) -> SessionResult<()> {
        self.send_expect_ok(
            command_id::DELETE_FILE,
            Bytes::copy_from_slice(name.as_bytes()),
        )
        .await?;
        tracing::info!(name, "file deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::command_id;
    use crate::session::DeviceSession;
    use crate::transport::mock::{MockQueues, MockTransport};

    fn entry(version: u8, name: &str, size: u32) -> Vec<u8> {
        let mut out = vec![version];
        out.extend_from_slice(&(name.len() as u32).to_be_bytes()[1..]);
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(&size.to_be_bytes());
        out.extend_from_slice(&[0; 6]);
        out.extend_from_slice(&[0xab; 16]);
        out
    }

    #[test]
    fn test_parse_file_list() {
        let mut body = entry(1, "2025May12-093045-Rec44.hda", 120_000);
        body.extend_from_slice(&entry(2, "note.wav", 64));

        let files = parse_file_list(&body).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].name, "2025May12-093045-Rec44.hda");
        assert_eq!(files[0].size, 120_000);
        assert_eq!(files[0].version, 1);
        let created = files[0].created.clone().unwrap();
        assert_eq!((created.year, created.month, created.day), (2025, 5, 12));
        assert_eq!(
            (created.hour, created.minute, created.second),
            (9, 30, 45)
        );

        assert_eq!(files[1].name, "note.wav");
        assert!(files[1].created.is_none());
    }

    #[test]
    fn test_parse_file_list_with_count_header() {
        let mut body = vec![0xff, 0xff];
        body.extend_from_slice(&1u32.to_be_bytes());
        body.extend_from_slice(&entry(1, "a.hda", 10));

        let files = parse_file_list(&body).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "a.hda");
    }

    #[test]
    fn test_parse_truncated_entry_fails() {
        let mut body = entry(1, "a.hda", 10);
        body.truncate(body.len() - 5);
        assert!(parse_file_list(&body).is_none());
    }

    #[test]
    fn test_created_rejects_bad_dates() {
        assert!(RecordingFile::created_from_name("2025Zzz12-093045-x.hda").is_none());
        assert!(RecordingFile::created_from_name("2025May99-093045-x.hda").is_none());
        assert!(RecordingFile::created_from_name("plain.hda").is_none());
    }

    async fn connected_session() -> (DeviceSession<MockTransport>, MockQueues) {
        let transport = MockTransport::new();
        let queues = transport.queues();
        let mut info = vec![0, 1, 0, 0];
        info.extend_from_slice(&[b'S'; 16]);
        queues.push_response(command_id::GET_DEVICE_INFO, 0, &info);
        let session = DeviceSession::new(transport);
        session.connect().await.unwrap();
        (session, queues)
    }

    #[tokio::test]
    async fn test_list_files_empty_device() {
        let (session, queues) = connected_session().await;
        queues.push_response(command_id::GET_FILE_COUNT, 1, &0u32.to_be_bytes());

        let files = session.list_files().await.unwrap();
        assert!(files.is_empty());
        // No file-list command was issued for an empty device
        assert_eq!(queues.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_list_files_roundtrip() {
        let (session, queues) = connected_session().await;
        queues.push_response(command_id::GET_FILE_COUNT, 1, &1u32.to_be_bytes());
        queues.push_response(command_id::GET_FILE_LIST, 2, &entry(1, "a.hda", 42));

        let files = session.list_files().await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].size, 42);
    }

    #[tokio::test]
    async fn test_delete_sends_name_and_checks_status() {
        let (session, queues) = connected_session().await;
        queues.push_response(command_id::DELETE_FILE, 1, &[0]);

        session.delete_file("a.hda").await.unwrap();
        let sent = queues.sent();
        assert_eq!(&sent[1][12..], b"a.hda");
    }
}
