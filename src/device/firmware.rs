//! Firmware update flow
//!
//! Two phases: an upgrade request carrying the new version code and image
//! size, which the device must accept, then the image itself streamed
//! through the transfer engine (see
//! [`DeviceSession::upload_firmware`](crate::session::DeviceSession::upload_firmware)).
//! The device reboots on its own after a successful upload.

use bytes::{BufMut, BytesMut};

use crate::protocol::command_id;
use crate::session::{DeviceSession, SessionResult};
use crate::transport::Transport;

impl<T: Transport> DeviceSession<T> {
    /// Announce an upcoming firmware upload. The device rejects images it
    /// considers too large or versions it refuses to install.
    pub async fn request_firmware_upgrade(
        &self,
        version_code: u32,
        image_size: u32,
    ) -> SessionResult<()> {
        let mut body = BytesMut::with_capacity(8);
        body.put_u32(version_code);
        body.put_u32(image_size);
        self.send_expect_ok(command_id::REQUEST_FIRMWARE_UPGRADE, body.freeze())
            .await?;
        tracing::info!(version_code, image_size, "firmware upgrade accepted");
        Ok(())
    }

    /// Full update: request, then stream the image with progress
    pub async fn update_firmware<F>(
        &self,
        version_code: u32,
        image: &[u8],
        on_progress: F,
    ) -> SessionResult<()>
    where
        F: FnMut(u64, u64) + Send,
    {
        self.request_firmware_upgrade(version_code, image.len() as u32)
            .await?;
        self.upload_firmware(image, on_progress).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::command_id;
    use crate::session::{DeviceSession, SessionError};
    use crate::transport::mock::{MockQueues, MockTransport};

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
    async fn test_request_body_layout() {
        let (session, queues) = connected_session().await;
        queues.push_response(command_id::REQUEST_FIRMWARE_UPGRADE, 1, &[0]);

        session
            .request_firmware_upgrade(0x00060100, 2048)
            .await
            .unwrap();

        let sent = queues.sent();
        let body = &sent[1][12..];
        assert_eq!(&body[..4], &0x00060100u32.to_be_bytes());
        assert_eq!(&body[4..], &2048u32.to_be_bytes());
    }

    #[tokio::test]
    async fn test_rejected_request_aborts_update() {
        let (session, queues) = connected_session().await;
        queues.push_response(command_id::REQUEST_FIRMWARE_UPGRADE, 1, &[1]);

        let result = session
            .update_firmware(0x00060100, &[0xff; 128], |_, _| {})
            .await;
        assert!(matches!(
            result,
            Err(SessionError::CommandRejected { status: 1, .. })
        ));
        // No image bytes were sent after the rejection
        assert_eq!(queues.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_full_update_flow() {
        let (session, queues) = connected_session().await;
        queues.push_response(command_id::REQUEST_FIRMWARE_UPGRADE, 1, &[0]);
        // Upload ack for the transfer sequence
        queues.push_response(command_id::FIRMWARE_UPLOAD, 2, &[0]);

        session
            .update_firmware(0x00060100, &[0xee; 100], |_, _| {})
            .await
            .unwrap();

        let sent = queues.sent();
        // Handshake, request, one image chunk
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[2].len() - 12, 100);
    }
}
