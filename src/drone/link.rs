//! UDP transport for MAVLink frames
//!
//! One socket talks to one autopilot. The peer is either configured up front
//! or learned from the first datagram that decodes.

use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;

use mavlink::common::MavMessage;
use mavlink::peek_reader::PeekReader;
use mavlink::MavHeader;
use tokio::net::UdpSocket;

use crate::error::{LinkError, Result};

/// Largest MAVLink v2 frame (signed)
const MAX_FRAME_LEN: usize = 280;

const MAGIC_V1: u8 = 0xFE;
const MAGIC_V2: u8 = 0xFD;

/// MAVLink link over a UDP socket
pub struct MavlinkLink {
    socket: UdpSocket,
    peer: Mutex<Option<SocketAddr>>,
    sequence: AtomicU8,
    system_id: u8,
    component_id: u8,
}

impl MavlinkLink {
    /// Bind a link to `bind_addr`, sending as `system_id`/`component_id`
    pub async fn bind(
        bind_addr: &str,
        remote: Option<SocketAddr>,
        system_id: u8,
        component_id: u8,
    ) -> Result<Self> {
        let socket = UdpSocket::bind(bind_addr).await.map_err(|e| LinkError::Bind {
            addr: bind_addr.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            socket,
            peer: Mutex::new(remote),
            sequence: AtomicU8::new(0),
            system_id,
            component_id,
        })
    }

    /// Address the socket is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Current autopilot endpoint, if known
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer.lock().ok().and_then(|peer| *peer)
    }

    /// Send a message to the peer.
    ///
    /// Returns `false` without sending when no peer is known yet.
    pub async fn send(&self, message: &MavMessage) -> Result<bool> {
        let Some(peer) = self.peer() else {
            return Ok(false);
        };

        let header = MavHeader {
            system_id: self.system_id,
            component_id: self.component_id,
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
        };
        let frame = encode_frame(header, message)?;

        self.socket
            .send_to(&frame, peer)
            .await
            .map_err(|e| LinkError::Send {
                message: e.to_string(),
            })?;

        Ok(true)
    }

    /// Receive the next decodable message.
    ///
    /// Datagrams that do not decode are dropped.
    pub async fn recv(&self) -> Result<(MavHeader, MavMessage)> {
        let mut buf = [0u8; MAX_FRAME_LEN * 4];

        loop {
            let (len, from) = self
                .socket
                .recv_from(&mut buf)
                .await
                .map_err(|e| LinkError::Receive {
                    message: e.to_string(),
                })?;

            match decode_frame(&buf[..len]) {
                Some(decoded) => {
                    self.learn_peer(from);
                    return Ok(decoded);
                }
                None => {
                    tracing::debug!("Dropping undecodable datagram ({} bytes) from {}", len, from);
                }
            }
        }
    }

    fn learn_peer(&self, from: SocketAddr) {
        if let Ok(mut peer) = self.peer.lock() {
            if peer.is_none() {
                tracing::info!("Autopilot endpoint discovered at {}", from);
                *peer = Some(from);
            }
        }
    }
}

/// Encode a message as a MAVLink v2 frame
pub fn encode_frame(header: MavHeader, message: &MavMessage) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::with_capacity(MAX_FRAME_LEN));
    mavlink::write_v2_msg(&mut buf, header, message).map_err(|e| LinkError::Encode {
        message: format!("{e:?}"),
    })?;
    Ok(buf.into_inner())
}

/// Decode the first frame of a datagram (v1 or v2)
pub fn decode_frame(data: &[u8]) -> Option<(MavHeader, MavMessage)> {
    let magic = *data.first()?;
    let mut reader = PeekReader::new(Cursor::new(data));

    match magic {
        MAGIC_V2 => mavlink::read_v2_msg::<MavMessage, _>(&mut reader).ok(),
        MAGIC_V1 => mavlink::read_v1_msg::<MavMessage, _>(&mut reader).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mavlink::common::{MavAutopilot, MavModeFlag, MavState, MavType, HEARTBEAT_DATA};

    fn heartbeat() -> MavMessage {
        MavMessage::HEARTBEAT(HEARTBEAT_DATA {
            custom_mode: 0,
            mavtype: MavType::MAV_TYPE_QUADROTOR,
            autopilot: MavAutopilot::MAV_AUTOPILOT_PX4,
            base_mode: MavModeFlag::empty(),
            system_status: MavState::MAV_STATE_STANDBY,
            mavlink_version: 3,
        })
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_frame(&[]).is_none());
        assert!(decode_frame(&[0x00, 0x01, 0x02]).is_none());
        assert!(decode_frame(&[MAGIC_V2, 0x09]).is_none());
    }

    #[test]
    fn test_v1_frames_decode() {
        let header = MavHeader {
            system_id: 1,
            component_id: 1,
            sequence: 7,
        };
        let mut buf = Cursor::new(Vec::new());
        mavlink::write_v1_msg(&mut buf, header, &heartbeat()).unwrap();

        let (decoded_header, message) = decode_frame(&buf.into_inner()).unwrap();
        assert_eq!(decoded_header.sequence, 7);
        assert!(matches!(message, MavMessage::HEARTBEAT(_)));
    }

    #[tokio::test]
    async fn test_send_without_peer_is_noop() {
        let link = MavlinkLink::bind("127.0.0.1:0", None, 255, 190).await.unwrap();
        assert!(link.peer().is_none());
        assert!(!link.send(&heartbeat()).await.unwrap());
    }

    #[tokio::test]
    async fn test_peer_learned_from_first_datagram() {
        let link = MavlinkLink::bind("127.0.0.1:0", None, 255, 190).await.unwrap();
        let link_addr = link.local_addr().unwrap();

        let autopilot = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let header = MavHeader {
            system_id: 1,
            component_id: 1,
            sequence: 0,
        };
        let frame = encode_frame(header, &heartbeat()).unwrap();
        autopilot.send_to(&frame, link_addr).await.unwrap();

        let (received_header, _) = link.recv().await.unwrap();
        assert_eq!(received_header.system_id, 1);
        assert_eq!(link.peer(), Some(autopilot.local_addr().unwrap()));

        // Replies now reach the autopilot with our ids
        assert!(link.send(&heartbeat()).await.unwrap());
        let mut buf = [0u8; 512];
        let (len, _) = autopilot.recv_from(&mut buf).await.unwrap();
        let (reply_header, _) = decode_frame(&buf[..len]).unwrap();
        assert_eq!(reply_header.system_id, 255);
        assert_eq!(reply_header.component_id, 190);
    }
}
