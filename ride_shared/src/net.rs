//! Feed networking primitives.
//!
//! Goals:
//! - Provide a simple reliable (TCP) channel for location events.
//! - Provide the message types exchanged by the feed and its subscribers.
//! - Keep serialization explicit and versionable.
//!
//! Frames are a big-endian `u32` payload length followed by JSON.

use anyhow::Context;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::{
    net::SocketAddr,
    sync::atomic::{AtomicU32, Ordering},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

use crate::location::LocationUpdate;

/// Protocol version for compatibility checks.
pub const PROTOCOL_VERSION: u32 = 1;

/// Largest payload a peer may announce.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

static NEXT_SUBSCRIBER_ID: AtomicU32 = AtomicU32::new(1);

/// Identifies a connected subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubscriberId(pub u32);

impl SubscriberId {
    pub fn new_unique() -> Self {
        SubscriberId(NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// High-level message envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum FeedMsg {
    // ─── Connection handshake ───
    Hello {
        protocol: u32,
    },
    Welcome {
        subscriber_id: SubscriberId,
    },
    /// Subscriber -> feed: which ride to follow.
    Subscribe {
        ride_id: String,
    },

    // ─── Tracking ───
    /// Feed -> subscriber: one driver location report.
    Location {
        ride_id: String,
        update: LocationUpdate,
    },
    /// Feed -> subscriber: no more reports for this ride.
    RideEnded {
        ride_id: String,
        reason: String,
    },
}

/// Reliable connection over TCP with length-prefixed frames.
#[derive(Debug)]
pub struct FeedConn {
    stream: TcpStream,
}

impl FeedConn {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await.context("tcp connect")?;
        Ok(Self::new(stream))
    }

    pub async fn send(&mut self, msg: &FeedMsg) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(msg).context("serialize msg")?;
        let mut buf = BytesMut::with_capacity(4 + payload.len());
        buf.put_u32(payload.len() as u32);
        buf.extend_from_slice(&payload);
        self.stream.write_all(&buf).await.context("tcp write")?;
        Ok(())
    }

    pub async fn recv(&mut self) -> anyhow::Result<FeedMsg> {
        let mut len_buf = [0u8; 4];
        self.stream
            .read_exact(&mut len_buf)
            .await
            .context("tcp read len")?;
        let len = u32::from_be_bytes(len_buf) as usize;
        if len > MAX_FRAME_LEN {
            anyhow::bail!("frame of {len} bytes exceeds {MAX_FRAME_LEN}");
        }
        let mut payload = vec![0u8; len];
        self.stream
            .read_exact(&mut payload)
            .await
            .context("tcp read payload")?;
        let msg = serde_json::from_slice(&payload).context("deserialize msg")?;
        Ok(msg)
    }

    pub fn peer_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }
}

/// TCP feed listener.
pub struct FeedListener {
    listener: TcpListener,
}

impl FeedListener {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await.context("tcp bind")?;
        Ok(Self { listener })
    }

    pub async fn accept(&self) -> anyhow::Result<(FeedConn, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await.context("tcp accept")?;
        Ok((FeedConn::new(stream), addr))
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

/// Convenience codec helpers.
pub fn encode_to_bytes(msg: &FeedMsg) -> anyhow::Result<Bytes> {
    let payload = serde_json::to_vec(msg).context("serialize")?;
    Ok(Bytes::from(payload))
}

pub fn decode_from_bytes(b: &[u8]) -> anyhow::Result<FeedMsg> {
    serde_json::from_slice(b).context("deserialize")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn location_msg_keeps_optional_fields() {
        let msg = FeedMsg::Location {
            ride_id: "r1".into(),
            update: LocationUpdate::new(7.0, -72.0).heading(45.0).eta(120.0),
        };
        let bytes = encode_to_bytes(&msg).unwrap();
        let text = std::str::from_utf8(&bytes).unwrap();
        assert!(text.contains("\"eta\":120.0"));
        assert!(!text.contains("distance"));
        assert_eq!(decode_from_bytes(&bytes).unwrap(), msg);
    }

    #[test]
    fn garbage_does_not_decode() {
        assert!(decode_from_bytes(b"{\"Nope\":1}").is_err());
    }

    #[tokio::test]
    async fn frames_cross_a_socket() -> anyhow::Result<()> {
        let listener =
            FeedListener::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)).await?;
        let addr = listener.local_addr()?;

        let accept = tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await?;
            let msg = conn.recv().await?;
            conn.send(&FeedMsg::Welcome {
                subscriber_id: SubscriberId(9),
            })
            .await?;
            Ok::<_, anyhow::Error>(msg)
        });

        let mut client = FeedConn::connect(addr).await?;
        client
            .send(&FeedMsg::Hello {
                protocol: PROTOCOL_VERSION,
            })
            .await?;
        let welcome = client.recv().await?;

        assert_eq!(
            accept.await??,
            FeedMsg::Hello {
                protocol: PROTOCOL_VERSION
            }
        );
        assert_eq!(
            welcome,
            FeedMsg::Welcome {
                subscriber_id: SubscriberId(9)
            }
        );
        Ok(())
    }
}
