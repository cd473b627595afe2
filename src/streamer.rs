//! UDP streaming.
//!
//! This module sends the frames produced by the receive FIFO as UDP datagrams,
//! one frame per datagram. It also implements a test packet generator that
//! sends datagrams of the same size without needing the FPGA.

use crate::{
    fifo::{self, FrameReader, FRAME_BYTES},
    regs::RegisterBus,
};
use anyhow::Result;
use bytes::{BufMut, Bytes, BytesMut};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::{net::UdpSocket, sync::mpsc};

/// Default destination port for test packets.
pub const TEST_PACKET_PORT: u16 = 25344;

/// Payload message included in test packets.
pub const TEST_MESSAGE: &[u8] = b"Hello this is Qian from Zybo";

/// Interval between test packets.
pub const TEST_PACKET_INTERVAL: Duration = Duration::from_millis(1);

const FRAME_QUEUE_DEPTH: usize = 16;

async fn bind_for(destination: &SocketAddr) -> Result<UdpSocket> {
    let local: SocketAddr = match destination {
        SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    Ok(UdpSocket::bind(local).await?)
}

async fn send_datagram(socket: &UdpSocket, destination: &SocketAddr, datagram: &[u8]) -> bool {
    match socket.send_to(datagram, destination).await {
        Ok(n) if n == datagram.len() => true,
        Ok(n) => {
            tracing::warn!("short send to {destination}: {n} of {} bytes", datagram.len());
            false
        }
        Err(err) => {
            tracing::warn!("failed to send to {destination}: {err}");
            false
        }
    }
}

/// UDP IQ streamer.
///
/// The streamer reads frames from the receive FIFO in a blocking thread, since
/// the FIFO is polled with a busy-wait, and sends them from an async task.
#[derive(Debug, Clone)]
pub struct Streamer<B> {
    bus: B,
    destination: SocketAddr,
    max_frames: Option<u64>,
}

impl<B> Streamer<B>
where
    B: RegisterBus + Send + 'static,
{
    /// Creates a new streamer that sends frames to `destination`.
    ///
    /// If `max_frames` is `None`, the streamer runs forever.
    pub fn new(bus: B, destination: SocketAddr, max_frames: Option<u64>) -> Streamer<B> {
        Streamer {
            bus,
            destination,
            max_frames,
        }
    }

    /// Runs the streamer.
    ///
    /// Failures to send a frame are logged and streaming continues. This only
    /// returns after `max_frames` frames have been sent or if the FIFO cannot
    /// be opened.
    #[tracing::instrument(name = "streamer", skip_all, fields(destination = %self.destination))]
    pub async fn run(self) -> Result<()> {
        let socket = bind_for(&self.destination).await?;
        let (sender, mut receiver) = mpsc::channel(FRAME_QUEUE_DEPTH);
        let bus = self.bus;
        let max_frames = self.max_frames;
        let reader = tokio::task::spawn_blocking(move || read_frames(&bus, max_frames, sender));

        tracing::info!("streaming UDP frames to {}", self.destination);
        let mut sent: u64 = 0;
        while let Some(frame) = receiver.recv().await {
            if send_datagram(&socket, &self.destination, &frame).await {
                sent += 1;
            }
        }
        reader.await??;
        tracing::info!(sent, "streaming finished");
        Ok(())
    }
}

fn read_frames<B: RegisterBus>(
    bus: &B,
    max_frames: Option<u64>,
    sender: mpsc::Sender<Bytes>,
) -> Result<()> {
    let mut reader = FrameReader::new(fifo::open_fifo(bus)?);
    let mut frames: u64 = 0;
    while max_frames.map_or(true, |max| frames < max) {
        // stop waiting for samples once the sending task is gone
        let Some(frame) = reader.next_frame_until(|| sender.is_closed()) else {
            break;
        };
        if sender.blocking_send(frame).is_err() {
            break;
        }
        frames += 1;
    }
    Ok(())
}

/// Builds a test packet.
///
/// The packet contains a 32-bit little-endian counter, [`TEST_MESSAGE`], and
/// is padded with ASCII `'1'` to [`FRAME_BYTES`].
pub fn test_packet(counter: u32) -> Bytes {
    let mut packet = BytesMut::with_capacity(FRAME_BYTES);
    packet.put_u32_le(counter);
    packet.put_slice(TEST_MESSAGE);
    packet.put_bytes(b'1', FRAME_BYTES - packet.len());
    packet.freeze()
}

/// Sends `count` test packets to `destination`, waiting `interval` between
/// packets.
///
/// Send errors are logged and do not stop the sequence. Returns the number of
/// packets sent successfully.
#[tracing::instrument(level = "debug")]
pub async fn send_test_packets(
    destination: SocketAddr,
    count: u32,
    interval: Duration,
) -> Result<u32> {
    let socket = bind_for(&destination).await?;
    tracing::info!("sending {count} packets to {destination}");
    let mut sent = 0;
    for counter in 0..count {
        if send_datagram(&socket, &destination, &test_packet(counter)).await {
            sent += 1;
        }
        tokio::time::sleep(interval).await;
    }
    tracing::info!("finished sending packets");
    Ok(sent)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::registers::{fifo::RDFD, fifo::RDFO, FIFO_ADDRESS};
    use crate::regs::MemoryBus;

    #[test]
    fn test_packet_layout() {
        let packet = test_packet(258);
        assert_eq!(packet.len(), 1028);
        assert_eq!(&packet[..4], &[2, 1, 0, 0]);
        assert_eq!(&packet[4..4 + TEST_MESSAGE.len()], TEST_MESSAGE);
        assert!(packet[4 + TEST_MESSAGE.len()..].iter().all(|&b| b == b'1'));
    }

    async fn local_receiver() -> (UdpSocket, SocketAddr) {
        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let addr = socket.local_addr().unwrap();
        (socket, addr)
    }

    #[tokio::test]
    async fn send_packets() {
        let (receiver, addr) = local_receiver().await;
        let sent = send_test_packets(addr, 3, Duration::ZERO).await.unwrap();
        assert_eq!(sent, 3);
        let mut buf = [0; 2048];
        for counter in 0..3u32 {
            let n = receiver.recv(&mut buf).await.unwrap();
            assert_eq!(n, FRAME_BYTES);
            assert_eq!(&buf[..4], &counter.to_le_bytes());
        }
    }

    #[tokio::test]
    async fn stream_frames() {
        let bus = MemoryBus::new();
        bus.poke(FIFO_ADDRESS, RDFO, 512);
        bus.poke(FIFO_ADDRESS, RDFD, 0x0002_0001);
        let (receiver, addr) = local_receiver().await;
        Streamer::new(bus.clone(), addr, Some(2))
            .run()
            .await
            .unwrap();
        assert_eq!(bus.open_ports(), 0);
        let mut buf = [0; 2048];
        for counter in 0..2u32 {
            let n = receiver.recv(&mut buf).await.unwrap();
            assert_eq!(n, FRAME_BYTES);
            assert_eq!(&buf[..4], &counter.to_le_bytes());
            assert_eq!(&buf[4..8], &[1, 0, 2, 0]);
            assert_eq!(&buf[n - 4..n], &[1, 0, 2, 0]);
        }
    }

    #[test]
    fn reader_stops_when_receiver_is_dropped() {
        let bus = MemoryBus::new();
        let (sender, receiver) = mpsc::channel(1);
        let reader = std::thread::spawn({
            let bus = bus.clone();
            move || read_frames(&bus, None, sender)
        });
        drop(receiver);
        reader.join().unwrap().unwrap();
        assert_eq!(bus.open_ports(), 0);
    }

    #[tokio::test]
    async fn stream_without_fifo() {
        let bus = MemoryBus::new();
        bus.fail_open(FIFO_ADDRESS, "Permission denied");
        let (_receiver, addr) = local_receiver().await;
        let err = Streamer::new(bus, addr, None).run().await.unwrap_err();
        assert!(format!("{err:#}").contains("Permission denied"));
    }
}
