//! Packet ingestion queue
//!
//! Thread-safe FIFO bridging capture producers to the single processing
//! consumer. Shutdown is an explicit sentinel so the consumer only
//! terminates after draining everything enqueued before it.

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::capture::DecodedPacket;

/// Item delivered to the consumer.
#[derive(Clone, Debug)]
pub enum PacketEvent {
    /// A decoded packet to process.
    Packet(DecodedPacket),

    /// Shutdown sentinel; no packets follow.
    Shutdown,
}

/// Producer side; cloneable, one clone per capture thread.
#[derive(Clone, Debug)]
pub struct PacketQueue {
    tx: Sender<PacketEvent>,
}

impl PacketQueue {
    /// Append a packet.
    pub fn enqueue(&self, packet: DecodedPacket) {
        // a gone consumer just means shutdown already happened
        let _ = self.tx.send(PacketEvent::Packet(packet));
    }

    /// Enqueue the shutdown sentinel.
    pub fn close(&self) {
        let _ = self.tx.send(PacketEvent::Shutdown);
    }
}

/// Consumer side.
#[derive(Debug)]
pub struct PacketReceiver {
    rx: Receiver<PacketEvent>,
}

impl PacketReceiver {
    /// Block until the next item. A disconnected queue reads as shutdown.
    pub fn dequeue(&self) -> PacketEvent {
        self.rx.recv().unwrap_or(PacketEvent::Shutdown)
    }
}

/// Create a connected producer/consumer pair.
pub fn channel() -> (PacketQueue, PacketReceiver) {
    let (tx, rx) = unbounded();

    (PacketQueue { tx }, PacketReceiver { rx })
}
