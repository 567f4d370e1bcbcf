//! In-process transport: records everything the session sends instead of
//! putting it on the wire. Backs the CLI and the tests.

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicI32, AtomicU64, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;

use super::link::{VoiceChannel, VoiceConnector, VoiceLink};
use crate::common::VoiceResult;

#[derive(Default)]
pub struct LoopbackLink {
    /// Retained packets, oldest first. Bounded by `retain`.
    pub packets: Mutex<Vec<Vec<u8>>>,
    retain: usize,
    pub packets_sent: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub silences: AtomicU64,
    pub speaking: AtomicBool,
    pub speaking_calls: AtomicU64,
    pub bitrate: AtomicI32,
    pub endpoint: Mutex<String>,
    pub token: Mutex<String>,
    pub auto_reconnect_disabled: AtomicU64,
    pub transport_connects: AtomicU64,
    members: AtomicUsize,
    transport: Notify,
    killed: AtomicBool,
}

impl LoopbackLink {
    pub fn new(members: usize, retain: usize) -> Self {
        Self {
            retain,
            members: AtomicUsize::new(members),
            ..Default::default()
        }
    }

    pub fn set_member_count(&self, members: usize) {
        self.members.store(members, Ordering::Release);
    }

    /// Signal that a renegotiated transport is up.
    pub fn mark_transport_ready(&self) {
        self.transport.notify_one();
    }
}

#[async_trait]
impl VoiceLink for LoopbackLink {
    fn send_audio(&self, packet: &[u8]) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent
            .fetch_add(packet.len() as u64, Ordering::Relaxed);
        let mut packets = self.packets.lock();
        if packets.len() < self.retain {
            packets.push(packet.to_vec());
        }
    }

    fn send_silence_frame(&self) {
        self.silences.fetch_add(1, Ordering::Relaxed);
    }

    fn set_speaking(&self, speaking: bool) {
        self.speaking.store(speaking, Ordering::Release);
        self.speaking_calls.fetch_add(1, Ordering::Relaxed);
    }

    fn set_bitrate(&self, bps: i32) {
        self.bitrate.store(bps, Ordering::Relaxed);
    }

    fn set_endpoint(&self, endpoint: &str) {
        *self.endpoint.lock() = endpoint.to_string();
    }

    fn set_token(&self, token: &str) {
        *self.token.lock() = token.to_string();
    }

    fn disable_auto_reconnect(&self) {
        self.auto_reconnect_disabled.fetch_add(1, Ordering::Relaxed);
    }

    async fn transport_ready(&self) {
        self.transport.notified().await;
    }

    fn connect_transport(&self) {
        self.transport_connects.fetch_add(1, Ordering::Relaxed);
    }

    fn member_count(&self) -> usize {
        self.members.load(Ordering::Acquire)
    }

    fn kill(&self) {
        self.killed.store(true, Ordering::Release);
    }

    fn is_killed(&self) -> bool {
        self.killed.load(Ordering::Acquire)
    }
}

/// Hands out [`LoopbackLink`]s and keeps them reachable for inspection.
pub struct LoopbackConnector {
    members: usize,
    retain: usize,
    refuse: AtomicBool,
    links: Mutex<Vec<Arc<LoopbackLink>>>,
}

impl LoopbackConnector {
    /// `retain` caps how many packets each link keeps in memory.
    pub fn new(retain: usize) -> Self {
        Self {
            members: 2,
            retain,
            refuse: AtomicBool::new(false),
            links: Mutex::new(Vec::new()),
        }
    }

    /// Make subsequent joins fail the way a dead gateway does.
    pub fn refuse_joins(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::Release);
    }

    pub fn last_link(&self) -> Option<Arc<LoopbackLink>> {
        self.links.lock().last().cloned()
    }

    pub fn link_count(&self) -> usize {
        self.links.lock().len()
    }
}

impl Default for LoopbackConnector {
    fn default() -> Self {
        Self::new(usize::MAX)
    }
}

#[async_trait]
impl VoiceConnector for LoopbackConnector {
    async fn join(&self, channel: &VoiceChannel) -> VoiceResult<Option<Arc<dyn VoiceLink>>> {
        if self.refuse.load(Ordering::Acquire) {
            debug!("[{}] loopback join refused", channel.guild_id);
            return Ok(None);
        }
        let link = Arc::new(LoopbackLink::new(self.members, self.retain));
        self.links.lock().push(link.clone());
        debug!(
            "[{}] loopback link opened for channel {}",
            channel.guild_id, channel.channel_id
        );
        Ok(Some(link))
    }
}
