use std::sync::Arc;
use anyhow::{Context as _, Result};
use tokio::sync::{broadcast, mpsc};
use tokio::time;
use tokio_util::bytes::BytesMut;
use tokio_util::codec::Encoder as _;
use tracing::{debug, info, warn};

use crate::codec::MessageCodec;
use crate::message::{JoinPayload, Message, MessagePayload, UpdatePayload};

pub use crate::config::{GossipmeshConfig, GossipmeshConfigBuilder};
pub use crate::endpoint::Endpoint;
pub use crate::event::{ClusterEvent, ClusterEventHandler, MemoryEventLog};
pub use crate::members::{MemberRecord, MemberStatus, Membership};
pub use crate::message::{MessageType, RemoteRecord};
pub use crate::state::NodePhase;
pub use crate::transport::{SimNetwork, Transport};

mod codec;
pub mod config;
mod endpoint;
mod event;
mod members;
mod message;
mod state;
mod transport;

// # Heartbeat-Gossip Membership Protocol

/// This crate implements a gossip-based group membership protocol. Each
/// node owns a local view of who else is alive and disseminates it by
/// periodic randomized peer exchange, with no central coordinator after
/// bootstrap. The implementation is split into a few pieces:
///
/// * Gossipmesh: the protocol state machine. It drives bootstrap, drains
/// the node's inbound queue once per scheduler tick, runs a gossip round,
/// and expires members that have gone silent.
///
/// * Membership: the local membership table, mutated through a single
/// `merge` entry point that compares incoming heartbeats against existing
/// rows and applies only strictly newer information.
///
/// * Transport: the messaging seam. Nodes only ever exchange full-table
/// UPDATE snapshots and the initial JOIN_REQUEST / JOIN_REPLY handshake;
/// everything is fire-and-forget, there are no acks.
///
/// Protocol details: a statically designated bootstrap endpoint acts as
/// the rendezvous coordinator. It boots the group by joining itself, and
/// admits every other node that sends it a JOIN_REQUEST. Once joined, a
/// node increments its own heartbeat each round and pushes its whole
/// table to a small random subset of peers (push gossip, fixed fan-out).
/// A member whose heartbeat stops advancing is marked suspect after the
/// fail timeout and dropped after the remove timeout on top of it; a
/// fresh heartbeat seen before removal refutes the suspicion. Time here
/// is logical: everything is measured in scheduler ticks, never in wall
/// clock, since nodes' clocks are not assumed synchronized.

pub struct Gossipmesh {
    /// Configuration settings for this node
    config: GossipmeshConfig,

    /// Lifecycle phase of the protocol state machine
    phase: NodePhase,

    /// Local view of all known members and their liveness
    members: Membership,

    /// Communication layer for sending messages
    transport: Arc<dyn Transport>,

    /// Exclusive FIFO delivery queue for this node
    inbox: mpsc::UnboundedReceiver<Vec<u8>>,

    /// Optional handler notified of membership changes
    event_handler: Option<Arc<dyn ClusterEventHandler>>,

    /// Channel sender for initiating shutdown of a self-driven node
    shutdown: broadcast::Sender<()>,

    /// Logical clock for the self-driven tick loop
    ticks: u64,

    /// Gossip rounds completed, used for the expiry cadence
    rounds: u64,
}

impl Gossipmesh {
    /// Creates a node with no event handler attached.
    pub fn new(
        config: GossipmeshConfig,
        transport: Arc<dyn Transport>,
        inbox: mpsc::UnboundedReceiver<Vec<u8>>,
    ) -> Self {
        Self::with_custom(config, transport, inbox, None)
    }

    /// Creates a node that reports membership changes to the given handler.
    pub fn with_event_handler(
        config: GossipmeshConfig,
        transport: Arc<dyn Transport>,
        inbox: mpsc::UnboundedReceiver<Vec<u8>>,
        event_handler: Arc<dyn ClusterEventHandler>,
    ) -> Self {
        Self::with_custom(config, transport, inbox, Some(event_handler))
    }

    fn with_custom(
        config: GossipmeshConfig,
        transport: Arc<dyn Transport>,
        inbox: mpsc::UnboundedReceiver<Vec<u8>>,
        event_handler: Option<Arc<dyn ClusterEventHandler>>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        let mut members = Membership::new();
        members.clear();

        debug!(endpoint = %config.endpoint(), "node initialized");
        Self {
            config,
            phase: NodePhase::Initialized,
            members,
            transport,
            inbox,
            event_handler,
            shutdown: shutdown_tx,
            ticks: 0,
            rounds: 0,
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        self.config.endpoint()
    }

    pub fn phase(&self) -> NodePhase {
        self.phase
    }

    pub fn members(&self) -> &Membership {
        &self.members
    }

    /// Sender half of the shutdown channel; sending on it stops a node
    /// driven by [`Gossipmesh::start`].
    pub fn shutdown_signal(&self) -> broadcast::Sender<()> {
        self.shutdown.clone()
    }

    /// Introduces this node to the group.
    ///
    /// The coordinator (the node whose endpoint equals the bootstrap
    /// endpoint) boots the group by inserting itself and moving straight
    /// to `Joined`, without sending anything. Every other node sends a
    /// JOIN_REQUEST to the bootstrap endpoint and waits for the reply.
    /// A failed join send is fatal: the node cannot start.
    pub async fn join(&mut self, now: u64) -> Result<()> {
        if self.phase != NodePhase::Initialized {
            anyhow::bail!("join called in phase {}", self.phase);
        }

        if self.config.is_coordinator() {
            info!(endpoint = %self.config.endpoint(), "starting up group");
            self.members.insert_self(self.config.endpoint(), now);
            self.phase = NodePhase::Joined;
            return Ok(());
        }

        info!(
            endpoint = %self.config.endpoint(),
            bootstrap = %self.config.bootstrap(),
            "trying to join group"
        );
        self.send(self.config.bootstrap(), Message::join_request(self.config.endpoint(), 0))
            .await
            .context("unable to introduce self to group")?;
        self.phase = NodePhase::AwaitingJoinReply;
        Ok(())
    }

    /// One scheduler tick: drain the inbound queue in arrival order, then,
    /// if joined, run a gossip round and (on its cadence) failure expiry.
    ///
    /// `now` is the scheduler's logical timestamp and must be
    /// monotonically non-decreasing across calls.
    pub async fn handle_tick(&mut self, now: u64) -> Result<()> {
        if !self.phase.is_live() {
            return Ok(());
        }

        while let Ok(data) = self.inbox.try_recv() {
            self.dispatch(&data, now).await;
        }

        if !self.phase.is_joined() {
            return Ok(());
        }

        self.gossip_round(now).await;

        self.rounds += 1;
        if self.rounds % self.config.expiry_cadence == 0 {
            self.run_expiry(now).await;
        }

        Ok(())
    }

    /// Marks this node as crashed. Terminal: the node never processes or
    /// sends anything again, and peers will expire it once its heartbeat
    /// stops spreading.
    pub fn fail(&mut self) {
        warn!(endpoint = %self.config.endpoint(), "node failed");
        self.phase = NodePhase::Failed;
    }

    /// Drives the node end to end: bootstrap, then one tick per
    /// configured interval until the shutdown signal fires.
    pub async fn start(&mut self) -> Result<()> {
        info!(endpoint = %self.config.endpoint(), "node started");
        let mut shutdown_rx = self.shutdown.subscribe();

        self.join(self.ticks).await?;

        let mut interval = time::interval(self.config.gossip_interval());
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.ticks += 1;
                    let now = self.ticks;
                    self.handle_tick(now).await?;
                }
                _ = shutdown_rx.recv() => {
                    info!(endpoint = %self.config.endpoint(), "initiating graceful shutdown");
                    break;
                }
            }
        }

        self.graceful_shutdown();
        Ok(())
    }

    /// Discards whatever is still queued; none of it will be processed.
    fn graceful_shutdown(&mut self) {
        while self.inbox.try_recv().is_ok() {}
        self.inbox.close();
        info!(endpoint = %self.config.endpoint(), "shut down");
    }

    async fn dispatch(&mut self, data: &[u8], now: u64) {
        // malformed messages are dropped, not surfaced
        let message = match Message::from_bytes(data) {
            Ok(message) => message,
            Err(_) => return,
        };

        match message.payload {
            MessagePayload::JoinRequest(join) => self.handle_join_request(join, now).await,
            MessagePayload::JoinReply(join) => self.handle_join_reply(join, now),
            MessagePayload::Update(update) => self.handle_update(update, now).await,
        }
    }

    /// Coordinator-only: admit the requester. Non-coordinators that
    /// somehow receive one ignore it.
    async fn handle_join_request(&mut self, join: JoinPayload, now: u64) {
        if !self.config.is_coordinator() {
            return;
        }

        info!(from = %join.sender, "got join request");
        let heartbeat = self.members.self_record().map(|own| own.heartbeat).unwrap_or(0);
        if let Err(error) = self
            .send(join.sender, Message::join_reply(self.config.endpoint(), heartbeat))
            .await
        {
            warn!(to = %join.sender, %error, "failed to send join reply");
        }

        // admitted with a fresh heartbeat, whatever the request carried
        if self.members.insert(join.sender, 0, now) {
            self.emit_join(join.sender).await;
        }
    }

    /// Only meaningful while a join request is in flight; the coordinator
    /// never sends one, so it never acts on one either.
    fn handle_join_reply(&mut self, join: JoinPayload, now: u64) {
        if !self.phase.is_awaiting_join_reply() {
            return;
        }

        info!(endpoint = %self.config.endpoint(), coordinator = %join.sender, "joined group");
        self.members.insert_self(self.config.endpoint(), now);
        self.phase = NodePhase::Joined;
    }

    async fn handle_update(&mut self, update: UpdatePayload, now: u64) {
        if !self.phase.is_joined() {
            return;
        }

        let added = self.members.merge(&update.records, now);
        for member in added {
            self.emit_join(member).await;
        }
    }

    /// One push-gossip round: advance our own heartbeat, then send the
    /// entire table to a random fan-out of peers.
    async fn gossip_round(&mut self, now: u64) {
        if self.members.len() <= 1 {
            return;
        }

        let fanout = self.config.gossip_fanout().min(self.members.len() - 1);
        self.members.tick_self(now);

        let targets: Vec<Endpoint> = self
            .members
            .sample_fanout(fanout)
            .into_iter()
            .filter_map(|index| self.members.record_at(index))
            .map(|record| record.endpoint)
            .collect();

        let snapshot = self.members.snapshot();
        for target in targets {
            debug!(from = %self.config.endpoint(), to = %target, "pushing membership update");
            if let Err(error) = self.send(target, Message::update(snapshot.clone())).await {
                warn!(to = %target, %error, "failed to push membership update");
            }
        }
    }

    async fn run_expiry(&mut self, now: u64) {
        let removed =
            self.members
                .expire(now, self.config.fail_timeout, self.config.remove_timeout);
        for member in removed {
            info!(observer = %self.config.endpoint(), %member, "removed failed member");
            self.emit_remove(member).await;
        }
    }

    async fn emit_join(&self, member: Endpoint) {
        info!(observer = %self.config.endpoint(), %member, "member added");
        if let Some(handler) = &self.event_handler {
            if let Err(error) = handler.notify_join(self.config.endpoint(), member).await {
                warn!(%member, %error, "join notification failed");
            }
        }
    }

    async fn emit_remove(&self, member: Endpoint) {
        if let Some(handler) = &self.event_handler {
            if let Err(error) = handler.notify_remove(self.config.endpoint(), member).await {
                warn!(%member, %error, "remove notification failed");
            }
        }
    }

    async fn send(&self, target: Endpoint, message: Message) -> Result<()> {
        let mut codec = MessageCodec::new();
        let mut buffer = BytesMut::new();
        codec.encode(message, &mut buffer)?;
        self.transport
            .send_to(self.config.endpoint(), target, &buffer)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::time::Duration;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env(),
            )
            .try_init();
    }

    fn endpoint(id: u32) -> Endpoint {
        Endpoint::new(id, 0)
    }

    fn test_config(id: u32) -> GossipmeshConfig {
        GossipmeshConfigBuilder::new()
            .endpoint((id, 0))
            .fail_timeout(5)
            .remove_timeout(10)
            .build()
            .unwrap()
    }

    fn build_node(
        network: &SimNetwork,
        id: u32,
        log: Arc<MemoryEventLog>,
    ) -> Result<Gossipmesh> {
        let inbox = network.register(endpoint(id))?;
        Ok(Gossipmesh::with_event_handler(
            test_config(id),
            Arc::new(network.clone()),
            inbox,
            log,
        ))
    }

    fn encode(message: Message) -> Vec<u8> {
        let mut codec = MessageCodec::new();
        let mut buffer = BytesMut::new();
        codec.encode(message, &mut buffer).unwrap();
        buffer.to_vec()
    }

    async fn inject(network: &SimNetwork, from: u32, to: u32, message: Message) {
        network
            .send_to(endpoint(from), endpoint(to), &encode(message))
            .await
            .unwrap();
    }

    struct UnreachableTransport;

    #[async_trait]
    impl Transport for UnreachableTransport {
        async fn send_to(&self, _src: Endpoint, _dst: Endpoint, _data: &[u8]) -> Result<()> {
            Err(anyhow!("network unreachable"))
        }
    }

    #[tokio::test]
    async fn test_coordinator_boots_group_alone() -> Result<()> {
        init_tracing();
        let network = SimNetwork::new();
        let log = MemoryEventLog::new();
        let mut coordinator = build_node(&network, 1, log)?;

        coordinator.join(0).await?;

        assert_eq!(coordinator.phase(), NodePhase::Joined);
        assert_eq!(coordinator.members().len(), 1);
        let own = coordinator.members().self_record().unwrap();
        assert_eq!(own.endpoint, endpoint(1));
        assert_eq!(own.heartbeat, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_join_handshake() -> Result<()> {
        init_tracing();
        let network = SimNetwork::new();
        let log = MemoryEventLog::new();
        let mut coordinator = build_node(&network, 1, log.clone())?;
        let mut joiner = build_node(&network, 2, log.clone())?;

        coordinator.join(0).await?;
        joiner.join(0).await?;
        assert_eq!(joiner.phase(), NodePhase::AwaitingJoinReply);

        // coordinator admits the joiner and replies
        coordinator.handle_tick(1).await?;
        assert_eq!(coordinator.members().len(), 2);
        assert_eq!(coordinator.members().get(endpoint(2)).unwrap().heartbeat, 0);
        assert!(log.events().contains(&ClusterEvent::MemberAdded {
            observer: endpoint(1),
            member: endpoint(2),
        }));

        // joiner consumes the reply (and the coordinator's first gossip
        // push, queued right behind it); its own record stays record 0
        joiner.handle_tick(1).await?;
        assert_eq!(joiner.phase(), NodePhase::Joined);
        assert_eq!(joiner.members().self_record().unwrap().endpoint, endpoint(2));
        assert!(joiner.members().contains(endpoint(1)));
        Ok(())
    }

    #[tokio::test]
    async fn test_join_reply_alone_brings_only_self() -> Result<()> {
        init_tracing();
        let network = SimNetwork::new();
        let log = MemoryEventLog::new();
        let mut joiner = build_node(&network, 2, log)?;
        joiner.join(0).await?;

        inject(&network, 1, 2, Message::join_reply(endpoint(1), 0)).await;
        joiner.handle_tick(1).await?;

        assert_eq!(joiner.phase(), NodePhase::Joined);
        assert_eq!(joiner.members().len(), 1);
        let own = joiner.members().self_record().unwrap();
        assert_eq!(own.endpoint, endpoint(2));
        assert_eq!(own.heartbeat, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_update_is_stamped_with_local_time() -> Result<()> {
        init_tracing();
        let network = SimNetwork::new();
        let log = MemoryEventLog::new();
        let mut coordinator = build_node(&network, 1, log)?;
        coordinator.join(0).await?;

        let peer = RemoteRecord {
            endpoint: endpoint(7),
            heartbeat: 5,
            timestamp: 999,
        };
        inject(&network, 7, 1, Message::update(vec![peer])).await;
        coordinator.handle_tick(10).await?;

        let record = coordinator.members().get(endpoint(7)).unwrap();
        assert_eq!(record.heartbeat, 5);
        assert_eq!(record.last_update, 10);

        // a strictly newer heartbeat re-stamps with the new local time
        let newer = RemoteRecord {
            endpoint: endpoint(7),
            heartbeat: 7,
            timestamp: 1,
        };
        inject(&network, 7, 1, Message::update(vec![newer])).await;
        coordinator.handle_tick(20).await?;

        let record = coordinator.members().get(endpoint(7)).unwrap();
        assert_eq!(record.heartbeat, 7);
        assert_eq!(record.last_update, 20);
        Ok(())
    }

    #[tokio::test]
    async fn test_expiry_removes_and_notifies() -> Result<()> {
        init_tracing();
        let network = SimNetwork::new();
        let log = MemoryEventLog::new();
        let mut coordinator = build_node(&network, 1, log.clone())?;
        coordinator.join(0).await?;

        let peer = RemoteRecord {
            endpoint: endpoint(2),
            heartbeat: 3,
            timestamp: 0,
        };
        inject(&network, 2, 1, Message::update(vec![peer])).await;
        coordinator.handle_tick(0).await?;
        assert_eq!(coordinator.members().len(), 2);

        // fail=5, remove=10: long silent, removed on the next expiry pass
        coordinator.handle_tick(100).await?;
        assert_eq!(coordinator.members().len(), 1);
        assert!(!coordinator.members().contains(endpoint(2)));
        assert!(log.events().contains(&ClusterEvent::MemberRemoved {
            observer: endpoint(1),
            member: endpoint(2),
        }));
        Ok(())
    }

    #[tokio::test]
    async fn test_gossip_round_fanout() -> Result<()> {
        init_tracing();
        let network = SimNetwork::new();
        let log = MemoryEventLog::new();
        let mut coordinator = build_node(&network, 1, log)?;
        let mut peer_inboxes = Vec::new();
        for id in 2..=4 {
            peer_inboxes.push((id, network.register(endpoint(id))?));
        }

        coordinator.join(0).await?;
        let records = (2..=4)
            .map(|id| RemoteRecord {
                endpoint: endpoint(id),
                heartbeat: 1,
                timestamp: 0,
            })
            .collect();
        inject(&network, 2, 1, Message::update(records)).await;

        coordinator.handle_tick(1).await?;
        assert_eq!(coordinator.members().len(), 4);
        // one round advances the local liveness signal by exactly one
        assert_eq!(coordinator.members().self_record().unwrap().heartbeat, 1);

        // exactly fan-out peers got one full-table snapshot each
        let mut receivers = 0;
        for (_, inbox) in peer_inboxes.iter_mut() {
            if let Ok(data) = inbox.try_recv() {
                receivers += 1;
                let message = Message::from_bytes(&data)?;
                match message.payload {
                    MessagePayload::Update(update) => {
                        assert_eq!(update.records.len(), 4)
                    }
                    other => panic!("expected UPDATE, got {:?}", other),
                }
                assert!(inbox.try_recv().is_err(), "peer got more than one message");
            }
        }
        assert_eq!(receivers, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_gossip_noop_when_alone() -> Result<()> {
        let network = SimNetwork::new();
        let log = MemoryEventLog::new();
        let mut coordinator = build_node(&network, 1, log)?;
        coordinator.join(0).await?;

        coordinator.handle_tick(1).await?;
        // nothing but self known: heartbeat must not advance
        assert_eq!(coordinator.members().self_record().unwrap().heartbeat, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_non_coordinator_ignores_join_request() -> Result<()> {
        init_tracing();
        let network = SimNetwork::new();
        let log = MemoryEventLog::new();
        let mut coordinator = build_node(&network, 1, log.clone())?;
        let mut joiner = build_node(&network, 2, log.clone())?;
        let mut stray_inbox = network.register(endpoint(3))?;

        coordinator.join(0).await?;
        joiner.join(0).await?;
        coordinator.handle_tick(1).await?;
        joiner.handle_tick(1).await?;
        assert_eq!(joiner.phase(), NodePhase::Joined);

        inject(&network, 3, 2, Message::join_request(endpoint(3), 0)).await;
        joiner.handle_tick(2).await?;

        assert!(!joiner.members().contains(endpoint(3)));
        assert!(stray_inbox.try_recv().is_err(), "non-coordinator replied");
        Ok(())
    }

    #[tokio::test]
    async fn test_join_reply_ignored_when_not_awaiting() -> Result<()> {
        init_tracing();
        let network = SimNetwork::new();
        let log = MemoryEventLog::new();
        let mut coordinator = build_node(&network, 1, log)?;
        coordinator.join(0).await?;

        inject(&network, 2, 1, Message::join_reply(endpoint(2), 9)).await;
        coordinator.handle_tick(1).await?;

        assert_eq!(coordinator.members().len(), 1);
        assert_eq!(coordinator.members().self_record().unwrap().endpoint, endpoint(1));
        Ok(())
    }

    #[tokio::test]
    async fn test_update_ignored_before_joined() -> Result<()> {
        init_tracing();
        let network = SimNetwork::new();
        let log = MemoryEventLog::new();
        let mut joiner = build_node(&network, 2, log)?;
        joiner.join(0).await?;
        assert_eq!(joiner.phase(), NodePhase::AwaitingJoinReply);

        let peer = RemoteRecord {
            endpoint: endpoint(3),
            heartbeat: 1,
            timestamp: 0,
        };
        inject(&network, 3, 2, Message::update(vec![peer])).await;
        joiner.handle_tick(1).await?;

        assert!(joiner.members().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_messages_are_dropped() -> Result<()> {
        init_tracing();
        let network = SimNetwork::new();
        let log = MemoryEventLog::new();
        let mut coordinator = build_node(&network, 1, log)?;
        coordinator.join(0).await?;

        network
            .send_to(endpoint(9), endpoint(1), &[0xff, 1, 2, 3])
            .await?;
        network.send_to(endpoint(9), endpoint(1), &[]).await?;
        // truncated join request
        network
            .send_to(endpoint(9), endpoint(1), &[MessageType::JoinRequest as u8, 0, 0])
            .await?;

        coordinator.handle_tick(1).await?;
        assert_eq!(coordinator.members().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_node_stops_processing() -> Result<()> {
        init_tracing();
        let network = SimNetwork::new();
        let log = MemoryEventLog::new();
        let mut coordinator = build_node(&network, 1, log)?;
        coordinator.join(0).await?;

        coordinator.fail();
        assert_eq!(coordinator.phase(), NodePhase::Failed);

        inject(&network, 2, 1, Message::join_request(endpoint(2), 0)).await;
        coordinator.handle_tick(1).await?;

        assert_eq!(coordinator.members().len(), 1);
        assert_eq!(coordinator.members().self_record().unwrap().heartbeat, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_join_send_failure_is_fatal() -> Result<()> {
        init_tracing();
        let (_tx, inbox) = mpsc::unbounded_channel();
        let mut joiner =
            Gossipmesh::new(test_config(2), Arc::new(UnreachableTransport), inbox);

        let result = joiner.join(0).await;
        assert!(result.is_err());
        assert_eq!(joiner.phase(), NodePhase::Initialized);
        Ok(())
    }

    #[tokio::test]
    async fn test_start_runs_until_shutdown() -> Result<()> {
        init_tracing();
        let network = SimNetwork::new();
        let config = GossipmeshConfigBuilder::new()
            .endpoint((1, 0))
            .gossip_interval(Duration::from_millis(5))
            .build()?;
        let inbox = network.register(endpoint(1))?;
        let mut coordinator = Gossipmesh::new(config, Arc::new(network.clone()), inbox);

        let shutdown = coordinator.shutdown_signal();
        let handle = tokio::spawn(async move { coordinator.start().await });

        time::sleep(Duration::from_millis(50)).await;
        shutdown.send(()).expect("node stopped early");

        handle.await??;
        Ok(())
    }

    #[tokio::test]
    async fn test_cluster_converges_and_detects_failure() -> Result<()> {
        init_tracing();
        let network = SimNetwork::new();
        let log = MemoryEventLog::new();

        let mut nodes = Vec::new();
        for id in 1..=4 {
            nodes.push(build_node(&network, id, log.clone())?);
        }
        for node in nodes.iter_mut() {
            node.join(0).await?;
        }

        for tick in 1..=20u64 {
            for node in nodes.iter_mut() {
                node.handle_tick(tick).await?;
            }
        }

        for node in nodes.iter() {
            assert_eq!(
                node.members().len(),
                4,
                "node {} did not converge",
                node.endpoint()
            );
        }

        // crash node 4: it stops being scheduled and stops receiving
        network.fail(endpoint(4));
        nodes[3].fail();

        for tick in 21..=60u64 {
            for node in nodes.iter_mut() {
                node.handle_tick(tick).await?;
            }
        }

        for node in nodes.iter().take(3) {
            assert!(
                !node.members().contains(endpoint(4)),
                "node {} still lists the crashed node",
                node.endpoint()
            );
            assert_eq!(node.members().len(), 3);
        }

        for observer_id in 1..=3u32 {
            assert!(
                log.events().contains(&ClusterEvent::MemberRemoved {
                    observer: endpoint(observer_id),
                    member: endpoint(4),
                }),
                "node {} never reported the removal",
                observer_id
            );
        }
        Ok(())
    }
}
