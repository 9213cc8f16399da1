//! Per-connection actor
//!
//! Each connection runs three tasks. The read pump decodes frames into the
//! inbox, the dispatch loop feeds the inbox through the current protocol state,
//! and the write pump drains the bounded outbound queue onto the transport.
//! Whichever pump fails first closes the connection; closing happens once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn, Instrument, Span};

use crate::game::constants::net::MAX_CONSECUTIVE_DECODE_ERRORS;
use crate::metrics::Metrics;
use crate::net::framing::{read_message, write_message, FramingError};
use crate::net::hub::{HubError, HubHandle};
use crate::net::protocol::{decode, encode, Msg, Packet};
use crate::states::{self, connected::Connected, ClientState};

/// Receiving halves handed to the connection's tasks
pub struct ClientChannels {
    pub outbound: mpsc::Receiver<Packet>,
    pub inbox: mpsc::UnboundedReceiver<Packet>,
    pub shutdown: watch::Receiver<bool>,
}

/// Shared handle to one connection
///
/// Held by the hub's client registry, by every task of the connection, and by
/// whatever protocol state is active.
pub struct ClientHandle {
    id: OnceLock<u64>,
    hub: HubHandle,
    /// Taken on close, which ends the write pump once the queue drains
    outbound: Mutex<Option<mpsc::Sender<Packet>>>,
    inbox: mpsc::UnboundedSender<Packet>,
    shutdown: watch::Sender<bool>,
    closed: AtomicBool,
    span: Span,
}

impl ClientHandle {
    pub fn new(hub: HubHandle) -> (Arc<Self>, ClientChannels) {
        let (outbound_tx, outbound_rx) = mpsc::channel(hub.config().outbound_queue_capacity);
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let client = Arc::new(Self {
            id: OnceLock::new(),
            hub,
            outbound: Mutex::new(Some(outbound_tx)),
            inbox: inbox_tx,
            shutdown: shutdown_tx,
            closed: AtomicBool::new(false),
            span: tracing::info_span!("client", id = tracing::field::Empty),
        });

        let channels = ClientChannels {
            outbound: outbound_rx,
            inbox: inbox_rx,
            shutdown: shutdown_rx,
        };

        (client, channels)
    }

    /// Connection id, or 0 before registration
    pub fn id(&self) -> u64 {
        self.id.get().copied().unwrap_or(0)
    }

    /// Record the id assigned by the hub
    pub(crate) fn initialize(&self, id: u64) {
        if self.id.set(id).is_err() {
            warn!("Client already initialized, ignoring id {}", id);
            return;
        }
        self.span.record("id", id);
    }

    pub fn hub(&self) -> &HubHandle {
        &self.hub
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Queue a message from this connection to its own client
    pub fn socket_send(&self, msg: Msg) {
        self.socket_send_as(msg, self.id());
    }

    /// Queue a message to this connection's client, tagged with `sender_id`
    ///
    /// Never waits: a full queue drops the message.
    pub fn socket_send_as(&self, msg: Msg, sender_id: u64) {
        let guard = self.outbound.lock();
        let Some(outbound) = guard.as_ref() else {
            return;
        };

        match outbound.try_send(Packet::new(sender_id, msg)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(packet)) => {
                Metrics::incr(&self.hub.metrics().messages_dropped);
                warn!(
                    parent: &self.span,
                    "Outbound queue full, dropping {} from {}",
                    packet.msg.kind(),
                    sender_id
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }

    /// Hand a packet to this connection's protocol state
    pub fn process_message(&self, packet: Packet) {
        if self.is_closed() {
            return;
        }
        let _ = self.inbox.send(packet);
    }

    /// Ask the hub to deliver `msg` to every other connection
    pub fn broadcast(&self, msg: Msg) {
        self.hub.broadcast(Packet::new(self.id(), msg));
    }

    /// Deliver `msg` to a single peer's protocol state; false if no such peer
    pub fn pass_to_peer(&self, msg: Msg, peer_id: u64) -> bool {
        match self.hub.clients().get(peer_id) {
            Some(peer) => {
                peer.process_message(Packet::new(self.id(), msg));
                true
            }
            None => {
                debug!(parent: &self.span, "Peer {} not found, dropping {}", peer_id, msg.kind());
                false
            }
        }
    }

    /// Tear the connection down; later calls do nothing
    pub fn close(&self, reason: &str) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        info!(parent: &self.span, "Closing connection: {}", reason);
        let _ = self.shutdown.send(true);
        self.outbound.lock().take();

        if let Some(id) = self.id.get() {
            self.hub.unregister(*id);
        }
    }
}

/// Run one connection over a reader/writer pair until it closes
///
/// Registers with the hub first, so the id is known before any frame is read.
pub async fn serve<R, W>(hub: HubHandle, reader: R, writer: W) -> Result<u64, HubError>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (client, channels) = ClientHandle::new(hub.clone());
    let id = hub.register(client.clone()).await?;
    let span = client.span().clone();

    tokio::spawn(write_pump(client.clone(), writer, channels.outbound).instrument(span.clone()));
    tokio::spawn(read_pump(client.clone(), reader, channels.shutdown.clone()).instrument(span.clone()));

    dispatch(client, Box::new(Connected), channels.inbox, channels.shutdown)
        .instrument(span)
        .await;

    Ok(id)
}

/// Feed inbound packets through the protocol state, in arrival order
pub async fn dispatch(
    client: Arc<ClientHandle>,
    initial: Box<dyn ClientState>,
    mut inbox: mpsc::UnboundedReceiver<Packet>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut state = initial;
    debug!("Entering {}", state.name());
    state.on_enter(&client);

    loop {
        let packet = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            packet = inbox.recv() => match packet {
                Some(packet) => packet,
                None => break,
            },
        };

        if let Some(next) = state.handle_message(&client, packet.sender_id, packet.msg) {
            state = states::transition(&client, state, next);
        }
    }

    debug!("Leaving {}", state.name());
    state.on_exit(&client);
}

async fn read_pump<R>(client: Arc<ClientHandle>, mut reader: R, mut shutdown: watch::Receiver<bool>)
where
    R: AsyncRead + Unpin,
{
    let metrics = client.hub().metrics().clone();
    let mut decode_errors = 0u32;

    let reason = loop {
        let frame = tokio::select! {
            _ = shutdown.changed() => break "shutdown".to_string(),
            frame = read_message(&mut reader) => frame,
        };

        let bytes = match frame {
            Ok(bytes) => bytes,
            Err(FramingError::ConnectionClosed) => break "client disconnected".to_string(),
            Err(e) => break format!("read failed: {}", e),
        };

        match decode::<Packet>(&bytes) {
            Ok(mut packet) => {
                decode_errors = 0;
                if packet.sender_id == 0 {
                    packet.sender_id = client.id();
                }
                Metrics::incr(&metrics.messages_received);
                client.process_message(packet);
            }
            Err(e) => {
                decode_errors += 1;
                warn!("Dropping malformed frame: {}", e);
                if decode_errors >= MAX_CONSECUTIVE_DECODE_ERRORS {
                    break "too many malformed frames".to_string();
                }
            }
        }
    };

    client.close(&reason);
}

async fn write_pump<W>(client: Arc<ClientHandle>, mut writer: W, mut queue: mpsc::Receiver<Packet>)
where
    W: AsyncWrite + Unpin,
{
    let metrics = client.hub().metrics().clone();

    while let Some(packet) = queue.recv().await {
        let bytes = match encode(&packet) {
            Ok(bytes) => bytes,
            Err(e) => {
                client.close(&format!("encode failed: {}", e));
                break;
            }
        };

        if let Err(e) = write_message(&mut writer, &bytes).await {
            client.close(&format!("write failed: {}", e));
            break;
        }
        Metrics::incr(&metrics.messages_sent);
    }

    client.close("outbound queue closed");
    if let Err(e) = writer.shutdown().await {
        debug!("Transport shutdown failed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use tokio::io::DuplexStream;
    use tokio::time::timeout;

    use crate::net::hub::test_hub;

    async fn send_packet(stream: &mut DuplexStream, packet: &Packet) {
        write_message(stream, &encode(packet).unwrap()).await.unwrap();
    }

    async fn recv_packet(stream: &mut DuplexStream) -> Packet {
        let bytes = timeout(Duration::from_secs(1), read_message(stream))
            .await
            .expect("timed out waiting for frame")
            .unwrap();
        decode(&bytes).unwrap()
    }

    /// Connect a client over an in-memory duplex; returns the far end
    fn connect(hub: &HubHandle) -> DuplexStream {
        let (near, far) = tokio::io::duplex(64 * 1024);
        let (reader, writer) = tokio::io::split(near);
        tokio::spawn(serve(hub.clone(), reader, writer));
        far
    }

    #[tokio::test]
    async fn test_outbound_overflow_drops() {
        let hub = test_hub();
        let capacity = hub.config().outbound_queue_capacity;
        let (client, mut channels) = ClientHandle::new(hub.clone());

        for i in 0..capacity {
            client.socket_send(Msg::Chat { text: i.to_string() });
        }
        client.socket_send(Msg::Chat { text: "overflow".to_string() });

        assert_eq!(hub.metrics().messages_dropped.load(Ordering::Relaxed), 1);
        assert!(!client.is_closed());

        let mut received = 0;
        while let Ok(packet) = channels.outbound.try_recv() {
            assert_ne!(packet.msg, Msg::Chat { text: "overflow".to_string() });
            received += 1;
        }
        assert_eq!(received, capacity);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let hub = test_hub();
        let (client, mut channels) = ClientHandle::new(hub);

        client.close("first");
        client.close("second");

        assert!(client.is_closed());
        assert!(*channels.shutdown.borrow_and_update());
        assert!(channels.outbound.recv().await.is_none());

        client.socket_send(Msg::Chat { text: "late".to_string() });
        client.process_message(Packet::new(1, Msg::Chat { text: "late".to_string() }));
        assert!(channels.inbox.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_connect_receives_id() {
        let hub = test_hub();
        let mut a = connect(&hub);
        let mut b = connect(&hub);

        let first = recv_packet(&mut a).await;
        let second = recv_packet(&mut b).await;

        let (Msg::Id { id: id_a }, Msg::Id { id: id_b }) = (first.msg, second.msg) else {
            panic!("expected Id messages");
        };
        assert_eq!(first.sender_id, id_a);
        assert_ne!(id_a, id_b);
    }

    #[tokio::test]
    async fn test_zero_sender_defaults_to_own_id() {
        let hub = test_hub();
        let mut a = connect(&hub);
        let mut b = connect(&hub);

        let Msg::Id { id: id_a } = recv_packet(&mut a).await.msg else {
            panic!("expected Id");
        };
        let _ = recv_packet(&mut b).await;

        let chat = Msg::Chat { text: "hi".to_string() };
        send_packet(&mut a, &Packet::new(0, chat.clone())).await;

        let relayed = recv_packet(&mut b).await;
        assert_eq!(relayed, Packet::new(id_a, chat));
    }

    #[tokio::test]
    async fn test_join_spawns_player() {
        let hub = test_hub();
        let mut a = connect(&hub);
        let Msg::Id { id } = recv_packet(&mut a).await.msg else {
            panic!("expected Id");
        };

        let join = Msg::Join {
            user_id: "u1".to_string(),
            name: "alice".to_string(),
        };
        send_packet(&mut a, &Packet::new(0, join)).await;

        match recv_packet(&mut a).await.msg {
            Msg::Player(player) => {
                assert_eq!(player.id, id);
                assert_eq!(player.name, "alice");
            }
            other => panic!("expected Player, got {:?}", other),
        }
        assert!(hub.world().players.contains(id));

        // Leaving the connection removes the player
        drop(a);
        timeout(Duration::from_secs(1), async {
            while hub.world().players.contains(id) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("player was not removed");
    }

    #[tokio::test]
    async fn test_disconnect_unregisters() {
        let hub = test_hub();
        let mut a = connect(&hub);
        let _ = recv_packet(&mut a).await;
        assert_eq!(hub.clients().len(), 1);

        drop(a);

        timeout(Duration::from_secs(1), async {
            while !hub.clients().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("client was not unregistered");
        assert_eq!(hub.metrics().connections_active.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_malformed_frames_close_connection() {
        let hub = test_hub();
        let mut a = connect(&hub);
        let _ = recv_packet(&mut a).await;

        for _ in 0..MAX_CONSECUTIVE_DECODE_ERRORS {
            write_message(&mut a, &[0xff; 3]).await.unwrap();
        }

        let closed = timeout(Duration::from_secs(1), read_message(&mut a)).await.unwrap();
        assert!(matches!(closed, Err(FramingError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_pass_to_peer() {
        let hub = test_hub();
        let (a, _a_channels) = ClientHandle::new(hub.clone());
        let (b, mut b_channels) = ClientHandle::new(hub.clone());
        let id_a = hub.register(a.clone()).await.unwrap();
        let id_b = hub.register(b.clone()).await.unwrap();

        assert!(a.pass_to_peer(Msg::Chat { text: "psst".to_string() }, id_b));
        let packet = b_channels.inbox.recv().await.unwrap();
        assert_eq!(packet.sender_id, id_a);

        assert!(!a.pass_to_peer(Msg::Chat { text: "nobody".to_string() }, 999));
    }
}
