//! TCP broadcast server: one-way fan-out of encoded events to every client.
//!
//! # Threads
//!
//! - `rawcast-accept` blocks in `accept()`.  A new connection is admitted if
//!   the client set is below capacity, otherwise it is closed immediately.
//! - `rawcast-client-<id>` (one per admitted client) blocks in `read()` and
//!   discards whatever arrives.  Its only job is to notice the disconnect and
//!   remove its client from the set.
//!
//! `broadcast()` runs on the caller's thread.  It encodes the event once and
//! writes the same bytes to every client while holding the client-set lock,
//! collecting failed clients and evicting them only after the pass.
//!
//! # Shutdown
//!
//! `accept()` has no portable cancellation, so [`BroadcastServer::stop`] clears
//! the running flag and connects to the listener itself.  The acceptor wakes,
//! sees the flag and exits, dropping the listening socket.  Client sockets are
//! then shut down in both directions, which unblocks every reader thread, and
//! all threads are joined before `stop()` returns.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::mem;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};
use std::thread::{self, JoinHandle};

use rawcast_core::{encode_line, protocol::DEFAULT_MAX_CLIENTS, InputEvent};
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

use crate::application::capture_loop::EventSink;

/// Size of the per-client scratch buffer for discarded inbound bytes.
const RECV_BUFFER_SIZE: usize = 4096;

const LISTEN_BACKLOG: i32 = 128;

/// Error type for broadcast server operations.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listening socket could not be created, bound or put in listen mode.
    #[error("failed to bind broadcast listener on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("broadcast server is already running")]
    AlreadyRunning,

    #[error("failed to spawn server thread: {0}")]
    Spawn(#[source] io::Error),
}

/// Listener address and client capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastSettings {
    pub bind_address: IpAddr,
    /// Hard ceiling on simultaneously connected clients.
    pub max_clients: usize,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            max_clients: DEFAULT_MAX_CLIENTS,
        }
    }
}

struct ClientSlot {
    stream: TcpStream,
    peer: SocketAddr,
}

#[derive(Default)]
struct ClientSet {
    next_id: u64,
    slots: HashMap<u64, ClientSlot>,
    readers: Vec<JoinHandle<()>>,
}

/// State shared between the server handle and its threads.
struct Shared {
    running: AtomicBool,
    max_clients: usize,
    clients: Mutex<ClientSet>,
}

struct Listening {
    local_addr: SocketAddr,
    acceptor: JoinHandle<()>,
}

/// Line-JSON broadcast server.
pub struct BroadcastServer {
    settings: BroadcastSettings,
    shared: Arc<Shared>,
    listening: Mutex<Option<Listening>>,
}

impl BroadcastServer {
    pub fn new(settings: BroadcastSettings) -> Self {
        Self {
            settings,
            shared: Arc::new(Shared {
                running: AtomicBool::new(false),
                max_clients: settings.max_clients,
                clients: Mutex::new(ClientSet::default()),
            }),
            listening: Mutex::new(None),
        }
    }

    /// Binds `bind_address:port` with `SO_REUSEADDR` and spawns the acceptor.
    /// Port 0 binds an ephemeral port; see [`local_addr`](Self::local_addr).
    ///
    /// # Errors
    ///
    /// [`ServerError::BindFailed`] when the listener cannot be set up,
    /// [`ServerError::AlreadyRunning`] when called twice without `stop()`.
    pub fn start(&self, port: u16) -> Result<(), ServerError> {
        let mut listening = lock(&self.listening);
        if listening.is_some() {
            return Err(ServerError::AlreadyRunning);
        }

        let addr = SocketAddr::new(self.settings.bind_address, port);
        let listener =
            bind_listener(addr).map_err(|source| ServerError::BindFailed { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::BindFailed { addr, source })?;

        self.shared.running.store(true, Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);
        let acceptor = thread::Builder::new()
            .name("rawcast-accept".to_string())
            .spawn(move || accept_loop(listener, shared))
            .map_err(|e| {
                self.shared.running.store(false, Ordering::SeqCst);
                ServerError::Spawn(e)
            })?;

        *listening = Some(Listening {
            local_addr,
            acceptor,
        });
        info!(
            %local_addr,
            max_clients = self.settings.max_clients,
            "broadcast server listening"
        );
        Ok(())
    }

    /// Stops accepting, disconnects every client and joins all server
    /// threads.  Idempotent.
    ///
    /// If the acceptor cannot be woken, the listener stays registered and
    /// [`is_running`](Self::is_running) keeps reporting `true`, so a later
    /// `stop()` can try again.
    pub fn stop(&self) {
        self.stop_with(wake_acceptor);
    }

    fn stop_with(&self, wake: impl Fn(SocketAddr) -> io::Result<()>) {
        let mut listening_slot = lock(&self.listening);
        let Some(listening) = listening_slot.take() else {
            return;
        };
        self.shared.running.store(false, Ordering::SeqCst);

        let wake_addr = wake_address(listening.local_addr);
        let fully_stopped = match wake(wake_addr) {
            Ok(()) => {
                if listening.acceptor.join().is_err() {
                    warn!("acceptor thread panicked");
                }
                true
            }
            Err(e) => {
                error!(
                    %wake_addr,
                    error = %e,
                    "could not wake acceptor; listener is still open"
                );
                *listening_slot = Some(listening);
                false
            }
        };
        drop(listening_slot);

        let (slots, readers) = {
            let mut clients = self.shared.lock_clients();
            (mem::take(&mut clients.slots), mem::take(&mut clients.readers))
        };
        for (id, slot) in &slots {
            debug!(client = id, peer = %slot.peer, "closing client");
            close(&slot.stream);
        }
        drop(slots);
        for reader in readers {
            if reader.join().is_err() {
                warn!("client reader thread panicked");
            }
        }

        if fully_stopped {
            info!("broadcast server stopped");
        }
    }

    /// Encodes `event` once and writes it to every connected client.
    ///
    /// Clients whose write fails are evicted after the pass.  Returns the
    /// number of clients the line was delivered to.
    pub fn broadcast(&self, event: &InputEvent) -> usize {
        let line = match encode_line(event) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "failed to encode event; not broadcast");
                return 0;
            }
        };

        let mut clients = self.shared.lock_clients();
        let mut failed = Vec::new();
        for (id, slot) in &clients.slots {
            if let Err(e) = (&slot.stream).write_all(&line) {
                warn!(
                    client = id,
                    peer = %slot.peer,
                    error = %e,
                    "write failed; evicting client"
                );
                failed.push(*id);
            }
        }
        for id in failed {
            if let Some(slot) = clients.slots.remove(&id) {
                close(&slot.stream);
            }
        }
        trace!(clients = clients.slots.len(), "event broadcast");
        clients.slots.len()
    }

    /// Number of currently connected clients.
    pub fn client_count(&self) -> usize {
        self.shared.lock_clients().slots.len()
    }

    /// The bound listener address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        lock(&self.listening).as_ref().map(|l| l.local_addr)
    }

    pub fn is_running(&self) -> bool {
        lock(&self.listening).is_some()
    }
}

impl EventSink for BroadcastServer {
    fn publish(&self, event: &InputEvent) {
        self.broadcast(event);
    }
}

impl Drop for BroadcastServer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Shared {
    fn lock_clients(&self) -> MutexGuard<'_, ClientSet> {
        lock(&self.clients)
    }

    /// Adds `stream` to the client set and starts its reader, or closes it
    /// when the set is full.  Returns `true` if admitted.
    fn admit(self: &Arc<Self>, stream: TcpStream, peer: SocketAddr) -> bool {
        let mut clients = self.lock_clients();
        clients.readers.retain(|reader| !reader.is_finished());

        if clients.slots.len() >= self.max_clients {
            drop(clients);
            warn!(
                %peer,
                max_clients = self.max_clients,
                "client limit reached; rejecting connection"
            );
            close(&stream);
            return false;
        }

        let reader_stream = match stream.try_clone() {
            Ok(s) => s,
            Err(e) => {
                warn!(%peer, error = %e, "failed to clone client socket; rejecting connection");
                close(&stream);
                return false;
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%peer, error = %e, "failed to set TCP_NODELAY");
        }

        let id = clients.next_id;
        clients.next_id += 1;
        let shared = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("rawcast-client-{id}"))
            .spawn(move || read_until_disconnect(shared, id, reader_stream));

        match spawned {
            Ok(reader) => {
                clients.slots.insert(id, ClientSlot { stream, peer });
                clients.readers.push(reader);
                info!(client = id, %peer, connected = clients.slots.len(), "client connected");
                true
            }
            Err(e) => {
                warn!(%peer, error = %e, "failed to spawn client reader; rejecting connection");
                close(&stream);
                false
            }
        }
    }

    /// Removes client `id` if still present and closes its socket.
    fn evict(&self, id: u64) {
        let removed = self.lock_clients().slots.remove(&id);
        if let Some(slot) = removed {
            info!(client = id, peer = %slot.peer, "client disconnected");
            close(&slot.stream);
        }
    }
}

/// Body of the `rawcast-accept` thread.
fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    loop {
        let accepted = listener.accept();
        if !shared.running.load(Ordering::SeqCst) {
            // The wake-up connection from stop(), or a client racing it.
            break;
        }
        match accepted {
            Ok((stream, peer)) => {
                shared.admit(stream, peer);
            }
            Err(e) => warn!(error = %e, "accept failed"),
        }
    }
    debug!("acceptor exiting");
}

/// Body of a `rawcast-client-<id>` thread.
fn read_until_disconnect(shared: Arc<Shared>, id: u64, mut stream: TcpStream) {
    let mut buf = [0u8; RECV_BUFFER_SIZE];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => trace!(client = id, bytes = n, "discarding inbound bytes"),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!(client = id, error = %e, "client read failed");
                break;
            }
        }
    }
    shared.evict(id);
}

/// Creates the listening socket with `SO_REUSEADDR` set before `bind`, so a
/// restart on the same port is not refused while old connections linger.
fn bind_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;
    Ok(socket.into())
}

/// Unblocks the acceptor's `accept()` with a throwaway connection.
fn wake_acceptor(addr: SocketAddr) -> io::Result<()> {
    TcpStream::connect(addr).map(drop)
}

/// Address stop() connects to: the bound address, or loopback when bound to
/// the unspecified address.
fn wake_address(local: SocketAddr) -> SocketAddr {
    let ip = match local.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        ip => ip,
    };
    SocketAddr::new(ip, local.port())
}

fn close(stream: &TcpStream) {
    if let Err(e) = stream.shutdown(Shutdown::Both) {
        // NotConnected just means the peer got there first.
        if e.kind() != io::ErrorKind::NotConnected {
            debug!(error = %e, "socket shutdown failed");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader};
    use std::time::{Duration, Instant};

    use super::*;

    fn loopback(max_clients: usize) -> BroadcastSettings {
        BroadcastSettings {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            max_clients,
        }
    }

    fn wait_for_clients(server: &BroadcastServer, expected: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while server.client_count() != expected {
            assert!(
                Instant::now() < deadline,
                "timed out waiting for {expected} clients (have {})",
                server.client_count()
            );
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn connect(server: &BroadcastServer) -> TcpStream {
        let stream = TcpStream::connect(server.local_addr().expect("running")).expect("connect");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("read timeout");
        stream
    }

    /// A connected (client, server-side) pair, bypassing the acceptor.
    fn socket_pair() -> (TcpStream, TcpStream, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server_side, peer) = listener.accept().unwrap();
        client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        (client, server_side, peer)
    }

    #[test]
    fn test_broadcast_delivers_identical_line_to_every_client() {
        // Arrange
        let server = BroadcastServer::new(loopback(10));
        server.start(0).expect("start");
        let clients: Vec<_> = (0..3).map(|_| connect(&server)).collect();
        wait_for_clients(&server, 3);
        let event = InputEvent::keyboard("0x1A2B", 65, 42);

        // Act
        let delivered = server.broadcast(&event);

        // Assert
        assert_eq!(delivered, 3);
        let expected = String::from_utf8(encode_line(&event).unwrap()).unwrap();
        for client in clients {
            let mut line = String::new();
            BufReader::new(client).read_line(&mut line).expect("read line");
            assert_eq!(line, expected);
        }
    }

    #[test]
    fn test_broadcast_evicts_client_whose_write_fails() {
        // Arrange: a client whose server-side write half is already closed.
        let server = BroadcastServer::new(loopback(10));
        let (_broken_client, broken_side, broken_peer) = socket_pair();
        broken_side.shutdown(Shutdown::Write).unwrap();
        let (mut healthy_client, healthy_side, healthy_peer) = socket_pair();
        assert!(server.shared.admit(broken_side, broken_peer));
        assert!(server.shared.admit(healthy_side, healthy_peer));

        // Act
        let delivered = server.broadcast(&InputEvent::mouse("0x3C4D", 1, 0, 0, 7));

        // Assert
        assert_eq!(delivered, 1);
        assert_eq!(server.client_count(), 1);
        let mut buf = [0u8; 128];
        let n = healthy_client.read(&mut buf).expect("healthy client still served");
        assert!(buf[..n].ends_with(b"\n"));
    }

    #[test]
    fn test_admit_rejects_connections_beyond_capacity() {
        // Arrange
        let server = BroadcastServer::new(loopback(2));
        let pairs: Vec<_> = (0..3).map(|_| socket_pair()).collect();

        // Act
        let admitted: Vec<bool> = pairs
            .iter()
            .map(|(_, side, peer)| server.shared.admit(side.try_clone().unwrap(), *peer))
            .collect();

        // Assert
        assert_eq!(admitted, vec![true, true, false]);
        assert_eq!(server.client_count(), 2);
        let mut rejected = &pairs[2].0;
        let mut buf = [0u8; 8];
        assert!(matches!(rejected.read(&mut buf), Ok(0) | Err(_)));
    }

    #[test]
    fn test_client_disconnect_is_detected() {
        let server = BroadcastServer::new(loopback(10));
        server.start(0).unwrap();
        let client = connect(&server);
        wait_for_clients(&server, 1);

        drop(client);

        wait_for_clients(&server, 0);
    }

    #[test]
    fn test_inbound_bytes_are_discarded() {
        // Arrange
        let server = BroadcastServer::new(loopback(10));
        server.start(0).unwrap();
        let mut client = connect(&server);
        wait_for_clients(&server, 1);

        // Act
        client.write_all(b"hello server\n").unwrap();
        let delivered = server.broadcast(&InputEvent::keyboard("0x1", 13, 1));

        // Assert
        assert_eq!(delivered, 1);
        assert_eq!(server.client_count(), 1);
    }

    #[test]
    fn test_stop_clears_clients_and_is_idempotent() {
        // Arrange
        let server = BroadcastServer::new(loopback(10));
        server.start(0).unwrap();
        let mut client = connect(&server);
        wait_for_clients(&server, 1);

        // Act
        server.stop();
        server.stop();

        // Assert
        assert_eq!(server.client_count(), 0);
        assert!(!server.is_running());
        assert!(server.local_addr().is_none());
        let mut buf = [0u8; 8];
        assert!(matches!(client.read(&mut buf), Ok(0) | Err(_)));
    }

    #[test]
    fn test_failed_wake_keeps_listener_registered_for_retry() {
        // Arrange
        let server = BroadcastServer::new(loopback(10));
        server.start(0).unwrap();
        let addr = server.local_addr().expect("bound");

        // Act
        server.stop_with(|_| Err(io::Error::from(io::ErrorKind::ConnectionRefused)));

        // Assert
        assert!(server.is_running(), "acceptor still owns the socket");
        assert_eq!(server.local_addr(), Some(addr));
        assert!(matches!(server.start(0), Err(ServerError::AlreadyRunning)));

        server.stop();
        assert!(!server.is_running());
        assert!(server.start(addr.port()).is_ok(), "port released after retry");
    }

    #[test]
    fn test_bind_listener_enables_address_reuse() {
        // Arrange
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();

        // Act
        let listener = bind_listener(addr).expect("bind");

        // Assert
        let socket = Socket::from(listener);
        assert!(socket.reuse_address().expect("getsockopt"));
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let server = BroadcastServer::new(loopback(10));
        server.start(0).unwrap();

        assert!(matches!(server.start(0), Err(ServerError::AlreadyRunning)));
    }

    #[test]
    fn test_bind_failure_is_reported() {
        // 192.0.2.0/24 is reserved for documentation and never local.
        let server = BroadcastServer::new(BroadcastSettings {
            bind_address: "192.0.2.1".parse().unwrap(),
            max_clients: 10,
        });

        let result = server.start(0);

        assert!(matches!(result, Err(ServerError::BindFailed { .. })));
        assert!(!server.is_running());
    }

    #[test]
    fn test_broadcast_without_clients_delivers_nowhere() {
        let server = BroadcastServer::new(loopback(10));
        assert_eq!(server.broadcast(&InputEvent::keyboard("0x1", 65, 1)), 0);
    }

    #[test]
    fn test_wake_address_maps_unspecified_to_loopback() {
        let v4: SocketAddr = "0.0.0.0:9999".parse().unwrap();
        let v6: SocketAddr = "[::]:9999".parse().unwrap();
        let bound: SocketAddr = "10.0.0.5:9999".parse().unwrap();

        assert_eq!(wake_address(v4), "127.0.0.1:9999".parse().unwrap());
        assert_eq!(wake_address(v6), "[::1]:9999".parse().unwrap());
        assert_eq!(wake_address(bound), bound);
    }
}
