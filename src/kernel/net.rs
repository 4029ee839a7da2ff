// Socket control objects, connection requests and the port registry for
// the rustkern rendezvous layer.
//
// A socket is a tagged variant: it starts Unbound, and exactly one of
// listen or a successful connect/accept moves it to Listener or Peer. The
// listener/peer substructure is allocated only on transition. Sockets are
// share counted; anything that parks a reference to a socket across a
// blocking wait must incref before waiting and decref after, so a
// concurrent close can never free the object out from under the waiter.

use crate::interface;
use crate::kernel::pipe::ChannelHandle;

pub type SocketHandle = usize;
pub type RequestHandle = usize;

/// State owned by a listening socket: the FIFO of pending connection
/// requests and the condition accept blocks on.
#[derive(Debug)]
pub struct ListenerState {
    pub queue: interface::RustDeque<RequestHandle>,
    pub req_available: interface::RustRfc<interface::Condvar>,
}

impl ListenerState {
    pub fn new() -> ListenerState {
        ListenerState {
            queue: interface::RustDeque::new(),
            req_available: interface::RustRfc::new(interface::Condvar::new()),
        }
    }
}

impl Default for ListenerState {
    fn default() -> Self {
        Self::new()
    }
}

/// State owned by one side of an established connection. The two handles
/// name two distinct channels forming a duplex pair with the partner peer;
/// this side reads from `read_chan` and writes to `write_chan`. Shutdown
/// drops a direction permanently, leaving `None`.
#[derive(Debug)]
pub struct PeerState {
    pub read_chan: Option<ChannelHandle>,
    pub write_chan: Option<ChannelHandle>,
}

#[derive(Debug)]
pub enum SocketKind {
    Unbound,
    Listener(ListenerState),
    Peer(PeerState),
}

#[derive(Debug)]
pub struct Socket {
    /// None for client-only sockets that will connect out
    pub port: Option<u16>,
    pub kind: SocketKind,
    refcount: u32,
}

impl Socket {
    pub fn new(port: Option<u16>) -> Socket {
        Socket {
            port: port,
            kind: SocketKind::Unbound,
            refcount: 1,
        }
    }
}

/// An ephemeral rendezvous token: created by connect, queued on a
/// listener, claimed by exactly one accept. `admitted` flips true when an
/// accept wires the connection; `aborted` flips true when the listener
/// closes before that, so the blocked connect observes failure instead of
/// waiting out its timeout. The connect that created a request always
/// removes it from the arena before returning, on every path.
#[derive(Debug)]
pub struct ConnRequest {
    pub socket: SocketHandle,
    pub admitted: bool,
    pub aborted: bool,
    pub connected_cv: interface::RustRfc<interface::Condvar>,
}

impl ConnRequest {
    pub fn new(socket: SocketHandle) -> ConnRequest {
        ConnRequest {
            socket: socket,
            admitted: false,
            aborted: false,
            connected_cv: interface::RustRfc::new(interface::Condvar::new()),
        }
    }
}

/// Arena of live sockets with centralized share counting. The slot is
/// freed exactly when the count reaches zero; close paths never free
/// directly.
#[derive(Debug, Default)]
pub struct SocketTable {
    next_handle: SocketHandle,
    table: interface::RustHashMap<SocketHandle, Socket>,
}

impl SocketTable {
    pub fn new() -> SocketTable {
        SocketTable {
            next_handle: 0,
            table: interface::RustHashMap::new(),
        }
    }

    pub fn insert(&mut self, socket: Socket) -> SocketHandle {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.table.insert(handle, socket);
        handle
    }

    pub fn get(&self, handle: SocketHandle) -> Option<&Socket> {
        self.table.get(&handle)
    }

    pub fn get_mut(&mut self, handle: SocketHandle) -> Option<&mut Socket> {
        self.table.get_mut(&handle)
    }

    pub fn incref(&mut self, handle: SocketHandle) {
        if let Some(sock) = self.table.get_mut(&handle) {
            sock.refcount += 1;
        }
    }

    /// Release one share. When the last share drops the slot is removed
    /// and the socket is handed back so the caller can tear down whatever
    /// it still owns; the table itself cannot reach the channel arena.
    pub fn decref(&mut self, handle: SocketHandle) -> Option<Socket> {
        let freed = match self.table.get_mut(&handle) {
            Some(sock) => {
                sock.refcount -= 1;
                sock.refcount == 0
            }
            None => false,
        };
        if freed {
            log::trace!("socket {} freed, last share released", handle);
            return self.table.remove(&handle);
        }
        None
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Arena of pending connection requests.
#[derive(Debug, Default)]
pub struct RequestTable {
    next_handle: RequestHandle,
    table: interface::RustHashMap<RequestHandle, ConnRequest>,
}

impl RequestTable {
    pub fn new() -> RequestTable {
        RequestTable {
            next_handle: 0,
            table: interface::RustHashMap::new(),
        }
    }

    pub fn insert(&mut self, request: ConnRequest) -> RequestHandle {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.table.insert(handle, request);
        handle
    }

    pub fn get(&self, handle: RequestHandle) -> Option<&ConnRequest> {
        self.table.get(&handle)
    }

    pub fn get_mut(&mut self, handle: RequestHandle) -> Option<&mut ConnRequest> {
        self.table.get_mut(&handle)
    }

    pub fn remove(&mut self, handle: RequestHandle) -> Option<ConnRequest> {
        self.table.remove(&handle)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// The port registry: at most one listening socket per port at a time.
/// Owned by the kernel instance, not a process-wide static, so isolated
/// kernel instances can coexist in one test process.
#[derive(Debug, Default)]
pub struct PortMap {
    map: interface::RustHashMap<u16, SocketHandle>,
}

impl PortMap {
    pub fn new() -> PortMap {
        PortMap {
            map: interface::RustHashMap::new(),
        }
    }

    /// Register a listener. Fails (returns false) if the port is occupied.
    pub fn bind(&mut self, port: u16, handle: SocketHandle) -> bool {
        if self.map.contains_key(&port) {
            return false;
        }
        self.map.insert(port, handle);
        true
    }

    pub fn lookup(&self, port: u16) -> Option<SocketHandle> {
        self.map.get(&port).copied()
    }

    /// Remove the entry for `port` only if it still names `handle`, so a
    /// stale close can never evict a successor listener.
    pub fn unbind_if(&mut self, port: u16, handle: SocketHandle) {
        if self.map.get(&port) == Some(&handle) {
            self.map.remove(&port);
        }
    }
}
