// The rendezvous syscalls: socket, listen, accept, connect, shutdown.
//
// State machine per socket: Unbound -> Listener (listen) or Unbound ->
// Peer (successful connect/accept), both terminal until close. A connect
// queues a request FIFO on the listener and waits on the request's own
// condition; an accept pops the head, wires two channels in opposite
// orientation and admits the request. Exactly one accept can claim a
// given request because the queue pop happens under the kernel lock.

use crate::interface;
use crate::interface::errnos::{syscall_error, Errno};

use super::super::kernel::{Kernel, KernelState, StreamEntry};
use super::super::net::{ConnRequest, ListenerState, PeerState, RequestHandle, Socket, SocketHandle, SocketKind};
use super::super::pipe::ChannelEnd;
use super::net_constants::*;
use super::sys_constants::*;

impl Kernel {
    /// ### Description
    ///
    /// `socket_syscall` allocates an Unbound socket and binds it to a
    /// fresh descriptor. `port` may be NOPORT for a client-only socket
    /// that will connect out later.
    ///
    /// ### Errors
    ///
    /// * `EINVAL` - port outside [NOPORT, MAX_PORT].
    /// * `EMFILE` - no free descriptor slots.
    pub fn socket_syscall(&self, port: i32) -> i32 {
        if port < NOPORT as i32 || port > MAX_PORT as i32 {
            return syscall_error(Errno::EINVAL, "socket", "port out of range");
        }
        let mut state = self.state.lock();
        let fd = match state.get_next_fd(STARTINGFD) {
            Some(fd) => fd,
            None => return syscall_error(Errno::EMFILE, "socket", "no free descriptor slots"),
        };
        let portopt = if port == NOPORT as i32 {
            None
        } else {
            Some(port as u16)
        };
        let sh = state.sockets.insert(Socket::new(portopt));
        state.fdtable.insert(fd, StreamEntry::Socket(sh));
        fd
    }

    /// ### Description
    ///
    /// `listen_syscall` transitions an Unbound socket with a concrete
    /// port into a Listener with an empty pending queue and registers it
    /// in the port map. Terminal until close.
    ///
    /// ### Errors
    ///
    /// * `EBADF` - invalid descriptor.
    /// * `EINVAL` - not a socket, not Unbound, or no concrete port.
    /// * `EADDRINUSE` - the port already has a registered listener.
    pub fn listen_syscall(&self, fd: i32) -> i32 {
        let mut state = self.state.lock();
        let sh = match state.fdtable.get(&fd) {
            Some(StreamEntry::Socket(h)) => *h,
            Some(_) => return syscall_error(Errno::EINVAL, "listen", "descriptor is not a socket"),
            None => return syscall_error(Errno::EBADF, "listen", "invalid file descriptor"),
        };
        let port = match state.sockets.get(sh) {
            Some(sock) => {
                if !matches!(sock.kind, SocketKind::Unbound) {
                    return syscall_error(Errno::EINVAL, "listen", "socket is not unbound");
                }
                match sock.port {
                    Some(p) => p,
                    None => {
                        return syscall_error(Errno::EINVAL, "listen", "socket has no concrete port")
                    }
                }
            }
            None => return syscall_error(Errno::EBADF, "listen", "no socket behind descriptor"),
        };
        if !state.ports.bind(port, sh) {
            return syscall_error(Errno::EADDRINUSE, "listen", "port already has a listener");
        }
        if let Some(sock) = state.sockets.get_mut(sh) {
            sock.kind = SocketKind::Listener(ListenerState::new());
        }
        log::debug!("listen: port {} registered", port);
        0
    }

    /// ### Description
    ///
    /// `accept_syscall` blocks until the listener has a pending
    /// connection request, then establishes the connection: the earliest
    /// queued request is claimed (FIFO fairness in request arrival order,
    /// not acceptor order), the requester's socket becomes a Peer, a new
    /// descriptor is reserved for the acceptor's end, two channels are
    /// opened and wired in opposite orientation so either side's read
    /// sees the other side's write, and the blocked connect is admitted.
    ///
    /// The listener's share count is held across the wait so a concurrent
    /// close cannot free it under us; a close is instead observed as the
    /// port map no longer naming this socket, and surfaces as `EINVAL`.
    ///
    /// ### Returns
    ///
    /// The new acceptor-side descriptor.
    ///
    /// ### Errors
    ///
    /// * `EBADF` - invalid descriptor.
    /// * `EINVAL` - not a listener, or the listener closed while waiting.
    /// * `EMFILE` - no descriptor slot for the acceptor's end; the claimed
    ///   request is put back at the head of the queue so the requester
    ///   keeps waiting for another accept or its own timeout.
    pub fn accept_syscall(&self, fd: i32) -> i32 {
        let mut state = self.state.lock();
        let lh = match state.fdtable.get(&fd) {
            Some(StreamEntry::Socket(h)) => *h,
            Some(_) => return syscall_error(Errno::EINVAL, "accept", "descriptor is not a socket"),
            None => return syscall_error(Errno::EBADF, "accept", "invalid file descriptor"),
        };
        let port = match state.sockets.get(lh) {
            Some(sock) => match (&sock.kind, sock.port) {
                (SocketKind::Listener(_), Some(p)) => p,
                _ => return syscall_error(Errno::EINVAL, "accept", "socket is not listening"),
            },
            None => return syscall_error(Errno::EBADF, "accept", "no socket behind descriptor"),
        };

        // parked across a blocking wait, hold a share
        state.sockets.incref(lh);

        let rh = loop {
            // closed listeners vanish from the port map first; recheck on
            // every wake rather than servicing a queue that no longer
            // exists
            if state.ports.lookup(port) != Some(lh) {
                self._release_socket_share(&mut state, lh);
                return syscall_error(Errno::EINVAL, "accept", "listener closed while waiting");
            }
            let step = match state.sockets.get_mut(lh) {
                Some(sock) => match &mut sock.kind {
                    SocketKind::Listener(ls) => match ls.queue.pop_front() {
                        Some(rh) => Some(Ok(rh)),
                        None => Some(Err(ls.req_available.clone())),
                    },
                    _ => None,
                },
                None => None,
            };
            match step {
                Some(Ok(rh)) => break rh,
                Some(Err(cv)) => cv.wait(&mut state),
                None => {
                    self._release_socket_share(&mut state, lh);
                    return syscall_error(Errno::EINVAL, "accept", "socket is no longer a listener");
                }
            }
        };

        let requester = match state.requests.get(rh).map(|req| req.socket) {
            Some(socket) => socket,
            None => {
                self._release_socket_share(&mut state, lh);
                return syscall_error(Errno::EINVAL, "accept", "pending request vanished");
            }
        };

        let newfd = match state.get_next_fd(STARTINGFD) {
            Some(fd) => fd,
            None => {
                // keep the requester waiting instead of stranding it
                // half-admitted
                if let Some(sock) = state.sockets.get_mut(lh) {
                    if let SocketKind::Listener(ls) = &mut sock.kind {
                        ls.queue.push_front(rh);
                        // the pushed-back request is as good as a fresh
                        // arrival; without a signal another parked accept
                        // would sleep through it
                        ls.req_available.notify_one();
                    }
                }
                self._release_socket_share(&mut state, lh);
                return syscall_error(Errno::EMFILE, "accept", "no free descriptor slots");
            }
        };

        // two channels, one per direction
        let req_to_acc = state.channels.open(PIPE_BUFFER_SIZE);
        let acc_to_req = state.channels.open(PIPE_BUFFER_SIZE);

        // the requester reads what the acceptor writes, and vice versa
        if let Some(sock) = state.sockets.get_mut(requester) {
            sock.kind = SocketKind::Peer(PeerState {
                read_chan: Some(acc_to_req),
                write_chan: Some(req_to_acc),
            });
        }
        let mut acceptor = Socket::new(Some(port));
        acceptor.kind = SocketKind::Peer(PeerState {
            read_chan: Some(req_to_acc),
            write_chan: Some(acc_to_req),
        });
        let ah = state.sockets.insert(acceptor);
        state.fdtable.insert(newfd, StreamEntry::Socket(ah));

        // admit and wake the blocked connect
        if let Some(req) = state.requests.get_mut(rh) {
            req.admitted = true;
            req.connected_cv.notify_all();
        }

        log::debug!("accept: connection established on port {}", port);
        self._release_socket_share(&mut state, lh);
        newfd
    }

    /// ### Description
    ///
    /// `connect_syscall` queues a connection request on the listener
    /// registered at `port` and waits, bounded by `timeout`, for an
    /// accept to admit it. On success the socket has been transitioned to
    /// a fully wired Peer by the accepting side. On every exit path the
    /// request object is consumed here; no request outlives its connect.
    ///
    /// ### Errors
    ///
    /// * `EINVAL` - port out of range, or socket is not Unbound.
    /// * `EBADF` - invalid descriptor.
    /// * `ECONNREFUSED` - no listener on the port, or the listener closed
    ///   before admitting us.
    /// * `ETIMEDOUT` - the wait budget elapsed before an accept claimed
    ///   the request.
    pub fn connect_syscall(&self, fd: i32, port: i32, timeout: interface::RustDuration) -> i32 {
        if port <= NOPORT as i32 || port > MAX_PORT as i32 {
            return syscall_error(Errno::EINVAL, "connect", "port out of range");
        }
        let port = port as u16;
        let mut state = self.state.lock();

        let lh = match state.ports.lookup(port) {
            Some(h) => h,
            None => {
                return syscall_error(Errno::ECONNREFUSED, "connect", "no listener on requested port")
            }
        };
        let sh = match state.fdtable.get(&fd) {
            Some(StreamEntry::Socket(h)) => *h,
            Some(_) => return syscall_error(Errno::EINVAL, "connect", "descriptor is not a socket"),
            None => return syscall_error(Errno::EBADF, "connect", "invalid file descriptor"),
        };
        match state.sockets.get(sh) {
            Some(sock) => {
                if !matches!(sock.kind, SocketKind::Unbound) {
                    return syscall_error(Errno::EINVAL, "connect", "socket is not unbound");
                }
            }
            None => return syscall_error(Errno::EBADF, "connect", "no socket behind descriptor"),
        }

        // parked across a blocking wait, hold a share
        state.sockets.incref(sh);

        let rh = state.requests.insert(ConnRequest::new(sh));
        let queued = match state.sockets.get_mut(lh) {
            Some(sock) => match &mut sock.kind {
                SocketKind::Listener(ls) => {
                    ls.queue.push_back(rh);
                    ls.req_available.notify_one();
                    true
                }
                // the port map only ever names listeners
                _ => false,
            },
            None => false,
        };
        if !queued {
            state.requests.remove(rh);
            self._release_socket_share(&mut state, sh);
            return syscall_error(Errno::ECONNREFUSED, "connect", "listener vanished");
        }

        // genuine bounded wait keyed to the caller's timeout, with the
        // admission flag rechecked after every wake
        let deadline = interface::RustInstant::now() + timeout;
        loop {
            let snapshot = state
                .requests
                .get(rh)
                .map(|req| (req.admitted, req.aborted, req.connected_cv.clone()));
            let (admitted, aborted, cv) = match snapshot {
                Some(bits) => bits,
                None => {
                    // only this call removes its request, so this is
                    // unreachable, but fail closed rather than loop
                    self._release_socket_share(&mut state, sh);
                    return syscall_error(Errno::EINVAL, "connect", "request vanished");
                }
            };
            if admitted {
                state.requests.remove(rh);
                self._release_socket_share(&mut state, sh);
                log::debug!("connect: admitted on port {}", port);
                return 0;
            }
            if aborted {
                state.requests.remove(rh);
                self._release_socket_share(&mut state, sh);
                return syscall_error(
                    Errno::ECONNREFUSED,
                    "connect",
                    "listener closed before accepting",
                );
            }
            let timed_out = cv.wait_until(&mut state, deadline).timed_out();
            if timed_out {
                // one last look: an accept may have admitted us right at
                // the deadline
                if state.requests.get(rh).map_or(false, |r| r.admitted) {
                    state.requests.remove(rh);
                    self._release_socket_share(&mut state, sh);
                    return 0;
                }
                // unlink so a later accept cannot claim a dead request
                if let Some(sock) = state.sockets.get_mut(lh) {
                    if let SocketKind::Listener(ls) = &mut sock.kind {
                        ls.queue.retain(|&h| h != rh);
                    }
                }
                state.requests.remove(rh);
                self._release_socket_share(&mut state, sh);
                return syscall_error(Errno::ETIMEDOUT, "connect", "connection not admitted in time");
            }
        }
    }

    /// ### Description
    ///
    /// `shutdown_syscall` irreversibly narrows a connected peer: for each
    /// selected direction the backing channel is detached entirely, both
    /// of its endpoints closed and the handle dropped from this peer. The
    /// partner observes the torn-down channel on its next operation on
    /// that direction; its own state is untouched.
    ///
    /// ### Errors
    ///
    /// * `EBADF` - invalid descriptor.
    /// * `EINVAL` - unknown mode, or descriptor is not a socket.
    /// * `ENOTCONN` - socket is not a connected peer.
    pub fn shutdown_syscall(&self, fd: i32, how: i32) -> i32 {
        if how != SHUTDOWN_READ && how != SHUTDOWN_WRITE && how != SHUTDOWN_BOTH {
            return syscall_error(Errno::EINVAL, "shutdown", "unknown shutdown mode");
        }
        let mut state = self.state.lock();
        let sh = match state.fdtable.get(&fd) {
            Some(StreamEntry::Socket(h)) => *h,
            Some(_) => return syscall_error(Errno::EINVAL, "shutdown", "descriptor is not a socket"),
            None => return syscall_error(Errno::EBADF, "shutdown", "invalid file descriptor"),
        };
        let (rc, wc) = match state.sockets.get_mut(sh) {
            Some(sock) => match &mut sock.kind {
                SocketKind::Peer(peer) => {
                    let rc = if how == SHUTDOWN_READ || how == SHUTDOWN_BOTH {
                        peer.read_chan.take()
                    } else {
                        None
                    };
                    let wc = if how == SHUTDOWN_WRITE || how == SHUTDOWN_BOTH {
                        peer.write_chan.take()
                    } else {
                        None
                    };
                    (rc, wc)
                }
                _ => {
                    return syscall_error(Errno::ENOTCONN, "shutdown", "socket is not a connected peer")
                }
            },
            None => return syscall_error(Errno::EBADF, "shutdown", "no socket behind descriptor"),
        };
        if let Some(h) = rc {
            state.channels.close_end(h, ChannelEnd::Reader);
            state.channels.close_end(h, ChannelEnd::Writer);
        }
        if let Some(h) = wc {
            state.channels.close_end(h, ChannelEnd::Reader);
            state.channels.close_end(h, ChannelEnd::Writer);
        }
        0
    }

    // Socket side of close_syscall. Tears down whatever the socket's
    // current state owns, then releases the descriptor's share; the slot
    // itself is freed by the share count reaching zero, never here.
    pub(crate) fn _cleanup_socket(&self, state: &mut KernelState, handle: SocketHandle) {
        let mut pending: Vec<RequestHandle> = Vec::new();
        let mut listener_bits: Option<(interface::RustRfc<interface::Condvar>, Option<u16>)> = None;
        let mut read_chan = None;
        let mut write_chan = None;

        match state.sockets.get_mut(handle) {
            Some(sock) => match &mut sock.kind {
                SocketKind::Listener(ls) => {
                    pending = ls.queue.drain(..).collect();
                    listener_bits = Some((ls.req_available.clone(), sock.port));
                }
                SocketKind::Peer(peer) => {
                    // close the local side only: the reader of our read
                    // channel, the writer of our write channel
                    read_chan = peer.read_chan.take();
                    write_chan = peer.write_chan.take();
                }
                SocketKind::Unbound => {}
            },
            None => return,
        }

        // force admission false and unblock every queued requester; the
        // requests themselves are consumed by their connect callers
        for rh in pending {
            if let Some(req) = state.requests.get_mut(rh) {
                req.aborted = true;
                req.connected_cv.notify_all();
            }
        }
        if let Some((cv, port)) = listener_bits {
            // wake blocked accepts so they observe the closed listener
            cv.notify_all();
            if let Some(p) = port {
                state.ports.unbind_if(p, handle);
                log::debug!("close: listener on port {} unregistered", p);
            }
        }

        if let Some(h) = read_chan {
            state.channels.close_end(h, ChannelEnd::Reader);
        }
        if let Some(h) = write_chan {
            state.channels.close_end(h, ChannelEnd::Writer);
        }

        self._release_socket_share(state, handle);
    }

    // Last-share teardown. The count can hit zero while the socket still
    // owns live channel ends: close a descriptor under a blocked connect
    // and the socket is Unbound when the fd goes away, but an accept can
    // still wire it into a Peer before the connect's final release. The
    // channels must not outlive the socket that names them.
    pub(crate) fn _release_socket_share(&self, state: &mut KernelState, handle: SocketHandle) {
        if let Some(freed) = state.sockets.decref(handle) {
            if let SocketKind::Peer(peer) = freed.kind {
                if let Some(h) = peer.read_chan {
                    state.channels.close_end(h, ChannelEnd::Reader);
                }
                if let Some(h) = peer.write_chan {
                    state.channels.close_end(h, ChannelEnd::Writer);
                }
            }
        }
    }
}
