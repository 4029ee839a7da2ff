// Pipe creation and the generic stream syscalls (read, write, close).
//
// read/write/close dispatch on whatever stream object the descriptor is
// bound to: a channel endpoint or a socket. The blocking channel loops
// live here too; both the pipe endpoints and connected peers funnel into
// them. Every wait re-evaluates its predicate after every wake, because
// close paths wake waiters with a broadcast on purpose.

use crate::interface;
use crate::interface::errnos::{syscall_error, Errno};
use crate::interface::PipeArray;

use super::super::kernel::{Kernel, KernelState, StreamEntry};
use super::super::net::SocketKind;
use super::super::pipe::{ChannelEnd, ChannelHandle};
use super::sys_constants::*;

impl Kernel {
    /// ### Description
    ///
    /// `pipe_syscall` allocates a channel and binds its two endpoints to
    /// two fresh descriptors, read end and write end.
    ///
    /// ### Returns
    ///
    /// 0 on success, with `pipefd` filled in. `EMFILE` if two free
    /// descriptor slots are unavailable; in that case nothing is
    /// allocated.
    pub fn pipe_syscall(&self, pipefd: &mut PipeArray) -> i32 {
        let mut state = self.state.lock();

        // probe for both slots before committing either
        let readfd = match state.get_next_fd(STARTINGFD) {
            Some(fd) => fd,
            None => return syscall_error(Errno::EMFILE, "pipe", "no free descriptor slots"),
        };
        let writefd = match state.get_next_fd(readfd + 1) {
            Some(fd) => fd,
            None => return syscall_error(Errno::EMFILE, "pipe", "no free descriptor slots"),
        };

        let handle = state.channels.open(PIPE_BUFFER_SIZE);
        state.fdtable.insert(readfd, StreamEntry::PipeReader(handle));
        state.fdtable.insert(writefd, StreamEntry::PipeWriter(handle));

        pipefd.readfd = readfd;
        pipefd.writefd = writefd;
        log::trace!("pipe: channel {} bound to fds {}/{}", handle, readfd, writefd);
        0
    }

    /// ### Description
    ///
    /// `read_syscall` reads up to `readbuf.len()` bytes from the stream
    /// object bound to `fd`.
    ///
    /// For a channel (pipe read end, or the read direction of a connected
    /// peer) this blocks while the buffer is empty and the writer endpoint
    /// is still present, and returns 0 (end-of-stream, not an error) once
    /// the writer is gone and the buffer has drained. A short read is not
    /// an error.
    ///
    /// ### Errors
    ///
    /// * `EBADF` - invalid descriptor, or reading the write end of a pipe.
    /// * `EINVAL` - socket descriptor that is not a connected peer.
    /// * `ENOTCONN` - the peer's read direction has been shut down.
    pub fn read_syscall(&self, fd: i32, readbuf: &mut [u8]) -> i32 {
        let mut state = self.state.lock();
        let entry = match state.fdtable.get(&fd) {
            Some(e) => *e,
            None => return syscall_error(Errno::EBADF, "read", "invalid file descriptor"),
        };
        match entry {
            StreamEntry::PipeReader(handle) => self.chan_read(&mut state, handle, readbuf),
            StreamEntry::PipeWriter(_) => {
                syscall_error(Errno::EBADF, "read", "cannot read the write end of a pipe")
            }
            StreamEntry::Socket(sh) => {
                let handle = match state.sockets.get(sh) {
                    Some(sock) => match &sock.kind {
                        SocketKind::Peer(peer) => match peer.read_chan {
                            Some(h) => h,
                            None => {
                                return syscall_error(
                                    Errno::ENOTCONN,
                                    "read",
                                    "read direction has been shut down",
                                )
                            }
                        },
                        _ => {
                            return syscall_error(Errno::EINVAL, "read", "socket is not connected")
                        }
                    },
                    None => return syscall_error(Errno::EBADF, "read", "no socket behind descriptor"),
                };
                self.chan_read(&mut state, handle, readbuf)
            }
        }
    }

    /// ### Description
    ///
    /// `write_syscall` writes up to `writebuf.len()` bytes to the stream
    /// object bound to `fd`.
    ///
    /// For a channel this fails immediately (no block, no partial write)
    /// if either endpoint is already vacant, blocks while the buffer is
    /// full, and otherwise writes a single burst: as many bytes as fit,
    /// returning the count. A short write is not an error.
    ///
    /// ### Errors
    ///
    /// * `EBADF` - invalid descriptor, or writing the read end of a pipe.
    /// * `EPIPE` - the channel's reader (or writer) endpoint is vacant.
    /// * `EINVAL` - socket descriptor that is not a connected peer.
    /// * `ENOTCONN` - the peer's write direction has been shut down.
    pub fn write_syscall(&self, fd: i32, writebuf: &[u8]) -> i32 {
        let mut state = self.state.lock();
        let entry = match state.fdtable.get(&fd) {
            Some(e) => *e,
            None => return syscall_error(Errno::EBADF, "write", "invalid file descriptor"),
        };
        match entry {
            StreamEntry::PipeWriter(handle) => self.chan_write(&mut state, handle, writebuf),
            StreamEntry::PipeReader(_) => {
                syscall_error(Errno::EBADF, "write", "cannot write the read end of a pipe")
            }
            StreamEntry::Socket(sh) => {
                let handle = match state.sockets.get(sh) {
                    Some(sock) => match &sock.kind {
                        SocketKind::Peer(peer) => match peer.write_chan {
                            Some(h) => h,
                            None => {
                                return syscall_error(
                                    Errno::ENOTCONN,
                                    "write",
                                    "write direction has been shut down",
                                )
                            }
                        },
                        _ => {
                            return syscall_error(Errno::EINVAL, "write", "socket is not connected")
                        }
                    },
                    None => {
                        return syscall_error(Errno::EBADF, "write", "no socket behind descriptor")
                    }
                };
                self.chan_write(&mut state, handle, writebuf)
            }
        }
    }

    /// ### Description
    ///
    /// `close_syscall` releases the descriptor and closes the local side
    /// of whatever it was bound to: one channel endpoint for a pipe fd,
    /// or one share of a socket (tearing down its listener queue or peer
    /// channels first). All waiters affected by the close are woken so
    /// they can observe the closed state instead of re-blocking.
    pub fn close_syscall(&self, fd: i32) -> i32 {
        let mut state = self.state.lock();
        let entry = match state.fdtable.remove(&fd) {
            Some(e) => e,
            None => return syscall_error(Errno::EBADF, "close", "invalid file descriptor"),
        };
        match entry {
            StreamEntry::PipeReader(handle) => {
                state.channels.close_end(handle, ChannelEnd::Reader);
            }
            StreamEntry::PipeWriter(handle) => {
                state.channels.close_end(handle, ChannelEnd::Writer);
            }
            StreamEntry::Socket(sh) => {
                self._cleanup_socket(&mut state, sh);
            }
        }
        0
    }

    // Blocking read loop shared by pipe read ends and peer sockets.
    // Assumes the kernel lock is held; the wait releases and reacquires it.
    pub(crate) fn chan_read(
        &self,
        state: &mut interface::MutexGuard<'_, KernelState>,
        handle: ChannelHandle,
        readbuf: &mut [u8],
    ) -> i32 {
        if readbuf.is_empty() {
            return 0;
        }
        loop {
            let cv = {
                let chan = match state.channels.get_mut(handle) {
                    Some(c) => c,
                    None => {
                        return syscall_error(Errno::EBADF, "read", "channel torn down while blocked")
                    }
                };
                if !chan.end_present(ChannelEnd::Reader) {
                    return syscall_error(Errno::EBADF, "read", "read end closed while blocked");
                }
                if !chan.is_empty() {
                    let count = chan.pop_bytes(readbuf);
                    // bytes were removed, unblock all blocked writers
                    chan.has_space.notify_all();
                    return count as i32;
                }
                if !chan.end_present(ChannelEnd::Writer) {
                    // writer gone and nothing buffered: end-of-stream
                    return 0;
                }
                chan.has_data.clone()
            };
            cv.wait(state);
        }
    }

    // Blocking write loop shared by pipe write ends and peer sockets.
    pub(crate) fn chan_write(
        &self,
        state: &mut interface::MutexGuard<'_, KernelState>,
        handle: ChannelHandle,
        writebuf: &[u8],
    ) -> i32 {
        if writebuf.is_empty() {
            return 0;
        }
        loop {
            let cv = {
                let chan = match state.channels.get_mut(handle) {
                    Some(c) => c,
                    None => {
                        return syscall_error(Errno::EPIPE, "write", "channel torn down while blocked")
                    }
                };
                // endpoint presence is rechecked after every wake so a
                // writer blocked on a full buffer reacts to the reader
                // closing
                if !chan.end_present(ChannelEnd::Reader) || !chan.end_present(ChannelEnd::Writer) {
                    return syscall_error(Errno::EPIPE, "write", "broken pipe");
                }
                if !chan.is_full() {
                    let count = chan.push_bytes(writebuf);
                    // bytes were added, unblock all blocked readers
                    chan.has_data.notify_all();
                    return count as i32;
                }
                chan.has_space.clone()
            };
            cv.wait(state);
        }
    }
}
