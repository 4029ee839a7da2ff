// The kernel instance object.
//
// A Kernel owns every piece of shared IPC state behind one mutex, the
// global critical section of the monitor: descriptor table, channel arena,
// socket arena, pending-request arena and port registry. Every syscall
// locks it on entry; blocking operations wait on condition variables tied
// to that one mutex, so a wait atomically releases and reacquires the
// kernel lock. Holding all state in an instance (instead of process-wide
// statics) lets tests run isolated kernels side by side.

use crate::interface;

use super::net::{PortMap, RequestTable, SocketHandle, SocketTable};
use super::pipe::{ChannelHandle, ChannelTable};
use super::syscalls::sys_constants::*;

/// What a descriptor is bound to. The generic read/write/close syscalls
/// dispatch on this tag; the descriptor table owns the stream object, the
/// stream object never owns the descriptor.
#[derive(Debug, Clone, Copy)]
pub enum StreamEntry {
    /// Consumer endpoint of a channel
    PipeReader(ChannelHandle),
    /// Producer endpoint of a channel
    PipeWriter(ChannelHandle),
    /// Socket control object, any state
    Socket(SocketHandle),
}

#[derive(Debug, Default)]
pub struct KernelState {
    pub fdtable: interface::RustHashMap<i32, StreamEntry>,
    pub channels: ChannelTable,
    pub sockets: SocketTable,
    pub requests: RequestTable,
    pub ports: PortMap,
}

impl KernelState {
    /// Lowest free descriptor slot at or above `startfd`, per the usual
    /// lowest-open-number convention.
    pub fn get_next_fd(&self, startfd: i32) -> Option<i32> {
        for fd in startfd..MAXFD {
            if !self.fdtable.contains_key(&fd) {
                return Some(fd);
            }
        }
        None
    }
}

pub struct Kernel {
    pub(crate) state: interface::Mutex<KernelState>,
}

impl Kernel {
    pub fn new() -> Kernel {
        log::trace!("kernel instance created");
        Kernel {
            state: interface::Mutex::new(KernelState {
                fdtable: interface::RustHashMap::new(),
                channels: ChannelTable::new(),
                sockets: SocketTable::new(),
                requests: RequestTable::new(),
                ports: PortMap::new(),
            }),
        }
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}
