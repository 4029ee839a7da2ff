//! Bounded byte-stream channels for the rustkern IPC core
//!
//! ## Pipe Module
//!
//! A channel is a fixed-capacity cyclic byte buffer with one reader
//! endpoint and one writer endpoint. Channels back both the pipe syscalls
//! and the duplex pairs wired up by the socket rendezvous, and live in an
//! arena keyed by integer handles so that no object ever holds a raw
//! pointer across a blocking wait.

use crate::interface;

/// Handle into a kernel's channel arena.
pub type ChannelHandle = usize;

/// One directional role of a channel. Either end may be closed
/// independently and permanently; an end is never reattached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelEnd {
    Reader,
    Writer,
}

/// ### Description
///
/// A bounded cyclic byte buffer with cursor-based full/empty tracking.
///
/// One buffer slot is permanently unusable so that full and empty are
/// distinguishable without a separate count field: the buffer is empty iff
/// `rpos == wpos` and full iff `(wpos + 1) % capacity == rpos`. A channel
/// of capacity C therefore buffers at most C-1 bytes.
///
/// The condition variables are reference counted so a blocked thread can
/// keep its wait target alive even if the channel is freed while it sleeps;
/// after any wake the waiter re-looks the handle up in the arena and treats
/// a vanished channel as closed.
#[derive(Debug)]
pub struct Channel {
    buffer: Vec<u8>,
    rpos: usize,
    wpos: usize,
    reader_present: bool,
    writer_present: bool,
    /// For blocking writers until space is available
    pub has_space: interface::RustRfc<interface::Condvar>,
    /// For blocking readers until data is available
    pub has_data: interface::RustRfc<interface::Condvar>,
}

impl Channel {
    pub fn new(capacity: usize) -> Channel {
        // capacity 1 would make the buffer permanently full and empty at once
        assert!(capacity >= 2, "channel capacity must be at least 2");
        Channel {
            buffer: vec![0u8; capacity],
            rpos: 0,
            wpos: 0,
            reader_present: true,
            writer_present: true,
            has_space: interface::RustRfc::new(interface::Condvar::new()),
            has_data: interface::RustRfc::new(interface::Condvar::new()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rpos == self.wpos
    }

    pub fn is_full(&self) -> bool {
        (self.wpos + 1) % self.buffer.len() == self.rpos
    }

    /// Bytes currently buffered and readable.
    pub fn bytes_available(&self) -> usize {
        (self.wpos + self.buffer.len() - self.rpos) % self.buffer.len()
    }

    /// Bytes that can be written before the buffer is full.
    pub fn space_available(&self) -> usize {
        self.buffer.len() - 1 - self.bytes_available()
    }

    pub fn end_present(&self, end: ChannelEnd) -> bool {
        match end {
            ChannelEnd::Reader => self.reader_present,
            ChannelEnd::Writer => self.writer_present,
        }
    }

    pub fn both_ends_vacant(&self) -> bool {
        !self.reader_present && !self.writer_present
    }

    /// ### Description
    ///
    /// Drains up to `buf.len()` bytes starting at the read cursor,
    /// advancing it with wraparound. Returns the count actually copied,
    /// which is short when the buffer empties first. The caller decides
    /// whether an empty buffer means block, end-of-stream, or error.
    pub fn pop_bytes(&mut self, buf: &mut [u8]) -> usize {
        let count = std::cmp::min(buf.len(), self.bytes_available());
        for b in buf.iter_mut().take(count) {
            *b = self.buffer[self.rpos];
            self.rpos = (self.rpos + 1) % self.buffer.len();
        }
        count
    }

    /// ### Description
    ///
    /// Copies up to `buf.len()` bytes in at the write cursor, advancing it
    /// with wraparound, stopping when the buffer fills. Returns the count
    /// actually written; a short write is not an error.
    pub fn push_bytes(&mut self, buf: &[u8]) -> usize {
        let count = std::cmp::min(buf.len(), self.space_available());
        for &b in buf.iter().take(count) {
            self.buffer[self.wpos] = b;
            self.wpos = (self.wpos + 1) % self.buffer.len();
        }
        count
    }

    /// Mark one end vacant and wake every waiter in both directions, so a
    /// blocked writer reacts to a reader closing and vice versa.
    /// Idempotent.
    pub fn close_end(&mut self, end: ChannelEnd) {
        match end {
            ChannelEnd::Reader => self.reader_present = false,
            ChannelEnd::Writer => self.writer_present = false,
        }
        self.has_space.notify_all();
        self.has_data.notify_all();
    }
}

/// Arena of live channels. Handles are never reused within a kernel
/// instance, which turns any stale-handle bug into a clean lookup miss.
#[derive(Debug, Default)]
pub struct ChannelTable {
    next_handle: ChannelHandle,
    table: interface::RustHashMap<ChannelHandle, Channel>,
}

impl ChannelTable {
    pub fn new() -> ChannelTable {
        ChannelTable {
            next_handle: 0,
            table: interface::RustHashMap::new(),
        }
    }

    /// Allocate a channel with both endpoints present.
    pub fn open(&mut self, capacity: usize) -> ChannelHandle {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.table.insert(handle, Channel::new(capacity));
        handle
    }

    pub fn get(&self, handle: ChannelHandle) -> Option<&Channel> {
        self.table.get(&handle)
    }

    pub fn get_mut(&mut self, handle: ChannelHandle) -> Option<&mut Channel> {
        self.table.get_mut(&handle)
    }

    /// ### Description
    ///
    /// Close one endpoint of a channel, freeing the channel's storage once
    /// both endpoints are vacant. Freeing is decided here and nowhere
    /// else: a channel with a live endpoint stays addressable because the
    /// remaining endpoint may still be waited on. Returns true once the
    /// channel has been freed.
    pub fn close_end(&mut self, handle: ChannelHandle, end: ChannelEnd) -> bool {
        let freed = match self.table.get_mut(&handle) {
            Some(chan) => {
                chan.close_end(end);
                chan.both_ends_vacant()
            }
            None => return true,
        };
        if freed {
            self.table.remove(&handle);
            log::trace!("channel {} freed, both endpoints vacant", handle);
        }
        freed
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
