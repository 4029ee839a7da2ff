// Port space and shutdown modes for the rendezvous layer.

// Port numbers run [1, MAX_PORT]; NOPORT marks a client-only socket that
// will connect out rather than listen.
pub const NOPORT: u16 = 0;
pub const MAX_PORT: u16 = 1023;

pub const SHUTDOWN_READ: i32 = 1;
pub const SHUTDOWN_WRITE: i32 = 2;
pub const SHUTDOWN_BOTH: i32 = 3;
