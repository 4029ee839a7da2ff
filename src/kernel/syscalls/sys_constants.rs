// Descriptor-table limits and stream buffer sizing.

pub const STARTINGFD: i32 = 0;
pub const MAXFD: i32 = 1024;

// Capacity of the cyclic buffer behind every channel. One slot is kept
// unusable to disambiguate full from empty, so usable capacity is one
// byte less.
pub const PIPE_BUFFER_SIZE: usize = 4096;
