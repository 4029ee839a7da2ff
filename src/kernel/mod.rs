pub mod kernel;
pub mod net;
pub mod pipe;
pub mod syscalls;
