pub mod ipc_calls;
pub mod net_calls;
pub mod net_constants;
pub mod sys_constants;
