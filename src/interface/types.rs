// Argument structs crossing the rustkern syscall surface.

/// Descriptor pair filled in by `pipe_syscall`, read end first.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct PipeArray {
    pub readfd: i32,
    pub writefd: i32,
}
