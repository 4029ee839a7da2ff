mod net_tests;

#[cfg(test)]
use crate::interface;
#[cfg(test)]
use crate::kernel::kernel::Kernel;

// Each test builds its own isolated kernel instance; instances share no
// state, so the test binary can run them in parallel.
#[cfg(test)]
pub fn test_kernel() -> interface::RustRfc<Kernel> {
    let _ = env_logger::builder().is_test(true).try_init();
    interface::RustRfc::new(Kernel::new())
}

// Drive a full write through the short-write surface.
#[cfg(test)]
pub fn write_all(kernel: &Kernel, fd: i32, mut data: &[u8]) {
    while !data.is_empty() {
        let count = kernel.write_syscall(fd, data);
        assert!(count > 0, "write_syscall failed with {}", count);
        data = &data[count as usize..];
    }
}
