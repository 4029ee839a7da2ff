#[cfg(test)]
pub mod net_tests {
    use crate::interface;
    use crate::interface::errnos::Errno;
    use crate::kernel::syscalls::net_constants::*;
    use crate::tests::{test_kernel, write_all};

    // long enough that a healthy rendezvous always makes it
    const GENEROUS: interface::RustDuration = interface::RustDuration::from_secs(5);

    #[test]
    pub fn ut_kern_socket_bad_port() {
        let kernel = test_kernel();
        assert_eq!(kernel.socket_syscall(-1), -(Errno::EINVAL as i32));
        assert_eq!(
            kernel.socket_syscall(MAX_PORT as i32 + 1),
            -(Errno::EINVAL as i32)
        );
    }

    #[test]
    pub fn ut_kern_listen_errors() {
        let kernel = test_kernel();

        // no concrete port to register under
        let clientfd = kernel.socket_syscall(NOPORT as i32);
        assert!(clientfd >= 0);
        assert_eq!(kernel.listen_syscall(clientfd), -(Errno::EINVAL as i32));

        let listenfd = kernel.socket_syscall(100);
        assert!(listenfd >= 0);
        assert_eq!(kernel.listen_syscall(listenfd), 0);

        // already a listener
        assert_eq!(kernel.listen_syscall(listenfd), -(Errno::EINVAL as i32));

        // same port, second socket
        let rivalfd = kernel.socket_syscall(100);
        assert!(rivalfd >= 0);
        assert_eq!(kernel.listen_syscall(rivalfd), -(Errno::EADDRINUSE as i32));

        // once the first listener closes, the port is reusable
        assert_eq!(kernel.close_syscall(listenfd), 0);
        assert_eq!(kernel.listen_syscall(rivalfd), 0);

        assert_eq!(kernel.close_syscall(clientfd), 0);
        assert_eq!(kernel.close_syscall(rivalfd), 0);
    }

    #[test]
    pub fn ut_kern_connect_no_listener() {
        let kernel = test_kernel();
        let clientfd = kernel.socket_syscall(NOPORT as i32);
        assert!(clientfd >= 0);

        // refused up front, the timeout budget is never consumed
        let start = interface::RustInstant::now();
        assert_eq!(
            kernel.connect_syscall(clientfd, 300, GENEROUS),
            -(Errno::ECONNREFUSED as i32)
        );
        assert!(start.elapsed() < interface::RustDuration::from_secs(1));

        assert_eq!(
            kernel.connect_syscall(clientfd, 0, GENEROUS),
            -(Errno::EINVAL as i32)
        );
        assert_eq!(kernel.close_syscall(clientfd), 0);
    }

    #[test]
    pub fn ut_kern_connect_timeout() {
        let kernel = test_kernel();

        let listenfd = kernel.socket_syscall(42);
        assert!(listenfd >= 0);
        assert_eq!(kernel.listen_syscall(listenfd), 0);

        let clientfd = kernel.socket_syscall(NOPORT as i32);
        assert!(clientfd >= 0);

        // nobody accepts, the wait expires close to the requested budget
        let budget = interface::RustDuration::from_millis(100);
        let start = interface::RustInstant::now();
        assert_eq!(
            kernel.connect_syscall(clientfd, 42, budget),
            -(Errno::ETIMEDOUT as i32)
        );
        let elapsed = start.elapsed();
        assert!(elapsed >= budget, "returned after {:?}", elapsed);
        assert!(elapsed < interface::RustDuration::from_secs(2));

        // the dead request must not linger in the queue or the table
        {
            let state = kernel.state.lock();
            assert!(state.requests.is_empty());
        }

        assert_eq!(kernel.close_syscall(clientfd), 0);
        assert_eq!(kernel.close_syscall(listenfd), 0);
    }

    #[test]
    pub fn ut_kern_accept_blocks_until_connect() {
        let kernel = test_kernel();

        let listenfd = kernel.socket_syscall(9);
        assert!(listenfd >= 0);
        assert_eq!(kernel.listen_syscall(listenfd), 0);

        let kernel2 = kernel.clone();
        let acceptor = interface::helper_thread(move || kernel2.accept_syscall(listenfd));

        // give the accept time to park on the empty queue
        interface::sleep(interface::RustDuration::from_millis(100));

        let clientfd = kernel.socket_syscall(NOPORT as i32);
        assert!(clientfd >= 0);
        assert_eq!(kernel.connect_syscall(clientfd, 9, GENEROUS), 0);

        let connfd = acceptor.join().unwrap();
        assert!(connfd >= 0);

        // connected both ways
        write_all(&kernel, clientfd, b"ping");
        let mut buf = [0u8; 4];
        assert_eq!(kernel.read_syscall(connfd, &mut buf), 4);
        assert_eq!(&buf, b"ping");

        write_all(&kernel, connfd, b"pong");
        assert_eq!(kernel.read_syscall(clientfd, &mut buf), 4);
        assert_eq!(&buf, b"pong");

        assert_eq!(kernel.close_syscall(clientfd), 0);
        assert_eq!(kernel.close_syscall(connfd), 0);
        assert_eq!(kernel.close_syscall(listenfd), 0);
    }

    #[test]
    pub fn ut_kern_accept_fifo_order() {
        let kernel = test_kernel();

        let listenfd = kernel.socket_syscall(77);
        assert!(listenfd >= 0);
        assert_eq!(kernel.listen_syscall(listenfd), 0);

        // first requester identifies itself with 'a', second with 'b';
        // staggered so their queue order is deterministic
        let kernel2 = kernel.clone();
        let first = interface::helper_thread(move || {
            let fd = kernel2.socket_syscall(NOPORT as i32);
            assert!(fd >= 0);
            assert_eq!(kernel2.connect_syscall(fd, 77, GENEROUS), 0);
            write_all(&kernel2, fd, b"a");
            fd
        });
        interface::sleep(interface::RustDuration::from_millis(100));
        let kernel3 = kernel.clone();
        let second = interface::helper_thread(move || {
            let fd = kernel3.socket_syscall(NOPORT as i32);
            assert!(fd >= 0);
            assert_eq!(kernel3.connect_syscall(fd, 77, GENEROUS), 0);
            write_all(&kernel3, fd, b"b");
            fd
        });
        interface::sleep(interface::RustDuration::from_millis(100));

        let mut byte = [0u8; 1];
        let conn1 = kernel.accept_syscall(listenfd);
        assert!(conn1 >= 0);
        assert_eq!(kernel.read_syscall(conn1, &mut byte), 1);
        assert_eq!(byte[0], b'a');

        let conn2 = kernel.accept_syscall(listenfd);
        assert!(conn2 >= 0);
        assert_eq!(kernel.read_syscall(conn2, &mut byte), 1);
        assert_eq!(byte[0], b'b');

        let fd1 = first.join().unwrap();
        let fd2 = second.join().unwrap();
        for fd in [fd1, fd2, conn1, conn2, listenfd] {
            assert_eq!(kernel.close_syscall(fd), 0);
        }
    }

    #[test]
    pub fn ut_kern_end_to_end_session() {
        let kernel = test_kernel();

        let listenfd = kernel.socket_syscall(7);
        assert!(listenfd >= 0);
        assert_eq!(kernel.listen_syscall(listenfd), 0);

        let kernel2 = kernel.clone();
        let server = interface::helper_thread(move || {
            let connfd = kernel2.accept_syscall(listenfd);
            assert!(connfd >= 0);

            let mut buf = [0u8; 64];
            let count = kernel2.read_syscall(connfd, &mut buf);
            assert_eq!(count, 5);
            assert_eq!(&buf[..5], b"hello");

            write_all(&kernel2, connfd, b"world");

            // hang up both the connection and the listener
            assert_eq!(kernel2.close_syscall(connfd), 0);
            assert_eq!(kernel2.close_syscall(listenfd), 0);
        });

        let clientfd = kernel.socket_syscall(NOPORT as i32);
        assert!(clientfd >= 0);
        assert_eq!(kernel.connect_syscall(clientfd, 7, GENEROUS), 0);

        write_all(&kernel, clientfd, b"hello");

        let mut buf = [0u8; 64];
        assert_eq!(kernel.read_syscall(clientfd, &mut buf), 5);
        assert_eq!(&buf[..5], b"world");

        server.join().unwrap();

        // server side is gone: reads drain to end-of-stream, writes break
        assert_eq!(kernel.read_syscall(clientfd, &mut buf), 0);
        assert_eq!(
            kernel.write_syscall(clientfd, b"anyone?"),
            -(Errno::EPIPE as i32)
        );
        assert_eq!(kernel.close_syscall(clientfd), 0);

        // everything the session allocated has been torn down
        let state = kernel.state.lock();
        assert!(state.fdtable.is_empty());
        assert!(state.channels.is_empty());
        assert!(state.sockets.is_empty());
        assert!(state.requests.is_empty());
    }

    #[test]
    pub fn ut_kern_listener_close_refuses_pending_connects() {
        let kernel = test_kernel();

        let listenfd = kernel.socket_syscall(500);
        assert!(listenfd >= 0);
        assert_eq!(kernel.listen_syscall(listenfd), 0);

        let mut clients = Vec::new();
        for _ in 0..3 {
            let kernel2 = kernel.clone();
            clients.push(interface::helper_thread(move || {
                let fd = kernel2.socket_syscall(NOPORT as i32);
                assert!(fd >= 0);
                let rc = kernel2.connect_syscall(fd, 500, GENEROUS);
                assert_eq!(kernel2.close_syscall(fd), 0);
                rc
            }));
        }

        // let all three queue up, then pull the listener out from under
        // them
        interface::sleep(interface::RustDuration::from_millis(200));
        assert_eq!(kernel.close_syscall(listenfd), 0);

        for client in clients {
            assert_eq!(client.join().unwrap(), -(Errno::ECONNREFUSED as i32));
        }

        let state = kernel.state.lock();
        assert!(state.requests.is_empty());
        assert!(state.sockets.is_empty());
    }

    #[test]
    pub fn ut_kern_listener_close_unblocks_accept() {
        let kernel = test_kernel();

        let listenfd = kernel.socket_syscall(300);
        assert!(listenfd >= 0);
        assert_eq!(kernel.listen_syscall(listenfd), 0);

        let kernel2 = kernel.clone();
        let acceptor = interface::helper_thread(move || kernel2.accept_syscall(listenfd));

        interface::sleep(interface::RustDuration::from_millis(100));
        assert_eq!(kernel.close_syscall(listenfd), 0);

        assert_eq!(acceptor.join().unwrap(), -(Errno::EINVAL as i32));
        assert!(kernel.state.lock().sockets.is_empty());
    }

    #[test]
    pub fn ut_kern_shutdown_write() {
        let kernel = test_kernel();
        let (clientfd, connfd, listenfd) = connected_pair(&kernel, 11);

        // the whole direction is torn down: our writes are refused and the
        // partner observes the vanished channel on its next read
        assert_eq!(kernel.shutdown_syscall(clientfd, SHUTDOWN_WRITE), 0);
        assert_eq!(
            kernel.write_syscall(clientfd, b"more"),
            -(Errno::ENOTCONN as i32)
        );

        let mut buf = [0u8; 32];
        assert_eq!(
            kernel.read_syscall(connfd, &mut buf),
            -(Errno::EBADF as i32)
        );

        // the opposite direction still works
        write_all(&kernel, connfd, b"still here");
        assert_eq!(kernel.read_syscall(clientfd, &mut buf), 10);

        for fd in [clientfd, connfd, listenfd] {
            assert_eq!(kernel.close_syscall(fd), 0);
        }
    }

    #[test]
    pub fn ut_kern_shutdown_read_and_both() {
        let kernel = test_kernel();
        let (clientfd, connfd, listenfd) = connected_pair(&kernel, 12);

        assert_eq!(kernel.shutdown_syscall(clientfd, SHUTDOWN_READ), 0);
        let mut buf = [0u8; 8];
        assert_eq!(
            kernel.read_syscall(clientfd, &mut buf),
            -(Errno::ENOTCONN as i32)
        );
        // the partner's writes hit a vacated channel
        assert_eq!(
            kernel.write_syscall(connfd, b"unheard"),
            -(Errno::EPIPE as i32)
        );

        assert_eq!(kernel.shutdown_syscall(clientfd, SHUTDOWN_BOTH), 0);
        assert_eq!(
            kernel.write_syscall(clientfd, b"x"),
            -(Errno::ENOTCONN as i32)
        );
        assert_eq!(
            kernel.read_syscall(connfd, &mut buf),
            -(Errno::EBADF as i32)
        );

        // modes outside the three valid ones are rejected, and a listener
        // has nothing to shut down
        assert_eq!(
            kernel.shutdown_syscall(clientfd, 0),
            -(Errno::EINVAL as i32)
        );
        assert_eq!(
            kernel.shutdown_syscall(listenfd, SHUTDOWN_BOTH),
            -(Errno::ENOTCONN as i32)
        );

        for fd in [clientfd, connfd, listenfd] {
            assert_eq!(kernel.close_syscall(fd), 0);
        }
        assert!(kernel.state.lock().channels.is_empty());
    }

    #[test]
    pub fn ut_kern_stream_ops_on_unconnected_socket() {
        let kernel = test_kernel();

        let clientfd = kernel.socket_syscall(NOPORT as i32);
        assert!(clientfd >= 0);
        let listenfd = kernel.socket_syscall(13);
        assert!(listenfd >= 0);
        assert_eq!(kernel.listen_syscall(listenfd), 0);

        let mut buf = [0u8; 8];
        assert_eq!(
            kernel.read_syscall(clientfd, &mut buf),
            -(Errno::EINVAL as i32)
        );
        assert_eq!(
            kernel.write_syscall(clientfd, b"x"),
            -(Errno::EINVAL as i32)
        );
        assert_eq!(
            kernel.read_syscall(listenfd, &mut buf),
            -(Errno::EINVAL as i32)
        );
        assert_eq!(
            kernel.write_syscall(listenfd, b"x"),
            -(Errno::EINVAL as i32)
        );

        // connect through a descriptor already past Unbound is rejected
        assert_eq!(
            kernel.connect_syscall(listenfd, 13, GENEROUS),
            -(Errno::EINVAL as i32)
        );

        assert_eq!(kernel.close_syscall(clientfd), 0);
        assert_eq!(kernel.close_syscall(listenfd), 0);
    }

    #[test]
    pub fn ut_kern_close_during_connect_leaks_nothing() {
        let kernel = test_kernel();

        let listenfd = kernel.socket_syscall(61);
        assert!(listenfd >= 0);
        assert_eq!(kernel.listen_syscall(listenfd), 0);

        let clientfd = kernel.socket_syscall(NOPORT as i32);
        assert!(clientfd >= 0);

        let kernel2 = kernel.clone();
        let client =
            interface::helper_thread(move || kernel2.connect_syscall(clientfd, 61, GENEROUS));

        // pull the descriptor out from under the blocked connect; the
        // socket itself survives on the connect's share
        interface::sleep(interface::RustDuration::from_millis(100));
        assert_eq!(kernel.close_syscall(clientfd), 0);

        // the queued request is still claimable, so the rendezvous
        // completes even though the requester has no descriptor left
        let connfd = kernel.accept_syscall(listenfd);
        assert!(connfd >= 0);
        assert_eq!(client.join().unwrap(), 0);

        // the connect's final share release tears down its channel ends,
        // so the acceptor sees a hung-up partner, not a silent one
        let mut buf = [0u8; 8];
        assert_eq!(kernel.read_syscall(connfd, &mut buf), 0);
        assert_eq!(kernel.write_syscall(connfd, b"x"), -(Errno::EPIPE as i32));

        assert_eq!(kernel.close_syscall(connfd), 0);
        assert_eq!(kernel.close_syscall(listenfd), 0);

        let state = kernel.state.lock();
        assert!(state.channels.is_empty());
        assert!(state.sockets.is_empty());
        assert!(state.requests.is_empty());
    }

    #[test]
    pub fn ut_kern_accept_exhausted_passes_wakeup_on() {
        let kernel = test_kernel();

        let listenfd = kernel.socket_syscall(62);
        assert!(listenfd >= 0);
        assert_eq!(kernel.listen_syscall(listenfd), 0);

        let clientfd = kernel.socket_syscall(NOPORT as i32);
        assert!(clientfd >= 0);

        // burn every remaining descriptor slot
        let mut burned = Vec::new();
        loop {
            let fd = kernel.socket_syscall(NOPORT as i32);
            if fd < 0 {
                assert_eq!(fd, -(Errno::EMFILE as i32));
                break;
            }
            burned.push(fd);
        }

        // two acceptors park on the empty queue
        let kernel2 = kernel.clone();
        let first = interface::helper_thread(move || kernel2.accept_syscall(listenfd));
        let kernel3 = kernel.clone();
        let second = interface::helper_thread(move || kernel3.accept_syscall(listenfd));
        interface::sleep(interface::RustDuration::from_millis(100));

        // the connect wakes one acceptor; with no descriptor slot it
        // pushes the request back, and the second acceptor must observe
        // the pushed-back request too instead of sleeping through it
        let kernel4 = kernel.clone();
        let client =
            interface::helper_thread(move || kernel4.connect_syscall(clientfd, 62, GENEROUS));

        assert_eq!(first.join().unwrap(), -(Errno::EMFILE as i32));
        assert_eq!(second.join().unwrap(), -(Errno::EMFILE as i32));

        // the request survived both bounced accepts; once slots free up
        // the rendezvous completes inside the client's wait budget
        for _ in 0..4 {
            assert_eq!(kernel.close_syscall(burned.pop().unwrap()), 0);
        }
        let connfd = kernel.accept_syscall(listenfd);
        assert!(connfd >= 0);
        assert_eq!(client.join().unwrap(), 0);

        for fd in burned {
            assert_eq!(kernel.close_syscall(fd), 0);
        }
        for fd in [clientfd, connfd, listenfd] {
            assert_eq!(kernel.close_syscall(fd), 0);
        }
    }

    // Builds a listener on `port`, connects a client through a helper
    // thread and accepts it, returning (client fd, acceptor fd, listener fd).
    fn connected_pair(kernel: &interface::RustRfc<crate::kernel::kernel::Kernel>, port: i32) -> (i32, i32, i32) {
        let listenfd = kernel.socket_syscall(port);
        assert!(listenfd >= 0);
        assert_eq!(kernel.listen_syscall(listenfd), 0);

        let kernel2 = kernel.clone();
        let client = interface::helper_thread(move || {
            let fd = kernel2.socket_syscall(NOPORT as i32);
            assert!(fd >= 0);
            assert_eq!(kernel2.connect_syscall(fd, port, GENEROUS), 0);
            fd
        });

        let connfd = kernel.accept_syscall(listenfd);
        assert!(connfd >= 0);
        let clientfd = client.join().unwrap();
        (clientfd, connfd, listenfd)
    }
}
