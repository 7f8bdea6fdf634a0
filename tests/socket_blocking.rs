//! Cross-thread behavior of the blocking-with-timeout socket layer.

mod common;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use syncsock::testing::MockStack;
use syncsock::{Error, SocketAddress, Stack, TcpListener, TcpSocket, UdpSocket};

use common::init_test_logging;

#[test]
fn recv_timeout_is_honored() {
    init_test_logging();
    let stack: Arc<dyn Stack> = MockStack::new();
    let socket = UdpSocket::new();
    socket.open(&stack).unwrap();
    socket.set_timeout(Some(Duration::from_millis(100)));

    let start = Instant::now();
    let mut buf = [0u8; 16];
    assert_eq!(socket.recvfrom(&mut buf), Err(Error::WouldBlock));
    let waited = start.elapsed();
    assert!(waited >= Duration::from_millis(100), "waited {waited:?}");
    assert!(waited < Duration::from_millis(500), "waited {waited:?}");
}

#[test]
fn event_wakes_blocked_recv_before_timeout() {
    init_test_logging();
    let mock = MockStack::new();
    let stack: Arc<dyn Stack> = mock.clone();
    let socket = Arc::new(TcpSocket::new());
    socket.open(&stack).unwrap();
    socket.set_timeout(Some(Duration::from_secs(10)));
    let handle = mock.handle_of_last_open();

    let reader = Arc::clone(&socket);
    let worker = thread::spawn(move || {
        let mut buf = [0u8; 16];
        let n = reader.recv(&mut buf)?;
        Ok::<_, Error>(buf[..n].to_vec())
    });

    thread::sleep(Duration::from_millis(30));
    mock.push_stream_data(handle, b"late data");

    let got = worker.join().unwrap().unwrap();
    assert_eq!(got, b"late data");
}

#[test]
fn close_from_another_thread_unblocks_recv() {
    init_test_logging();
    let stack: Arc<dyn Stack> = MockStack::new();
    let socket = Arc::new(TcpSocket::new());
    socket.open(&stack).unwrap();
    // Infinite timeout: only close can end this wait.
    socket.set_blocking(true);

    let reader = Arc::clone(&socket);
    let worker = thread::spawn(move || {
        let mut buf = [0u8; 16];
        reader.recv(&mut buf)
    });

    thread::sleep(Duration::from_millis(50));
    socket.close().unwrap();
    assert_eq!(worker.join().unwrap(), Err(Error::NoSocket));
}

#[test]
fn concurrent_recv_on_one_socket_is_rejected() {
    init_test_logging();
    let stack: Arc<dyn Stack> = MockStack::new();
    let socket = Arc::new(TcpSocket::new());
    socket.open(&stack).unwrap();
    socket.set_timeout(Some(Duration::from_millis(200)));

    let first = Arc::clone(&socket);
    let worker = thread::spawn(move || {
        let mut buf = [0u8; 16];
        first.recv(&mut buf)
    });

    // Let the first recv park, then race a second one against it.
    thread::sleep(Duration::from_millis(50));
    let mut buf = [0u8; 16];
    assert_eq!(socket.recv(&mut buf), Err(Error::Parameter));

    assert_eq!(worker.join().unwrap(), Err(Error::WouldBlock));
}

#[test]
fn listener_hands_connection_to_new_socket() {
    init_test_logging();
    let mock = MockStack::new();
    let stack: Arc<dyn Stack> = mock.clone();

    let listener = TcpListener::new();
    listener.open(&stack).unwrap();
    let listen_handle = mock.handle_of_last_open();
    listener.bind(&SocketAddress::v4(0, 0, 0, 0, 8080)).unwrap();
    listener.listen(8).unwrap();
    listener.set_timeout(Some(Duration::from_secs(5)));

    let peer = SocketAddress::v4(198, 51, 100, 23, 40001);
    mock.push_incoming_connection(listen_handle, peer);

    let (socket, got_peer) = listener.accept().unwrap();
    assert_eq!(got_peer, peer);

    let conn_handle = mock.handle_of_last_open();
    mock.push_stream_data(conn_handle, b"request");
    let mut buf = [0u8; 16];
    let n = socket.recv(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"request");
}

#[test]
fn reopen_after_close_uses_fresh_handle() {
    init_test_logging();
    let mock = MockStack::new();
    let stack: Arc<dyn Stack> = mock.clone();
    let socket = UdpSocket::new();

    socket.open(&stack).unwrap();
    let first = mock.handle_of_last_open();
    socket.close().unwrap();
    assert!(mock.is_closed(first));

    socket.open(&stack).unwrap();
    let second = mock.handle_of_last_open();
    assert_ne!(first, second);
    socket
        .sendto(&SocketAddress::v4(192, 0, 2, 1, 7), b"x")
        .unwrap();
}
