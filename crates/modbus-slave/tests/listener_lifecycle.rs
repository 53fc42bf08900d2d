//! Integration tests for the TCP slave lifecycle.
//!
//! Each test runs a real `ListenerService` on a loopback port with the echo
//! stack and drives it with plain `TcpStream` clients.

use std::error::Error;
use std::io::{ErrorKind, Read, Write};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use modbus_slave::application::loopback::LoopbackStack;
use modbus_slave::{ListenerService, SlaveError, SlaveService, TcpSlaveConfig};
use modbus_slave_core::{ExceptionHandler, FramingMode};
use parking_lot::Mutex;

#[derive(Default)]
struct Recorder(Mutex<Vec<String>>);

impl ExceptionHandler for Recorder {
    fn received_exception(&self, error: &(dyn Error + 'static)) {
        self.0.lock().push(error.to_string());
    }
}

fn loopback_config() -> TcpSlaveConfig {
    TcpSlaveConfig {
        bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        ..TcpSlaveConfig::default()
    }
}

/// Starts `service` on a background thread and waits until it is bound.
fn spawn(service: &Arc<ListenerService>) -> (SocketAddr, JoinHandle<Result<(), SlaveError>>) {
    let runner = Arc::clone(service);
    let thread = std::thread::spawn(move || runner.start());
    let started = Instant::now();
    loop {
        if let Some(addr) = service.local_addr() {
            return (addr, thread);
        }
        assert!(
            started.elapsed() < Duration::from_secs(2),
            "listener did not bind in time"
        );
        std::thread::sleep(Duration::from_millis(5));
    }
}

fn wait_for(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let started = Instant::now();
    while started.elapsed() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}

/// True once `client` observes end-of-stream (or a reset) from the slave.
fn sees_close(client: &mut TcpStream, within: Duration) -> bool {
    client.set_read_timeout(Some(within)).unwrap();
    let mut buf = [0u8; 16];
    match client.read(&mut buf) {
        Ok(0) => true,
        Ok(_) => false,
        Err(e) => matches!(
            e.kind(),
            ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted
        ),
    }
}

#[test]
fn test_stop_releases_port_for_next_start() {
    // Arrange
    let first = Arc::new(ListenerService::new(loopback_config(), Arc::new(LoopbackStack)));
    let (addr, thread) = spawn(&first);

    // Act
    first.stop();
    assert!(thread.join().unwrap().is_ok());

    // Assert: a fresh service binds the very same port.
    let second = Arc::new(ListenerService::new(
        TcpSlaveConfig {
            port: addr.port(),
            ..loopback_config()
        },
        Arc::new(LoopbackStack),
    ));
    let (again, thread) = spawn(&second);
    assert_eq!(again.port(), addr.port());
    second.stop();
    assert!(thread.join().unwrap().is_ok());
}

#[test]
fn test_service_can_be_restarted() {
    let service = Arc::new(ListenerService::new(loopback_config(), Arc::new(LoopbackStack)));

    for _ in 0..2 {
        let (addr, thread) = spawn(&service);
        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(&[0x42]).unwrap();
        let mut reply = [0u8; 1];
        client.read_exact(&mut reply).unwrap();
        assert_eq!(reply, [0x42]);

        service.stop();
        assert!(thread.join().unwrap().is_ok());
        assert_eq!(service.local_addr(), None);
    }
}

#[test]
fn test_silent_encapsulated_client_disappears_after_disconnect() {
    // Arrange: encapsulated framing, no I/O log.
    let service = Arc::new(ListenerService::new(
        TcpSlaveConfig {
            framing: FramingMode::Encapsulated,
            ..loopback_config()
        },
        Arc::new(LoopbackStack),
    ));
    let (addr, thread) = spawn(&service);
    let client = TcpStream::connect(addr).unwrap();
    assert!(wait_for(Duration::from_secs(2), || service.connection_count() == 1));

    // Act
    drop(client);

    // Assert
    assert!(
        wait_for(Duration::from_secs(1), || service.connection_count() == 0),
        "connection still registered one second after the peer left"
    );
    service.stop();
    assert!(thread.join().unwrap().is_ok());
}

#[test]
fn test_stop_closes_every_live_connection() {
    // Arrange
    let service = Arc::new(ListenerService::new(loopback_config(), Arc::new(LoopbackStack)));
    let (addr, thread) = spawn(&service);
    let mut clients: Vec<TcpStream> = (0..3).map(|_| TcpStream::connect(addr).unwrap()).collect();
    assert!(wait_for(Duration::from_secs(2), || service.connection_count() == 3));

    // Act
    let stopping = Instant::now();
    service.stop();

    // Assert
    assert_eq!(service.connection_count(), 0);
    for client in &mut clients {
        assert!(sees_close(client, Duration::from_secs(3)));
    }
    assert!(stopping.elapsed() < Duration::from_secs(4));
    assert!(thread.join().unwrap().is_ok());
    assert!(TcpStream::connect(addr).is_err());
}

#[test]
fn test_echo_is_traced_to_default_file_in_log_directory() {
    // Arrange
    let dir = tempfile::tempdir().unwrap();
    let service = Arc::new(ListenerService::new(
        TcpSlaveConfig {
            log_path: Some(dir.path().to_path_buf()),
            ..loopback_config()
        },
        Arc::new(LoopbackStack),
    ));
    let (addr, thread) = spawn(&service);
    let mut client = TcpStream::connect(addr).unwrap();

    // Act
    client.write_all(&[0x01, 0x03, 0x00, 0x10]).unwrap();
    let mut reply = [0u8; 4];
    client.read_exact(&mut reply).unwrap();
    service.stop();
    thread.join().unwrap().unwrap();

    // Assert
    assert_eq!(reply, [0x01, 0x03, 0x00, 0x10]);
    let content = std::fs::read_to_string(dir.path().join("modbus_tcp_s.log")).unwrap();
    assert_eq!(traced(&content, "I"), "01030010", "{content}");
    assert_eq!(traced(&content, "O"), "01030010", "{content}");
}

/// Concatenated hex of every line traced in `direction`.
fn traced(content: &str, direction: &str) -> String {
    let marker = format!(" {direction} ");
    content
        .lines()
        .filter_map(|line| line.split_once(marker.as_str()).map(|(_, hex)| hex))
        .collect()
}

#[test]
fn test_connections_beyond_limit_are_refused_and_reported() {
    // Arrange
    let recorder = Arc::new(Recorder::default());
    let service = Arc::new(
        ListenerService::new(
            TcpSlaveConfig {
                max_connections: Some(1),
                ..loopback_config()
            },
            Arc::new(LoopbackStack),
        )
        .with_exception_handler(recorder.clone()),
    );
    let (addr, thread) = spawn(&service);
    let _first = TcpStream::connect(addr).unwrap();
    assert!(wait_for(Duration::from_secs(2), || service.connection_count() == 1));

    // Act
    let mut second = TcpStream::connect(addr).unwrap();

    // Assert
    assert!(sees_close(&mut second, Duration::from_secs(2)));
    assert_eq!(service.connection_count(), 1);
    assert!(wait_for(Duration::from_secs(1), || {
        recorder
            .0
            .lock()
            .iter()
            .any(|m| m.starts_with("connection limit of 1 reached"))
    }));
    service.stop();
    assert!(thread.join().unwrap().is_ok());
}

#[test]
fn test_unwritable_log_path_does_not_block_the_connection() {
    // Arrange: a regular file stands where the log's parent directory should be.
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"file").unwrap();
    let recorder = Arc::new(Recorder::default());
    let service = Arc::new(
        ListenerService::new(
            TcpSlaveConfig {
                log_path: Some(blocker.join("trace.log")),
                ..loopback_config()
            },
            Arc::new(LoopbackStack),
        )
        .with_exception_handler(recorder.clone()),
    );
    let (addr, thread) = spawn(&service);

    // Act
    let mut client = TcpStream::connect(addr).unwrap();
    client.write_all(&[0x07]).unwrap();
    let mut reply = [0u8; 1];
    client.read_exact(&mut reply).unwrap();

    // Assert
    assert_eq!(reply, [0x07]);
    assert!(recorder
        .0
        .lock()
        .iter()
        .any(|m| m.starts_with("cannot open I/O log at")));
    service.stop();
    assert!(thread.join().unwrap().is_ok());
}

/// Writes one byte and expects it echoed back.
fn echoes(client: &mut TcpStream, byte: u8) -> bool {
    client.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    client.write_all(&[byte]).unwrap();
    let mut reply = [0u8; 1];
    client.read_exact(&mut reply).is_ok() && reply == [byte]
}

#[test]
fn test_small_worker_pool_refuses_instead_of_starving_connections() {
    // Arrange: three workers only fit one connection (supervisor + reader).
    let recorder = Arc::new(Recorder::default());
    let service = Arc::new(
        ListenerService::new(
            TcpSlaveConfig {
                max_workers: 3,
                ..loopback_config()
            },
            Arc::new(LoopbackStack),
        )
        .with_exception_handler(recorder.clone()),
    );
    let (addr, thread) = spawn(&service);
    let mut first = TcpStream::connect(addr).unwrap();
    assert!(echoes(&mut first, 0x01));

    // Act
    let mut second = TcpStream::connect(addr).unwrap();

    // Assert: the extra peer is closed and reported, not left unserved.
    assert!(sees_close(&mut second, Duration::from_secs(2)));
    assert!(wait_for(Duration::from_secs(1), || {
        recorder
            .0
            .lock()
            .iter()
            .any(|m| m.starts_with("connection limit of 1 reached"))
    }));
    assert_eq!(service.connection_count(), 1);

    // Assert: once the first peer leaves, its slot is freed and reused.
    drop(first);
    assert!(
        wait_for(Duration::from_secs(1), || service.connection_count() == 0),
        "connection still registered one second after the peer left"
    );
    let mut third = TcpStream::connect(addr).unwrap();
    assert!(echoes(&mut third, 0x03));
    drop(third);
    assert!(wait_for(Duration::from_secs(1), || service.connection_count() == 0));

    service.stop();
    assert!(thread.join().unwrap().is_ok());
}
