//! Integration tests for cuewire-osc

use cuewire_osc::{
    encode, Handler, ListenerGroup, MappingEntry, OscSender, OscServer, OscValue, QueuePolicy,
    ReceiverConfig, SenderConfig, ServerState,
};
use std::net::UdpSocket;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn start_server() -> (OscServer, u16) {
    init_tracing();
    let server = OscServer::bind(ReceiverConfig::localhost(0)).expect("Failed to bind");
    let port = server.local_addr().expect("Server not running").port();
    (server, port)
}

fn wait_for_pending(server: &OscServer, count: usize) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while server.pending() < count && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_int_message_end_to_end() {
    let (mut server, port) = start_server();
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    server.registry().on_int("/test", move |v| {
        sink.lock().unwrap().push(v);
        Ok(())
    });

    // /test ,i 42 written out by hand
    let client = UdpSocket::bind("127.0.0.1:0").unwrap();
    let datagram = [
        b'/', b't', b'e', b's', b't', 0, 0, 0, b',', b'i', 0, 0, 0x00, 0x00, 0x00, 0x2A,
    ];
    client.send_to(&datagram, ("127.0.0.1", port)).unwrap();

    wait_for_pending(&server, 1);
    let report = server.poll();
    assert_eq!(report.messages, 1);
    assert_eq!(*received.lock().unwrap(), vec![42]);
}

#[test]
fn test_sender_to_server() {
    let (mut server, port) = start_server();
    let log = Arc::new(Mutex::new(Vec::new()));

    let l = log.clone();
    server.registry().on_float("/light/level", move |v| {
        l.lock().unwrap().push(format!("level {v}"));
        Ok(())
    });
    let l = log.clone();
    server.registry().on_string("/scene", move |v| {
        l.lock().unwrap().push(format!("scene {v}"));
        Ok(())
    });

    let sender = OscSender::connect(SenderConfig::new("127.0.0.1", port)).unwrap();
    sender.send_value("/light/level", 0.5f32).unwrap();
    sender.send_command("/scene:finale").unwrap();

    wait_for_pending(&server, 2);
    server.poll();
    assert_eq!(*log.lock().unwrap(), vec!["level 0.5", "scene finale"]);
}

#[test]
fn test_trigger_only_reaches_trigger_handlers() {
    let (mut server, port) = start_server();
    let log = Arc::new(Mutex::new(Vec::new()));

    let l = log.clone();
    server.registry().on_float("/cue/next", move |v| {
        l.lock().unwrap().push(format!("float {v}"));
        Ok(())
    });
    let l = log.clone();
    server.registry().on_trigger("/cue/next", move || {
        l.lock().unwrap().push("trigger".to_string());
        Ok(())
    });

    let client = UdpSocket::bind("127.0.0.1:0").unwrap();
    let t = [b'/', b'c', b'u', b'e', b'/', b'n', b'e', b'x', b't', 0, 0, 0, b',', b'T', 0, 0];
    client.send_to(&t, ("127.0.0.1", port)).unwrap();

    wait_for_pending(&server, 1);
    let report = server.poll();
    assert_eq!(*log.lock().unwrap(), vec!["trigger"]);
    assert_eq!(report.invoked, 1);
    assert_eq!(report.skipped, 1);
}

#[test]
fn test_address_only_send_fires_trigger_handlers() {
    let (mut server, port) = start_server();
    let log = Arc::new(Mutex::new(Vec::new()));

    let l = log.clone();
    server.registry().on_trigger("/button/tripleTap", move || {
        l.lock().unwrap().push("trigger".to_string());
        Ok(())
    });
    let l = log.clone();
    server.registry().on_float("/button/tripleTap", move |v| {
        l.lock().unwrap().push(format!("float {v}"));
        Ok(())
    });

    let sender = OscSender::connect(SenderConfig::new("127.0.0.1", port)).unwrap();
    assert!(sender.send("/button/tripleTap").unwrap());

    wait_for_pending(&server, 1);
    let report = server.poll();
    assert_eq!(*log.lock().unwrap(), vec!["trigger", "float 0"]);
    assert_eq!(report.invoked, 2);
    assert_eq!(report.skipped, 0);
}

#[test]
fn test_static_then_dynamic_over_the_wire() {
    init_tracing();
    let mut server = OscServer::new(ReceiverConfig::localhost(0));
    let log = Arc::new(Mutex::new(Vec::new()));

    let l = log.clone();
    server.add_mapping(MappingEntry::new(
        "/door",
        Handler::int(move |v| {
            l.lock().unwrap().push(format!("static {v}"));
            Ok(())
        }),
    ));
    let l = log.clone();
    let _group = ListenerGroup::new(server.registry()).with(
        "/door",
        Handler::int(move |v| {
            l.lock().unwrap().push(format!("dynamic {v}"));
            Ok(())
        }),
    );

    let addr = server.start().unwrap();
    let sender = OscSender::connect(SenderConfig::new("127.0.0.1", addr.port())).unwrap();
    sender.send_value("/door", 3).unwrap();

    wait_for_pending(&server, 1);
    server.poll();
    assert_eq!(*log.lock().unwrap(), vec!["static 3", "dynamic 3"]);
}

#[test]
fn test_burst_is_delivered_in_order() {
    let (mut server, port) = start_server();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    server.registry().on_int("/burst", move |v| {
        sink.lock().unwrap().push(v);
        Ok(())
    });

    let n = 500;
    let sender = OscSender::connect(SenderConfig::new("127.0.0.1", port)).unwrap();
    for i in 0..n {
        sender.send_value("/burst", i).unwrap();
        if i % 50 == 0 {
            // Give the receive thread a chance so the socket buffer never overflows
            thread::sleep(Duration::from_millis(1));
        }
    }

    let deadline = Instant::now() + Duration::from_secs(3);
    while seen.lock().unwrap().len() < n as usize && Instant::now() < deadline {
        server.poll();
        thread::sleep(Duration::from_millis(2));
    }

    let seen = seen.lock().unwrap();
    assert_eq!(*seen, (0..n).collect::<Vec<_>>());
    assert_eq!(server.pending(), 0);
}

#[test]
fn test_malformed_packets_are_dropped() {
    let (server, port) = start_server();
    let client = UdpSocket::bind("127.0.0.1:0").unwrap();

    client.send_to(b"", ("127.0.0.1", port)).unwrap();
    client.send_to(b"/no-terminator", ("127.0.0.1", port)).unwrap();
    client
        .send_to(b"#bundle\0\0\0\0\0\0\0\0\x01", ("127.0.0.1", port))
        .unwrap();
    client
        .send_to(
            &encode("/ok", Some(&OscValue::Int(1))).unwrap(),
            ("127.0.0.1", port),
        )
        .unwrap();

    wait_for_pending(&server, 1);
    let messages = server.drain();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].address, "/ok");

    let deadline = Instant::now() + Duration::from_secs(1);
    while server.receiver_stats().unwrap().decode_errors < 3 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(server.receiver_stats().unwrap().decode_errors, 3);
}

#[test]
fn test_bounded_queue_drops_newest() {
    init_tracing();
    let config = ReceiverConfig {
        queue_policy: QueuePolicy::DropNewest { capacity: 3 },
        ..ReceiverConfig::localhost(0)
    };
    let server = OscServer::bind(config).unwrap();
    let port = server.local_addr().unwrap().port();

    let sender = OscSender::connect(SenderConfig::new("127.0.0.1", port)).unwrap();
    for i in 0..5 {
        sender.send_value("/q", i).unwrap();
    }

    let deadline = Instant::now() + Duration::from_secs(2);
    while server.receiver_stats().unwrap().datagrams < 5 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }

    let values: Vec<_> = server.drain().into_iter().map(|m| m.value).collect();
    assert_eq!(values, vec![OscValue::Int(0), OscValue::Int(1), OscValue::Int(2)]);
    assert_eq!(server.receiver_stats().unwrap().queue_drops, 2);
}

#[test]
fn test_shutdown_stops_receiving() {
    init_tracing();
    let config = ReceiverConfig {
        join_timeout: Duration::from_millis(500),
        ..ReceiverConfig::localhost(0)
    };
    let mut server = OscServer::bind(config).unwrap();
    let port = server.local_addr().unwrap().port();
    server.shutdown();
    assert_eq!(server.state(), ServerState::Stopped);
    assert!(server.local_addr().is_none());

    // Port is free again once the receive thread has exited
    assert!(UdpSocket::bind(("127.0.0.1", port)).is_ok());
}
