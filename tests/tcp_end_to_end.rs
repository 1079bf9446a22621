//! End-to-end shipping over real loopback sockets with plain TCP.

use std::{
    net::TcpListener,
    thread,
    time::{Duration, Instant},
};

use logship::{ShipperBuilder, ShippingManager, TcpConnector, Token};
use rstest::{fixture, rstest};

mod test_utils;
use test_utils::LocalCollector;

const WAIT: Duration = Duration::from_secs(10);

#[fixture]
fn token() -> Token {
    Token::new("abc").expect("valid token")
}

fn plain_builder(port: u16) -> ShipperBuilder {
    ShipperBuilder::new()
        .with_collector("127.0.0.1", port)
        .without_tls()
        .with_reconnect_pause_ms(20)
        .with_backoff_base_ms(5)
        .with_backoff_cap_ms(20)
        .with_strict_ordering()
}

fn start(port: u16) -> ShippingManager<TcpConnector> {
    plain_builder(port).build().expect("manager starts")
}

#[rstest]
fn ships_exact_wire_format(token: Token) {
    let collector = LocalCollector::start();
    let manager = start(collector.addr().port());
    manager.send(&token, "line1\r\nline2").expect("accepted");
    manager.close();

    let mut expected = b"abc".to_vec();
    expected.extend_from_slice("line1\u{2028}line2".as_bytes());
    expected.push(b'\n');
    assert_eq!(collector.wait_for_bytes(expected.len(), WAIT), expected);
    assert_eq!(collector.connections(), 1);
}

#[rstest]
fn preserves_order_of_many_entries(token: Token) {
    let collector = LocalCollector::start();
    let manager = start(collector.addr().port());
    let mut expected = Vec::new();
    for i in 0..500 {
        let text = format!("entry {i} {}", "x".repeat(i % 97));
        expected.extend_from_slice(b"abc");
        expected.extend_from_slice(text.as_bytes());
        expected.push(b'\n');
        manager.send(&token, text).expect("accepted");
    }
    manager.close();
    assert_eq!(collector.wait_for_bytes(expected.len(), WAIT), expected);
}

#[rstest]
fn entry_larger_than_buffer_arrives_intact(token: Token) {
    let collector = LocalCollector::start();
    let manager = plain_builder(collector.addr().port())
        .with_buffer_size(64)
        .with_staging_chars(7)
        .build()
        .expect("manager starts");
    let text = "é😀 long entry ".repeat(200);
    manager.send(&token, text.clone()).expect("accepted");
    manager.close();

    let expected = format!("abc{text}\n").into_bytes();
    assert_eq!(collector.wait_for_bytes(expected.len(), WAIT), expected);
}

#[rstest]
fn connects_once_collector_comes_up(token: Token) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("reserve port");
    let addr = listener.local_addr().expect("address");
    drop(listener);

    let manager = start(addr.port());
    manager.send(&token, "late collector").expect("accepted");
    thread::sleep(Duration::from_millis(100));

    let listener = TcpListener::bind(addr).expect("rebind reserved port");
    let collector = LocalCollector::serve(listener);
    let expected = b"abclate collector\n".to_vec();
    assert_eq!(collector.wait_for_bytes(expected.len(), WAIT), expected);
    manager.close();
}

#[rstest]
fn close_returns_promptly_when_collector_is_down(token: Token) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("reserve port");
    let port = listener.local_addr().expect("address").port();
    drop(listener);

    let manager = plain_builder(port)
        .with_reconnect_pause_ms(1000)
        .build()
        .expect("manager starts");
    for i in 0..3 {
        manager.send(&token, format!("lost {i}")).expect("accepted");
    }
    let started = Instant::now();
    manager.close();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(manager.send(&token, "after").is_err());
}
