//! Plain TCP collector capturing every byte it receives.
//!
//! Each accepted connection is read on its own thread until the peer closes
//! it. Bytes are appended to one shared buffer in arrival order.

use std::{
    io::Read,
    net::{SocketAddr, TcpListener},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use parking_lot::Mutex;

pub struct LocalCollector {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<u8>>>,
    connections: Arc<AtomicUsize>,
}

impl LocalCollector {
    /// Bind to an ephemeral loopback port and start accepting.
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind collector");
        Self::serve(listener)
    }

    /// Accept on an already bound listener.
    pub fn serve(listener: TcpListener) -> Self {
        let addr = listener.local_addr().expect("collector address");
        let received = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));
        {
            let received = Arc::clone(&received);
            let connections = Arc::clone(&connections);
            thread::spawn(move || {
                for stream in listener.incoming() {
                    let Ok(mut stream) = stream else {
                        break;
                    };
                    connections.fetch_add(1, Ordering::SeqCst);
                    let received = Arc::clone(&received);
                    thread::spawn(move || {
                        let mut chunk = [0_u8; 4096];
                        while let Ok(read) = stream.read(&mut chunk) {
                            if read == 0 {
                                break;
                            }
                            received.lock().extend_from_slice(&chunk[..read]);
                        }
                    });
                }
            });
        }
        Self {
            addr,
            received,
            connections,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> Vec<u8> {
        self.received.lock().clone()
    }

    /// Wait until at least `len` bytes arrived, returning what was received.
    pub fn wait_for_bytes(&self, len: usize, timeout: Duration) -> Vec<u8> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            let received = self.received();
            if received.len() >= len {
                return received;
            }
            thread::sleep(Duration::from_millis(5));
        }
        self.received()
    }
}
