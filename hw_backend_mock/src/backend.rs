use crate::main_loop::MainLoop;
use crate::net::NetworkThread;
use crate::protocol::{OutboundMsg, PortInfo, INBOUND_CAP, OUTBOUND_CAP};
use crate::serial_api::LoopbackSerial;
use crossbeam_channel::{bounded, Sender};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const TICK_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone)]
pub struct MockBackendOptions {
    pub addr: String,
    pub ports: Vec<PortInfo>,
    pub answer_port_listing: bool,
}

impl Default for MockBackendOptions {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:0".to_string(),
            ports: vec![PortInfo {
                name: "COM1".to_string(),
                desc: "Loopback serial port".to_string(),
            }],
            answer_port_listing: true,
        }
    }
}

/// Network thread plus a ticking main loop over a loopback serial port.
pub struct MockBackend {
    net: NetworkThread,
    out_tx: Sender<OutboundMsg>,
    stop: Arc<AtomicBool>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl MockBackend {
    pub fn spawn(options: MockBackendOptions) -> Result<Self, String> {
        let (in_tx, in_rx) = bounded(INBOUND_CAP);
        let (out_tx, out_rx) = bounded(OUTBOUND_CAP);

        let net = NetworkThread::spawn_with_addr(&options.addr, in_tx, out_rx)?;

        let mut main_loop = MainLoop::new(in_rx, out_tx.clone());
        main_loop.set_answer_port_listing(options.answer_port_listing);
        let api = LoopbackSerial::new(options.ports);

        let stop = Arc::new(AtomicBool::new(false));
        let stop_for_thread = Arc::clone(&stop);
        let ticker = thread::spawn(move || {
            while !stop_for_thread.load(Ordering::Relaxed) {
                main_loop.tick(&api);
                thread::sleep(TICK_INTERVAL);
            }
        });

        Ok(Self {
            net,
            out_tx,
            stop,
            ticker: Mutex::new(Some(ticker)),
        })
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.net.listen_addr()
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.listen_addr())
    }

    pub fn connection_count(&self) -> usize {
        self.net.connection_count()
    }

    pub fn kick_client(&self) {
        self.net.kick_client();
    }

    /// Queues a text frame for the active client without any validation.
    pub fn push_raw(&self, text: &str) {
        let _ = self.out_tx.try_send(OutboundMsg::Raw {
            text: text.to_string(),
        });
    }

    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Ok(mut h) = self.ticker.lock() {
            if let Some(h) = h.take() {
                let _ = h.join();
            }
        }
        self.net.shutdown();
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.shutdown();
    }
}
