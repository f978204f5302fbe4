use crate::protocol::PortInfo;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

pub trait SerialApi {
    fn list_ports(&self) -> Vec<PortInfo>;
    fn open(&self, port: &str, baud: u32) -> Result<(), String>;
    fn close(&self);
    fn write(&self, data: &str) -> Result<(), String>;
    /// Next chunk of received data, if any is buffered.
    fn read(&self) -> Option<String>;
}

/// Serial stand-in whose ports echo every write back as received data.
pub struct LoopbackSerial {
    ports: Vec<PortInfo>,
    state: Mutex<LoopbackState>,
}

#[derive(Default)]
struct LoopbackState {
    open: Option<(String, u32)>,
    rx: VecDeque<String>,
}

impl LoopbackSerial {
    pub fn new(ports: Vec<PortInfo>) -> Self {
        Self {
            ports,
            state: Mutex::new(LoopbackState::default()),
        }
    }

    pub fn open_port(&self) -> Option<(String, u32)> {
        self.lock().open.clone()
    }

    fn lock(&self) -> MutexGuard<'_, LoopbackState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SerialApi for LoopbackSerial {
    fn list_ports(&self) -> Vec<PortInfo> {
        self.ports.clone()
    }

    fn open(&self, port: &str, baud: u32) -> Result<(), String> {
        if !self.ports.iter().any(|p| p.name == port) {
            return Err(format!("no such port: {port}"));
        }
        if baud == 0 {
            return Err("baud rate must be positive".to_string());
        }
        let mut state = self.lock();
        state.open = Some((port.to_string(), baud));
        state.rx.clear();
        Ok(())
    }

    fn close(&self) {
        let mut state = self.lock();
        state.open = None;
        state.rx.clear();
    }

    fn write(&self, data: &str) -> Result<(), String> {
        let mut state = self.lock();
        if state.open.is_none() {
            return Err("port not open".to_string());
        }
        state.rx.push_back(data.to_string());
        Ok(())
    }

    fn read(&self) -> Option<String> {
        self.lock().rx.pop_front()
    }
}
