use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use log::{debug, error, warn};
use serialport::SerialPort;

use crate::error::{LinkError, LinkResult};
use crate::port::open_port;

/// Completed frames the listener may queue before it starts dropping them.
pub const RX_QUEUE_DEPTH: usize = 8;

/// Longest line the listener accumulates without seeing a close delimiter.
pub const MAX_LINE: usize = 4096;

/// A half-duplex byte line.
///
/// `read` hands back one complete delimited buffer; `write` never waits for an answer.
pub trait Transport: Send {
    /// Bring the line up. Returns whether it ended up open.
    fn open(&mut self) -> bool;

    fn is_open(&self) -> bool;

    /// Wait at most `timeout` for the next complete buffer.
    fn read(&mut self, timeout: Duration) -> LinkResult<Vec<u8>>;

    /// Transmit `bytes`; `false` if the line is closed or the write failed.
    fn write(&mut self, bytes: &[u8]) -> bool;

    /// Drop buffers that arrived after their reader gave up. Returns how many.
    fn discard_pending(&mut self) -> usize;

    /// Release the line. Safe to call more than once.
    fn close(&mut self);
}

/// Wait on `rx` for one buffer, mapping expiry to `LinkError::Timeout`.
pub(crate) fn recv_bounded(rx: &Receiver<Vec<u8>>, timeout: Duration) -> LinkResult<Vec<u8>> {
    match rx.recv_timeout(timeout) {
        Ok(buf) => Ok(buf),
        Err(RecvTimeoutError::Timeout) => Err(LinkError::Timeout(timeout)),
        Err(RecvTimeoutError::Disconnected) => {
            Err(LinkError::Transport("listener stopped".into()))
        }
    }
}

pub(crate) fn drain(rx: &Receiver<Vec<u8>>) -> usize {
    let stale = rx.try_iter().count();
    if stale > 0 {
        warn!("[link] discarded {} late frame(s)", stale);
    }
    stale
}

/// Splits a byte stream into close-delimited buffers.
#[derive(Debug)]
pub struct LineSplitter {
    close: &'static [u8],
    acc: Vec<u8>,
}

impl LineSplitter {
    pub fn new(close: &'static [u8]) -> Self {
        Self {
            close,
            acc: Vec::new(),
        }
    }

    /// Feed bytes and collect every buffer completed by them, delimiter included.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        self.acc.extend_from_slice(bytes);
        let mut done = Vec::new();
        while let Some(pos) = self
            .acc
            .windows(self.close.len())
            .position(|w| w == self.close)
        {
            let end = pos + self.close.len();
            done.push(self.acc.drain(..end).collect());
        }
        if self.acc.len() > MAX_LINE {
            warn!("[link] no delimiter in {} bytes, dropping", self.acc.len());
            self.acc.clear();
        }
        done
    }
}

/// Background reader thread and the flag that asks it to stop.
struct Listener {
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Listener {
    fn spawn<F>(name: String, body: F) -> LinkResult<Self>
    where
        F: FnOnce(&AtomicBool) + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let handle = std::thread::Builder::new()
            .name(name)
            .spawn(move || body(&*flag))
            .map_err(|e| LinkError::Transport(format!("spawn listener: {}", e)))?;
        Ok(Self { running, handle })
    }

    /// False once the thread has returned, whether asked to or after a read error.
    fn is_alive(&self) -> bool {
        !self.handle.is_finished()
    }

    fn stop(self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.handle.join();
    }
}

/// Serial line with a background listener feeding a bounded queue.
pub struct SerialTransport {
    dev: String,
    baud: u32,
    close_delim: &'static [u8],
    port: Option<Box<dyn SerialPort>>,
    rx: Option<Receiver<Vec<u8>>>,
    listener: Option<Listener>,
}

impl SerialTransport {
    pub fn new(dev: impl Into<String>, baud: u32, close_delim: &'static [u8]) -> Self {
        Self {
            dev: dev.into(),
            baud,
            close_delim,
            port: None,
            rx: None,
            listener: None,
        }
    }

    pub fn dev(&self) -> &str {
        &self.dev
    }

    fn try_open(&mut self) -> LinkResult<()> {
        let port = open_port(&self.dev, self.baud)?;
        let reader = port
            .try_clone()
            .map_err(|e| LinkError::Transport(format!("clone {}: {}", self.dev, e)))?;
        let (tx, rx) = bounded(RX_QUEUE_DEPTH);
        let close = self.close_delim;
        let dev = self.dev.clone();
        let listener = Listener::spawn(format!("listen {}", self.dev), move |running| {
            listen(reader, tx, running, close, &dev)
        })?;
        self.port = Some(port);
        self.rx = Some(rx);
        self.listener = Some(listener);
        Ok(())
    }
}

fn listen(
    mut port: Box<dyn SerialPort>,
    tx: Sender<Vec<u8>>,
    running: &AtomicBool,
    close: &'static [u8],
    dev: &str,
) {
    let mut splitter = LineSplitter::new(close);
    let mut buf = [0u8; 256];
    while running.load(Ordering::SeqCst) {
        let n = match port.read(&mut buf) {
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::TimedOut => continue,
            Err(e) => {
                error!("[link] {} read: {}", dev, e);
                break;
            }
        };
        for frame in splitter.push(&buf[..n]) {
            debug!("[link] {} rx {} bytes", dev, frame.len());
            match tx.try_send(frame) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => warn!("[link] {} rx queue full, frame dropped", dev),
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }
}

impl Transport for SerialTransport {
    /// Also rebuilds a port whose listener died, e.g. after the adapter was unplugged.
    fn open(&mut self) -> bool {
        if self.is_open() {
            return true;
        }
        if self.listener.is_some() {
            warn!("[link] {} listener stopped, reopening", self.dev);
            self.close();
        }
        match self.try_open() {
            Ok(()) => true,
            Err(e) => {
                error!("[link] {}", e);
                false
            }
        }
    }

    fn is_open(&self) -> bool {
        self.port.is_some() && self.listener.as_ref().is_some_and(Listener::is_alive)
    }

    fn read(&mut self, timeout: Duration) -> LinkResult<Vec<u8>> {
        let rx = self
            .rx
            .as_ref()
            .ok_or_else(|| LinkError::Transport(format!("{} not open", self.dev)))?;
        recv_bounded(rx, timeout)
    }

    fn write(&mut self, bytes: &[u8]) -> bool {
        if !self.is_open() {
            return false;
        }
        let Some(port) = self.port.as_mut() else {
            return false;
        };
        match port.write_all(bytes).and_then(|_| port.flush()) {
            Ok(()) => true,
            Err(e) => {
                error!("[link] {} write: {}", self.dev, e);
                false
            }
        }
    }

    fn discard_pending(&mut self) -> usize {
        self.rx.as_ref().map(drain).unwrap_or(0)
    }

    fn close(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.stop();
        }
        self.rx = None;
        self.port = None;
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splitter_handles_fragments() {
        let mut s = LineSplitter::new(b"\r\n");
        assert!(s.push(b":00").is_empty());
        assert!(s.push(b"01\r").is_empty());
        assert_eq!(s.push(b"\n:ff"), vec![b":0001\r\n".to_vec()]);
        assert_eq!(s.push(b"\r\n"), vec![b":ff\r\n".to_vec()]);
    }

    #[test]
    fn splitter_emits_back_to_back_lines() {
        let mut s = LineSplitter::new(b"\n");
        let out = s.push(b":01\n:02\n:0");
        assert_eq!(out, vec![b":01\n".to_vec(), b":02\n".to_vec()]);
    }

    #[test]
    fn bounded_recv_times_out() {
        let (_tx, rx) = bounded::<Vec<u8>>(1);
        let start = std::time::Instant::now();
        let err = recv_bounded(&rx, Duration::from_millis(30)).unwrap_err();
        assert!(err.is_timeout());
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn closed_serial_transport_refuses_io() {
        let mut t = SerialTransport::new("/dev/null-not-a-port", 115_200, b"\r\n");
        assert!(!t.is_open());
        assert!(!t.write(b":00\r\n"));
        assert!(matches!(
            t.read(Duration::from_millis(1)),
            Err(LinkError::Transport(_))
        ));
        t.close();
        t.close();
    }

    fn wait_until_dead(l: &Listener) {
        let start = std::time::Instant::now();
        while l.is_alive() {
            assert!(start.elapsed() < Duration::from_secs(2), "listener never exited");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn listener_stops_on_request() {
        let l = Listener::spawn("spin".into(), |running| {
            while running.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(1));
            }
        })
        .unwrap();
        assert!(l.is_alive());
        l.stop();
    }

    #[test]
    fn dead_listener_means_closed_and_is_torn_down_on_open() {
        // listener that returned on its own, as after a read error
        let l = Listener::spawn("gone".into(), |_| {}).unwrap();
        wait_until_dead(&l);

        let mut t = SerialTransport::new("/dev/null-not-a-port", 115_200, b"\r\n");
        let (_tx, rx) = bounded(1);
        t.rx = Some(rx);
        t.listener = Some(l);
        assert!(!t.is_open());
        assert!(!t.write(b":00\r\n"));

        // reopen discards the dead listener before retrying the device
        assert!(!t.open());
        assert!(t.listener.is_none());
        assert!(t.rx.is_none());
    }
}
