//! rotctld client task
//!
//! `engage` resolves and connects before anything is spawned, so a failed
//! engage leaves no task behind. The task then loops until `running` is
//! cleared: command the pending position, settle, read the position back,
//! publish, and pad the cycle so commanding never takes more than half of
//! the wall time.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::protocol::{self, Command, REPLY_BUFFER_LEN};
use super::shared::DeviceRecord;
use crate::{AzEl, Result, RotorError};

/// Worker pacing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientTiming {
    /// Pause between commanding and reading back
    pub settle: Duration,
    /// Shortest exchange cycle
    pub min_cycle: Duration,
}

impl Default for ClientTiming {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(100),
            min_cycle: Duration::from_millis(700),
        }
    }
}

pub struct DeviceClient {
    shared: Arc<Mutex<DeviceRecord>>,
    wake: Arc<Notify>,
    handle: Option<JoinHandle<()>>,
    peer: String,
}

impl DeviceClient {
    /// Connect to rotctld at `host:port` and start the exchange task
    pub async fn engage(host: &str, port: u16, monitor: bool, timing: ClientTiming) -> Result<Self> {
        let peer = format!("{}:{}", host, port);

        let addr = tokio::net::lookup_host((host, port))
            .await
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| {
                error!("Name resolution of rotctld server {} failed", host);
                RotorError::Resolve(host.to_string())
            })?;

        let stream = TcpStream::connect(addr).await.map_err(|source| {
            error!("Connection to rotctld server at {} failed: {}", peer, source);
            RotorError::Connect {
                host: host.to_string(),
                port,
                source,
            }
        })?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!("TCP_NODELAY on {}: {}", peer, e);
        }
        info!("Connection opened to rotctld at {}", peer);

        let shared = Arc::new(Mutex::new(DeviceRecord::new(monitor)));
        let wake = Arc::new(Notify::new());
        let worker = Worker {
            stream,
            shared: shared.clone(),
            wake: wake.clone(),
            timing,
            peer: peer.clone(),
        };
        let handle = tokio::spawn(worker.run());

        Ok(Self {
            shared,
            wake,
            handle: Some(handle),
            peer,
        })
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Non-blocking exchange for the control tick.
    ///
    /// Returns the record as the task last left it and queues `commanded`,
    /// or `None` when the task holds the lock.
    pub fn try_exchange(&self, commanded: AzEl) -> Option<DeviceRecord> {
        let mut record = self.shared.try_lock()?;
        let seen = *record;
        record.commanded = commanded;
        record.new_target = true;
        Some(seen)
    }

    /// Non-blocking read of the record without queueing a command
    pub fn try_read(&self) -> Option<DeviceRecord> {
        self.shared.try_lock().map(|record| *record)
    }

    pub fn set_monitor(&self, monitor: bool) {
        self.shared.lock().monitor = monitor;
    }

    /// Snapshot of the shared record
    pub fn record(&self) -> DeviceRecord {
        *self.shared.lock()
    }

    /// Handle on the shared record, for holding it from tests
    #[cfg(test)]
    pub(crate) fn shared_record(&self) -> Arc<Mutex<DeviceRecord>> {
        self.shared.clone()
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map_or(false, |h| !h.is_finished())
    }

    /// Stop the rotator, close the session and wait for the task to finish.
    /// No I/O is outstanding once this returns.
    pub async fn disengage(mut self) {
        {
            let mut record = self.shared.lock();
            record.running = false;
            record.stop_motion = true;
        }
        self.wake.notify_one();

        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!("rotctld task for {} ended abnormally: {}", self.peer, e);
            }
        }
        info!("Disengaged from rotctld at {}", self.peer);
    }
}

impl Drop for DeviceClient {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.shared.lock().running = false;
            self.wake.notify_one();
        }
    }
}

struct Worker {
    stream: TcpStream,
    shared: Arc<Mutex<DeviceRecord>>,
    wake: Arc<Notify>,
    timing: ClientTiming,
    peer: String,
}

impl Worker {
    async fn run(mut self) {
        debug!("Starting rotctld client task for {}", self.peer);

        loop {
            let started = Instant::now();
            let (commanded, pending, monitor) = {
                let record = self.shared.lock();
                if !record.running {
                    break;
                }
                (record.commanded, record.new_target, record.monitor)
            };

            let mut io_error = false;
            let mut acknowledged = false;
            if pending && !monitor {
                let reply = self.exchange(Command::SetPosition(commanded)).await;
                match reply.and_then(|r| protocol::parse_status(&r)) {
                    Ok(()) => acknowledged = true,
                    Err(e) => {
                        error!(
                            "rotctld at {} rejected az {:.2} el {:.2}: {}",
                            self.peer, commanded.azimuth_deg, commanded.elevation_deg, e
                        );
                        io_error = true;
                    }
                }
            }

            self.pause(self.timing.settle).await;

            let reading = self
                .exchange(Command::GetPosition)
                .await
                .and_then(|r| protocol::parse_position(&r));
            if let Err(e) = &reading {
                error!("Reading position from rotctld at {} failed: {}", self.peer, e);
                io_error = true;
            }

            {
                let mut record = self.shared.lock();
                if let Ok(pos) = reading {
                    record.actual = Some(pos);
                }
                // A newer command queued meanwhile stays pending
                if acknowledged && record.commanded == commanded {
                    record.new_target = false;
                }
                record.io_error = io_error;
                record.cycles += 1;
            }

            let cycle = started.elapsed().max(self.timing.min_cycle);
            self.pause(cycle).await;
        }

        self.close().await;
        debug!("Stopped rotctld client task for {}", self.peer);
    }

    /// Sleep, returning early when disengage is requested
    async fn pause(&self, duration: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.wake.notified() => {}
        }
    }

    /// Send one command and read one reply with a single read
    async fn exchange(&mut self, command: Command) -> Result<String> {
        let line = command.encode();
        if let Err(e) = self.stream.write_all(line.as_bytes()).await {
            error!("rotctld socket to {} down: {}", self.peer, e);
            return Err(e.into());
        }
        if !command.expects_reply() {
            return Ok(String::new());
        }

        let mut buf = [0u8; REPLY_BUFFER_LEN];
        let n = match self.stream.read(&mut buf).await {
            Ok(n) => n,
            Err(e) => {
                error!("rotctld socket to {} down: {}", self.peer, e);
                return Err(e.into());
            }
        };
        if n == 0 {
            warn!("Got 0 bytes from rotctld at {}", self.peer);
        }
        Ok(String::from_utf8_lossy(&buf[..n]).into_owned())
    }

    async fn close(&mut self) {
        let stop_motion = self.shared.lock().stop_motion;
        if stop_motion {
            let reply = self.exchange(Command::Stop).await;
            if let Err(e) = reply.and_then(|r| protocol::parse_status(&r)) {
                error!("rotctld at {} returned error with stop command: {}", self.peer, e);
            }
        }
        if let Err(e) = self.exchange(Command::Quit).await {
            warn!("Quit to rotctld at {} not sent: {}", self.peer, e);
        }
        if let Err(e) = self.stream.shutdown().await {
            debug!("Shutdown of rotctld socket {}: {}", self.peer, e);
        }
        info!("Connection to rotctld at {} closed", self.peer);
    }
}
