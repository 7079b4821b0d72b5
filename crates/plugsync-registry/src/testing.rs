//! In-memory transports and sink used by the unit tests

use async_trait::async_trait;
use plugsync_core::{Command, ComponentKind, Credentials, DeviceId, DeviceReport, Params};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::channel::{
    CameraChannel, CloudChannel, DispatchInfo, DispatchSink, LocalAnnouncement, LocalChannel,
    LocalTarget, TransportError,
};

pub type Recorded = (ComponentKind, DispatchInfo);

/// Sink that forwards every notification to the test
pub struct RecordingSink {
    tx: mpsc::UnboundedSender<Recorded>,
}

impl RecordingSink {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Recorded>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }

    /// Wait for exactly `count` notifications, then make sure nothing else arrives
    pub async fn collect(
        rx: &mut mpsc::UnboundedReceiver<Recorded>,
        count: usize,
    ) -> Vec<Recorded> {
        let mut received = Vec::with_capacity(count);
        while received.len() < count {
            match tokio::time::timeout(Duration::from_secs(2), rx.recv()).await {
                Ok(Some(item)) => received.push(item),
                _ => break,
            }
        }
        assert_eq!(received.len(), count, "missing dispatches");
        Self::assert_quiet(rx).await;
        received
    }

    pub async fn assert_quiet(rx: &mut mpsc::UnboundedReceiver<Recorded>) {
        let extra = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(
            !matches!(extra, Ok(Some(_))),
            "unexpected dispatch: {:?}",
            extra
        );
    }
}

impl DispatchSink for RecordingSink {
    fn notify(&self, kind: &ComponentKind, info: DispatchInfo) {
        let _ = self.tx.send((kind.clone(), info));
    }
}

#[derive(Default)]
pub struct FakeCloud {
    pub accept_login: bool,
    pub devices: Vec<DeviceReport>,
    pub logins: AtomicUsize,
    pub stops: AtomicUsize,
    pub sent: Mutex<Vec<(DeviceId, Command)>>,
    pub events: Mutex<Option<mpsc::Sender<DeviceReport>>>,
}

impl FakeCloud {
    pub fn accepting(devices: Vec<DeviceReport>) -> Arc<Self> {
        Arc::new(Self {
            accept_login: true,
            devices,
            ..Default::default()
        })
    }

    pub fn rejecting() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn logins(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    pub async fn push(&self, report: DeviceReport) {
        let tx = self.events.lock().unwrap().clone();
        tx.expect("cloud not started").send(report).await.unwrap();
    }
}

#[async_trait]
impl CloudChannel for FakeCloud {
    async fn login(&self, _credentials: &Credentials) -> Result<bool, TransportError> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        Ok(self.accept_login)
    }

    async fn list_devices(&self) -> Result<Vec<DeviceReport>, TransportError> {
        Ok(self.devices.clone())
    }

    async fn start(&self, events: mpsc::Sender<DeviceReport>) -> Result<(), TransportError> {
        *self.events.lock().unwrap() = Some(events);
        Ok(())
    }

    async fn send(&self, id: &DeviceId, command: &Command) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push((id.clone(), command.clone()));
        Ok(())
    }

    async fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.events.lock().unwrap().take();
    }
}

#[derive(Default)]
pub struct FakeLocal {
    pub fail_send: bool,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub sent: Mutex<Vec<(LocalTarget, Command)>>,
    pub events: Mutex<Option<mpsc::Sender<LocalAnnouncement>>>,
}

impl FakeLocal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail_send: true,
            ..Default::default()
        })
    }

    pub fn started(&self) -> bool {
        self.starts.load(Ordering::SeqCst) > 0
    }

    pub async fn announce(&self, id: &str, state: Params, host: Option<&str>) {
        let tx = self.events.lock().unwrap().clone();
        tx.expect("local not started")
            .send(LocalAnnouncement {
                id: DeviceId::from(id),
                state,
                host: host.map(str::to_string),
            })
            .await
            .unwrap();
    }
}

#[async_trait]
impl LocalChannel for FakeLocal {
    async fn start(&self, events: mpsc::Sender<LocalAnnouncement>) -> Result<(), TransportError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        *self.events.lock().unwrap() = Some(events);
        Ok(())
    }

    async fn send(&self, target: &LocalTarget, command: &Command) -> Result<(), TransportError> {
        if self.fail_send {
            return Err(TransportError::Timeout(target.host.clone()));
        }
        self.sent.lock().unwrap().push((target.clone(), command.clone()));
        Ok(())
    }

    async fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.events.lock().unwrap().take();
    }
}

#[derive(Default)]
pub struct FakeCamera {
    pub sent: Mutex<Vec<(DeviceId, Command)>>,
}

#[async_trait]
impl CameraChannel for FakeCamera {
    async fn send(&self, id: &DeviceId, command: &Command) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push((id.clone(), command.clone()));
        Ok(())
    }
}
