//! Scripted processes for exercising the broker without real shells.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use super::pty::{
    ProcessSpawner, ProcessStatus, PtyEvent, PtyEvents, SessionError, TerminalProcess,
    TerminalSize,
};

static NEXT_FAKE_PID: AtomicU32 = AtomicU32::new(10_000);

/// Observable state of one scripted process.
pub struct FakeProcessState {
    pid: u32,
    writes: Mutex<Vec<u8>>,
    resizes: Mutex<Vec<TerminalSize>>,
    events: Mutex<Option<mpsc::UnboundedSender<PtyEvent>>>,
    running: AtomicBool,
    kills: AtomicUsize,
}

impl FakeProcessState {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Everything written to the process so far, as text.
    pub fn written(&self) -> String {
        String::from_utf8_lossy(&self.writes.lock().unwrap()).into_owned()
    }

    pub fn resizes(&self) -> Vec<TerminalSize> {
        self.resizes.lock().unwrap().clone()
    }

    pub fn kill_count(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Makes the process print `data`.
    pub fn emit_output(&self, data: &[u8]) {
        if let Some(tx) = self.events.lock().unwrap().as_ref() {
            let _ = tx.send(PtyEvent::Output(data.to_vec()));
        }
    }

    /// Makes the process exit. Only the first call has an effect.
    pub fn exit(&self, code: u32) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(tx) = self.events.lock().unwrap().take() {
            let _ = tx.send(PtyEvent::Exited(ProcessStatus::Exited(code)));
        }
    }
}

struct FakeProcess(Arc<FakeProcessState>);

impl TerminalProcess for FakeProcess {
    fn pid(&self) -> Option<u32> {
        Some(self.0.pid)
    }

    fn write(&self, data: &[u8]) {
        if self.0.is_running() {
            self.0.writes.lock().unwrap().extend_from_slice(data);
        }
    }

    fn resize(&self, size: TerminalSize) {
        if self.0.is_running() {
            self.0.resizes.lock().unwrap().push(size);
        }
    }

    fn kill(&self) -> Result<(), SessionError> {
        self.0.kills.fetch_add(1, Ordering::SeqCst);
        self.0.exit(137);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.0.is_running()
    }
}

/// Spawner handing out [`FakeProcessState`]-backed processes.
#[derive(Default)]
pub struct FakeSpawner {
    spawned: Mutex<Vec<Arc<FakeProcessState>>>,
    fail: AtomicBool,
    on_spawn: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
}

impl FakeSpawner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes subsequent spawns fail.
    pub fn fail_spawns(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Runs `hook` inside every later spawn, after the process exists.
    pub fn on_spawn(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_spawn.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn spawn_count(&self) -> usize {
        self.spawned.lock().unwrap().len()
    }

    /// The `index`-th spawned process.
    pub fn process(&self, index: usize) -> Arc<FakeProcessState> {
        Arc::clone(&self.spawned.lock().unwrap()[index])
    }

    /// The process with the given pid.
    pub fn by_pid(&self, pid: u32) -> Arc<FakeProcessState> {
        let spawned = self.spawned.lock().unwrap();
        let state = spawned.iter().find(|p| p.pid == pid).expect("unknown fake pid");
        Arc::clone(state)
    }
}

impl ProcessSpawner for FakeSpawner {
    fn spawn(&self, _size: TerminalSize) -> Result<(Box<dyn TerminalProcess>, PtyEvents), SessionError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SessionError::SpawnFailed("spawning disabled".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(FakeProcessState {
            pid: NEXT_FAKE_PID.fetch_add(1, Ordering::Relaxed),
            writes: Mutex::new(Vec::new()),
            resizes: Mutex::new(Vec::new()),
            events: Mutex::new(Some(tx)),
            running: AtomicBool::new(true),
            kills: AtomicUsize::new(0),
        });
        self.spawned.lock().unwrap().push(Arc::clone(&state));
        if let Some(hook) = self.on_spawn.lock().unwrap().as_ref() {
            hook();
        }
        Ok((Box::new(FakeProcess(state)), rx))
    }
}
