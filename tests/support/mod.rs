#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use castreel::foundation::error::{ReelError, ReelResult};
use castreel::session::runtime::{
    Attachment, ContainerId, ContainerRuntime, ExitStatus, WaitEvent,
};
use castreel::session::spec::CommandSpec;
use castreel::session::terminal::{InputFeed, SharedWriter, Terminal};

pub const CAST_HEADER: &str = r#"{"version": 2, "width": 189, "height": 50, "timestamp": 1620000000, "env": {"SHELL": "/bin/bash", "TERM": "xterm-256color"}}"#;
pub const CAST_BODY: &str = "[0.5, \"o\", \"$ ls\\r\\n\"]\n[1.0, \"o\", \"a b c\\r\\n\"]\n";

/// How one fake process behaves.
#[derive(Clone, Debug, Default)]
pub struct Behavior {
    pub attach_error: Option<String>,
    pub start_error: Option<String>,
    /// `wait` itself fails.
    pub wait_error: Option<String>,
    /// Reported right after the exit, on the same channel.
    pub error_after_exit: Option<String>,
    pub exit_code: i64,
    /// Never report an exit.
    pub hang: bool,
    /// Exit only once the process's stdin was closed.
    pub exit_on_stdin_close: bool,
    pub stdout: Vec<u8>,
    pub logs: Vec<u8>,
    /// Host files written just before the exit is reported.
    pub produce: Vec<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Create(CommandSpec),
    Attach(String),
    Start(String),
    Wait(String),
    Logs(String),
    Remove(String),
}

impl Call {
    pub fn op(&self) -> &'static str {
        match self {
            Self::Create(_) => "create",
            Self::Attach(_) => "attach",
            Self::Start(_) => "start",
            Self::Wait(_) => "wait",
            Self::Logs(_) => "logs",
            Self::Remove(_) => "remove",
        }
    }
}

/// Process stdin as seen by the fake: everything written, and whether it was closed.
#[derive(Default)]
pub struct StdinLog {
    data: Mutex<Vec<u8>>,
    closed: AtomicBool,
}

impl StdinLog {
    pub fn bytes(&self) -> Vec<u8> {
        self.data.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

struct StdinHandle(Arc<StdinLog>);

impl Write for StdinHandle {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.data.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Drop for StdinHandle {
    fn drop(&mut self) {
        self.0.closed.store(true, Ordering::Release);
    }
}

struct Proc {
    behavior: Behavior,
    stdin: Arc<StdinLog>,
    parked: Option<Sender<WaitEvent>>,
}

#[derive(Default)]
struct State {
    next: usize,
    calls: Vec<Call>,
    procs: HashMap<String, Proc>,
}

type Policy = Box<dyn Fn(&CommandSpec) -> Behavior + Send + Sync>;

/// In-memory [`ContainerRuntime`] whose processes follow a [`Behavior`] chosen per
/// command.
pub struct FakeRuntime {
    policy: Policy,
    state: Mutex<State>,
}

impl FakeRuntime {
    pub fn new(policy: impl Fn(&CommandSpec) -> Behavior + Send + Sync + 'static) -> Self {
        Self {
            policy: Box::new(policy),
            state: Mutex::new(State::default()),
        }
    }

    /// Every process exits 0 immediately.
    pub fn succeeding() -> Self {
        Self::new(|_| Behavior::default())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn ops(&self) -> Vec<&'static str> {
        self.calls().iter().map(Call::op).collect()
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls().iter().filter(|c| c.op() == op).count()
    }

    pub fn created(&self) -> Vec<CommandSpec> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Create(spec) => Some(spec),
                _ => None,
            })
            .collect()
    }

    pub fn stdin(&self, id: &str) -> Arc<StdinLog> {
        self.state.lock().unwrap().procs[id].stdin.clone()
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }

    fn behavior(&self, id: &ContainerId) -> ReelResult<Behavior> {
        self.state
            .lock()
            .unwrap()
            .procs
            .get(&id.0)
            .map(|p| p.behavior.clone())
            .ok_or_else(|| ReelError::validation(format!("no such process {}", id.0)))
    }
}

impl ContainerRuntime for FakeRuntime {
    fn create(&self, spec: &CommandSpec) -> ReelResult<ContainerId> {
        self.record(Call::Create(spec.clone()));
        let behavior = (self.policy)(spec);
        let mut state = self.state.lock().unwrap();
        state.next += 1;
        let id = format!("fake{:04}", state.next);
        state.procs.insert(
            id.clone(),
            Proc {
                behavior,
                stdin: Arc::new(StdinLog::default()),
                parked: None,
            },
        );
        Ok(ContainerId(id))
    }

    fn attach(&self, id: &ContainerId) -> ReelResult<Attachment> {
        self.record(Call::Attach(id.0.clone()));
        let behavior = self.behavior(id)?;
        if let Some(msg) = behavior.attach_error {
            return Err(ReelError::attach(msg));
        }
        let stdin = self.stdin(&id.0);
        Ok(Attachment {
            stdin: Box::new(StdinHandle(stdin)),
            stdout: Box::new(Cursor::new(behavior.stdout)),
            stderr: Box::new(std::io::empty()),
        })
    }

    fn start(&self, id: &ContainerId) -> ReelResult<()> {
        self.record(Call::Start(id.0.clone()));
        match self.behavior(id)?.start_error {
            Some(msg) => Err(ReelError::start(msg)),
            None => Ok(()),
        }
    }

    fn wait(&self, id: &ContainerId) -> ReelResult<mpsc::Receiver<WaitEvent>> {
        self.record(Call::Wait(id.0.clone()));
        let behavior = self.behavior(id)?;
        if let Some(msg) = behavior.wait_error {
            return Err(ReelError::wait(msg));
        }

        let (tx, rx) = mpsc::channel();
        if behavior.hang {
            // Keep the sender alive so the channel never disconnects.
            if let Some(p) = self.state.lock().unwrap().procs.get_mut(&id.0) {
                p.parked = Some(tx);
            }
            return Ok(rx);
        }

        if behavior.exit_on_stdin_close {
            let stdin = self.stdin(&id.0);
            std::thread::spawn(move || {
                let deadline = Instant::now() + Duration::from_secs(10);
                while !stdin.is_closed() && Instant::now() < deadline {
                    std::thread::sleep(Duration::from_millis(2));
                }
                report_exit(&behavior, &tx);
            });
        } else {
            // Both events are queued before the caller starts receiving.
            report_exit(&behavior, &tx);
        }
        Ok(rx)
    }

    fn logs(
        &self,
        id: &ContainerId,
        stdout: &mut dyn Write,
        _stderr: &mut dyn Write,
    ) -> ReelResult<()> {
        self.record(Call::Logs(id.0.clone()));
        let behavior = self.behavior(id)?;
        stdout
            .write_all(&behavior.logs)
            .map_err(|e| ReelError::wait(e.to_string()))
    }

    fn remove(&self, id: &ContainerId) -> ReelResult<()> {
        self.record(Call::Remove(id.0.clone()));
        Ok(())
    }
}

fn report_exit(behavior: &Behavior, tx: &Sender<WaitEvent>) {
    for path in &behavior.produce {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, b"GIF89a").unwrap();
    }
    let _ = tx.send(WaitEvent::Exited(ExitStatus {
        code: behavior.exit_code,
    }));
    if let Some(msg) = &behavior.error_after_exit {
        let _ = tx.send(WaitEvent::Failed(msg.clone()));
    }
}

/// Translate a path inside the process back to the host through the command's mounts.
pub fn host_path(spec: &CommandSpec, inside: &str) -> Option<PathBuf> {
    spec.mounts.iter().find_map(|m| {
        let rest = inside.strip_prefix(&m.target)?;
        let rest = rest.strip_prefix('/').unwrap_or(rest);
        Some(m.host.join(rest))
    })
}

/// Cloneable in-memory writer.
#[derive(Clone, Default)]
pub struct Sink(pub Arc<Mutex<Vec<u8>>>);

impl Sink {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// A terminal whose input is `input` and whose output is captured.
pub fn terminal_with_input(input: &str) -> (Terminal, Sink, Sink) {
    let out = Sink::default();
    let err = Sink::default();
    let terminal = Terminal {
        input: InputFeed::from_reader(Cursor::new(input.to_string()), 4).unwrap(),
        stdout: SharedWriter::new(out.clone()),
        stderr: SharedWriter::new(err.clone()),
    };
    (terminal, out, err)
}

/// A terminal with no input.
pub fn quiet_terminal() -> Terminal {
    Terminal {
        input: InputFeed::closed(),
        stdout: SharedWriter::new(Sink::default()),
        stderr: SharedWriter::new(Sink::default()),
    }
}

/// A project directory in a temp dir.
pub struct ProjectFixture {
    _tmp: tempfile::TempDir,
    pub root: PathBuf,
}

impl ProjectFixture {
    pub fn new(name: &str) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join(name);
        std::fs::create_dir_all(&root).unwrap();
        Self { _tmp: tmp, root }
    }

    pub fn scene(&self, name: &str) -> PathBuf {
        let dir = self.root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// A well-formed three-line capture at `<scene>/recordings/<file>`.
    pub fn recording(&self, scene: &str, file: &str) -> PathBuf {
        self.file(&format!("{scene}/recordings/{file}"), &cast_text())
    }

    pub fn file(&self, rel: &str, contents: &str) -> PathBuf {
        let path = self.root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, contents).unwrap();
        path
    }
}

pub fn cast_text() -> String {
    format!("{CAST_HEADER}\n{CAST_BODY}")
}

pub fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}
