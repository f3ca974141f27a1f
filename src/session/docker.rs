use std::collections::HashMap;
use std::io::Write;
use std::process::{Child, Command, Output, Stdio};
use std::sync::mpsc;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::foundation::error::{ReelError, ReelResult};
use crate::session::runtime::{Attachment, ContainerId, ContainerRuntime, ExitStatus, WaitEvent};
use crate::session::spec::CommandSpec;

/// `docker inspect` template for [`ContainerState`].
const STATE_FORMAT: &str = "{{.State.Status}}|{{.State.Error}}";

/// [`ContainerRuntime`] backed by the system `docker` binary.
///
/// `attach` launches `docker start --attach --interactive`, so the streams are connected
/// before the container runs and no early output or input is lost. `start` then polls
/// `docker inspect` until the daemon reports the container as started, or the attach
/// client gives up first. The attach client is kept until the container is removed.
pub struct DockerCli {
    program: String,
    clients: Mutex<HashMap<ContainerId, Child>>,
    start_timeout: Duration,
    start_poll: Duration,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerCli {
    pub fn new() -> Self {
        Self::with_program("docker")
    }

    /// Use a different client binary (e.g. `podman`).
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            clients: Mutex::new(HashMap::new()),
            start_timeout: Duration::from_secs(30),
            start_poll: Duration::from_millis(50),
        }
    }

    /// How long `start` waits for the container to leave the created state, and how
    /// often it asks.
    pub fn with_start_timing(mut self, timeout: Duration, poll: Duration) -> Self {
        self.start_timeout = timeout;
        self.start_poll = poll;
        self
    }

    /// Fetch `image` from its registry, streaming progress to the invoking terminal.
    #[tracing::instrument(skip(self))]
    pub fn pull_image(&self, image: &str) -> ReelResult<()> {
        let status = Command::new(&self.program)
            .args(["pull", image])
            .stdin(Stdio::null())
            .status()
            .map_err(|e| {
                ReelError::environment(format!("failed to run '{} pull': {e}", self.program))
            })?;
        if !status.success() {
            return Err(ReelError::environment(format!(
                "pulling '{image}' failed with {status}"
            )));
        }
        Ok(())
    }

    fn command(&self) -> Command {
        Command::new(&self.program)
    }

    fn clients(&self) -> MutexGuard<'_, HashMap<ContainerId, Child>> {
        self.clients.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn output(&self, args: &[&str]) -> std::io::Result<Output> {
        self.command().args(args).stdin(Stdio::null()).output()
    }

    /// Take the attach client out of the table, stop it and reap it.
    fn release_client(&self, id: &ContainerId) {
        if let Some(mut child) = self.clients().remove(id) {
            let _ = child.kill();
            let _ = child.wait();
        }
    }

    fn client_exit(&self, id: &ContainerId) -> ReelResult<Option<std::process::ExitStatus>> {
        match self.clients().get_mut(id) {
            Some(child) => child
                .try_wait()
                .map_err(|e| ReelError::start(format!("attach client for {id} lost: {e}"))),
            None => Ok(None),
        }
    }

    fn inspect_state(&self, id: &ContainerId) -> ReelResult<ContainerState> {
        let out = self
            .output(&["inspect", "--type", "container", "--format", STATE_FORMAT, &id.0])
            .map_err(|e| ReelError::start(format!("failed to run {} inspect: {e}", self.program)))?;
        if !out.status.success() {
            return Err(ReelError::start(format!(
                "inspecting {id} failed with {}",
                failure_text(&out)
            )));
        }
        parse_state(&out.stdout).ok_or_else(|| {
            ReelError::start(format!("{} inspect returned no state for {id}", self.program))
        })
    }

    /// Poll until the container has started. A daemon-reported error, an attach client
    /// that exits while the container is still only created, or the timeout all fail.
    fn await_started(&self, id: &ContainerId) -> ReelResult<()> {
        let deadline = Instant::now() + self.start_timeout;
        loop {
            // Sampled before the state, so a client exit seen here is already reflected
            // in what inspect reports.
            let client_exit = self.client_exit(id)?;
            let state = self.inspect_state(id)?;
            if !state.error.is_empty() {
                return Err(ReelError::start(format!(
                    "starting {id} failed: {}",
                    state.error
                )));
            }
            if state.has_started() {
                tracing::debug!(id = %id, status = %state.status, "container started");
                return Ok(());
            }
            if let Some(status) = client_exit {
                return Err(ReelError::start(format!(
                    "{} exited with {status} before {id} started",
                    self.program
                )));
            }
            if Instant::now() >= deadline {
                return Err(ReelError::start(format!(
                    "{id} did not start within {:?}",
                    self.start_timeout
                )));
            }
            std::thread::sleep(self.start_poll);
        }
    }

    fn start_detached(&self, id: &ContainerId) -> ReelResult<()> {
        let out = self
            .output(&["start", &id.0])
            .map_err(|e| ReelError::start(format!("failed to run {} start: {e}", self.program)))?;
        if !out.status.success() {
            return Err(ReelError::start(format!(
                "starting {id} failed with {}",
                failure_text(&out)
            )));
        }
        Ok(())
    }
}

/// Container state as reported by `docker inspect`.
#[derive(Clone, Debug, PartialEq, Eq)]
struct ContainerState {
    status: String,
    /// Daemon-side error from the last start attempt; empty when there was none.
    error: String,
}

impl ContainerState {
    fn has_started(&self) -> bool {
        self.status != "created"
    }
}

fn parse_state(stdout: &[u8]) -> Option<ContainerState> {
    let text = String::from_utf8_lossy(stdout);
    let (status, error) = text.trim().split_once('|')?;
    if status.is_empty() {
        return None;
    }
    Some(ContainerState {
        status: status.to_string(),
        error: error.trim().to_string(),
    })
}

/// Return `true` when `docker` can be invoked from `PATH`.
pub fn is_docker_on_path() -> bool {
    Command::new("docker")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

fn create_args(spec: &CommandSpec) -> Vec<String> {
    let mut args = vec!["create".to_string(), "--interactive".to_string()];
    for entry in &spec.env {
        args.push("--env".to_string());
        args.push(entry.clone());
    }
    for m in &spec.mounts {
        args.push("--mount".to_string());
        args.push(format!(
            "type=bind,source={},target={}",
            m.host.display(),
            m.target
        ));
    }
    args.push(spec.image.clone());
    args.extend(spec.args.iter().cloned());
    args
}

fn failure_text(out: &Output) -> String {
    let stderr = String::from_utf8_lossy(&out.stderr);
    format!("{}: {}", out.status, stderr.trim())
}

fn parse_exit_code(stdout: &[u8]) -> Option<i64> {
    String::from_utf8_lossy(stdout).trim().parse().ok()
}

impl ContainerRuntime for DockerCli {
    fn create(&self, spec: &CommandSpec) -> ReelResult<ContainerId> {
        let args = create_args(spec);
        let out = self
            .command()
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                ReelError::start(format!(
                    "failed to spawn {} (is it installed and on PATH?): {e}",
                    self.program
                ))
            })?;
        if !out.status.success() {
            return Err(ReelError::start(format!(
                "creating '{}' failed with {}",
                spec.image,
                failure_text(&out)
            )));
        }
        let id = String::from_utf8_lossy(&out.stdout).trim().to_string();
        if id.is_empty() {
            return Err(ReelError::start(format!(
                "{} create returned no id for '{}'",
                self.program, spec.image
            )));
        }
        Ok(ContainerId(id))
    }

    fn attach(&self, id: &ContainerId) -> ReelResult<Attachment> {
        let mut child = self
            .command()
            .args(["start", "--attach", "--interactive", &id.0])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ReelError::attach(format!("failed to spawn attach client: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ReelError::attach("failed to open attach stdin (unexpected)"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ReelError::attach("failed to open attach stdout (unexpected)"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ReelError::attach("failed to open attach stderr (unexpected)"))?;

        self.clients().insert(id.clone(), child);
        Ok(Attachment {
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
        })
    }

    fn start(&self, id: &ContainerId) -> ReelResult<()> {
        if !self.clients().contains_key(id) {
            return self.start_detached(id);
        }
        // The attach client already asked the daemon to start the container.
        let result = self.await_started(id);
        if result.is_err() {
            self.release_client(id);
        }
        result
    }

    fn wait(&self, id: &ContainerId) -> ReelResult<mpsc::Receiver<WaitEvent>> {
        let (tx, rx) = mpsc::channel();
        let client = self.clients().remove(id);
        let program = self.program.clone();
        let id = id.clone();

        std::thread::Builder::new()
            .name("castreel-wait".to_string())
            .spawn(move || {
                // The client's own status is not the container's; `docker wait` is.
                if let Some(mut child) = client
                    && let Err(e) = child.wait()
                {
                    let _ = tx.send(WaitEvent::Failed(format!(
                        "attach client for {id} lost: {e}"
                    )));
                    return;
                }

                let event = match Command::new(&program)
                    .args(["wait", &id.0])
                    .stdin(Stdio::null())
                    .output()
                {
                    Ok(out) if out.status.success() => match parse_exit_code(&out.stdout) {
                        Some(code) => WaitEvent::Exited(ExitStatus { code }),
                        None => WaitEvent::Failed(format!(
                            "{program} wait returned no exit code for {id}"
                        )),
                    },
                    Ok(out) => WaitEvent::Failed(format!(
                        "waiting on {id} failed with {}",
                        failure_text(&out)
                    )),
                    Err(e) => WaitEvent::Failed(format!("failed to run {program} wait: {e}")),
                };
                let _ = tx.send(event);
            })
            .map_err(|e| ReelError::wait(format!("failed to spawn wait thread: {e}")))?;

        Ok(rx)
    }

    fn logs(
        &self,
        id: &ContainerId,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
    ) -> ReelResult<()> {
        use anyhow::Context as _;

        let out = self
            .output(&["logs", &id.0])
            .with_context(|| format!("failed to run {} logs", self.program))?;
        if !out.status.success() {
            return Err(ReelError::wait(format!(
                "reading logs of {id} failed with {}",
                failure_text(&out)
            )));
        }
        stdout
            .write_all(&out.stdout)
            .and_then(|_| stdout.flush())
            .context("failed to write process stdout")?;
        stderr
            .write_all(&out.stderr)
            .and_then(|_| stderr.flush())
            .context("failed to write process stderr")?;
        Ok(())
    }

    fn remove(&self, id: &ContainerId) -> ReelResult<()> {
        self.release_client(id);
        let out = self
            .output(&["rm", &id.0])
            .map_err(|e| ReelError::environment(format!("failed to run {} rm: {e}", self.program)))?;
        if !out.status.success() {
            return Err(ReelError::environment(format!(
                "removing {id} failed with {}",
                failure_text(&out)
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_args_place_options_before_image() {
        let spec = CommandSpec::new("asciinema/asciicast2gif")
            .args(["-S1", "recordings/a.cast", "renders/a.gif"])
            .env("A=1")
            .mount("/home/u/proj/scene_1", "/data");
        assert_eq!(
            create_args(&spec),
            vec![
                "create",
                "--interactive",
                "--env",
                "A=1",
                "--mount",
                "type=bind,source=/home/u/proj/scene_1,target=/data",
                "asciinema/asciicast2gif",
                "-S1",
                "recordings/a.cast",
                "renders/a.gif",
            ]
        );
    }

    #[test]
    fn exit_code_parsing_tolerates_whitespace() {
        assert_eq!(parse_exit_code(b"0\n"), Some(0));
        assert_eq!(parse_exit_code(b" 137 "), Some(137));
        assert_eq!(parse_exit_code(b""), None);
        assert_eq!(parse_exit_code(b"oops"), None);
    }

    #[test]
    fn state_parsing_splits_status_and_error() {
        let running = parse_state(b"running|\n").unwrap();
        assert_eq!(running.status, "running");
        assert!(running.error.is_empty());
        assert!(running.has_started());

        let failed = parse_state(b"created|exec: \"bash\": not found | oci\n").unwrap();
        assert!(!failed.has_started());
        assert_eq!(failed.error, "exec: \"bash\": not found | oci");

        assert_eq!(parse_state(b""), None);
        assert_eq!(parse_state(b"|boom"), None);
    }

    #[test]
    fn missing_client_binary_is_a_start_error() {
        let docker = DockerCli::with_program("castreel-no-such-docker-binary");
        let err = docker.create(&CommandSpec::new("img")).unwrap_err();
        assert!(matches!(err, ReelError::Start(_)), "{err}");
    }
}
