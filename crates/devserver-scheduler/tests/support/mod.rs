//! Scripted process runner and fixtures shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use devserver_config::{ConfigHandle, parse_config};
use devserver_core::executor::{ProcessRunner, ProcessSpec};
use devserver_core::log::{LogChunk, PipelineLog};
use devserver_core::RunnerError;
use devserver_scheduler::{Coordinator, FileReportSink};
use std::collections::{HashMap, VecDeque};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{Semaphore, mpsc};

pub const SAME_HASHES: &str = "--branch\n1111111111\n1111111111\n";
pub const DIFFERENT_HASHES: &str = "--branch\n2222222222\n1111111111\n";

/// One recorded invocation.
#[derive(Debug, Clone)]
pub struct Call {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub env: Option<HashMap<String, String>>,
}

impl Call {
    pub fn is_git(&self, subcommand: &str) -> bool {
        self.program == "git" && self.args.first().map(String::as_str) == Some(subcommand)
    }

    pub fn is_script(&self) -> bool {
        self.program != "git"
    }
}

/// A [`ProcessRunner`] that never spawns anything.
///
/// `git rev-parse` prints the configured hashes, other git commands print
/// nothing, and scripts exit with queued codes (0 once the queue is empty),
/// printing `ran <program> <docker_tag>`.
pub struct FakeRunner {
    calls: Mutex<Vec<Call>>,
    rev_parse: Mutex<String>,
    script_codes: Mutex<VecDeque<i32>>,
    active: Mutex<HashMap<PathBuf, usize>>,
    max_active: Mutex<HashMap<PathBuf, usize>>,
    delay: Duration,
    gate: Option<Arc<Semaphore>>,
    fetch_started: Option<mpsc::UnboundedSender<()>>,
    panic_next_fetch: AtomicBool,
    rev_parse_code: i32,
}

impl FakeRunner {
    pub fn new(rev_parse: &str) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            rev_parse: Mutex::new(rev_parse.to_string()),
            script_codes: Mutex::new(VecDeque::new()),
            active: Mutex::new(HashMap::new()),
            max_active: Mutex::new(HashMap::new()),
            delay: Duration::from_millis(2),
            gate: None,
            fetch_started: None,
            panic_next_fetch: AtomicBool::new(false),
            rev_parse_code: 0,
        }
    }

    /// Every `git fetch` reports that it started, then waits for a permit.
    pub fn gated(rev_parse: &str) -> (Self, Arc<Semaphore>, mpsc::UnboundedReceiver<()>) {
        let gate = Arc::new(Semaphore::new(0));
        let (tx, rx) = mpsc::unbounded_channel();
        let mut runner = Self::new(rev_parse);
        runner.gate = Some(gate.clone());
        runner.fetch_started = Some(tx);
        (runner, gate, rx)
    }

    pub fn with_script_codes(self, codes: &[i32]) -> Self {
        self.script_codes.lock().unwrap().extend(codes.iter().copied());
        self
    }

    /// `git rev-parse` complains on stderr and exits with `code`.
    pub fn with_rev_parse_code(mut self, code: i32) -> Self {
        self.rev_parse_code = code;
        self
    }

    /// The next `git fetch` panics instead of running.
    pub fn panicking_once(self) -> Self {
        self.panic_next_fetch.store(true, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| predicate(c)).count()
    }

    /// Highest number of simultaneous invocations seen for any checkout.
    pub fn max_concurrency(&self) -> usize {
        self.max_active.lock().unwrap().values().copied().max().unwrap_or(0)
    }

    fn checkout_of(spec: &ProcessSpec) -> PathBuf {
        spec.env
            .as_ref()
            .and_then(|env| env.get("repo_path"))
            .map(PathBuf::from)
            .unwrap_or_else(|| spec.working_dir.clone())
    }
}

#[async_trait]
impl ProcessRunner for FakeRunner {
    async fn run(&self, spec: &ProcessSpec, log: &mut PipelineLog) -> Result<i32, RunnerError> {
        let call = Call {
            program: spec.program.clone(),
            args: spec.args.clone(),
            working_dir: spec.working_dir.clone(),
            env: spec.env.clone(),
        };
        self.calls.lock().unwrap().push(call.clone());

        if call.is_git("fetch") && self.panic_next_fetch.swap(false, Ordering::SeqCst) {
            panic!("fetch blew up");
        }

        let checkout = Self::checkout_of(spec);
        {
            let mut active = self.active.lock().unwrap();
            let now = active.entry(checkout.clone()).or_insert(0);
            *now += 1;
            let mut max = self.max_active.lock().unwrap();
            let seen = max.entry(checkout.clone()).or_insert(0);
            *seen = (*seen).max(*now);
        }

        if call.is_git("fetch") {
            if let Some(tx) = &self.fetch_started {
                let _ = tx.send(());
            }
            if let Some(gate) = &self.gate {
                gate.acquire().await.unwrap().forget();
            }
        }

        tokio::time::sleep(self.delay).await;

        let code = if call.is_git("rev-parse") && self.rev_parse_code != 0 {
            log.push(LogChunk::stderr("fatal: no upstream configured\n"));
            self.rev_parse_code
        } else if call.is_git("rev-parse") {
            log.push(LogChunk::stdout(self.rev_parse.lock().unwrap().clone()));
            0
        } else if call.is_script() {
            let tag = spec
                .env
                .as_ref()
                .and_then(|env| env.get("docker_tag"))
                .cloned()
                .unwrap_or_default();
            log.push(LogChunk::stdout(format!("ran {} {}\n", spec.program, tag)));
            self.script_codes.lock().unwrap().pop_front().unwrap_or(0)
        } else {
            0
        };

        *self.active.lock().unwrap().get_mut(&checkout).unwrap() -= 1;
        Ok(code)
    }
}

/// Temporary directory tree for one test.
pub struct Fixture {
    pub root: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        for dir in ["repos", "reports", "tests", "sh"] {
            std::fs::create_dir_all(root.path().join(dir)).unwrap();
        }
        Self { root }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.path().join(name)
    }

    pub fn repo(&self, git_name: &str) -> PathBuf {
        let path = self.path("repos").join(git_name);
        std::fs::create_dir_all(&path).unwrap();
        path
    }

    pub fn scripts(&self) -> PathBuf {
        self.path("sh")
    }

    /// Create `<scripts>/<name>` with the given mode.
    pub fn script(&self, name: &str, mode: u32) -> PathBuf {
        write_with_mode(&self.scripts().join(name), mode)
    }

    /// Server configuration pointing at this fixture, followed by `body`.
    pub fn config(&self, body: &str) -> ConfigHandle {
        let text = format!(
            "repos-path \"{}\"\nreports-path \"{}\"\ntests-path \"{}\"\nscripts-path \"{}\"\n{}",
            self.path("repos").display(),
            self.path("reports").display(),
            self.path("tests").display(),
            self.scripts().display(),
            body
        );
        ConfigHandle::new(parse_config(&text).unwrap())
    }

    pub fn coordinator(&self, body: &str, runner: Arc<FakeRunner>) -> Coordinator {
        let config = self.config(body);
        let sink = FileReportSink::new(self.path("reports"), self.path("tests"));
        Coordinator::with_base_env(config, runner, Arc::new(sink), base_env())
    }

    pub fn report(&self, name: &str) -> String {
        std::fs::read_to_string(self.path("reports").join(name)).unwrap()
    }

    pub fn test_report(&self, name: &str) -> String {
        std::fs::read_to_string(self.path("tests").join(name)).unwrap()
    }
}

pub fn write_with_mode(path: &Path, mode: u32) -> PathBuf {
    std::fs::write(path, "#!/bin/sh\nexit 0\n").unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).unwrap();
    path.to_path_buf()
}

pub fn mode_of(path: &Path) -> u32 {
    std::fs::metadata(path).unwrap().permissions().mode() & 0o777
}

pub fn base_env() -> HashMap<String, String> {
    HashMap::from([("PATH".to_string(), "/usr/bin:/bin".to_string())])
}

/// `<cwd>> <program> <json args>` as echoed into run logs.
pub fn banner(cwd: &Path, program: &str, args: &[&str]) -> String {
    let args: Vec<String> = args.iter().map(|a| format!("\"{}\"", a)).collect();
    format!("{}> {} [{}]\n", cwd.display(), program, args.join(","))
}
