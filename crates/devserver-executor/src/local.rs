//! Local process runner.

use async_trait::async_trait;
use bytes::Bytes;
use devserver_core::executor::{ProcessRunner, ProcessSpec};
use devserver_core::log::{LogChunk, LogStream, PipelineLog};
use devserver_core::RunnerError;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, info};

const READ_BUFFER_SIZE: usize = 8192;

/// Runs commands as children of this process.
#[derive(Debug, Clone, Default)]
pub struct LocalProcessRunner;

impl LocalProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessRunner for LocalProcessRunner {
    async fn run(&self, spec: &ProcessSpec, log: &mut PipelineLog) -> Result<i32, RunnerError> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .current_dir(&spec.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(env) = &spec.env {
            command.env_clear().envs(env);
        }

        info!(program = %spec.program, cwd = %spec.working_dir.display(), "Spawning process");

        let mut child = command.spawn().map_err(|source| RunnerError::Spawn {
            program: spec.program.clone(),
            source,
        })?;

        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();
        let mut out_buf = vec![0u8; READ_BUFFER_SIZE];
        let mut err_buf = vec![0u8; READ_BUFFER_SIZE];

        // Drain both pipes until EOF, recording chunks as they arrive
        while stdout.is_some() || stderr.is_some() {
            let (stream, read) = tokio::select! {
                r = read_chunk(&mut stdout, &mut out_buf), if stdout.is_some() => (LogStream::Stdout, r),
                r = read_chunk(&mut stderr, &mut err_buf), if stderr.is_some() => (LogStream::Stderr, r),
            };

            let n = read.map_err(|source| RunnerError::Io {
                program: spec.program.clone(),
                source,
            })?;

            if n == 0 {
                match stream {
                    LogStream::Stdout => stdout = None,
                    LogStream::Stderr => stderr = None,
                }
                continue;
            }

            let buf = match stream {
                LogStream::Stdout => &out_buf,
                LogStream::Stderr => &err_buf,
            };
            let data = Bytes::copy_from_slice(&buf[..n]);
            debug!(
                program = %spec.program,
                stream = ?stream,
                "{}",
                String::from_utf8_lossy(&data).trim_end()
            );
            log.push(LogChunk { stream, data });
        }

        let status = child.wait().await.map_err(|source| RunnerError::Io {
            program: spec.program.clone(),
            source,
        })?;

        // Killed by a signal
        let code = status.code().unwrap_or(-1);
        debug!(program = %spec.program, code, "Process exited");
        Ok(code)
    }
}

async fn read_chunk<R>(reader: &mut Option<R>, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    match reader {
        Some(r) => r.read(buf).await,
        None => std::future::pending().await,
    }
}
