//! Request/response wrapper around one external engine executable.
//!
//! Each request is a fresh process: `program [args..] <position> <turn digit>`. The engine writes
//! its answer to stdout (or stderr) and exits. Nothing is written to its stdin.

use std::{
    io::{self, Read},
    process::{Child, Command, ExitStatus, Stdio},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use tracing::{debug, instrument, trace, warn};

use crate::{
    board_codec::Color,
    error::{HarnessError, Result},
    game_session::MoveOracle,
};

const CHECKMATE: &str = "CHECKMATE";
const STALEMATE: &str = "STALEMATE";
const NEW_BOARD: &str = "NEWBOARD=";

/// How to launch an engine: a program and the arguments that precede the position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl EngineCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: vec![],
        }
    }

    /// Leading arguments, e.g. the script when `program` is an interpreter.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

/// What an engine answered for one position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineReply {
    /// The engine moved; holds the next serialized position.
    Move(String),
    /// The side to move has been mated.
    Checkmate,
    /// The side to move has no legal move and is not in check.
    Stalemate,
    /// None of the sentinels were found; holds the raw output.
    Malformed(String),
}

impl EngineReply {
    /// Classify raw engine output.
    ///
    /// `CHECKMATE` wins over `STALEMATE`, which wins over `NEWBOARD=`. The move payload is the
    /// run of non-whitespace characters right after `NEWBOARD=`.
    pub fn parse(output: &str) -> EngineReply {
        if output.contains(CHECKMATE) {
            return EngineReply::Checkmate;
        }
        if output.contains(STALEMATE) {
            return EngineReply::Stalemate;
        }
        let Some(at) = output.find(NEW_BOARD) else {
            return EngineReply::Malformed(output.to_string());
        };
        let payload = output[at + NEW_BOARD.len()..]
            .split(char::is_whitespace)
            .next()
            .unwrap_or_default();
        if payload.is_empty() {
            EngineReply::Malformed(output.to_string())
        } else {
            EngineReply::Move(payload.to_string())
        }
    }
}

/// A stateless engine oracle: one spawn per request.
#[derive(Debug, Clone)]
pub struct EngineProcess {
    name: String,
    command: EngineCommand,
    timeout: Option<Duration>,
}

impl EngineProcess {
    pub fn new(name: impl Into<String>, command: EngineCommand) -> Self {
        Self {
            name: name.into(),
            command,
            timeout: None,
        }
    }

    /// Kill the engine if it has not exited after `timeout`. `None` waits forever.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ask the engine to play `side` in `position`.
    ///
    /// # Errors
    /// [`HarnessError::ProtocolViolation`] when the output holds no sentinel,
    /// [`HarnessError::EngineTimeout`] when the configured timeout expires,
    /// [`HarnessError::Spawn`] when the executable cannot be started.
    #[instrument(skip(self, position), fields(engine = %self.name))]
    pub fn request_move(&self, position: &str, side: Color) -> Result<EngineReply> {
        let output = self.run(position, side)?;
        trace!(%output);
        match EngineReply::parse(&output) {
            EngineReply::Malformed(reply) => {
                warn!("no sentinel in engine output");
                Err(HarnessError::ProtocolViolation {
                    engine: self.name.clone(),
                    reply,
                })
            }
            reply => Ok(reply),
        }
    }

    fn run(&self, position: &str, side: Color) -> Result<String> {
        let mut child = Command::new(&self.command.program)
            .args(&self.command.args)
            .arg(position)
            .arg(side.digit().to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| HarnessError::Spawn {
                program: self.command.program.clone(),
                source,
            })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match self.timeout {
            None => child.wait()?,
            Some(timeout) => match wait_until(&mut child, timeout)? {
                Some(status) => status,
                None => {
                    // readers are left detached: a grandchild may still hold the pipes
                    kill(&mut child);
                    return Err(HarnessError::EngineTimeout {
                        engine: self.name.clone(),
                        timeout,
                    });
                }
            },
        };

        if !status.success() {
            debug!(?status, "engine exited with a failure status");
        }

        let mut output = collect(stdout)?;
        output.push_str(&collect(stderr)?);
        Ok(output)
    }
}

impl MoveOracle for EngineProcess {
    fn name(&self) -> &str {
        &self.name
    }

    fn request_move(&mut self, position: &str, side: Color) -> Result<EngineReply> {
        EngineProcess::request_move(self, position, side)
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<io::Result<String>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buf)?;
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    })
}

/// Output of a finished reader. A partial read is an error, never a truncated reply.
fn collect(reader: JoinHandle<io::Result<String>>) -> Result<String> {
    let output = reader
        .join()
        .map_err(|_| io::Error::other("engine output reader panicked"))??;
    Ok(output)
}

/// Poll the child until it exits or `max_duration` elapses.
fn wait_until(child: &mut Child, max_duration: Duration) -> Result<Option<ExitStatus>> {
    let deadline = Instant::now() + max_duration;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() > deadline {
            return Ok(None);
        }
        thread::sleep(Duration::from_millis(10).min(max_duration / 10));
    }
}

fn kill(child: &mut Child) {
    if let Err(e) = child.kill() {
        warn!("could not kill engine process {}: {e}", child.id());
    }
    // reap it so no zombie is left behind
    let _ = child.wait();
}
