//! Timed parallel runner
//!
//! Every unit runs in its own forked worker process, which becomes leader of
//! a fresh session and process group. A supervisor process owns the workers
//! for one phase:
//!
//! - workers that exit are reaped as they finish
//! - at the deadline every remaining group gets SIGTERM, then SIGKILL after a
//!   short grace pause, then the worker itself is killed and reaped
//! - if the calling process disappears, the deadline is treated as reached
//!
//! Each worker writes its single frame to a private pipe. A reader thread in
//! the supervisor forwards complete frames to the shared stream under its
//! lock, so a worker killed mid-write never corrupts the stream.
//!
//! Workers watch their parent too: once the supervisor is gone a worker kills
//! its own process group, so nothing a unit started outlives the run.

use crate::error::Result;
use crate::facts::FactTable;
use crate::invoke::{install_panic_capture, invoke_with};
use crate::stream::{ResultStream, ResultTuple, StreamWriter};
use crate::unit::UnitDescriptor;
use nix::fcntl::OFlag;
use nix::sys::signal::{kill, killpg, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{close, fork, getpgrp, getpid, getppid, pipe2, setsid, ForkResult, Pid};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// How often the supervisor and the worker watchdogs look around
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Pause between SIGTERM and SIGKILL for expired workers
pub const KILL_GRACE: Duration = Duration::from_millis(250);

/// Which kind of pool is being run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// A fact resolution pass. Only real values are streamed, so crash
    /// reports and timeout markers never end up in the fact table.
    Facts,
    /// Check execution; verbose runs also stream diagnostics
    Checks,
}

impl Phase {
    fn verbose(self, facts: &FactTable) -> bool {
        match self {
            Phase::Facts => false,
            Phase::Checks => facts.verbose(),
        }
    }
}

/// Run `units` against `facts`, one process each.
///
/// Returns at once; results arrive on the stream in completion order,
/// followed by `Stats` and `EOF`. The budget comes from the `timeout` fact.
///
/// The caller must be single-threaded. The forked supervisor allocates,
/// logs and starts threads, so a lock held by another thread at fork time
/// (an async runtime, a logging writer) can deadlock it.
pub fn run(units: &[UnitDescriptor], facts: &FactTable, phase: Phase) -> Result<ResultStream> {
    let caller = getpid();
    let (read_end, write_end) = pipe2(OFlag::O_CLOEXEC)?;

    // SAFETY: the child only runs the supervisor and leaves through `_exit`
    match unsafe { fork() }? {
        ForkResult::Parent { child } => {
            drop(write_end);
            debug!("Supervisor {} started for {} units", child, units.len());
            Ok(ResultStream::new(File::from(read_end), Some(child)))
        }
        ForkResult::Child => {
            drop(read_end);
            let out = File::from(write_end);
            let code = panic::catch_unwind(AssertUnwindSafe(|| {
                supervise(units, facts, phase, caller, out)
            }))
            .unwrap_or(70);
            _exit(code)
        }
    }
}

/// One forked worker as seen by the supervisor
struct Worker {
    name: String,
    pid: Pid,
    /// Forwards the worker's frame; yields whether one was delivered
    reader: Option<JoinHandle<bool>>,
}

impl Worker {
    fn delivered(&mut self) -> bool {
        match self.reader.take().map(JoinHandle::join) {
            Some(Ok(delivered)) => delivered,
            Some(Err(_)) => {
                warn!("Reader for unit {} panicked", self.name);
                false
            }
            None => false,
        }
    }
}

fn supervise(
    units: &[UnitDescriptor],
    facts: &FactTable,
    phase: Phase,
    caller: Pid,
    out: File,
) -> i32 {
    let started = Instant::now();
    let supervisor = getpid();
    let timeout = facts.timeout();
    let verbose = phase.verbose(facts);
    let stream_fd = out.as_raw_fd();

    // Fork every worker before this process has any other thread
    let mut spawned = Vec::with_capacity(units.len());
    for unit in units {
        match spawn_worker(unit, facts, verbose, supervisor, stream_fd) {
            Ok((pid, pipe)) => spawned.push((unit.name().to_string(), pid, pipe)),
            Err(e) => error!("Failed to start unit {}: {}", unit.full_name(), e),
        }
    }

    let writer = Arc::new(StreamWriter::new(out));
    let mut running: Vec<Worker> = spawned
        .into_iter()
        .map(|(name, pid, pipe)| {
            let reader = forward_frame(name.clone(), pipe, Arc::clone(&writer));
            Worker {
                name,
                pid,
                reader: Some(reader),
            }
        })
        .collect();

    let total = running.len();
    let mut timed_out = 0;

    loop {
        running.retain_mut(|worker| match waitpid(worker.pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => true,
            Ok(status) => {
                debug!("Unit {} exited: {:?}", worker.name, status);
                worker.delivered();
                false
            }
            Err(e) => {
                warn!("Lost track of unit {} ({}): {}", worker.name, worker.pid, e);
                worker.delivered();
                false
            }
        });

        if running.is_empty() {
            break;
        }

        let caller_gone = getppid() != caller;
        if caller_gone {
            warn!("Caller {} is gone, stopping {} units", caller, running.len());
        }
        if caller_gone || started.elapsed() >= timeout {
            timed_out = terminate(&mut running, verbose, &writer);
            break;
        }

        thread::sleep(POLL_INTERVAL);
    }

    let summary = format!(
        "Ran {} units in {:.2} seconds, {} timed out.",
        total,
        started.elapsed().as_secs_f64(),
        timed_out
    );
    debug!("{}", summary);

    let finished = writer
        .send(&ResultTuple::stats(summary))
        .and_then(|_| writer.send(&ResultTuple::eof()));
    match finished {
        Ok(()) => 0,
        Err(e) => {
            error!("Failed to close result stream: {}", e);
            74
        }
    }
}

/// Kill every expired worker with its process group; returns how many
fn terminate(workers: &mut Vec<Worker>, verbose: bool, writer: &StreamWriter) -> usize {
    for worker in workers.iter() {
        error!("Unit {} timed out, killing process group {}", worker.name, worker.pid);
        signal_group(worker.pid, Signal::SIGTERM);
    }

    thread::sleep(KILL_GRACE);

    for worker in workers.iter() {
        signal_group(worker.pid, Signal::SIGKILL);
    }

    let count = workers.len();
    for mut worker in workers.drain(..) {
        let _ = kill(worker.pid, Signal::SIGKILL);
        if let Err(e) = waitpid(worker.pid, None) {
            debug!("Unit {} already reaped: {}", worker.name, e);
        }

        // A unit that finished right at the deadline keeps its result
        if !worker.delivered() && verbose {
            if let Err(e) = writer.send(&ResultTuple::timed_out(worker.name.as_str())) {
                warn!("Failed to report timeout of {}: {}", worker.name, e);
            }
        }
    }
    count
}

/// Leave a forked child without running atexit handlers or flushing stdio
/// buffers inherited from the parent
fn _exit(code: i32) -> ! {
    // SAFETY: `_exit` takes no pointers and never returns
    unsafe { nix::libc::_exit(code) }
}

fn signal_group(pgid: Pid, signal: Signal) {
    warn!("Sending {} to process group {}", signal, pgid);
    if let Err(e) = killpg(pgid, signal) {
        // The group may be gone already, or not formed yet
        debug!("{} to group {} failed: {}", signal, pgid, e);
    }
}

fn forward_frame(name: String, pipe: File, writer: Arc<StreamWriter>) -> JoinHandle<bool> {
    thread::spawn(move || {
        let mut reader = BufReader::new(pipe);
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) => false,
            Ok(_) => match ResultTuple::from_frame(&line) {
                Some(tuple) => match writer.send(&tuple) {
                    Ok(()) => true,
                    Err(e) => {
                        error!("Failed to forward result of {}: {}", name, e);
                        false
                    }
                },
                None => {
                    warn!("Unit {} left an incomplete result behind", name);
                    false
                }
            },
            Err(e) => {
                warn!("Failed to read result of {}: {}", name, e);
                false
            }
        }
    })
}

fn spawn_worker(
    unit: &UnitDescriptor,
    facts: &FactTable,
    verbose: bool,
    supervisor: Pid,
    stream_fd: RawFd,
) -> Result<(Pid, File)> {
    let (read_end, write_end) = pipe2(OFlag::O_CLOEXEC)?;

    // SAFETY: the supervisor is single-threaded here; the child leaves
    // through `_exit` without returning
    match unsafe { fork() }? {
        ForkResult::Parent { child } => {
            drop(write_end);
            debug!("Unit {} running as {}", unit.full_name(), child);
            Ok((child, File::from(read_end)))
        }
        ForkResult::Child => {
            drop(read_end);
            let _ = close(stream_fd);
            worker_main(unit, facts, verbose, supervisor, File::from(write_end))
        }
    }
}

fn worker_main(
    unit: &UnitDescriptor,
    facts: &FactTable,
    verbose: bool,
    supervisor: Pid,
    mut out: File,
) -> ! {
    if let Err(e) = setsid() {
        warn!("Unit {} could not get its own process group: {}", unit.name(), e);
    }

    // Both must happen before the watchdog thread exists
    install_panic_capture();
    std::env::set_var("RUST_LIB_BACKTRACE", "1");
    watch_parent(supervisor);

    let result = panic::catch_unwind(AssertUnwindSafe(|| invoke_with(unit, facts, verbose)));
    let code = match result {
        Ok(Some(tuple)) => match tuple.to_frame() {
            Ok(frame) => match out.write_all(&frame) {
                Ok(()) => 0,
                Err(_) => 74,
            },
            Err(_) => 65,
        },
        Ok(None) => 0,
        Err(_) => 70,
    };
    _exit(code)
}

/// Kill this worker's whole group once the supervisor is no longer its parent
fn watch_parent(supervisor: Pid) {
    let spawned = thread::Builder::new()
        .name("watchdog".to_string())
        .spawn(move || loop {
            thread::sleep(POLL_INTERVAL);
            if getppid() != supervisor {
                let _ = killpg(getpgrp(), Signal::SIGKILL);
                _exit(1);
            }
        });
    if let Err(e) = spawned {
        warn!("Failed to start watchdog: {}", e);
    }
}
