//! Result stream between worker processes and the report stage
//!
//! Frames are single JSON lines on an OS pipe. Many writers, one reader.
//! `Stats` always comes right before `EOF`, and `EOF` is always last.

use crate::error::Result;
use nix::sys::wait::{waitpid, WaitPidFlag};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Name of the end-of-stream sentinel
pub const EOF: &str = "EOF";

/// Name of the summary sentinel
pub const STATS: &str = "Stats";

/// Output reported for a unit killed at the timeout (verbose runs only)
pub const TIMED_OUT_MARKER: &str = "Timed out (use --time-out to increase timeout)";

/// One (unit-name, output) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultTuple {
    pub name: String,
    /// `None` means the unit ran cleanly with nothing to say
    pub output: Option<String>,
}

impl ResultTuple {
    pub fn new(name: impl Into<String>, output: Option<String>) -> Self {
        Self {
            name: name.into(),
            output,
        }
    }

    pub fn stats(summary: impl Into<String>) -> Self {
        Self::new(STATS, Some(summary.into()))
    }

    pub fn eof() -> Self {
        Self::new(EOF, Some(EOF.to_string()))
    }

    pub fn timed_out(name: impl Into<String>) -> Self {
        Self::new(name, Some(TIMED_OUT_MARKER.to_string()))
    }

    pub fn is_eof(&self) -> bool {
        self.name == EOF
    }

    pub fn is_stats(&self) -> bool {
        self.name == STATS
    }

    /// Encode as one newline-terminated frame
    pub fn to_frame(&self) -> Result<Vec<u8>> {
        let mut frame = serde_json::to_vec(self)?;
        frame.push(b'\n');
        Ok(frame)
    }

    /// Decode one frame; a frame cut short by a killed writer is rejected
    pub fn from_frame(line: &str) -> Option<Self> {
        if !line.ends_with('\n') {
            return None;
        }
        serde_json::from_str(line.trim_end()).ok()
    }
}

/// Mutex-guarded write end of the stream.
///
/// Every enqueue holds the lock for the whole frame, so concurrent writers
/// never interleave.
pub struct StreamWriter {
    inner: Mutex<File>,
}

impl StreamWriter {
    pub fn new(file: File) -> Self {
        Self {
            inner: Mutex::new(file),
        }
    }

    pub fn send(&self, tuple: &ResultTuple) -> Result<()> {
        let frame = tuple.to_frame()?;
        let mut file = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        file.write_all(&frame)?;
        file.flush()?;
        Ok(())
    }
}

/// Read end of the stream, owned by the single consumer
pub struct ResultStream {
    reader: BufReader<File>,
    supervisor: Option<Pid>,
    finished: bool,
}

impl ResultStream {
    /// Wrap the read end; `supervisor` is reaped once EOF is read
    pub fn new(file: File, supervisor: Option<Pid>) -> Self {
        Self {
            reader: BufReader::new(file),
            supervisor,
            finished: false,
        }
    }

    /// Block for the next tuple. After EOF every call returns EOF again.
    pub fn recv(&mut self) -> Result<ResultTuple> {
        if self.finished {
            return Ok(ResultTuple::eof());
        }

        loop {
            let mut line = String::new();
            let read = self.reader.read_line(&mut line)?;
            if read == 0 {
                warn!("Result stream closed before EOF; ending it here");
                self.finish();
                return Ok(ResultTuple::eof());
            }

            match ResultTuple::from_frame(&line) {
                Some(tuple) => {
                    if tuple.is_eof() {
                        self.finish();
                    }
                    return Ok(tuple);
                }
                None => warn!("Dropping malformed result frame: {:?}", line.trim_end()),
            }
        }
    }

    /// Drain to EOF into name -> output, the "dict object" view of a run
    pub fn collect_map(&mut self) -> Result<BTreeMap<String, Option<String>>> {
        let mut result = BTreeMap::new();
        loop {
            let tuple = self.recv()?;
            if tuple.is_eof() {
                break;
            }
            result.insert(tuple.name, tuple.output);
        }
        Ok(result)
    }

    /// Read and discard up to EOF; returns how many tuples were skipped
    pub fn drain(&mut self) -> Result<usize> {
        let mut skipped = 0;
        while !self.recv()?.is_eof() {
            skipped += 1;
        }
        Ok(skipped)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Process producing this stream, until it has been reaped
    pub fn supervisor(&self) -> Option<Pid> {
        self.supervisor
    }

    fn finish(&mut self) {
        self.finished = true;
        if let Some(pid) = self.supervisor.take() {
            // The supervisor exits right after writing EOF
            match waitpid(pid, None) {
                Ok(status) => debug!("Supervisor {} finished: {:?}", pid, status),
                Err(e) => debug!("Supervisor {} already reaped: {}", pid, e),
            }
        }
    }
}

impl Iterator for ResultStream {
    type Item = ResultTuple;

    /// Tuples up to, not including, EOF
    fn next(&mut self) -> Option<ResultTuple> {
        match self.recv() {
            Ok(tuple) if tuple.is_eof() => None,
            Ok(tuple) => Some(tuple),
            Err(e) => {
                warn!("Failed to read result stream: {}", e);
                self.finish();
                None
            }
        }
    }
}

impl Drop for ResultStream {
    fn drop(&mut self) {
        if let Some(pid) = self.supervisor.take() {
            // Do not block on a supervisor that is still running its phase
            let _ = waitpid(pid, Some(WaitPidFlag::WNOHANG));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::unistd::pipe;

    fn stream_pair() -> (StreamWriter, ResultStream) {
        let (read_end, write_end) = pipe().unwrap();
        (
            StreamWriter::new(File::from(write_end)),
            ResultStream::new(File::from(read_end), None),
        )
    }

    #[test]
    fn test_frames_are_single_lines() {
        let tuple = ResultTuple::new("DiskUsage", Some("line one\nline two".to_string()));
        let frame = tuple.to_frame().unwrap();
        assert_eq!(frame.iter().filter(|b| **b == b'\n').count(), 1);

        let line = String::from_utf8(frame).unwrap();
        assert_eq!(ResultTuple::from_frame(&line), Some(tuple));
    }

    #[test]
    fn test_truncated_frame_rejected() {
        assert_eq!(ResultTuple::from_frame("{\"name\":\"Disk"), None);
        assert_eq!(ResultTuple::from_frame("not json\n"), None);
    }

    #[test]
    fn test_stream_in_order_until_eof() {
        let (writer, mut stream) = stream_pair();
        writer.send(&ResultTuple::new("LoadAvg", Some("high".to_string()))).unwrap();
        writer.send(&ResultTuple::new("Hostname", None)).unwrap();
        writer.send(&ResultTuple::stats("Ran 2 units.")).unwrap();
        writer.send(&ResultTuple::eof()).unwrap();

        let names: Vec<String> = stream.by_ref().map(|t| t.name).collect();
        assert_eq!(names, vec!["LoadAvg", "Hostname", STATS]);
        assert!(stream.is_finished());
        assert!(stream.recv().unwrap().is_eof());
    }

    #[test]
    fn test_closed_pipe_becomes_eof() {
        let (writer, mut stream) = stream_pair();
        writer.send(&ResultTuple::new("LoadAvg", None)).unwrap();
        drop(writer);

        assert_eq!(stream.recv().unwrap().name, "LoadAvg");
        assert!(stream.recv().unwrap().is_eof());
    }

    #[test]
    fn test_collect_map() {
        let (writer, mut stream) = stream_pair();
        writer.send(&ResultTuple::timed_out("Slow")).unwrap();
        writer.send(&ResultTuple::eof()).unwrap();

        let map = stream.collect_map().unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map["Slow"].as_deref(), Some(TIMED_OUT_MARKER));
    }

    #[test]
    fn test_drain_skips_to_eof() {
        let (writer, mut stream) = stream_pair();
        writer.send(&ResultTuple::new("LoadAvg", None)).unwrap();
        writer.send(&ResultTuple::stats("Ran 1 units")).unwrap();
        writer.send(&ResultTuple::eof()).unwrap();

        assert_eq!(stream.drain().unwrap(), 2);
        assert!(stream.is_finished());
        assert_eq!(stream.drain().unwrap(), 0);
    }
}
