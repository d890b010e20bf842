//! Shared test fixtures: a scripted driver and lifecycle-recording operations.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio_pq::{
    ConnStatus, Driver, DriverResult, Error, Flush, Operation, Polling, Progress, Readiness,
    Result, ResultStatus,
};

/// Everything the engine asked of the driver, plus operation lifecycle
/// events, in one ordered record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    SetNonblocking,
    ConnectPoll,
    ResetStart,
    ResetPoll,
    SendQuery(String),
    Flush,
    ConsumeInput,
    IsBusy,
    GetResult,
    Finish,
    Begin(&'static str),
    Perform(&'static str),
    Complete(&'static str, &'static str),
}

pub type Trace = Arc<Mutex<Vec<Call>>>;

pub fn trace() -> Trace {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn snapshot(trace: &Trace) -> Vec<Call> {
    trace.lock().unwrap().clone()
}

fn record(trace: &Trace, call: Call) {
    trace.lock().unwrap().push(call);
}

fn outcome_kind(outcome: &Result<()>) -> &'static str {
    match outcome {
        Ok(()) => "ok",
        Err(Error::Aborted) => "aborted",
        Err(Error::TimedOut(_)) => "timeout",
        Err(Error::Connection(_)) => "connection",
        Err(Error::Result(_)) => "result",
        Err(Error::Logic(_)) => "logic",
        Err(Error::Io(_)) => "io",
    }
}

/// Counts how many scripted results have been dropped.
#[derive(Clone, Default)]
pub struct ReleaseTracker(Arc<AtomicUsize>);

impl ReleaseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn released(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// A canned command result; dropping it records the release.
pub struct ScriptedResult {
    status: ResultStatus,
    error: String,
    rows: Vec<Vec<Option<String>>>,
    tracker: ReleaseTracker,
}

impl Drop for ScriptedResult {
    fn drop(&mut self) {
        self.tracker.0.fetch_add(1, Ordering::SeqCst);
    }
}

impl DriverResult for ScriptedResult {
    fn status(&self) -> ResultStatus {
        self.status
    }

    fn error_message(&self) -> String {
        self.error.clone()
    }

    fn ntuples(&self) -> usize {
        self.rows.len()
    }

    fn nfields(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    fn value(&self, row: usize, col: usize) -> Option<String> {
        self.rows[row][col].clone()
    }
}

pub fn command_ok(tracker: &ReleaseTracker) -> ScriptedResult {
    ScriptedResult {
        status: ResultStatus::CommandOk,
        error: String::new(),
        rows: Vec::new(),
        tracker: tracker.clone(),
    }
}

pub fn tuples(rows: &[&[&str]], tracker: &ReleaseTracker) -> ScriptedResult {
    ScriptedResult {
        status: ResultStatus::TuplesOk,
        error: String::new(),
        rows: rows
            .iter()
            .map(|row| row.iter().map(|value| Some((*value).to_string())).collect())
            .collect(),
        tracker: tracker.clone(),
    }
}

pub fn failed_result(error: &str, tracker: &ReleaseTracker) -> ScriptedResult {
    ScriptedResult {
        status: ResultStatus::FatalError,
        error: error.to_string(),
        rows: Vec::new(),
        tracker: tracker.clone(),
    }
}

/// The test-side peer of the driver's socket. Writing a byte makes the
/// driver's socket readable.
pub struct TestSocket {
    peer: UnixStream,
}

impl TestSocket {
    pub fn feed(&self) {
        (&self.peer).write_all(b"x").unwrap();
    }
}

/// A driver whose every answer is scripted by the test.
///
/// The socketed form owns one end of a nonblocking `UnixStream` pair so
/// readiness flows through the real reactor; `consume_input` drains it to
/// the blocking point, as the edge-triggered driver contract requires.
pub struct ScriptedDriver {
    trace: Trace,
    sock: Option<UnixStream>,
    swap_on_reset: Option<UnixStream>,
    status: ConnStatus,
    error: String,
    nonblocking_ok: bool,
    send_ok: bool,
    consume_ok: bool,
    reset_start_ok: bool,
    connect_polls: VecDeque<Polling>,
    reset_polls: VecDeque<Polling>,
    flushes: VecDeque<Flush>,
    busy: VecDeque<bool>,
    results: VecDeque<Option<ScriptedResult>>,
}

impl ScriptedDriver {
    fn new(trace: &Trace, sock: Option<UnixStream>) -> Self {
        ScriptedDriver {
            trace: trace.clone(),
            sock,
            swap_on_reset: None,
            status: ConnStatus::Started,
            error: String::new(),
            nonblocking_ok: true,
            send_ok: true,
            consume_ok: true,
            reset_start_ok: true,
            connect_polls: VecDeque::new(),
            reset_polls: VecDeque::new(),
            flushes: VecDeque::new(),
            busy: VecDeque::new(),
            results: VecDeque::new(),
        }
    }

    /// A driver with a live socket; the returned peer feeds readability.
    pub fn socketed(trace: &Trace) -> (Self, TestSocket) {
        let (sock, peer) = UnixStream::pair().unwrap();
        sock.set_nonblocking(true).unwrap();
        (Self::new(trace, Some(sock)), TestSocket { peer })
    }

    /// A driver that reports no socket at all.
    pub fn socketless(trace: &Trace) -> Self {
        Self::new(trace, None)
    }

    pub fn set_status(&mut self, status: ConnStatus) {
        self.status = status;
    }

    pub fn set_error(&mut self, error: &str) {
        self.error = error.to_string();
    }

    pub fn refuse_nonblocking(&mut self) {
        self.nonblocking_ok = false;
    }

    pub fn refuse_send(&mut self) {
        self.send_ok = false;
    }

    pub fn refuse_consume(&mut self) {
        self.consume_ok = false;
    }

    pub fn fail_reset_start(&mut self) {
        self.reset_start_ok = false;
    }

    pub fn expect_connect_polls(&mut self, polls: &[Polling]) {
        self.connect_polls.extend(polls.iter().copied());
    }

    pub fn expect_reset_polls(&mut self, polls: &[Polling]) {
        self.reset_polls.extend(polls.iter().copied());
    }

    pub fn push_flush(&mut self, flush: Flush) {
        self.flushes.push_back(flush);
    }

    pub fn push_busy(&mut self, busy: bool) {
        self.busy.push_back(busy);
    }

    pub fn push_result(&mut self, result: Option<ScriptedResult>) {
        self.results.push_back(result);
    }

    /// Script one command-style query round: a `CommandOk` result, then
    /// end-of-command.
    pub fn script_command(&mut self, tracker: &ReleaseTracker) {
        self.push_busy(false);
        self.push_result(Some(command_ok(tracker)));
        self.push_busy(false);
        self.push_result(None);
    }

    /// Script one row-returning query round.
    pub fn script_tuples(&mut self, rows: &[&[&str]], tracker: &ReleaseTracker) {
        self.push_busy(false);
        self.push_result(Some(tuples(rows, tracker)));
        self.push_busy(false);
        self.push_result(None);
    }

    /// Arrange for `reset_start` to swap the driver onto a fresh socket,
    /// as a real reset replaces the connection. The returned peer feeds
    /// the new socket.
    pub fn swap_socket_on_reset(&mut self) -> TestSocket {
        let (sock, peer) = UnixStream::pair().unwrap();
        sock.set_nonblocking(true).unwrap();
        self.swap_on_reset = Some(sock);
        TestSocket { peer }
    }

    fn record(&self, call: Call) {
        record(&self.trace, call);
    }

    fn poll_outcome(&mut self, poll: Polling) -> Polling {
        match poll {
            Polling::Ok => self.status = ConnStatus::Ok,
            Polling::Failed => self.status = ConnStatus::Bad,
            Polling::Reading => self.status = ConnStatus::AwaitingResponse,
            Polling::Writing => self.status = ConnStatus::Made,
        }
        poll
    }
}

impl Drop for ScriptedDriver {
    fn drop(&mut self) {
        self.record(Call::Finish);
    }
}

impl Driver for ScriptedDriver {
    type Result = ScriptedResult;

    fn start(_conninfo: &str) -> Result<Self> {
        Err(Error::Logic("scripted drivers are constructed directly".into()))
    }

    fn start_params(_params: &[(&str, &str)]) -> Result<Self> {
        Err(Error::Logic("scripted drivers are constructed directly".into()))
    }

    fn status(&self) -> ConnStatus {
        self.status
    }

    fn set_nonblocking(&mut self) -> bool {
        self.record(Call::SetNonblocking);
        self.nonblocking_ok
    }

    fn connect_poll(&mut self) -> Polling {
        self.record(Call::ConnectPoll);
        let poll = self.connect_polls.pop_front().expect("connect poll not scripted");
        self.poll_outcome(poll)
    }

    fn reset_start(&mut self) -> bool {
        self.record(Call::ResetStart);
        if let Some(sock) = self.swap_on_reset.take() {
            self.sock = Some(sock);
        }
        self.reset_start_ok
    }

    fn reset_poll(&mut self) -> Polling {
        self.record(Call::ResetPoll);
        let poll = self.reset_polls.pop_front().expect("reset poll not scripted");
        self.poll_outcome(poll)
    }

    fn socket(&self) -> Option<RawFd> {
        self.sock.as_ref().map(|sock| sock.as_raw_fd())
    }

    fn send_query(&mut self, sql: &str) -> bool {
        self.record(Call::SendQuery(sql.to_string()));
        self.send_ok
    }

    fn flush(&mut self) -> Flush {
        self.record(Call::Flush);
        self.flushes.pop_front().unwrap_or(Flush::Sent)
    }

    fn consume_input(&mut self) -> bool {
        self.record(Call::ConsumeInput);
        if let Some(sock) = self.sock.as_mut() {
            let mut buf = [0u8; 64];
            loop {
                match sock.read(&mut buf) {
                    Ok(0) => break,
                    Ok(_) => continue,
                    Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => break,
                    Err(_) => return false,
                }
            }
        }
        self.consume_ok
    }

    fn is_busy(&mut self) -> bool {
        self.record(Call::IsBusy);
        self.busy.pop_front().unwrap_or(false)
    }

    fn result(&mut self) -> Option<Self::Result> {
        self.record(Call::GetResult);
        self.results.pop_front().unwrap_or(None)
    }

    fn error_message(&self) -> String {
        self.error.clone()
    }
}

/// What a probe answers from `begin` and `perform`.
#[derive(Clone, Copy)]
enum ProbeKind {
    /// `begin` completes immediately
    Immediate,
    /// `begin` asks for readability and every `perform` asks again
    Waiting,
    /// `begin` fails with a connection error
    FailingBegin,
}

/// A minimal operation that records its lifecycle into the trace.
pub struct Probe {
    name: &'static str,
    kind: ProbeKind,
    timeout: Option<Duration>,
    trace: Trace,
    done: Option<oneshot::Sender<Result<()>>>,
}

impl Probe {
    fn new(
        name: &'static str,
        kind: ProbeKind,
        timeout: Option<Duration>,
        trace: &Trace,
    ) -> (Self, oneshot::Receiver<Result<()>>) {
        let (tx, rx) = oneshot::channel();
        (
            Probe {
                name,
                kind,
                timeout,
                trace: trace.clone(),
                done: Some(tx),
            },
            rx,
        )
    }

    pub fn immediate(name: &'static str, trace: &Trace) -> (Self, oneshot::Receiver<Result<()>>) {
        Self::new(name, ProbeKind::Immediate, None, trace)
    }

    pub fn waiting(name: &'static str, trace: &Trace) -> (Self, oneshot::Receiver<Result<()>>) {
        Self::new(name, ProbeKind::Waiting, None, trace)
    }

    pub fn waiting_with_timeout(
        name: &'static str,
        timeout: Duration,
        trace: &Trace,
    ) -> (Self, oneshot::Receiver<Result<()>>) {
        Self::new(name, ProbeKind::Waiting, Some(timeout), trace)
    }

    pub fn failing(name: &'static str, trace: &Trace) -> (Self, oneshot::Receiver<Result<()>>) {
        Self::new(name, ProbeKind::FailingBegin, None, trace)
    }
}

impl Operation<ScriptedDriver> for Probe {
    fn begin(&mut self, _driver: &mut ScriptedDriver) -> Result<Progress> {
        record(&self.trace, Call::Begin(self.name));
        match self.kind {
            ProbeKind::Immediate => Ok(Progress::Done),
            ProbeKind::Waiting => Ok(Progress::Read),
            ProbeKind::FailingBegin => Err(Error::connection("probe failure")),
        }
    }

    fn perform(&mut self, _driver: &mut ScriptedDriver, _readiness: Readiness) -> Result<Progress> {
        record(&self.trace, Call::Perform(self.name));
        Ok(Progress::Read)
    }

    fn complete(&mut self, outcome: Result<()>) {
        record(&self.trace, Call::Complete(self.name, outcome_kind(&outcome)));
        if let Some(done) = self.done.take() {
            let _ = done.send(outcome);
        }
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// Let the engine's worker task run.
pub async fn drain() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}
