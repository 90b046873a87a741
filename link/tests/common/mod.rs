//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::header::{HeaderValue, RETRY_AFTER};
use reqwest::StatusCode;
use tokio::time::Instant;

use warehouse_link::codec::{encode_rows, ChunkPayload};
use warehouse_link::protocol::{SessionOptions, StatementRequest};
use warehouse_link::{
    Backend, ChunkLink, ColumnInfo, ComputeRef, HttpRequest, HttpResponse, HttpTransport,
    LinkError, ProtocolClient, RequestContext, Result, Row, SessionHandle, StatementHandle,
    StatementStatus, Submission, TransportFailure, TransportFailureKind, Value,
};

/// Canned outcome for one transport call.
#[derive(Debug, Clone)]
pub enum Step {
    Respond(HttpResponse),
    Fail(TransportFailure),
}

/// `HttpTransport` that replays a script and records every request with the
/// (tokio) instant it was sent.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Step>>,
    /// Replayed once the script runs out.
    fallback: Mutex<Option<Step>>,
    sent: Mutex<Vec<(Instant, HttpRequest)>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, status: u16, body: &str) -> &Self {
        self.push(Step::Respond(response(status, body)));
        self
    }

    pub fn respond_retry_after(&self, status: u16, retry_after: u64) -> &Self {
        self.push(Step::Respond(throttled(status, retry_after)));
        self
    }

    pub fn fail(&self, kind: TransportFailureKind) -> &Self {
        self.push(Step::Fail(TransportFailure::new(kind, "connection reset")));
        self
    }

    pub fn push(&self, step: Step) {
        self.script.lock().unwrap().push_back(step);
    }

    pub fn always(&self, step: Step) {
        *self.fallback.lock().unwrap() = Some(step);
    }

    pub fn calls(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.sent.lock().unwrap().iter().map(|(_, r)| r.clone()).collect()
    }

    /// Gaps between consecutive requests.
    pub fn gaps(&self) -> Vec<std::time::Duration> {
        let sent = self.sent.lock().unwrap();
        sent.windows(2).map(|pair| pair[1].0 - pair[0].0).collect()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportFailure> {
        self.sent.lock().unwrap().push((Instant::now(), request));
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.fallback.lock().unwrap().clone());
        match step {
            Some(Step::Respond(response)) => Ok(response),
            Some(Step::Fail(failure)) => Err(failure),
            None => Err(TransportFailure::new(TransportFailureKind::Io, "script exhausted")),
        }
    }
}

pub fn response(status: u16, body: &str) -> HttpResponse {
    HttpResponse::new(StatusCode::from_u16(status).unwrap(), body.to_string())
}

pub fn throttled(status: u16, retry_after: u64) -> HttpResponse {
    response(status, "slow down").with_header(
        RETRY_AFTER,
        HeaderValue::from_str(&retry_after.to_string()).unwrap(),
    )
}

pub fn columns() -> Vec<ColumnInfo> {
    vec![ColumnInfo::new("id", "BIGINT", 0), ColumnInfo::new("name", "STRING", 1)]
}

pub fn row(id: i64, name: Option<&str>) -> Row {
    Row::new(vec![Value::Int64(id), name.map(Value::from).unwrap_or(Value::Null)])
}

pub fn link(index: u64, rows: u64, expires_at: DateTime<Utc>) -> ChunkLink {
    ChunkLink {
        index,
        url: format!("https://storage.example.com/results/chunk-{}?sig=secret", index),
        expires_at,
        row_count: rows,
        row_offset: index * rows,
    }
}

pub fn fresh_link(index: u64, rows: u64) -> ChunkLink {
    link(index, rows, Utc::now() + ChronoDuration::hours(1))
}

/// Scripted `ProtocolClient` for coordinator and pager scenarios.
pub struct FakeProtocolClient {
    submission: Mutex<Option<Submission>>,
    polls: Mutex<VecDeque<StatementStatus>>,
    /// Returned once the poll script runs out.
    idle_status: StatementStatus,
    chunks: Mutex<HashMap<u64, Vec<Row>>>,
    pub poll_calls: AtomicUsize,
    pub cancel_calls: AtomicUsize,
    pub close_calls: AtomicUsize,
    pub fetched: Mutex<Vec<u64>>,
}

impl FakeProtocolClient {
    pub fn new(submission: Submission) -> Self {
        Self {
            submission: Mutex::new(Some(submission)),
            polls: Mutex::new(VecDeque::new()),
            idle_status: StatementStatus::running(),
            chunks: Mutex::new(HashMap::new()),
            poll_calls: AtomicUsize::new(0),
            cancel_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
            fetched: Mutex::new(Vec::new()),
        }
    }

    /// A client with no submission, for pager-only tests.
    pub fn for_chunks() -> Self {
        Self::new(Submission {
            handle: StatementHandle::new("unused"),
            status: StatementStatus::pending(),
        })
    }

    pub fn then_poll(self, status: StatementStatus) -> Self {
        self.polls.lock().unwrap().push_back(status);
        self
    }

    pub fn with_chunk(self, index: u64, rows: Vec<Row>) -> Self {
        self.chunks.lock().unwrap().insert(index, rows);
        self
    }

    pub fn polls(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }

    pub fn cancels(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }

    pub fn fetched(&self) -> Vec<u64> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProtocolClient for FakeProtocolClient {
    fn backend(&self) -> Backend {
        Backend::Rest
    }

    async fn open_session(
        &self,
        _compute: &ComputeRef,
        _options: &SessionOptions,
        _ctx: &RequestContext,
    ) -> Result<SessionHandle> {
        Ok(SessionHandle::new("session-1"))
    }

    async fn submit(
        &self,
        _session: &SessionHandle,
        _request: &StatementRequest,
        _ctx: &RequestContext,
    ) -> Result<Submission> {
        self.submission
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| LinkError::Protocol("statement submitted twice".into()))
    }

    async fn poll(&self, _handle: &StatementHandle, _ctx: &RequestContext) -> Result<StatementStatus> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.polls.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| self.idle_status.clone()))
    }

    async fn fetch_chunk(
        &self,
        _handle: &StatementHandle,
        link: &ChunkLink,
        _ctx: &RequestContext,
    ) -> Result<ChunkPayload> {
        self.fetched.lock().unwrap().push(link.index);
        let rows = self
            .chunks
            .lock()
            .unwrap()
            .get(&link.index)
            .cloned()
            .ok_or_else(|| LinkError::Protocol(format!("no chunk {}", link.index)))?;
        Ok(ChunkPayload::columnar(encode_rows(&columns(), &rows)?))
    }

    async fn cancel(&self, _handle: &StatementHandle, _ctx: &RequestContext) -> Result<()> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self, _handle: &StatementHandle, _ctx: &RequestContext) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close_session(&self, _session: &SessionHandle, _ctx: &RequestContext) -> Result<()> {
        Ok(())
    }
}
