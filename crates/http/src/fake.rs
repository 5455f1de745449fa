//! Scripted in-memory hosts for exercising the adapters and the client.

use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    io,
    rc::Rc,
};

use guestio_reactor::Pollable;

use crate::{
    client::Options,
    error::Error,
    host::{
        HttpHost, IncomingBody, IncomingResponse, OutgoingBody, ReadStream, RequestHead,
        ResponseFuture, StreamError, WriteStream,
    },
};

/// Capacity reported once a script runs out.
const DEFAULT_CAPACITY: u64 = 64 * 1024;

/// Always ready; the fake host never actually sleeps.
pub struct FakePollable;

impl Pollable for FakePollable {
    fn ready(&self) -> bool {
        true
    }

    fn poll_list(list: &[&Self]) -> Vec<u32> {
        assert!(!list.is_empty(), "poll of empty list");
        (0..u32::try_from(list.len()).unwrap()).collect()
    }
}

/// One scripted outcome of a host read. An exhausted script closes the
/// stream.
pub enum ReadStep {
    NotReady,
    Chunk(Vec<u8>),
    Fail(String),
}

struct ReadState {
    script: RefCell<VecDeque<ReadStep>>,
    reads: Cell<usize>,
    subscribes: Cell<usize>,
}

#[derive(Clone)]
pub struct FakeReadStream {
    state: Rc<ReadState>,
}

impl FakeReadStream {
    pub fn new(script: Vec<ReadStep>) -> Self {
        Self {
            state: Rc::new(ReadState {
                script: RefCell::new(script.into()),
                reads: Cell::new(0),
                subscribes: Cell::new(0),
            }),
        }
    }

    pub fn reads(&self) -> usize {
        self.state.reads.get()
    }

    pub fn subscribes(&self) -> usize {
        self.state.subscribes.get()
    }
}

impl ReadStream for FakeReadStream {
    type Pollable = FakePollable;

    fn read(&self, _max: u64) -> Result<Vec<u8>, StreamError> {
        self.state.reads.set(self.state.reads.get() + 1);
        match self.state.script.borrow_mut().pop_front() {
            Some(ReadStep::NotReady) => Ok(Vec::new()),
            Some(ReadStep::Chunk(chunk)) => Ok(chunk),
            Some(ReadStep::Fail(message)) => Err(StreamError::Failed(io::Error::other(message))),
            None => Err(StreamError::Closed),
        }
    }

    fn subscribe(&self) -> FakePollable {
        self.state.subscribes.set(self.state.subscribes.get() + 1);
        FakePollable
    }
}

enum WriteOp {
    Write(Vec<u8>),
    Flush,
}

struct WriteState {
    capacity: RefCell<VecDeque<u64>>,
    failure: RefCell<Option<String>>,
    ops: RefCell<Vec<WriteOp>>,
    subscribes: Cell<usize>,
}

/// Write stream with a scripted capacity budget per `check_write` call.
#[derive(Clone)]
pub struct FakeWriteStream {
    state: Rc<WriteState>,
}

impl FakeWriteStream {
    pub fn new(capacity: Vec<u64>) -> Self {
        Self {
            state: Rc::new(WriteState {
                capacity: RefCell::new(capacity.into()),
                failure: RefCell::new(None),
                ops: RefCell::new(Vec::new()),
                subscribes: Cell::new(0),
            }),
        }
    }

    pub fn set_capacity(&self, capacity: Vec<u64>) {
        *self.state.capacity.borrow_mut() = capacity.into();
    }

    /// Fail the next host call with `message`.
    pub fn fail_with(&self, message: &str) {
        *self.state.failure.borrow_mut() = Some(message.to_owned());
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state
            .ops
            .borrow()
            .iter()
            .filter_map(|op| match op {
                WriteOp::Write(bytes) => Some(bytes.clone()),
                WriteOp::Flush => None,
            })
            .collect()
    }

    pub fn total_written(&self) -> usize {
        self.writes().iter().map(Vec::len).sum()
    }

    pub fn flushes(&self) -> usize {
        self.state
            .ops
            .borrow()
            .iter()
            .filter(|op| matches!(op, WriteOp::Flush))
            .count()
    }

    pub fn subscribes(&self) -> usize {
        self.state.subscribes.get()
    }

    /// True when every flush was preceded by at least one write since the
    /// flush before it.
    pub fn flush_follows_writes(&self) -> bool {
        let mut wrote = false;
        for op in self.state.ops.borrow().iter() {
            match op {
                WriteOp::Write(_) => wrote = true,
                WriteOp::Flush => {
                    if !wrote {
                        return false;
                    }
                    wrote = false;
                }
            }
        }
        true
    }
}

impl WriteStream for FakeWriteStream {
    type Pollable = FakePollable;

    fn check_write(&self) -> Result<u64, StreamError> {
        if let Some(message) = self.state.failure.borrow_mut().take() {
            return Err(StreamError::Failed(io::Error::other(message)));
        }
        Ok(self
            .state
            .capacity
            .borrow_mut()
            .pop_front()
            .unwrap_or(DEFAULT_CAPACITY))
    }

    fn write(&self, bytes: &[u8]) -> Result<(), StreamError> {
        self.state
            .ops
            .borrow_mut()
            .push(WriteOp::Write(bytes.to_vec()));
        Ok(())
    }

    fn flush(&self) -> Result<(), StreamError> {
        self.state.ops.borrow_mut().push(WriteOp::Flush);
        Ok(())
    }

    fn subscribe(&self) -> FakePollable {
        self.state.subscribes.set(self.state.subscribes.get() + 1);
        FakePollable
    }
}

pub struct FakeIncomingBody {
    stream: RefCell<Option<FakeReadStream>>,
    finishes: Rc<Cell<u32>>,
}

impl FakeIncomingBody {
    pub fn new(stream: FakeReadStream) -> Self {
        Self {
            stream: RefCell::new(Some(stream)),
            finishes: Rc::new(Cell::new(0)),
        }
    }

    pub fn finishes(&self) -> Rc<Cell<u32>> {
        Rc::clone(&self.finishes)
    }
}

impl IncomingBody for FakeIncomingBody {
    type Stream = FakeReadStream;

    fn stream(&self) -> Result<FakeReadStream, ()> {
        self.stream.borrow_mut().take().ok_or(())
    }

    fn finish(self) {
        self.finishes.set(self.finishes.get() + 1);
    }
}

pub struct FakeOutgoingBody {
    stream: RefCell<Option<FakeWriteStream>>,
    finishes: Rc<Cell<u32>>,
}

impl FakeOutgoingBody {
    pub fn new(stream: FakeWriteStream) -> Self {
        Self {
            stream: RefCell::new(Some(stream)),
            finishes: Rc::new(Cell::new(0)),
        }
    }

    pub fn finishes(&self) -> Rc<Cell<u32>> {
        Rc::clone(&self.finishes)
    }
}

impl OutgoingBody for FakeOutgoingBody {
    type Stream = FakeWriteStream;

    fn stream(&self) -> Result<FakeWriteStream, ()> {
        self.stream.borrow_mut().take().ok_or(())
    }

    fn finish(self) -> io::Result<()> {
        self.finishes.set(self.finishes.get() + 1);
        Ok(())
    }
}

pub struct FakeIncomingResponse {
    status: u16,
    headers: Vec<(String, Vec<u8>)>,
    body: RefCell<Option<FakeIncomingBody>>,
}

impl FakeIncomingResponse {
    /// Response with no headers and an immediately closed body.
    pub fn empty(status: u16) -> Self {
        Self::with_body(status, FakeReadStream::new(Vec::new()))
    }

    pub fn with_headers(status: u16, headers: Vec<(String, Vec<u8>)>) -> Self {
        Self {
            headers,
            ..Self::empty(status)
        }
    }

    pub fn with_body(status: u16, stream: FakeReadStream) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: RefCell::new(Some(FakeIncomingBody::new(stream))),
        }
    }
}

impl IncomingResponse for FakeIncomingResponse {
    type Body = FakeIncomingBody;

    fn status(&self) -> u16 {
        self.status
    }

    fn headers(&self) -> Vec<(String, Vec<u8>)> {
        self.headers.clone()
    }

    fn consume(&self) -> Result<FakeIncomingBody, ()> {
        self.body.borrow_mut().take().ok_or(())
    }
}

pub struct FakeResponseFuture {
    outcome: RefCell<Option<Result<FakeIncomingResponse, String>>>,
    /// Resolve only after this many request-body bytes reached the host.
    gate: Option<(FakeWriteStream, usize)>,
    taken: Cell<bool>,
}

impl ResponseFuture for FakeResponseFuture {
    type Pollable = FakePollable;
    type Response = FakeIncomingResponse;
    type ErrorCode = String;

    fn get(&self) -> Option<Result<Result<FakeIncomingResponse, String>, ()>> {
        if self.taken.get() {
            return Some(Err(()));
        }
        if let Some((stream, bytes)) = &self.gate
            && stream.total_written() < *bytes
        {
            return None;
        }
        self.outcome.borrow_mut().take().map(|outcome| {
            self.taken.set(true);
            Ok(outcome)
        })
    }

    fn subscribe(&self) -> FakePollable {
        FakePollable
    }
}

/// One-exchange host: scripted response, shared request stream, and a log
/// of the heads and options it was handed.
pub struct FakeHttpHost {
    response: RefCell<Option<Result<FakeIncomingResponse, String>>>,
    gate: Cell<Option<usize>>,
    stream: FakeWriteStream,
    heads: Rc<RefCell<Vec<RequestHead>>>,
    options: Rc<RefCell<Vec<Options>>>,
}

impl FakeHttpHost {
    pub fn new() -> Self {
        Self {
            response: RefCell::new(None),
            gate: Cell::new(None),
            stream: FakeWriteStream::new(Vec::new()),
            heads: Rc::new(RefCell::new(Vec::new())),
            options: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn respond(&self, response: FakeIncomingResponse) {
        *self.response.borrow_mut() = Some(Ok(response));
    }

    /// Hold the response head back until `bytes` of request body arrived.
    pub fn respond_after_written(&self, response: FakeIncomingResponse, bytes: usize) {
        self.respond(response);
        self.gate.set(Some(bytes));
    }

    pub fn fail(&self, code: &str) {
        *self.response.borrow_mut() = Some(Err(code.to_owned()));
    }

    pub fn request_stream(&self) -> FakeWriteStream {
        self.stream.clone()
    }

    pub fn set_write_capacity(&self, capacity: Vec<u64>) {
        self.stream.set_capacity(capacity);
    }

    pub fn heads(&self) -> Rc<RefCell<Vec<RequestHead>>> {
        Rc::clone(&self.heads)
    }

    pub fn options(&self) -> Rc<RefCell<Vec<Options>>> {
        Rc::clone(&self.options)
    }
}

impl HttpHost for FakeHttpHost {
    type Pollable = FakePollable;
    type RequestStream = FakeWriteStream;
    type RequestBody = FakeOutgoingBody;
    type ResponseStream = FakeReadStream;
    type ResponseBody = FakeIncomingBody;
    type Response = FakeIncomingResponse;
    type Future = FakeResponseFuture;

    fn start(
        &self,
        head: RequestHead,
        options: &Options,
    ) -> Result<(FakeResponseFuture, FakeOutgoingBody), Error> {
        self.heads.borrow_mut().push(head);
        self.options.borrow_mut().push(*options);
        let outcome = self
            .response
            .borrow_mut()
            .take()
            .expect("no scripted response");
        let future = FakeResponseFuture {
            outcome: RefCell::new(Some(outcome)),
            gate: self.gate.take().map(|bytes| (self.stream.clone(), bytes)),
            taken: Cell::new(false),
        };
        Ok((future, FakeOutgoingBody::new(self.stream.clone())))
    }
}
