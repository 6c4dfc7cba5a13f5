//! Test double for [`GpuBackend`] that tracks handle creation and release.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;

use super::wgsl::{self, CompiledShader};
use super::{GpuBackend, ProbeError, ShaderStage, Vertex};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum HandleKind {
    Shader,
    Program,
    VertexBuffer,
    TimerQuery,
}

/// When the mock reports a query result as available.
#[derive(Debug, Copy, Clone)]
pub enum Availability {
    AfterPolls(u64),
    Never,
    DeviceLost,
}

#[derive(Debug, Clone)]
pub struct DrawRecord {
    pub timed: bool,
    pub vertex_count: usize,
    pub clear_color: [f64; 4],
    pub live_shaders: usize,
}

/// Snapshot of handle bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    created: Vec<(u64, HandleKind)>,
    released: Vec<(u64, HandleKind)>,
    double_releases: Vec<u64>,
}

impl Ledger {
    pub fn created(&self, kind: HandleKind) -> usize {
        self.created.iter().filter(|(_, k)| *k == kind).count()
    }

    pub fn released(&self, kind: HandleKind) -> usize {
        self.released.iter().filter(|(_, k)| *k == kind).count()
    }

    pub fn live(&self, kind: HandleKind) -> usize {
        self.created(kind) - self.released(kind)
    }

    pub fn double_releases(&self) -> &[u64] {
        &self.double_releases
    }
}

#[derive(Default)]
struct LedgerState {
    next_id: u64,
    ledger: Ledger,
    released_ids: HashSet<u64>,
}

type SharedLedger = Rc<RefCell<LedgerState>>;

/// Device object owned by the mock; dropping it records the release.
pub struct MockHandle {
    id: u64,
    kind: HandleKind,
    ledger: SharedLedger,
}

impl MockHandle {
    fn create(ledger: &SharedLedger, kind: HandleKind) -> Self {
        let mut state = ledger.borrow_mut();
        let id = state.next_id;
        state.next_id += 1;
        state.ledger.created.push((id, kind));
        Self {
            id,
            kind,
            ledger: Rc::clone(ledger),
        }
    }
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        let mut state = self.ledger.borrow_mut();
        if !state.released_ids.insert(self.id) {
            state.ledger.double_releases.push(self.id);
        }
        state.ledger.released.push((self.id, self.kind));
    }
}

pub struct MockShader {
    _handle: MockHandle,
    compiled: CompiledShader,
}

pub struct MockVertexBuffer {
    _handle: MockHandle,
    count: usize,
}

pub struct MockQuery {
    _handle: MockHandle,
    issued: Cell<bool>,
}

pub struct MockBackend {
    ledger: SharedLedger,
    availability: Availability,
    elapsed_ns: u64,
    fail_upload: bool,
    polls: Cell<u64>,
    draws: RefCell<Vec<DrawRecord>>,
    uploaded: RefCell<Vec<Vertex>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            ledger: SharedLedger::default(),
            availability: Availability::AfterPolls(2),
            elapsed_ns: 250_000,
            fail_upload: false,
            polls: Cell::new(0),
            draws: RefCell::new(Vec::new()),
            uploaded: RefCell::new(Vec::new()),
        }
    }

    pub fn with_availability(mut self, availability: Availability) -> Self {
        self.availability = availability;
        self
    }

    pub fn with_elapsed_ns(mut self, elapsed_ns: u64) -> Self {
        self.elapsed_ns = elapsed_ns;
        self
    }

    pub fn failing_upload(mut self) -> Self {
        self.fail_upload = true;
        self
    }

    /// A query that behaves as if a timed draw had been submitted.
    pub fn issued_query(&self) -> MockQuery {
        MockQuery {
            _handle: MockHandle::create(&self.ledger, HandleKind::TimerQuery),
            issued: Cell::new(true),
        }
    }

    pub fn ledger(&self) -> Ledger {
        self.ledger.borrow().ledger.clone()
    }

    pub fn polls(&self) -> u64 {
        self.polls.get()
    }

    pub fn draws(&self) -> Vec<DrawRecord> {
        self.draws.borrow().clone()
    }

    pub fn uploaded(&self) -> Vec<Vertex> {
        self.uploaded.borrow().clone()
    }
}

impl GpuBackend for MockBackend {
    type Shader = MockShader;
    type Program = MockHandle;
    type VertexBuffer = MockVertexBuffer;
    type TimerQuery = MockQuery;

    fn compile_shader(&self, stage: ShaderStage, source: &str) -> Result<MockShader, ProbeError> {
        let compiled = wgsl::compile(stage, source)?;
        Ok(MockShader {
            _handle: MockHandle::create(&self.ledger, HandleKind::Shader),
            compiled,
        })
    }

    fn link_program(
        &self,
        vertex: &MockShader,
        fragment: &MockShader,
    ) -> Result<MockHandle, ProbeError> {
        wgsl::link(&vertex.compiled, &fragment.compiled, Vertex::attributes())?;
        Ok(MockHandle::create(&self.ledger, HandleKind::Program))
    }

    fn upload_vertices(&self, vertices: &[Vertex]) -> Result<MockVertexBuffer, ProbeError> {
        if self.fail_upload {
            return Err(ProbeError::device("vertex upload", "out of memory"));
        }
        self.uploaded.borrow_mut().extend_from_slice(vertices);
        Ok(MockVertexBuffer {
            _handle: MockHandle::create(&self.ledger, HandleKind::VertexBuffer),
            count: vertices.len(),
        })
    }

    fn create_timer_query(&self) -> Result<MockQuery, ProbeError> {
        Ok(MockQuery {
            _handle: MockHandle::create(&self.ledger, HandleKind::TimerQuery),
            issued: Cell::new(false),
        })
    }

    fn draw(
        &self,
        _program: &MockHandle,
        vertices: &MockVertexBuffer,
        clear_color: [f64; 4],
        timer: Option<&MockQuery>,
    ) -> Result<(), ProbeError> {
        if let Some(query) = timer {
            query.issued.set(true);
        }
        let live_shaders = self.ledger().live(HandleKind::Shader);
        self.draws.borrow_mut().push(DrawRecord {
            timed: timer.is_some(),
            vertex_count: vertices.count,
            clear_color,
            live_shaders,
        });
        Ok(())
    }

    fn query_available(&self, query: &MockQuery) -> Result<bool, ProbeError> {
        if !query.issued.get() {
            return Err(ProbeError::QueryNotIssued);
        }
        let polls = self.polls.get() + 1;
        self.polls.set(polls);

        match self.availability {
            Availability::AfterPolls(n) => Ok(polls >= n),
            Availability::Never => Ok(false),
            Availability::DeviceLost => Err(ProbeError::device("query poll", "device lost")),
        }
    }

    fn query_elapsed_ns(&self, query: &MockQuery) -> Result<u64, ProbeError> {
        if !query.issued.get() {
            return Err(ProbeError::QueryNotIssued);
        }
        Ok(self.elapsed_ns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropping_a_handle_records_one_release() {
        let backend = MockBackend::new();
        let query = backend.create_timer_query().unwrap();
        assert_eq!(backend.ledger().live(HandleKind::TimerQuery), 1);

        drop(query);
        let ledger = backend.ledger();
        assert_eq!(ledger.released(HandleKind::TimerQuery), 1);
        assert!(ledger.double_releases().is_empty());
    }

    #[test]
    fn unissued_query_cannot_be_polled() {
        let backend = MockBackend::new();
        let query = backend.create_timer_query().unwrap();
        assert!(matches!(
            backend.query_available(&query),
            Err(ProbeError::QueryNotIssued)
        ));
    }
}
