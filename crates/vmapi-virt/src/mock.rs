//! In-memory hypervisor for tests and local development.
//!
//! [`MockGateway`] keeps domains in a map, records every call it receives and
//! can be told to fail any operation. It implements both
//! [`HypervisorGateway`] and [`GatewayConnector`]; connecting hands out the
//! same shared instance so a test can inspect what the code under test did.

use crate::descriptor::DomainDescriptor;
use crate::domain::{Domain, DomainState};
use crate::error::{Result, VirtError};
use crate::gateway::{GatewayConnector, HypervisorGateway};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Gateway operations, used for failure injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOp {
    Connect,
    Lookup,
    Define,
    Start,
    Name,
    State,
    GracefulStop,
    ForceStop,
    Undefine,
    CloneAndResize,
}

/// A call received by the mock, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    Connect(String),
    Lookup(Uuid),
    Define(DomainDescriptor),
    Start(Uuid),
    Name(Uuid),
    State(Uuid),
    GracefulStop(Uuid),
    ForceStop(Uuid),
    Undefine(Uuid),
    CloneAndResize {
        base: PathBuf,
        dest: PathBuf,
        size_gb: u32,
        allow_shrink: bool,
    },
}

impl GatewayCall {
    /// The operation this call belongs to.
    pub fn op(&self) -> GatewayOp {
        match self {
            GatewayCall::Connect(_) => GatewayOp::Connect,
            GatewayCall::Lookup(_) => GatewayOp::Lookup,
            GatewayCall::Define(_) => GatewayOp::Define,
            GatewayCall::Start(_) => GatewayOp::Start,
            GatewayCall::Name(_) => GatewayOp::Name,
            GatewayCall::State(_) => GatewayOp::State,
            GatewayCall::GracefulStop(_) => GatewayOp::GracefulStop,
            GatewayCall::ForceStop(_) => GatewayOp::ForceStop,
            GatewayCall::Undefine(_) => GatewayOp::Undefine,
            GatewayCall::CloneAndResize { .. } => GatewayOp::CloneAndResize,
        }
    }
}

#[derive(Debug, Clone)]
struct MockDomain {
    name: String,
    state: DomainState,
}

#[derive(Debug, Default)]
struct MockState {
    domains: HashMap<Uuid, MockDomain>,
    calls: Vec<GatewayCall>,
    failures: HashSet<GatewayOp>,
    /// Graceful stop is accepted but the guest keeps running.
    ignore_graceful_stop: bool,
    /// Create an empty file at the clone destination.
    touch_disks: bool,
    /// Time each operation spends before it takes effect.
    delays: HashMap<GatewayOp, Duration>,
}

/// Scriptable in-memory hypervisor.
#[derive(Debug, Clone, Default)]
pub struct MockGateway {
    state: Arc<Mutex<MockState>>,
}

impl MockGateway {
    /// Create an empty mock hypervisor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an existing domain.
    pub fn insert_domain(&self, id: Uuid, name: impl Into<String>, state: DomainState) {
        self.state.lock().domains.insert(
            id,
            MockDomain {
                name: name.into(),
                state,
            },
        );
    }

    /// Make every future call of `op` fail.
    pub fn fail_on(&self, op: GatewayOp) {
        self.state.lock().failures.insert(op);
    }

    /// Accept graceful stop requests without changing the domain state.
    pub fn ignore_graceful_stop(&self) {
        self.state.lock().ignore_graceful_stop = true;
    }

    /// Make every future call of `op` wait for `delay` before it takes effect.
    pub fn delay_on(&self, op: GatewayOp, delay: Duration) {
        self.state.lock().delays.insert(op, delay);
    }

    /// Write an empty file at the destination of every clone.
    pub fn touch_disks(&self) {
        self.state.lock().touch_disks = true;
    }

    /// State of a domain, if it is defined.
    pub fn domain_state(&self, id: Uuid) -> Option<DomainState> {
        self.state.lock().domains.get(&id).map(|d| d.state)
    }

    /// Whether a domain with this UUID is defined.
    pub fn is_defined(&self, id: Uuid) -> bool {
        self.state.lock().domains.contains_key(&id)
    }

    /// Number of defined domains.
    pub fn domain_count(&self) -> usize {
        self.state.lock().domains.len()
    }

    /// All calls received so far.
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state.lock().calls.clone()
    }

    /// The operations received so far, in order.
    pub fn ops(&self) -> Vec<GatewayOp> {
        self.state.lock().calls.iter().map(GatewayCall::op).collect()
    }

    /// How many times `op` was called.
    pub fn count(&self, op: GatewayOp) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.op() == op)
            .count()
    }

    /// Descriptors passed to `define_from_descriptor`.
    pub fn defined_descriptors(&self) -> Vec<DomainDescriptor> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                GatewayCall::Define(d) => Some(d.clone()),
                _ => None,
            })
            .collect()
    }

    /// Record `call` and fail if its operation was scripted to fail.
    fn record(&self, call: GatewayCall) -> Result<()> {
        let op = call.op();
        let mut state = self.state.lock();
        state.calls.push(call);
        if state.failures.contains(&op) {
            return Err(VirtError::Mock(format!("{op:?} failed")));
        }
        Ok(())
    }

    /// Wait out any scripted delay for the call's operation, then record it.
    async fn enter(&self, call: GatewayCall) -> Result<()> {
        let delay = self.state.lock().delays.get(&call.op()).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.record(call)
    }

    fn with_domain<T>(&self, id: Uuid, f: impl FnOnce(&mut MockDomain) -> T) -> Result<T> {
        let mut state = self.state.lock();
        state
            .domains
            .get_mut(&id)
            .map(f)
            .ok_or_else(|| VirtError::DomainNotFound(id.to_string()))
    }
}

#[async_trait]
impl GatewayConnector for MockGateway {
    async fn connect(&self, uri: &str) -> Result<Arc<dyn HypervisorGateway>> {
        self.enter(GatewayCall::Connect(uri.to_string()))
            .await
            .map_err(|e| VirtError::Connect {
                uri: uri.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Arc::new(self.clone()))
    }
}

#[async_trait]
impl HypervisorGateway for MockGateway {
    async fn lookup_by_identifier(&self, id: Uuid) -> Result<Domain> {
        self.enter(GatewayCall::Lookup(id)).await?;
        self.with_domain(id, |_| Domain::new(id))
    }

    async fn define_from_descriptor(&self, descriptor: &DomainDescriptor) -> Result<Domain> {
        self.enter(GatewayCall::Define(descriptor.clone())).await?;
        self.state.lock().domains.insert(
            descriptor.uuid(),
            MockDomain {
                name: descriptor.name().to_string(),
                state: DomainState::Shutoff,
            },
        );
        Ok(Domain::new(descriptor.uuid()))
    }

    async fn start(&self, domain: &Domain) -> Result<()> {
        self.enter(GatewayCall::Start(domain.uuid())).await?;
        self.with_domain(domain.uuid(), |d| d.state = DomainState::Running)
    }

    async fn name(&self, domain: &Domain) -> Result<String> {
        self.enter(GatewayCall::Name(domain.uuid())).await?;
        self.with_domain(domain.uuid(), |d| d.name.clone())
    }

    async fn state(&self, domain: &Domain) -> Result<DomainState> {
        self.enter(GatewayCall::State(domain.uuid())).await?;
        self.with_domain(domain.uuid(), |d| d.state)
    }

    async fn request_graceful_stop(&self, domain: &Domain) -> Result<()> {
        self.enter(GatewayCall::GracefulStop(domain.uuid())).await?;
        let ignore = self.state.lock().ignore_graceful_stop;
        self.with_domain(domain.uuid(), |d| {
            if !ignore {
                d.state = DomainState::Shutoff;
            }
        })
    }

    async fn force_stop(&self, domain: &Domain) -> Result<()> {
        self.enter(GatewayCall::ForceStop(domain.uuid())).await?;
        self.with_domain(domain.uuid(), |d| d.state = DomainState::Shutoff)
    }

    async fn undefine(&self, domain: &Domain) -> Result<()> {
        self.enter(GatewayCall::Undefine(domain.uuid())).await?;
        self.state
            .lock()
            .domains
            .remove(&domain.uuid())
            .map(|_| ())
            .ok_or_else(|| VirtError::DomainNotFound(domain.uuid().to_string()))
    }

    async fn clone_and_resize(
        &self,
        base: &Path,
        dest: &Path,
        size_gb: u32,
        allow_shrink: bool,
    ) -> Result<()> {
        self.enter(GatewayCall::CloneAndResize {
            base: base.to_path_buf(),
            dest: dest.to_path_buf(),
            size_gb,
            allow_shrink,
        })
        .await?;
        let touch = self.state.lock().touch_disks;
        if touch {
            tokio::fs::write(dest, b"").await?;
        }
        Ok(())
    }
}
