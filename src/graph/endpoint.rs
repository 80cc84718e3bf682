//! Endpoints: the bin's outward ports.
//!
//! An input endpoint receives a stream whose caps the upstream peer
//! declares; an output endpoint demands a stream for a downstream peer
//! whose acceptable caps it advertises. Endpoints carry at most one
//! current caps set, a sticky boundary-event store, and the two latches
//! the rebuild machinery reads (`needs_reconfigure`, `awaiting_drain`).

use std::fmt;

use compact_str::CompactString;

use crate::caps::Caps;

// =============================================================================
// EndpointId
// =============================================================================

/// Stable handle for an endpoint; identity survives reconfiguration.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointId(u32);

impl EndpointId {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EndpointId({})", self.0)
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ep#{}", self.0)
    }
}

// =============================================================================
// Boundary events
// =============================================================================

/// What a boundary event announces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A new stream begins.
    StreamStart,
    /// The upstream peer declared concrete caps.
    CapsDeclared(Caps),
    /// Timeline segment for the stream.
    Segment,
    /// End of stream; doubles as the drain marker while draining.
    Eos,
}

/// An event traveling along the stream boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryEvent {
    pub kind: EventKind,
}

impl BoundaryEvent {
    pub fn new(kind: EventKind) -> Self {
        Self { kind }
    }

    pub fn caps_declared(caps: Caps) -> Self {
        Self::new(EventKind::CapsDeclared(caps))
    }

    pub fn eos() -> Self {
        Self::new(EventKind::Eos)
    }

    /// Sticky events persist on the endpoint and are replayed into a
    /// freshly built subgraph; Eos is a point event.
    pub fn is_sticky(&self) -> bool {
        !matches!(self.kind, EventKind::Eos)
    }

    /// Sticky events replace a previous event of the same kind.
    fn same_kind(&self, other: &BoundaryEvent) -> bool {
        std::mem::discriminant(&self.kind) == std::mem::discriminant(&other.kind)
    }
}

// =============================================================================
// Endpoint
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointDirection {
    Input,
    Output,
}

/// One bin port and its per-port state.
#[derive(Debug)]
pub struct Endpoint {
    id: EndpointId,
    name: CompactString,
    direction: EndpointDirection,
    current_caps: Option<Caps>,
    sticky: Vec<BoundaryEvent>,
    needs_reconfigure: bool,
    awaiting_drain: bool,
}

impl Endpoint {
    fn new(id: EndpointId, name: &str, direction: EndpointDirection) -> Self {
        Self {
            id,
            name: CompactString::from(name),
            direction,
            current_caps: None,
            sticky: Vec::new(),
            needs_reconfigure: false,
            awaiting_drain: false,
        }
    }

    pub fn id(&self) -> EndpointId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> EndpointDirection {
        self.direction
    }

    /// Declared caps (inputs) or demanded caps (outputs).
    pub fn current_caps(&self) -> Option<&Caps> {
        self.current_caps.as_ref()
    }

    pub fn set_current_caps(&mut self, caps: Caps) {
        self.current_caps = Some(caps);
    }

    pub fn clear_current_caps(&mut self) {
        self.current_caps = None;
    }

    pub fn needs_reconfigure(&self) -> bool {
        self.needs_reconfigure
    }

    pub fn set_needs_reconfigure(&mut self, value: bool) {
        self.needs_reconfigure = value;
    }

    pub fn awaiting_drain(&self) -> bool {
        self.awaiting_drain
    }

    pub fn set_awaiting_drain(&mut self, value: bool) {
        self.awaiting_drain = value;
    }

    /// Store a sticky event, replacing any previous event of the same
    /// kind.
    pub fn store_sticky(&mut self, event: BoundaryEvent) {
        debug_assert!(event.is_sticky());
        if let Some(slot) = self.sticky.iter_mut().find(|e| e.same_kind(&event)) {
            *slot = event;
        } else {
            self.sticky.push(event);
        }
    }

    pub fn sticky_events(&self) -> &[BoundaryEvent] {
        &self.sticky
    }

    pub fn clear_sticky(&mut self) {
        self.sticky.clear();
    }
}

// =============================================================================
// EndpointTable
// =============================================================================

/// Insertion-ordered endpoint storage.
///
/// Endpoint counts are small, so lookups scan; what matters is that
/// iteration order is stable, which keeps every planning pass
/// deterministic.
#[derive(Debug, Default)]
pub struct EndpointTable {
    endpoints: Vec<Endpoint>,
    next_id: u32,
}

impl EndpointTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: &str, direction: EndpointDirection) -> EndpointId {
        let id = EndpointId::new(self.next_id);
        self.next_id += 1;
        self.endpoints.push(Endpoint::new(id, name, direction));
        id
    }

    pub fn remove(&mut self, id: EndpointId) -> bool {
        let before = self.endpoints.len();
        self.endpoints.retain(|e| e.id() != id);
        self.endpoints.len() != before
    }

    pub fn get(&self, id: EndpointId) -> Option<&Endpoint> {
        self.endpoints.iter().find(|e| e.id() == id)
    }

    pub fn get_mut(&mut self, id: EndpointId) -> Option<&mut Endpoint> {
        self.endpoints.iter_mut().find(|e| e.id() == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Endpoint> {
        self.endpoints.iter_mut()
    }

    pub fn inputs(&self) -> impl Iterator<Item = &Endpoint> {
        self.iter()
            .filter(|e| e.direction() == EndpointDirection::Input)
    }

    pub fn outputs(&self) -> impl Iterator<Item = &Endpoint> {
        self.iter()
            .filter(|e| e.direction() == EndpointDirection::Output)
    }
}

// =============================================================================
// Tests
// =============================================================================
