//! Per-domain policy hooks.
//!
//! The core is domain-agnostic; everything a video (or audio, or
//! subtitle) flavor wants to customize arrives as a record of optional
//! closures. Only the catalog provider is required — planning without one
//! is a fatal [`RouteError::MissingCatalog`].
//!
//! # Example
//!
//! ```
//! use autoroute::caps::Caps;
//! use autoroute::factory::CapsTransformFactory;
//! use autoroute::policy::Policy;
//!
//! let policy = Policy::new().with_catalog(|| {
//!     vec![CapsTransformFactory::new(
//!         "rgb2yuv",
//!         "Converter/Video",
//!         Caps::media("video/x-raw-rgb"),
//!         Caps::media("video/x-raw-yuv"),
//!     ) as _]
//! });
//! assert!(policy.catalog().is_ok());
//! ```

use std::sync::Arc;

use crate::caps::Caps;
use crate::chain::validator;
use crate::error::{RouteError, RouteResult};
use crate::factory::ElementFactory;
use crate::index::FactoryIndex;
use crate::plan::TransformationStep;

type CatalogFn = dyn Fn() -> Vec<Arc<dyn ElementFactory>> + Send + Sync;
type RouteFn = dyn Fn(&Caps, &Caps) -> bool + Send + Sync;
type ChainFn = dyn Fn(&Caps, &Caps, &[usize], &FactoryIndex) -> Option<usize> + Send + Sync;
type CostFn = dyn Fn(&TransformationStep) -> u32 + Send + Sync;
type BeginFn = dyn Fn() + Send + Sync;

/// Policy hook record. Every hook except the catalog provider has a
/// default; see the individual `with_*` methods.
pub struct Policy {
    get_factories: Option<Box<CatalogFn>>,
    validate_route: Option<Box<RouteFn>>,
    validate_chain: Option<Box<ChainFn>>,
    cost_step: Option<Box<CostFn>>,
    begin_building_graph: Option<Box<BeginFn>>,
    klass_ordering: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            get_factories: None,
            validate_route: None,
            validate_chain: None,
            cost_step: None,
            begin_building_graph: None,
            klass_ordering: true,
        }
    }
}

impl Policy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Required: the candidate factory catalog.
    pub fn with_catalog<F>(mut self, f: F) -> Self
    where
        F: Fn() -> Vec<Arc<dyn ElementFactory>> + Send + Sync + 'static,
    {
        self.get_factories = Some(Box::new(f));
        self
    }

    /// Reject a (sink caps, output caps) route before any enumeration.
    /// Default accepts everything.
    pub fn with_route_validator<F>(mut self, f: F) -> Self
    where
        F: Fn(&Caps, &Caps) -> bool + Send + Sync + 'static,
    {
        self.validate_route = Some(Box::new(f));
        self
    }

    /// Replace the whole chain-validator composition. The closure returns
    /// the deepest failing index, or `None` to accept.
    pub fn with_chain_validator<F>(mut self, f: F) -> Self
    where
        F: Fn(&Caps, &Caps, &[usize], &FactoryIndex) -> Option<usize> + Send + Sync + 'static,
    {
        self.validate_chain = Some(Box::new(f));
        self
    }

    /// Per-step cost. Default is 1 per step.
    pub fn with_step_cost<F>(mut self, f: F) -> Self
    where
        F: Fn(&TransformationStep) -> u32 + Send + Sync + 'static,
    {
        self.cost_step = Some(Box::new(f));
        self
    }

    /// Called once at the start of every planning pass, before any chain
    /// is tested. A place for the host to snapshot state the cost hook
    /// reads (a video policy tracks the min/max input resolution here).
    pub fn on_begin_building_graph<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.begin_building_graph = Some(Box::new(f));
        self
    }

    /// Enable or disable the class-ordering validator inside the default
    /// chain validation. Enabled by default; ignored when a custom chain
    /// validator is installed.
    pub fn with_klass_ordering(mut self, enabled: bool) -> Self {
        self.klass_ordering = enabled;
        self
    }

    // -------------------------------------------------------------------------
    // Invocation (used by the core)
    // -------------------------------------------------------------------------

    /// Fetch the catalog, failing when no provider was configured.
    pub fn catalog(&self) -> RouteResult<Vec<Arc<dyn ElementFactory>>> {
        match &self.get_factories {
            Some(f) => Ok(f()),
            None => Err(RouteError::MissingCatalog),
        }
    }

    pub fn validate_route(&self, sink_caps: &Caps, output_caps: &Caps) -> bool {
        match &self.validate_route {
            Some(f) => f(sink_caps, output_caps),
            None => true,
        }
    }

    /// Run chain validation: the installed override, or the built-in
    /// composition (connectivity, duplicates, then class ordering when
    /// enabled).
    pub fn validate_chain(
        &self,
        sink_caps: &Caps,
        src_caps: &Caps,
        chain: &[usize],
        index: &FactoryIndex,
    ) -> Option<usize> {
        match &self.validate_chain {
            Some(f) => f(sink_caps, src_caps, chain, index),
            None => validator::validate_default(sink_caps, src_caps, chain, index, self.klass_ordering),
        }
    }

    pub fn cost_step(&self, step: &TransformationStep) -> u32 {
        match &self.cost_step {
            Some(f) => f(step),
            None => 1,
        }
    }

    pub fn begin_building_graph(&self) {
        if let Some(f) = &self.begin_building_graph {
            f();
        }
    }
}

impl std::fmt::Debug for Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Policy")
            .field("has_catalog", &self.get_factories.is_some())
            .field("has_route_validator", &self.validate_route.is_some())
            .field("has_chain_validator", &self.validate_chain.is_some())
            .field("has_step_cost", &self.cost_step.is_some())
            .field("klass_ordering", &self.klass_ordering)
            .finish()
    }
}
