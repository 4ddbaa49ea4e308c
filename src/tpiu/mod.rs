//! ARM CoreSight TPIU/SWO trace control (spec §2 "TpiuSwoController").
//!
//! [`instance::TpiuSwoInstance`] owns a single TPIU/SWO block's configuration
//! and enable/disable lifecycle; [`TpiuSwoController`] is the named registry
//! of instances a host process drives, mirroring the `arm_tpiu_swo_list`
//! global list and its walk functions in `arm_tpiu_swo.c`.

pub mod instance;
pub mod registers;
pub mod sink;

use std::collections::HashMap;

use crate::collab::{ApRegisterAccess, ApResolver, EventRunner, TraceProbe};
use crate::error::{Error, Result};
use crate::target::Target;
use instance::TpiuSwoInstance;

/// Named registry of TPIU/SWO instances, one per DAP/AP pair a host process
/// has configured (spec §2, §4.4 "create/init/cleanup_all").
///
/// Generic over a single access-port type `A`, matching the scope decision
/// recorded in `DESIGN.md`: one concrete `ApResolver`/`Ap` type serves a
/// whole controller, rather than dynamic dispatch across heterogeneous
/// access-port implementations.
pub struct TpiuSwoController<A> {
    instances: HashMap<String, TpiuSwoInstance<A>>,
}

impl<A> Default for TpiuSwoController<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> TpiuSwoController<A> {
    /// An empty controller with no instances.
    pub fn new() -> Self {
        Self {
            instances: HashMap::new(),
        }
    }

    /// Creates a new instance named `name`. Fails if the name is already
    /// taken (spec §4.4 "create(name, opts): rejects a duplicate name").
    pub fn create(&mut self, name: impl Into<String>) -> Result<&mut TpiuSwoInstance<A>> {
        let name = name.into();
        if self.instances.contains_key(&name) {
            return Err(Error::DuplicateInstance(name));
        }
        let inst = TpiuSwoInstance::new(name.clone());
        Ok(self.instances.entry(name).or_insert(inst))
    }

    /// All instance names, in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.instances.keys().map(String::as_str)
    }

    /// Looks up an instance by name.
    pub fn get(&self, name: &str) -> Result<&TpiuSwoInstance<A>> {
        self.instances
            .get(name)
            .ok_or_else(|| Error::UnknownInstance(name.to_string()))
    }

    /// Looks up an instance by name, mutably.
    pub fn get_mut(&mut self, name: &str) -> Result<&mut TpiuSwoInstance<A>> {
        self.instances
            .get_mut(name)
            .ok_or_else(|| Error::UnknownInstance(name.to_string()))
    }

    /// The number of registered instances.
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Whether the registry holds no instances.
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

impl<A: ApRegisterAccess> TpiuSwoController<A> {
    /// Runs `enable()` on every instance that deferred enabling during
    /// config load (spec §4.4 "init(...): runs the deferred enable for every
    /// instance created with `enable` requested during config load").
    ///
    /// A single instance's failure is logged and does not prevent the
    /// remaining instances from being brought up.
    pub fn init(
        &mut self,
        resolver: &mut impl ApResolver<Ap = A>,
        probe: &mut impl TraceProbe,
        events: &mut impl EventRunner,
        target: &mut dyn Target,
    ) -> Result<()> {
        for (name, inst) in self.instances.iter_mut() {
            if !inst.deferred_enable() || inst.enabled() {
                continue;
            }
            if let Err(e) = inst.enable(false, resolver, probe, events, target) {
                tracing::error!(instance = %name, error = %e, "deferred TPIU/SWO enable failed");
            }
        }
        Ok(())
    }

    /// Disables every enabled instance and releases its access-port handle.
    /// Idempotent: instances already disabled are skipped without error
    /// (spec §8 Testable Property 9).
    pub fn cleanup_all(
        &mut self,
        probe: &mut impl TraceProbe,
        events: &mut impl EventRunner,
        target: &mut dyn Target,
    ) -> Result<()> {
        for inst in self.instances.values_mut() {
            if inst.enabled() {
                inst.disable(probe, events, target)?;
            }
            inst.release_ap();
        }
        Ok(())
    }

    /// Polls trace data for every currently-capturing instance.
    pub fn poll_all(&mut self, probe: &mut impl TraceProbe, target: &mut dyn Target) -> Result<()> {
        for inst in self.instances.values_mut() {
            if inst.capturing() {
                inst.poll_trace(probe, target)?;
            }
        }
        Ok(())
    }
}
