//! The module graph: module slots, the connection protocol and synchronous
//! update propagation.
//!
//! Every output port owns one record in the [`PayloadArena`]. Connecting an
//! input stores the producer's record key, so the input reads the producer's
//! payload directly and sees every later mutation. A module that reports a
//! changed output triggers a fan-out to all subscribers of all its outputs
//! before the call that caused the change returns.

use crate::graph::error::{GraphError, GraphResult};
use crate::graph::id::{ModuleId, PortId};
use crate::graph::module::{AnyModule, Connection, InputPort, ModuleContext, OutputPort, PointerEvent};
use crate::graph::payload::{Payload, PayloadArena, ScalarValue};
use crate::graph::port::{PerKind, PortCounts, PortDirection, PortKind};
use serde::Serialize;
use std::time::Duration;

/// A slot holding a module and its materialized ports.
pub struct ModuleSlot {
    pub module: AnyModule,
    inputs: PerKind<Vec<InputPort>>,
    outputs: PerKind<Vec<OutputPort>>,
    /// Whether this module has been removed (slot is empty).
    pub removed: bool,
}

impl ModuleSlot {
    pub fn inputs(&self, kind: PortKind) -> &[InputPort] {
        self.inputs.get(kind)
    }

    pub fn outputs(&self, kind: PortKind) -> &[OutputPort] {
        self.outputs.get(kind)
    }

    fn input_ids(&self) -> Vec<PortId> {
        self.inputs
            .iter()
            .flat_map(|(_, ports)| ports.iter().map(|p| p.id))
            .collect()
    }

    /// Subscribers of every output, image family first, then scene, then base.
    fn subscriber_ids(&self) -> Vec<PortId> {
        self.outputs
            .iter()
            .flat_map(|(_, ports)| ports.iter().flat_map(|p| p.subscribers.iter().copied()))
            .collect()
    }
}

// ==================== Topology snapshot ====================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleSnapshot {
    pub id: u32,
    pub name: String,
    pub inputs: usize,
    pub outputs: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionSnapshot {
    pub kind: PortKind,
    pub from_module: u32,
    pub from_index: u16,
    pub to_module: u32,
    pub to_index: u16,
}

/// Live modules and connections of a graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopologySnapshot {
    pub modules: Vec<ModuleSnapshot>,
    pub connections: Vec<ConnectionSnapshot>,
}

// ==================== Graph ====================

/// The dataflow graph of modules.
#[derive(Default)]
pub struct Graph {
    slots: Vec<ModuleSlot>,
    arena: PayloadArena,
    /// Output waiting for the user to pick an input.
    pending_output: Option<PortId>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Modules ──

    /// Materialize the module's ports, run its initialization and publish
    /// whatever it produced.
    pub fn add_module(&mut self, module: impl Into<AnyModule>) -> GraphResult<ModuleId> {
        let module = module.into();
        let input_counts = PortCounts::resolve(module.inputs()).map_err(|kind| {
            GraphError::IncompleteArityDeclaration {
                module: module.name().to_string(),
                kind,
            }
        })?;
        let output_counts = PortCounts::resolve(module.outputs()).map_err(|kind| {
            GraphError::IncompleteArityDeclaration {
                module: module.name().to_string(),
                kind,
            }
        })?;

        let id = ModuleId(self.slots.len() as u32);
        let inputs = PerKind::from_fn(|kind| {
            (0..input_counts.get(kind))
                .map(|i| InputPort::new(PortId::input(id, kind, i as u16)))
                .collect()
        });
        let arena = &mut self.arena;
        let outputs = PerKind::from_fn(|kind| {
            (0..output_counts.get(kind))
                .map(|i| OutputPort::new(PortId::output(id, kind, i as u16), arena.allocate(kind)))
                .collect()
        });

        tracing::info!(
            "Added module {:?} '{}' ({} in / {} out)",
            id,
            module.name(),
            input_counts.total(),
            output_counts.total()
        );
        self.slots.push(ModuleSlot {
            module,
            inputs,
            outputs,
            removed: false,
        });

        match self.with_module(id, |m, ctx| m.on_init(ctx)) {
            Ok(true) => self.notify_outputs(id)?,
            Ok(false) => {}
            Err(e) => {
                // Nothing can be connected yet, so the slot is simply dropped.
                if let Some(mut slot) = self.slots.pop() {
                    for (_, ports) in slot.outputs.iter() {
                        for port in ports {
                            self.arena.release(port.payload);
                        }
                    }
                    slot.module.release_child_resources();
                }
                tracing::error!("Initialization of {:?} failed: {}", id, e);
                return Err(e);
            }
        }
        Ok(id)
    }

    /// Disconnect every port of the module, release its payloads and then its
    /// own resources. Each downstream input receives one reset update.
    pub fn remove_module(&mut self, id: ModuleId) -> GraphResult<()> {
        let slot = self.slot(id)?;
        let inputs = slot.input_ids();
        let subscribers = slot.subscriber_ids();
        let name = slot.module.name().to_string();

        for input in inputs {
            self.detach_input(input);
        }
        self.slots[id.index()].removed = true;

        let mut first_err = None;
        for input in subscribers {
            if self.detach_input(input).is_some() {
                tracing::debug!("Removal of {:?} reset {:?}", id, input);
                record_first(&mut first_err, self.deliver_update(input));
            }
        }

        let slot = &mut self.slots[id.index()];
        for kind in PortKind::ALL {
            for port in slot.outputs.get_mut(kind).iter_mut() {
                port.subscribers.clear();
                self.arena.release(port.payload);
            }
        }
        slot.module.release_child_resources();
        tracing::info!("Removed module {:?} '{}'", id, name);

        first_err.map_or(Ok(()), Err)
    }

    pub fn module(&self, id: ModuleId) -> Option<&AnyModule> {
        self.slot(id).ok().map(|slot| &slot.module)
    }

    pub fn module_mut(&mut self, id: ModuleId) -> Option<&mut AnyModule> {
        self.slots
            .get_mut(id.index())
            .filter(|slot| !slot.removed)
            .map(|slot| &mut slot.module)
    }

    pub fn slot(&self, id: ModuleId) -> GraphResult<&ModuleSlot> {
        self.slots
            .get(id.index())
            .filter(|slot| !slot.removed)
            .ok_or(GraphError::UnknownModule(id))
    }

    /// Ids of all live modules in insertion order.
    pub fn module_ids(&self) -> Vec<ModuleId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| !slot.removed)
            .map(|(i, _)| ModuleId(i as u32))
            .collect()
    }

    pub fn module_count(&self) -> usize {
        self.slots.iter().filter(|slot| !slot.removed).count()
    }

    /// Number of materialized ports of `kind` on one side of a module.
    pub fn port_count(
        &self,
        id: ModuleId,
        direction: PortDirection,
        kind: PortKind,
    ) -> GraphResult<usize> {
        let slot = self.slot(id)?;
        Ok(match direction {
            PortDirection::Input => slot.inputs.get(kind).len(),
            PortDirection::Output => slot.outputs.get(kind).len(),
        })
    }

    /// Payload records currently owned by outputs.
    pub fn payload_count(&self) -> usize {
        self.arena.len()
    }

    // ── Connections ──

    /// Connect `output` to `input`. A connection already held by `input` is
    /// torn down first. The input receives one update for the data already
    /// present on `output`.
    pub fn connect(&mut self, output: PortId, input: PortId) -> GraphResult<()> {
        if !output.is_output() {
            return Err(GraphError::DirectionMismatch(output));
        }
        if !input.is_input() {
            return Err(GraphError::DirectionMismatch(input));
        }
        let payload = self.output_port(output)?.payload;
        let previous = self.input_port(input)?.source;

        if output.kind != input.kind {
            return Err(GraphError::KindMismatch {
                output: output.kind,
                input: input.kind,
            });
        }
        if output.module == input.module {
            return Err(GraphError::SelfConnection(output.module));
        }
        if self.would_create_cycle(output.module, input.module) {
            return Err(GraphError::CycleDetected {
                from: output.module,
                to: input.module,
            });
        }

        if previous.is_some() {
            self.disconnect(input)?;
        }

        self.input_port_mut(input)?.source = Some(Connection { output, payload });
        let subscribers = &mut self.output_port_mut(output)?.subscribers;
        if !subscribers.contains(&input) {
            subscribers.push(input);
        }
        tracing::info!("Connected {:?} -> {:?}", output, input);

        self.deliver_update(input)
    }

    /// Detach `input` from its producer. The input reads the empty payload
    /// afterwards and receives one update. No-op when not connected.
    pub fn disconnect(&mut self, input: PortId) -> GraphResult<()> {
        if !input.is_input() {
            return Err(GraphError::DirectionMismatch(input));
        }
        self.input_port(input)?;
        match self.detach_input(input) {
            Some(output) => {
                tracing::info!("Disconnected {:?} -> {:?}", output, input);
                self.deliver_update(input)
            }
            None => Ok(()),
        }
    }

    /// Remember `output` as the producer of the next completed connection.
    pub fn begin_connection(&mut self, output: PortId) -> GraphResult<()> {
        if !output.is_output() {
            return Err(GraphError::DirectionMismatch(output));
        }
        self.output_port(output)?;
        if let Some(previous) = self.pending_output.replace(output) {
            tracing::debug!("Pending connection from {:?} replaced", previous);
        }
        Ok(())
    }

    /// Connect the pending output to `input`. The pending output is consumed
    /// whether or not the connection succeeds.
    pub fn complete_connection(&mut self, input: PortId) -> GraphResult<()> {
        let output = self.pending_output.take().ok_or_else(|| {
            GraphError::InvariantViolation("no connection is pending".to_string())
        })?;
        self.connect(output, input)
    }

    pub fn cancel_connection(&mut self) -> Option<PortId> {
        self.pending_output.take()
    }

    pub fn pending_connection(&self) -> Option<PortId> {
        self.pending_output
    }

    /// Output feeding `input`, if any.
    pub fn source_of(&self, input: PortId) -> GraphResult<Option<PortId>> {
        Ok(self.input_port(input)?.source.map(|c| c.output))
    }

    /// Inputs subscribed to `output`, in subscription order.
    pub fn subscribers(&self, output: PortId) -> GraphResult<&[PortId]> {
        Ok(&self.output_port(output)?.subscribers)
    }

    /// Number of updates `input` has received.
    pub fn input_update_count(&self, input: PortId) -> GraphResult<u64> {
        Ok(self.input_port(input)?.update_count)
    }

    /// Current payload seen through `input`; the empty payload of its kind
    /// while disconnected.
    pub fn input_payload(&self, input: PortId) -> GraphResult<Payload> {
        let port = self.input_port(input)?;
        let payload = port
            .source
            .and_then(|c| self.arena.get(c.payload))
            .cloned()
            .unwrap_or_else(|| Payload::empty(input.kind));
        Ok(payload)
    }

    pub fn output_payload(&self, output: PortId) -> GraphResult<&Payload> {
        let key = self.output_port(output)?.payload;
        self.arena.get(key).ok_or_else(|| {
            GraphError::InvariantViolation(format!("{:?} has no payload record", output))
        })
    }

    // ── External events ──

    /// Forward a committed parameter value to a module.
    pub fn submit_parameter(&mut self, id: ModuleId, value: ScalarValue) -> GraphResult<()> {
        tracing::debug!("Parameter {:?} submitted to {:?}", value, id);
        if self.with_module(id, |m, ctx| m.on_parameter_submitted(&value, ctx))? {
            self.notify_outputs(id)?;
        }
        Ok(())
    }

    /// Let every module finish asynchronous work that has completed.
    /// Returns how many modules published new outputs.
    pub fn pump_loads(&mut self) -> GraphResult<usize> {
        let mut published = 0;
        let mut first_err = None;
        for id in self.module_ids() {
            match self.with_module(id, |m, ctx| m.poll_pending(ctx)) {
                Ok(true) => {
                    published += 1;
                    record_first(&mut first_err, self.notify_outputs(id));
                }
                Ok(false) => {}
                Err(e) => record_first(&mut first_err, Err(e)),
            }
        }
        first_err.map_or(Ok(published), Err)
    }

    /// Advance every module by one frame of the external render loop.
    pub fn render_frame(&mut self, dt: Duration) -> GraphResult<()> {
        let mut first_err = None;
        for id in self.module_ids() {
            record_first(&mut first_err, self.with_module(id, |m, ctx| m.on_frame(dt, ctx)));
        }
        first_err.map_or(Ok(()), Err)
    }

    pub fn pointer_event(&mut self, id: ModuleId, event: &PointerEvent) -> GraphResult<()> {
        self.with_module(id, |m, ctx| m.on_pointer(event, ctx))
    }

    // ── Propagation ──

    /// Deliver one update to every subscriber of every output of `id`.
    ///
    /// All subscribers are served even if one of them fails; the first
    /// failure is returned.
    pub fn notify_outputs(&mut self, id: ModuleId) -> GraphResult<()> {
        let targets = self.slot(id)?.subscriber_ids();
        let mut first_err = None;
        for input in targets {
            record_first(&mut first_err, self.deliver_update(input));
        }
        first_err.map_or(Ok(()), Err)
    }

    fn deliver_update(&mut self, input: PortId) -> GraphResult<()> {
        match self.slots.get(input.module.index()) {
            Some(slot) if !slot.removed => {}
            _ => return Ok(()),
        }
        self.input_port_mut(input)?.update_count += 1;

        let changed = self.with_module(input.module, |m, ctx| m.on_input_changed(input.kind, ctx))?;
        if changed {
            self.notify_outputs(input.module)?;
        }
        Ok(())
    }

    /// Clear the source of `input` and drop it from its producer's
    /// subscribers without notifying anyone. Returns the former producer.
    fn detach_input(&mut self, input: PortId) -> Option<PortId> {
        let port = self
            .slots
            .get_mut(input.module.index())?
            .inputs
            .get_mut(input.kind)
            .get_mut(input.index as usize)?;
        let connection = port.source.take()?;
        if let Some(producer) = self
            .slots
            .get_mut(connection.output.module.index())
            .and_then(|slot| {
                slot.outputs
                    .get_mut(connection.output.kind)
                    .get_mut(connection.output.index as usize)
            })
        {
            producer.subscribers.retain(|s| *s != input);
        }
        Some(connection.output)
    }

    /// Whether `to` already reaches `from` through existing connections.
    fn would_create_cycle(&self, from: ModuleId, to: ModuleId) -> bool {
        let mut visited = vec![false; self.slots.len()];
        let mut stack = vec![to];

        while let Some(current) = stack.pop() {
            if current == from {
                return true;
            }
            let idx = current.index();
            if idx >= self.slots.len() || visited[idx] || self.slots[idx].removed {
                continue;
            }
            visited[idx] = true;
            stack.extend(self.slots[idx].subscriber_ids().into_iter().map(|p| p.module));
        }
        false
    }

    fn with_module<R>(
        &mut self,
        id: ModuleId,
        f: impl FnOnce(&mut AnyModule, &mut ModuleContext) -> GraphResult<R>,
    ) -> GraphResult<R> {
        let slot = self
            .slots
            .get_mut(id.index())
            .filter(|slot| !slot.removed)
            .ok_or(GraphError::UnknownModule(id))?;
        let mut ctx = ModuleContext::new(id, &slot.inputs, &slot.outputs, &mut self.arena);
        f(&mut slot.module, &mut ctx)
    }

    fn input_port(&self, id: PortId) -> GraphResult<&InputPort> {
        self.slot(id.module)?
            .inputs
            .get(id.kind)
            .get(id.index as usize)
            .filter(|_| id.is_input())
            .ok_or(GraphError::UnknownPort(id))
    }

    fn input_port_mut(&mut self, id: PortId) -> GraphResult<&mut InputPort> {
        self.slots
            .get_mut(id.module.index())
            .filter(|slot| !slot.removed)
            .ok_or(GraphError::UnknownModule(id.module))?
            .inputs
            .get_mut(id.kind)
            .get_mut(id.index as usize)
            .filter(|_| id.is_input())
            .ok_or(GraphError::UnknownPort(id))
    }

    fn output_port(&self, id: PortId) -> GraphResult<&OutputPort> {
        self.slot(id.module)?
            .outputs
            .get(id.kind)
            .get(id.index as usize)
            .filter(|_| id.is_output())
            .ok_or(GraphError::UnknownPort(id))
    }

    fn output_port_mut(&mut self, id: PortId) -> GraphResult<&mut OutputPort> {
        self.slots
            .get_mut(id.module.index())
            .filter(|slot| !slot.removed)
            .ok_or(GraphError::UnknownModule(id.module))?
            .outputs
            .get_mut(id.kind)
            .get_mut(id.index as usize)
            .filter(|_| id.is_output())
            .ok_or(GraphError::UnknownPort(id))
    }

    // ── Inspection ──

    pub fn topology(&self) -> TopologySnapshot {
        let mut modules = Vec::new();
        let mut connections = Vec::new();
        for (i, slot) in self.slots.iter().enumerate() {
            if slot.removed {
                continue;
            }
            modules.push(ModuleSnapshot {
                id: i as u32,
                name: slot.module.name().to_string(),
                inputs: slot.inputs.iter().map(|(_, p)| p.len()).sum(),
                outputs: slot.outputs.iter().map(|(_, p)| p.len()).sum(),
            });
            for (kind, ports) in slot.outputs.iter() {
                for port in ports {
                    for input in &port.subscribers {
                        connections.push(ConnectionSnapshot {
                            kind,
                            from_module: port.id.module.0,
                            from_index: port.id.index,
                            to_module: input.module.0,
                            to_index: input.index,
                        });
                    }
                }
            }
        }
        TopologySnapshot {
            modules,
            connections,
        }
    }
}

fn record_first(slot: &mut Option<GraphError>, result: GraphResult<()>) {
    if let Err(e) = result {
        match slot {
            None => *slot = Some(e),
            Some(_) => tracing::warn!("Additional propagation error: {}", e),
        }
    }
}
