//! Property slots targeted by `receiver.name = value`

use crate::analysis::TightenTypes;
use crate::dataflow::{ConcreteType, Singleton, SlotId, PROTOTYPE_PROPERTY};
use crate::error::Result;
use indexmap::IndexSet;
use smallvec::SmallVec;

pub(crate) type PropertySlots = SmallVec<[SlotId; 4]>;

impl<'p> TightenTypes<'p> {
    /// Slots a property assignment flows into, one per possible receiver.
    ///
    /// Instances resolve through their prototype chain and grow an expando slot on
    /// their own scope when no scope in the chain declares the property. An `ALL`
    /// receiver reaches every existing slot of that name.
    pub(crate) fn property_slots(&mut self, receiver: &ConcreteType, name: &str) -> Result<PropertySlots> {
        if receiver.is_all() {
            return Ok(self.wide_property_slots(name));
        }

        let mut slots = PropertySlots::new();
        for member in receiver.members() {
            let slot = match member {
                Singleton::Instance(id) => {
                    let scope = self.instances[id.index()].scope;
                    match self.graph.lookup(scope, name) {
                        Some(slot) => slot,
                        None => self.graph.declare_slot(scope, name)?,
                    }
                }
                // assigning `F.prototype` replaces the object; its shape is already fixed
                Singleton::Function(_) if name == PROTOTYPE_PROPERTY => continue,
                Singleton::Function(id) => {
                    let scope = self.functions[id.index()].property_scope;
                    match self.graph.own_slot(scope, name) {
                        Some(slot) => slot,
                        None => self.graph.declare_slot(scope, name)?,
                    }
                }
            };
            if !slots.contains(&slot) {
                slots.push(slot);
            }
        }
        Ok(slots)
    }

    fn wide_property_slots(&self, name: &str) -> PropertySlots {
        let instance_slots = self
            .instances
            .values()
            .filter_map(|instance| self.graph.lookup(instance.scope, name));
        let function_slots = self
            .functions
            .values()
            .filter_map(|function| self.graph.own_slot(function.property_scope, name));
        instance_slots
            .chain(function_slots)
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect()
    }
}
