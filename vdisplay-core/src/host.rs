//! Host display-server object model
//!
//! The registry never owns protocol objects directly. It asks the host to
//! create output and CRTC objects, publish modes and properties, and notify
//! listeners, through the [`DisplayHost`] trait.
//!
//! [`HeadlessHost`] is an in-process implementation that simply records
//! everything. Clones share state, so one clone can be handed to the display
//! while another observes it.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{DisplayError, Result};
use crate::properties::PropertyValue;
use crate::types::{Connection, Mode};

/// Host output object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputHandle(pub u32);

/// Host CRTC object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CrtcHandle(pub u32);

/// Operations the registry needs from the host display server
pub trait DisplayHost {
    /// Create a protocol-visible output object
    fn create_output(&mut self, name: &str) -> Result<OutputHandle>;

    /// Destroy an output object
    fn destroy_output(&mut self, output: OutputHandle);

    /// Create a protocol-visible CRTC object
    fn create_crtc(&mut self) -> Result<CrtcHandle>;

    /// Destroy a CRTC object
    fn destroy_crtc(&mut self, crtc: CrtcHandle);

    /// Make `crtc` the only CRTC able to drive `output`
    fn link(&mut self, output: OutputHandle, crtc: CrtcHandle) -> Result<()>;

    /// Replace the advertised mode list (preferred first)
    fn publish_modes(&mut self, output: OutputHandle, modes: &[Mode]) -> Result<()>;

    /// Register or update a property value
    fn publish_property(
        &mut self,
        output: OutputHandle,
        name: &str,
        value: PropertyValue,
    ) -> Result<()>;

    /// Update the connection status
    fn set_connection(&mut self, output: OutputHandle, connection: Connection);

    /// Announce pending changes on `output` to protocol listeners
    fn notify(&mut self, output: OutputHandle) -> Result<()>;

    /// Connection status of an output the host drives itself
    fn physical_connection(&self, output: OutputHandle) -> Connection;

    /// Modes of an output the host drives itself
    fn physical_modes(&self, output: OutputHandle) -> Vec<Mode>;
}

/// Everything the headless host knows about one output
#[derive(Debug, Clone)]
pub struct HostOutput {
    pub name: String,
    pub crtc: Option<CrtcHandle>,
    pub modes: Vec<Mode>,
    pub properties: BTreeMap<String, PropertyValue>,
    pub connection: Connection,
    /// Number of change notifications delivered
    pub notifications: u64,
    /// Created by `add_physical_output` rather than by the registry
    pub physical: bool,
}

#[derive(Debug, Default)]
struct HostState {
    next_id: u32,
    outputs: HashMap<OutputHandle, HostOutput>,
    crtcs: HashSet<CrtcHandle>,
}

impl HostState {
    fn next(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn output_mut(&mut self, output: OutputHandle) -> Result<&mut HostOutput> {
        self.outputs
            .get_mut(&output)
            .ok_or_else(|| DisplayError::host(format!("unknown output {:?}", output)))
    }
}

/// Recording host for headless operation and tests
#[derive(Debug, Clone, Default)]
pub struct HeadlessHost {
    state: Rc<RefCell<HostState>>,
}

impl HeadlessHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connected output that the host drives itself
    pub fn add_physical_output(&self, name: &str, modes: Vec<Mode>) -> OutputHandle {
        let mut state = self.state.borrow_mut();
        let handle = OutputHandle(state.next());
        state.outputs.insert(
            handle,
            HostOutput {
                name: name.to_string(),
                crtc: None,
                modes,
                properties: BTreeMap::new(),
                connection: Connection::Connected,
                notifications: 0,
                physical: true,
            },
        );
        handle
    }

    /// Snapshot of an output by handle
    pub fn output(&self, output: OutputHandle) -> Option<HostOutput> {
        self.state.borrow().outputs.get(&output).cloned()
    }

    /// Snapshot of an output by name
    pub fn output_by_name(&self, name: &str) -> Option<HostOutput> {
        self.state
            .borrow()
            .outputs
            .values()
            .find(|o| o.name == name)
            .cloned()
    }

    /// Published property value
    pub fn property(&self, output_name: &str, property: &str) -> Option<PropertyValue> {
        self.output_by_name(output_name)
            .and_then(|o| o.properties.get(property).cloned())
    }

    /// Number of live output objects (physical ones included)
    pub fn live_outputs(&self) -> usize {
        self.state.borrow().outputs.len()
    }

    /// Number of live CRTC objects
    pub fn live_crtcs(&self) -> usize {
        self.state.borrow().crtcs.len()
    }
}

impl DisplayHost for HeadlessHost {
    fn create_output(&mut self, name: &str) -> Result<OutputHandle> {
        let mut state = self.state.borrow_mut();
        if state.outputs.values().any(|o| o.name == name) {
            return Err(DisplayError::host(format!("output name {} already in use", name)));
        }
        let handle = OutputHandle(state.next());
        state.outputs.insert(
            handle,
            HostOutput {
                name: name.to_string(),
                crtc: None,
                modes: Vec::new(),
                properties: BTreeMap::new(),
                connection: Connection::Unknown,
                notifications: 0,
                physical: false,
            },
        );
        trace!("host output {} -> {:?}", name, handle);
        Ok(handle)
    }

    fn destroy_output(&mut self, output: OutputHandle) {
        self.state.borrow_mut().outputs.remove(&output);
    }

    fn create_crtc(&mut self) -> Result<CrtcHandle> {
        let mut state = self.state.borrow_mut();
        let handle = CrtcHandle(state.next());
        state.crtcs.insert(handle);
        Ok(handle)
    }

    fn destroy_crtc(&mut self, crtc: CrtcHandle) {
        let mut state = self.state.borrow_mut();
        state.crtcs.remove(&crtc);
        for output in state.outputs.values_mut() {
            if output.crtc == Some(crtc) {
                output.crtc = None;
            }
        }
    }

    fn link(&mut self, output: OutputHandle, crtc: CrtcHandle) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if !state.crtcs.contains(&crtc) {
            return Err(DisplayError::host(format!("unknown CRTC {:?}", crtc)));
        }
        state.output_mut(output)?.crtc = Some(crtc);
        Ok(())
    }

    fn publish_modes(&mut self, output: OutputHandle, modes: &[Mode]) -> Result<()> {
        self.state.borrow_mut().output_mut(output)?.modes = modes.to_vec();
        Ok(())
    }

    fn publish_property(
        &mut self,
        output: OutputHandle,
        name: &str,
        value: PropertyValue,
    ) -> Result<()> {
        self.state
            .borrow_mut()
            .output_mut(output)?
            .properties
            .insert(name.to_string(), value);
        Ok(())
    }

    fn set_connection(&mut self, output: OutputHandle, connection: Connection) {
        if let Ok(o) = self.state.borrow_mut().output_mut(output) {
            o.connection = connection;
        }
    }

    fn notify(&mut self, output: OutputHandle) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let o = state
            .output_mut(output)
            .map_err(|e| DisplayError::notification(e.to_string()))?;
        o.notifications += 1;
        Ok(())
    }

    fn physical_connection(&self, output: OutputHandle) -> Connection {
        self.state
            .borrow()
            .outputs
            .get(&output)
            .filter(|o| o.physical)
            .map(|o| o.connection)
            .unwrap_or(Connection::Unknown)
    }

    fn physical_modes(&self, output: OutputHandle) -> Vec<Mode> {
        self.state
            .borrow()
            .outputs
            .get(&output)
            .filter(|o| o.physical)
            .map(|o| o.modes.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let observer = HeadlessHost::new();
        let mut host = observer.clone();
        let out = host.create_output("XR-0").unwrap();
        host.publish_property(out, "WIDTH", PropertyValue::Integer(1920))
            .unwrap();

        assert_eq!(
            observer.property("XR-0", "WIDTH"),
            Some(PropertyValue::Integer(1920))
        );
    }

    #[test]
    fn test_duplicate_output_names_rejected() {
        let mut host = HeadlessHost::new();
        host.create_output("XR-0").unwrap();
        assert!(host.create_output("XR-0").is_err());
    }

    #[test]
    fn test_destroy_crtc_unlinks() {
        let mut host = HeadlessHost::new();
        let out = host.create_output("XR-0").unwrap();
        let crtc = host.create_crtc().unwrap();
        host.link(out, crtc).unwrap();
        host.destroy_crtc(crtc);
        assert_eq!(host.output(out).unwrap().crtc, None);
        assert_eq!(host.live_crtcs(), 0);
    }
}
