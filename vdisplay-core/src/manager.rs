//! Manager control endpoint
//!
//! A permanently disconnected, non-desktop pseudo-output. Clients create and
//! delete virtual outputs by writing its two string properties.

use tracing::{info, warn};

use crate::command::{CreateRequest, ManagerCommand, parse_delete, validate_name};
use crate::error::{DisplayError, Result};
use crate::host::{DisplayHost, OutputHandle};
use crate::properties::{CREATE_OUTPUT, DELETE_OUTPUT, NON_DESKTOP, PropertyValue};
use crate::registry::Registry;
use crate::types::Connection;

/// The control endpoint
#[derive(Debug)]
pub struct ManagerEndpoint {
    name: String,
    handle: OutputHandle,
}

impl ManagerEndpoint {
    /// Register the endpoint with the host
    pub fn create(host: &mut dyn DisplayHost, name: &str) -> Result<Self> {
        validate_name(name)?;
        let handle = host.create_output(name)?;

        let published = host
            .publish_property(handle, NON_DESKTOP, PropertyValue::Bool(true))
            .and_then(|_| host.publish_property(handle, CREATE_OUTPUT, PropertyValue::Text(String::new())))
            .and_then(|_| host.publish_property(handle, DELETE_OUTPUT, PropertyValue::Text(String::new())));
        if let Err(e) = published {
            host.destroy_output(handle);
            return Err(e);
        }
        host.set_connection(handle, Connection::Disconnected);

        info!("Manager endpoint {} ready", name);
        Ok(Self {
            name: name.to_string(),
            handle,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> OutputHandle {
        self.handle
    }

    /// Always disconnected so it is never offered as a monitor
    pub fn detect(&self) -> Connection {
        Connection::Disconnected
    }

    /// Handle a property write
    pub fn handle_write(
        &self,
        registry: &mut Registry,
        property: &str,
        value: &PropertyValue,
    ) -> Result<()> {
        let payload = value.as_text().ok_or_else(|| {
            DisplayError::validation(format!("{} takes a string, got {}", property, value))
        })?;

        let command = match property {
            CREATE_OUTPUT => CreateRequest::parse(payload).map(ManagerCommand::Create),
            DELETE_OUTPUT => parse_delete(payload).map(|name| ManagerCommand::Delete { name }),
            other => Err(DisplayError::validation(format!(
                "{} has no property {}",
                self.name, other
            ))),
        };

        match command {
            Ok(command) => self.execute(registry, command),
            Err(e) => {
                warn!("Rejected {} write {:?}: {}", property, payload, e);
                Err(e)
            }
        }
    }

    /// Run a parsed command against the registry
    pub fn execute(&self, registry: &mut Registry, command: ManagerCommand) -> Result<()> {
        let result = match &command {
            ManagerCommand::Create(request) => {
                if request.name == self.name {
                    Err(DisplayError::validation(format!(
                        "{} is reserved for the manager endpoint",
                        request.name
                    )))
                } else {
                    registry.create(&request.name, request.mode).map(|_| ())
                }
            }
            ManagerCommand::Delete { name } => registry.delete(name),
        };

        if let Err(e) = &result {
            warn!("{:?} failed: {}", command, e);
        }
        result
    }

    /// Remove the endpoint from the host
    pub fn destroy(self, host: &mut dyn DisplayHost) {
        host.destroy_output(self.handle);
        info!("Manager endpoint {} removed", self.name);
    }
}
