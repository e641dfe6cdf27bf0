use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use emulator::{ErrorKind, Result};
use emulator::plug::{AnyPluggable, Pluggable, PluggableHandle};
use emulator::plug::connector::AnyConnector;
use emulator::time::EmuTime;

/// What a connector remembers across a save/restore: the *name* of its
/// device. References don't survive a round-trip, names do.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ConnectorState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugged: Option<String>,
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct PlugState {
    pub connectors: BTreeMap<String, ConnectorState>,
}

/// Registry of every connector and pluggable of one machine.
///
/// Connectors belong to the ports that create them and are only referenced
/// here; pluggables are owned by the registry.
pub struct PluggingController {
    self_ref: Weak<PluggingController>,
    connectors: RefCell<BTreeMap<String, Weak<dyn AnyConnector>>>,
    pluggables: RefCell<BTreeMap<String, Rc<dyn AnyPluggable>>>,
}

impl fmt::Debug for PluggingController {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PluggingController")
            .field("connectors", &self.connector_names())
            .field("pluggables", &self.pluggable_names())
            .finish()
    }
}

/// Keeps a connector registered. Dropping it unregisters the connector.
pub struct ConnectorRegistration {
    controller: Weak<PluggingController>,
    name: String,
}

impl Drop for ConnectorRegistration {
    fn drop(&mut self) {
        if let Some(controller) = self.controller.upgrade() {
            controller.unregister_connector(&self.name);
        }
    }
}

impl PluggingController {
    pub fn new() -> Rc<PluggingController> {
        Rc::new_cyclic(|self_ref| PluggingController {
            self_ref: self_ref.clone(),
            connectors: RefCell::new(BTreeMap::new()),
            pluggables: RefCell::new(BTreeMap::new()),
        })
    }

    /// Called by `Connector::new`.
    pub fn register_connector(&self, name: &str, connector: Weak<dyn AnyConnector>)
                              -> Result<ConnectorRegistration> {
        let mut connectors = self.connectors.borrow_mut();
        if connectors.contains_key(name) {
            return Err(ErrorKind::DuplicateConnector(name.to_owned()).into());
        }
        debug!("Registering connector {}", name);
        connectors.insert(name.to_owned(), connector);
        Ok(ConnectorRegistration {
            controller: self.self_ref.clone(),
            name: name.to_owned(),
        })
    }

    fn unregister_connector(&self, name: &str) {
        if self.connectors.borrow_mut().remove(name).is_some() {
            debug!("Unregistering connector {}", name);
        }
    }

    pub fn register_pluggable<D>(&self, device: &PluggableHandle<D>) -> Result<()>
        where D: ?Sized + Pluggable + 'static
    {
        let mut pluggables = self.pluggables.borrow_mut();
        if pluggables.contains_key(device.name()) {
            return Err(ErrorKind::DuplicatePluggable(device.name().to_owned()).into());
        }
        debug!("Registering pluggable {} ({})", device.name(), device.class());
        pluggables.insert(device.name().to_owned(), device.erase());
        Ok(())
    }

    /// Wrap `device` in a handle and register it.
    pub fn add_pluggable<D>(&self, device: Rc<RefCell<D>>) -> Result<PluggableHandle<D>>
        where D: ?Sized + Pluggable + 'static
    {
        let handle = PluggableHandle::new(device);
        self.register_pluggable(&handle)?;
        Ok(handle)
    }

    /// Remove a pluggable from the registry. It must be unplugged first.
    pub fn unregister_pluggable(&self, name: &str) -> Result<Rc<dyn AnyPluggable>> {
        let mut pluggables = self.pluggables.borrow_mut();
        let connector = match pluggables.get(name) {
            None => return Err(ErrorKind::UnknownPluggable(name.to_owned()).into()),
            Some(device) => device.connector_name(),
        };
        if let Some(connector) = connector {
            return Err(ErrorKind::StillPlugged(name.to_owned(), connector).into());
        }
        debug!("Unregistering pluggable {}", name);
        pluggables.remove(name)
                  .ok_or_else(|| ErrorKind::UnknownPluggable(name.to_owned()).into())
    }

    pub fn find_connector(&self, name: &str) -> Option<Rc<dyn AnyConnector>> {
        self.connectors.borrow().get(name).and_then(Weak::upgrade)
    }

    pub fn find_pluggable(&self, name: &str) -> Option<Rc<dyn AnyPluggable>> {
        self.pluggables.borrow().get(name).cloned()
    }

    pub fn connector_names(&self) -> Vec<String> {
        self.connectors.borrow().keys().cloned().collect()
    }

    pub fn pluggable_names(&self) -> Vec<String> {
        self.pluggables.borrow().keys().cloned().collect()
    }

    pub fn connector_class(&self, name: &str) -> Option<String> {
        self.find_connector(name).map(|c| c.class().to_owned())
    }

    /// Name of the connector `pluggable` is plugged into.
    pub fn connector_of(&self, pluggable: &str) -> Option<String> {
        self.find_pluggable(pluggable).and_then(|p| p.connector_name())
    }

    fn connector(&self, name: &str) -> Result<Rc<dyn AnyConnector>> {
        self.find_connector(name)
            .ok_or_else(|| ErrorKind::UnknownConnector(name.to_owned()).into())
    }

    fn pluggable(&self, name: &str) -> Result<Rc<dyn AnyPluggable>> {
        self.find_pluggable(name)
            .ok_or_else(|| ErrorKind::UnknownPluggable(name.to_owned()).into())
    }

    /// Plug a registered pluggable into a connector, both by name.
    pub fn plug(&self, connector: &str, pluggable: &str, time: EmuTime) -> Result<()> {
        let connector = self.connector(connector)?;
        let pluggable = self.pluggable(pluggable)?;
        connector.plug_any(pluggable, time)
    }

    pub fn unplug(&self, connector: &str, time: EmuTime) -> Result<()> {
        self.connector(connector)?.unplug(time);
        Ok(())
    }

    pub fn save_state(&self) -> PlugState {
        let connectors = self.connectors
                             .borrow()
                             .iter()
                             .filter_map(|(name, c)| c.upgrade().map(|c| (name.clone(), c)))
                             .map(|(name, c)| (name, c.save_state()))
                             .collect();
        PlugState { connectors: connectors }
    }

    /// Restore the attachments in `state`.
    ///
    /// Every connector is unplugged first. A stored device that no longer
    /// exists, or that refuses to be plugged, leaves its connector on the
    /// dummy.
    pub fn load_state(&self, state: &PlugState, time: EmuTime) {
        let connectors: Vec<_> = self.connectors
                                     .borrow()
                                     .values()
                                     .filter_map(Weak::upgrade)
                                     .collect();
        for connector in connectors.iter() {
            connector.unplug(time);
        }

        for (name, connector_state) in state.connectors.iter() {
            let device_name = match connector_state.plugged {
                Some(ref device) => device,
                None => continue,
            };
            let connector = match self.find_connector(name) {
                Some(connector) => connector,
                None => {
                    warn!("Connector {} from saved state does not exist", name);
                    continue;
                }
            };
            match self.find_pluggable(device_name) {
                Some(device) => {
                    if let Err(e) = connector.plug_any(device, time) {
                        warn!("Could not restore {} in {}: {}", device_name, name, e);
                    }
                }
                None => {
                    warn!("Pluggable {} not found, {} stays unplugged",
                          device_name,
                          name)
                }
            }
        }
    }
}
