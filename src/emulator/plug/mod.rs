//! Hot-pluggable device slots.
//!
//! A `Connector` is a named socket of some class ("Joystick Port", ...).
//! A `Pluggable` is a device of some class that can sit in one connector at
//! a time. Each connector owns a private dummy device of its class which is
//! attached whenever nothing real is, so the port side never has to check
//! for an empty socket.
//!
//! Connectors are generic over the device interface `D` the port talks to
//! (for example `dyn JoystickDevice`). The `PluggingController` sees them
//! through the type-erased `AnyConnector` and `AnyPluggable` traits so it
//! can look things up by name.

pub mod connector;
pub mod controller;

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use emulator::{ErrorKind, Result};
use emulator::time::EmuTime;

pub use self::connector::{AnyConnector, Connector};
pub use self::controller::{ConnectorState, PlugState, PluggingController};

/// A device that can be plugged into a connector of its class.
pub trait Pluggable {
    fn name(&self) -> &str;
    fn class(&self) -> &str;
    fn description(&self) -> &str;

    /// Called before the device is attached to `connector`. Returning an
    /// error aborts the plug and leaves everything as it was.
    fn plug_hook(&mut self, _connector: &str, _time: EmuTime) -> Result<()> {
        Ok(())
    }

    /// Called when the device is removed from its connector.
    fn unplug_hook(&mut self, _time: EmuTime) {}
}

/// Type-erased view of a pluggable, as stored by the controller.
pub trait AnyPluggable {
    fn name(&self) -> &str;
    fn class(&self) -> &str;
    fn description(&self) -> &str;
    /// Name of the connector the device currently sits in.
    fn connector_name(&self) -> Option<String>;
    fn into_any(self: Rc<Self>) -> Rc<dyn Any>;
}

impl fmt::Debug for dyn AnyPluggable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Pluggable({}, {})", self.name(), self.class())
    }
}

#[derive(Clone)]
struct ConnectorLink {
    name: String,
    connector: Weak<dyn AnyConnector>,
}

/// Shared state of one pluggable: the device and the connector it is in.
pub struct PluggableCore<D: ?Sized> {
    name: String,
    class: String,
    description: String,
    device: Rc<RefCell<D>>,
    connector: RefCell<Option<ConnectorLink>>,
}

impl<D: ?Sized> PluggableCore<D> {
    /// Drop the back reference without running the unplug hook. Used when
    /// the connector itself is destroyed.
    fn forget_connector(&self) {
        *self.connector.borrow_mut() = None;
    }
}

impl<D: ?Sized + Pluggable> PluggableCore<D> {
    /// The connector this device sits in, if it still exists.
    fn live_link(&self) -> Option<ConnectorLink> {
        let mut link = self.connector.borrow_mut();
        let alive = match *link {
            Some(ref l) => l.connector.upgrade().is_some(),
            None => return None,
        };
        if alive {
            link.clone()
        } else {
            // The connector went away without unplugging us.
            *link = None;
            None
        }
    }

    fn link_name(&self) -> Option<String> {
        self.live_link().map(|l| l.name)
    }

    /// Device side of a plug. Fails if already plugged into a different
    /// connector, even one with the same name in another machine. The back
    /// reference is only set once the hook succeeded.
    fn attach(&self,
              connector_name: &str,
              connector: Weak<dyn AnyConnector>,
              time: EmuTime)
              -> Result<()> {
        if let Some(current) = self.live_link() {
            if !Weak::ptr_eq(&current.connector, &connector) {
                return Err(ErrorKind::AlreadyPlugged(self.name.clone(), current.name).into());
            }
            return Ok(());
        }
        self.device.borrow_mut().plug_hook(connector_name, time)?;
        *self.connector.borrow_mut() = Some(ConnectorLink {
            name: connector_name.to_owned(),
            connector: connector,
        });
        Ok(())
    }

    fn detach(&self, time: EmuTime) {
        self.device.borrow_mut().unplug_hook(time);
        *self.connector.borrow_mut() = None;
    }
}

impl<D: ?Sized + Pluggable + 'static> AnyPluggable for PluggableCore<D> {
    fn name(&self) -> &str {
        &self.name
    }

    fn class(&self) -> &str {
        &self.class
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn connector_name(&self) -> Option<String> {
        self.link_name()
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

/// Handle to a pluggable device speaking interface `D`.
///
/// Cloning gives another handle to the same device. A connector holds one
/// while the device is plugged in, so a plugged device can't be destroyed.
pub struct PluggableHandle<D: ?Sized> {
    core: Rc<PluggableCore<D>>,
}

impl<D: ?Sized> Clone for PluggableHandle<D> {
    fn clone(&self) -> PluggableHandle<D> {
        PluggableHandle { core: self.core.clone() }
    }
}

impl<D: ?Sized> fmt::Debug for PluggableHandle<D> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Pluggable({}, {})", self.core.name, self.core.class)
    }
}

impl<D: ?Sized + Pluggable + 'static> PluggableHandle<D> {
    pub fn new(device: Rc<RefCell<D>>) -> PluggableHandle<D> {
        let (name, class, description) = {
            let d = device.borrow();
            (d.name().to_owned(), d.class().to_owned(), d.description().to_owned())
        };
        PluggableHandle {
            core: Rc::new(PluggableCore {
                name: name,
                class: class,
                description: description,
                device: device,
                connector: RefCell::new(None),
            }),
        }
    }

    pub(crate) fn from_core(core: Rc<PluggableCore<D>>) -> PluggableHandle<D> {
        PluggableHandle { core: core }
    }

    pub(crate) fn core(&self) -> &PluggableCore<D> {
        &self.core
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn class(&self) -> &str {
        &self.core.class
    }

    pub fn device(&self) -> &Rc<RefCell<D>> {
        &self.core.device
    }

    /// Name of the connector this device is plugged into, if any.
    pub fn connector(&self) -> Option<String> {
        self.core.link_name()
    }

    pub fn is_plugged(&self) -> bool {
        self.connector().is_some()
    }

    /// Plug this device into `connector`. Same as `connector.plug(self, time)`.
    pub fn plug_into(&self, connector: &Connector<D>, time: EmuTime) -> Result<()> {
        connector.plug(self, time)
    }

    pub fn ptr_eq(&self, other: &PluggableHandle<D>) -> bool {
        Rc::ptr_eq(&self.core, &other.core)
    }

    pub fn erase(&self) -> Rc<dyn AnyPluggable> {
        self.core.clone()
    }
}
