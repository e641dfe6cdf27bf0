use std::cell::RefCell;
use std::fmt;
use std::mem;
use std::rc::{Rc, Weak};

use emulator::{ErrorKind, Result};
use emulator::plug::{AnyPluggable, Pluggable, PluggableCore, PluggableHandle};
use emulator::plug::controller::{ConnectorRegistration, ConnectorState,
                                 PluggingController};
use emulator::time::EmuTime;

/// Type-erased view of a connector, as stored by the controller.
pub trait AnyConnector {
    fn name(&self) -> &str;
    fn class(&self) -> &str;
    fn description(&self) -> &str;
    /// Name of the attached device, `None` when the dummy is attached.
    fn plugged_name(&self) -> Option<String>;
    /// Plug a device known only by its erased handle. Fails with
    /// `ClassMismatch` if it does not speak this connector's interface.
    fn plug_any(&self, device: Rc<dyn AnyPluggable>, time: EmuTime) -> Result<()>;
    fn unplug(&self, time: EmuTime);

    fn save_state(&self) -> ConnectorState {
        ConnectorState { plugged: self.plugged_name() }
    }
}

impl fmt::Debug for dyn AnyConnector {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Connector({}, {})", self.name(), self.class())
    }
}

enum Plugged<D: ?Sized> {
    Dummy,
    Attached(PluggableHandle<D>),
}

pub struct ConnectorCore<D: ?Sized> {
    self_ref: Weak<ConnectorCore<D>>,
    name: String,
    class: String,
    description: String,
    dummy: Rc<RefCell<D>>,
    plugged: RefCell<Plugged<D>>,
}

impl<D: ?Sized + Pluggable + 'static> ConnectorCore<D> {
    fn plug(&self, device: &PluggableHandle<D>, time: EmuTime) -> Result<()> {
        if device.class() != self.class {
            return Err(ErrorKind::ClassMismatch(device.name().to_owned(),
                                                device.class().to_owned(),
                                                self.name.clone(),
                                                self.class.clone())
                           .into());
        }
        match *self.plugged.borrow() {
            Plugged::Attached(ref current) if current.ptr_eq(device) => return Ok(()),
            Plugged::Attached(ref current) => {
                return Err(ErrorKind::ConnectorInUse(self.name.clone(),
                                                     current.name().to_owned())
                               .into())
            }
            Plugged::Dummy => (),
        }

        let link: Weak<dyn AnyConnector> = self.self_ref.clone();
        device.core().attach(&self.name, link, time)?;
        *self.plugged.borrow_mut() = Plugged::Attached(device.clone());
        debug!("Plugged {} into {} at {}", device.name(), self.name, time);
        Ok(())
    }

    fn unplug(&self, time: EmuTime) {
        let previous = mem::replace(&mut *self.plugged.borrow_mut(), Plugged::Dummy);
        if let Plugged::Attached(device) = previous {
            device.core().detach(time);
            debug!("Unplugged {} from {} at {}", device.name(), self.name, time);
        }
    }

    fn plugged_handle(&self) -> Option<PluggableHandle<D>> {
        match *self.plugged.borrow() {
            Plugged::Dummy => None,
            Plugged::Attached(ref device) => Some(device.clone()),
        }
    }
}

impl<D: ?Sized + Pluggable + 'static> AnyConnector for ConnectorCore<D> {
    fn name(&self) -> &str {
        &self.name
    }

    fn class(&self) -> &str {
        &self.class
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn plugged_name(&self) -> Option<String> {
        self.plugged_handle().map(|d| d.name().to_owned())
    }

    fn plug_any(&self, device: Rc<dyn AnyPluggable>, time: EmuTime) -> Result<()> {
        let mismatch = ErrorKind::ClassMismatch(device.name().to_owned(),
                                                device.class().to_owned(),
                                                self.name.clone(),
                                                self.class.clone());
        if device.class() != self.class {
            return Err(mismatch.into());
        }
        match device.into_any().downcast::<PluggableCore<D>>() {
            Ok(core) => self.plug(&PluggableHandle::from_core(core), time),
            // Same class name, different interface.
            Err(_) => Err(mismatch.into()),
        }
    }

    fn unplug(&self, time: EmuTime) {
        ConnectorCore::unplug(self, time)
    }
}

impl<D: ?Sized> Drop for ConnectorCore<D> {
    fn drop(&mut self) {
        if let Plugged::Attached(ref device) = *self.plugged.borrow() {
            debug!("Connector {} destroyed with {} attached", self.name, device.core.name);
            device.core.forget_connector();
        }
    }
}

/// A named socket accepting devices that speak interface `D`.
///
/// Registered with the plugging controller for as long as it lives.
pub struct Connector<D: ?Sized> {
    _registration: ConnectorRegistration,
    core: Rc<ConnectorCore<D>>,
}

impl<D: ?Sized> fmt::Debug for Connector<D> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Connector({}, {})", self.core.name, self.core.class)
    }
}

impl<D: ?Sized + Pluggable + 'static> Connector<D> {
    /// Create a connector and register it with `controller`.
    ///
    /// `dummy` is attached whenever no real device is, and stays private
    /// to this connector.
    pub fn new(controller: &PluggingController,
               name: &str,
               class: &str,
               description: &str,
               dummy: Rc<RefCell<D>>)
               -> Result<Connector<D>> {
        let core = Rc::new_cyclic(|self_ref| ConnectorCore {
            self_ref: self_ref.clone(),
            name: name.to_owned(),
            class: class.to_owned(),
            description: description.to_owned(),
            dummy: dummy,
            plugged: RefCell::new(Plugged::Dummy),
        });
        let weak: Weak<ConnectorCore<D>> = Rc::downgrade(&core);
        let erased: Weak<dyn AnyConnector> = weak;
        let registration = controller.register_connector(name, erased)?;
        Ok(Connector {
            _registration: registration,
            core: core,
        })
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn class(&self) -> &str {
        &self.core.class
    }

    pub fn description(&self) -> &str {
        &self.core.description
    }

    /// Attach `device`.
    ///
    /// All or nothing: on error neither the connector nor the device has
    /// changed. Fails if the classes differ, if another device is already
    /// attached here, if `device` sits in another connector, or if its plug
    /// hook refuses. Plugging the device that is already attached is a
    /// no-op.
    pub fn plug(&self, device: &PluggableHandle<D>, time: EmuTime) -> Result<()> {
        self.core.plug(device, time)
    }

    /// Detach the current device and fall back to the dummy.
    pub fn unplug(&self, time: EmuTime) {
        self.core.unplug(time)
    }

    /// The device the port should talk to: the attached one, or the dummy.
    pub fn plugged(&self) -> Rc<RefCell<D>> {
        match *self.core.plugged.borrow() {
            Plugged::Dummy => self.core.dummy.clone(),
            Plugged::Attached(ref device) => device.device().clone(),
        }
    }

    pub fn plugged_handle(&self) -> Option<PluggableHandle<D>> {
        self.core.plugged_handle()
    }

    pub fn plugged_name(&self) -> Option<String> {
        self.core.plugged_name()
    }

    pub fn is_dummy_plugged(&self) -> bool {
        match *self.core.plugged.borrow() {
            Plugged::Dummy => true,
            Plugged::Attached(_) => false,
        }
    }

    /// Whether `device` is this connector's own dummy.
    pub fn is_dummy(&self, device: &Rc<RefCell<D>>) -> bool {
        Rc::ptr_eq(&self.core.dummy, device)
    }

    pub fn save_state(&self) -> ConnectorState {
        self.core.save_state()
    }
}
