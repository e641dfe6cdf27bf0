pub mod clock;
pub mod config;
pub mod device;
pub mod machine;
pub mod plug;
pub mod schedulable;
pub mod scheduler;
pub mod time;

use std::io;

pub use emulator::clock::DynamicClock;
pub use emulator::machine::Machine;
pub use emulator::plug::{Pluggable, PluggableHandle};
pub use emulator::plug::connector::Connector;
pub use emulator::plug::controller::PluggingController;
pub use emulator::schedulable::{Schedulable, SyncTag};
pub use emulator::scheduler::{AsapSender, SchedulableId, Scheduler, SyncClient};
pub use emulator::time::{EmuDuration, EmuTime, MAIN_FREQ};

error_chain! {
    foreign_links {
        Io(io::Error);
    }

    errors {
        ClassMismatch(device: String,
                      device_class: String,
                      connector: String,
                      connector_class: String) {
            description("pluggable class does not match the connector")
            display("{} is a {} and can't be plugged into {} ({})",
                    device, device_class, connector, connector_class)
        }
        AlreadyPlugged(device: String, connector: String) {
            description("pluggable is already plugged in")
            display("{} is already plugged into {}", device, connector)
        }
        ConnectorInUse(connector: String, device: String) {
            description("connector is already in use")
            display("{} is already in use by {}", connector, device)
        }
        PlugRefused(device: String, reason: String) {
            description("pluggable refused to be plugged in")
            display("{} refused to be plugged in: {}", device, reason)
        }
        SyncPointInPast(time: EmuTime, now: EmuTime) {
            description("sync point scheduled in the past")
            display("sync point at {} is before the current time {}", time, now)
        }
        ZeroPeriod(name: String) {
            description("zero period")
            display("{} can't run with a period of zero", name)
        }
        UnknownSchedulable(id: SchedulableId) {
            description("unknown schedulable")
            display("no schedulable registered with id {}", id)
        }
        DuplicateConnector(name: String) {
            description("connector registered twice")
            display("a connector named {} is already registered", name)
        }
        DuplicatePluggable(name: String) {
            description("pluggable registered twice")
            display("a pluggable named {} is already registered", name)
        }
        UnknownConnector(name: String) {
            description("unknown connector")
            display("no such connector: {}", name)
        }
        UnknownPluggable(name: String) {
            description("unknown pluggable")
            display("no such pluggable: {}", name)
        }
        StillPlugged(device: String, connector: String) {
            description("pluggable is still plugged in")
            display("{} must be unplugged from {} first", device, connector)
        }
    }
}

impl Error {
    /// Whether this is a plug failure the user can cause, as opposed to a
    /// misuse of the API.
    pub fn is_plug_error(&self) -> bool {
        match *self.kind() {
            ErrorKind::ClassMismatch(..) |
            ErrorKind::AlreadyPlugged(..) |
            ErrorKind::ConnectorInUse(..) |
            ErrorKind::PlugRefused(..) => true,
            _ => false,
        }
    }
}
