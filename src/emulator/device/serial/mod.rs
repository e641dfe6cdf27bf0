pub mod reader;

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use emulator::Result;
use emulator::device::dummy::DummySerialIn;
use emulator::plug::{Connector, Pluggable, PluggingController};

pub const SERIAL_IN_CLASS: &'static str = "serial in";

/// A source of bytes for a serial input port.
pub trait SerialInDevice: Pluggable {
    /// Move every byte received so far to the end of `out`.
    fn drain(&mut self, out: &mut VecDeque<u8>) -> usize;
}

/// Receiving side of a serial line.
#[derive(Debug)]
pub struct SerialInPort {
    connector: Connector<dyn SerialInDevice>,
    buffer: VecDeque<u8>,
}

impl SerialInPort {
    pub fn new(controller: &PluggingController, name: &str) -> Result<SerialInPort> {
        let dummy: Rc<RefCell<dyn SerialInDevice>> = Rc::new(RefCell::new(DummySerialIn));
        Ok(SerialInPort {
            connector: Connector::new(controller,
                                      name,
                                      SERIAL_IN_CLASS,
                                      "Serial input",
                                      dummy)?,
            buffer: VecDeque::new(),
        })
    }

    pub fn connector(&self) -> &Connector<dyn SerialInDevice> {
        &self.connector
    }

    /// Pull whatever the plugged device has received. Returns the number of
    /// new bytes.
    pub fn poll(&mut self) -> usize {
        self.connector.plugged().borrow_mut().drain(&mut self.buffer)
    }

    pub fn read_byte(&mut self) -> Option<u8> {
        self.buffer.pop_front()
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}
