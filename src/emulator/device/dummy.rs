use std::collections::VecDeque;

use emulator::device::joystick::{JoystickDevice, JOYSTICK_CLASS, RELEASED};
use emulator::device::serial::{SerialInDevice, SERIAL_IN_CLASS};
use emulator::plug::Pluggable;
use emulator::time::EmuTime;

/// What a joystick port reads with nothing plugged in: every line high.
#[derive(Debug, Default)]
pub struct DummyJoystick;

impl Pluggable for DummyJoystick {
    fn name(&self) -> &str {
        "dummy"
    }

    fn class(&self) -> &str {
        JOYSTICK_CLASS
    }

    fn description(&self) -> &str {
        "Nothing plugged in"
    }
}

impl JoystickDevice for DummyJoystick {
    fn read(&mut self, _: EmuTime) -> u8 {
        RELEASED
    }

    fn write(&mut self, _: u8, _: EmuTime) {}
}

/// An unconnected serial input: never receives anything.
#[derive(Debug, Default)]
pub struct DummySerialIn;

impl Pluggable for DummySerialIn {
    fn name(&self) -> &str {
        "dummy"
    }

    fn class(&self) -> &str {
        SERIAL_IN_CLASS
    }

    fn description(&self) -> &str {
        "Nothing plugged in"
    }
}

impl SerialInDevice for DummySerialIn {
    fn drain(&mut self, _: &mut VecDeque<u8>) -> usize {
        0
    }
}
