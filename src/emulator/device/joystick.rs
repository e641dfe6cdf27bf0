use std::cell::RefCell;
use std::rc::Rc;

use emulator::Result;
use emulator::device::dummy::DummyJoystick;
use emulator::plug::{Connector, Pluggable, PluggingController};
use emulator::time::EmuTime;

pub const JOYSTICK_CLASS: &'static str = "Joystick Port";

/// Port value with every line released (lines are active low).
pub const RELEASED: u8 = 0x3f;

/// What a joystick port expects from whatever is plugged into it.
pub trait JoystickDevice: Pluggable {
    fn read(&mut self, time: EmuTime) -> u8;
    fn write(&mut self, value: u8, time: EmuTime);
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Button {
    Up,
    Down,
    Left,
    Right,
    A,
    B,
}

impl Button {
    fn mask(self) -> u8 {
        match self {
            Button::Up => 1 << 0,
            Button::Down => 1 << 1,
            Button::Left => 1 << 2,
            Button::Right => 1 << 3,
            Button::A => 1 << 4,
            Button::B => 1 << 5,
        }
    }
}

/// A plain two-button digital joystick.
#[derive(Debug)]
pub struct Joystick {
    name: String,
    status: u8,
    /// Last value the machine wrote to the port.
    output: u8,
}

impl Joystick {
    pub fn new(name: &str) -> Joystick {
        Joystick {
            name: name.to_owned(),
            status: RELEASED,
            output: 0,
        }
    }

    pub fn press(&mut self, button: Button) {
        self.status &= !button.mask();
    }

    pub fn release(&mut self, button: Button) {
        self.status |= button.mask();
    }

    pub fn output(&self) -> u8 {
        self.output
    }
}

impl Pluggable for Joystick {
    fn name(&self) -> &str {
        &self.name
    }

    fn class(&self) -> &str {
        JOYSTICK_CLASS
    }

    fn description(&self) -> &str {
        "Two-button digital joystick"
    }

    fn plug_hook(&mut self, connector: &str, time: EmuTime) -> Result<()> {
        info!("{} plugged into {} at {}", self.name, connector, time);
        Ok(())
    }

    fn unplug_hook(&mut self, time: EmuTime) {
        info!("{} unplugged at {}", self.name, time);
        self.status = RELEASED;
    }
}

impl JoystickDevice for Joystick {
    fn read(&mut self, _: EmuTime) -> u8 {
        self.status
    }

    fn write(&mut self, value: u8, _: EmuTime) {
        self.output = value;
    }
}

/// A joystick connector as seen from the machine.
#[derive(Debug)]
pub struct JoystickPort {
    connector: Connector<dyn JoystickDevice>,
}

impl JoystickPort {
    pub fn new(controller: &PluggingController, name: &str) -> Result<JoystickPort> {
        let dummy: Rc<RefCell<dyn JoystickDevice>> = Rc::new(RefCell::new(DummyJoystick));
        Ok(JoystickPort {
            connector: Connector::new(controller,
                                      name,
                                      JOYSTICK_CLASS,
                                      "Joystick connector",
                                      dummy)?,
        })
    }

    pub fn connector(&self) -> &Connector<dyn JoystickDevice> {
        &self.connector
    }

    pub fn read(&self, time: EmuTime) -> u8 {
        self.connector.plugged().borrow_mut().read(time)
    }

    pub fn write(&self, value: u8, time: EmuTime) {
        self.connector.plugged().borrow_mut().write(value, time)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use emulator::ErrorKind;
    use emulator::plug::PluggingController;

    fn t(ticks: u64) -> EmuTime {
        EmuTime::from_ticks(ticks)
    }

    #[test]
    fn test_plug_unplug_replug() {
        let controller = PluggingController::new();
        let port = JoystickPort::new(&controller, "joyporta").unwrap();
        let stick_a = Rc::new(RefCell::new(Joystick::new("joystickA")));
        let a = controller.add_pluggable::<dyn JoystickDevice>(stick_a.clone()).unwrap();
        let b = controller
            .add_pluggable::<dyn JoystickDevice>(Rc::new(RefCell::new(Joystick::new("joystickB"))))
            .unwrap();

        assert!(port.connector().is_dummy_plugged());

        port.connector().plug(&a, t(100)).unwrap();
        assert!(port.connector().plugged_handle().unwrap().ptr_eq(&a));

        let err = port.connector().plug(&b, t(200)).unwrap_err();
        assert!(err.is_plug_error());
        assert!(port.connector().plugged_handle().unwrap().ptr_eq(&a));
        assert_eq!(b.connector(), None);

        port.connector().unplug(t(300));
        assert!(port.connector().is_dummy(&port.connector().plugged()));
        assert_eq!(a.connector(), None);

        port.connector().plug(&a, t(400)).unwrap();
        assert_eq!(a.connector(), Some("joyporta".to_owned()));
    }

    #[test]
    fn test_second_port_rejects_plugged_stick() {
        let controller = PluggingController::new();
        let porta = JoystickPort::new(&controller, "joyporta").unwrap();
        let portb = JoystickPort::new(&controller, "joyportb").unwrap();
        controller
            .add_pluggable::<dyn JoystickDevice>(Rc::new(RefCell::new(Joystick::new("joystickA"))))
            .unwrap();

        controller.plug("joyporta", "joystickA", t(10)).unwrap();
        let err = controller.plug("joyportb", "joystickA", t(20)).unwrap_err();
        match *err.kind() {
            ErrorKind::AlreadyPlugged(..) => (),
            ref other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(porta.connector().plugged_name(), Some("joystickA".to_owned()));
        assert!(portb.connector().is_dummy_plugged());
    }

    #[test]
    fn test_same_name_port_in_other_machine_rejects_plugged_stick() {
        let first = PluggingController::new();
        let second = PluggingController::new();
        let port1 = JoystickPort::new(&first, "joyporta").unwrap();
        let port2 = JoystickPort::new(&second, "joyporta").unwrap();
        let stick = first
            .add_pluggable::<dyn JoystickDevice>(Rc::new(RefCell::new(Joystick::new("joystickA"))))
            .unwrap();

        port1.connector().plug(&stick, t(10)).unwrap();
        let err = port2.connector().plug(&stick, t(20)).unwrap_err();
        match *err.kind() {
            ErrorKind::AlreadyPlugged(ref device, ref connector) => {
                assert_eq!(device, "joystickA");
                assert_eq!(connector, "joyporta");
            }
            ref other => panic!("unexpected error {:?}", other),
        }
        assert!(port1.connector().plugged_handle().unwrap().ptr_eq(&stick));
        assert!(port2.connector().is_dummy_plugged());

        // Once released it can move to the other machine.
        port1.connector().unplug(t(30));
        port2.connector().plug(&stick, t(40)).unwrap();
        assert!(port1.connector().is_dummy_plugged());
        assert_eq!(stick.connector(), Some("joyporta".to_owned()));
    }

    #[test]
    fn test_port_reads_through_to_device() {
        let controller = PluggingController::new();
        let port = JoystickPort::new(&controller, "joyporta").unwrap();
        assert_eq!(port.read(t(0)), RELEASED);

        let stick = Rc::new(RefCell::new(Joystick::new("joystickA")));
        let handle = controller.add_pluggable::<dyn JoystickDevice>(stick.clone()).unwrap();
        port.connector().plug(&handle, t(1)).unwrap();

        stick.borrow_mut().press(Button::Up);
        stick.borrow_mut().press(Button::A);
        assert_eq!(port.read(t(2)), RELEASED & !0x11);
        port.write(0x40, t(3));
        assert_eq!(stick.borrow().output(), 0x40);

        port.connector().unplug(t(4));
        assert_eq!(port.read(t(5)), RELEASED);
        // The dummy swallows writes.
        port.write(0x00, t(6));
        assert_eq!(stick.borrow().output(), 0x40);
    }
}
