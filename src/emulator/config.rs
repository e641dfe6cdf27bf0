//! Machine description, usually read from a JSON file.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs::File;
use std::rc::Rc;

use emulator::{ResultExt, Result};
use emulator::device::{Joystick, JoystickDevice, JoystickPort, SerialInDevice, SerialInPort,
                       SerialReader, Timer};
use emulator::machine::Machine;
use emulator::plug::PluggableHandle;
use emulator::time::EmuDuration;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    /// Names of the joystick connectors.
    pub joystick_ports: Vec<String>,
    /// Names of the joysticks available for plugging.
    pub joysticks: Vec<String>,
    pub timer_period_us: Option<u64>,
    pub serial_ports: Vec<String>,
    pub serial_readers: Vec<SerialReaderConfig>,
    /// Connector name to pluggable name, applied at time zero.
    pub plug: BTreeMap<String, String>,
    /// Virtual time to run, in milliseconds.
    pub run_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialReaderConfig {
    pub name: String,
    /// Host file fed into the reader. Without one the reader stays silent.
    #[serde(default)]
    pub file: Option<String>,
}

/// A machine built from a `MachineConfig`, with everything it owns.
#[derive(Debug)]
pub struct Board {
    pub joystick_ports: Vec<JoystickPort>,
    pub joysticks: Vec<PluggableHandle<dyn JoystickDevice>>,
    pub serial_ports: Vec<SerialInPort>,
    pub serial_readers: Vec<Rc<RefCell<SerialReader>>>,
    pub timer: Option<Rc<RefCell<Timer>>>,
    pub machine: Machine,
}

impl MachineConfig {
    pub fn timer_period(&self) -> Option<EmuDuration> {
        self.timer_period_us.map(EmuDuration::usec)
    }

    pub fn run_duration(&self) -> EmuDuration {
        EmuDuration::msec(self.run_ms)
    }

    pub fn build(&self) -> Result<Board> {
        let machine = Machine::default();
        let scheduler = machine.scheduler().clone();
        let plugging = machine.plugging().clone();
        let time = machine.current_time();

        let mut joystick_ports = Vec::new();
        for name in &self.joystick_ports {
            joystick_ports.push(JoystickPort::new(&plugging, name)?);
        }

        let mut joysticks = Vec::new();
        for name in &self.joysticks {
            let stick: Rc<RefCell<dyn JoystickDevice>> = Rc::new(RefCell::new(Joystick::new(name)));
            joysticks.push(plugging.add_pluggable(stick)?);
        }

        let mut serial_ports = Vec::new();
        for name in &self.serial_ports {
            serial_ports.push(SerialInPort::new(&plugging, name)?);
        }

        let mut serial_readers = Vec::new();
        for conf in &self.serial_readers {
            let reader = SerialReader::new(&scheduler, &conf.name);
            plugging.add_pluggable::<dyn SerialInDevice>(reader.clone())?;
            if let Some(ref path) = conf.file {
                let file = File::open(path)
                    .chain_err(|| format!("can't open input of {}: {}", conf.name, path))?;
                reader.borrow_mut().spawn_pump(file)?;
            }
            serial_readers.push(reader);
        }

        let timer = match self.timer_period() {
            Some(period) => {
                let timer = Timer::new(&scheduler, "timer", period);
                timer.borrow_mut().start(time)?;
                Some(timer)
            }
            None => None,
        };

        for (connector, pluggable) in &self.plug {
            plugging.plug(connector, pluggable, time)?;
        }

        Ok(Board {
            joystick_ports: joystick_ports,
            joysticks: joysticks,
            serial_ports: serial_ports,
            serial_readers: serial_readers,
            timer: timer,
            machine: machine,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json;

    use super::*;
    use emulator::ErrorKind;
    use emulator::time::EmuTime;

    const CONFIG: &'static str = r#"{
        "joystick_ports": ["joyporta", "joyportb"],
        "joysticks": ["joystickA", "joystickB"],
        "timer_period_us": 1000,
        "serial_ports": ["midi-in"],
        "serial_readers": [{"name": "midi-file"}],
        "plug": {"joyportb": "joystickA", "midi-in": "midi-file"},
        "run_ms": 10
    }"#;

    #[test]
    fn test_defaults() {
        let config: MachineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, MachineConfig::default());
        assert_eq!(config.timer_period(), None);
        let board = config.build().unwrap();
        assert!(board.machine.plugging().connector_names().is_empty());
        assert!(board.timer.is_none());
    }

    #[test]
    fn test_build_applies_plug_map() {
        let config: MachineConfig = serde_json::from_str(CONFIG).unwrap();
        assert_eq!(config.serial_readers[0].file, None);
        let board = config.build().unwrap();
        let plugging = board.machine.plugging();

        assert_eq!(plugging.connector_names(),
                   vec!["joyporta".to_owned(), "joyportb".to_owned(), "midi-in".to_owned()]);
        assert_eq!(plugging.connector_of("joystickA"), Some("joyportb".to_owned()));
        assert_eq!(plugging.connector_of("joystickB"), None);
        assert_eq!(plugging.connector_of("midi-file"), Some("midi-in".to_owned()));
        assert!(board.joystick_ports[0].connector().is_dummy_plugged());
        assert!(board.joystick_ports[1].connector().plugged_handle().unwrap().ptr_eq(&board.joysticks[0]));
    }

    #[test]
    fn test_timer_runs_with_machine() {
        let config: MachineConfig = serde_json::from_str(CONFIG).unwrap();
        let board = config.build().unwrap();
        let end = board.machine.current_time() + config.run_duration();
        let fired = board.machine.run_until(end);
        assert_eq!(fired, 10);
        assert_eq!(board.timer.as_ref().unwrap().borrow().fired(), 10);
        assert_eq!(board.machine.current_time(), EmuTime::zero() + EmuDuration::msec(10));
    }

    #[test]
    fn test_zero_timer_period_is_refused() {
        let mut config: MachineConfig = serde_json::from_str(CONFIG).unwrap();
        config.timer_period_us = Some(0);
        let err = config.build().unwrap_err();
        match *err.kind() {
            ErrorKind::ZeroPeriod(ref name) => assert_eq!(name, "timer"),
            ref other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_bad_plug_map() {
        let mut config: MachineConfig = serde_json::from_str(CONFIG).unwrap();
        config.plug.insert("joyportc".to_owned(), "joystickB".to_owned());
        let err = config.build().unwrap_err();
        match *err.kind() {
            ErrorKind::UnknownConnector(ref name) => assert_eq!(name, "joyportc"),
            ref other => panic!("unexpected error {:?}", other),
        }

        let mut config: MachineConfig = serde_json::from_str(CONFIG).unwrap();
        config.plug.insert("joyporta".to_owned(), "midi-file".to_owned());
        assert!(config.build().unwrap_err().is_plug_error());
    }

    #[test]
    fn test_missing_input_file() {
        let config = MachineConfig {
            serial_readers: vec![SerialReaderConfig {
                                     name: "reader".to_owned(),
                                     file: Some("/nonexistent/serial-input".to_owned()),
                                 }],
            ..MachineConfig::default()
        };
        assert!(config.build().is_err());
    }
}
