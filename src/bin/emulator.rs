extern crate docopt;
extern crate emucore;
#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;
extern crate serde_json;
extern crate simplelog;

#[macro_use]
mod utils;

use std::io::Write;

use docopt::Docopt;
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};

use emucore::emulator::config::MachineConfig;
use emucore::emulator::plug::PlugState;
use emucore::emulator::time::EmuTime;

const USAGE: &'static str = "
Usage:
  emulator [options] [<config>]
  emulator (--help | --version)

Options:
  <config>               JSON machine description. Reads stdin if absent.
  --load=<file>          Restore the plug state saved in <file> before running.
  --state=<file>         Write the plug state to <file> after running.
  --log-level=<level>    off, error, warn, info, debug or trace [default: info].
  -h, --help             Show this message.
  --version              Show the version of emulator.
";

#[derive(Debug, Deserialize)]
struct Args {
    arg_config: Option<String>,
    flag_load: Option<String>,
    flag_state: Option<String>,
    flag_log_level: String,
}

fn main_ret() -> i32 {
    let args: Args = Docopt::new(USAGE)
                            .and_then(|d| {
                                d.version(Some(env!("CARGO_PKG_VERSION").to_owned()))
                                 .deserialize()
                            })
                            .unwrap_or_else(|e| e.exit());

    let level = match args.flag_log_level.parse::<LevelFilter>() {
        Ok(level) => level,
        Err(_) => die!(1, "Invalid log level: {}", args.flag_log_level),
    };
    if let Err(e) = TermLogger::init(level,
                                     Config::default(),
                                     TerminalMode::Stderr,
                                     ColorChoice::Auto) {
        die!(1, "Can't set up logging: {}", e);
    }

    let input = match utils::get_input(args.arg_config) {
        Ok(input) => input,
        Err(e) => die!(1, "Error while opening the config: {}", e),
    };
    let config: MachineConfig = match serde_json::from_reader(input) {
        Ok(config) => config,
        Err(e) => die!(1, "Invalid config: {}", e),
    };
    let board = match config.build() {
        Ok(board) => board,
        Err(e) => die!(1, "Can't build the machine: {}", e),
    };
    let machine = &board.machine;

    if let Some(path) = args.flag_load {
        let state: PlugState = match utils::get_input(Some(path))
                                           .map_err(|e| e.to_string())
                                           .and_then(|i| {
                                               serde_json::from_reader(i)
                                                   .map_err(|e| e.to_string())
                                           }) {
            Ok(state) => state,
            Err(e) => die!(1, "Can't load the plug state: {}", e),
        };
        machine.plugging().load_state(&state, machine.current_time());
    }

    let state = machine.plugging().save_state();
    for name in machine.plugging().connector_names() {
        let plugged = state.connectors
                           .get(&name)
                           .and_then(|c| c.plugged.clone())
                           .unwrap_or_else(|| "nothing".to_owned());
        info!("{} ({}): {}",
              name,
              machine.plugging().connector_class(&name).unwrap_or_default(),
              plugged);
    }

    let end = machine.current_time() + config.run_duration();
    let fired = machine.run_until(end);
    info!("Ran until {} ({:.3}s), {} sync points fired",
          machine.current_time(),
          (machine.current_time() - EmuTime::zero()).to_secs(),
          fired);

    let mut serial_ports = board.serial_ports;
    for port in serial_ports.iter_mut() {
        let received = port.poll();
        info!("{}: {} bytes received", port.connector().name(), received);
    }

    if let Some(path) = args.flag_state {
        let mut output = match utils::get_output(Some(path)) {
            Ok(o) => o,
            Err(e) => die!(1, "Error while opening the state output: {}", e),
        };
        let state = machine.plugging().save_state();
        if let Err(e) = serde_json::to_writer_pretty(&mut output, &state) {
            die!(1, "Can't write the plug state: {}", e);
        }
        if let Err(e) = writeln!(output) {
            die!(1, "Can't write the plug state: {}", e);
        }
    }
    0
}

fn main() {
    std::process::exit(main_ret());
}
