#![doc(html_root_url = "https://docs.rs/emucore/")]

#![recursion_limit = "1024"]
#[macro_use]
extern crate error_chain;

#[macro_use]
extern crate log;
extern crate serde;
#[macro_use]
extern crate serde_derive;
#[cfg(test)]
extern crate serde_json;

pub mod emulator;

pub use emulator::{EmuDuration, EmuTime, Machine, PluggingController, Scheduler};
