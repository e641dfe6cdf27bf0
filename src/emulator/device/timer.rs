use std::cell::RefCell;
use std::rc::{Rc, Weak};

use emulator::{ErrorKind, Result};
use emulator::schedulable::{Schedulable, SyncTag};
use emulator::scheduler::{Scheduler, SyncClient};
use emulator::time::{EmuDuration, EmuTime};

const TICK: SyncTag = 0;

/// A periodic timer, rescheduling itself from its own callback.
#[derive(Debug)]
pub struct Timer {
    name: String,
    sync: SyncClient,
    period: EmuDuration,
    running: bool,
    /// Expirations since the last `take_fired`.
    fired: u64,
}

impl Timer {
    pub fn new(scheduler: &Rc<Scheduler>, name: &str, period: EmuDuration)
               -> Rc<RefCell<Timer>> {
        Rc::new_cyclic(|this: &Weak<RefCell<Timer>>| {
            RefCell::new(Timer {
                name: name.to_owned(),
                sync: SyncClient::new(scheduler, this.clone(), name),
                period: period,
                running: false,
                fired: 0,
            })
        })
    }

    /// Start counting from `time`; the first expiration is one period later.
    /// A zero period is refused, an infinite one never expires.
    pub fn start(&mut self, time: EmuTime) -> Result<()> {
        self.check_period(self.period)?;
        self.sync.remove_sync_point(TICK);
        self.running = false;
        if let Some(next) = time.checked_add(self.period) {
            self.sync.set_sync_point(next, TICK)?;
            self.running = true;
        }
        Ok(())
    }

    pub fn stop(&mut self) {
        self.running = false;
        self.sync.remove_sync_point(TICK);
    }

    /// Change the period. A running timer restarts from `time`.
    pub fn set_period(&mut self, period: EmuDuration, time: EmuTime) -> Result<()> {
        self.check_period(period)?;
        self.period = period;
        if self.running {
            self.start(time)?;
        }
        Ok(())
    }

    fn check_period(&self, period: EmuDuration) -> Result<()> {
        if period == EmuDuration::zero() {
            return Err(ErrorKind::ZeroPeriod(self.name.clone()).into());
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn fired(&self) -> u64 {
        self.fired
    }

    pub fn take_fired(&mut self) -> u64 {
        let fired = self.fired;
        self.fired = 0;
        fired
    }
}

impl Schedulable for Timer {
    fn execute_until(&mut self, time: EmuTime, _: SyncTag) {
        self.fired += 1;
        if !self.running {
            return;
        }
        let res = match time.checked_add(self.period) {
            Some(next) => self.sync.set_sync_point(next, TICK),
            None => Ok(()),
        };
        match res {
            Ok(()) => self.running = self.sync.pending_sync_point(TICK),
            Err(e) => {
                warn!("{}: {}", self.name, e);
                self.running = false;
            }
        }
    }

    fn sched_name(&self) -> &str {
        &self.name
    }
}
