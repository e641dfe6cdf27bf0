use std::cmp;
use std::rc::Rc;

use emulator::plug::PluggingController;
use emulator::scheduler::Scheduler;
use emulator::time::EmuTime;

/// One emulated machine: the scheduler and plug registry every component of
/// that machine is built against.
#[derive(Debug)]
pub struct Machine {
    scheduler: Rc<Scheduler>,
    plugging: Rc<PluggingController>,
}

impl Default for Machine {
    fn default() -> Machine {
        Machine::new(EmuTime::zero())
    }
}

impl Machine {
    pub fn new(start: EmuTime) -> Machine {
        Machine {
            scheduler: Rc::new(Scheduler::new(start)),
            plugging: PluggingController::new(),
        }
    }

    pub fn scheduler(&self) -> &Rc<Scheduler> {
        &self.scheduler
    }

    pub fn plugging(&self) -> &Rc<PluggingController> {
        &self.plugging
    }

    pub fn current_time(&self) -> EmuTime {
        self.scheduler.current_time()
    }

    /// Run until `limit`, returning the number of sync points fired.
    ///
    /// `cpu(from, to)` is called for every stretch of time between two
    /// events and must emulate exactly that stretch. With an infinite limit
    /// the run stops once nothing is pending.
    pub fn run<F>(&self, limit: EmuTime, mut cpu: F) -> usize
        where F: FnMut(EmuTime, EmuTime)
    {
        let mut fired = 0;
        loop {
            let now = self.scheduler.current_time();
            let next = cmp::min(self.scheduler.next_sync_time(), limit);
            if next.is_infinite() {
                break;
            }
            if next > now {
                cpu(now, next);
            }
            fired += self.scheduler.schedule(next);
            if next >= limit {
                break;
            }
        }
        fired
    }

    /// Run until `limit` with nothing to emulate between events.
    pub fn run_until(&self, limit: EmuTime) -> usize {
        self.run(limit, |_, _| ())
    }
}
