//! Serial input fed by a blocking reader on its own thread.
//!
//! The thread only pushes bytes into a `ByteQueue` and asks the scheduler
//! for an ASAP sync point. The bytes reach the emulated machine when that
//! sync point fires on the emulation thread.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::io::{self, Read};
use std::rc::{Rc, Weak};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use emulator::{ErrorKind, Result};
use emulator::device::serial::{SerialInDevice, SERIAL_IN_CLASS};
use emulator::plug::Pluggable;
use emulator::schedulable::{Schedulable, SyncTag};
use emulator::scheduler::{AsapSender, Scheduler, SyncClient};
use emulator::time::EmuTime;

const RECEIVE: SyncTag = 0;

/// Byte FIFO shared between an I/O thread and the emulation thread.
#[derive(Debug, Clone, Default)]
pub struct ByteQueue {
    inner: Arc<Mutex<VecDeque<u8>>>,
}

impl ByteQueue {
    pub fn new() -> ByteQueue {
        ByteQueue::default()
    }

    fn lock(&self) -> MutexGuard<VecDeque<u8>> {
        // A panicking producer can't leave a VecDeque half-updated.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn push(&self, bytes: &[u8]) {
        self.lock().extend(bytes.iter().cloned());
    }

    pub fn drain_into(&self, out: &mut VecDeque<u8>) -> usize {
        let mut queue = self.lock();
        let n = queue.len();
        out.extend(queue.drain(..));
        n
    }

    pub fn clear(&self) -> usize {
        let mut queue = self.lock();
        let n = queue.len();
        queue.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Producer side of a `SerialReader`. Can be sent to another thread.
#[derive(Debug, Clone)]
pub struct SerialFeed {
    queue: ByteQueue,
    asap: AsapSender,
}

impl SerialFeed {
    /// Queue `bytes` and wake the reader. Returns false once the emulator
    /// is gone.
    pub fn send(&self, bytes: &[u8]) -> bool {
        self.queue.push(bytes);
        self.asap.request()
    }
}

/// A pluggable serial source. Bytes received while unplugged are dropped.
pub struct SerialReader {
    name: String,
    sync: SyncClient,
    queue: ByteQueue,
    received: VecDeque<u8>,
    plugged: bool,
    thread: Option<JoinHandle<io::Result<()>>>,
}

impl fmt::Debug for SerialReader {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SerialReader({}, {} bytes received)", self.name, self.received.len())
    }
}

impl SerialReader {
    pub fn new(scheduler: &Rc<Scheduler>, name: &str) -> Rc<RefCell<SerialReader>> {
        Rc::new_cyclic(|this: &Weak<RefCell<SerialReader>>| {
            RefCell::new(SerialReader {
                name: name.to_owned(),
                sync: SyncClient::new(scheduler, this.clone(), name),
                queue: ByteQueue::new(),
                received: VecDeque::new(),
                plugged: false,
                thread: None,
            })
        })
    }

    pub fn feed(&self) -> SerialFeed {
        SerialFeed {
            queue: self.queue.clone(),
            asap: self.sync.asap_sender(RECEIVE),
        }
    }

    /// Start a thread copying `source` into this reader until end of file.
    pub fn spawn_pump<R>(&mut self, source: R) -> Result<()>
        where R: Read + Send + 'static
    {
        let feed = self.feed();
        let name = self.name.clone();
        let handle = thread::Builder::new()
            .name(format!("{}-pump", self.name))
            .spawn(move || {
                let res = pump(source, &feed);
                match res {
                    Ok(()) => debug!("{}: input closed", name),
                    Err(ref e) => warn!("{}: read error: {}", name, e),
                }
                res
            })?;
        self.thread = Some(handle);
        Ok(())
    }

    /// Wait for the pump thread to reach end of input.
    pub fn join(&mut self) -> Result<()> {
        match self.thread.take() {
            Some(handle) => match handle.join() {
                Ok(res) => res.map_err(|e| ErrorKind::Io(e).into()),
                Err(_) => Err(io::Error::new(io::ErrorKind::Other,
                                             "serial pump thread panicked")
                                  .into()),
            },
            None => Ok(()),
        }
    }
}

fn pump<R: Read>(mut source: R, feed: &SerialFeed) -> io::Result<()> {
    let mut buf = [0; 256];
    loop {
        match source.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => {
                if !feed.send(&buf[..n]) {
                    return Ok(());
                }
            }
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => (),
            Err(e) => return Err(e),
        }
    }
}

impl Schedulable for SerialReader {
    fn execute_until(&mut self, time: EmuTime, _: SyncTag) {
        if self.plugged {
            let n = self.queue.drain_into(&mut self.received);
            trace!("{}: {} bytes at {}", self.name, n, time);
        } else {
            let n = self.queue.clear();
            debug!("{}: not plugged in, dropped {} bytes", self.name, n);
        }
    }

    fn sched_name(&self) -> &str {
        &self.name
    }
}

impl Pluggable for SerialReader {
    fn name(&self) -> &str {
        &self.name
    }

    fn class(&self) -> &str {
        SERIAL_IN_CLASS
    }

    fn description(&self) -> &str {
        "Serial input read from a host stream"
    }

    fn plug_hook(&mut self, _: &str, _: EmuTime) -> Result<()> {
        self.plugged = true;
        Ok(())
    }

    fn unplug_hook(&mut self, _: EmuTime) {
        self.plugged = false;
        self.received.clear();
    }
}

impl SerialInDevice for SerialReader {
    fn drain(&mut self, out: &mut VecDeque<u8>) -> usize {
        let n = self.received.len();
        out.extend(self.received.drain(..));
        n
    }
}
