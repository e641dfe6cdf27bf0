//! The global event queue of one emulated machine.
//!
//! Devices never look at wall-clock time. They ask to be called back at
//! some `EmuTime` and the scheduler calls them strictly in deadline order,
//! ties broken by the order the requests were made. That order is part of
//! the emulation: a replay only reproduces a run if it is identical.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::mpsc;

use emulator::{ErrorKind, Result};
use emulator::schedulable::{Schedulable, SyncTag};
use emulator::time::EmuTime;

/// Identity of a registered schedulable.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SchedulableId(u64);

impl fmt::Display for SchedulableId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Copy, Clone)]
struct SyncPoint {
    id: SchedulableId,
    tag: SyncTag,
}

struct Client {
    name: String,
    target: Weak<RefCell<dyn Schedulable>>,
}

#[derive(Debug, Copy, Clone)]
struct AsapRequest {
    id: SchedulableId,
    tag: SyncTag,
}

pub struct Scheduler {
    current_time: Cell<EmuTime>,
    /// Keyed by (deadline, insertion sequence).
    queue: RefCell<BTreeMap<(EmuTime, u64), SyncPoint>>,
    next_seq: Cell<u64>,
    next_id: Cell<u64>,
    clients: RefCell<HashMap<SchedulableId, Client>>,
    asap_tx: mpsc::Sender<AsapRequest>,
    asap_rx: mpsc::Receiver<AsapRequest>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("current_time", &self.current_time.get())
            .field("pending", &self.queue.borrow().len())
            .field("clients", &self.clients.borrow().len())
            .finish()
    }
}

impl Default for Scheduler {
    fn default() -> Scheduler {
        Scheduler::new(EmuTime::zero())
    }
}

impl Scheduler {
    pub fn new(start: EmuTime) -> Scheduler {
        let (asap_tx, asap_rx) = mpsc::channel();
        Scheduler {
            current_time: Cell::new(start),
            queue: RefCell::new(BTreeMap::new()),
            next_seq: Cell::new(0),
            next_id: Cell::new(0),
            clients: RefCell::new(HashMap::new()),
            asap_tx: asap_tx,
            asap_rx: asap_rx,
        }
    }

    /// Time of the most recent sync point, or the limit of the last
    /// `schedule` call if that is later. Never goes backwards.
    pub fn current_time(&self) -> EmuTime {
        self.current_time.get()
    }

    fn add_client(&self, target: Weak<RefCell<dyn Schedulable>>, name: &str)
                  -> SchedulableId {
        let id = SchedulableId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        debug!("Registering schedulable {} as {}", name, id);
        self.clients.borrow_mut().insert(id, Client {
            name: name.to_owned(),
            target: target,
        });
        id
    }

    fn remove_client(&self, id: SchedulableId) {
        let removed = self.remove_sync_points(id);
        if let Some(client) = self.clients.borrow_mut().remove(&id) {
            debug!("Unregistering schedulable {} ({} sync points cancelled)",
                   client.name,
                   removed);
        }
    }

    fn client_name(&self, id: SchedulableId) -> String {
        self.clients
            .borrow()
            .get(&id)
            .map_or_else(|| id.to_string(), |c| c.name.clone())
    }

    /// The name `id` currently reports through `Schedulable::sched_name`,
    /// or `None` once it is gone.
    pub fn schedulable_name(&self, id: SchedulableId) -> Option<String> {
        let target = self.clients.borrow().get(&id)?.target.upgrade()?;
        let name = target.try_borrow().ok().map(|t| t.sched_name().to_owned());
        name.or_else(|| Some(self.client_name(id)))
    }

    /// Ask for `execute_until(time, tag)` to be called on `id`.
    ///
    /// `time` may equal the current time but not precede it.
    pub fn set_sync_point(&self, time: EmuTime, id: SchedulableId, tag: SyncTag)
                          -> Result<()> {
        if !self.clients.borrow().contains_key(&id) {
            return Err(ErrorKind::UnknownSchedulable(id).into());
        }
        let now = self.current_time.get();
        if time < now {
            return Err(ErrorKind::SyncPointInPast(time, now).into());
        }
        self.insert(time, id, tag);
        Ok(())
    }

    fn insert(&self, time: EmuTime, id: SchedulableId, tag: SyncTag) {
        let seq = self.next_seq.get();
        self.next_seq.set(seq + 1);
        trace!("Sync point {}:{} at {}", self.client_name(id), tag, time);
        self.queue.borrow_mut().insert((time, seq), SyncPoint {
            id: id,
            tag: tag,
        });
    }

    /// Cancel the earliest pending sync point matching `(id, tag)`.
    /// Returns whether one was found.
    pub fn remove_sync_point(&self, id: SchedulableId, tag: SyncTag) -> bool {
        let mut queue = self.queue.borrow_mut();
        let key = queue.iter()
                       .find(|&(_, sp)| sp.id == id && sp.tag == tag)
                       .map(|(key, _)| *key);
        match key {
            Some(key) => {
                queue.remove(&key);
                trace!("Removed sync point {}:{} at {}", id, tag, key.0);
                true
            }
            None => false,
        }
    }

    /// Cancel every pending sync point of `id`. Returns how many there were.
    pub fn remove_sync_points(&self, id: SchedulableId) -> usize {
        let mut queue = self.queue.borrow_mut();
        let before = queue.len();
        queue.retain(|_, sp| sp.id != id);
        before - queue.len()
    }

    pub fn pending_sync_point(&self, id: SchedulableId, tag: SyncTag) -> bool {
        self.queue
            .borrow()
            .values()
            .any(|sp| sp.id == id && sp.tag == tag)
    }

    pub fn pending_count(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Deadline of the earliest pending sync point, or infinity when there
    /// is none. The CPU may run up to this time without consulting the
    /// scheduler again.
    pub fn next_sync_time(&self) -> EmuTime {
        self.drain_asap();
        self.queue
            .borrow()
            .keys()
            .next()
            .map_or(EmuTime::infinity(), |&(time, _)| time)
    }

    /// Fire the earliest sync point if it is due at or before `limit`.
    /// Returns its deadline.
    pub fn fire_next(&self, limit: EmuTime) -> Option<EmuTime> {
        self.drain_asap();
        let (time, sp) = {
            let mut queue = self.queue.borrow_mut();
            let key = match queue.keys().next() {
                Some(&key) if key.0 <= limit => key,
                _ => return None,
            };
            let sp = queue.remove(&key)?;
            (key.0, sp)
        };
        if time > self.current_time.get() {
            self.current_time.set(time);
        }

        let client = self.clients
                         .borrow()
                         .get(&sp.id)
                         .map(|c| (c.target.clone(), c.name.clone()));
        match client {
            Some((target, name)) => match target.upgrade() {
                Some(target) => {
                    let mut target = target.borrow_mut();
                    trace!("Firing {}:{} at {}", target.sched_name(), sp.tag, time);
                    target.execute_until(time, sp.tag);
                }
                None => warn!("Schedulable {} is gone, dropping its sync point", name),
            },
            None => warn!("Sync point for unregistered schedulable {}", sp.id),
        }
        Some(time)
    }

    /// Fire every sync point due at or before `limit`, then move the
    /// current time up to `limit`.
    ///
    /// Sync points added by a callback are fired in the same pass if they
    /// fall within `limit`; sync points removed by a callback never fire.
    pub fn schedule(&self, limit: EmuTime) -> usize {
        let mut fired = 0;
        while self.fire_next(limit).is_some() {
            fired += 1;
        }
        if !limit.is_infinite() && limit > self.current_time.get() {
            self.current_time.set(limit);
        }
        fired
    }

    /// A handle other threads can use to request an immediate sync point
    /// for `(id, tag)`.
    pub fn asap_sender(&self, id: SchedulableId, tag: SyncTag) -> AsapSender {
        AsapSender {
            tx: self.asap_tx.clone(),
            id: id,
            tag: tag,
        }
    }

    fn drain_asap(&self) {
        while let Ok(req) = self.asap_rx.try_recv() {
            if !self.clients.borrow().contains_key(&req.id) {
                warn!("ASAP request for unregistered schedulable {}", req.id);
                continue;
            }
            // One outstanding request per tag is enough to drain a queue.
            if !self.pending_sync_point(req.id, req.tag) {
                let now = self.current_time.get();
                self.insert(now, req.id, req.tag);
            }
        }
    }
}

/// Sendable request for an "as soon as possible" sync point.
///
/// Made for I/O threads: they push data into a shared queue and call
/// `request`. The sync point is inserted at the current time the next time
/// the emulation thread consults the scheduler.
#[derive(Debug, Clone)]
pub struct AsapSender {
    tx: mpsc::Sender<AsapRequest>,
    id: SchedulableId,
    tag: SyncTag,
}

impl AsapSender {
    /// Returns false once the scheduler is gone.
    pub fn request(&self) -> bool {
        self.tx
            .send(AsapRequest {
                id: self.id,
                tag: self.tag,
            })
            .is_ok()
    }
}

/// Registration of a schedulable with a scheduler.
///
/// Owned by the schedulable itself. Dropping it cancels all its pending sync
/// points and unregisters it.
pub struct SyncClient {
    scheduler: Rc<Scheduler>,
    id: SchedulableId,
}

impl fmt::Debug for SyncClient {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SyncClient({})", self.id)
    }
}

impl SyncClient {
    /// Register `target` under `name`.
    ///
    /// Usually called from within `Rc::new_cyclic`, since the target has to
    /// own the returned client.
    pub fn new(scheduler: &Rc<Scheduler>,
               target: Weak<RefCell<dyn Schedulable>>,
               name: &str)
               -> SyncClient {
        SyncClient {
            scheduler: scheduler.clone(),
            id: scheduler.add_client(target, name),
        }
    }

    pub fn id(&self) -> SchedulableId {
        self.id
    }

    pub fn scheduler(&self) -> &Rc<Scheduler> {
        &self.scheduler
    }

    pub fn current_time(&self) -> EmuTime {
        self.scheduler.current_time()
    }

    pub fn set_sync_point(&self, time: EmuTime, tag: SyncTag) -> Result<()> {
        self.scheduler.set_sync_point(time, self.id, tag)
    }

    pub fn remove_sync_point(&self, tag: SyncTag) -> bool {
        self.scheduler.remove_sync_point(self.id, tag)
    }

    pub fn remove_sync_points(&self) -> usize {
        self.scheduler.remove_sync_points(self.id)
    }

    pub fn pending_sync_point(&self, tag: SyncTag) -> bool {
        self.scheduler.pending_sync_point(self.id, tag)
    }

    pub fn asap_sender(&self, tag: SyncTag) -> AsapSender {
        self.scheduler.asap_sender(self.id, tag)
    }
}

impl Drop for SyncClient {
    fn drop(&mut self) {
        self.scheduler.remove_client(self.id);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::{Rc, Weak};
    use std::thread;

    use super::*;

    type Log = Rc<RefCell<Vec<(String, u64, SyncTag)>>>;

    struct Recorder {
        name: String,
        log: Log,
        sync: SyncClient,
        /// Sync points to set when fired: (tag fired, delay, tag to set).
        chain: Vec<(SyncTag, u64, SyncTag)>,
        /// Tags to cancel when fired.
        cancel: Vec<SyncTag>,
    }

    impl Schedulable for Recorder {
        fn execute_until(&mut self, time: EmuTime, tag: SyncTag) {
            self.log.borrow_mut().push((self.name.clone(), time.ticks(), tag));
            for &(on, delay, next) in self.chain.iter() {
                if on == tag {
                    self.sync
                        .set_sync_point(EmuTime::from_ticks(time.ticks() + delay), next)
                        .unwrap();
                }
            }
            for &tag in self.cancel.iter() {
                self.sync.remove_sync_point(tag);
            }
        }

        fn sched_name(&self) -> &str {
            &self.name
        }
    }

    fn recorder(scheduler: &Rc<Scheduler>, name: &str, log: &Log)
                -> Rc<RefCell<Recorder>> {
        Rc::new_cyclic(|weak: &Weak<RefCell<Recorder>>| {
            RefCell::new(Recorder {
                name: name.to_owned(),
                log: log.clone(),
                sync: SyncClient::new(scheduler, weak.clone(), name),
                chain: vec![],
                cancel: vec![],
            })
        })
    }

    fn t(ticks: u64) -> EmuTime {
        EmuTime::from_ticks(ticks)
    }

    fn fired(log: &Log) -> Vec<(String, u64, SyncTag)> {
        log.borrow().clone()
    }

    #[test]
    fn test_fires_in_deadline_then_registration_order() {
        let scheduler = Rc::new(Scheduler::default());
        let log = Log::default();
        let a = recorder(&scheduler, "A", &log);
        let b = recorder(&scheduler, "B", &log);

        a.borrow().sync.set_sync_point(t(50), 1).unwrap();
        a.borrow().sync.set_sync_point(t(50), 2).unwrap();
        b.borrow().sync.set_sync_point(t(30), 0).unwrap();

        assert_eq!(scheduler.next_sync_time(), t(30));
        assert_eq!(scheduler.schedule(t(100)), 3);
        assert_eq!(fired(&log),
                   vec![("B".to_owned(), 30, 0),
                        ("A".to_owned(), 50, 1),
                        ("A".to_owned(), 50, 2)]);
        assert_eq!(scheduler.current_time(), t(100));
    }

    #[test]
    fn test_name_comes_from_schedulable() {
        let scheduler = Rc::new(Scheduler::default());
        let log = Log::default();
        let a = recorder(&scheduler, "A", &log);
        let id = a.borrow().sync.id();
        assert_eq!(scheduler.schedulable_name(id), Some("A".to_owned()));

        a.borrow_mut().name = "A'".to_owned();
        assert_eq!(scheduler.schedulable_name(id), Some("A'".to_owned()));

        drop(a);
        assert_eq!(scheduler.schedulable_name(id), None);
    }

    #[test]
    fn test_equal_deadlines_keep_insertion_order() {
        let scheduler = Rc::new(Scheduler::default());
        let log = Log::default();
        let devices: Vec<_> = ["d0", "d1", "d2", "d3"]
            .iter()
            .map(|name| recorder(&scheduler, name, &log))
            .collect();
        for d in devices.iter().rev() {
            d.borrow().sync.set_sync_point(t(10), 0).unwrap();
        }
        scheduler.schedule(t(10));
        let names: Vec<_> = fired(&log).into_iter().map(|(n, _, _)| n).collect();
        assert_eq!(names, vec!["d3", "d2", "d1", "d0"]);
    }

    #[test]
    fn test_current_time_follows_fired_sync_points() {
        let scheduler = Rc::new(Scheduler::default());
        let log = Log::default();
        let a = recorder(&scheduler, "A", &log);
        a.borrow().sync.set_sync_point(t(20), 0).unwrap();
        a.borrow().sync.set_sync_point(t(40), 0).unwrap();

        assert_eq!(scheduler.fire_next(t(100)), Some(t(20)));
        assert_eq!(scheduler.current_time(), t(20));
        assert_eq!(scheduler.fire_next(t(30)), None);
        assert_eq!(scheduler.current_time(), t(20));
        assert_eq!(scheduler.fire_next(t(40)), Some(t(40)));
        assert_eq!(scheduler.current_time(), t(40));
        assert_eq!(scheduler.next_sync_time(), EmuTime::infinity());
    }

    #[test]
    fn test_sync_point_in_past_is_rejected() {
        let scheduler = Rc::new(Scheduler::new(t(100)));
        let log = Log::default();
        let a = recorder(&scheduler, "A", &log);
        let err = a.borrow().sync.set_sync_point(t(99), 0).unwrap_err();
        match *err.kind() {
            ErrorKind::SyncPointInPast(time, now) => {
                assert_eq!(time, t(99));
                assert_eq!(now, t(100));
            }
            ref other => panic!("unexpected error {:?}", other),
        }
        assert!(!err.is_plug_error());
        assert!(a.borrow().sync.set_sync_point(t(100), 0).is_ok());
        assert_eq!(scheduler.pending_count(), 1);
    }

    #[test]
    fn test_remove_sync_point() {
        let scheduler = Rc::new(Scheduler::default());
        let log = Log::default();
        let a = recorder(&scheduler, "A", &log);
        {
            let a = a.borrow();
            a.sync.set_sync_point(t(10), 1).unwrap();
            a.sync.set_sync_point(t(20), 2).unwrap();
            assert!(a.sync.pending_sync_point(1));
            assert!(a.sync.remove_sync_point(1));
            assert!(!a.sync.pending_sync_point(1));
            assert!(!a.sync.remove_sync_point(1));
            assert!(a.sync.pending_sync_point(2));
        }
        scheduler.schedule(t(100));
        assert_eq!(fired(&log), vec![("A".to_owned(), 20, 2)]);
    }

    #[test]
    fn test_remove_sync_point_takes_earliest_duplicate() {
        let scheduler = Rc::new(Scheduler::default());
        let log = Log::default();
        let a = recorder(&scheduler, "A", &log);
        a.borrow().sync.set_sync_point(t(30), 0).unwrap();
        a.borrow().sync.set_sync_point(t(10), 0).unwrap();
        assert!(a.borrow().sync.remove_sync_point(0));
        assert_eq!(scheduler.next_sync_time(), t(30));
    }

    #[test]
    fn test_remove_sync_points_leaves_others() {
        let scheduler = Rc::new(Scheduler::default());
        let log = Log::default();
        let a = recorder(&scheduler, "A", &log);
        let b = recorder(&scheduler, "B", &log);
        a.borrow().sync.set_sync_point(t(10), 0).unwrap();
        a.borrow().sync.set_sync_point(t(20), 1).unwrap();
        b.borrow().sync.set_sync_point(t(15), 0).unwrap();
        assert_eq!(a.borrow().sync.remove_sync_points(), 2);
        scheduler.schedule(t(100));
        assert_eq!(fired(&log), vec![("B".to_owned(), 15, 0)]);
    }

    #[test]
    fn test_dropping_schedulable_cancels_its_sync_points() {
        let scheduler = Rc::new(Scheduler::default());
        let log = Log::default();
        let a = recorder(&scheduler, "A", &log);
        let id = a.borrow().sync.id();
        a.borrow().sync.set_sync_point(t(10), 0).unwrap();
        drop(a);
        assert_eq!(scheduler.pending_count(), 0);
        assert!(scheduler.set_sync_point(t(20), id, 0).is_err());
        assert_eq!(scheduler.schedule(t(100)), 0);
        assert!(fired(&log).is_empty());
    }

    #[test]
    fn test_callback_can_reschedule_within_same_pass() {
        let scheduler = Rc::new(Scheduler::default());
        let log = Log::default();
        let a = recorder(&scheduler, "A", &log);
        a.borrow_mut().chain = vec![(0, 0, 1), (1, 5, 2), (2, 100, 3)];
        a.borrow().sync.set_sync_point(t(10), 0).unwrap();

        scheduler.schedule(t(50));
        assert_eq!(fired(&log),
                   vec![("A".to_owned(), 10, 0),
                        ("A".to_owned(), 10, 1),
                        ("A".to_owned(), 15, 2)]);
        assert!(a.borrow().sync.pending_sync_point(3));
        assert_eq!(scheduler.next_sync_time(), t(115));
    }

    #[test]
    fn test_callback_can_cancel_unvisited_sync_point() {
        let scheduler = Rc::new(Scheduler::default());
        let log = Log::default();
        let a = recorder(&scheduler, "A", &log);
        let b = recorder(&scheduler, "B", &log);
        a.borrow_mut().cancel = vec![7];
        a.borrow().sync.set_sync_point(t(10), 0).unwrap();
        a.borrow().sync.set_sync_point(t(10), 7).unwrap();
        b.borrow().sync.set_sync_point(t(10), 0).unwrap();

        scheduler.schedule(t(10));
        assert_eq!(fired(&log),
                   vec![("A".to_owned(), 10, 0), ("B".to_owned(), 10, 0)]);
    }

    #[test]
    fn test_asap_request_from_other_thread() {
        let scheduler = Rc::new(Scheduler::new(t(500)));
        let log = Log::default();
        let a = recorder(&scheduler, "A", &log);
        let sender = a.borrow().sync.asap_sender(9);

        let handle = thread::spawn(move || {
            assert!(sender.request());
            assert!(sender.request());
        });
        handle.join().unwrap();

        assert_eq!(scheduler.next_sync_time(), t(500));
        assert_eq!(scheduler.schedule(t(500)), 1);
        assert_eq!(fired(&log), vec![("A".to_owned(), 500, 9)]);
    }

    #[test]
    fn test_asap_request_after_drop_is_ignored() {
        let scheduler = Rc::new(Scheduler::default());
        let log = Log::default();
        let a = recorder(&scheduler, "A", &log);
        let sender = a.borrow().sync.asap_sender(0);
        drop(a);
        assert!(sender.request());
        assert_eq!(scheduler.next_sync_time(), EmuTime::infinity());
    }
}
