// ============================================================================
// Event Queue
// Timestamp-keyed buckets with seeded tie-breaking
// ============================================================================

use crate::domain::{Timestamp, When};
use crate::error::{SimError, SimResult};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use smallvec::{smallvec, SmallVec};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Identifies one scheduled activity for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActivityId(u64);

impl fmt::Display for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "activity-{}", self.0)
    }
}

/// Follow-up work returned by an executed activity.
///
/// A single activity is an independent insert. Two or more are a group and
/// keep their relative order when executed.
#[derive(Debug, Clone, PartialEq)]
pub struct Scheduled<A> {
    pub when: When,
    pub activities: SmallVec<[A; 2]>,
}

impl<A> Scheduled<A> {
    pub fn one(when: When, activity: A) -> Self {
        Self {
            when,
            activities: smallvec![activity],
        }
    }

    pub fn group(when: When, activities: impl IntoIterator<Item = A>) -> Self {
        Self {
            when,
            activities: activities.into_iter().collect(),
        }
    }

    pub fn immediately(activity: A) -> Self {
        Self::one(When::Immediate, activity)
    }
}

type Group<A> = SmallVec<[(ActivityId, A); 1]>;

/// Activities sharing one timestamp.
struct Bucket<A> {
    rng: ChaCha8Rng,
    groups: Vec<Group<A>>,
}

impl<A> Bucket<A> {
    fn new(clock_seed: u64, at: Timestamp) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(clock_seed ^ at.ticks() as u64),
            groups: Vec::new(),
        }
    }

    /// Uniformly random slot among the existing groups.
    fn insert(&mut self, group: Group<A>) {
        let slot = self.rng.gen_range(0..=self.groups.len());
        self.groups.insert(slot, group);
    }

    fn remove(&mut self, id: ActivityId) -> bool {
        let found = self.groups.iter().enumerate().find_map(|(g, group)| {
            group
                .iter()
                .position(|(gid, _)| *gid == id)
                .map(|pos| (g, pos))
        });
        let Some((g, pos)) = found else {
            return false;
        };
        self.groups[g].remove(pos);
        if self.groups[g].is_empty() {
            self.groups.remove(g);
        }
        true
    }

    fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Discrete-event clock: a forward-only cursor over timestamp buckets.
///
/// Independent inserts into one bucket land in a uniformly random order
/// drawn from the clock seed; each bucket has its own generator keyed by
/// (seed, timestamp), so the outcome for one timestamp does not depend on
/// what was scheduled at other timestamps.
pub struct Clock<A> {
    now: Timestamp,
    seed: u64,
    buckets: BTreeMap<Timestamp, Bucket<A>>,
    /// Scheduled and not yet claimed, with their timestamp
    pending: HashMap<ActivityId, Timestamp>,
    next_id: u64,
}

impl<A: fmt::Debug> Clock<A> {
    pub fn new(seed: u64) -> Self {
        Self {
            now: Timestamp::ZERO,
            seed,
            buckets: BTreeMap::new(),
            pending: HashMap::new(),
            next_id: 0,
        }
    }

    pub fn now(&self) -> Timestamp {
        self.now
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Activities scheduled and not yet executed or cancelled
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn is_idle(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Earliest timestamp with queued work
    pub fn next_time(&self) -> Option<Timestamp> {
        self.buckets.keys().next().copied()
    }

    fn resolve(&self, when: When) -> SimResult<Timestamp> {
        let at = when.resolve(self.now);
        if at < self.now {
            return Err(SimError::ScheduleInPast { at, now: self.now });
        }
        Ok(at)
    }

    fn issue(&mut self, at: Timestamp) -> ActivityId {
        self.next_id += 1;
        let id = ActivityId(self.next_id);
        self.pending.insert(id, at);
        id
    }

    fn enqueue(&mut self, at: Timestamp, group: Group<A>) {
        let seed = self.seed;
        self.buckets
            .entry(at)
            .or_insert_with(|| Bucket::new(seed, at))
            .insert(group);
    }

    /// Schedule one independent activity.
    pub fn schedule(&mut self, when: When, activity: A) -> SimResult<ActivityId> {
        let at = self.resolve(when)?;
        let id = self.issue(at);
        tracing::trace!(%id, %at, ?activity, "scheduled");
        self.enqueue(at, smallvec![(id, activity)]);
        Ok(id)
    }

    /// Schedule activities that execute back to back, in iteration order.
    pub fn schedule_group(
        &mut self,
        when: When,
        activities: impl IntoIterator<Item = A>,
    ) -> SimResult<SmallVec<[ActivityId; 2]>> {
        let at = self.resolve(when)?;
        let mut group: Group<A> = SmallVec::new();
        let mut ids = SmallVec::new();
        for activity in activities {
            let id = self.issue(at);
            tracing::trace!(%id, %at, ?activity, "scheduled in group");
            group.push((id, activity));
            ids.push(id);
        }
        if !group.is_empty() {
            self.enqueue(at, group);
        }
        Ok(ids)
    }

    /// Schedule a follow-up returned by an executed activity.
    pub fn schedule_all(&mut self, scheduled: Scheduled<A>) -> SimResult<SmallVec<[ActivityId; 2]>> {
        let Scheduled { when, mut activities } = scheduled;
        if activities.len() == 1 {
            let activity = activities.remove(0);
            Ok(smallvec![self.schedule(when, activity)?])
        } else {
            self.schedule_group(when, activities)
        }
    }

    /// Drop a scheduled activity. No-op once it has executed.
    pub fn cancel(&mut self, id: ActivityId) -> bool {
        let Some(at) = self.pending.remove(&id) else {
            return false;
        };
        if let Some(bucket) = self.buckets.get_mut(&at) {
            if bucket.remove(id) && bucket.is_empty() {
                self.buckets.remove(&at);
            }
        }
        tracing::trace!(%id, %at, "cancelled");
        true
    }

    /// Mark a dequeued activity as executing.
    ///
    /// Returns false if it was cancelled after its bucket was taken.
    pub fn claim(&mut self, id: ActivityId) -> bool {
        self.pending.remove(&id).is_some()
    }

    /// Take the earliest bucket at or before `end` and advance `now` to it.
    ///
    /// Everything scheduled afterwards, even for the same timestamp, goes
    /// into a fresh bucket and waits for the next call.
    pub fn next_bucket(&mut self, end: Timestamp) -> Option<(Timestamp, Vec<(ActivityId, A)>)> {
        let at = self.next_time()?;
        if at > end {
            return None;
        }
        let bucket = self.buckets.remove(&at)?;
        assert!(at >= self.now, "clock moved backwards: {} < {}", at, self.now);
        self.now = at;
        let activities = bucket.groups.into_iter().flatten().collect();
        Some((at, activities))
    }

    /// Move `now` forward without executing anything.
    pub fn advance_to(&mut self, at: Timestamp) -> SimResult<()> {
        if at < self.now {
            return Err(SimError::ScheduleInPast { at, now: self.now });
        }
        if let Some(next) = self.next_time() {
            if next < at {
                return Err(SimError::InvalidParameter {
                    name: "advance_to",
                    value: format!("{} skips work queued at {}", at, next),
                });
            }
        }
        self.now = at;
        Ok(())
    }

    /// Run buckets in timestamp order until the queue is empty or the next
    /// bucket lies past `end`. Each activity's follow-ups are scheduled as
    /// soon as it returns.
    pub fn execute_until<F>(&mut self, end: Timestamp, mut execute: F) -> SimResult<usize>
    where
        F: FnMut(Timestamp, A) -> SimResult<Vec<Scheduled<A>>>,
    {
        let mut executed = 0;
        while let Some((at, activities)) = self.next_bucket(end) {
            for (id, activity) in activities {
                if !self.claim(id) {
                    continue;
                }
                for follow_up in execute(at, activity)? {
                    self.schedule_all(follow_up)?;
                }
                executed += 1;
            }
        }
        Ok(executed)
    }
}
