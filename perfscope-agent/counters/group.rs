// Counter group: one leader plus siblings read atomically as one unit

use std::os::fd::{AsFd, OwnedFd};

use perfscope_raw::arch::{self, UserAccess};
use perfscope_raw::{sys, CounterWidth};

use crate::counters::event::Event;
use crate::error::{PerfscopeError, Result};

/// Most counters a single group may hold.
pub const MAX_COUNTERS: usize = 32;

/// Counter values from one read of a group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    size: usize,
    values: [i64; MAX_COUNTERS],
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            size: 0,
            values: [0; MAX_COUNTERS],
        }
    }
}

impl Snapshot {
    /// Build a snapshot, dropping values beyond [`MAX_COUNTERS`].
    pub fn from_values(values: &[i64]) -> Self {
        let mut snap = Self::default();
        let size = values.len().min(MAX_COUNTERS);
        snap.values[..size].copy_from_slice(&values[..size]);
        snap.size = size;
        snap
    }

    /// `size` zero values, used to keep series aligned after a failed read.
    pub fn zeroed(size: usize) -> Self {
        Self {
            size: size.min(MAX_COUNTERS),
            values: [0; MAX_COUNTERS],
        }
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Value of counter `index`; zero for counters the read did not cover.
    pub fn value(&self, index: usize) -> i64 {
        if index < self.size {
            self.values[index]
        } else {
            0
        }
    }

    pub fn values(&self) -> &[i64] {
        &self.values[..self.size]
    }

    /// This snapshot shifted back by `read`, as if the counters had been
    /// zeroed right after `read` was taken.
    pub fn rebased(&self, read: &Snapshot) -> Snapshot {
        let mut snap = *self;
        for (index, value) in snap.values[..snap.size].iter_mut().enumerate() {
            *value = value.wrapping_sub(read.value(index));
        }
        snap
    }
}

/// Start/stop pairing state for scope reads on one group
///
/// At most one scope may be open per group; nested or interleaved scopes are
/// rejected and leave the open scope untouched.
#[derive(Debug, Default)]
pub struct ScopeTracker {
    open: Option<u16>,
    last_snap: Snapshot,
    /// The start snapshot came from a group read and moves with group resets.
    group_read: bool,
}

impl ScopeTracker {
    pub fn check(&self, scope_id: u16, is_stop: bool) -> Result<()> {
        match (self.open, is_stop) {
            (None, false) => Ok(()),
            (Some(open), true) if open == scope_id => Ok(()),
            (Some(open), false) => Err(PerfscopeError::ScopeError(format!(
                "start of scope {scope_id} while scope {open} is still open"
            ))),
            (Some(open), true) => Err(PerfscopeError::ScopeError(format!(
                "stop of scope {scope_id} does not match open scope {open}"
            ))),
            (None, true) => Err(PerfscopeError::ScopeError(format!(
                "could not find the collect_scope_start call for scope {scope_id}"
            ))),
        }
    }

    pub fn record(&mut self, scope_id: u16, is_stop: bool, snap: Snapshot, group_read: bool) {
        if is_stop {
            self.open = None;
        } else {
            self.open = Some(scope_id);
            self.last_snap = snap;
            self.group_read = group_read;
        }
    }

    /// Account for a group reset right after `read`, so the open scope's
    /// stop delta still covers its whole duration.
    pub fn rebase(&mut self, read: &Snapshot) {
        if self.open.is_some() && self.group_read {
            self.last_snap = self.last_snap.rebased(read);
        }
    }

    pub fn open_scope(&self) -> Option<u16> {
        self.open
    }

    /// Snapshot taken by the most recent scope start.
    pub fn last_snap(&self) -> Snapshot {
        self.last_snap
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

struct Counter {
    name: String,
    fd: OwnedFd,
}

/// An opened perf_event read group
///
/// The first counter is the group leader; every ioctl and read goes through
/// it with `PERF_IOC_FLAG_GROUP`, so all counters are reset, enabled and
/// disabled together.
#[derive(Default)]
pub struct CounterGroup {
    counters: Vec<Counter>,
    scope: ScopeTracker,
    enable_perapi: bool,
}

impl CounterGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow direct register reads and the EL0 access check.
    pub fn set_enable_perapi(&mut self, enable: bool) {
        self.enable_perapi = enable;
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.counters.iter().map(|c| c.name.as_str())
    }

    fn leader(&self) -> Result<&OwnedFd> {
        self.counters
            .first()
            .map(|c| &c.fd)
            .ok_or_else(|| PerfscopeError::StateError("counter group is not open".to_string()))
    }

    /// Open `events` as one group, leader first, then reset and disable it.
    ///
    /// `tid` of `None` counts device wide on `cpu`. On failure nothing stays
    /// open: handles opened so far are closed before returning.
    pub fn init(&mut self, events: &[Event], tid: Option<i32>, cpu: Option<i32>) -> Result<()> {
        if !self.counters.is_empty() {
            return Err(PerfscopeError::StateError(
                "counter group must be released before it is reopened".to_string(),
            ));
        }
        let Some((first, rest)) = events.split_first() else {
            return Err(PerfscopeError::ConfigError(
                "counter group needs at least one event".to_string(),
            ));
        };
        if events.len() > MAX_COUNTERS {
            return Err(PerfscopeError::ConfigError(format!(
                "{} events exceed the group limit of {MAX_COUNTERS}",
                events.len()
            )));
        }

        let tid = tid.unwrap_or(-1);
        let cpu = cpu.unwrap_or(-1);
        let open = |event: &Event, group: Option<&OwnedFd>| {
            sys::open_counter(&event.attr(), tid, cpu, group.map(|fd| fd.as_fd())).map_err(
                |source| {
                    tracing::debug!("Failed to init counter {}: {}", event.name, source);
                    PerfscopeError::CounterOpenError {
                        name: event.name.clone(),
                        source,
                    }
                },
            )
        };

        let leader = open(first, None)?;
        let mut counters = Vec::with_capacity(events.len());
        for event in rest {
            let fd = open(event, Some(&leader))?;
            counters.push(Counter {
                name: event.name.clone(),
                fd,
            });
        }
        counters.insert(
            0,
            Counter {
                name: first.name.clone(),
                fd: leader,
            },
        );

        let leader = counters[0].fd.as_fd();
        sys::reset_group(leader)?;
        sys::disable_group(leader)?;

        tracing::debug!(
            "Opened counter group of {} events for tid {} cpu {}",
            counters.len(),
            tid,
            cpu
        );
        self.counters = counters;
        self.scope.reset();
        Ok(())
    }

    /// Reset and enable the whole group.
    ///
    /// In per-API mode this also requires user-space PMU access; a denied
    /// access register yields [`PerfscopeError::HardwareAccess`].
    pub fn start(&mut self) -> Result<()> {
        let leader = self.leader()?.as_fd();
        sys::reset_group(leader)?;
        sys::enable_group(leader)?;

        if self.enable_perapi {
            match arch::check_user_access() {
                UserAccess::Granted => {}
                UserAccess::Denied(value) => return Err(PerfscopeError::HardwareAccess(value)),
                UserAccess::Unsupported => {
                    tracing::debug!("No direct PMU access on this platform, using group reads")
                }
            }
        }
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        sys::disable_group(self.leader()?.as_fd())?;
        Ok(())
    }

    fn read(&self) -> Result<Snapshot> {
        let leader = self.leader()?.as_fd();
        let mut raw = [0u64; MAX_COUNTERS];
        let nr = sys::read_group(leader, &mut raw)?;
        if nr != self.counters.len() {
            tracing::warn!(
                "Counter group returned {} values, expected {}",
                nr,
                self.counters.len()
            );
        }

        let mut snap = Snapshot::default();
        snap.size = self.counters.len();
        for (dst, src) in snap.values.iter_mut().zip(raw.iter()).take(snap.size) {
            *dst = *src as i64;
        }
        Ok(snap)
    }

    /// Read every counter, then zero the group.
    ///
    /// Each call yields the delta since the previous `collect` or `start`.
    ///
    /// A scope open across the reset is re-based so its delta stays whole.
    pub fn collect(&mut self, now: i64) -> Result<Snapshot> {
        let snap = self.read()?;
        match sys::reset_group(self.leader()?.as_fd()) {
            Ok(()) => self.scope.rebase(&snap),
            Err(e) => tracing::warn!("Counter reset after collect at {} failed: {}", now, e),
        }
        Ok(snap)
    }

    /// Take a scope start or stop snapshot without resetting the counters.
    ///
    /// In per-API mode the dedicated cycle register matching `width` is read
    /// directly and only the first value is filled in.
    pub fn collect_scope(
        &mut self,
        scope_id: u16,
        is_stop: bool,
        width: CounterWidth,
    ) -> Result<Snapshot> {
        self.scope.check(scope_id, is_stop)?;

        let direct = if self.enable_perapi {
            arch::read_cycle_counter(width)
        } else {
            None
        };
        let snap = match direct {
            Some(cycles) => Snapshot::from_values(&[cycles as i64]),
            None => self.read()?,
        };

        self.scope.record(scope_id, is_stop, snap, direct.is_none());
        Ok(snap)
    }

    /// Snapshot recorded by the last scope start.
    pub fn last_snap(&self) -> Snapshot {
        self.scope.last_snap()
    }

    pub fn open_scope(&self) -> Option<u16> {
        self.scope.open_scope()
    }

    /// Close every handle. Safe on a group that never opened.
    pub fn deinit(&mut self) {
        self.counters.clear();
        self.scope.reset();
    }
}
