//! Drive and tape-slot occupancy, and the tape-group allocation policy
//! (SPEC_FULL §C.8, grounded on `tape_svc_proc.c`/`sum_svc_proc.c`'s drive
//! busy/idle, tape mounted/unmounted, and group-affinity state machine).
//! Spec §1 excludes the tape/robot driver internals themselves; this
//! models only the occupancy bookkeeping the dispatcher and archive worker
//! need to decide which drive a `GET`/`PUT` should use.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DriveId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TapeId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveState {
    Idle,
    /// Mounted with `tape`, serving the unit at `sunum`.
    Busy { tape: TapeId },
}

#[derive(Debug, Clone)]
pub struct Drive {
    pub id: DriveId,
    pub state: DriveState,
    /// The tape group this drive is currently affined to, if any (spec
    /// §4.5 "tape-group allocation policy"). Sticky until the drive goes
    /// idle and is reassigned, to avoid thrashing mounts across groups.
    pub group_affinity: Option<i32>,
}

impl Drive {
    pub fn idle(id: DriveId) -> Self {
        Self {
            id,
            state: DriveState::Idle,
            group_affinity: None,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, DriveState::Idle)
    }
}

/// Tracks every drive's occupancy and picks one for a tape-group request.
/// Not `Send`-shared: owned exclusively by the archive worker, which is the
/// only thread ever allowed to touch the archive manager's state (spec §5
/// "Exactly one archive worker thread").
pub struct DriveModel {
    drives: HashMap<DriveId, Drive>,
}

impl DriveModel {
    pub fn new(drive_count: u32) -> Self {
        let drives = (0..drive_count)
            .map(|i| {
                let id = DriveId(i);
                (id, Drive::idle(id))
            })
            .collect();
        Self { drives }
    }

    /// Picks a drive for `group`: prefers an idle drive already affined to
    /// `group` (avoids remounting the group's tape), falling back to any
    /// idle drive, adopting `group` as its new affinity.
    pub fn acquire(&mut self, group: i32, tape: TapeId) -> Option<DriveId> {
        let affine = self
            .drives
            .values()
            .find(|d| d.is_idle() && d.group_affinity == Some(group))
            .map(|d| d.id);
        let chosen = affine.or_else(|| self.drives.values().find(|d| d.is_idle()).map(|d| d.id))?;

        let drive = self.drives.get_mut(&chosen)?;
        drive.state = DriveState::Busy { tape };
        drive.group_affinity = Some(group);
        Some(chosen)
    }

    pub fn release(&mut self, id: DriveId) {
        if let Some(drive) = self.drives.get_mut(&id) {
            drive.state = DriveState::Idle;
        }
    }

    pub fn is_busy(&self, id: DriveId) -> bool {
        self.drives.get(&id).is_some_and(|d| !d.is_idle())
    }

    pub fn idle_count(&self) -> usize {
        self.drives.values().filter(|d| d.is_idle()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_group_affine_idle_drive() {
        let mut model = DriveModel::new(2);
        let first = model.acquire(7, TapeId(1)).unwrap();
        model.release(first);
        let second = model.acquire(7, TapeId(2)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn falls_back_to_any_idle_drive_when_no_affinity_matches() {
        let mut model = DriveModel::new(1);
        let a = model.acquire(1, TapeId(1)).unwrap();
        model.release(a);
        let b = model.acquire(2, TapeId(2)).unwrap();
        assert_eq!(a, b);
        assert_eq!(model.idle_count(), 0);
    }

    #[test]
    fn no_idle_drive_returns_none() {
        let mut model = DriveModel::new(1);
        model.acquire(1, TapeId(1)).unwrap();
        assert!(model.acquire(2, TapeId(2)).is_none());
    }
}
