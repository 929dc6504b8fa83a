//! Identity map for persistent students tracked by a session.
//!
//! Each entry keeps the last committed image next to the working copy;
//! an entry is dirty while the two differ.

use crate::model::student::{Student, StudentId};
use std::collections::BTreeMap;

#[derive(Debug)]
struct Tracked {
    committed: Student,
    current: Student,
}

#[derive(Debug, Default)]
pub(crate) struct IdentityMap {
    entries: BTreeMap<StudentId, Tracked>,
}

impl IdentityMap {
    pub(crate) fn contains(&self, id: StudentId) -> bool {
        self.entries.contains_key(&id)
    }

    pub(crate) fn get(&self, id: StudentId) -> Option<&Student> {
        self.entries.get(&id).map(|tracked| &tracked.current)
    }

    pub(crate) fn get_mut(&mut self, id: StudentId) -> Option<&mut Student> {
        self.entries.get_mut(&id).map(|tracked| &mut tracked.current)
    }

    /// Registers a row whose stored state equals `student`.
    ///
    /// Students without an id are ignored.
    pub(crate) fn insert_clean(&mut self, student: Student) {
        if let Some(id) = student.id {
            self.entries.insert(
                id,
                Tracked {
                    committed: student.clone(),
                    current: student,
                },
            );
        }
    }

    /// Returns the tracked working copy for a freshly loaded row, tracking
    /// the row first when it is new to the session.
    pub(crate) fn attach(&mut self, loaded: Student) -> Student {
        match loaded.id.and_then(|id| self.get(id)) {
            Some(current) => current.clone(),
            None => {
                self.insert_clean(loaded.clone());
                loaded
            }
        }
    }

    pub(crate) fn dirty(&self) -> impl Iterator<Item = &Student> + '_ {
        self.entries
            .values()
            .filter(|tracked| tracked.current != tracked.committed)
            .map(|tracked| &tracked.current)
    }

    pub(crate) fn mark_committed(&mut self, id: StudentId) {
        if let Some(tracked) = self.entries.get_mut(&id) {
            tracked.committed = tracked.current.clone();
        }
    }

    pub(crate) fn remove(&mut self, id: StudentId) {
        self.entries.remove(&id);
    }

    /// Throws away every uncommitted field change.
    pub(crate) fn revert_all(&mut self) {
        for tracked in self.entries.values_mut() {
            tracked.current = tracked.committed.clone();
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
