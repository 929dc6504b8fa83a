//! Unit of work over the student store.
//!
//! # Responsibility
//! - Stage inserts, field updates and deletes until an explicit `commit`.
//! - Track persistent students by primary key (identity map) so in-session
//!   mutations are detected and flushed.
//! - Flush everything staged as one atomic transaction.
//!
//! # Invariants
//! - Nothing staged is visible to the store before `commit` succeeds.
//! - Constraint violations surface from `commit`, never from staging.
//! - A failed `commit` leaves the store untouched and rolls the session
//!   back: staged rows and deletes are discarded, tracked students revert
//!   to their last committed state.
//! - Bulk-saved students are never tracked.
//! - A session is bound to one store borrow; it cannot outlive it.

mod identity;

use crate::config::EnrolledDatePolicy;
use crate::db::schema::ConstraintViolation;
use crate::model::student::{Student, StudentId};
use crate::query::{Query, Selection};
use crate::repo::student_repo::{
    RepoError, RepoResult, SqliteStudentRepository, StudentRepository,
};
use chrono::{Local, NaiveDateTime};
use identity::IdentityMap;
use log::{debug, error, info, warn};
use rusqlite::Connection;
use std::collections::{BTreeSet, HashMap};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

pub type SessionResult<T> = Result<T, SessionError>;

/// Error returned by session operations.
#[derive(Debug)]
pub enum SessionError {
    /// A uniqueness, range or primary-key rule rejected the commit.
    ConstraintViolation(ConstraintViolation),
    /// No stored student has this id (or it is already staged for deletion).
    NotFound(StudentId),
    /// The student has never been added to or loaded by a session.
    NotTracked,
    /// The pending key was never issued or its insert was discarded.
    UnknownPending(PendingKey),
    /// A tracked row disappeared from the store before commit.
    Stale(StudentId),
    /// A mutator tried to change the primary key; the change was reverted.
    IdentityChanged { id: Option<StudentId> },
    Repo(RepoError),
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConstraintViolation(violation) => write!(f, "{violation}"),
            Self::NotFound(id) => write!(f, "student not found: {id}"),
            Self::NotTracked => write!(f, "student is not tracked by this session"),
            Self::UnknownPending(key) => write!(f, "unknown pending student {key}"),
            Self::Stale(id) => write!(f, "student {id} no longer exists in the store"),
            Self::IdentityChanged { id: Some(id) } => {
                write!(f, "primary key of student {id} cannot be changed")
            }
            Self::IdentityChanged { id: None } => {
                write!(f, "primary key of a pending student cannot be changed")
            }
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::ConstraintViolation(violation) => Some(violation),
            Self::Repo(err) => Some(err),
            Self::NotFound(_)
            | Self::NotTracked
            | Self::UnknownPending(_)
            | Self::Stale(_)
            | Self::IdentityChanged { .. } => None,
        }
    }
}

impl From<RepoError> for SessionError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Constraint(violation) => Self::ConstraintViolation(violation),
            RepoError::NotFound(id) => Self::NotFound(id),
            other => Self::Repo(other),
        }
    }
}

/// Handle for a student staged with `Session::add`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PendingKey(u64);

impl Display for PendingKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "pending#{}", self.0)
    }
}

/// Anything that can name a student inside a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKey {
    Pending(PendingKey),
    Persistent(StudentId),
    /// A student value without an id that was never staged.
    Transient,
}

impl From<PendingKey> for EntityKey {
    fn from(key: PendingKey) -> Self {
        Self::Pending(key)
    }
}

impl From<StudentId> for EntityKey {
    fn from(id: StudentId) -> Self {
        Self::Persistent(id)
    }
}

impl From<&Student> for EntityKey {
    fn from(student: &Student) -> Self {
        match student.id {
            Some(id) => Self::Persistent(id),
            None => Self::Transient,
        }
    }
}

/// Row counts written by a successful commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommitSummary {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
}

/// `enrolled_date` default after the store resolved its policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EnrolledDefault {
    Fixed(NaiveDateTime),
    PerInsert,
}

impl EnrolledDefault {
    pub(crate) fn from_policy(policy: EnrolledDatePolicy) -> Self {
        match policy {
            EnrolledDatePolicy::FixedAtOpen => Self::Fixed(Local::now().naive_local()),
            EnrolledDatePolicy::PerInsert => Self::PerInsert,
        }
    }

    fn value(self) -> NaiveDateTime {
        match self {
            Self::Fixed(at) => at,
            Self::PerInsert => Local::now().naive_local(),
        }
    }
}

#[derive(Debug)]
struct PendingInsert {
    /// `None` for bulk-saved rows.
    key: Option<PendingKey>,
    student: Student,
}

#[derive(Debug, Default)]
struct Flushed {
    inserted: Vec<(Option<PendingKey>, Student)>,
    updated: Vec<StudentId>,
    deleted: Vec<StudentId>,
}

/// Scoped unit of work bound to a `StudentStore`.
///
/// Dropping a session without committing discards whatever is staged.
#[derive(Debug)]
pub struct Session<'store> {
    conn: &'store mut Connection,
    enrolled_default: EnrolledDefault,
    next_pending: u64,
    pending: Vec<PendingInsert>,
    identity: IdentityMap,
    deleted: BTreeSet<StudentId>,
    resolved: HashMap<PendingKey, StudentId>,
    closed: bool,
}

impl<'store> Session<'store> {
    pub(crate) fn begin(
        conn: &'store mut Connection,
        enrolled_default: EnrolledDefault,
    ) -> SessionResult<Self> {
        SqliteStudentRepository::try_new(conn)?;
        debug!("event=session_open module=session status=ok");
        Ok(Self {
            conn,
            enrolled_default,
            next_pending: 0,
            pending: Vec::new(),
            identity: IdentityMap::default(),
            deleted: BTreeSet::new(),
            resolved: HashMap::new(),
            closed: false,
        })
    }

    /// Starts a lazy query; nothing runs until `all`/`first`/`count`.
    pub fn query<S: Selection>(&self, selection: S) -> Query<S> {
        Query::new(selection)
    }

    /// Stages one student for insertion and tracks it.
    pub fn add(&mut self, student: Student) -> PendingKey {
        let key = PendingKey(self.next_pending);
        self.next_pending += 1;
        self.pending.push(PendingInsert {
            key: Some(key),
            student,
        });
        key
    }

    /// Stages several students; each is tracked.
    pub fn add_all(&mut self, students: impl IntoIterator<Item = Student>) -> Vec<PendingKey> {
        students
            .into_iter()
            .map(|student| self.add(student))
            .collect()
    }

    /// Stages students for insertion without identity tracking.
    ///
    /// Returns how many rows were staged. Bulk rows cannot be updated or
    /// deleted through this session until they are loaded by a query.
    pub fn bulk_save(&mut self, students: impl IntoIterator<Item = Student>) -> usize {
        let before = self.pending.len();
        self.pending.extend(
            students
                .into_iter()
                .map(|student| PendingInsert { key: None, student }),
        );
        self.pending.len() - before
    }

    /// Returns the id assigned to a tracked insert once it is committed.
    pub fn resolve(&self, key: PendingKey) -> Option<StudentId> {
        self.resolved.get(&key).copied()
    }

    /// Looks a student up by primary key, preferring the tracked copy.
    ///
    /// A student staged for deletion is reported as absent.
    pub fn get(&mut self, id: StudentId) -> SessionResult<Option<Student>> {
        if self.deleted.contains(&id) {
            return Ok(None);
        }
        if let Some(student) = self.identity.get(id) {
            return Ok(Some(student.clone()));
        }
        let loaded = SqliteStudentRepository::new_unchecked(self.conn).get_student(id)?;
        Ok(loaded.map(|student| self.identity.attach(student)))
    }

    /// Mutates a tracked student in memory; durable after `commit`.
    ///
    /// A persistent id that the session has not seen yet is loaded first.
    pub fn update(
        &mut self,
        key: impl Into<EntityKey>,
        mutator: impl FnOnce(&mut Student),
    ) -> SessionResult<()> {
        match key.into() {
            EntityKey::Transient => Err(SessionError::NotTracked),
            EntityKey::Pending(pending) => match self.resolve(pending) {
                Some(id) => self.update_persistent(id, mutator),
                None => {
                    let entry = self
                        .pending
                        .iter_mut()
                        .find(|entry| entry.key == Some(pending))
                        .ok_or(SessionError::UnknownPending(pending))?;
                    apply_mutator(&mut entry.student, mutator)
                }
            },
            EntityKey::Persistent(id) => self.update_persistent(id, mutator),
        }
    }

    /// Marks a student for removal; durable after `commit`.
    ///
    /// Deleting a not-yet-committed insert simply unstages it.
    pub fn delete(&mut self, key: impl Into<EntityKey>) -> SessionResult<()> {
        match key.into() {
            EntityKey::Transient => Err(SessionError::NotTracked),
            EntityKey::Pending(pending) => match self.resolve(pending) {
                Some(id) => self.delete_persistent(id),
                None => {
                    let position = self
                        .pending
                        .iter()
                        .position(|entry| entry.key == Some(pending))
                        .ok_or(SessionError::UnknownPending(pending))?;
                    self.pending.remove(position);
                    Ok(())
                }
            },
            EntityKey::Persistent(id) => self.delete_persistent(id),
        }
    }

    /// Returns whether anything is staged or modified.
    pub fn has_changes(&self) -> bool {
        self.staged_change_count() > 0
    }

    /// Flushes staged inserts, updates and deletes atomically.
    ///
    /// # Errors
    /// - `ConstraintViolation` when any row breaks a store constraint.
    /// - `Stale` when a tracked row vanished from the store.
    ///
    /// On error nothing is written and the session is rolled back.
    pub fn commit(&mut self) -> SessionResult<CommitSummary> {
        let started_at = Instant::now();

        let outcome = {
            let tx = self.conn.transaction().map_err(RepoError::from)?;
            match flush(
                &tx,
                &self.pending,
                &self.identity,
                &self.deleted,
                self.enrolled_default,
            ) {
                Ok(flushed) => tx.commit().map(|()| flushed).map_err(RepoError::from),
                Err(err) => Err(err),
            }
        };

        let flushed = match outcome {
            Ok(flushed) => flushed,
            Err(err) => {
                let err = commit_error(err);
                match &err {
                    SessionError::ConstraintViolation(violation) => warn!(
                        "event=session_commit module=session status=error error_code=constraint_violation constraint={} duration_ms={}",
                        violation.constraint.as_deref().unwrap_or("unknown"),
                        started_at.elapsed().as_millis()
                    ),
                    other => error!(
                        "event=session_commit module=session status=error error_code=flush_failed duration_ms={} error={}",
                        started_at.elapsed().as_millis(),
                        other
                    ),
                }
                self.rollback();
                return Err(err);
            }
        };

        let summary = CommitSummary {
            inserted: flushed.inserted.len(),
            updated: flushed.updated.len(),
            deleted: flushed.deleted.len(),
        };

        self.pending.clear();
        for (key, student) in flushed.inserted {
            if let (Some(key), Some(id)) = (key, student.id) {
                self.resolved.insert(key, id);
                self.identity.insert_clean(student);
            }
        }
        for id in flushed.updated {
            self.identity.mark_committed(id);
        }
        for id in flushed.deleted {
            self.identity.remove(id);
        }
        self.deleted.clear();

        info!(
            "event=session_commit module=session status=ok inserted={} updated={} deleted={} duration_ms={}",
            summary.inserted,
            summary.updated,
            summary.deleted,
            started_at.elapsed().as_millis()
        );
        Ok(summary)
    }

    /// Discards staged inserts and deletes and reverts tracked students.
    pub fn rollback(&mut self) {
        let discarded = self.staged_change_count();
        self.pending.clear();
        self.deleted.clear();
        self.identity.revert_all();
        info!("event=session_rollback module=session status=ok discarded={discarded}");
    }

    /// Ends the unit of work, discarding anything uncommitted.
    ///
    /// Returns how many staged changes were discarded.
    pub fn close(mut self) -> usize {
        let discarded = self.staged_change_count();
        self.closed = true;
        info!("event=session_close module=session status=ok discarded={discarded}");
        discarded
    }

    pub(crate) fn connection(&self) -> &Connection {
        &*self.conn
    }

    pub(crate) fn attach_loaded(&mut self, student: Student) -> Student {
        self.identity.attach(student)
    }

    fn update_persistent(
        &mut self,
        id: StudentId,
        mutator: impl FnOnce(&mut Student),
    ) -> SessionResult<()> {
        if self.deleted.contains(&id) {
            return Err(SessionError::NotFound(id));
        }
        self.ensure_tracked(id)?;
        let student = self
            .identity
            .get_mut(id)
            .ok_or(SessionError::NotFound(id))?;
        apply_mutator(student, mutator)
    }

    fn delete_persistent(&mut self, id: StudentId) -> SessionResult<()> {
        self.ensure_tracked(id)?;
        self.deleted.insert(id);
        Ok(())
    }

    fn ensure_tracked(&mut self, id: StudentId) -> SessionResult<()> {
        if self.identity.contains(id) {
            return Ok(());
        }
        let loaded = SqliteStudentRepository::new_unchecked(self.conn)
            .get_student(id)?
            .ok_or(SessionError::NotFound(id))?;
        self.identity.insert_clean(loaded);
        Ok(())
    }

    fn staged_change_count(&self) -> usize {
        self.pending.len() + self.deleted.len() + self.identity.dirty().count()
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let discarded = self.staged_change_count();
        if discarded > 0 {
            warn!(
                "event=session_close module=session status=discarded staged_changes={discarded}"
            );
        } else {
            debug!("event=session_close module=session status=ok");
        }
    }
}

fn apply_mutator(student: &mut Student, mutator: impl FnOnce(&mut Student)) -> SessionResult<()> {
    let id = student.id;
    mutator(student);
    if student.id != id {
        student.id = id;
        return Err(SessionError::IdentityChanged { id });
    }
    Ok(())
}

fn flush(
    conn: &Connection,
    pending: &[PendingInsert],
    identity: &IdentityMap,
    deleted: &BTreeSet<StudentId>,
    enrolled_default: EnrolledDefault,
) -> RepoResult<Flushed> {
    let repo = SqliteStudentRepository::new_unchecked(conn);
    let mut flushed = Flushed::default();

    for entry in pending {
        let mut student = entry.student.clone();
        if student.enrolled_date.is_none() {
            student.enrolled_date = Some(enrolled_default.value());
        }
        let id = repo.insert_student(&student)?;
        student.id = Some(id);
        flushed.inserted.push((entry.key, student));
    }

    for student in identity.dirty() {
        let Some(id) = student.id else { continue };
        if deleted.contains(&id) {
            continue;
        }
        repo.update_student(student)?;
        flushed.updated.push(id);
    }

    for id in deleted {
        repo.delete_student(*id)?;
        flushed.deleted.push(*id);
    }

    Ok(flushed)
}

fn commit_error(err: RepoError) -> SessionError {
    match err {
        RepoError::NotFound(id) => SessionError::Stale(id),
        other => SessionError::from(other),
    }
}
