use chrono::{NaiveDate, NaiveDateTime};
use roster_core::{
    CommitSummary, SessionError, Student, StudentColumn, StudentEntity, StudentStore, StoreConfig,
    StoreTarget,
};
use std::collections::HashSet;

#[test]
fn committed_students_are_each_returned_once() {
    let mut store = ready_store();
    let mut session = store.open_session().unwrap();

    let keys = session.add_all([einstein(), turing()]);
    let summary = session.commit().unwrap();
    assert_eq!(
        summary,
        CommitSummary {
            inserted: 2,
            updated: 0,
            deleted: 0
        }
    );

    let students = session.query(StudentEntity).all(&mut session).unwrap();
    assert_eq!(students.len(), 2);
    let ids: HashSet<_> = students.iter().map(|s| s.id.unwrap()).collect();
    assert_eq!(ids.len(), 2);
    for key in keys {
        assert!(ids.contains(&session.resolve(key).unwrap()));
    }
    let names: HashSet<_> = students.iter().map(|s| s.name.as_str()).collect();
    assert!(names.contains("Albert Einstein"));
    assert!(names.contains("Alan Turing"));
}

#[test]
fn staged_inserts_are_invisible_until_commit() {
    let mut store = ready_store();
    let mut session = store.open_session().unwrap();

    session.add(einstein());
    assert!(session.has_changes());
    assert_eq!(session.query(StudentEntity).count(&mut session).unwrap(), 0);

    session.commit().unwrap();
    assert!(!session.has_changes());
    assert_eq!(session.query(StudentEntity).count(&mut session).unwrap(), 1);
}

#[test]
fn bulk_save_inserts_without_tracking() {
    let mut store = ready_store();
    let mut session = store.open_session().unwrap();

    assert_eq!(session.bulk_save([einstein(), turing()]), 2);
    let summary = session.commit().unwrap();
    assert_eq!(summary.inserted, 2);

    let loaded = session
        .query(StudentEntity)
        .filter(StudentColumn::Name.eq("Alan Turing"))
        .first(&mut session)
        .unwrap()
        .unwrap();
    session.update(&loaded, |s| s.grade = 12).unwrap();
    assert_eq!(session.commit().unwrap().updated, 1);

    let reloaded = session.get(loaded.id.unwrap()).unwrap().unwrap();
    assert_eq!(reloaded.grade, 12);
}

#[test]
fn pending_student_can_be_mutated_before_commit() {
    let mut store = ready_store();
    let mut session = store.open_session().unwrap();

    let key = session.add(einstein());
    session.update(key, |s| s.grade = 9).unwrap();
    session.commit().unwrap();

    let id = session.resolve(key).unwrap();
    assert_eq!(session.get(id).unwrap().unwrap().grade, 9);

    // The key keeps naming the row after commit.
    session.update(key, |s| s.grade = 10).unwrap();
    assert_eq!(session.commit().unwrap().updated, 1);
    assert_eq!(session.get(id).unwrap().unwrap().grade, 10);
}

#[test]
fn update_by_id_loads_untracked_row() {
    let mut store = ready_store();
    let id = {
        let mut session = store.open_session().unwrap();
        let key = session.add(turing());
        session.commit().unwrap();
        session.resolve(key).unwrap()
    };

    let mut session = store.open_session().unwrap();
    session.update(id, |s| s.name = "A. M. Turing".to_string()).unwrap();
    assert!(session.has_changes());
    session.commit().unwrap();

    let stored = session
        .query(StudentEntity)
        .filter(StudentColumn::Id.eq(id))
        .first(&mut session)
        .unwrap()
        .unwrap();
    assert_eq!(stored.name, "A. M. Turing");
}

#[test]
fn update_rejects_unknown_transient_and_id_changes() {
    let mut store = ready_store();
    let mut session = store.open_session().unwrap();

    assert!(matches!(
        session.update(999_i64, |s| s.grade = 3),
        Err(SessionError::NotFound(999))
    ));
    assert!(matches!(
        session.update(&einstein(), |s| s.grade = 3),
        Err(SessionError::NotTracked)
    ));

    let key = session.add(einstein());
    session.commit().unwrap();
    let id = session.resolve(key).unwrap();

    let err = session
        .update(id, |s| {
            s.id = Some(id + 100);
            s.grade = 8;
        })
        .unwrap_err();
    assert!(matches!(err, SessionError::IdentityChanged { id: Some(found) } if found == id));
    assert_eq!(session.get(id).unwrap().unwrap().id, Some(id));
}

#[test]
fn queries_return_in_session_version_of_tracked_rows() {
    let mut store = ready_store();
    let mut session = store.open_session().unwrap();
    session.add(einstein());
    session.commit().unwrap();

    let stored = session.query(StudentEntity).first(&mut session).unwrap().unwrap();
    session.update(&stored, |s| s.grade = 7).unwrap();

    let seen = session.query(StudentEntity).first(&mut session).unwrap().unwrap();
    assert_eq!(seen.grade, 7);

    // Filters run against stored state until the change is committed.
    let by_stored_grade = session
        .query(StudentEntity)
        .filter(StudentColumn::Grade.eq(6))
        .count(&mut session)
        .unwrap();
    assert_eq!(by_stored_grade, 1);
}

#[test]
fn deleted_student_is_absent_after_commit() {
    let mut store = ready_store();
    let mut session = store.open_session().unwrap();
    session.add_all([einstein(), turing()]);
    session.commit().unwrap();

    let query = session
        .query(StudentEntity)
        .filter(StudentColumn::Name.eq("Albert Einstein"));
    let albert = query.first(&mut session).unwrap().unwrap();
    session.delete(&albert).unwrap();

    // Still stored until commit.
    assert!(query.first(&mut session).unwrap().is_some());

    let summary = session.commit().unwrap();
    assert_eq!(summary.deleted, 1);
    assert!(query.first(&mut session).unwrap().is_none());
    assert!(session.get(albert.id.unwrap()).unwrap().is_none());
    assert_eq!(session.query(StudentEntity).count(&mut session).unwrap(), 1);
}

#[test]
fn updating_a_student_staged_for_deletion_is_not_found() {
    let mut store = ready_store();
    let mut session = store.open_session().unwrap();
    let key = session.add(einstein());
    session.commit().unwrap();
    let id = session.resolve(key).unwrap();

    session.delete(id).unwrap();
    assert!(matches!(
        session.update(id, |s| s.grade = 2),
        Err(SessionError::NotFound(found)) if found == id
    ));
}

#[test]
fn get_reports_student_staged_for_deletion_as_absent() {
    let mut store = ready_store();
    let mut session = store.open_session().unwrap();
    let key = session.add(einstein());
    session.commit().unwrap();
    let id = session.resolve(key).unwrap();
    assert!(session.get(id).unwrap().is_some());

    session.delete(id).unwrap();
    assert!(session.get(id).unwrap().is_none());

    // Rolling back the delete makes the student visible again.
    session.rollback();
    assert_eq!(session.get(id).unwrap().unwrap().name, "Albert Einstein");
}

#[test]
fn deleting_pending_insert_unstages_it() {
    let mut store = ready_store();
    let mut session = store.open_session().unwrap();

    let key = session.add(einstein());
    session.delete(key).unwrap();
    assert!(!session.has_changes());
    assert_eq!(session.commit().unwrap(), CommitSummary::default());

    assert!(matches!(
        session.delete(key),
        Err(SessionError::UnknownPending(found)) if found == key
    ));
}

#[test]
fn rollback_discards_staged_work_and_reverts_tracked_rows() {
    let mut store = ready_store();
    let mut session = store.open_session().unwrap();
    session.add(einstein());
    session.commit().unwrap();

    let albert = session.query(StudentEntity).first(&mut session).unwrap().unwrap();
    session.update(&albert, |s| s.grade = 12).unwrap();
    session.add(turing());
    assert!(session.has_changes());

    session.rollback();
    assert!(!session.has_changes());
    assert_eq!(session.get(albert.id.unwrap()).unwrap().unwrap().grade, 6);
    assert_eq!(session.commit().unwrap(), CommitSummary::default());
}

#[test]
fn closing_or_dropping_a_session_discards_uncommitted_changes() {
    let mut store = ready_store();

    let session_discarded = {
        let mut session = store.open_session().unwrap();
        session.add(einstein());
        session.add(turing());
        session.close()
    };
    assert_eq!(session_discarded, 2);

    {
        let mut session = store.open_session().unwrap();
        session.add(einstein());
    }

    let mut session = store.open_session().unwrap();
    assert_eq!(session.query(StudentEntity).count(&mut session).unwrap(), 0);
}

#[test]
fn independent_sessions_commit_in_isolation() {
    let mut store = ready_store();
    {
        let mut first = store.open_session().unwrap();
        first.add(einstein());
        first.commit().unwrap();
    }
    {
        let mut second = store.open_session().unwrap();
        second.add(turing());
        second.rollback();
        second.close();
    }

    let mut session = store.open_session().unwrap();
    let names = session
        .query(StudentEntity)
        .all(&mut session)
        .unwrap()
        .into_iter()
        .map(|s| s.name)
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["Albert Einstein".to_string()]);
}

#[test]
fn commit_reports_rows_removed_behind_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig {
        target: StoreTarget::File(dir.path().join("shared.db")),
        ..StoreConfig::in_memory()
    };
    let mut store = StudentStore::open(&config).unwrap();
    store.create_schema().unwrap();
    let mut other = StudentStore::open(&config).unwrap();

    let mut session = store.open_session().unwrap();
    let key = session.add(einstein());
    session.commit().unwrap();
    let id = session.resolve(key).unwrap();
    session.update(id, |s| s.grade = 7).unwrap();

    {
        let mut remover = other.open_session().unwrap();
        remover.delete(id).unwrap();
        remover.commit().unwrap();
    }

    assert!(matches!(
        session.commit(),
        Err(SessionError::Stale(found)) if found == id
    ));
    assert!(!session.has_changes());
}

fn ready_store() -> StudentStore {
    let mut store = StudentStore::open(&StoreConfig::in_memory()).unwrap();
    store.create_schema().unwrap();
    store
}

fn einstein() -> Student {
    Student::new(
        "Albert Einstein",
        "albert.einstein@zurich.edu",
        6,
        birthday(1879, 3, 14),
    )
}

fn turing() -> Student {
    Student::new(
        "Alan Turing",
        "alan.turing@sherborne.edu",
        11,
        birthday(1912, 6, 23),
    )
}

fn birthday(year: i32, month: u32, day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}
