use chrono::{NaiveDate, NaiveDateTime};
use roster_core::{Student, StudentStore, StoreConfig};
use serde_json::json;

#[test]
fn transient_student_serializes_with_null_id() {
    let student = Student::new(
        "Albert Einstein",
        "albert.einstein@zurich.edu",
        6,
        birthday(1879, 3, 14),
    );

    let value = serde_json::to_value(&student).unwrap();
    assert_eq!(
        value,
        json!({
            "id": null,
            "name": "Albert Einstein",
            "email": "albert.einstein@zurich.edu",
            "grade": 6,
            "birthday": "1879-03-14T00:00:00",
            "enrolled_date": null
        })
    );

    let decoded: Student = serde_json::from_value(value).unwrap();
    assert_eq!(decoded, student);
}

#[test]
fn display_reads_id_name_and_grade() {
    let transient = Student::new(
        "Alan Turing",
        "alan.turing@sherborne.edu",
        11,
        birthday(1912, 6, 23),
    );
    assert_eq!(transient.to_string(), "Student (transient): Alan Turing, Grade 11");
    assert!(!transient.is_persistent());

    let persistent = transient.with_id(2);
    assert_eq!(persistent.to_string(), "Student 2: Alan Turing, Grade 11");
    assert!(persistent.is_persistent());
}

#[test]
fn committed_student_carries_assigned_id_and_enrollment() {
    let mut store = StudentStore::open(&StoreConfig::in_memory()).unwrap();
    store.create_schema().unwrap();
    let mut session = store.open_session().unwrap();

    let key = session.add(Student::new(
        "Grace Hopper",
        "grace@yale.edu",
        12,
        birthday(1906, 12, 9),
    ));
    session.commit().unwrap();

    let id = session.resolve(key).unwrap();
    let stored = session.get(id).unwrap().unwrap();
    assert_eq!(stored.id, Some(id));
    assert!(stored.enrolled_date.is_some());
    assert_eq!(stored.birthday, birthday(1906, 12, 9));
}

fn birthday(year: i32, month: u32, day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}
