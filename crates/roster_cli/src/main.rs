//! Student roster walkthrough.
//!
//! # Responsibility
//! - Run the canonical roster sequence against an in-memory store: create,
//!   list, order, filter, count, update, delete.
//! - Keep output deterministic apart from enrollment timestamps, which are
//!   never printed.

use chrono::{NaiveDate, NaiveDateTime};
use log::info;
use roster_core::{
    init_logging, Columns, LogConfig, Student, StudentColumn, StudentEntity, StudentStore,
    StoreConfig,
};
use std::error::Error;
use std::io::{self, Write};

const STORE_URL: &str = "sqlite:///:memory:";

fn main() -> Result<(), Box<dyn Error>> {
    if let Err(err) = init_logging(&LogConfig::default()) {
        eprintln!("logging disabled: {err}");
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    run(&mut out)
}

fn run(out: &mut impl Write) -> Result<(), Box<dyn Error>> {
    let mut store = StudentStore::open(&StoreConfig::from_url(STORE_URL)?)?;
    store.create_schema()?;
    let mut session = store.open_session()?;

    session.bulk_save([
        Student::new(
            "Albert Einstein",
            "albert.einstein@zurich.edu",
            6,
            date(1879, 3, 14)?,
        ),
        Student::new(
            "Alan Turing",
            "alan.turing@sherborne.edu",
            11,
            date(1912, 6, 23)?,
        ),
    ]);
    let summary = session.commit()?;
    writeln!(out, "Inserted {} students", summary.inserted)?;

    writeln!(out, "All students:")?;
    for student in session.query(StudentEntity).all(&mut session)? {
        writeln!(out, "  {student}")?;
    }

    writeln!(out, "Names:")?;
    for record in session
        .query(Columns::of([StudentColumn::Name]))
        .all(&mut session)?
    {
        writeln!(out, "  {record}")?;
    }

    writeln!(out, "Names ordered ascending:")?;
    for record in session
        .query(Columns::of([StudentColumn::Name]))
        .order_by(StudentColumn::Name.asc())
        .all(&mut session)?
    {
        writeln!(out, "  {record}")?;
    }

    writeln!(out, "Name and grade by grade, descending:")?;
    for record in session
        .query(Columns::of([StudentColumn::Name, StudentColumn::Grade]))
        .order_by(StudentColumn::Grade.desc())
        .all(&mut session)?
    {
        writeln!(out, "  {record}")?;
    }

    let top = session
        .query(Columns::of([StudentColumn::Name, StudentColumn::Birthday]))
        .order_by(StudentColumn::Grade.desc())
        .first(&mut session)?;
    match top {
        Some(record) => writeln!(out, "Top student: {record}")?,
        None => writeln!(out, "Top student: none")?,
    }

    let count = session.query(StudentEntity).count(&mut session)?;
    writeln!(out, "Student count: {count}")?;

    writeln!(out, "Named like Alan in grade 11:")?;
    for student in session
        .query(StudentEntity)
        .filter(StudentColumn::Name.like("%Alan%"))
        .filter(StudentColumn::Grade.eq(11))
        .all(&mut session)?
    {
        writeln!(out, "  {}", student.name)?;
    }

    let students = session.query(StudentEntity).all(&mut session)?;
    for student in &students {
        session.update(student, |s| s.grade += 1)?;
    }
    session.commit()?;

    writeln!(out, "After grade increment:")?;
    for record in session
        .query(Columns::of([StudentColumn::Name, StudentColumn::Grade]))
        .all(&mut session)?
    {
        writeln!(out, "  {record}")?;
    }

    let by_name = session
        .query(StudentEntity)
        .filter(StudentColumn::Name.eq("Albert Einstein"));
    if let Some(einstein) = by_name.first(&mut session)? {
        session.delete(&einstein)?;
        session.commit()?;
    }

    match by_name.first(&mut session)? {
        Some(student) => writeln!(out, "Still stored: {}", student.name)?,
        None => writeln!(out, "Albert Einstein is no longer stored")?,
    }

    session.close();
    info!("event=demo_complete module=cli status=ok");
    Ok(())
}

fn date(year: i32, month: u32, day: u32) -> Result<NaiveDateTime, Box<dyn Error>> {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .ok_or_else(|| format!("invalid date {year}-{month}-{day}").into())
}

#[cfg(test)]
mod tests {
    use super::run;

    #[test]
    fn walkthrough_prints_every_step() {
        let mut out = Vec::new();
        run(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("Inserted 2 students\n"));
        assert!(text.contains("  Student 1: Albert Einstein, Grade 6\n"));
        assert!(text.contains("  Student 2: Alan Turing, Grade 11\n"));
        assert!(text.contains(
            "Names ordered ascending:\n  (Alan Turing)\n  (Albert Einstein)\n"
        ));
        assert!(text.contains(
            "Name and grade by grade, descending:\n  (Alan Turing, 11)\n  (Albert Einstein, 6)\n"
        ));
        assert!(text.contains("Top student: (Alan Turing, 1912-06-23 00:00:00)\n"));
        assert!(text.contains("Student count: 2\n"));
        assert!(text.contains("Named like Alan in grade 11:\n  Alan Turing\n"));
        assert!(text.contains(
            "After grade increment:\n  (Albert Einstein, 7)\n  (Alan Turing, 12)\n"
        ));
        assert!(text.ends_with("Albert Einstein is no longer stored\n"));
    }
}
