//! Read side of the record store: projects attendance and grade rows into
//! [`EventRecord`]s and loads the students they point at.

use crate::db::{DATE_FORMAT, TIMESTAMP_FORMAT};
use crate::pivot::{
    AttendanceStatus, EventKey, EventRecord, EventValue, FilterCriteria, IntegrityIssue,
    PivotKind, RecordScope, Student,
};
use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row};
use std::collections::{HashMap, HashSet};

/// WHERE clause shared by both record queries; subjects are aliased `sub`
/// and `date_col` holds the event date.
fn scope_clause(criteria: &FilterCriteria, date_col: &str) -> (String, Vec<Value>) {
    let mut sql = String::from(" WHERE 1 = 1");
    let mut args: Vec<Value> = Vec::new();
    if let Some(owner) = criteria.owner_id.as_deref() {
        sql.push_str(" AND sub.teacher_id = ?");
        args.push(Value::Text(owner.to_string()));
    }
    if let Some(subject_id) = criteria.subject.as_id() {
        sql.push_str(" AND sub.id = ?");
        args.push(Value::Text(subject_id.to_string()));
    }
    if let Some(class_id) = criteria.class.as_id() {
        sql.push_str(" AND sub.class_id = ?");
        args.push(Value::Text(class_id.to_string()));
    }
    if let Some(from) = criteria.from {
        sql.push_str(&format!(" AND {} >= ?", date_col));
        args.push(Value::Text(from.format(DATE_FORMAT).to_string()));
    }
    if let Some(to) = criteria.to {
        sql.push_str(&format!(" AND {} <= ?", date_col));
        args.push(Value::Text(to.format(DATE_FORMAT).to_string()));
    }
    (sql, args)
}

/// Records fetched for one pivot, plus the stored rows that could not be
/// projected because a date column does not parse.
#[derive(Debug, Default)]
pub struct Snapshot {
    pub records: Vec<EventRecord>,
    pub issues: Vec<IntegrityIssue>,
}

impl Snapshot {
    fn from_raw(raw: Vec<RawRecord>) -> Self {
        let mut snapshot = Self::default();
        for row in raw {
            match row.into_record() {
                Ok(record) => snapshot.records.push(record),
                Err(issue) => {
                    tracing::warn!(record_id = %issue.record_id(), "integrity: {issue}");
                    snapshot.issues.push(issue);
                }
            }
        }
        snapshot
    }
}

struct RawRecord {
    seq: i64,
    id: String,
    student_id: String,
    subject_id: String,
    class_id: String,
    owner_id: String,
    /// Journal id for attendance, task id for grades.
    event_id: String,
    event_date: String,
    recorded_at: String,
    title: Option<String>,
    value: EventValue,
    note: Option<String>,
}

impl RawRecord {
    fn bad_date(&self, field: &'static str, raw: &str) -> IntegrityIssue {
        IntegrityIssue::BadStoredDate {
            record_id: self.id.clone(),
            field,
            raw: raw.to_string(),
        }
    }

    fn into_record(self) -> Result<EventRecord, IntegrityIssue> {
        let date_field = if self.title.is_some() { "task_date" } else { "lesson_date" };
        let date = NaiveDate::parse_from_str(&self.event_date, DATE_FORMAT)
            .map_err(|_| self.bad_date(date_field, &self.event_date))?;
        let recorded_at = NaiveDateTime::parse_from_str(&self.recorded_at, TIMESTAMP_FORMAT)
            .map_err(|_| self.bad_date("recorded_at", &self.recorded_at))?;
        let event_key = match self.title {
            Some(title) => EventKey::task(self.event_id, date, title),
            None => EventKey::lesson(self.event_id, date),
        };
        Ok(EventRecord {
            record_id: self.id,
            seq: self.seq,
            student_id: self.student_id,
            scope: RecordScope {
                subject_id: self.subject_id,
                class_id: self.class_id,
                owner_id: self.owner_id,
            },
            event_key,
            event_date: recorded_at,
            value: self.value,
            note: self.note,
        })
    }
}

fn attendance_row(r: &Row<'_>) -> rusqlite::Result<RawRecord> {
    let status: String = r.get(3)?;
    let value = match AttendanceStatus::parse(&status) {
        Some(s) => EventValue::Attendance(s),
        None => EventValue::Unrecognized(status),
    };
    Ok(RawRecord {
        seq: r.get(0)?,
        id: r.get(1)?,
        student_id: r.get(2)?,
        value,
        note: r.get(4)?,
        recorded_at: r.get(5)?,
        event_date: r.get(6)?,
        subject_id: r.get(7)?,
        class_id: r.get(8)?,
        owner_id: r.get(9)?,
        event_id: r.get(10)?,
        title: None,
    })
}

fn grade_row(r: &Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok(RawRecord {
        seq: r.get(0)?,
        id: r.get(1)?,
        student_id: r.get(2)?,
        value: EventValue::Grade(r.get(3)?),
        note: r.get(4)?,
        recorded_at: r.get(5)?,
        event_date: r.get(6)?,
        subject_id: r.get(7)?,
        class_id: r.get(8)?,
        owner_id: r.get(9)?,
        event_id: r.get(10)?,
        title: Some(r.get(11)?),
    })
}

/// Selects attendance entries matching subject, class, owner and date range.
pub fn fetch_attendance(conn: &Connection, criteria: &FilterCriteria) -> anyhow::Result<Snapshot> {
    let (where_sql, args) = scope_clause(criteria, "j.lesson_date");
    let sql = format!(
        "SELECT a.rowid, a.id, a.student_id, a.status, a.note, a.recorded_at,
                j.lesson_date, sub.id, sub.class_id, sub.teacher_id, j.id
         FROM attendance a
         JOIN journals j ON j.id = a.journal_id
         JOIN subjects sub ON sub.id = j.subject_id{}
         ORDER BY a.rowid",
        where_sql
    );
    let mut stmt = conn.prepare(&sql)?;
    let raw = stmt
        .query_map(params_from_iter(args), attendance_row)?
        .collect::<Result<Vec<_>, _>>()
        .context("attendance query")?;
    Ok(Snapshot::from_raw(raw))
}

/// Selects grade entries matching subject, class, owner and task date range.
pub fn fetch_grades(conn: &Connection, criteria: &FilterCriteria) -> anyhow::Result<Snapshot> {
    let (where_sql, args) = scope_clause(criteria, "t.task_date");
    let sql = format!(
        "SELECT g.rowid, g.id, g.student_id, g.score, g.note, g.recorded_at,
                t.task_date, sub.id, sub.class_id, sub.teacher_id, t.id, t.title
         FROM grades g
         JOIN tasks t ON t.id = g.task_id
         JOIN subjects sub ON sub.id = t.subject_id{}
         ORDER BY g.rowid",
        where_sql
    );
    let mut stmt = conn.prepare(&sql)?;
    let raw = stmt
        .query_map(params_from_iter(args), grade_row)?
        .collect::<Result<Vec<_>, _>>()
        .context("grades query")?;
    Ok(Snapshot::from_raw(raw))
}

pub fn fetch_records(
    conn: &Connection,
    kind: PivotKind,
    criteria: &FilterCriteria,
) -> anyhow::Result<Snapshot> {
    match kind {
        PivotKind::Attendance => fetch_attendance(conn, criteria),
        PivotKind::Grades => fetch_grades(conn, criteria),
    }
}

fn student_row(r: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        student_id: r.get(0)?,
        full_name: r.get(1)?,
        student_number: r.get(2)?,
        class_id: r.get(3)?,
        photo_url: r.get(4)?,
    })
}

/// Loads the students referenced by `records`, keyed by id.
pub fn fetch_students_for(
    conn: &Connection,
    records: &[EventRecord],
) -> anyhow::Result<HashMap<String, Student>> {
    let ids: HashSet<&str> = records.iter().map(|r| r.student_id.as_str()).collect();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!(
        "SELECT id, full_name, student_no, class_id, photo_url
         FROM students
         WHERE id IN ({})",
        placeholders
    );
    let args: Vec<Value> = ids.into_iter().map(|id| Value::Text(id.to_string())).collect();
    let mut stmt = conn.prepare(&sql)?;
    let students = stmt
        .query_map(params_from_iter(args), student_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(students
        .into_iter()
        .map(|s| (s.student_id.clone(), s))
        .collect())
}

pub fn class_roster(conn: &Connection, class_id: &str) -> anyhow::Result<Vec<Student>> {
    let mut stmt = conn.prepare(
        "SELECT id, full_name, student_no, class_id, photo_url
         FROM students
         WHERE class_id = ?
         ORDER BY full_name",
    )?;
    let students = stmt
        .query_map([class_id], student_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(students)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pivot::Scope;

    #[test]
    fn scope_clause_binds_only_restricted_dimensions() {
        let criteria = FilterCriteria {
            subject: Scope::Only("math".into()),
            class: Scope::Any,
            owner_id: Some("t1".into()),
            from: NaiveDate::from_ymd_opt(2024, 1, 1),
            to: None,
        };
        let (sql, args) = scope_clause(&criteria, "j.lesson_date");
        assert_eq!(
            sql,
            " WHERE 1 = 1 AND sub.teacher_id = ? AND sub.id = ? AND j.lesson_date >= ?"
        );
        assert_eq!(
            args,
            vec![
                Value::Text("t1".into()),
                Value::Text("math".into()),
                Value::Text("2024-01-01".into()),
            ]
        );
    }

    #[test]
    fn empty_criteria_bind_nothing() {
        let (sql, args) = scope_clause(&FilterCriteria::default(), "t.task_date");
        assert_eq!(sql, " WHERE 1 = 1");
        assert!(args.is_empty());
    }

    fn seeded_workspace(prefix: &str) -> (std::path::PathBuf, Connection) {
        let dir = std::env::temp_dir().join(format!(
            "{}-{}",
            prefix,
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        let conn = crate::db::open_db(&dir).expect("open");
        conn.execute_batch(
            "INSERT INTO teachers(id, full_name) VALUES ('t1', 'Bu Ani'), ('t2', 'Pak Budi');
             INSERT INTO classes(id, name, homeroom_teacher_id) VALUES ('c1', '7A', 't1');
             INSERT INTO students(id, class_id, full_name, student_no) VALUES ('s1', 'c1', 'Ahmad', '001');
             INSERT INTO subjects(id, name, class_id, teacher_id) VALUES
                 ('math', 'Matematika', 'c1', 't1'), ('sci', 'IPA', 'c1', 't2');
             INSERT INTO journals(id, subject_id, lesson_date, topic) VALUES
                 ('j-math', 'math', '2024-03-05', 'Bab 1'), ('j-sci', 'sci', '2024-03-05', 'Bab 1');
             INSERT INTO tasks(id, subject_id, title, task_date) VALUES
                 ('t-math', 'math', 'UTS', '2024-03-04'), ('t-sci', 'sci', 'UTS', '2024-03-04');",
        )
        .expect("seed");
        (dir, conn)
    }

    #[test]
    fn same_day_events_of_different_subjects_keep_their_own_keys() {
        let (dir, conn) = seeded_workspace("rekap-store-keys");
        conn.execute_batch(
            "INSERT INTO attendance(id, journal_id, student_id, status, recorded_at) VALUES
                 ('a1', 'j-math', 's1', 'Alpha', '2024-03-05 08:00:00'),
                 ('a2', 'j-sci', 's1', 'Hadir', '2024-03-05 10:00:00');
             INSERT INTO grades(id, task_id, student_id, score, recorded_at) VALUES
                 ('g1', 't-math', 's1', 90, '2024-03-04 09:00:00'),
                 ('g2', 't-sci', 's1', 50, '2024-03-04 11:00:00');",
        )
        .expect("records");

        let attendance = fetch_records(&conn, PivotKind::Attendance, &FilterCriteria::default())
            .expect("attendance");
        let keys: Vec<&str> = attendance
            .records
            .iter()
            .map(|r| r.event_key.event_id.as_str())
            .collect();
        assert_eq!(keys, vec!["j-math", "j-sci"]);

        let grades =
            fetch_records(&conn, PivotKind::Grades, &FilterCriteria::default()).expect("grades");
        assert_eq!(grades.records.len(), 2);
        assert_ne!(grades.records[0].event_key, grades.records[1].event_key);
        assert_eq!(grades.records[0].event_key.title.as_deref(), Some("UTS"));
        assert!(grades.issues.is_empty());

        drop(conn);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn unparseable_stored_dates_become_integrity_issues() {
        let (dir, conn) = seeded_workspace("rekap-store-dates");
        conn.execute_batch(
            "INSERT INTO journals(id, subject_id, lesson_date, topic) VALUES
                 ('j-bad', 'math', '05/03/2024', 'Bab 2');
             INSERT INTO attendance(id, journal_id, student_id, status, recorded_at) VALUES
                 ('ok', 'j-math', 's1', 'Hadir', '2024-03-05 08:00:00'),
                 ('stamp', 'j-math', 's1', 'Izin', 'kemarin'),
                 ('lesson', 'j-bad', 's1', 'Hadir', '2024-03-05 08:00:00');",
        )
        .expect("records");

        let snapshot = fetch_records(&conn, PivotKind::Attendance, &FilterCriteria::default())
            .expect("attendance");
        assert_eq!(snapshot.records.len(), 1);
        assert_eq!(snapshot.records[0].record_id, "ok");
        assert_eq!(
            snapshot.issues,
            vec![
                IntegrityIssue::BadStoredDate {
                    record_id: "stamp".into(),
                    field: "recorded_at",
                    raw: "kemarin".into(),
                },
                IntegrityIssue::BadStoredDate {
                    record_id: "lesson".into(),
                    field: "lesson_date",
                    raw: "05/03/2024".into(),
                },
            ]
        );

        drop(conn);
        let _ = std::fs::remove_dir_all(dir);
    }
}
