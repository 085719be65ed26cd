use super::{EventColumn, EventKey, EventRecord, PivotKind};
use std::collections::HashSet;

const LESSON_LABEL_FORMAT: &str = "%d/%m/%Y";

fn label_for(kind: PivotKind, key: &EventKey) -> String {
    match (kind, key.title.as_deref()) {
        (PivotKind::Grades, Some(title)) => title.to_string(),
        _ => key.date.format(LESSON_LABEL_FORMAT).to_string(),
    }
}

/// Distinct event columns in chronological order. The first record seen for
/// a key supplies its label; every record under one key describes the same
/// event, so later ones add nothing.
pub fn resolve_columns(kind: PivotKind, records: &[EventRecord]) -> Vec<EventColumn> {
    let mut seen: HashSet<&EventKey> = HashSet::new();
    let mut columns: Vec<EventColumn> = Vec::new();
    for record in records {
        if !seen.insert(&record.event_key) {
            continue;
        }
        columns.push(EventColumn {
            event_key: record.event_key.clone(),
            label: label_for(kind, &record.event_key),
            sort_date: record.event_key.date,
        });
    }
    columns.sort_by(|a, b| {
        a.sort_date
            .cmp(&b.sort_date)
            .then_with(|| a.event_key.cmp(&b.event_key))
    });
    columns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pivot::{AttendanceStatus, EventValue, RecordScope};
    use chrono::NaiveDate;
    use std::collections::BTreeSet;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("date")
    }

    fn rec(id: &str, student: &str, key: EventKey) -> EventRecord {
        EventRecord {
            record_id: id.to_string(),
            seq: 0,
            student_id: student.to_string(),
            scope: RecordScope {
                subject_id: "math".to_string(),
                class_id: "7a".to_string(),
                owner_id: "t1".to_string(),
            },
            event_date: key.date.and_hms_opt(7, 30, 0).expect("time"),
            event_key: key,
            value: EventValue::Attendance(AttendanceStatus::Hadir),
            note: None,
        }
    }

    #[test]
    fn lesson_columns_sort_by_date_not_label() {
        // "02/02/2024" sorts before "15/01/2024" as text.
        let records = vec![
            rec("r1", "a", EventKey::lesson("j1", date(2024, 2, 2))),
            rec("r2", "a", EventKey::lesson("j2", date(2024, 1, 15))),
            rec("r3", "b", EventKey::lesson("j3", date(2023, 12, 20))),
        ];
        let labels: Vec<String> = resolve_columns(PivotKind::Attendance, &records)
            .into_iter()
            .map(|c| c.label)
            .collect();
        assert_eq!(labels, vec!["20/12/2023", "15/01/2024", "02/02/2024"]);
    }

    #[test]
    fn columns_are_exactly_the_union_of_keys() {
        let records = vec![
            rec("r1", "a", EventKey::lesson("j3", date(2024, 1, 3))),
            rec("r2", "b", EventKey::lesson("j3", date(2024, 1, 3))),
            rec("r3", "b", EventKey::lesson("j4", date(2024, 1, 4))),
            rec("r4", "c", EventKey::lesson("j9", date(2024, 1, 9))),
            rec("r5", "a", EventKey::lesson("j4", date(2024, 1, 4))),
        ];
        let columns = resolve_columns(PivotKind::Attendance, &records);
        let from_columns: BTreeSet<EventKey> =
            columns.iter().map(|c| c.event_key.clone()).collect();
        let from_records: BTreeSet<EventKey> =
            records.iter().map(|r| r.event_key.clone()).collect();
        assert_eq!(columns.len(), 3);
        assert_eq!(from_columns, from_records);
    }

    #[test]
    fn lessons_of_two_subjects_on_one_day_are_two_columns() {
        let records = vec![
            rec("r1", "a", EventKey::lesson("j-sci", date(2024, 3, 5))),
            rec("r2", "a", EventKey::lesson("j-math", date(2024, 3, 5))),
        ];
        let columns = resolve_columns(PivotKind::Attendance, &records);
        let ids: Vec<&str> = columns.iter().map(|c| c.event_key.event_id.as_str()).collect();
        assert_eq!(ids, vec!["j-math", "j-sci"]);
        assert!(columns.iter().all(|c| c.label == "05/03/2024"));
    }

    #[test]
    fn tasks_with_same_title_on_different_dates_stay_apart() {
        let records = vec![
            rec("r1", "a", EventKey::task("t1", date(2024, 3, 1), "Kuis")),
            rec("r2", "a", EventKey::task("t2", date(2024, 2, 1), "Kuis")),
            rec("r3", "a", EventKey::task("t3", date(2024, 2, 1), "Kuis|Bab 2")),
        ];
        let columns = resolve_columns(PivotKind::Grades, &records);
        let keys: Vec<(NaiveDate, &str)> = columns
            .iter()
            .map(|c| (c.sort_date, c.label.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![
                (date(2024, 2, 1), "Kuis"),
                (date(2024, 2, 1), "Kuis|Bab 2"),
                (date(2024, 3, 1), "Kuis"),
            ]
        );
    }

    #[test]
    fn no_records_no_columns() {
        assert!(resolve_columns(PivotKind::Grades, &[]).is_empty());
    }
}
