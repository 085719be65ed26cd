mod test_support;

use serde_json::json;
use test_support::{request_ok, row_for, seed_school, spawn_sidecar, str_field, temp_dir};

fn student_entry<'a>(overview: &'a serde_json::Value, name: &str) -> &'a serde_json::Value {
    overview["students"]
        .as_array()
        .and_then(|s| {
            s.iter()
                .find(|e| e["student"]["fullName"].as_str() == Some(name))
        })
        .unwrap_or_else(|| panic!("no overview entry for {}", name))
}

/// Two subjects of one class can hold a lesson on the same day and a task
/// with the same date and title. Class-wide views must keep them apart.
#[test]
fn same_day_events_of_two_subjects_are_separate_columns() {
    let workspace = temp_dir("rekap-cross-subject");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let school = seed_school(&mut stdin, &mut reader, &workspace);
    let ahmad = school.student("Ahmad").to_string();

    for (subject, score) in [(&school.math, 90), (&school.science, 50)] {
        let task = str_field(
            &request_ok(
                &mut stdin,
                &mut reader,
                &format!("t-{}", subject),
                "tasks.create",
                json!({ "subjectId": subject, "title": "UTS", "taskDate": "2024-03-04" }),
            ),
            "taskId",
        );
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("g-{}", subject),
            "grades.record",
            json!({ "taskId": task, "studentId": ahmad, "score": score }),
        );
    }
    for (subject, status) in [(&school.math, "Alpha"), (&school.science, "Hadir")] {
        let journal = str_field(
            &request_ok(
                &mut stdin,
                &mut reader,
                &format!("j-{}", subject),
                "journals.create",
                json!({ "subjectId": subject, "lessonDate": "2024-03-05", "topic": "Bab 3" }),
            ),
            "journalId",
        );
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("a-{}", subject),
            "attendance.record",
            json!({ "journalId": journal, "studentId": ahmad, "status": status }),
        );
    }

    let grades = request_ok(
        &mut stdin,
        &mut reader,
        "gp",
        "grades.pivot",
        json!({ "classId": school.class_id }),
    );
    let labels: Vec<&str> = grades["columns"]
        .as_array()
        .expect("columns")
        .iter()
        .filter_map(|c| c.get("label").and_then(|v| v.as_str()))
        .collect();
    assert_eq!(labels, vec!["UTS", "UTS"]);
    let row = row_for(&grades, "Ahmad");
    assert_eq!(row["summary"]["count"], json!(2));
    assert_eq!(row["summary"]["average"], json!(70.0));

    let attendance = request_ok(
        &mut stdin,
        &mut reader,
        "ap",
        "attendance.pivot",
        json!({ "classId": school.class_id }),
    );
    assert_eq!(attendance["columns"].as_array().map(|c| c.len()), Some(2));

    let overview = request_ok(
        &mut stdin,
        &mut reader,
        "ov",
        "homeroom.overview",
        json!({ "teacherId": school.homeroom, "classId": school.class_id }),
    );
    let entry = student_entry(&overview, "Ahmad");
    assert_eq!(entry["attendance"]["total"], json!(2));
    assert_eq!(entry["attendance"]["absent"], json!(1));
    assert_eq!(entry["attendance"]["present"], json!(1));
    assert_eq!(entry["percentage"], json!("50%"));
    assert_eq!(entry["grades"]["count"], json!(2));
    assert_eq!(entry["average"], json!("70.00"));
}

#[test]
fn stored_row_with_unreadable_timestamp_is_reported_not_dropped_silently() {
    let workspace = temp_dir("rekap-bad-timestamp");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let school = seed_school(&mut stdin, &mut reader, &workspace);

    let journal = str_field(
        &request_ok(
            &mut stdin,
            &mut reader,
            "j1",
            "journals.create",
            json!({ "subjectId": school.math, "lessonDate": "2024-03-05", "topic": "Bab 3" }),
        ),
        "journalId",
    );
    let mut ids = Vec::new();
    for name in ["Ahmad", "Zulkifli"] {
        ids.push(str_field(
            &request_ok(
                &mut stdin,
                &mut reader,
                &format!("a-{}", name),
                "attendance.record",
                json!({ "journalId": journal, "studentId": school.student(name), "status": "Hadir" }),
            ),
            "recordId",
        ));
    }

    // A row written by some other tool with a timestamp the store cannot read.
    let conn = rusqlite::Connection::open(workspace.join("rekap.sqlite3")).expect("open db");
    conn.execute(
        "UPDATE attendance SET recorded_at = 'kemarin sore' WHERE id = ?",
        [&ids[1]],
    )
    .expect("corrupt row");
    drop(conn);

    let view = request_ok(
        &mut stdin,
        &mut reader,
        "ap",
        "attendance.pivot",
        json!({ "subjectId": school.math }),
    );
    assert_eq!(view["rows"].as_array().map(|r| r.len()), Some(1));
    assert_eq!(
        view["warnings"],
        json!([{
            "code": "badStoredDate",
            "recordId": ids[1],
            "field": "recorded_at",
            "raw": "kemarin sore"
        }])
    );
}
