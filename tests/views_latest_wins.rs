mod test_support;

use serde_json::json;
use test_support::{request_err, request_ok, row_names, seed_school, spawn_sidecar, str_field, temp_dir};

#[test]
fn older_refresh_is_dropped_and_current_view_stays() {
    let workspace = temp_dir("rekap-views");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let school = seed_school(&mut stdin, &mut reader, &workspace);

    let task = str_field(
        &request_ok(
            &mut stdin,
            &mut reader,
            "t1",
            "tasks.create",
            json!({ "subjectId": school.math, "title": "Kuis", "taskDate": "2024-01-12" }),
        ),
        "taskId",
    );
    for (i, (name, score)) in [("Zulkifli", 64), ("Ahmad", 91)].iter().enumerate() {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("g{}", i),
            "grades.record",
            json!({ "taskId": task, "studentId": school.student(name), "score": score }),
        );
    }

    let code = request_err(
        &mut stdin,
        &mut reader,
        "nv",
        "views.current",
        json!({ "viewId": "grid" }),
    );
    assert_eq!(code, "not_found");

    // The user switched to the math filter (seq 2) before the "science"
    // request (seq 1) came back.
    let applied = request_ok(
        &mut stdin,
        &mut reader,
        "r2",
        "views.refresh",
        json!({
            "viewId": "grid",
            "seq": 2,
            "kind": "grades",
            "criteria": { "subjectId": school.math, "classId": school.class_id }
        }),
    );
    assert_eq!(applied["status"], json!("applied"));
    assert_eq!(row_names(&applied["view"]), vec!["Ahmad", "Zulkifli"]);

    let stale = request_ok(
        &mut stdin,
        &mut reader,
        "r1",
        "views.refresh",
        json!({
            "viewId": "grid",
            "seq": 1,
            "kind": "grades",
            "criteria": { "subjectId": school.science }
        }),
    );
    assert_eq!(stale["status"], json!("stale"));
    assert_eq!(stale["latestSeq"], json!(2));
    assert_eq!(stale["view"], applied["view"]);

    let current = request_ok(
        &mut stdin,
        &mut reader,
        "c1",
        "views.current",
        json!({ "viewId": "grid" }),
    );
    assert_eq!(current["appliedSeq"], json!(2));
    assert_eq!(current["issuedSeq"], json!(2));
    assert_eq!(current["view"], applied["view"]);

    let export = request_ok(
        &mut stdin,
        &mut reader,
        "e1",
        "views.export",
        json!({ "viewId": "grid" }),
    );
    assert_eq!(
        export["header"],
        json!(["No", "Name", "Kuis", "Average", "Letter"])
    );
    assert_eq!(
        export["rows"],
        json!([
            ["1", "Ahmad", "91", "91.00", "A"],
            ["2", "Zulkifli", "64", "64.00", "D"]
        ])
    );

    // Views are independent of each other.
    let other = request_ok(
        &mut stdin,
        &mut reader,
        "r3",
        "views.refresh",
        json!({ "viewId": "side", "kind": "attendance", "criteria": {} }),
    );
    assert_eq!(other["status"], json!("applied"));
    assert_eq!(other["seq"], json!(1));
    assert_eq!(other["view"]["empty"], json!(true));

    let code = request_err(
        &mut stdin,
        &mut reader,
        "bad",
        "views.refresh",
        json!({ "viewId": "grid", "kind": "seating", "criteria": {} }),
    );
    assert_eq!(code, "bad_params");
}
