mod common;

use std::collections::HashSet;
use std::sync::Arc;

use common::*;
use course_groups::error::AppError;
use course_groups::models::{GroupChange, NewCategoryRequest};
use course_groups::roble::dto::tables;
use course_groups::roble::{InMemoryRecordStore, WriteKind};
use course_groups::services::{CourseService, GroupService};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::json;

fn setup() -> (Arc<InMemoryRecordStore>, GroupService) {
    let store = Arc::new(InMemoryRecordStore::new());
    let service = GroupService::with_rng(store.clone(), StdRng::seed_from_u64(7));
    (store, service)
}

fn category_request(name: &str, group_size: i64, is_random: bool) -> NewCategoryRequest {
    NewCategoryRequest {
        name: name.to_string(),
        group_size,
        is_random,
    }
}

#[tokio::test]
async fn test_manual_category_creates_ceil_groups_without_members() {
    let (store, service) = setup();
    let session = session_for("teacher");

    let created = service
        .create_category_with_groups(&session, "c1", 10, &category_request("Lab Teams", 3, false))
        .await
        .expect("create category");

    assert_eq!(created.category.group_size, Some(3));
    assert!(!created.category.is_random);
    assert_eq!(created.groups.len(), 4);
    assert_eq!(created.groups.iter().map(|g| g.number).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
    assert!(created.groups.iter().all(|g| g.members == 0));

    let stored_category = &store.records(tables::CATEGORY)[0];
    assert_eq!(stored_category["Description"], json!("3"));
    assert_eq!(stored_category["IsRamdom"], json!(false));
    assert!(store.records(tables::MEMBERSHIP).is_empty());
}

#[tokio::test]
async fn test_group_count_follows_course_limit() {
    for (max_students, group_size, expected) in [(0, 4, 0), (1, 4, 1), (8, 4, 2), (9, 4, 3), (30, 1, 30)] {
        let (store, service) = setup();
        let created = service
            .create_category_with_groups(&session_for("t"), "c1", max_students, &category_request("Cat", group_size, false))
            .await
            .expect("create category");

        assert_eq!(created.groups.len(), expected, "max {} size {}", max_students, group_size);
        assert_eq!(store.records(tables::GROUP).len(), expected);
        assert_eq!(store.records(tables::CATEGORY).len(), 1);
    }
}

#[tokio::test]
async fn test_non_positive_group_size_is_rejected_before_writing() {
    let (store, service) = setup();

    for size in [0, -1] {
        let result = service
            .create_category_with_groups(&session_for("t"), "c1", 10, &category_request("Cat", size, true))
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
    assert!(store.writes().is_empty());
}

#[tokio::test]
async fn test_random_category_distributes_students_round_robin() {
    let (store, service) = setup();
    let students = ["s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9"];
    seed_enrollments(&store, "c1", &students);
    seed_enrollments(&store, "other-course", &["outsider"]);
    store.seed(
        tables::ENROLLMENT,
        vec![json!({"Estudiante_Id": "dropped", "Curso_Id": "c1", "Estado": "INA"})],
    );

    let created = service
        .create_category_with_groups(&session_for("t"), "c1", 10, &category_request("Random", 3, true))
        .await
        .expect("create category");

    assert_eq!(created.groups.len(), 4);
    let mut counts: Vec<u32> = created.groups.iter().map(|g| g.members).collect();
    counts.sort_unstable_by(|a, b| b.cmp(a));
    assert_eq!(counts, vec![3, 3, 2, 2]);

    let memberships = store.records(tables::MEMBERSHIP);
    assert_eq!(memberships.len(), students.len());
    let placed: HashSet<&str> = memberships
        .iter()
        .filter_map(|m| m["Estudiante_Id"].as_str())
        .collect();
    assert_eq!(placed, students.iter().copied().collect::<HashSet<_>>());

    for group in &created.groups {
        assert_eq!(members_of(&store, &group.id), group.members as u64);
        assert_eq!(memberships_in(&store, &group.id).len(), group.members as usize);
    }
}

#[tokio::test]
async fn test_random_category_balance_holds_for_any_size() {
    for (students, max_students, group_size) in [(7usize, 7u32, 2i64), (5, 20, 3), (12, 12, 5)] {
        let (store, service) = setup();
        let ids: Vec<String> = (0..students).map(|i| format!("s{}", i)).collect();
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        seed_enrollments(&store, "c1", &refs);

        let created = service
            .create_category_with_groups(&session_for("t"), "c1", max_students, &category_request("R", group_size, true))
            .await
            .expect("create category");

        let total: u32 = created.groups.iter().map(|g| g.members).sum();
        assert_eq!(total as usize, students);
        let ceiling = students.div_ceil(created.groups.len()) as u32;
        assert!(created.groups.iter().all(|g| g.members <= ceiling + 1));
    }
}

#[tokio::test]
async fn test_random_category_without_students_leaves_groups_empty() {
    let (store, service) = setup();

    let created = service
        .create_category_with_groups(&session_for("t"), "c1", 6, &category_request("R", 2, true))
        .await
        .expect("create category");

    assert_eq!(created.groups.len(), 3);
    assert!(store.records(tables::MEMBERSHIP).is_empty());
    assert!(!store.writes().iter().any(|w| w.kind == WriteKind::Update));
}

#[tokio::test]
async fn test_failed_counter_write_unwinds_category_creation() {
    let (store, service) = setup();
    seed_enrollments(&store, "c1", &["s0", "s1", "s2", "s3"]);
    store.fail_on(WriteKind::Update, tables::GROUP, 1);

    let result = service
        .create_category_with_groups(&session_for("t"), "c1", 4, &category_request("R", 2, true))
        .await;

    assert!(matches!(result, Err(AppError::Remote(_))));
    assert!(store.records(tables::CATEGORY).is_empty());
    assert!(store.records(tables::GROUP).is_empty());
    assert!(store.records(tables::MEMBERSHIP).is_empty());
    assert_eq!(store.records(tables::ENROLLMENT).len(), 4);
}

#[tokio::test]
async fn test_change_group_moves_membership_and_counters() {
    let (store, service) = setup();
    seed_group(&store, "g1", "cat1", 1, 2);
    seed_group(&store, "g2", "cat1", 2, 1);
    seed_membership(&store, "s1", "g1");

    let change = service
        .change_group_manual(&session_for("s1"), "s1", "cat1", "g2", 3)
        .await
        .expect("change group");

    match change {
        GroupChange::Moved { from, to } => {
            assert_eq!(from.as_deref(), Some("g1"));
            assert_eq!(to.id, "g2");
            assert_eq!(to.members, 2);
        }
        other => panic!("expected a move, got {:?}", other),
    }
    assert_eq!(members_of(&store, "g1"), 1);
    assert_eq!(members_of(&store, "g2"), 2);
    assert!(memberships_in(&store, "g1").is_empty());
    assert_eq!(memberships_in(&store, "g2").len(), 1);
}

#[tokio::test]
async fn test_change_group_is_idempotent() {
    let (store, service) = setup();
    seed_group(&store, "g1", "cat1", 1, 0);
    seed_group(&store, "g2", "cat1", 2, 0);

    let session = session_for("s1");
    service
        .change_group_manual(&session, "s1", "cat1", "g2", 3)
        .await
        .expect("first change");
    store.clear_writes();

    let second = service
        .change_group_manual(&session, "s1", "cat1", "g2", 3)
        .await
        .expect("second change");

    assert_eq!(second, GroupChange::Unchanged { group_id: "g2".to_string() });
    assert!(store.writes().is_empty());
    assert_eq!(members_of(&store, "g2"), 1);
}

#[tokio::test]
async fn test_staying_in_a_full_group_is_not_a_capacity_error() {
    let (store, service) = setup();
    seed_group(&store, "g1", "cat1", 1, 2);
    seed_membership(&store, "s1", "g1");

    let change = service
        .change_group_manual(&session_for("s1"), "s1", "cat1", "g1", 2)
        .await
        .expect("no-op");
    assert!(matches!(change, GroupChange::Unchanged { .. }));
}

#[tokio::test]
async fn test_full_target_group_fails_without_mutation() {
    let (store, service) = setup();
    seed_group(&store, "g1", "cat1", 1, 3);
    seed_group(&store, "g2", "cat1", 2, 1);
    seed_membership(&store, "s1", "g2");

    let result = service
        .change_group_manual(&session_for("s1"), "s1", "cat1", "g1", 3)
        .await;

    match result {
        Err(AppError::Capacity { group_id, members, capacity }) => {
            assert_eq!(group_id, "g1");
            assert_eq!(members, 3);
            assert_eq!(capacity, 3);
        }
        other => panic!("expected capacity error, got {:?}", other),
    }
    assert!(store.writes().is_empty());
    assert_eq!(members_of(&store, "g1"), 3);
    assert_eq!(members_of(&store, "g2"), 1);
}

#[tokio::test]
async fn test_change_group_rejects_foreign_group_and_bad_size() {
    let (store, service) = setup();
    seed_group(&store, "g1", "cat1", 1, 0);
    seed_group(&store, "elsewhere", "cat2", 1, 0);

    let foreign = service
        .change_group_manual(&session_for("s1"), "s1", "cat1", "elsewhere", 3)
        .await;
    assert!(matches!(foreign, Err(AppError::NotFound(_))));

    let bad_size = service
        .change_group_manual(&session_for("s1"), "s1", "cat1", "g1", 0)
        .await;
    assert!(matches!(bad_size, Err(AppError::Validation(_))));
    assert!(store.writes().is_empty());
}

#[tokio::test]
async fn test_failed_change_restores_previous_membership() {
    let (store, service) = setup();
    seed_group(&store, "g1", "cat1", 1, 2);
    seed_group(&store, "g2", "cat1", 2, 1);
    seed_membership(&store, "s1", "g1");
    store.fail_on(WriteKind::Insert, tables::MEMBERSHIP, 0);

    let result = service
        .change_group_manual(&session_for("s1"), "s1", "cat1", "g2", 3)
        .await;

    assert!(matches!(result, Err(AppError::Remote(_))));
    assert_eq!(members_of(&store, "g1"), 2);
    assert_eq!(members_of(&store, "g2"), 1);
    assert_eq!(memberships_in(&store, "g1").len(), 1);
    assert!(memberships_in(&store, "g2").is_empty());
}

#[tokio::test]
async fn test_failed_change_without_compensation_leaves_partial_state() {
    let store = Arc::new(InMemoryRecordStore::new());
    let service = GroupService::with_rng(store.clone(), StdRng::seed_from_u64(1)).compensate_on_failure(false);
    seed_group(&store, "g1", "cat1", 1, 2);
    seed_group(&store, "g2", "cat1", 2, 1);
    seed_membership(&store, "s1", "g1");
    store.fail_on(WriteKind::Insert, tables::MEMBERSHIP, 0);

    let result = service
        .change_group_manual(&session_for("s1"), "s1", "cat1", "g2", 3)
        .await;

    assert!(result.is_err());
    assert_eq!(members_of(&store, "g1"), 1);
    assert!(memberships_in(&store, "g1").is_empty());
    assert!(memberships_in(&store, "g2").is_empty());
}

#[tokio::test]
async fn test_leave_then_join_restores_counter() {
    let (store, service) = setup();
    seed_group(&store, "g1", "cat1", 1, 2);
    seed_membership(&store, "s1", "g1");
    let session = session_for("s1");

    service.leave_group(&session, "s1", "g1").await.expect("leave");
    assert_eq!(members_of(&store, "g1"), 1);
    assert!(memberships_in(&store, "g1").is_empty());

    service.join_group(&session, "s1", "g1", None).await.expect("join");
    assert_eq!(members_of(&store, "g1"), 2);
    assert_eq!(memberships_in(&store, "g1").len(), 1);
}

#[tokio::test]
async fn test_leave_never_goes_below_zero() {
    let (store, service) = setup();
    seed_group(&store, "g1", "cat1", 1, 0);

    service.leave_group(&session_for("s1"), "s1", "g1").await.expect("leave");
    assert_eq!(members_of(&store, "g1"), 0);
}

#[tokio::test]
async fn test_failed_leave_by_non_member_creates_no_membership() {
    let (store, service) = setup();
    seed_group(&store, "g1", "cat1", 1, 2);
    store.fail_on(WriteKind::Update, tables::GROUP, 0);

    let result = service.leave_group(&session_for("s1"), "s1", "g1").await;

    assert!(matches!(result, Err(AppError::Remote(_))));
    assert!(memberships_in(&store, "g1").is_empty());
    assert_eq!(members_of(&store, "g1"), 2);
}

#[tokio::test]
async fn test_failed_leave_restores_membership_and_counter() {
    let (store, service) = setup();
    seed_group(&store, "g1", "cat1", 1, 2);
    seed_membership(&store, "s1", "g1");
    seed_membership(&store, "s2", "g1");
    store.fail_on(WriteKind::Update, tables::GROUP, 0);

    let result = service.leave_group(&session_for("s1"), "s1", "g1").await;

    assert!(result.is_err());
    assert_eq!(members_of(&store, "g1"), 2);
    let rows = memberships_in(&store, "g1");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows.iter().filter(|m| m["Estudiante_Id"] == json!("s1")).count(), 1);
}

#[tokio::test]
async fn test_failed_leave_restores_every_removed_row() {
    let (store, service) = setup();
    seed_group(&store, "g1", "cat1", 1, 2);
    seed_membership(&store, "s1", "g1");
    seed_membership(&store, "s1", "g1");
    store.fail_on(WriteKind::Update, tables::GROUP, 0);

    let result = service.leave_group(&session_for("s1"), "s1", "g1").await;

    assert!(result.is_err());
    assert_eq!(memberships_in(&store, "g1").len(), 2);
    assert_eq!(members_of(&store, "g1"), 2);
}

#[tokio::test]
async fn test_failed_join_removes_inserted_membership() {
    let (store, service) = setup();
    seed_group(&store, "g1", "cat1", 1, 1);
    seed_membership(&store, "s2", "g1");
    store.fail_on(WriteKind::Update, tables::GROUP, 0);

    let result = service.join_group(&session_for("s1"), "s1", "g1", None).await;

    assert!(matches!(result, Err(AppError::Remote(_))));
    assert_eq!(members_of(&store, "g1"), 1);
    let rows = memberships_in(&store, "g1");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["Estudiante_Id"], json!("s2"));
}

#[tokio::test]
async fn test_join_saturates_clamped_counter() {
    let (store, service) = setup();
    store.seed(
        tables::GROUP,
        vec![json!({"_id": "g1", "categorie_Id": "cat1", "number": 1, "members": "1e10", "IsRamdonGroup": false})],
    );

    service
        .join_group(&session_for("s1"), "s1", "g1", None)
        .await
        .expect("join");

    assert_eq!(members_of(&store, "g1"), u32::MAX as u64);
    assert_eq!(memberships_in(&store, "g1").len(), 1);
}

#[tokio::test]
async fn test_join_group_leaves_previous_group() {
    let (store, service) = setup();
    seed_group(&store, "g1", "cat1", 1, 1);
    seed_group(&store, "g2", "cat1", 2, 0);
    seed_membership(&store, "s1", "g1");

    service
        .join_group(&session_for("s1"), "s1", "g2", Some("g1"))
        .await
        .expect("join");

    assert_eq!(members_of(&store, "g1"), 0);
    assert_eq!(members_of(&store, "g2"), 1);
    let current = service
        .student_group_in_category(&session_for("s1"), "s1", "cat1")
        .await
        .expect("lookup")
        .expect("student has a group");
    assert_eq!(current.id, "g2");
}

#[tokio::test]
async fn test_student_without_membership_has_no_group() {
    let (store, service) = setup();
    seed_group(&store, "g1", "cat1", 1, 0);

    let current = service
        .student_group_in_category(&session_for("s1"), "s1", "cat1")
        .await
        .expect("lookup");
    assert!(current.is_none());
}

#[tokio::test]
async fn test_join_course_seats_student_in_open_random_group() {
    let store = Arc::new(InMemoryRecordStore::new());
    let groups = GroupService::with_rng(store.clone(), StdRng::seed_from_u64(3));
    let courses = CourseService::with_group_service(store.clone(), groups);
    seed_course(&store, "c1", "teacher", 4);
    seed_category(&store, "random", "c1", "2", true);
    seed_group(&store, "full", "random", 1, 2);
    seed_group(&store, "open", "random", 2, 0);
    seed_category(&store, "manual", "c1", "2", false);
    seed_group(&store, "manual-g", "manual", 1, 0);
    seed_category(&store, "broken", "c1", "lots", true);
    seed_group(&store, "broken-g", "broken", 1, 0);

    let enrollment = courses
        .join_course(&session_for("s1"), "s1", "c1")
        .await
        .expect("join course");

    assert!(enrollment.is_active());
    let stored = &store.records(tables::ENROLLMENT)[0];
    assert_eq!(stored["Estado"], json!("ACT"));
    assert_eq!(stored["Curso_Id"], json!("c1"));
    assert!(stored["Fecha_Ingreso"].as_str().is_some_and(|d| d.len() == 10));

    assert_eq!(members_of(&store, "open"), 1);
    assert_eq!(members_of(&store, "full"), 2);
    assert_eq!(members_of(&store, "manual-g"), 0);
    assert_eq!(members_of(&store, "broken-g"), 0);
    assert_eq!(store.records(tables::MEMBERSHIP).len(), 1);
}

#[tokio::test]
async fn test_join_course_survives_failed_group_assignment() {
    let store = Arc::new(InMemoryRecordStore::new());
    let courses = CourseService::new(store.clone());
    seed_course(&store, "c1", "teacher", 4);
    seed_category(&store, "random", "c1", "2", true);
    seed_group(&store, "g1", "random", 1, 0);
    store.fail_on(WriteKind::Insert, tables::MEMBERSHIP, 0);

    let enrollment = courses.join_course(&session_for("s1"), "s1", "c1").await;

    assert!(enrollment.is_ok());
    assert_eq!(store.records(tables::ENROLLMENT).len(), 1);
    assert_eq!(members_of(&store, "g1"), 0);
    assert!(store.records(tables::MEMBERSHIP).is_empty());
}

#[tokio::test]
async fn test_student_courses_skip_missing_courses() {
    let store = Arc::new(InMemoryRecordStore::new());
    let courses = CourseService::new(store.clone());
    seed_course(&store, "c1", "teacher", 4);
    seed_enrollments(&store, "c1", &["s1"]);
    seed_enrollments(&store, "ghost", &["s1"]);

    let found = courses.student_courses(&session_for("s1"), "s1").await.expect("courses");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, "c1");
    assert_eq!(found[0].max_students, 4);

    let teaching = courses.teacher_courses(&session_for("teacher"), "teacher").await.expect("courses");
    assert_eq!(teaching.len(), 1);
}

#[tokio::test]
async fn test_create_category_for_unknown_course_is_not_found() {
    let store = Arc::new(InMemoryRecordStore::new());
    let courses = CourseService::new(store.clone());

    let result = courses
        .create_category(&session_for("t"), "missing", &category_request("Cat", 3, false))
        .await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
    assert!(store.writes().is_empty());
}
