#![allow(dead_code)]

use course_groups::models::{AuthUser, Session};
use course_groups::roble::InMemoryRecordStore;
use course_groups::roble::dto::tables;
use serde_json::{Value, json};

pub fn session_for(user_id: &str) -> Session {
    Session {
        access_token: format!("token-{}", user_id),
        refresh_token: format!("refresh-{}", user_id),
        user: AuthUser {
            id: user_id.to_string(),
            email: format!("{}@uninorte.edu.co", user_id),
            name: user_id.to_string(),
        },
    }
}

pub fn seed_course(store: &InMemoryRecordStore, id: &str, teacher_id: &str, max_students: u32) {
    store.seed(
        tables::COURSE,
        vec![json!({"_id": id, "Titulo": format!("Course {}", id), "Description": "", "Max_students": max_students, "teacher_id": teacher_id})],
    );
}

pub fn seed_enrollments(store: &InMemoryRecordStore, course_id: &str, students: &[&str]) {
    let rows = students
        .iter()
        .map(|s| json!({"Estudiante_Id": s, "Curso_Id": course_id, "Estado": "ACT", "Fecha_Ingreso": "2025-02-01"}))
        .collect();
    store.seed(tables::ENROLLMENT, rows);
}

pub fn seed_category(store: &InMemoryRecordStore, id: &str, course_id: &str, group_size: &str, is_random: bool) {
    store.seed(
        tables::CATEGORY,
        vec![json!({"_id": id, "Name": format!("Category {}", id), "Description": group_size, "IsRamdom": is_random, "Curso_id": course_id})],
    );
}

pub fn seed_group(store: &InMemoryRecordStore, id: &str, category_id: &str, number: u32, members: u32) {
    store.seed(
        tables::GROUP,
        vec![json!({"_id": id, "categorie_Id": category_id, "number": number, "members": members, "IsRamdonGroup": false})],
    );
}

pub fn seed_membership(store: &InMemoryRecordStore, student_id: &str, group_id: &str) {
    store.seed(
        tables::MEMBERSHIP,
        vec![json!({"Estudiante_Id": student_id, "Grupo_Id": group_id, "Estado": "ACT"})],
    );
}

pub fn members_of(store: &InMemoryRecordStore, group_id: &str) -> u64 {
    store
        .find(tables::GROUP, group_id)
        .and_then(|g| g["members"].as_u64())
        .expect("group with numeric members")
}

pub fn memberships_in(store: &InMemoryRecordStore, group_id: &str) -> Vec<Value> {
    store
        .records(tables::MEMBERSHIP)
        .into_iter()
        .filter(|m| m["Grupo_Id"] == json!(group_id))
        .collect()
}
