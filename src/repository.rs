use chrono::NaiveDate;
use serde_json::{Value, json};

use crate::error::AppError;
use crate::models::{ACTIVE_STATUS, Category, Course, Enrollment, Group, Membership, Session};
use crate::roble::dto::{
    self, CategoryRecord, CourseRecord, EnrollmentRecord, GroupRecord, MembershipRecord, fields, tables,
};
use crate::roble::{Filter, RecordStore};

pub async fn fetch_teacher_courses(
    store: &dyn RecordStore,
    session: &Session,
    teacher_id: &str,
) -> Result<Vec<Course>, AppError> {
    let filter = Filter::new().eq(fields::COURSE_TEACHER, teacher_id);
    let rows = store.read(session, tables::COURSE, &filter).await?;
    dto::decode_all::<CourseRecord>(tables::COURSE, rows)?
        .into_iter()
        .map(Course::try_from)
        .collect()
}

pub async fn find_course_by_id(
    store: &dyn RecordStore,
    session: &Session,
    course_id: &str,
) -> Result<Option<Course>, AppError> {
    let filter = Filter::new().eq(fields::ID, course_id);
    let rows = store.read(session, tables::COURSE, &filter).await?;
    match rows.into_iter().next() {
        Some(row) => Ok(Some(Course::try_from(dto::decode::<CourseRecord>(tables::COURSE, row)?)?)),
        None => Ok(None),
    }
}

pub async fn insert_course(
    store: &dyn RecordStore,
    session: &Session,
    record: &CourseRecord,
) -> Result<Option<Course>, AppError> {
    let inserted = store
        .insert(session, tables::COURSE, vec![dto::encode(record)?])
        .await?;
    match inserted.into_iter().next() {
        Some(row) => Ok(Some(Course::try_from(dto::decode::<CourseRecord>(tables::COURSE, row)?)?)),
        None => Ok(None),
    }
}

pub async fn insert_enrollment(
    store: &dyn RecordStore,
    session: &Session,
    student_id: &str,
    course_id: &str,
    today: NaiveDate,
) -> Result<Enrollment, AppError> {
    let enrollment = Enrollment::active(student_id, course_id, today);
    let record = EnrollmentRecord::from(&enrollment);
    store
        .insert(session, tables::ENROLLMENT, vec![dto::encode(&record)?])
        .await?;
    Ok(enrollment)
}

pub async fn fetch_active_enrollments_for_student(
    store: &dyn RecordStore,
    session: &Session,
    student_id: &str,
) -> Result<Vec<Enrollment>, AppError> {
    let filter = Filter::new()
        .eq(fields::ENROLLMENT_STUDENT, student_id)
        .eq(fields::STATUS, ACTIVE_STATUS);
    let rows = store.read(session, tables::ENROLLMENT, &filter).await?;
    Ok(dto::decode_all::<EnrollmentRecord>(tables::ENROLLMENT, rows)?
        .into_iter()
        .map(Enrollment::from)
        .collect())
}

pub async fn fetch_active_enrollments_for_course(
    store: &dyn RecordStore,
    session: &Session,
    course_id: &str,
) -> Result<Vec<Enrollment>, AppError> {
    let filter = Filter::new()
        .eq(fields::ENROLLMENT_COURSE, course_id)
        .eq(fields::STATUS, ACTIVE_STATUS);
    let rows = store.read(session, tables::ENROLLMENT, &filter).await?;
    Ok(dto::decode_all::<EnrollmentRecord>(tables::ENROLLMENT, rows)?
        .into_iter()
        .map(Enrollment::from)
        .collect())
}

pub async fn fetch_categories(
    store: &dyn RecordStore,
    session: &Session,
    course_id: &str,
    random_only: bool,
) -> Result<Vec<Category>, AppError> {
    let mut filter = Filter::new().eq(fields::CATEGORY_COURSE, course_id);
    if random_only {
        filter = filter.eq(fields::CATEGORY_IS_RANDOM, true);
    }
    let rows = store.read(session, tables::CATEGORY, &filter).await?;
    dto::decode_all::<CategoryRecord>(tables::CATEGORY, rows)?
        .into_iter()
        .map(Category::try_from)
        .collect()
}

pub async fn insert_category(
    store: &dyn RecordStore,
    session: &Session,
    record: &CategoryRecord,
) -> Result<Category, AppError> {
    let inserted = store
        .insert(session, tables::CATEGORY, vec![dto::encode(record)?])
        .await?;
    let row = inserted
        .into_iter()
        .next()
        .ok_or_else(|| AppError::Remote("Category insert did not return id".to_string()))?;
    Category::try_from(dto::decode::<CategoryRecord>(tables::CATEGORY, row)?)
}

/// Inserts the groups in one request. The result is ordered by group number.
pub async fn insert_groups(
    store: &dyn RecordStore,
    session: &Session,
    records: &[GroupRecord],
) -> Result<Vec<Group>, AppError> {
    let values = records.iter().map(dto::encode).collect::<Result<Vec<_>, _>>()?;
    let inserted = store.insert(session, tables::GROUP, values).await?;
    let mut groups = dto::decode_all::<GroupRecord>(tables::GROUP, inserted)?
        .into_iter()
        .map(Group::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    groups.sort_by_key(|g| g.number);
    Ok(groups)
}

pub async fn fetch_groups_by_category(
    store: &dyn RecordStore,
    session: &Session,
    category_id: &str,
) -> Result<Vec<Group>, AppError> {
    let filter = Filter::new().eq(fields::GROUP_CATEGORY, category_id);
    let rows = store.read(session, tables::GROUP, &filter).await?;
    let mut groups = dto::decode_all::<GroupRecord>(tables::GROUP, rows)?
        .into_iter()
        .map(Group::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    groups.sort_by_key(|g| g.number);
    Ok(groups)
}

pub async fn find_group_by_id(
    store: &dyn RecordStore,
    session: &Session,
    group_id: &str,
) -> Result<Option<Group>, AppError> {
    let filter = Filter::new().eq(fields::ID, group_id);
    let rows = store.read(session, tables::GROUP, &filter).await?;
    match rows.into_iter().next() {
        Some(row) => Ok(Some(Group::try_from(dto::decode::<GroupRecord>(tables::GROUP, row)?)?)),
        None => Ok(None),
    }
}

pub fn members_update(members: u32) -> Value {
    json!({ (fields::GROUP_MEMBERS): members })
}

pub async fn set_group_members(
    store: &dyn RecordStore,
    session: &Session,
    group_id: &str,
    members: u32,
) -> Result<(), AppError> {
    store
        .update(session, tables::GROUP, group_id, members_update(members))
        .await
}

pub async fn fetch_active_memberships_for_student(
    store: &dyn RecordStore,
    session: &Session,
    student_id: &str,
) -> Result<Vec<Membership>, AppError> {
    let filter = Filter::new()
        .eq(fields::MEMBERSHIP_STUDENT, student_id)
        .eq(fields::STATUS, ACTIVE_STATUS);
    let rows = store.read(session, tables::MEMBERSHIP, &filter).await?;
    Ok(dto::decode_all::<MembershipRecord>(tables::MEMBERSHIP, rows)?
        .into_iter()
        .map(Membership::from)
        .collect())
}

pub async fn insert_memberships(
    store: &dyn RecordStore,
    session: &Session,
    memberships: &[Membership],
) -> Result<(), AppError> {
    let values = memberships
        .iter()
        .map(|m| dto::encode(&MembershipRecord::from(m)))
        .collect::<Result<Vec<_>, _>>()?;
    store.insert(session, tables::MEMBERSHIP, values).await?;
    Ok(())
}

pub fn membership_conditions(student_id: &str, group_id: &str) -> Filter {
    Filter::new()
        .eq(fields::MEMBERSHIP_STUDENT, student_id)
        .eq(fields::MEMBERSHIP_GROUP, group_id)
}

pub async fn delete_memberships(
    store: &dyn RecordStore,
    session: &Session,
    student_id: &str,
    group_id: &str,
) -> Result<(), AppError> {
    store
        .delete(session, tables::MEMBERSHIP, &membership_conditions(student_id, group_id))
        .await
}

pub async fn delete_membership_by_id(
    store: &dyn RecordStore,
    session: &Session,
    membership_id: &str,
) -> Result<(), AppError> {
    store
        .delete(session, tables::MEMBERSHIP, &Filter::new().eq(fields::ID, membership_id))
        .await
}
