//! Wire shapes of the Roble record store and their mapping to domain types.
//!
//! Field names on the wire are inconsistent (`IsRamdom`, `categorie_Id`,
//! `Description` holding the group size as text); nothing outside this module
//! should spell them.

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::AppError;
use crate::models::{Category, Course, Enrollment, Group, Membership};
use crate::roble::Filter;

pub mod tables {
    pub const COURSE: &str = "Course";
    pub const ENROLLMENT: &str = "Rel_Curso_Estudiante";
    pub const CATEGORY: &str = "Categories";
    pub const GROUP: &str = "Group";
    pub const MEMBERSHIP: &str = "Rel_Estudiante_Grupo";
}

pub mod fields {
    pub const ID: &str = "_id";
    pub const STATUS: &str = "Estado";

    pub const COURSE_TEACHER: &str = "teacher_id";

    pub const ENROLLMENT_STUDENT: &str = "Estudiante_Id";
    pub const ENROLLMENT_COURSE: &str = "Curso_Id";

    pub const CATEGORY_COURSE: &str = "Curso_id";
    pub const CATEGORY_IS_RANDOM: &str = "IsRamdom";

    pub const GROUP_CATEGORY: &str = "categorie_Id";
    pub const GROUP_MEMBERS: &str = "members";

    pub const MEMBERSHIP_STUDENT: &str = "Estudiante_Id";
    pub const MEMBERSHIP_GROUP: &str = "Grupo_Id";
}

#[derive(Debug, Serialize)]
pub struct InsertRequest<'a> {
    #[serde(rename = "tableName")]
    pub table_name: &'a str,
    pub records: Vec<Value>,
}

#[derive(Debug, Serialize)]
pub struct UpdateRequest<'a> {
    #[serde(rename = "tableName")]
    pub table_name: &'a str,
    #[serde(rename = "idColumn")]
    pub id_column: &'a str,
    #[serde(rename = "idValue")]
    pub id_value: &'a str,
    pub updates: Value,
}

#[derive(Debug, Serialize)]
pub struct DeleteRequest<'a> {
    #[serde(rename = "tableName")]
    pub table_name: &'a str,
    pub conditions: &'a Filter,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum InsertResponse {
    Wrapped {
        inserted: Vec<Value>,
        #[serde(default)]
        skipped: Vec<Value>,
    },
    Bare(Vec<Value>),
}

impl InsertResponse {
    pub fn into_inserted(self) -> Vec<Value> {
        match self {
            InsertResponse::Wrapped { inserted, skipped } => {
                if !skipped.is_empty() {
                    tracing::warn!("Roble skipped {} records on insert", skipped.len());
                }
                inserted
            }
            InsertResponse::Bare(records) => records,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseRecord {
    #[serde(rename = "_id", alias = "id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "Titulo", default, deserialize_with = "lenient_string")]
    pub title: String,
    #[serde(rename = "Description", default, deserialize_with = "lenient_string")]
    pub description: String,
    #[serde(rename = "Max_students", default, deserialize_with = "lenient_u32")]
    pub max_students: u32,
    #[serde(rename = "teacher_id", default, deserialize_with = "lenient_string")]
    pub teacher_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentRecord {
    #[serde(rename = "_id", alias = "id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "Estudiante_Id", default, deserialize_with = "lenient_string")]
    pub student_id: String,
    #[serde(rename = "Curso_Id", default, deserialize_with = "lenient_string")]
    pub course_id: String,
    #[serde(rename = "Estado", default, deserialize_with = "lenient_string")]
    pub status: String,
    #[serde(rename = "Fecha_Ingreso", default, skip_serializing_if = "Option::is_none")]
    pub join_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRecord {
    #[serde(rename = "_id", alias = "id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "Name", default, deserialize_with = "lenient_string")]
    pub name: String,
    /// Group size, stored as text.
    #[serde(rename = "Description", default, deserialize_with = "lenient_string")]
    pub description: String,
    #[serde(rename = "IsRamdom", default, deserialize_with = "lenient_bool")]
    pub is_random: bool,
    #[serde(rename = "Curso_id", default, deserialize_with = "lenient_string")]
    pub course_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupRecord {
    #[serde(rename = "_id", alias = "id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "categorie_Id", default, deserialize_with = "lenient_string")]
    pub category_id: String,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub number: u32,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub members: u32,
    #[serde(rename = "IsRamdonGroup", default, deserialize_with = "lenient_bool")]
    pub is_random_group: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipRecord {
    #[serde(rename = "_id", alias = "id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "Estudiante_Id", default, deserialize_with = "lenient_string")]
    pub student_id: String,
    #[serde(rename = "Grupo_Id", default, deserialize_with = "lenient_string")]
    pub group_id: String,
    #[serde(rename = "Estado", default, deserialize_with = "lenient_string")]
    pub status: String,
}

pub fn decode<T: DeserializeOwned>(table: &str, value: Value) -> Result<T, AppError> {
    serde_json::from_value(value)
        .map_err(|e| AppError::Remote(format!("Malformed {} record: {}", table, e)))
}

pub fn decode_all<T: DeserializeOwned>(table: &str, values: Vec<Value>) -> Result<Vec<T>, AppError> {
    values.into_iter().map(|v| decode(table, v)).collect()
}

pub fn encode<T: Serialize>(record: &T) -> Result<Value, AppError> {
    serde_json::to_value(record).map_err(|e| AppError::remote("Failed to encode record", e))
}

fn require_id(table: &str, id: Option<String>) -> Result<String, AppError> {
    id.filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::Remote(format!("{} record without id", table)))
}

/// Group size as the category's `Description` carries it.
pub fn parse_group_size(text: &str) -> Option<u32> {
    let text = text.trim();
    text.parse::<u32>()
        .ok()
        .or_else(|| {
            text.parse::<f64>()
                .ok()
                .filter(|f| f.fract() == 0.0 && *f >= 1.0 && *f <= u32::MAX as f64)
                .map(|f| f as u32)
        })
        .filter(|size| *size > 0)
}

impl TryFrom<CourseRecord> for Course {
    type Error = AppError;

    fn try_from(record: CourseRecord) -> Result<Self, Self::Error> {
        Ok(Course {
            id: require_id(tables::COURSE, record.id)?,
            title: record.title,
            description: record.description,
            teacher_id: record.teacher_id,
            max_students: record.max_students,
        })
    }
}

impl CourseRecord {
    pub fn new_course(title: &str, description: &str, max_students: u32, teacher_id: &str) -> Self {
        Self {
            id: None,
            title: title.to_string(),
            description: description.to_string(),
            max_students,
            teacher_id: teacher_id.to_string(),
        }
    }
}

impl From<EnrollmentRecord> for Enrollment {
    fn from(record: EnrollmentRecord) -> Self {
        let join_date = record
            .join_date
            .as_deref()
            .and_then(|raw| raw.get(..10))
            .and_then(|day| NaiveDate::parse_from_str(day, "%Y-%m-%d").ok());
        Enrollment {
            student_id: record.student_id,
            course_id: record.course_id,
            status: record.status,
            join_date,
        }
    }
}

impl From<&Enrollment> for EnrollmentRecord {
    fn from(enrollment: &Enrollment) -> Self {
        Self {
            id: None,
            student_id: enrollment.student_id.clone(),
            course_id: enrollment.course_id.clone(),
            status: enrollment.status.clone(),
            join_date: enrollment.join_date.map(|d| d.format("%Y-%m-%d").to_string()),
        }
    }
}

impl TryFrom<CategoryRecord> for Category {
    type Error = AppError;

    fn try_from(record: CategoryRecord) -> Result<Self, Self::Error> {
        Ok(Category {
            id: require_id(tables::CATEGORY, record.id)?,
            course_id: record.course_id,
            name: record.name,
            group_size: parse_group_size(&record.description),
            is_random: record.is_random,
        })
    }
}

impl CategoryRecord {
    pub fn new_category(course_id: &str, name: &str, group_size: u32, is_random: bool) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            description: group_size.to_string(),
            is_random,
            course_id: course_id.to_string(),
        }
    }
}

impl TryFrom<GroupRecord> for Group {
    type Error = AppError;

    fn try_from(record: GroupRecord) -> Result<Self, Self::Error> {
        Ok(Group {
            id: require_id(tables::GROUP, record.id)?,
            category_id: record.category_id,
            number: record.number,
            members: record.members,
            is_random_group: record.is_random_group,
        })
    }
}

impl GroupRecord {
    pub fn new_group(category_id: &str, number: u32, is_random_group: bool) -> Self {
        Self {
            id: None,
            category_id: category_id.to_string(),
            number,
            members: 0,
            is_random_group,
        }
    }
}

impl From<MembershipRecord> for Membership {
    fn from(record: MembershipRecord) -> Self {
        Membership {
            id: record.id,
            student_id: record.student_id,
            group_id: record.group_id,
            status: record.status,
        }
    }
}

impl From<&Membership> for MembershipRecord {
    fn from(membership: &Membership) -> Self {
        Self {
            id: None,
            student_id: membership.student_id.clone(),
            group_id: membership.group_id.clone(),
            status: membership.status.clone(),
        }
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    })
}

fn lenient_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let as_u32 = |f: f64| if f.is_finite() && f >= 0.0 { f.min(u32::MAX as f64) as u32 } else { 0 };
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_u64()
            .map(|v| v.min(u32::MAX as u64) as u32)
            .or_else(|| n.as_f64().map(as_u32))
            .unwrap_or(0),
        Value::String(s) => s.trim().parse::<f64>().map(as_u32).unwrap_or(0),
        _ => 0,
    })
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::String(s) => s.eq_ignore_ascii_case("true") || s == "1",
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => false,
    })
}
