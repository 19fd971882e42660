use serde::{Deserialize, Serialize};

use super::course::ACTIVE_STATUS;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub category_id: String,
    pub number: u32,
    pub members: u32,
    pub is_random_group: bool,
}

impl Group {
    pub fn has_room(&self, group_size: u32) -> bool {
        self.members < group_size
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Membership {
    pub id: Option<String>,
    pub student_id: String,
    pub group_id: String,
    pub status: String,
}

impl Membership {
    pub fn active(student_id: &str, group_id: &str) -> Self {
        Self {
            id: None,
            student_id: student_id.to_string(),
            group_id: group_id.to_string(),
            status: ACTIVE_STATUS.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeGroupRequest {
    pub group_id: String,
    pub group_size: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JoinGroupRequest {
    #[serde(default)]
    pub previous_group_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GroupChange {
    /// The student already belonged to the requested group.
    Unchanged { group_id: String },
    Moved { from: Option<String>, to: Group },
}
