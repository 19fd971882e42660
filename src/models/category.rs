use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub course_id: String,
    pub name: String,
    /// `None` when the stored size is missing, unparseable or not positive.
    pub group_size: Option<u32>,
    pub is_random: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCategoryRequest {
    pub name: String,
    pub group_size: i64,
    #[serde(default)]
    pub is_random: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryWithGroups {
    pub category: Category,
    pub groups: Vec<super::Group>,
}
