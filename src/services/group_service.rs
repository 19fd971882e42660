use std::sync::{Arc, Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::models::{CategoryWithGroups, Group, GroupChange, Membership, NewCategoryRequest, Session};
use crate::repository;
use crate::roble::dto::{self, CategoryRecord, GroupRecord, MembershipRecord, fields, tables};
use crate::roble::{Filter, RecordStore};
use crate::services::journal::{Journal, WriteOp};

/// Assigns students to fixed-capacity groups within the categories of a course.
///
/// Every operation is a sequence of independent requests against the record
/// store. Member counters are read, adjusted and written back without any
/// locking, so two clients touching the same group concurrently can lose an
/// update; the store offers no way to prevent that from here.
///
/// A write that fails part-way through an operation undoes the steps already
/// committed. With `compensate_on_failure(false)` (`ROBLE_COMPENSATE=false`)
/// the committed steps are only logged and the error is propagated as is.
pub struct GroupService {
    store: Arc<dyn RecordStore>,
    rng: Mutex<StdRng>,
    compensate: bool,
}

pub fn validate_group_size(group_size: i64) -> Result<u32, AppError> {
    if group_size <= 0 {
        return Err(AppError::Validation("groupSize must be > 0".to_string()));
    }
    u32::try_from(group_size)
        .map_err(|_| AppError::Validation(format!("groupSize {} is too large", group_size)))
}

/// `ceil(max_students / group_size)`.
pub fn group_count(max_students: u32, group_size: u32) -> u32 {
    max_students.div_ceil(group_size)
}

/// Deals `items` into `buckets` piles: item `i` lands in pile `i % buckets`.
pub fn round_robin<T: Clone>(items: &[T], buckets: usize) -> Vec<Vec<T>> {
    let mut piles = vec![Vec::new(); buckets];
    if buckets == 0 {
        return piles;
    }
    for (i, item) in items.iter().enumerate() {
        piles[i % buckets].push(item.clone());
    }
    piles
}

impl GroupService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self::with_rng(store, StdRng::from_entropy())
    }

    pub fn with_rng(store: Arc<dyn RecordStore>, rng: StdRng) -> Self {
        Self {
            store,
            rng: Mutex::new(rng),
            compensate: true,
        }
    }

    pub fn compensate_on_failure(mut self, enabled: bool) -> Self {
        self.compensate = enabled;
        self
    }

    fn shuffle<T>(&self, items: &mut [T]) {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        items.shuffle(&mut *rng);
    }

    fn pick_index(&self, len: usize) -> usize {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        rng.gen_range(0..len)
    }

    pub async fn groups_by_category(&self, session: &Session, category_id: &str) -> Result<Vec<Group>, AppError> {
        repository::fetch_groups_by_category(self.store.as_ref(), session, category_id).await
    }

    /// Active membership of the student among `groups`, if any.
    async fn current_membership(
        &self,
        session: &Session,
        student_id: &str,
        groups: &[Group],
    ) -> Result<Option<Membership>, AppError> {
        if groups.is_empty() {
            return Ok(None);
        }
        let memberships =
            repository::fetch_active_memberships_for_student(self.store.as_ref(), session, student_id).await?;
        Ok(memberships
            .into_iter()
            .find(|m| groups.iter().any(|g| g.id == m.group_id)))
    }

    pub async fn student_group_in_category(
        &self,
        session: &Session,
        student_id: &str,
        category_id: &str,
    ) -> Result<Option<Group>, AppError> {
        let groups = self.groups_by_category(session, category_id).await?;
        let current = self.current_membership(session, student_id, &groups).await?;
        Ok(current.and_then(|m| groups.into_iter().find(|g| g.id == m.group_id)))
    }

    pub async fn create_category_with_groups(
        &self,
        session: &Session,
        course_id: &str,
        course_max_students: u32,
        request: &NewCategoryRequest,
    ) -> Result<CategoryWithGroups, AppError> {
        let group_size = validate_group_size(request.group_size)?;
        let number_of_groups = group_count(course_max_students, group_size);
        info!(
            "Creating category '{}' in course {}: {} groups of {} (random: {})",
            request.name, course_id, number_of_groups, group_size, request.is_random
        );

        let mut journal = Journal::new("create_category_with_groups");
        let result = self
            .build_category(session, &mut journal, course_id, number_of_groups, group_size, request)
            .await;
        journal.settle(result, self.store.as_ref(), session, self.compensate).await
    }

    async fn build_category(
        &self,
        session: &Session,
        journal: &mut Journal,
        course_id: &str,
        number_of_groups: u32,
        group_size: u32,
        request: &NewCategoryRequest,
    ) -> Result<CategoryWithGroups, AppError> {
        let store = self.store.as_ref();

        let record = CategoryRecord::new_category(course_id, &request.name, group_size, request.is_random);
        let category = repository::insert_category(store, session, &record).await?;
        journal.record(
            format!("insert category {}", category.id),
            WriteOp::Delete {
                table: tables::CATEGORY,
                conditions: Filter::new().eq(fields::ID, &category.id),
            },
        );

        if number_of_groups == 0 {
            warn!("Course {} admits no students, category {} has no groups", course_id, category.id);
            return Ok(CategoryWithGroups { category, groups: Vec::new() });
        }

        let records: Vec<GroupRecord> = (1..=number_of_groups)
            .map(|number| GroupRecord::new_group(&category.id, number, request.is_random))
            .collect();
        let mut groups = repository::insert_groups(store, session, &records).await?;
        journal.record(
            format!("insert {} groups of category {}", number_of_groups, category.id),
            WriteOp::Delete {
                table: tables::GROUP,
                conditions: Filter::new().eq(fields::GROUP_CATEGORY, &category.id),
            },
        );
        if groups.is_empty() {
            return Err(AppError::Remote("Groups insert failed".to_string()));
        }

        if !request.is_random {
            return Ok(CategoryWithGroups { category, groups });
        }

        let mut students: Vec<String> =
            repository::fetch_active_enrollments_for_course(store, session, course_id)
                .await?
                .into_iter()
                .map(|e| e.student_id)
                .collect();
        if students.is_empty() {
            debug!("No active students in course {}, groups stay empty", course_id);
            return Ok(CategoryWithGroups { category, groups });
        }

        self.shuffle(&mut students);
        let piles = round_robin(&students, groups.len());

        let memberships: Vec<Membership> = groups
            .iter()
            .zip(&piles)
            .flat_map(|(group, pile)| pile.iter().map(move |student| Membership::active(student, &group.id)))
            .collect();
        repository::insert_memberships(store, session, &memberships).await?;
        for group in &groups {
            journal.record(
                format!("insert memberships of group {}", group.id),
                WriteOp::Delete {
                    table: tables::MEMBERSHIP,
                    conditions: Filter::new().eq(fields::MEMBERSHIP_GROUP, &group.id),
                },
            );
        }

        for (group, pile) in groups.iter_mut().zip(&piles) {
            let members = pile.len() as u32;
            repository::set_group_members(store, session, &group.id, members).await?;
            journal.record(
                format!("set members of group {} to {}", group.id, members),
                WriteOp::set_members(&group.id, group.members),
            );
            group.members = members;
        }

        info!(
            "Distributed {} students over {} groups in category {}",
            students.len(),
            groups.len(),
            category.id
        );
        Ok(CategoryWithGroups { category, groups })
    }

    /// Puts the student into one open group of every random category of the course.
    ///
    /// Returns the groups joined. Categories with an unusable size, no groups or
    /// no free seat are skipped.
    pub async fn assign_student_to_random_groups(
        &self,
        session: &Session,
        student_id: &str,
        course_id: &str,
    ) -> Result<Vec<Group>, AppError> {
        let store = self.store.as_ref();
        let categories = repository::fetch_categories(store, session, course_id, true).await?;
        let mut joined = Vec::new();

        for category in categories.into_iter().filter(|c| c.is_random) {
            let Some(group_size) = category.group_size else {
                debug!("Skipping category {}: no usable group size", category.id);
                continue;
            };

            let groups = repository::fetch_groups_by_category(store, session, &category.id).await?;
            let open: Vec<&Group> = groups.iter().filter(|g| g.has_room(group_size)).collect();
            if open.is_empty() {
                debug!("Skipping category {}: every group is full", category.id);
                continue;
            }

            let chosen = open[self.pick_index(open.len())].clone();
            let mut journal = Journal::new("assign_student_to_random_group");
            let result = self.add_member(session, &mut journal, student_id, &chosen).await;
            let group = journal.settle(result, store, session, self.compensate).await?;
            info!("Student {} placed in group {} of category {}", student_id, group.id, category.id);
            joined.push(group);
        }

        Ok(joined)
    }

    /// Inserts the membership and writes `group.members + 1`.
    async fn add_member(
        &self,
        session: &Session,
        journal: &mut Journal,
        student_id: &str,
        group: &Group,
    ) -> Result<Group, AppError> {
        let store = self.store.as_ref();

        repository::insert_memberships(store, session, &[Membership::active(student_id, &group.id)]).await?;
        journal.record(
            format!("insert membership of {} in group {}", student_id, group.id),
            WriteOp::Delete {
                table: tables::MEMBERSHIP,
                conditions: repository::membership_conditions(student_id, &group.id),
            },
        );

        let members = group.members.saturating_add(1);
        repository::set_group_members(store, session, &group.id, members).await?;
        journal.record(
            format!("set members of group {} to {}", group.id, members),
            WriteOp::set_members(&group.id, group.members),
        );

        Ok(Group { members, ..group.clone() })
    }

    pub async fn change_group_manual(
        &self,
        session: &Session,
        student_id: &str,
        category_id: &str,
        new_group_id: &str,
        group_size: i64,
    ) -> Result<GroupChange, AppError> {
        let group_size = validate_group_size(group_size)?;

        let groups = self.groups_by_category(session, category_id).await?;
        let target = groups
            .iter()
            .find(|g| g.id == new_group_id)
            .cloned()
            .ok_or_else(|| {
                AppError::NotFound(format!("Group {} not found in category {}", new_group_id, category_id))
            })?;

        let current = self.current_membership(session, student_id, &groups).await?;
        if current.as_ref().is_some_and(|m| m.group_id == target.id) {
            debug!("Student {} already in group {}", student_id, target.id);
            return Ok(GroupChange::Unchanged { group_id: target.id });
        }

        if !target.has_room(group_size) {
            return Err(AppError::Capacity {
                group_id: target.id,
                members: target.members,
                capacity: group_size,
            });
        }

        let mut journal = Journal::new("change_group_manual");
        let result = self
            .move_member(session, &mut journal, student_id, current, &groups, &target)
            .await;
        journal.settle(result, self.store.as_ref(), session, self.compensate).await
    }

    async fn move_member(
        &self,
        session: &Session,
        journal: &mut Journal,
        student_id: &str,
        current: Option<Membership>,
        groups: &[Group],
        target: &Group,
    ) -> Result<GroupChange, AppError> {
        let store = self.store.as_ref();
        let mut from = None;

        if let Some(membership) = current {
            match membership.id.as_deref() {
                Some(id) => repository::delete_membership_by_id(store, session, id).await?,
                None => repository::delete_memberships(store, session, student_id, &membership.group_id).await?,
            }
            journal.record(
                format!("remove membership of {} in group {}", student_id, membership.group_id),
                WriteOp::Insert {
                    table: tables::MEMBERSHIP,
                    records: vec![dto::encode(&MembershipRecord::from(&membership))?],
                },
            );

            if let Some(old) = groups.iter().find(|g| g.id == membership.group_id) {
                let members = old.members.saturating_sub(1);
                repository::set_group_members(store, session, &old.id, members).await?;
                journal.record(
                    format!("set members of group {} to {}", old.id, members),
                    WriteOp::set_members(&old.id, old.members),
                );
            }
            from = Some(membership.group_id);
        }

        let to = self.add_member(session, journal, student_id, target).await?;
        info!("Student {} moved from {:?} to group {}", student_id, from, to.id);
        Ok(GroupChange::Moved { from, to })
    }

    /// Deletes the student's membership rows in the group, then re-reads the
    /// group and writes its counter decremented (never below zero).
    pub async fn leave_group(&self, session: &Session, student_id: &str, group_id: &str) -> Result<(), AppError> {
        let mut journal = Journal::new("leave_group");
        let result = self.remove_member(session, &mut journal, student_id, group_id).await;
        journal.settle(result, self.store.as_ref(), session, self.compensate).await
    }

    async fn remove_member(
        &self,
        session: &Session,
        journal: &mut Journal,
        student_id: &str,
        group_id: &str,
    ) -> Result<(), AppError> {
        let store = self.store.as_ref();

        let removed: Vec<Membership> =
            repository::fetch_active_memberships_for_student(store, session, student_id)
                .await?
                .into_iter()
                .filter(|m| m.group_id == group_id)
                .collect();
        repository::delete_memberships(store, session, student_id, group_id).await?;
        for membership in &removed {
            journal.record(
                format!("remove membership of {} in group {}", student_id, group_id),
                WriteOp::Insert {
                    table: tables::MEMBERSHIP,
                    records: vec![dto::encode(&MembershipRecord::from(membership))?],
                },
            );
        }

        let Some(group) = repository::find_group_by_id(store, session, group_id).await? else {
            warn!("Group {} vanished, counter left untouched", group_id);
            return Ok(());
        };
        let members = group.members.saturating_sub(1);
        repository::set_group_members(store, session, group_id, members).await?;
        journal.record(
            format!("set members of group {} to {}", group_id, members),
            WriteOp::set_members(group_id, group.members),
        );
        Ok(())
    }

    /// Leaves `previous_group_id` first when it differs from the target, then
    /// inserts the membership and writes the re-read counter plus one.
    pub async fn join_group(
        &self,
        session: &Session,
        student_id: &str,
        group_id: &str,
        previous_group_id: Option<&str>,
    ) -> Result<(), AppError> {
        if let Some(previous) = previous_group_id.filter(|p| *p != group_id) {
            self.leave_group(session, student_id, previous).await?;
        }

        let mut journal = Journal::new("join_group");
        let result = self.insert_member(session, &mut journal, student_id, group_id).await;
        journal.settle(result, self.store.as_ref(), session, self.compensate).await
    }

    async fn insert_member(
        &self,
        session: &Session,
        journal: &mut Journal,
        student_id: &str,
        group_id: &str,
    ) -> Result<(), AppError> {
        let store = self.store.as_ref();

        repository::insert_memberships(store, session, &[Membership::active(student_id, group_id)]).await?;
        journal.record(
            format!("insert membership of {} in group {}", student_id, group_id),
            WriteOp::Delete {
                table: tables::MEMBERSHIP,
                conditions: repository::membership_conditions(student_id, group_id),
            },
        );

        let Some(group) = repository::find_group_by_id(store, session, group_id).await? else {
            warn!("Group {} vanished, counter left untouched", group_id);
            return Ok(());
        };
        let members = group.members.saturating_add(1);
        repository::set_group_members(store, session, group_id, members).await?;
        journal.record(
            format!("set members of group {} to {}", group_id, members),
            WriteOp::set_members(group_id, group.members),
        );
        Ok(())
    }
}
