use axum::Json;
use axum::extract::Path;
use axum::routing::{post, put};
use axum::{Router, extract::State, http::StatusCode, routing::get};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::*;
use crate::state::AppState;

#[derive(Deserialize)]
struct Credentials {
    email: String,
    password: String,
}

#[derive(Deserialize)]
struct VerifyEmailRequest {
    email: String,
    code: String,
}

#[derive(Serialize)]
struct Verified {
    valid: bool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/auth/login", post(login))
        .route("/auth/signup", post(signup))
        .route("/auth/verify-email", post(verify_email))
        .route("/auth/refresh", post(refresh))
        .route("/auth/verify", get(verify_token))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
        .route("/courses", post(create_course))
        .route("/courses/teaching", get(teacher_courses))
        .route("/courses/enrolled", get(student_courses))
        .route("/courses/{id}", get(course))
        .route("/courses/{id}/join", post(join_course))
        .route("/courses/{id}/categories", get(list_categories).post(create_category))
        .route("/categories/{id}/groups", get(list_groups))
        .route("/categories/{id}/my-group", get(my_group).put(change_group))
        .route("/groups/{id}/join", post(join_group))
        .route("/groups/{id}/leave", post(leave_group))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    state.sessions.health().await?;
    Ok(StatusCode::OK)
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<Credentials>,
) -> Result<Json<AuthUser>, AppError> {
    let user = state.auth_service().login(&req.email, &req.password).await?;
    Ok(Json(user))
}

async fn signup(
    State(state): State<AppState>,
    Json(req): Json<Credentials>,
) -> Result<StatusCode, AppError> {
    state.auth_service().signup(&req.email, &req.password).await?;
    Ok(StatusCode::CREATED)
}

async fn verify_email(
    State(state): State<AppState>,
    Json(req): Json<VerifyEmailRequest>,
) -> Result<Json<Verified>, AppError> {
    let valid = state.auth_service().verify_email(&req.email, &req.code).await?;
    Ok(Json(Verified { valid }))
}

async fn refresh(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    state.auth_service().refresh().await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn verify_token(State(state): State<AppState>) -> Result<Json<Verified>, AppError> {
    let valid = state.auth_service().verify().await?;
    Ok(Json(Verified { valid }))
}

async fn logout(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    state.auth_service().logout().await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn me(State(state): State<AppState>) -> Result<Json<AuthUser>, AppError> {
    state
        .auth_service()
        .current_user()
        .await?
        .map(Json)
        .ok_or_else(|| AppError::Unauthorized("Not logged in".to_string()))
}

async fn teacher_courses(State(state): State<AppState>) -> Result<Json<Vec<Course>>, AppError> {
    let session = state.auth_service().require_session().await?;
    let courses = state.course_service().teacher_courses(&session, &session.user.id).await?;
    Ok(Json(courses))
}

async fn student_courses(State(state): State<AppState>) -> Result<Json<Vec<Course>>, AppError> {
    let session = state.auth_service().require_session().await?;
    let courses = state.course_service().student_courses(&session, &session.user.id).await?;
    Ok(Json(courses))
}

async fn create_course(
    State(state): State<AppState>,
    Json(req): Json<NewCourseRequest>,
) -> Result<(StatusCode, Json<Option<Course>>), AppError> {
    let session = state.auth_service().require_session().await?;
    let course = state.course_service().create_course(&session, &session.user.id, &req).await?;
    Ok((StatusCode::CREATED, Json(course)))
}

async fn course(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Course>, AppError> {
    let session = state.auth_service().require_session().await?;
    let course = state.course_service().course(&session, &id).await?;
    Ok(Json(course))
}

async fn join_course(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<Enrollment>), AppError> {
    let session = state.auth_service().require_session().await?;
    let enrollment = state.course_service().join_course(&session, &session.user.id, &id).await?;
    Ok((StatusCode::CREATED, Json(enrollment)))
}

async fn list_categories(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Category>>, AppError> {
    let session = state.auth_service().require_session().await?;
    let categories = state.course_service().categories_by_course(&session, &id).await?;
    Ok(Json(categories))
}

async fn create_category(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<NewCategoryRequest>,
) -> Result<(StatusCode, Json<CategoryWithGroups>), AppError> {
    let session = state.auth_service().require_session().await?;
    let created = state.course_service().create_category(&session, &id, &req).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_groups(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Group>>, AppError> {
    let session = state.auth_service().require_session().await?;
    let groups = state.group_service().groups_by_category(&session, &id).await?;
    Ok(Json(groups))
}

async fn my_group(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Option<Group>>, AppError> {
    let session = state.auth_service().require_session().await?;
    let group = state
        .group_service()
        .student_group_in_category(&session, &session.user.id, &id)
        .await?;
    Ok(Json(group))
}

async fn change_group(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ChangeGroupRequest>,
) -> Result<Json<GroupChange>, AppError> {
    let session = state.auth_service().require_session().await?;
    let change = state
        .group_service()
        .change_group_manual(&session, &session.user.id, &id, &req.group_id, req.group_size)
        .await?;
    Ok(Json(change))
}

async fn join_group(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<JoinGroupRequest>,
) -> Result<StatusCode, AppError> {
    let session = state.auth_service().require_session().await?;
    state
        .group_service()
        .join_group(&session, &session.user.id, &id, req.previous_group_id.as_deref())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn leave_group(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let session = state.auth_service().require_session().await?;
    state.group_service().leave_group(&session, &session.user.id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
