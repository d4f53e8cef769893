use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub course_id: String,
    pub teacher_id: String,
    pub teacher_name: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<u64>,
    pub level: String,
    pub status: String,
    #[serde(default)]
    pub sections: Vec<Value>,
    #[serde(default)]
    pub enrollments: Vec<Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChapterProgress {
    pub chapter_id: String,
    pub completed: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SectionProgress {
    pub section_id: String,
    #[serde(default)]
    pub chapters: Vec<ChapterProgress>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CourseProgress {
    pub user_id: String,
    pub course_id: String,
    pub enrollment_date: String,
    pub overall_progress: f64,
    pub sections: Vec<SectionProgress>,
    pub last_accessed_timestamp: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub user_id: String,
    pub transaction_id: String,
    pub date_time: String,
    pub course_id: String,
    pub payment_provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCourse {
    pub teacher_id: String,
    pub teacher_name: String,
}

#[derive(Deserialize)]
pub struct UpdateCourse {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: Option<u64>,
    pub status: Option<String>,
    pub sections: Option<Vec<Value>>,
}

#[derive(Deserialize)]
pub struct UpdateProgress {
    pub sections: Vec<SectionProgress>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    pub file_name: Option<String>,
    pub file_type: Option<String>,
}

#[derive(Deserialize)]
pub struct PaymentRequest {
    pub amount: Option<u64>,
}

#[derive(Deserialize)]
pub struct CategoryQuery {
    pub category: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    pub user_id: Option<String>,
}

#[derive(Debug, Default)]
pub struct Store {
    pub courses: HashMap<String, Course>,
    pub users: HashMap<String, Value>,
    pub transactions: Vec<Transaction>,
    pub progress: HashMap<(String, String), CourseProgress>,
}

pub type Db = Arc<RwLock<Store>>;

type ApiResult = Result<Json<Value>, (StatusCode, Json<Value>)>;

/// Body shaped as the `{ message, data }` envelope the client unwraps.
fn envelope(message: &str, data: impl Serialize) -> Json<Value> {
    Json(json!({ "message": message, "data": data }))
}

fn failure(status: StatusCode, message: &str) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "message": message })))
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub fn app() -> Router {
    app_with_store(Db::default())
}

/// Router over an existing store, so tests can seed and inspect state.
pub fn app_with_store(db: Db) -> Router {
    Router::new()
        .route("/users/clerk/{user_id}", put(update_user))
        .route("/courses", get(list_courses).post(create_course))
        .route(
            "/courses/{course_id}",
            get(get_course).put(update_course).delete(delete_course),
        )
        .route(
            "/courses/{course_id}/sections/{section_id}/chapters/{chapter_id}/get-upload-url",
            post(get_upload_url),
        )
        .route("/transactions", get(list_transactions).post(create_transaction))
        .route("/transactions/stripe/payment-intent", post(create_payment_intent))
        .route(
            "/users/course-progress/{user_id}/enrolled-courses",
            get(enrolled_courses),
        )
        .route(
            "/users/course-progress/{user_id}/courses/{course_id}",
            get(get_progress).put(update_progress),
        )
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn update_user(
    State(db): State<Db>,
    Path(user_id): Path<String>,
    Json(mut changes): Json<Value>,
) -> ApiResult {
    let Some(fields) = changes.as_object_mut() else {
        return Err(failure(StatusCode::BAD_REQUEST, "Expected a JSON object"));
    };
    fields.insert("userId".into(), Value::String(user_id.clone()));
    let mut store = db.write().await;
    let user = store.users.entry(user_id).or_insert_with(|| json!({}));
    if let (Some(existing), Some(update)) = (user.as_object_mut(), changes.as_object()) {
        for (k, v) in update {
            existing.insert(k.clone(), v.clone());
        }
    }
    Ok(envelope("User updated successfully", user.clone()))
}

async fn list_courses(State(db): State<Db>, Query(query): Query<CategoryQuery>) -> ApiResult {
    let store = db.read().await;
    let courses: Vec<&Course> = store
        .courses
        .values()
        .filter(|c| match query.category.as_deref() {
            None | Some("all") => true,
            Some(category) => c.category == category,
        })
        .collect();
    Ok(envelope("Courses retrieved successfully", courses))
}

async fn get_course(State(db): State<Db>, Path(course_id): Path<String>) -> ApiResult {
    let store = db.read().await;
    store
        .courses
        .get(&course_id)
        .map(|c| envelope("Course retrieved successfully", c))
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, "Course not found"))
}

async fn create_course(
    State(db): State<Db>,
    Json(input): Json<CreateCourse>,
) -> (StatusCode, Json<Value>) {
    let course = Course {
        course_id: Uuid::new_v4().to_string(),
        teacher_id: input.teacher_id,
        teacher_name: input.teacher_name,
        title: "Untitled Course".to_string(),
        description: Some(String::new()),
        category: "Uncategorized".to_string(),
        price: Some(0),
        level: "Beginner".to_string(),
        status: "Draft".to_string(),
        sections: Vec::new(),
        enrollments: Vec::new(),
    };
    db.write()
        .await
        .courses
        .insert(course.course_id.clone(), course.clone());
    (
        StatusCode::CREATED,
        envelope("Course created successfully", course),
    )
}

async fn update_course(
    State(db): State<Db>,
    Path(course_id): Path<String>,
    Json(input): Json<UpdateCourse>,
) -> ApiResult {
    let mut store = db.write().await;
    let course = store
        .courses
        .get_mut(&course_id)
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, "Course not found"))?;
    if let Some(title) = input.title {
        course.title = title;
    }
    if let Some(description) = input.description {
        course.description = Some(description);
    }
    if let Some(category) = input.category {
        course.category = category;
    }
    if let Some(price) = input.price {
        course.price = Some(price);
    }
    if let Some(status) = input.status {
        course.status = status;
    }
    if let Some(sections) = input.sections {
        course.sections = sections;
    }
    Ok(envelope("Course updated successfully", course.clone()))
}

async fn delete_course(State(db): State<Db>, Path(course_id): Path<String>) -> ApiResult {
    let mut store = db.write().await;
    store
        .courses
        .remove(&course_id)
        .map(|c| envelope("Course deleted successfully", c))
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, "Course not found"))
}

async fn get_upload_url(
    Path((course_id, section_id, chapter_id)): Path<(String, String, String)>,
    Json(input): Json<UploadRequest>,
) -> ApiResult {
    let (Some(file_name), Some(_)) = (input.file_name, input.file_type) else {
        return Err(failure(StatusCode::BAD_REQUEST, "File name and type are required"));
    };
    let key = format!("videos/{course_id}/{section_id}/{chapter_id}/{}/{file_name}", Uuid::new_v4());
    Ok(envelope(
        "",
        json!({
            "uploadUrl": format!("https://uploads.example.com/{key}?signature=mock"),
            "videoUrl": format!("https://cdn.example.com/{key}"),
        }),
    ))
}

async fn list_transactions(State(db): State<Db>, Query(query): Query<UserQuery>) -> ApiResult {
    let store = db.read().await;
    let transactions: Vec<&Transaction> = store
        .transactions
        .iter()
        .filter(|t| query.user_id.as_deref().map_or(true, |u| t.user_id == u))
        .collect();
    Ok(envelope("Transactions retrieved successfully", transactions))
}

async fn create_payment_intent(Json(input): Json<PaymentRequest>) -> ApiResult {
    let amount = input.amount.filter(|a| *a > 0).unwrap_or(50);
    Ok(envelope(
        "",
        json!({ "clientSecret": format!("pi_{}_secret_{amount}", Uuid::new_v4().simple()) }),
    ))
}

/// Records the purchase, enrolls the user, and starts their progress.
async fn create_transaction(
    State(db): State<Db>,
    Json(transaction): Json<Transaction>,
) -> ApiResult {
    let mut store = db.write().await;
    let course = store
        .courses
        .get_mut(&transaction.course_id)
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, "Course not found"))?;
    course
        .enrollments
        .push(json!({ "userId": transaction.user_id }));

    let sections = course
        .sections
        .iter()
        .filter_map(|s| s.get("sectionId").and_then(Value::as_str))
        .map(|id| SectionProgress {
            section_id: id.to_string(),
            chapters: Vec::new(),
        })
        .collect();
    let timestamp = now();
    store.progress.insert(
        (transaction.user_id.clone(), transaction.course_id.clone()),
        CourseProgress {
            user_id: transaction.user_id.clone(),
            course_id: transaction.course_id.clone(),
            enrollment_date: timestamp.clone(),
            overall_progress: 0.0,
            sections,
            last_accessed_timestamp: timestamp,
        },
    );
    store.transactions.push(transaction.clone());
    Ok(envelope("Purchased Course successfully", transaction))
}

async fn enrolled_courses(State(db): State<Db>, Path(user_id): Path<String>) -> ApiResult {
    let store = db.read().await;
    let courses: Vec<&Course> = store
        .progress
        .keys()
        .filter(|(u, _)| *u == user_id)
        .filter_map(|(_, c)| store.courses.get(c))
        .collect();
    Ok(envelope("Enrolled courses retrieved successfully", courses))
}

async fn get_progress(
    State(db): State<Db>,
    Path((user_id, course_id)): Path<(String, String)>,
) -> ApiResult {
    let store = db.read().await;
    store
        .progress
        .get(&(user_id, course_id))
        .map(|p| envelope("Course progress retrieved successfully", p))
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, "Course progress not found for this user"))
}

/// Merge chapter progress by id and recompute the completion percentage.
///
/// Sections must exist in the course.
async fn update_progress(
    State(db): State<Db>,
    Path((user_id, course_id)): Path<(String, String)>,
    Json(input): Json<UpdateProgress>,
) -> ApiResult {
    let mut store = db.write().await;
    let course = store
        .courses
        .get(&course_id)
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, "Course not found"))?;
    let known: Vec<&str> = course
        .sections
        .iter()
        .filter_map(|s| s.get("sectionId").and_then(Value::as_str))
        .collect();
    if let Some(unknown) = input
        .sections
        .iter()
        .find(|s| !known.contains(&s.section_id.as_str()))
    {
        return Err(failure(
            StatusCode::BAD_REQUEST,
            &format!("Unknown section {}", unknown.section_id),
        ));
    }

    let timestamp = now();
    let progress = store
        .progress
        .entry((user_id.clone(), course_id.clone()))
        .or_insert_with(|| CourseProgress {
            user_id,
            course_id,
            enrollment_date: timestamp.clone(),
            overall_progress: 0.0,
            sections: Vec::new(),
            last_accessed_timestamp: timestamp.clone(),
        });
    merge_sections(&mut progress.sections, input.sections);
    progress.overall_progress = overall_progress(&progress.sections);
    progress.last_accessed_timestamp = timestamp;
    Ok(envelope("", progress.clone()))
}

pub fn merge_sections(existing: &mut Vec<SectionProgress>, updates: Vec<SectionProgress>) {
    for update in updates {
        match existing.iter_mut().find(|s| s.section_id == update.section_id) {
            Some(section) => {
                for chapter in update.chapters {
                    match section
                        .chapters
                        .iter_mut()
                        .find(|c| c.chapter_id == chapter.chapter_id)
                    {
                        Some(current) => current.completed = chapter.completed,
                        None => section.chapters.push(chapter),
                    }
                }
            }
            None => existing.push(update),
        }
    }
}

pub fn overall_progress(sections: &[SectionProgress]) -> f64 {
    let chapters = sections.iter().flat_map(|s| &s.chapters);
    let total = chapters.clone().count();
    if total == 0 {
        return 0.0;
    }
    let completed = chapters.filter(|c| c.completed).count();
    completed as f64 / total as f64 * 100.0
}
