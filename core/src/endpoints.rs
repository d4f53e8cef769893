//! Endpoint registry: one type per API operation.
//!
//! # Design
//! Each endpoint declares how to build its request descriptor from typed
//! arguments, the payload type it yields after envelope unwrapping, and its
//! cache-tag relationships. Queries *provide* tags for the entries they
//! create; mutations *invalidate* tags when they settle. The progress update
//! additionally declares an optimistic patch of the cached progress query.
//!
//! Request URLs are relative; the transport adapter resolves them against the
//! configured base URL.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::CacheKey;
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest};
use crate::optimistic::OptimisticPatch;
use crate::tags::{Tag, TagKind};
use crate::types::{
    Course, CourseChanges, NewCourse, PaymentIntent, ProgressUpdate, Transaction, UploadUrl, User,
    UserChanges, UserCourseProgress,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    Query,
    Mutation,
}

/// A declared API operation.
pub trait Endpoint {
    /// Cache namespace; also used in logs.
    const NAME: &'static str;
    const KIND: EndpointKind;

    type Args: Serialize + Send + Sync;
    type Output: DeserializeOwned + Send;

    fn request(args: &Self::Args) -> Result<HttpRequest, ApiError>;

    /// Tags attached to this query's cache entry.
    fn provides(_args: &Self::Args) -> Vec<Tag> {
        Vec::new()
    }

    /// Tags invalidated when this mutation settles.
    fn invalidates(_args: &Self::Args) -> Vec<Tag> {
        Vec::new()
    }

    /// Cache patch applied before the request is sent.
    fn optimistic(_args: &Self::Args) -> Result<Option<OptimisticPatch>, ApiError> {
        Ok(None)
    }

    fn cache_key(args: &Self::Args) -> Result<CacheKey, ApiError> {
        CacheKey::new(Self::NAME, args)
    }
}

fn json_body<T: Serialize>(body: &T) -> Result<String, ApiError> {
    serde_json::to_string(body).map_err(|e| ApiError::Serialization(e.to_string()))
}

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserArgs {
    pub user_id: String,
    pub changes: UserChanges,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CourseFilter {
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCourseArgs {
    pub course_id: String,
    pub changes: CourseChanges,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadVideoArgs {
    pub course_id: String,
    pub section_id: String,
    pub chapter_id: String,
    pub file_name: String,
    pub file_type: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PaymentIntentArgs {
    /// Amount in the smallest currency unit.
    pub amount: u64,
}

/// Identifies one user's progress in one course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseProgressKey {
    pub user_id: String,
    pub course_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProgressArgs {
    pub user_id: String,
    pub course_id: String,
    pub progress_data: ProgressUpdate,
}

impl UpdateProgressArgs {
    pub fn key(&self) -> CourseProgressKey {
        CourseProgressKey {
            user_id: self.user_id.clone(),
            course_id: self.course_id.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

pub struct UpdateUser;

impl Endpoint for UpdateUser {
    const NAME: &'static str = "updateUser";
    const KIND: EndpointKind = EndpointKind::Mutation;
    type Args = UpdateUserArgs;
    type Output = User;

    fn request(args: &UpdateUserArgs) -> Result<HttpRequest, ApiError> {
        Ok(HttpRequest::new(HttpMethod::Put, format!("users/clerk/{}", args.user_id))
            .with_json_body(json_body(&args.changes)?))
    }

    fn invalidates(_: &UpdateUserArgs) -> Vec<Tag> {
        vec![Tag::all(TagKind::Users)]
    }
}

// ---------------------------------------------------------------------------
// Courses
// ---------------------------------------------------------------------------

pub struct GetCourses;

impl Endpoint for GetCourses {
    const NAME: &'static str = "getCourses";
    const KIND: EndpointKind = EndpointKind::Query;
    type Args = CourseFilter;
    type Output = Vec<Course>;

    fn request(args: &CourseFilter) -> Result<HttpRequest, ApiError> {
        let req = HttpRequest::new(HttpMethod::Get, "courses");
        Ok(match &args.category {
            Some(category) => req.with_param("category", category.as_str()),
            None => req,
        })
    }

    fn provides(_: &CourseFilter) -> Vec<Tag> {
        vec![Tag::all(TagKind::Courses)]
    }
}

pub struct GetCourse;

impl Endpoint for GetCourse {
    const NAME: &'static str = "getCourse";
    const KIND: EndpointKind = EndpointKind::Query;
    type Args = String;
    type Output = Course;

    fn request(id: &String) -> Result<HttpRequest, ApiError> {
        Ok(HttpRequest::new(HttpMethod::Get, format!("courses/{id}")))
    }

    fn provides(id: &String) -> Vec<Tag> {
        vec![Tag::with_id(TagKind::Courses, id.as_str())]
    }
}

pub struct CreateCourse;

impl Endpoint for CreateCourse {
    const NAME: &'static str = "createCourse";
    const KIND: EndpointKind = EndpointKind::Mutation;
    type Args = NewCourse;
    type Output = Course;

    fn request(args: &NewCourse) -> Result<HttpRequest, ApiError> {
        Ok(HttpRequest::new(HttpMethod::Post, "courses").with_json_body(json_body(args)?))
    }

    fn invalidates(_: &NewCourse) -> Vec<Tag> {
        vec![Tag::all(TagKind::Courses)]
    }
}

pub struct UpdateCourse;

impl Endpoint for UpdateCourse {
    const NAME: &'static str = "updateCourse";
    const KIND: EndpointKind = EndpointKind::Mutation;
    type Args = UpdateCourseArgs;
    type Output = Course;

    fn request(args: &UpdateCourseArgs) -> Result<HttpRequest, ApiError> {
        Ok(HttpRequest::new(HttpMethod::Put, format!("courses/{}", args.course_id))
            .with_json_body(json_body(&args.changes)?))
    }

    fn invalidates(args: &UpdateCourseArgs) -> Vec<Tag> {
        vec![Tag::with_id(TagKind::Courses, args.course_id.as_str())]
    }
}

pub struct DeleteCourse;

impl Endpoint for DeleteCourse {
    const NAME: &'static str = "deleteCourse";
    const KIND: EndpointKind = EndpointKind::Mutation;
    type Args = String;
    /// The backend answers with a bare `{ "message": ... }`.
    type Output = Value;

    fn request(id: &String) -> Result<HttpRequest, ApiError> {
        Ok(HttpRequest::new(HttpMethod::Delete, format!("courses/{id}")))
    }

    fn invalidates(_: &String) -> Vec<Tag> {
        vec![Tag::all(TagKind::Courses)]
    }
}

pub struct GetUploadVideoUrl;

impl Endpoint for GetUploadVideoUrl {
    const NAME: &'static str = "getUploadVideoUrl";
    const KIND: EndpointKind = EndpointKind::Mutation;
    type Args = UploadVideoArgs;
    type Output = UploadUrl;

    fn request(args: &UploadVideoArgs) -> Result<HttpRequest, ApiError> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Body<'a> {
            file_name: &'a str,
            file_type: &'a str,
        }
        let path = format!(
            "courses/{}/sections/{}/chapters/{}/get-upload-url",
            args.course_id, args.section_id, args.chapter_id
        );
        let body = json_body(&Body {
            file_name: &args.file_name,
            file_type: &args.file_type,
        })?;
        Ok(HttpRequest::new(HttpMethod::Post, path).with_json_body(body))
    }
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

pub struct GetTransactions;

impl Endpoint for GetTransactions {
    const NAME: &'static str = "getTransactions";
    const KIND: EndpointKind = EndpointKind::Query;
    type Args = String;
    type Output = Vec<Transaction>;

    fn request(user_id: &String) -> Result<HttpRequest, ApiError> {
        Ok(HttpRequest::new(HttpMethod::Get, "transactions").with_param("userId", user_id.as_str()))
    }
}

pub struct CreateStripePaymentIntent;

impl Endpoint for CreateStripePaymentIntent {
    const NAME: &'static str = "createStripePaymentIntent";
    const KIND: EndpointKind = EndpointKind::Mutation;
    type Args = PaymentIntentArgs;
    type Output = PaymentIntent;

    fn request(args: &PaymentIntentArgs) -> Result<HttpRequest, ApiError> {
        Ok(HttpRequest::new(HttpMethod::Post, "transactions/stripe/payment-intent")
            .with_json_body(json_body(args)?))
    }
}

pub struct CreateTransaction;

impl Endpoint for CreateTransaction {
    const NAME: &'static str = "createTransaction";
    const KIND: EndpointKind = EndpointKind::Mutation;
    type Args = Transaction;
    type Output = Transaction;

    fn request(args: &Transaction) -> Result<HttpRequest, ApiError> {
        Ok(HttpRequest::new(HttpMethod::Post, "transactions").with_json_body(json_body(args)?))
    }
}

// ---------------------------------------------------------------------------
// Course progress
// ---------------------------------------------------------------------------

pub struct GetUserEnrolledCourses;

impl Endpoint for GetUserEnrolledCourses {
    const NAME: &'static str = "getUserEnrolledCourses";
    const KIND: EndpointKind = EndpointKind::Query;
    type Args = String;
    type Output = Vec<Course>;

    fn request(user_id: &String) -> Result<HttpRequest, ApiError> {
        Ok(HttpRequest::new(
            HttpMethod::Get,
            format!("users/course-progress/{user_id}/enrolled-courses"),
        ))
    }

    fn provides(_: &String) -> Vec<Tag> {
        vec![Tag::all(TagKind::Courses), Tag::all(TagKind::UserCourseProgress)]
    }
}

pub struct GetUserCourseProgress;

impl Endpoint for GetUserCourseProgress {
    const NAME: &'static str = "getUserCourseProgress";
    const KIND: EndpointKind = EndpointKind::Query;
    type Args = CourseProgressKey;
    type Output = UserCourseProgress;

    fn request(key: &CourseProgressKey) -> Result<HttpRequest, ApiError> {
        Ok(HttpRequest::new(
            HttpMethod::Get,
            format!("users/course-progress/{}/courses/{}", key.user_id, key.course_id),
        ))
    }

    fn provides(_: &CourseProgressKey) -> Vec<Tag> {
        vec![Tag::all(TagKind::UserCourseProgress)]
    }
}

pub struct UpdateUserCourseProgress;

impl Endpoint for UpdateUserCourseProgress {
    const NAME: &'static str = "updateUserCourseProgress";
    const KIND: EndpointKind = EndpointKind::Mutation;
    type Args = UpdateProgressArgs;
    type Output = UserCourseProgress;

    fn request(args: &UpdateProgressArgs) -> Result<HttpRequest, ApiError> {
        Ok(HttpRequest::new(
            HttpMethod::Put,
            format!("users/course-progress/{}/courses/{}", args.user_id, args.course_id),
        )
        .with_json_body(json_body(&args.progress_data)?))
    }

    fn invalidates(_: &UpdateProgressArgs) -> Vec<Tag> {
        vec![Tag::all(TagKind::UserCourseProgress)]
    }

    fn optimistic(args: &UpdateProgressArgs) -> Result<Option<OptimisticPatch>, ApiError> {
        let target = GetUserCourseProgress::cache_key(&args.key())?;
        OptimisticPatch::new(target)
            .set("sections", &args.progress_data.sections)
            .map(Some)
    }
}
