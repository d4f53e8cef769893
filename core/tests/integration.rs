//! Full client lifecycle against the live mock server.
//!
//! # Design
//! Starts the mock server on a random port, then exercises every endpoint
//! through the production pipeline (reqwest transport + response middleware).
//! Validates that request building, envelope unwrapping, notifications, and
//! tag invalidation work end-to-end with the actual server.

use course_client::endpoints::{
    CourseProgressKey, GetCourses, GetUserCourseProgress, UpdateCourseArgs, UpdateProgressArgs,
    UpdateUserArgs, UploadVideoArgs,
};
use course_client::types::{
    Chapter, ChapterProgress, ChapterType, CourseChanges, CourseStatus, NewCourse, ProgressUpdate,
    Section, SectionProgress, Transaction, UserChanges,
};
use course_client::{
    ApiError, ChannelNotifier, ClientConfig, CourseApi, FetchStatus, Notification, StaticToken,
};
use tokio::sync::mpsc::UnboundedReceiver;

async fn start_server() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { mock_server::run(listener).await });
    format!("http://{addr}")
}

fn drain(rx: &mut UnboundedReceiver<Notification>) -> Vec<Notification> {
    let mut seen = Vec::new();
    while let Ok(n) = rx.try_recv() {
        seen.push(n);
    }
    seen
}

fn progress(section: &str, chapter: &str, completed: bool) -> ProgressUpdate {
    ProgressUpdate {
        sections: vec![SectionProgress {
            section_id: section.to_string(),
            chapters: vec![ChapterProgress {
                chapter_id: chapter.to_string(),
                completed,
            }],
        }],
    }
}

#[tokio::test]
async fn course_lifecycle() {
    let base = start_server().await;
    let (notifier, mut toasts) = ChannelNotifier::new();
    let api = CourseApi::connect(
        &ClientConfig::new().with_base_url(&base),
        StaticToken("session-token".into()),
        notifier,
    );

    // Step 1: list, should be empty. Reads never toast.
    let courses = api.get_courses(None).await.unwrap();
    assert!(courses.is_empty());
    assert!(drain(&mut toasts).is_empty());
    let list = api.subscribe::<GetCourses>(&Default::default()).unwrap();

    // Step 2: create a draft course.
    let created = api
        .create_course(&NewCourse {
            teacher_id: "t1".into(),
            teacher_name: "Ada".into(),
        })
        .await
        .unwrap();
    assert_eq!(created.teacher_name, "Ada");
    assert_eq!(created.status, CourseStatus::Draft);
    assert_eq!(
        drain(&mut toasts),
        vec![Notification::Success("Course created successfully".into())]
    );
    let id = created.course_id.clone();

    // The subscribed list was refetched after the create invalidated Courses.
    assert_eq!(api.cache().status(list.key()), Some(FetchStatus::Fresh));
    assert_eq!(api.get_courses(None).await.unwrap().len(), 1);

    // Step 3: publish it with one section.
    let updated = api
        .update_course(&UpdateCourseArgs {
            course_id: id.clone(),
            changes: CourseChanges {
                title: Some("Rust for Web Developers".into()),
                category: Some("Programming".into()),
                status: Some(CourseStatus::Published),
                sections: Some(vec![Section {
                    section_id: "s1".into(),
                    section_title: "Basics".into(),
                    section_description: None,
                    chapters: vec![Chapter {
                        chapter_id: "ch1".into(),
                        chapter_type: ChapterType::Video,
                        title: "Ownership".into(),
                        content: String::new(),
                        video: None,
                    }],
                }]),
                ..Default::default()
            },
        })
        .await
        .unwrap();
    assert_eq!(updated.title, "Rust for Web Developers");
    assert_eq!(updated.sections.len(), 1);

    let fetched = api.get_course(&id).await.unwrap();
    assert_eq!(fetched, updated);
    let filtered = api.get_courses(Some("Programming")).await.unwrap();
    assert_eq!(filtered.len(), 1);
    assert!(api.get_courses(Some("Cooking")).await.unwrap().is_empty());

    // Step 4: upload URL and payment intent.
    let upload = api
        .get_upload_video_url(&UploadVideoArgs {
            course_id: id.clone(),
            section_id: "s1".into(),
            chapter_id: "ch1".into(),
            file_name: "ownership.mp4".into(),
            file_type: "video/mp4".into(),
        })
        .await
        .unwrap();
    assert!(upload.video_url.ends_with("ownership.mp4"));
    let intent = api.create_stripe_payment_intent(4999).await.unwrap();
    assert!(intent.client_secret.ends_with("_secret_4999"));

    // Step 5: purchase enrolls the user.
    let transaction = Transaction {
        user_id: "u1".into(),
        transaction_id: "pi_123".into(),
        date_time: "2024-05-01T10:00:00Z".into(),
        course_id: id.clone(),
        payment_provider: "stripe".into(),
        amount: Some(4999),
    };
    assert_eq!(api.create_transaction(&transaction).await.unwrap(), transaction);
    assert_eq!(api.get_transactions("u1").await.unwrap(), vec![transaction]);
    let enrolled = api.get_user_enrolled_courses("u1").await.unwrap();
    assert_eq!(enrolled.len(), 1);
    assert_eq!(enrolled[0].course_id, id);

    // Step 6: progress update is reflected and reconciled with the server.
    let key = CourseProgressKey {
        user_id: "u1".into(),
        course_id: id.clone(),
    };
    let before = api.get_user_course_progress(&key).await.unwrap();
    assert_eq!(before.overall_progress, 0.0);
    let _watch = api.subscribe::<GetUserCourseProgress>(&key).unwrap();
    drain(&mut toasts);

    let saved = api
        .update_user_course_progress(&UpdateProgressArgs {
            user_id: "u1".into(),
            course_id: id.clone(),
            progress_data: progress("s1", "ch1", true),
        })
        .await
        .unwrap();
    assert_eq!(saved.overall_progress, 100.0);
    let cached = api.cached::<GetUserCourseProgress>(&key).unwrap().unwrap();
    assert_eq!(cached.overall_progress, 100.0);
    assert!(cached.sections[0].chapters[0].completed);

    // Step 7: a rejected update reverts the optimistic patch and toasts the server message.
    let err = api
        .update_user_course_progress(&UpdateProgressArgs {
            user_id: "u1".into(),
            course_id: id.clone(),
            progress_data: progress("missing", "x", true),
        })
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(400));
    let cached = api.cached::<GetUserCourseProgress>(&key).unwrap().unwrap();
    assert_eq!(cached.sections, saved.sections);
    assert_eq!(
        drain(&mut toasts),
        vec![Notification::Error("Error: Unknown section missing".into())]
    );

    // Step 8: profile sync.
    let user = api
        .update_user(&UpdateUserArgs {
            user_id: "u1".into(),
            changes: UserChanges {
                first_name: Some("Ada".into()),
                public_metadata: Some(course_client::types::PublicMetadata {
                    user_type: course_client::types::UserType::Student,
                    settings: None,
                }),
                ..Default::default()
            },
        })
        .await
        .unwrap();
    assert_eq!(user.user_id, "u1");
    assert_eq!(user.first_name.as_deref(), Some("Ada"));

    // Step 9: delete, then get is a 404 with the server's message.
    let deleted = api.delete_course(&id).await.unwrap();
    assert_eq!(deleted["courseId"], id.as_str());
    drain(&mut toasts);
    let err = api.get_course(&id).await.unwrap_err();
    assert!(matches!(err, ApiError::Status { status: 404, .. }));
    assert_eq!(
        drain(&mut toasts),
        vec![Notification::Error("Error: Course not found".into())]
    );

    // Step 10: the subscribed list was refetched and is empty again.
    assert!(api
        .cached::<GetCourses>(&Default::default())
        .unwrap()
        .unwrap()
        .is_empty());
}
