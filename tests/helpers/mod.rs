#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
pub(crate) use axum_test::TestServer;
use group_assignments_server::model::{Block, Community, Course, Lesson, OrgScope, Role, User};
use group_assignments_server::notify::{NotificationKind, NotificationSink};
use group_assignments_server::service::{GroupAssignmentService, ServiceConfig};
use group_assignments_server::store::MemoryStore;
use group_assignments_server::{SharedService, init_test_router};
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

// test infra setup

pub struct TestEnv {
    pub server: TestServer,
    pub service: SharedService,
    pub store: Arc<MemoryStore>,
    pub sink: Arc<RecordingSink>,
}

pub async fn setup_test_environment() -> TestEnv {
    setup_test_environment_with(ServiceConfig::default()).await
}

pub async fn setup_test_environment_with(config: ServiceConfig) -> TestEnv {
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(RecordingSink::default());
    let service = Arc::new(
        GroupAssignmentService::with_store(store.clone(), config).with_notifier(sink.clone()),
    );
    let app: Router = init_test_router(service.clone());
    let server = TestServer::new(app).expect("Failed to create TestServer");
    TestEnv {
        server,
        service,
        store,
        sink,
    }
}

/// Config with a small group capacity so limits are easy to reach.
pub fn small_groups(max_members: i32) -> ServiceConfig {
    ServiceConfig {
        default_group_capacity: max_members,
        ..ServiceConfig::default()
    }
}

// notification sinks

#[derive(Default)]
pub struct RecordingSink {
    pub sent: Mutex<Vec<(Vec<Uuid>, NotificationKind, JsonValue)>>,
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(
        &self,
        user_ids: &[Uuid],
        kind: NotificationKind,
        payload: JsonValue,
    ) -> anyhow::Result<()> {
        self.sent
            .lock()
            .await
            .push((user_ids.to_vec(), kind, payload));
        Ok(())
    }
}

pub struct FailingSink;

#[async_trait]
impl NotificationSink for FailingSink {
    async fn notify(
        &self,
        _user_ids: &[Uuid],
        _kind: NotificationKind,
        _payload: JsonValue,
    ) -> anyhow::Result<()> {
        anyhow::bail!("mail relay unreachable")
    }
}

// seeding helpers

/// One school community with a course, a lesson and a single group assignment.
pub struct Classroom {
    pub school_id: Uuid,
    pub community: Community,
    pub course: Course,
    pub lesson: Lesson,
    pub assignment: Block,
}

pub async fn create_test_classroom(store: &MemoryStore, name: &str) -> Classroom {
    let school_id = Uuid::new_v4();
    let community = store
        .add_community(&format!("{} Community", name), Some(school_id), None)
        .await;
    let course = store.add_course(&format!("{} Course", name)).await;
    let lesson = store.add_lesson(course.id, &format!("{} Lesson", name), 0).await;
    let assignment =
        create_test_assignment(store, lesson.id, 0, &format!("{} Group Task", name)).await;
    Classroom {
        school_id,
        community,
        course,
        lesson,
        assignment,
    }
}

pub async fn create_test_assignment(
    store: &MemoryStore,
    lesson_id: Uuid,
    position: i32,
    title: &str,
) -> Block {
    store
        .add_block(
            lesson_id,
            position,
            "group-assignment",
            Some(json!({
                "title": title,
                "description": "Work together",
                "instructions": "Submit one document per group",
                "resources": [
                    { "id": "res-1", "type": "link", "title": "Brief", "url": "https://example.com/brief" }
                ]
            })),
        )
        .await
}

/// Learner with a community role, enrolled in the classroom's course.
pub async fn create_test_student(store: &MemoryStore, classroom: &Classroom, name: &str) -> User {
    let user = store
        .add_user(name, "Student", Some(classroom.community.id))
        .await;
    store
        .grant_role(
            user.id,
            Role::Learner,
            Some(OrgScope::Community(classroom.community.id)),
        )
        .await;
    store.enroll(classroom.course.id, user.id).await;
    user
}

pub async fn create_test_admin(store: &MemoryStore) -> User {
    let user = store.add_user("Ada", "Admin", None).await;
    store.grant_role(user.id, Role::Admin, None).await;
    user
}

pub async fn create_test_consultant(store: &MemoryStore, name: &str) -> User {
    let user = store.add_user(name, "Consultant", None).await;
    store.grant_role(user.id, Role::Consultant, None).await;
    user
}
