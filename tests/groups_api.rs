use axum::http::StatusCode;
use group_assignments_server::errors::GroupError;
use group_assignments_server::model::{
    Group, GroupMember, Membership, OrgScope, Role, Submission, SubmissionStatus, UserSummary,
};
use group_assignments_server::notify::NotificationKind;
use group_assignments_server::payloads::groups::{
    AddMembersPayload, GetOrCreateGroupPayload, RemoveMemberPayload, SubmitWorkPayload,
};
use group_assignments_server::response::ApiResponse;
use group_assignments_server::service::{GroupAssignmentService, ServiceConfig};
use group_assignments_server::store::{InjectedFailure, MemoryStore};
use std::sync::Arc;
use uuid::Uuid;

mod helpers;
use helpers::{
    FailingSink, create_test_admin, create_test_classroom, create_test_student,
    setup_test_environment, setup_test_environment_with, small_groups,
};

fn join_payload(assignment_id: impl ToString, user_id: Uuid) -> GetOrCreateGroupPayload {
    GetOrCreateGroupPayload {
        assignment_id: assignment_id.to_string(),
        user_id,
    }
}

// get_or_create

#[tokio::test]
async fn test_get_or_create_group_is_idempotent() {
    let env = setup_test_environment().await;
    let classroom = create_test_classroom(&env.store, "Alpha").await;
    let ana = create_test_student(&env.store, &classroom, "Ana").await;
    let payload = join_payload(classroom.assignment.id, ana.id);

    let first = env.server.post("/groups/get_or_create").json(&payload).await;
    assert_eq!(first.status_code(), StatusCode::OK);
    let group = first.json::<ApiResponse<Group>>().data.unwrap();
    assert!(group.name.starts_with("Group "));
    assert_eq!(group.max_members, 8);
    assert_eq!(group.community_id, classroom.community.id);
    assert!(!group.is_consultant_managed);

    let second = env
        .server
        .post("/groups/get_or_create")
        .json(&payload)
        .await
        .json::<ApiResponse<Group>>()
        .data
        .unwrap();
    assert_eq!(second.id, group.id);
    assert_eq!(env.store.membership_count(ana.id, classroom.assignment.id).await, 1);
}

#[tokio::test]
async fn test_get_or_create_group_shared_by_community() {
    let env = setup_test_environment().await;
    let classroom = create_test_classroom(&env.store, "Alpha").await;
    let ana = create_test_student(&env.store, &classroom, "Ana").await;
    let ben = create_test_student(&env.store, &classroom, "Ben").await;

    let ana_group = env
        .server
        .post("/groups/get_or_create")
        .json(&join_payload(classroom.assignment.id, ana.id))
        .await
        .json::<ApiResponse<Group>>()
        .data
        .unwrap();
    let ben_group = env
        .server
        .post("/groups/get_or_create")
        .json(&join_payload(classroom.assignment.id, ben.id))
        .await
        .json::<ApiResponse<Group>>()
        .data
        .unwrap();

    assert_eq!(ana_group.id, ben_group.id);
    assert_eq!(env.store.group_size(ana_group.id).await, 2);
    assert_eq!(env.store.group_count(classroom.assignment.id).await, 1);
}

#[tokio::test]
async fn test_get_or_create_group_accepts_legacy_assignment_id() {
    let env = setup_test_environment().await;
    let classroom = create_test_classroom(&env.store, "Alpha").await;
    let ana = create_test_student(&env.store, &classroom, "Ana").await;

    let response = env
        .server
        .post("/groups/get_or_create")
        .json(&join_payload(
            format!("{}_block_0", classroom.lesson.id),
            ana.id,
        ))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let group = response.json::<ApiResponse<Group>>().data.unwrap();
    assert_eq!(group.assignment_id, classroom.assignment.id);
}

#[tokio::test]
async fn test_get_or_create_group_legacy_id_not_an_assignment() {
    let env = setup_test_environment().await;
    let classroom = create_test_classroom(&env.store, "Alpha").await;
    let ana = create_test_student(&env.store, &classroom, "Ana").await;
    env.store
        .add_block(classroom.lesson.id, 1, "text", None)
        .await;

    let response = env
        .server
        .post("/groups/get_or_create")
        .json(&join_payload(
            format!("{}_block_1", classroom.lesson.id),
            ana.id,
        ))
        .await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(env.store.group_count(classroom.assignment.id).await, 0);
}

#[tokio::test]
async fn test_get_or_create_group_malformed_assignment_id() {
    let env = setup_test_environment().await;
    let classroom = create_test_classroom(&env.store, "Alpha").await;
    let ana = create_test_student(&env.store, &classroom, "Ana").await;

    let response = env
        .server
        .post("/groups/get_or_create")
        .json(&join_payload("lesson-one_block_x", ana.id))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_or_create_group_consultant_managed() {
    let env = setup_test_environment().await;
    let classroom = create_test_classroom(&env.store, "Alpha").await;
    let ana = create_test_student(&env.store, &classroom, "Ana").await;
    env.store
        .set_consultant_managed(classroom.assignment.id, true)
        .await;

    let response = env
        .server
        .post("/groups/get_or_create")
        .json(&join_payload(classroom.assignment.id, ana.id))
        .await;

    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
    let body = response.json::<ApiResponse<()>>();
    assert!(body.status_message.contains("consultant"));
    assert_eq!(env.store.group_count(classroom.assignment.id).await, 0);
    assert_eq!(env.store.membership_count(ana.id, classroom.assignment.id).await, 0);
}

#[tokio::test]
async fn test_get_or_create_group_into_managed_group_is_forbidden() {
    let env = setup_test_environment().await;
    let classroom = create_test_classroom(&env.store, "Alpha").await;
    let admin = create_test_admin(&env.store).await;
    let ana = create_test_student(&env.store, &classroom, "Ana").await;
    let managed = env
        .service
        .create_consultant_group(
            admin.id,
            classroom.assignment.id,
            classroom.community.id,
            None,
            &[],
        )
        .await
        .unwrap();

    let response = env
        .server
        .post("/groups/get_or_create")
        .json(&join_payload(classroom.assignment.id, ana.id))
        .await;

    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(env.store.membership_count(ana.id, classroom.assignment.id).await, 0);
    assert_eq!(env.store.group_size(managed.group.id).await, 0);

    let direct = env
        .service
        .get_or_create_group(classroom.assignment.id, ana.id)
        .await;
    assert!(matches!(direct, Err(GroupError::ConsultantManaged)));
}

#[tokio::test]
async fn test_get_or_create_group_unknown_assignment_block() {
    let env = setup_test_environment().await;
    let classroom = create_test_classroom(&env.store, "Alpha").await;
    let ana = create_test_student(&env.store, &classroom, "Ana").await;
    let unknown = Uuid::new_v4();

    let response = env
        .server
        .post("/groups/get_or_create")
        .json(&join_payload(unknown, ana.id))
        .await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(env.store.group_count(unknown).await, 0);
    assert_eq!(env.store.membership_count(ana.id, unknown).await, 0);
}

#[tokio::test]
async fn test_get_or_create_group_without_community() {
    let env = setup_test_environment().await;
    let classroom = create_test_classroom(&env.store, "Alpha").await;
    let drifter = env.store.add_user("Dan", "Drifter", None).await;
    env.store.enroll(classroom.course.id, drifter.id).await;

    let response = env
        .server
        .post("/groups/get_or_create")
        .json(&join_payload(classroom.assignment.id, drifter.id))
        .await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(env.store.group_count(classroom.assignment.id).await, 0);
}

#[tokio::test]
async fn test_get_or_create_group_store_denies_access() {
    let env = setup_test_environment().await;
    let classroom = create_test_classroom(&env.store, "Alpha").await;
    let ana = create_test_student(&env.store, &classroom, "Ana").await;
    env.store
        .inject_failure(Some(InjectedFailure::PermissionDenied))
        .await;

    let response = env
        .server
        .post("/groups/get_or_create")
        .json(&join_payload(classroom.assignment.id, ana.id))
        .await;

    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_get_or_create_group_store_unavailable() {
    let env = setup_test_environment().await;
    let classroom = create_test_classroom(&env.store, "Alpha").await;
    let ana = create_test_student(&env.store, &classroom, "Ana").await;
    env.store
        .inject_failure(Some(InjectedFailure::Unavailable))
        .await;

    let response = env
        .server
        .post("/groups/get_or_create")
        .json(&join_payload(classroom.assignment.id, ana.id))
        .await;

    assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
}

// add_members

#[tokio::test]
async fn test_add_members_success() {
    let env = setup_test_environment().await;
    let classroom = create_test_classroom(&env.store, "Alpha").await;
    let ana = create_test_student(&env.store, &classroom, "Ana").await;
    let ben = create_test_student(&env.store, &classroom, "Ben").await;
    let cy = create_test_student(&env.store, &classroom, "Cy").await;
    let group = env
        .service
        .get_or_create_group(classroom.assignment.id, ana.id)
        .await
        .unwrap();

    let payload = AddMembersPayload {
        group_id: group.id,
        assignment_id: classroom.assignment.id.to_string(),
        user_ids: vec![ben.id, cy.id, ben.id],
        actor_id: ana.id,
    };
    let response = env.server.post("/groups/add_members").json(&payload).await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let added = response.json::<ApiResponse<Vec<Membership>>>().data.unwrap();
    let added_ids: Vec<Uuid> = added.iter().map(|m| m.user_id).collect();
    assert_eq!(added_ids, vec![ben.id, cy.id]);
    assert!(added.iter().all(|m| m.group_id == group.id));
    assert_eq!(env.store.group_size(group.id).await, 3);

    let sent = env.sink.sent.lock().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, vec![ben.id, cy.id]);
    assert_eq!(sent[0].1, NotificationKind::AddedToGroup);
    assert_eq!(sent[0].2["group_id"], group.id.to_string());
}

#[tokio::test]
async fn test_add_members_exceeds_capacity() {
    let env = setup_test_environment_with(small_groups(2)).await;
    let classroom = create_test_classroom(&env.store, "Alpha").await;
    let ana = create_test_student(&env.store, &classroom, "Ana").await;
    let ben = create_test_student(&env.store, &classroom, "Ben").await;
    let cy = create_test_student(&env.store, &classroom, "Cy").await;
    let group = env
        .service
        .get_or_create_group(classroom.assignment.id, ana.id)
        .await
        .unwrap();

    let payload = AddMembersPayload {
        group_id: group.id,
        assignment_id: classroom.assignment.id.to_string(),
        user_ids: vec![ben.id, cy.id],
        actor_id: ana.id,
    };
    let response = env.server.post("/groups/add_members").json(&payload).await;

    assert_eq!(response.status_code(), StatusCode::CONFLICT);
    let body = response.json::<ApiResponse<()>>();
    assert!(body.status_message.contains("at most 2 members"));
    assert_eq!(env.store.group_size(group.id).await, 1);
    assert!(env.sink.sent.lock().await.is_empty());
}

#[tokio::test]
async fn test_add_members_to_consultant_group_is_forbidden() {
    let env = setup_test_environment().await;
    let classroom = create_test_classroom(&env.store, "Alpha").await;
    let admin = create_test_admin(&env.store).await;
    let ana = create_test_student(&env.store, &classroom, "Ana").await;
    let ben = create_test_student(&env.store, &classroom, "Ben").await;
    let managed = env
        .service
        .create_consultant_group(
            admin.id,
            classroom.assignment.id,
            classroom.community.id,
            None,
            &[ana.id],
        )
        .await
        .unwrap();

    let payload = AddMembersPayload {
        group_id: managed.group.id,
        assignment_id: classroom.assignment.id.to_string(),
        user_ids: vec![ben.id],
        actor_id: ana.id,
    };
    let response = env.server.post("/groups/add_members").json(&payload).await;

    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(env.store.group_size(managed.group.id).await, 1);
    assert_eq!(env.store.membership_count(ben.id, classroom.assignment.id).await, 0);
}

#[tokio::test]
async fn test_add_members_requires_membership() {
    let env = setup_test_environment().await;
    let classroom = create_test_classroom(&env.store, "Alpha").await;
    let ana = create_test_student(&env.store, &classroom, "Ana").await;
    let ben = create_test_student(&env.store, &classroom, "Ben").await;
    let outsider = create_test_student(&env.store, &classroom, "Olga").await;
    let group = env
        .service
        .get_or_create_group(classroom.assignment.id, ana.id)
        .await
        .unwrap();

    let payload = AddMembersPayload {
        group_id: group.id,
        assignment_id: classroom.assignment.id.to_string(),
        user_ids: vec![ben.id],
        actor_id: outsider.id,
    };
    let response = env.server.post("/groups/add_members").json(&payload).await;

    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(env.store.group_size(group.id).await, 1);
}

#[tokio::test]
async fn test_add_members_by_admin() {
    let env = setup_test_environment().await;
    let classroom = create_test_classroom(&env.store, "Alpha").await;
    let admin = create_test_admin(&env.store).await;
    let ana = create_test_student(&env.store, &classroom, "Ana").await;
    let ben = create_test_student(&env.store, &classroom, "Ben").await;
    let group = env
        .service
        .get_or_create_group(classroom.assignment.id, ana.id)
        .await
        .unwrap();

    let added = env
        .service
        .add_members(group.id, classroom.assignment.id, &[ben.id], admin.id)
        .await
        .unwrap();

    assert_eq!(added.len(), 1);
    assert_eq!(env.store.group_size(group.id).await, 2);
}

#[tokio::test]
async fn test_add_members_already_grouped() {
    let env = setup_test_environment().await;
    let alpha = create_test_classroom(&env.store, "Alpha").await;
    let ana = create_test_student(&env.store, &alpha, "Ana").await;
    let ben = create_test_student(&env.store, &alpha, "Ben").await;
    let evening = env
        .store
        .add_community("Evening class", Some(alpha.school_id), None)
        .await;
    let eve = env.store.add_user("Eve", "Student", Some(evening.id)).await;
    env.store
        .grant_role(eve.id, Role::Learner, Some(OrgScope::Community(evening.id)))
        .await;

    let group = env
        .service
        .get_or_create_group(alpha.assignment.id, ana.id)
        .await
        .unwrap();
    let eve_group = env
        .service
        .get_or_create_group(alpha.assignment.id, eve.id)
        .await
        .unwrap();
    assert_ne!(group.id, eve_group.id);

    let payload = AddMembersPayload {
        group_id: group.id,
        assignment_id: alpha.assignment.id.to_string(),
        user_ids: vec![ben.id, eve.id],
        actor_id: ana.id,
    };
    let response = env.server.post("/groups/add_members").json(&payload).await;

    assert_eq!(response.status_code(), StatusCode::CONFLICT);
    assert_eq!(env.store.group_size(group.id).await, 1);
    assert_eq!(env.store.membership_count(ben.id, alpha.assignment.id).await, 0);
}

#[tokio::test]
async fn test_add_members_wrong_assignment() {
    let env = setup_test_environment().await;
    let classroom = create_test_classroom(&env.store, "Alpha").await;
    let other = create_test_classroom(&env.store, "Beta").await;
    let ana = create_test_student(&env.store, &classroom, "Ana").await;
    let ben = create_test_student(&env.store, &classroom, "Ben").await;
    let group = env
        .service
        .get_or_create_group(classroom.assignment.id, ana.id)
        .await
        .unwrap();

    let payload = AddMembersPayload {
        group_id: group.id,
        assignment_id: other.assignment.id.to_string(),
        user_ids: vec![ben.id],
        actor_id: ana.id,
    };
    let response = env.server.post("/groups/add_members").json(&payload).await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_add_members_survives_notification_failure() {
    let store = Arc::new(MemoryStore::new());
    let service = GroupAssignmentService::with_store(store.clone(), ServiceConfig::default())
        .with_notifier(Arc::new(FailingSink));
    let classroom = create_test_classroom(&store, "Alpha").await;
    let ana = create_test_student(&store, &classroom, "Ana").await;
    let ben = create_test_student(&store, &classroom, "Ben").await;
    let group = service
        .get_or_create_group(classroom.assignment.id, ana.id)
        .await
        .unwrap();

    let added = service
        .add_members(group.id, classroom.assignment.id, &[ben.id], ana.id)
        .await
        .unwrap();

    assert_eq!(added.len(), 1);
    assert_eq!(store.group_size(group.id).await, 2);
}

// remove_member

#[tokio::test]
async fn test_remove_member_success() {
    let env = setup_test_environment().await;
    let classroom = create_test_classroom(&env.store, "Alpha").await;
    let ana = create_test_student(&env.store, &classroom, "Ana").await;
    let ben = create_test_student(&env.store, &classroom, "Ben").await;
    let group = env
        .service
        .get_or_create_group(classroom.assignment.id, ana.id)
        .await
        .unwrap();
    env.service
        .get_or_create_group(classroom.assignment.id, ben.id)
        .await
        .unwrap();

    let payload = RemoveMemberPayload {
        group_id: group.id,
        user_id: ben.id,
    };
    let response = env.server.post("/groups/remove_member").json(&payload).await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<ApiResponse<bool>>().data, Some(true));
    assert_eq!(env.store.group_size(group.id).await, 1);
    assert_eq!(env.store.membership_count(ben.id, classroom.assignment.id).await, 0);

    let again = env.server.post("/groups/remove_member").json(&payload).await;
    assert_eq!(again.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_remove_member_from_consultant_group_is_forbidden() {
    let env = setup_test_environment().await;
    let classroom = create_test_classroom(&env.store, "Alpha").await;
    let admin = create_test_admin(&env.store).await;
    let ana = create_test_student(&env.store, &classroom, "Ana").await;
    let managed = env
        .service
        .create_consultant_group(
            admin.id,
            classroom.assignment.id,
            classroom.community.id,
            Some("Mentored".to_string()),
            &[ana.id],
        )
        .await
        .unwrap();

    let response = env
        .server
        .post("/groups/remove_member")
        .json(&RemoveMemberPayload {
            group_id: managed.group.id,
            user_id: ana.id,
        })
        .await;

    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(env.store.group_size(managed.group.id).await, 1);
}

#[tokio::test]
async fn test_remove_member_unknown_group() {
    let env = setup_test_environment().await;

    let response = env
        .server
        .post("/groups/remove_member")
        .json(&RemoveMemberPayload {
            group_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
        })
        .await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

// members

#[tokio::test]
async fn test_group_members() {
    let env = setup_test_environment().await;
    let classroom = create_test_classroom(&env.store, "Alpha").await;
    let ana = create_test_student(&env.store, &classroom, "Ana").await;
    let ben = create_test_student(&env.store, &classroom, "Ben").await;
    let group = env
        .service
        .get_or_create_group(classroom.assignment.id, ana.id)
        .await
        .unwrap();
    env.service
        .get_or_create_group(classroom.assignment.id, ben.id)
        .await
        .unwrap();

    let response = env
        .server
        .get(&format!("/groups/members?group_id={}", group.id))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let members = response.json::<ApiResponse<Vec<GroupMember>>>().data.unwrap();
    let names: Vec<&str> = members.iter().map(|m| m.full_name.as_str()).collect();
    assert_eq!(names, vec!["Ana Student", "Ben Student"]);
    assert!(members.iter().all(|m| m.role == "member"));
}

#[tokio::test]
async fn test_group_members_unknown_group() {
    let env = setup_test_environment().await;

    let response = env
        .server
        .get(&format!("/groups/members?group_id={}", Uuid::new_v4()))
        .await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

// submit

#[tokio::test]
async fn test_submit_work_by_member() {
    let env = setup_test_environment().await;
    let classroom = create_test_classroom(&env.store, "Alpha").await;
    let ana = create_test_student(&env.store, &classroom, "Ana").await;
    let ben = create_test_student(&env.store, &classroom, "Ben").await;
    let group = env
        .service
        .get_or_create_group(classroom.assignment.id, ana.id)
        .await
        .unwrap();
    env.service
        .get_or_create_group(classroom.assignment.id, ben.id)
        .await
        .unwrap();

    let payload = SubmitWorkPayload {
        assignment_id: classroom.assignment.id.to_string(),
        group_id: group.id,
        user_id: ana.id,
        content: Some("Draft".to_string()),
    };
    let first = env.server.post("/groups/submit").json(&payload).await;
    assert_eq!(first.status_code(), StatusCode::OK);
    let submission = first.json::<ApiResponse<Submission>>().data.unwrap();
    assert_eq!(submission.status(), SubmissionStatus::Submitted);
    assert!(submission.submitted_at.is_some());

    let resubmitted = env
        .server
        .post("/groups/submit")
        .json(&SubmitWorkPayload {
            content: Some("Final".to_string()),
            user_id: ben.id,
            ..payload
        })
        .await
        .json::<ApiResponse<Submission>>()
        .data
        .unwrap();
    assert_eq!(resubmitted.id, submission.id);
    assert_eq!(resubmitted.content.as_deref(), Some("Final"));
    assert_eq!(resubmitted.user_id, ben.id);

    let sent = env.sink.sent.lock().await;
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].0, vec![ben.id]);
    assert_eq!(sent[0].1, NotificationKind::SubmissionReceived);
    assert_eq!(sent[1].0, vec![ana.id]);
}

#[tokio::test]
async fn test_submit_work_by_non_member() {
    let env = setup_test_environment().await;
    let classroom = create_test_classroom(&env.store, "Alpha").await;
    let ana = create_test_student(&env.store, &classroom, "Ana").await;
    let outsider = env.store.add_user("Olga", "Outsider", None).await;
    let group = env
        .service
        .get_or_create_group(classroom.assignment.id, ana.id)
        .await
        .unwrap();

    let response = env
        .server
        .post("/groups/submit")
        .json(&SubmitWorkPayload {
            assignment_id: classroom.assignment.id.to_string(),
            group_id: group.id,
            user_id: outsider.id,
            content: None,
        })
        .await;

    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
    let submissions = env
        .service
        .list_assignments_for_user(ana.id)
        .await
        .assignments;
    assert_eq!(submissions[0].status, SubmissionStatus::Pending);
}

// eligible_classmates

#[tokio::test]
async fn test_eligible_classmates() {
    let env = setup_test_environment().await;
    let alpha = create_test_classroom(&env.store, "Alpha").await;
    let beta = create_test_classroom(&env.store, "Beta").await;
    let ana = create_test_student(&env.store, &alpha, "Ana").await;
    let ben = create_test_student(&env.store, &alpha, "Ben").await;
    let cy = create_test_student(&env.store, &alpha, "Cy").await;
    let grouped = create_test_student(&env.store, &alpha, "Gus").await;
    let elsewhere = create_test_student(&env.store, &beta, "Bo").await;
    env.store.enroll(alpha.course.id, elsewhere.id).await;
    let dropped = env
        .store
        .add_user("Dora", "Student", Some(alpha.community.id))
        .await;
    env.store
        .grant_role(
            dropped.id,
            Role::Learner,
            Some(OrgScope::Community(alpha.community.id)),
        )
        .await;
    env.store
        .enroll_with_status(alpha.course.id, dropped.id, "dropped")
        .await;
    env.service
        .get_or_create_group(alpha.assignment.id, grouped.id)
        .await
        .unwrap();

    let response = env
        .server
        .get(&format!(
            "/groups/eligible_classmates?assignment_id={}&user_id={}",
            alpha.assignment.id, ana.id
        ))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let classmates = response.json::<ApiResponse<Vec<UserSummary>>>().data.unwrap();
    let mut ids: Vec<Uuid> = classmates.iter().map(|c| c.id).collect();
    ids.sort();
    let mut expected = vec![ben.id, cy.id];
    expected.sort();
    assert_eq!(ids, expected);
    assert!(!ids.contains(&ana.id));
    assert!(!ids.contains(&grouped.id));
    assert!(!ids.contains(&elsewhere.id));
    assert!(!ids.contains(&dropped.id));
}

#[tokio::test]
async fn test_eligible_classmates_requires_group_membership() {
    let env = setup_test_environment().await;
    let classroom = create_test_classroom(&env.store, "Alpha").await;
    let ana = create_test_student(&env.store, &classroom, "Ana").await;
    let ben = create_test_student(&env.store, &classroom, "Ben").await;
    let group = env
        .service
        .get_or_create_group(classroom.assignment.id, ana.id)
        .await
        .unwrap();

    let response = env
        .server
        .get(&format!(
            "/groups/eligible_classmates?assignment_id={}&user_id={}&group_id={}",
            classroom.assignment.id, ben.id, group.id
        ))
        .await;

    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_eligible_classmates_without_school() {
    let env = setup_test_environment().await;
    let classroom = create_test_classroom(&env.store, "Alpha").await;
    let nowhere = env.store.add_community("Nowhere", None, None).await;
    let nomad = env.store.add_user("Nia", "Nomad", Some(nowhere.id)).await;
    env.store
        .grant_role(nomad.id, Role::Learner, Some(OrgScope::Community(nowhere.id)))
        .await;
    env.store.enroll(classroom.course.id, nomad.id).await;
    create_test_student(&env.store, &classroom, "Ben").await;

    let response = env
        .server
        .get(&format!(
            "/groups/eligible_classmates?assignment_id={}&user_id={}",
            classroom.assignment.id, nomad.id
        ))
        .await;

    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
}

// concurrency

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_get_or_create_for_one_user() {
    let env = setup_test_environment().await;
    let classroom = create_test_classroom(&env.store, "Alpha").await;
    let ana = create_test_student(&env.store, &classroom, "Ana").await;

    let user_id = ana.id;
    let handles: Vec<_> = (0..16)
        .map(|_| {
            let service = env.service.clone();
            let assignment_id = classroom.assignment.id;
            tokio::spawn(async move { service.get_or_create_group(assignment_id, user_id).await })
        })
        .collect();

    let mut group_ids = Vec::new();
    for handle in handles {
        group_ids.push(handle.await.unwrap().unwrap().id);
    }

    group_ids.dedup();
    assert_eq!(group_ids.len(), 1);
    assert_eq!(env.store.membership_count(ana.id, classroom.assignment.id).await, 1);
    assert_eq!(env.store.group_count(classroom.assignment.id).await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_get_or_create_for_one_community() {
    let env = setup_test_environment().await;
    let classroom = create_test_classroom(&env.store, "Alpha").await;
    let mut students = Vec::new();
    for i in 0..6 {
        students.push(create_test_student(&env.store, &classroom, &format!("Student{}", i)).await);
    }

    let handles: Vec<_> = students
        .iter()
        .map(|student| {
            let service = env.service.clone();
            let assignment_id = classroom.assignment.id;
            let user_id = student.id;
            tokio::spawn(async move { service.get_or_create_group(assignment_id, user_id).await })
        })
        .collect();

    let mut group_ids = Vec::new();
    for handle in handles {
        group_ids.push(handle.await.unwrap().unwrap().id);
    }

    group_ids.dedup();
    assert_eq!(group_ids.len(), 1);
    assert_eq!(env.store.group_count(classroom.assignment.id).await, 1);
    assert_eq!(env.store.group_size(group_ids[0]).await, 6);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_add_members_respects_capacity() {
    let env = setup_test_environment_with(small_groups(3)).await;
    let classroom = create_test_classroom(&env.store, "Alpha").await;
    let ana = create_test_student(&env.store, &classroom, "Ana").await;
    let group = env
        .service
        .get_or_create_group(classroom.assignment.id, ana.id)
        .await
        .unwrap();
    let mut invitees = Vec::new();
    for i in 0..6 {
        invitees.push(create_test_student(&env.store, &classroom, &format!("Invitee{}", i)).await);
    }

    let actor_id = ana.id;
    let handles: Vec<_> = invitees
        .iter()
        .map(|invitee| {
            let service = env.service.clone();
            let assignment_id = classroom.assignment.id;
            let group_id = group.id;
            let user_id = invitee.id;
            tokio::spawn(async move {
                service
                    .add_members(group_id, assignment_id, &[user_id], actor_id)
                    .await
            })
        })
        .collect();

    let mut added = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => added += 1,
            Err(GroupError::CapacityExceeded { max_members }) => {
                assert_eq!(max_members, 3);
                rejected += 1;
            }
            Err(e) => panic!("unexpected error: {:?}", e),
        }
    }

    assert_eq!(added, 2);
    assert_eq!(rejected, 4);
    assert_eq!(env.store.group_size(group.id).await, 3);
}
