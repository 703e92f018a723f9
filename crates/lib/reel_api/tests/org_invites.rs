//! Integration tests — organization scope, invites and member management.

mod common;

use axum::http::{Method, StatusCode};
use common::{Session, TestApp};
use reel_core::mail::MailKind;
use reel_core::models::auth::Role;
use reel_core::store::MembershipStore;
use serde_json::json;
use uuid::Uuid;

struct Org {
    app: TestApp,
    id: Uuid,
    owner: Session,
}

async fn org_with_owner() -> Org {
    let app = TestApp::new();
    let owner = app.signup("owner@example.com").await;
    let id = Uuid::new_v4();
    assert!(
        app.store
            .add_member(id, owner.user_id, Role::Owner)
            .await
            .unwrap()
    );
    Org { app, id, owner }
}

impl Org {
    async fn invite(&self, by: &Session, email: &str, role: &str) -> common::TestResponse {
        self.app
            .call(
                Method::POST,
                &format!("/organizations/{}/invites", self.id),
                Some(&by.access_token),
                Some(json!({ "email": email, "role": role })),
            )
            .await
    }

    async fn accept(&self, by: &Session, token: &str) -> common::TestResponse {
        self.app
            .call(
                Method::POST,
                &format!("/organizations/{}/invites/accept", self.id),
                Some(&by.access_token),
                Some(json!({ "token": token })),
            )
            .await
    }

    /// Sign up `email` and bring them in with `role` through an invite.
    async fn join(&self, email: &str, role: &str) -> Session {
        assert_eq!(
            self.invite(&self.owner, email, role).await.status,
            StatusCode::CREATED
        );
        let token = self
            .app
            .mailer
            .last_token(MailKind::OrganizationInvite, email);
        let session = self.app.signup(email).await;
        assert_eq!(self.accept(&session, &token).await.status, StatusCode::OK);
        session
    }

    fn member_uri(&self, user_id: Uuid) -> String {
        format!("/organizations/{}/members/{user_id}", self.id)
    }
}

#[tokio::test]
async fn invite_accept_grants_membership() {
    let org = org_with_owner().await;

    let resp = org.invite(&org.owner, "New.Hire@Example.com", "admin").await;
    assert_eq!(resp.status, StatusCode::CREATED);
    assert_eq!(resp.body["email"], "new.hire@example.com");
    assert_eq!(resp.body["role"], "admin");
    assert_eq!(resp.body["invitedBy"], org.owner.user_id.to_string());
    assert!(resp.body.get("token").is_none());

    let sent = org.app.mailer.sent();
    let invite_mail = sent
        .iter()
        .find(|m| m.kind == MailKind::OrganizationInvite)
        .unwrap();
    assert!(invite_mail.link.starts_with(&format!(
        "https://app.reel.test/organizations/{}/invites/accept?token=",
        org.id
    )));

    let token = org
        .app
        .mailer
        .last_token(MailKind::OrganizationInvite, "new.hire@example.com");
    let hire = org.app.signup("new.hire@example.com").await;

    let accepted = org.accept(&hire, &token).await;
    assert_eq!(accepted.status, StatusCode::OK);
    assert_eq!(accepted.body["role"], "admin");
    assert_eq!(accepted.body["organizationId"], org.id.to_string());

    let me = org
        .app
        .call_in_org(
            Method::GET,
            "/me",
            &hire.access_token,
            &org.id.to_string(),
            None,
        )
        .await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["organization"]["role"], "admin");

    let reuse = org.accept(&hire, &token).await;
    assert_eq!(reuse.status, StatusCode::BAD_REQUEST);
    assert_eq!(reuse.error(), "invalid_or_expired");
}

#[tokio::test]
async fn emailed_invite_link_is_enough_to_join() {
    let org = org_with_owner().await;
    assert_eq!(
        org.invite(&org.owner, "linked@example.com", "member").await.status,
        StatusCode::CREATED
    );
    let message = org
        .app
        .mailer
        .sent()
        .into_iter()
        .find(|m| m.kind == MailKind::OrganizationInvite)
        .unwrap();
    let link = url::Url::parse(&message.link).unwrap();
    let token = link
        .query_pairs()
        .find(|(k, _)| k == "token")
        .map(|(_, v)| v.into_owned())
        .unwrap();

    let invitee = org.app.signup("linked@example.com").await;
    let accepted = org
        .app
        .call(
            Method::POST,
            link.path(),
            Some(&invitee.access_token),
            Some(json!({ "token": token })),
        )
        .await;
    assert_eq!(accepted.status, StatusCode::OK, "{}", accepted.body);
    assert_eq!(accepted.body["organizationId"], org.id.to_string());
    assert_eq!(accepted.body["userId"], invitee.user_id.to_string());
}

#[tokio::test]
async fn invite_requires_matching_email() {
    let org = org_with_owner().await;
    org.invite(&org.owner, "right@example.com", "member").await;
    let token = org
        .app
        .mailer
        .last_token(MailKind::OrganizationInvite, "right@example.com");

    let wrong = org.app.signup("wrong@example.com").await;
    let resp = org.accept(&wrong, &token).await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);

    // The invite was not burned by the wrong account.
    let right = org.app.signup("right@example.com").await;
    assert_eq!(org.accept(&right, &token).await.status, StatusCode::OK);
}

#[tokio::test]
async fn invite_token_is_bound_to_its_organization() {
    let org = org_with_owner().await;
    org.invite(&org.owner, "zed@example.com", "member").await;
    let token = org
        .app
        .mailer
        .last_token(MailKind::OrganizationInvite, "zed@example.com");
    let zed = org.app.signup("zed@example.com").await;

    let resp = org
        .app
        .call(
            Method::POST,
            &format!("/organizations/{}/invites/accept", Uuid::new_v4()),
            Some(&zed.access_token),
            Some(json!({ "token": token })),
        )
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error(), "invalid_or_expired");
}

#[tokio::test]
async fn reinviting_invalidates_the_earlier_link() {
    let org = org_with_owner().await;
    org.invite(&org.owner, "re@example.com", "member").await;
    let stale = org
        .app
        .mailer
        .last_token(MailKind::OrganizationInvite, "re@example.com");
    org.invite(&org.owner, "re@example.com", "member").await;
    let fresh = org
        .app
        .mailer
        .last_token(MailKind::OrganizationInvite, "re@example.com");

    let re = org.app.signup("re@example.com").await;
    assert_eq!(
        org.accept(&re, &stale).await.status,
        StatusCode::BAD_REQUEST
    );
    assert_eq!(org.accept(&re, &fresh).await.status, StatusCode::OK);
}

#[tokio::test]
async fn invites_expire_after_seven_days() {
    let org = org_with_owner().await;
    org.invite(&org.owner, "late@example.com", "member").await;
    let token = org
        .app
        .mailer
        .last_token(MailKind::OrganizationInvite, "late@example.com");

    org.app.clock.advance(chrono::Duration::days(7));
    let late = org.app.signup("late@example.com").await;
    let resp = org.accept(&late, &token).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error(), "invalid_or_expired");
}

#[tokio::test]
async fn only_owners_and_admins_manage_invites() {
    let org = org_with_owner().await;
    let member = org.join("member@example.com", "member").await;
    let admin = org.join("admin@example.com", "admin").await;

    let resp = org.invite(&member, "x@example.com", "member").await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);
    assert_eq!(resp.error(), "forbidden");

    let resp = org.invite(&admin, "y@example.com", "member").await;
    assert_eq!(resp.status, StatusCode::CREATED);

    let outsider = org.app.signup("outsider@example.com").await;
    let resp = org.invite(&outsider, "z@example.com", "member").await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);

    let list_uri = format!("/organizations/{}/invites", org.id);
    let resp = org
        .app
        .call(Method::GET, &list_uri, Some(&member.access_token), None)
        .await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn invites_cannot_grant_ownership() {
    let org = org_with_owner().await;
    let resp = org.invite(&org.owner, "boss@example.com", "owner").await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error(), "validation_error");
}

#[tokio::test]
async fn inviting_an_existing_member_conflicts() {
    let org = org_with_owner().await;
    org.join("in@example.com", "member").await;
    let resp = org.invite(&org.owner, "in@example.com", "admin").await;
    assert_eq!(resp.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn list_and_revoke_invites() {
    let org = org_with_owner().await;
    org.invite(&org.owner, "a@example.com", "member").await;
    let created = org.invite(&org.owner, "b@example.com", "admin").await;
    let invite_id = created.body["id"].as_str().unwrap().to_string();
    let token = org
        .app
        .mailer
        .last_token(MailKind::OrganizationInvite, "b@example.com");

    let list_uri = format!("/organizations/{}/invites", org.id);
    let listed = org
        .app
        .call(Method::GET, &list_uri, Some(&org.owner.access_token), None)
        .await;
    assert_eq!(listed.status, StatusCode::OK);
    assert_eq!(listed.body["invites"].as_array().unwrap().len(), 2);

    let revoke_uri = format!("{list_uri}/{invite_id}");
    let resp = org
        .app
        .call(Method::DELETE, &revoke_uri, Some(&org.owner.access_token), None)
        .await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);

    let resp = org
        .app
        .call(Method::DELETE, &revoke_uri, Some(&org.owner.access_token), None)
        .await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);

    let listed = org
        .app
        .call(Method::GET, &list_uri, Some(&org.owner.access_token), None)
        .await;
    let invites = listed.body["invites"].as_array().unwrap();
    assert_eq!(invites.len(), 1);
    assert_eq!(invites[0]["email"], "a@example.com");

    let b = org.app.signup("b@example.com").await;
    assert_eq!(org.accept(&b, &token).await.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn organization_header_scopes_requests() {
    let org = org_with_owner().await;
    let outsider = org.app.signup("solo@example.com").await;

    let bad = org
        .app
        .call_in_org(Method::GET, "/me", &outsider.access_token, "nope", None)
        .await;
    assert_eq!(bad.status, StatusCode::BAD_REQUEST);

    let not_member = org
        .app
        .call_in_org(
            Method::GET,
            "/me",
            &outsider.access_token,
            &org.id.to_string(),
            None,
        )
        .await;
    assert_eq!(not_member.status, StatusCode::FORBIDDEN);

    let owner_scope = org
        .app
        .call_in_org(
            Method::GET,
            "/me",
            &org.owner.access_token,
            &org.id.to_string(),
            None,
        )
        .await;
    assert_eq!(owner_scope.status, StatusCode::OK);
    assert_eq!(owner_scope.body["organization"]["id"], org.id.to_string());
    assert_eq!(owner_scope.body["organization"]["role"], "owner");

    let other_org = Uuid::new_v4();
    org.app
        .store
        .add_member(other_org, org.owner.user_id, Role::Owner)
        .await
        .unwrap();
    let mismatch = org
        .app
        .call_in_org(
            Method::GET,
            &format!("/organizations/{}/invites", org.id),
            &org.owner.access_token,
            &other_org.to_string(),
            None,
        )
        .await;
    assert_eq!(mismatch.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn owner_changes_roles_but_not_their_own() {
    let org = org_with_owner().await;
    let member = org.join("m@example.com", "member").await;

    let resp = org
        .app
        .call(
            Method::PATCH,
            &org.member_uri(member.user_id),
            Some(&org.owner.access_token),
            Some(json!({ "role": "admin" })),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["role"], "admin");

    let resp = org
        .app
        .call(
            Method::PATCH,
            &org.member_uri(org.owner.user_id),
            Some(&org.owner.access_token),
            Some(json!({ "role": "member" })),
        )
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error(), "validation_error");

    // Admins may not re-role anyone.
    let resp = org
        .app
        .call(
            Method::PATCH,
            &org.member_uri(org.owner.user_id),
            Some(&member.access_token),
            Some(json!({ "role": "member" })),
        )
        .await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn member_removal_rules() {
    let org = org_with_owner().await;
    let admin = org.join("adm@example.com", "admin").await;
    let member = org.join("mem@example.com", "member").await;
    let other = org.join("oth@example.com", "member").await;

    let resp = org
        .app
        .call(
            Method::DELETE,
            &org.member_uri(other.user_id),
            Some(&member.access_token),
            None,
        )
        .await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);

    let resp = org
        .app
        .call(
            Method::DELETE,
            &org.member_uri(org.owner.user_id),
            Some(&admin.access_token),
            None,
        )
        .await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);

    let resp = org
        .app
        .call(
            Method::DELETE,
            &org.member_uri(admin.user_id),
            Some(&admin.access_token),
            None,
        )
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);

    let resp = org
        .app
        .call(
            Method::DELETE,
            &org.member_uri(member.user_id),
            Some(&admin.access_token),
            None,
        )
        .await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);

    let resp = org
        .app
        .call(
            Method::DELETE,
            &org.member_uri(member.user_id),
            Some(&org.owner.access_token),
            None,
        )
        .await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);

    // The removed member no longer passes the organization gate.
    let resp = org
        .app
        .call(
            Method::GET,
            &format!("/organizations/{}/invites", org.id),
            Some(&member.access_token),
            None,
        )
        .await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn accepting_while_already_a_member_conflicts() {
    let org = org_with_owner().await;
    let twice = org.join("twice@example.com", "member").await;

    // Re-add the membership only after the invite exists, so the invite
    // endpoint's own membership check does not fire.
    org.app
        .store
        .remove_member(org.id, twice.user_id)
        .await
        .unwrap();
    org.invite(&org.owner, "twice@example.com", "admin").await;
    let token = org
        .app
        .mailer
        .last_token(MailKind::OrganizationInvite, "twice@example.com");
    org.app
        .store
        .add_member(org.id, twice.user_id, Role::Member)
        .await
        .unwrap();

    let resp = org.accept(&twice, &token).await;
    assert_eq!(resp.status, StatusCode::CONFLICT);
    assert_eq!(org.accept(&twice, &token).await.status, StatusCode::BAD_REQUEST);
}
