use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode, header};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tower::ServiceExt;

use calshare_core::Store;
use calshare_core::config::ServerConfig;
use calshare_core::mailer::{OutboxMailer, token_from_message};
use calshare_server::{AppState, router};

struct TestApp {
    app: Router,
    outbox: Arc<OutboxMailer>,
}

impl TestApp {
    fn new() -> Self {
        let config = ServerConfig::from_toml(
            "client_url = \"http://client.test\"\n\
             [token]\nsecret = \"0123456789abcdef0123456789abcdef\"\n",
        )
        .unwrap();
        let outbox = Arc::new(OutboxMailer::new());
        let state = AppState::new(&config, Store::open_in_memory().unwrap(), outbox.clone()).unwrap();

        TestApp {
            app: router(state),
            outbox,
        }
    }

    async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let response = self.send(method, uri, token, &[], body).await;
        let status = response.status();
        (status, json_body(response).await)
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        headers: &[(header::HeaderName, &str)],
        body: Option<Value>,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        for (name, value) in headers {
            builder = builder.header(name.clone(), *value);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        self.app.clone().oneshot(request).await.unwrap()
    }

    async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, Some(token), None).await
    }

    async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    async fn delete(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.request(Method::DELETE, uri, Some(token), None).await
    }

    async fn register(&self, login: &str) -> i64 {
        let (status, user) = self
            .post(
                "/auth/register",
                None,
                json!({
                    "login": login,
                    "email": format!("{login}@example.com"),
                    "password": "password123"
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{user}");
        user["id"].as_i64().unwrap()
    }

    /// Register, confirm the emailed link and log in; returns (user id, access token).
    async fn signup(&self, login: &str) -> (i64, String) {
        let id = self.register(login).await;

        let (status, _) = self
            .request(
                Method::POST,
                &format!("/auth/confirm-email/{}", self.last_token()),
                None,
                None,
            )
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, session) = self
            .post(
                "/auth/login",
                None,
                json!({ "login": login, "password": "password123" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{session}");

        (id, session["accessToken"].as_str().unwrap().to_string())
    }

    async fn create_calendar(&self, token: &str, name: &str) -> i64 {
        let (status, calendar) = self
            .post("/calendars", Some(token), json!({ "name": name }))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        calendar["id"].as_i64().unwrap()
    }

    async fn create_event(&self, token: &str, calendar_id: i64, name: &str, kind: &str) -> i64 {
        let (status, event) = self
            .post(
                &format!("/calendars/{calendar_id}/events"),
                Some(token),
                json!({
                    "name": name,
                    "startAt": "2025-03-01T10:00:00Z",
                    "endAt": "2025-03-01T11:00:00Z",
                    "type": kind
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{event}");
        event["id"].as_i64().unwrap()
    }

    fn last_token(&self) -> String {
        let sent = self.outbox.sent();
        token_from_message(sent.last().unwrap()).unwrap().to_string()
    }

    /// Invite `login` to the calendar and confirm the emailed token.
    async fn join_calendar(&self, owner_token: &str, calendar_id: i64, login: &str) {
        let (status, _) = self
            .post(
                &format!("/calendars/{calendar_id}/invite"),
                Some(owner_token),
                json!({ "email": format!("{login}@example.com") }),
            )
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = self
            .request(
                Method::POST,
                &format!("/calendars/invite-confirm/{}", self.last_token()),
                None,
                None,
            )
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }
}

async fn json_body(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    }
}

/// The `name=value` pair of the refresh cookie set by a response.
fn refresh_cookie(response: &Response<Body>) -> String {
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

fn ids(list: &Value) -> Vec<i64> {
    list.as_array()
        .unwrap()
        .iter()
        .map(|item| item["id"].as_i64().unwrap())
        .collect()
}

#[tokio::test]
async fn register_login_and_me() {
    let app = TestApp::new();
    let (id, token) = app.signup("alice").await;

    let (status, me) = app.get("/auth/me", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me, json!({ "id": id, "login": "alice", "email": "alice@example.com" }));

    let (status, _) = app
        .post(
            "/auth/register",
            None,
            json!({ "login": "alice", "email": "other@example.com", "password": "password123" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .post(
            "/auth/login",
            None,
            json!({ "login": "alice@example.com", "password": "wrong-password" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn requires_bearer_token() {
    let app = TestApp::new();

    let (status, body) = app.request(Method::GET, "/calendars", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let (status, _) = app.get("/calendars", "not.a.token").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn invite_round_trip() {
    let app = TestApp::new();
    let (_, alice) = app.signup("alice").await;
    let (bob_id, bob) = app.signup("bobby").await;
    let calendar = app.create_calendar(&alice, "Team calendar").await;

    let (status, _) = app
        .post(
            &format!("/calendars/{calendar}/invite"),
            Some(&alice),
            json!({ "email": "bobby@example.com" }),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let sent = app.outbox.sent();
    let invite = sent.last().unwrap();
    assert_eq!(invite.to, "bobby@example.com");
    assert!(invite.text.contains("http://client.test/calendars/invite-confirm/"));

    // Pending invitees do not see the calendar yet.
    let (_, listed) = app.get("/calendars", &bob).await;
    assert!(ids(&listed).is_empty());

    let (_, invited) = app.get(&format!("/calendars/{calendar}/invited"), &alice).await;
    assert_eq!(invited[0]["isConfirmed"], json!(false));

    let (status, _) = app
        .request(
            Method::POST,
            &format!("/calendars/invite-confirm/{}", app.last_token()),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, invited) = app.get(&format!("/calendars/{calendar}/invited"), &alice).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        invited,
        json!([{
            "id": bob_id,
            "login": "bobby",
            "email": "bobby@example.com",
            "role": "moderator",
            "isConfirmed": true
        }])
    );

    let (_, listed) = app.get("/calendars", &bob).await;
    assert_eq!(ids(&listed), vec![calendar]);
    assert_eq!(listed[0]["role"], json!("moderator"));

    let (_, not_invited) = app.get(&format!("/calendars/{calendar}/not-invited"), &alice).await;
    assert!(ids(&not_invited).is_empty());
}

#[tokio::test]
async fn only_admin_can_share() {
    let app = TestApp::new();
    let (_, alice) = app.signup("alice").await;
    let (_, bob) = app.signup("bobby").await;
    app.signup("carol").await;
    let calendar = app.create_calendar(&alice, "Team calendar").await;
    app.join_calendar(&alice, calendar, "bobby").await;
    let emails_before = app.outbox.sent().len();

    let (status, _) = app
        .post(
            &format!("/calendars/{calendar}/invite"),
            Some(&bob),
            json!({ "email": "carol@example.com" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(app.outbox.sent().len(), emails_before);

    let (_, not_invited) = app.get(&format!("/calendars/{calendar}/not-invited"), &alice).await;
    assert_eq!(not_invited.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn duplicate_invite_conflicts() {
    let app = TestApp::new();
    let (_, alice) = app.signup("alice").await;
    app.signup("bobby").await;
    let calendar = app.create_calendar(&alice, "Team calendar").await;
    let invite = json!({ "email": "bobby@example.com" });
    let emails_before = app.outbox.sent().len();

    let (status, _) = app
        .post(&format!("/calendars/{calendar}/invite"), Some(&alice), invite.clone())
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = app
        .post(&format!("/calendars/{calendar}/invite"), Some(&alice), invite)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], json!("This user already has access to the calendar."));
    assert_eq!(app.outbox.sent().len(), emails_before + 1);
}

#[tokio::test]
async fn invalid_confirm_token_is_bad_request() {
    let app = TestApp::new();

    for path in ["/calendars/invite-confirm/garbage", "/events/invite-confirm/garbage"] {
        let (status, body) = app.request(Method::POST, path, None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], json!("The confirm token is invalid."));
    }
}

#[tokio::test]
async fn confirming_calendar_enrolls_into_existing_events() {
    let app = TestApp::new();
    let (_, alice) = app.signup("alice").await;
    let (_, bob) = app.signup("bobby").await;
    let calendar = app.create_calendar(&alice, "Team calendar").await;
    let first = app.create_event(&alice, calendar, "Planning", "task").await;
    let second = app.create_event(&alice, calendar, "Retro day", "reminder").await;

    app.join_calendar(&alice, calendar, "bobby").await;

    let (status, events) = app.get(&format!("/calendars/{calendar}/events"), &bob).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&events), vec![first, second]);
    assert_eq!(events[0]["role"], json!("guest"));
    assert_eq!(events[0]["calendarId"], json!(calendar));

    let (_, tasks) = app.get("/events?types=task", &bob).await;
    assert_eq!(ids(&tasks), vec![first]);
}

#[tokio::test]
async fn new_events_fan_out_to_confirmed_members() {
    let app = TestApp::new();
    let (_, alice) = app.signup("alice").await;
    let (_, bob) = app.signup("bobby").await;
    let calendar = app.create_calendar(&alice, "Team calendar").await;
    app.join_calendar(&alice, calendar, "bobby").await;

    // Moderators may create events; the owner becomes a guest on them.
    let event = app.create_event(&bob, calendar, "Bob's sync", "arrangement").await;

    let (_, events) = app.get(&format!("/events?calendars={calendar}"), &alice).await;
    assert_eq!(ids(&events), vec![event]);
    assert_eq!(events[0]["role"], json!("guest"));
    assert_eq!(events[0]["color"], json!("#7399F2"));
}

#[tokio::test]
async fn deleting_calendar_removes_its_events() {
    let app = TestApp::new();
    let (_, alice) = app.signup("alice").await;
    let calendar = app.create_calendar(&alice, "Team calendar").await;
    let event = app.create_event(&alice, calendar, "Planning", "task").await;

    let (status, deleted) = app.delete(&format!("/calendars/{calendar}"), &alice).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted["id"], json!(calendar));

    let (status, _) = app.get(&format!("/calendars/{calendar}"), &alice).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.get(&format!("/events/{event}/invited"), &alice).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn guest_delete_only_leaves_event() {
    let app = TestApp::new();
    let (_, alice) = app.signup("alice").await;
    let (bob_id, bob) = app.signup("bobby").await;
    let calendar = app.create_calendar(&alice, "Team calendar").await;
    app.join_calendar(&alice, calendar, "bobby").await;
    let event = app.create_event(&alice, calendar, "Planning", "task").await;

    let (_, members) = app.get(&format!("/events/{event}/invited"), &alice).await;
    assert_eq!(ids(&members), vec![bob_id]);

    let (status, _) = app
        .delete(&format!("/calendars/{calendar}/events/{event}"), &bob)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, members) = app.get(&format!("/events/{event}/invited"), &alice).await;
    assert!(ids(&members).is_empty());
    let (_, events) = app.get(&format!("/calendars/{calendar}/events"), &alice).await;
    assert_eq!(ids(&events), vec![event]);

    // The admin's delete removes the event for everyone.
    let (status, _) = app
        .delete(&format!("/calendars/{calendar}/events/{event}"), &alice)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, events) = app.get(&format!("/calendars/{calendar}/events"), &alice).await;
    assert!(ids(&events).is_empty());
}

#[tokio::test]
async fn event_invite_links_into_chosen_calendar() {
    let app = TestApp::new();
    let (_, alice) = app.signup("alice").await;
    let (_, bob) = app.signup("bobby").await;
    let alice_calendar = app.create_calendar(&alice, "Alice calendar").await;
    let bob_calendar = app.create_calendar(&bob, "Bob calendar").await;
    let event = app.create_event(&alice, alice_calendar, "Offsite", "arrangement").await;

    let (status, _) = app
        .post(
            &format!("/events/{event}/invite"),
            Some(&alice),
            json!({ "email": "bobby@example.com", "calendarId": bob_calendar }),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(app.outbox.sent().last().unwrap().text.contains("/events/invite-confirm/"));

    let (_, events) = app.get(&format!("/calendars/{bob_calendar}/events"), &bob).await;
    assert!(ids(&events).is_empty());

    let (status, _) = app
        .request(
            Method::POST,
            &format!("/events/invite-confirm/{}", app.last_token()),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, events) = app.get(&format!("/calendars/{bob_calendar}/events"), &bob).await;
    assert_eq!(ids(&events), vec![event]);
    assert_eq!(events[0]["role"], json!("guest"));
}

#[tokio::test]
async fn validation_errors_are_bad_requests() {
    let app = TestApp::new();
    let (_, alice) = app.signup("alice").await;

    let (status, body) = app
        .post("/calendars", Some(&alice), json!({ "name": "Holidays" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("reserved"));

    let (status, _) = app
        .post("/calendars", Some(&alice), json!({ "name": "Team calendar", "color": "red" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app.post("/calendars", Some(&alice), json!({ "color": "#fff" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let calendar = app.create_calendar(&alice, "Team calendar").await;
    let (status, _) = app
        .post(
            &format!("/calendars/{calendar}/events"),
            Some(&alice),
            json!({
                "name": "Planning",
                "startAt": "2025-03-01T11:00:00Z",
                "endAt": "2025-03-01T10:00:00Z",
                "type": "task"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn update_calendar_requires_admin() {
    let app = TestApp::new();
    let (_, alice) = app.signup("alice").await;
    let (_, bob) = app.signup("bobby").await;
    let calendar = app.create_calendar(&alice, "Team calendar").await;
    app.join_calendar(&alice, calendar, "bobby").await;
    let update = json!({ "name": "Renamed calendar", "description": "", "color": "#123456" });

    let (status, _) = app
        .request(Method::PUT, &format!("/calendars/{calendar}"), Some(&bob), Some(update.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, updated) = app
        .request(Method::PUT, &format!("/calendars/{calendar}"), Some(&alice), Some(update))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(updated["name"], json!("Renamed calendar"));
    assert_eq!(updated["color"], json!("#123456"));
}

#[tokio::test]
async fn login_waits_for_email_confirmation() {
    let app = TestApp::new();
    app.register("dana").await;

    let sent = app.outbox.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].text.contains("http://client.test/auth/confirm-email/"));

    let credentials = json!({ "login": "dana", "password": "password123" });
    let (status, _) = app.post("/auth/login", None, credentials.clone()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .request(Method::POST, "/auth/confirm-email/garbage", None, None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("The confirm token is invalid."));

    let (status, _) = app
        .request(
            Method::POST,
            &format!("/auth/confirm-email/{}", app.last_token()),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.post("/auth/login", None, credentials).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn registration_rejects_email_shaped_logins() {
    let app = TestApp::new();

    let (status, body) = app
        .post(
            "/auth/register",
            None,
            json!({ "login": "x@y.io", "email": "x@example.com", "password": "password123" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains('@'));
}

#[tokio::test]
async fn refresh_rotates_cookie_and_logout_revokes_it() {
    let app = TestApp::new();
    app.signup("dana").await;

    let login = app
        .send(
            Method::POST,
            "/auth/login",
            None,
            &[],
            Some(json!({ "login": "dana", "password": "password123" })),
        )
        .await;
    assert_eq!(login.status(), StatusCode::OK);
    let set_cookie = login.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
    assert!(set_cookie.contains("HttpOnly"));
    let first = refresh_cookie(&login);

    let refreshed = app
        .send(Method::POST, "/auth/refresh", None, &[(header::COOKIE, first.as_str())], None)
        .await;
    assert_eq!(refreshed.status(), StatusCode::OK);
    let second = refresh_cookie(&refreshed);
    assert_ne!(second, first);
    let body = json_body(refreshed).await;
    let (status, me) = app.get("/auth/me", body["accessToken"].as_str().unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["login"], json!("dana"));

    // A spent refresh token cannot be replayed.
    let replay = app
        .send(Method::POST, "/auth/refresh", None, &[(header::COOKIE, first.as_str())], None)
        .await;
    assert_eq!(replay.status(), StatusCode::UNAUTHORIZED);

    let logout = app
        .send(Method::POST, "/auth/logout", None, &[(header::COOKIE, second.as_str())], None)
        .await;
    assert_eq!(logout.status(), StatusCode::NO_CONTENT);
    assert_eq!(refresh_cookie(&logout), "refreshToken=");

    let after_logout = app
        .send(Method::POST, "/auth/refresh", None, &[(header::COOKIE, second.as_str())], None)
        .await;
    assert_eq!(after_logout.status(), StatusCode::UNAUTHORIZED);

    let (status, _) = app.request(Method::POST, "/auth/refresh", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

/// Alice shares an event into Bob's own calendar and Bob confirms.
/// Returns (alice token, bob token, alice calendar, bob calendar, event).
async fn shared_event_setup(app: &TestApp) -> (String, String, i64, i64, i64) {
    let (_, alice) = app.signup("alice").await;
    let (_, bob) = app.signup("bobby").await;
    let alice_calendar = app.create_calendar(&alice, "Alice calendar").await;
    let bob_calendar = app.create_calendar(&bob, "Bob calendar").await;
    let event = app.create_event(&alice, alice_calendar, "Offsite", "arrangement").await;

    let (status, _) = app
        .post(
            &format!("/events/{event}/invite"),
            Some(&alice),
            json!({ "email": "bobby@example.com", "calendarId": bob_calendar }),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app
        .request(
            Method::POST,
            &format!("/events/invite-confirm/{}", app.last_token()),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    (alice, bob, alice_calendar, bob_calendar, event)
}

#[tokio::test]
async fn deleting_guest_calendar_keeps_shared_event() {
    let app = TestApp::new();
    let (alice, bob, alice_calendar, bob_calendar, event) = shared_event_setup(&app).await;

    let (status, _) = app.delete(&format!("/calendars/{bob_calendar}"), &bob).await;
    assert_eq!(status, StatusCode::OK);

    let (_, events) = app.get(&format!("/calendars/{alice_calendar}/events"), &alice).await;
    assert_eq!(ids(&events), vec![event]);
    assert_eq!(events[0]["role"], json!("admin"));
}

#[tokio::test]
async fn leaving_event_unlinks_it_from_guest_calendar() {
    let app = TestApp::new();
    let (alice, bob, alice_calendar, bob_calendar, event) = shared_event_setup(&app).await;

    let (status, _) = app
        .delete(&format!("/calendars/{bob_calendar}/events/{event}"), &bob)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, events) = app.get(&format!("/calendars/{bob_calendar}/events"), &bob).await;
    assert!(ids(&events).is_empty());

    // Someone joining Bob's calendar later is not enrolled into the event.
    let (_, carol) = app.signup("carol").await;
    app.join_calendar(&bob, bob_calendar, "carol").await;
    let (status, events) = app.get(&format!("/calendars/{bob_calendar}/events"), &carol).await;
    assert_eq!(status, StatusCode::OK);
    assert!(ids(&events).is_empty());

    let (_, events) = app.get(&format!("/calendars/{alice_calendar}/events"), &alice).await;
    assert_eq!(ids(&events), vec![event]);
}
