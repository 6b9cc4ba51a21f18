use crate::model::{
    Board, Column, ColumnPosition, NewBoard, NewColumn, NewTask, Task, TaskPosition,
};
use crate::service::{AuthUser, DataService, ServiceError, ServiceResult};
use crate::storage::StoredSession;
use chrono::{Duration as ChronoDuration, Utc};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// `DataService` backed by a hosted PostgREST + GoTrue deployment.
pub struct RestService {
    client: Client,
    base_url: String,
    anon_key: String,
    access_token: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    user: AuthUser,
}

#[derive(Deserialize)]
struct PositionRow {
    position: i32,
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    message: Option<String>,
    error_description: Option<String>,
    msg: Option<String>,
    error: Option<String>,
}

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

impl RestService {
    pub fn new(url: &str, anon_key: &str) -> ServiceResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("pinboard/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(RestService {
            client,
            base_url: url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            access_token: None,
        })
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn sign_in(&self, email: &str, password: &str) -> ServiceResult<StoredSession> {
        let req = self
            .request(Method::POST, self.auth_url("token"))
            .query(&[("grant_type", "password")])
            .json(&Credentials { email, password });
        let token: TokenResponse = self.send(req)?;
        info!(user = %token.user.id, "signed in");
        Ok(session_from(token))
    }

    /// Registers a new account. Returns a session when the backend signs the
    /// user in right away, `None` when it waits for email confirmation.
    pub fn sign_up(&self, email: &str, password: &str) -> ServiceResult<Option<StoredSession>> {
        let req = self
            .request(Method::POST, self.auth_url("signup"))
            .json(&Credentials { email, password });
        let body: serde_json::Value = self.send(req)?;
        Ok(serde_json::from_value::<TokenResponse>(body)
            .ok()
            .map(session_from))
    }

    pub fn refresh(&self, refresh_token: &str) -> ServiceResult<StoredSession> {
        let req = self
            .request(Method::POST, self.auth_url("token"))
            .query(&[("grant_type", "refresh_token")])
            .json(&RefreshRequest { refresh_token });
        let token: TokenResponse = self.send(req)?;
        debug!(user = %token.user.id, "session refreshed");
        Ok(session_from(token))
    }

    pub fn sign_out(&self) -> ServiceResult<()> {
        if self.access_token.is_none() {
            return Ok(());
        }
        let req = self.request(Method::POST, self.auth_url("logout"));
        match self.send_empty(req) {
            Ok(()) | Err(ServiceError::Unauthenticated) => Ok(()),
            Err(err) => Err(err),
        }
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        debug!(%method, %url, "data service request");
        let bearer = self.access_token.as_deref().unwrap_or(&self.anon_key);
        self.client
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
    }

    fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> ServiceResult<T> {
        let resp = check_status(req.send()?)?;
        let body = resp.text()?;
        Ok(serde_json::from_str(&body)?)
    }

    fn send_empty(&self, req: RequestBuilder) -> ServiceResult<()> {
        check_status(req.send()?)?;
        Ok(())
    }

    fn insert_rows<B, T>(&self, table: &str, rows: &B) -> ServiceResult<Vec<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let req = self
            .request(Method::POST, self.rest_url(table))
            .header("Prefer", "return=representation")
            .json(rows);
        self.send(req)
    }

    fn upsert_rows<B: Serialize + ?Sized>(&self, table: &str, rows: &B) -> ServiceResult<()> {
        let req = self
            .request(Method::POST, self.rest_url(table))
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(rows);
        self.send_empty(req)
    }
}

impl DataService for RestService {
    fn current_user(&self) -> ServiceResult<Option<AuthUser>> {
        if self.access_token.is_none() {
            return Ok(None);
        }
        let req = self.request(Method::GET, self.auth_url("user"));
        match self.send::<AuthUser>(req) {
            Ok(user) => Ok(Some(user)),
            Err(ServiceError::Unauthenticated) => Ok(None),
            Err(ServiceError::Rejected { status: 403, .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn list_boards(&self, user_id: &str) -> ServiceResult<Vec<Board>> {
        let req = self.request(Method::GET, self.rest_url("boards")).query(&[
            ("select", "*".to_string()),
            ("user_id", format!("eq.{}", user_id)),
            ("order", "created_at.desc".to_string()),
        ]);
        self.send(req)
    }

    fn get_board(&self, board_id: &str) -> ServiceResult<Option<Board>> {
        let req = self.request(Method::GET, self.rest_url("boards")).query(&[
            ("select", "*".to_string()),
            ("id", format!("eq.{}", board_id)),
        ]);
        let rows: Vec<Board> = self.send(req)?;
        Ok(rows.into_iter().next())
    }

    fn list_columns(&self, board_id: &str) -> ServiceResult<Vec<Column>> {
        let req = self.request(Method::GET, self.rest_url("columns")).query(&[
            ("select", "*".to_string()),
            ("board_id", format!("eq.{}", board_id)),
            ("order", "position.asc".to_string()),
        ]);
        self.send(req)
    }

    fn list_tasks(&self, column_ids: &[String]) -> ServiceResult<Vec<Task>> {
        if column_ids.is_empty() {
            return Ok(Vec::new());
        }
        let req = self.request(Method::GET, self.rest_url("tasks")).query(&[
            ("select", "*".to_string()),
            ("column_id", format!("in.({})", column_ids.join(","))),
            ("order", "position.asc".to_string()),
        ]);
        self.send(req)
    }

    fn max_task_position(&self, column_id: &str) -> ServiceResult<Option<i32>> {
        let req = self.request(Method::GET, self.rest_url("tasks")).query(&[
            ("select", "position".to_string()),
            ("column_id", format!("eq.{}", column_id)),
            ("order", "position.desc".to_string()),
            ("limit", "1".to_string()),
        ]);
        let rows: Vec<PositionRow> = self.send(req)?;
        Ok(rows.first().map(|row| row.position))
    }

    fn insert_board(&self, board: &NewBoard) -> ServiceResult<Board> {
        let rows: Vec<Board> = self.insert_rows("boards", board)?;
        rows.into_iter()
            .next()
            .ok_or(ServiceError::EmptyResponse("board"))
    }

    fn insert_columns(&self, columns: &[NewColumn]) -> ServiceResult<Vec<Column>> {
        self.insert_rows("columns", columns)
    }

    fn insert_task(&self, task: &NewTask) -> ServiceResult<Task> {
        let rows: Vec<Task> = self.insert_rows("tasks", task)?;
        rows.into_iter().next().ok_or(ServiceError::EmptyResponse("task"))
    }

    fn upsert_task_positions(&self, updates: &[TaskPosition]) -> ServiceResult<()> {
        self.upsert_rows("tasks", updates)
    }

    fn upsert_column_positions(&self, updates: &[ColumnPosition]) -> ServiceResult<()> {
        self.upsert_rows("columns", updates)
    }
}

fn check_status(resp: Response) -> ServiceResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(ServiceError::Unauthenticated);
    }
    let body = resp.text().unwrap_or_default();
    Err(ServiceError::Rejected {
        status: status.as_u16(),
        message: error_message(&body),
    })
}

fn error_message(body: &str) -> String {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    parsed
        .message
        .or(parsed.error_description)
        .or(parsed.msg)
        .or(parsed.error)
        .unwrap_or_else(|| body.trim().to_string())
}

fn session_from(token: TokenResponse) -> StoredSession {
    StoredSession {
        access_token: token.access_token,
        refresh_token: token.refresh_token,
        expires_at: Utc::now() + ChronoDuration::seconds(token.expires_in),
        user: token.user,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Priority;
    use mockito::{Matcher, Server};

    const ANON_KEY: &str = "anon-key";

    fn service(server: &Server) -> RestService {
        RestService::new(&server.url(), ANON_KEY)
            .unwrap()
            .with_access_token("token-1")
    }

    #[test]
    fn columns_are_filtered_by_board_and_ordered() {
        let mut server = Server::new();
        let mock = server
            .mock("GET", "/rest/v1/columns")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("board_id".into(), "eq.b1".into()),
                Matcher::UrlEncoded("order".into(), "position.asc".into()),
            ]))
            .match_header("apikey", ANON_KEY)
            .match_header("authorization", "Bearer token-1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[{"id":"c1","board_id":"b1","title":"未着手","position":0},
                    {"id":"c2","board_id":"b1","title":"進行中","position":1}]"#,
            )
            .create();

        let columns = service(&server).list_columns("b1").unwrap();
        mock.assert();
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[1].id, "c2");
    }

    #[test]
    fn tasks_use_an_in_filter_over_column_ids() {
        let mut server = Server::new();
        let mock = server
            .mock("GET", "/rest/v1/tasks")
            .match_query(Matcher::UrlEncoded("column_id".into(), "in.(c1,c2)".into()))
            .with_status(200)
            .with_body(
                r#"[{"id":"t1","column_id":"c2","title":"a","description":"d","priority":"low","position":0}]"#,
            )
            .create();

        let tasks = service(&server)
            .list_tasks(&["c1".to_string(), "c2".to_string()])
            .unwrap();
        mock.assert();
        assert_eq!(tasks[0].priority, Priority::Low);
        assert_eq!(tasks[0].description.as_deref(), Some("d"));
    }

    #[test]
    fn empty_column_set_skips_the_request() {
        let mut server = Server::new();
        let mock = server.mock("GET", Matcher::Any).expect(0).create();
        let tasks = service(&server).list_tasks(&[]).unwrap();
        mock.assert();
        assert!(tasks.is_empty());
    }

    #[test]
    fn missing_board_is_none() {
        let mut server = Server::new();
        server
            .mock("GET", "/rest/v1/boards")
            .match_query(Matcher::UrlEncoded("id".into(), "eq.nope".into()))
            .with_status(200)
            .with_body("[]")
            .create();
        assert_eq!(service(&server).get_board("nope").unwrap(), None);
    }

    #[test]
    fn max_position_reads_the_top_row() {
        let mut server = Server::new();
        server
            .mock("GET", "/rest/v1/tasks")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("column_id".into(), "eq.c1".into()),
                Matcher::UrlEncoded("order".into(), "position.desc".into()),
                Matcher::UrlEncoded("limit".into(), "1".into()),
            ]))
            .with_status(200)
            .with_body(r#"[{"position":7}]"#)
            .create();
        server
            .mock("GET", "/rest/v1/tasks")
            .match_query(Matcher::UrlEncoded("column_id".into(), "eq.c2".into()))
            .with_status(200)
            .with_body("[]")
            .create();

        let svc = service(&server);
        assert_eq!(svc.max_task_position("c1").unwrap(), Some(7));
        assert_eq!(svc.max_task_position("c2").unwrap(), None);
    }

    #[test]
    fn task_positions_are_sent_as_one_merge_upsert() {
        let mut server = Server::new();
        let mock = server
            .mock("POST", "/rest/v1/tasks")
            .match_header("prefer", "resolution=merge-duplicates,return=minimal")
            .match_body(Matcher::Json(serde_json::json!([
                {"id": "t1", "position": 0, "column_id": "c1"},
                {"id": "t2", "position": 1, "column_id": "c2"}
            ])))
            .with_status(201)
            .expect(1)
            .create();

        service(&server)
            .upsert_task_positions(&[
                TaskPosition {
                    id: "t1".into(),
                    position: 0,
                    column_id: "c1".into(),
                },
                TaskPosition {
                    id: "t2".into(),
                    position: 1,
                    column_id: "c2".into(),
                },
            ])
            .unwrap();
        mock.assert();
    }

    #[test]
    fn insert_board_returns_the_created_row() {
        let mut server = Server::new();
        server
            .mock("POST", "/rest/v1/boards")
            .match_header("prefer", "return=representation")
            .match_body(Matcher::Json(serde_json::json!({"user_id": "u1", "title": "Plan"})))
            .with_status(201)
            .with_body(
                r#"[{"id":"b9","user_id":"u1","title":"Plan","created_at":"2024-05-01T10:00:00+00:00"}]"#,
            )
            .create();

        let board = service(&server)
            .insert_board(&NewBoard {
                user_id: "u1".into(),
                title: "Plan".into(),
            })
            .unwrap();
        assert_eq!(board.id, "b9");
    }

    #[test]
    fn rejected_writes_carry_the_service_message() {
        let mut server = Server::new();
        server
            .mock("POST", "/rest/v1/columns")
            .with_status(403)
            .with_body(r#"{"code":"42501","message":"new row violates row-level security policy"}"#)
            .create();

        let err = service(&server)
            .insert_columns(&NewColumn::defaults_for("b1"))
            .unwrap_err();
        match err {
            ServiceError::Rejected { status, message } => {
                assert_eq!(status, 403);
                assert_eq!(message, "new row violates row-level security policy");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn expired_token_reads_as_no_user() {
        let mut server = Server::new();
        server
            .mock("GET", "/auth/v1/user")
            .with_status(401)
            .with_body(r#"{"msg":"invalid JWT"}"#)
            .create();
        assert_eq!(service(&server).current_user().unwrap(), None);
    }

    #[test]
    fn no_token_means_no_user_without_a_request() {
        let mut server = Server::new();
        let mock = server.mock("GET", Matcher::Any).expect(0).create();
        let svc = RestService::new(&server.url(), ANON_KEY).unwrap();
        assert_eq!(svc.current_user().unwrap(), None);
        mock.assert();
    }

    #[test]
    fn sign_in_builds_a_session() {
        let mut server = Server::new();
        server
            .mock("POST", "/auth/v1/token")
            .match_query(Matcher::UrlEncoded("grant_type".into(), "password".into()))
            .match_header("authorization", "Bearer anon-key")
            .with_status(200)
            .with_body(
                r#"{"access_token":"jwt","token_type":"bearer","expires_in":3600,
                    "refresh_token":"r1","user":{"id":"u1","email":"a@b.c"}}"#,
            )
            .create();

        let svc = RestService::new(&server.url(), ANON_KEY).unwrap();
        let session = svc.sign_in("a@b.c", "secret").unwrap();
        assert_eq!(session.access_token, "jwt");
        assert_eq!(session.user.id, "u1");
        assert!(session.expires_at > Utc::now());
    }

    #[test]
    fn bad_credentials_surface_the_description() {
        let mut server = Server::new();
        server
            .mock("POST", "/auth/v1/token")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#)
            .create();

        let svc = RestService::new(&server.url(), ANON_KEY).unwrap();
        let err = svc.sign_in("a@b.c", "wrong").unwrap_err();
        assert_eq!(
            err.to_string(),
            "request rejected (400): Invalid login credentials"
        );
    }

    #[test]
    fn sign_up_pending_confirmation_has_no_session() {
        let mut server = Server::new();
        server
            .mock("POST", "/auth/v1/signup")
            .with_status(200)
            .with_body(r#"{"id":"u2","email":"new@b.c","confirmation_sent_at":"2024-05-01T10:00:00Z"}"#)
            .create();

        let svc = RestService::new(&server.url(), ANON_KEY).unwrap();
        assert!(svc.sign_up("new@b.c", "secret").unwrap().is_none());
    }
}
