//! In-process fakes of the GitHub contents API and the Microsoft Graph drive
//! API, served with axum on an ephemeral port.

#![allow(dead_code)]

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use percent_encoding::percent_decode_str;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use cloudshelf_storage::{CloudDriveConfig, RepositoryConfig};

pub const MODIFIED: &str = "2025-11-08T10:55:26Z";
pub const GITHUB_TOKEN: &str = "ghp-test-token";

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn decode(segment: &str) -> String {
    percent_decode_str(segment).decode_utf8_lossy().into_owned()
}

fn query_param(uri: &Uri, name: &str) -> Option<String> {
    let query = uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

fn status(code: StatusCode, body: Value) -> Response {
    (code, Json(body)).into_response()
}

fn name_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}

fn join(base: &str, rel: &str) -> String {
    let rel = rel.trim_matches('/');
    if base.is_empty() {
        rel.to_string()
    } else if rel.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, rel)
    }
}

// ---------------------------------------------------------------------------
// GitHub
// ---------------------------------------------------------------------------

pub struct RepoFile {
    pub data: Vec<u8>,
    pub sha: String,
}

pub struct GitHubState {
    pub branch: String,
    pub files: BTreeMap<String, RepoFile>,
    /// `ref` / `branch` values seen on contents requests.
    pub refs: Vec<String>,
    pub commit_lookups: usize,
    pub requests: Vec<String>,
    next_sha: u64,
}

impl GitHubState {
    fn sha(&mut self) -> String {
        self.next_sha += 1;
        format!("sha-{}", self.next_sha)
    }

    fn is_dir(&self, path: &str) -> bool {
        path.is_empty()
            || self
                .files
                .keys()
                .any(|key| key.starts_with(&format!("{}/", path)))
    }

    fn listing(&self, path: &str) -> Value {
        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{}/", path)
        };
        let mut items = Vec::new();
        let mut dirs = BTreeSet::new();
        for (key, file) in self.files.range(prefix.clone()..) {
            let Some(rest) = key.strip_prefix(&prefix) else {
                break;
            };
            match rest.split_once('/') {
                Some((dir, _)) => {
                    dirs.insert(dir.to_string());
                }
                None => items.push(json!({
                    "name": rest,
                    "path": key,
                    "sha": file.sha,
                    "size": file.data.len(),
                    "type": "file"
                })),
            }
        }
        for dir in dirs {
            items.push(json!({
                "name": dir,
                "path": format!("{}{}", prefix, dir),
                "sha": "tree",
                "size": 0,
                "type": "dir"
            }));
        }
        Value::Array(items)
    }
}

#[derive(Clone)]
pub struct FakeGitHub {
    pub base: String,
    state: Arc<Mutex<GitHubState>>,
}

impl FakeGitHub {
    pub async fn start(branch: &str) -> Self {
        let state = Arc::new(Mutex::new(GitHubState {
            branch: branch.to_string(),
            files: BTreeMap::new(),
            refs: Vec::new(),
            commit_lookups: 0,
            requests: Vec::new(),
            next_sha: 0,
        }));
        let app = Router::new()
            .fallback(github_handler)
            .with_state(state.clone());
        let base = serve(app).await;
        Self { base, state }
    }

    pub fn config(&self) -> RepositoryConfig {
        let branch = self.state().branch.clone();
        serde_json::from_value(json!({
            "token": GITHUB_TOKEN,
            "repo": "octo/files",
            "branch": branch,
            "api_base": self.base,
            "raw_base": format!("{}/raw", self.base)
        }))
        .unwrap()
    }

    pub fn state(&self) -> MutexGuard<'_, GitHubState> {
        self.state.lock().unwrap()
    }

    pub fn seed(&self, path: &str, data: &[u8]) {
        let mut state = self.state();
        let sha = state.sha();
        state.files.insert(
            path.to_string(),
            RepoFile {
                data: data.to_vec(),
                sha,
            },
        );
    }

    pub fn paths(&self) -> Vec<String> {
        self.state().files.keys().cloned().collect()
    }
}

async fn github_handler(
    State(state): State<Arc<Mutex<GitHubState>>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut state = state.lock().unwrap();
    let path = uri.path().to_string();
    state.requests.push(format!("{} {}", method, path));

    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        == Some(format!("token {}", GITHUB_TOKEN).as_str());
    if !authorized {
        return status(StatusCode::UNAUTHORIZED, json!({"message": "Bad credentials"}));
    }

    if let Some(rest) = path.strip_prefix("/raw/octo/files/") {
        let Some((branch, file)) = rest.split_once('/') else {
            return status(StatusCode::NOT_FOUND, json!({}));
        };
        if branch != state.branch {
            return status(StatusCode::NOT_FOUND, json!({}));
        }
        return match state.files.get(&decode(file)) {
            Some(file) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                file.data.clone(),
            )
                .into_response(),
            None => status(StatusCode::NOT_FOUND, json!({})),
        };
    }

    let Some(rest) = path.strip_prefix("/repos/octo/files") else {
        return status(StatusCode::NOT_FOUND, json!({"message": "Not Found"}));
    };

    if rest.is_empty() {
        return status(StatusCode::OK, json!({"full_name": "octo/files"}));
    }

    if rest == "/commits" {
        state.commit_lookups += 1;
        let target = query_param(&uri, "path").unwrap_or_default();
        let commits = if state.files.contains_key(&target) {
            json!([{ "commit": { "author": { "date": MODIFIED } } }])
        } else {
            json!([])
        };
        return status(StatusCode::OK, commits);
    }

    let Some(target) = rest.strip_prefix("/contents") else {
        return status(StatusCode::NOT_FOUND, json!({"message": "Not Found"}));
    };
    let target = decode(target.trim_start_matches('/'));

    match method {
        Method::GET => {
            state.refs.push(query_param(&uri, "ref").unwrap_or_default());
            if let Some(file) = state.files.get(&target) {
                return status(
                    StatusCode::OK,
                    json!({
                        "name": name_of(&target),
                        "path": target,
                        "sha": file.sha,
                        "size": file.data.len(),
                        "type": "file",
                        "content": STANDARD.encode(&file.data)
                    }),
                );
            }
            if state.is_dir(&target) {
                return status(StatusCode::OK, state.listing(&target));
            }
            status(StatusCode::NOT_FOUND, json!({"message": "Not Found"}))
        }
        Method::PUT => {
            let request: Value = serde_json::from_slice(&body).unwrap();
            state
                .refs
                .push(request["branch"].as_str().unwrap_or_default().to_string());
            let sent_sha = request["sha"].as_str().map(str::to_string);
            let current = state.files.get(&target).map(|file| file.sha.clone());
            match (current, sent_sha) {
                (Some(_), None) => {
                    return status(
                        StatusCode::UNPROCESSABLE_ENTITY,
                        json!({"message": "\"sha\" wasn't supplied."}),
                    )
                }
                (Some(current), Some(sent)) if current != sent => {
                    return status(
                        StatusCode::CONFLICT,
                        json!({"message": format!("{} does not match {}", target, sent)}),
                    )
                }
                _ => {}
            }
            let data = STANDARD
                .decode(request["content"].as_str().unwrap_or_default())
                .unwrap();
            let sha = state.sha();
            let created = state
                .files
                .insert(
                    target.clone(),
                    RepoFile {
                        data,
                        sha: sha.clone(),
                    },
                )
                .is_none();
            let code = if created {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            status(code, json!({"content": {"path": target, "sha": sha}}))
        }
        Method::DELETE => {
            let request: Value = serde_json::from_slice(&body).unwrap();
            let sent = request["sha"].as_str().unwrap_or_default();
            let current = state.files.get(&target).map(|file| file.sha.clone());
            match current {
                None => status(StatusCode::NOT_FOUND, json!({"message": "Not Found"})),
                Some(current) if current != sent => {
                    status(StatusCode::CONFLICT, json!({"message": "sha mismatch"}))
                }
                Some(_) => {
                    state.files.remove(&target);
                    status(StatusCode::OK, json!({"commit": {}}))
                }
            }
        }
        _ => status(StatusCode::METHOD_NOT_ALLOWED, json!({})),
    }
}

// ---------------------------------------------------------------------------
// Microsoft Graph
// ---------------------------------------------------------------------------

pub struct DriveNode {
    pub id: String,
    pub folder: bool,
    pub data: Vec<u8>,
    pub content_type: String,
}

/// Scripted answer of the token endpoint.
pub enum TokenReply {
    InvalidGrant,
    /// A fresh access token, optionally rotating the refresh token.
    Grant { refresh_token: Option<String> },
    /// A non-grant OAuth error such as a revoked client.
    InvalidClient,
    /// A 200 JSON reply without an access token.
    MissingToken,
    /// A gateway failure with a non-JSON body.
    ServerError { status: u16, body: &'static str },
}

#[derive(Debug, Clone)]
pub struct TokenRequest {
    pub refresh_token: String,
    pub scope: Option<String>,
    pub redirect_uri: Option<String>,
}

pub struct GraphState {
    pub base: String,
    pub nodes: BTreeMap<String, DriveNode>,
    pub valid_tokens: HashSet<String>,
    pub token_script: VecDeque<TokenReply>,
    pub token_requests: Vec<TokenRequest>,
    /// Answer this many upcoming API calls with 401 regardless of token.
    pub reject_next: usize,
    pub api_requests: Vec<String>,
    pub page_size: Option<usize>,
    pub download_urls: bool,
    pub share_links: bool,
    pub thumbnails: bool,
    next_id: u64,
    issued: u64,
}

impl GraphState {
    fn id(&mut self) -> String {
        self.next_id += 1;
        format!("item-{}", self.next_id)
    }

    fn path_of(&self, id: &str) -> Option<String> {
        self.nodes
            .iter()
            .find(|(_, node)| node.id == id)
            .map(|(path, _)| path.clone())
    }

    fn children(&self, path: &str) -> Vec<String> {
        self.nodes
            .keys()
            .filter(|key| !key.is_empty() && parent_of(key) == path)
            .cloned()
            .collect()
    }

    fn ensure_parents(&mut self, path: &str) {
        let mut current = String::new();
        let segments: Vec<&str> = path.split('/').collect();
        for segment in &segments[..segments.len().saturating_sub(1)] {
            current = join(&current, segment);
            if !self.nodes.contains_key(&current) {
                let id = self.id();
                self.nodes.insert(current.clone(), folder_node(id));
            }
        }
    }

    fn subtree(&self, path: &str) -> Vec<String> {
        let prefix = format!("{}/", path);
        self.nodes
            .keys()
            .filter(|key| *key == path || key.starts_with(&prefix))
            .cloned()
            .collect()
    }

    fn item_json(&self, path: &str) -> Value {
        let node = &self.nodes[path];
        let mut item = json!({
            "id": node.id,
            "name": if path.is_empty() { "root" } else { name_of(path) },
            "lastModifiedDateTime": MODIFIED,
            "webUrl": format!("https://onedrive.example/{}", path)
        });
        if node.folder {
            item["folder"] = json!({ "childCount": self.children(path).len() });
        } else {
            item["size"] = json!(node.data.len());
            item["file"] = json!({ "mimeType": node.content_type });
            if self.download_urls {
                item["@microsoft.graph.downloadUrl"] =
                    json!(format!("https://download.example/{}", node.id));
            }
        }
        item
    }
}

fn folder_node(id: String) -> DriveNode {
    DriveNode {
        id,
        folder: true,
        data: Vec::new(),
        content_type: String::new(),
    }
}

#[derive(Clone)]
pub struct FakeGraph {
    pub base: String,
    state: Arc<Mutex<GraphState>>,
}

impl FakeGraph {
    pub async fn start() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(String::new(), folder_node("root-id".to_string()));
        let state = Arc::new(Mutex::new(GraphState {
            base: String::new(),
            nodes,
            valid_tokens: HashSet::new(),
            token_script: VecDeque::new(),
            token_requests: Vec::new(),
            reject_next: 0,
            api_requests: Vec::new(),
            page_size: None,
            download_urls: true,
            share_links: true,
            thumbnails: true,
            next_id: 0,
            issued: 0,
        }));
        let app = Router::new()
            .fallback(graph_handler)
            .with_state(state.clone());
        let base = serve(app).await;
        state.lock().unwrap().base = base.clone();
        Self { base, state }
    }

    pub fn config(&self) -> CloudDriveConfig {
        serde_json::from_value(json!({
            "client_id": "app-id",
            "client_secret": "app-secret",
            "refresh_token": "refresh-0",
            "api_base": self.base,
            "token_url": format!("{}/token", self.base)
        }))
        .unwrap()
    }

    pub fn state(&self) -> MutexGuard<'_, GraphState> {
        self.state.lock().unwrap()
    }

    pub fn seed_file(&self, path: &str, data: &[u8]) {
        let mut state = self.state();
        state.ensure_parents(path);
        let id = state.id();
        state.nodes.insert(
            path.to_string(),
            DriveNode {
                id,
                folder: false,
                data: data.to_vec(),
                content_type: "application/octet-stream".to_string(),
            },
        );
    }

    pub fn seed_folder(&self, path: &str) {
        let mut state = self.state();
        state.ensure_parents(path);
        let id = state.id();
        state.nodes.insert(path.to_string(), folder_node(id));
    }

    /// Every path in the drive except the root.
    pub fn paths(&self) -> Vec<String> {
        self.state()
            .nodes
            .keys()
            .filter(|key| !key.is_empty())
            .cloned()
            .collect()
    }

    pub fn script_tokens(&self, replies: impl IntoIterator<Item = TokenReply>) {
        self.state().token_script.extend(replies);
    }

    pub fn token_requests(&self) -> Vec<TokenRequest> {
        self.state().token_requests.clone()
    }

    pub fn api_requests(&self) -> Vec<String> {
        self.state().api_requests.clone()
    }
}

async fn graph_handler(
    State(state): State<Arc<Mutex<GraphState>>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut state = state.lock().unwrap();
    let path = uri.path().to_string();

    if path == "/token" {
        return token_endpoint(&mut state, &body);
    }
    if let Some(id) = path.strip_prefix("/thumb/") {
        return (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "image/jpeg")],
            format!("drive-thumbnail-{}", id).into_bytes(),
        )
            .into_response();
    }

    if state.reject_next > 0 {
        state.reject_next -= 1;
        return status(
            StatusCode::UNAUTHORIZED,
            json!({"error": {"code": "InvalidAuthenticationToken"}}),
        );
    }
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string);
    match token {
        Some(token) if state.valid_tokens.contains(&token) => {}
        _ => {
            return status(
                StatusCode::UNAUTHORIZED,
                json!({"error": {"code": "InvalidAuthenticationToken"}}),
            )
        }
    }
    state.api_requests.push(format!("{} {}", method, path));

    let Some(rest) = path.strip_prefix("/me/drive") else {
        return status(StatusCode::NOT_FOUND, json!({}));
    };
    if rest.is_empty() {
        return status(StatusCode::OK, json!({"id": "drive-1", "driveType": "personal"}));
    }
    let rest = rest.trim_start_matches('/');

    let (base_path, rest) = if let Some(rest) = rest.strip_prefix("root") {
        (String::new(), rest)
    } else if let Some(rest) = rest.strip_prefix("items/") {
        let end = rest.find(|c| c == '/' || c == ':').unwrap_or(rest.len());
        match state.path_of(&rest[..end]) {
            Some(base) => (base, &rest[end..]),
            None => return status(StatusCode::NOT_FOUND, json!({"error": {"code": "itemNotFound"}})),
        }
    } else {
        return status(StatusCode::NOT_FOUND, json!({}));
    };

    let (target, action) = match rest.strip_prefix(":/") {
        Some(addressed) => {
            let end = addressed.find(':').unwrap_or(addressed.len());
            let target = join(&base_path, &decode(&addressed[..end]));
            let after = addressed.get(end + 1..).unwrap_or("");
            (target, after.trim_start_matches('/').to_string())
        }
        None => (base_path, rest.trim_start_matches('/').to_string()),
    };

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
    drive_route(&mut state, &method, &target, &action, &uri, &content_type, &body)
}

fn not_found() -> Response {
    status(
        StatusCode::NOT_FOUND,
        json!({"error": {"code": "itemNotFound", "message": "The resource could not be found."}}),
    )
}

fn drive_route(
    state: &mut GraphState,
    method: &Method,
    target: &str,
    action: &str,
    uri: &Uri,
    content_type: &str,
    body: &[u8],
) -> Response {
    let exists = state.nodes.contains_key(target);

    match (method.as_str(), action) {
        ("GET", "") => {
            if !exists {
                return not_found();
            }
            status(StatusCode::OK, state.item_json(target))
        }
        ("GET", "children") => {
            if !exists {
                return not_found();
            }
            let children = state.children(target);
            let skip: usize = query_param(uri, "skip")
                .and_then(|value| value.parse().ok())
                .unwrap_or(0);
            let page = state.page_size.unwrap_or(usize::MAX);
            let value: Vec<Value> = children
                .iter()
                .skip(skip)
                .take(page)
                .map(|child| state.item_json(child))
                .collect();
            let mut listing = json!({ "value": value });
            if skip.saturating_add(page) < children.len() {
                listing["@odata.nextLink"] = json!(format!(
                    "{}/me/drive/items/{}/children?skip={}",
                    state.base,
                    state.nodes[target].id,
                    skip + page
                ));
            }
            status(StatusCode::OK, listing)
        }
        ("POST", "children") => {
            let request: Value = serde_json::from_slice(body).unwrap();
            let name = request["name"].as_str().unwrap_or_default();
            let path = join(target, name);
            if state.nodes.contains_key(&path) {
                return status(
                    StatusCode::CONFLICT,
                    json!({"error": {"code": "nameAlreadyExists"}}),
                );
            }
            let id = state.id();
            state.nodes.insert(path.clone(), folder_node(id));
            status(StatusCode::CREATED, state.item_json(&path))
        }
        ("GET", "content") => match state.nodes.get(target) {
            Some(node) if !node.folder => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, node.content_type.clone())],
                node.data.clone(),
            )
                .into_response(),
            _ => not_found(),
        },
        ("PUT", "content") => {
            state.ensure_parents(target);
            let id = match state.nodes.get(target) {
                Some(node) => node.id.clone(),
                None => state.id(),
            };
            state.nodes.insert(
                target.to_string(),
                DriveNode {
                    id,
                    folder: false,
                    data: body.to_vec(),
                    content_type: content_type.to_string(),
                },
            );
            status(StatusCode::CREATED, state.item_json(target))
        }
        ("DELETE", "") => {
            if !exists || target.is_empty() {
                return not_found();
            }
            for path in state.subtree(target) {
                state.nodes.remove(&path);
            }
            StatusCode::NO_CONTENT.into_response()
        }
        ("PATCH", "") | ("POST", "copy") => {
            if !exists {
                return not_found();
            }
            let request: Value = serde_json::from_slice(body).unwrap();
            let parent_id = request["parentReference"]["id"].as_str().unwrap_or_default();
            let Some(parent) = state.path_of(parent_id) else {
                return status(StatusCode::BAD_REQUEST, json!({"error": {"code": "invalidRequest"}}));
            };
            let name = request["name"].as_str().unwrap_or(name_of(target));
            let destination = join(&parent, name);
            if state.nodes.contains_key(&destination) {
                return status(
                    StatusCode::CONFLICT,
                    json!({"error": {"code": "nameAlreadyExists"}}),
                );
            }

            let moving = method == Method::PATCH;
            for path in state.subtree(target) {
                let new_path = format!("{}{}", destination, &path[target.len()..]);
                let node = if moving {
                    state.nodes.remove(&path).unwrap()
                } else {
                    let source = &state.nodes[&path];
                    let (folder, data, content_type) =
                        (source.folder, source.data.clone(), source.content_type.clone());
                    DriveNode {
                        id: state.id(),
                        folder,
                        data,
                        content_type,
                    }
                };
                state.nodes.insert(new_path, node);
            }

            if moving {
                status(StatusCode::OK, state.item_json(&destination))
            } else {
                (
                    StatusCode::ACCEPTED,
                    [(header::LOCATION, format!("{}/monitor/1", state.base))],
                )
                    .into_response()
            }
        }
        ("POST", "createLink") => {
            if !exists {
                return not_found();
            }
            if !state.share_links {
                return status(StatusCode::FORBIDDEN, json!({"error": {"code": "accessDenied"}}));
            }
            let request: Value = serde_json::from_slice(body).unwrap();
            assert_eq!(request["type"], "view");
            assert_eq!(request["scope"], "anonymous");
            assert!(request["expirationDateTime"].is_string());
            status(
                StatusCode::CREATED,
                json!({ "link": { "webUrl": format!("https://share.example/s/{}", state.nodes[target].id) } }),
            )
        }
        ("GET", "thumbnails") => {
            if !exists {
                return not_found();
            }
            if !state.thumbnails {
                return status(StatusCode::OK, json!({ "value": [] }));
            }
            status(
                StatusCode::OK,
                json!({ "value": [{ "medium": { "url": format!("{}/thumb/{}", state.base, state.nodes[target].id) } }] }),
            )
        }
        _ => status(StatusCode::METHOD_NOT_ALLOWED, json!({})),
    }
}

fn token_endpoint(state: &mut GraphState, body: &[u8]) -> Response {
    let form: BTreeMap<String, String> = url::form_urlencoded::parse(body)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    assert_eq!(form.get("grant_type").map(String::as_str), Some("refresh_token"));
    assert_eq!(form.get("client_id").map(String::as_str), Some("app-id"));

    state.token_requests.push(TokenRequest {
        refresh_token: form.get("refresh_token").cloned().unwrap_or_default(),
        scope: form.get("scope").cloned(),
        redirect_uri: form.get("redirect_uri").cloned(),
    });

    let reply = state
        .token_script
        .pop_front()
        .unwrap_or(TokenReply::Grant {
            refresh_token: None,
        });
    match reply {
        TokenReply::InvalidGrant => status(
            StatusCode::BAD_REQUEST,
            json!({"error": "invalid_grant", "error_description": "AADSTS70000: scope not granted"}),
        ),
        TokenReply::InvalidClient => status(
            StatusCode::UNAUTHORIZED,
            json!({"error": "invalid_client", "error_description": "AADSTS7000215: bad secret"}),
        ),
        TokenReply::MissingToken => status(StatusCode::OK, json!({"token_type": "Bearer"})),
        TokenReply::ServerError { status: code, body } => (
            StatusCode::from_u16(code).unwrap(),
            [(header::CONTENT_TYPE, "text/html")],
            body,
        )
            .into_response(),
        TokenReply::Grant { refresh_token } => {
            state.issued += 1;
            let access_token = format!("access-{}", state.issued);
            state.valid_tokens.insert(access_token.clone());
            let mut grant = json!({
                "access_token": access_token,
                "token_type": "Bearer",
                "expires_in": 3600
            });
            if let Some(refresh_token) = refresh_token {
                grant["refresh_token"] = json!(refresh_token);
            }
            status(StatusCode::OK, grant)
        }
    }
}
