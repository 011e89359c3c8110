//! An in-memory DC/OS cluster.
//!
//! [`FakeCluster`] implements the client's [`Transport`] so handlers can be
//! driven end to end without a network. It understands the subset of the
//! IAM, secrets, Metronome, Cosmos, Marathon and metadata APIs the provider
//! uses, records every request it receives, and lets tests pin the answer
//! for a specific method and path with [`FakeCluster::respond`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};

use crate::client::{ApiRequest, ApiResponse, ClientError, Transport};

const IAM_PREFIX: &str = "/acs/api/v1/";
const JOBS_PATH: &str = "/service/metronome/v1/jobs";

/// In-memory cluster answering DC/OS REST calls.
#[derive(Default)]
pub struct FakeCluster {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    requests: Vec<ApiRequest>,
    overrides: HashMap<(Method, String), ApiResponse>,
    objects: BTreeMap<String, Value>,
    members: BTreeMap<String, BTreeSet<String>>,
    grants: BTreeSet<(String, String, String)>,
    catalog: BTreeMap<String, Vec<String>>,
    services: BTreeMap<String, Value>,
    repositories: Vec<Value>,
    apps: BTreeMap<String, Value>,
    version: Option<Value>,
}

impl FakeCluster {
    /// An empty cluster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a package with the given versions, oldest first, to the catalog.
    pub fn with_package(self, name: &str, versions: &[&str]) -> Self {
        self.lock().catalog.insert(
            name.to_string(),
            versions.iter().map(|v| v.to_string()).collect(),
        );
        self
    }

    /// Replace the body served at `/dcos-metadata/dcos-version.json`.
    pub fn with_version(self, version: Value) -> Self {
        self.lock().version = Some(version);
        self
    }

    /// Always answer `method path` with `response`.
    pub fn respond(&self, method: Method, path: &str, response: ApiResponse) {
        self.lock()
            .overrides
            .insert((method, path.to_string()), response);
    }

    /// Store `value` as the entity at `path`, as if it had been created.
    pub fn insert(&self, path: &str, value: Value) {
        self.lock().objects.insert(path.to_string(), value);
    }

    /// The entity stored at `path`.
    pub fn get(&self, path: &str) -> Option<Value> {
        self.lock().objects.get(path).cloned()
    }

    /// Register a Marathon app; its `id` field is the lookup key.
    pub fn insert_app(&self, app: Value) {
        let id = normalize_app_id(app["id"].as_str().unwrap_or_default());
        self.lock().apps.insert(id, app);
    }

    /// Every request received so far, oldest first.
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.lock().requests.clone()
    }

    /// Forget the recorded requests.
    pub fn clear_requests(&self) {
        self.lock().requests.clear();
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Transport for FakeCluster {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ClientError> {
        let mut inner = self.lock();
        inner.requests.push(request.clone());

        let key = (request.method.clone(), request.url.path().to_string());
        if let Some(response) = inner.overrides.get(&key) {
            return Ok(response.clone());
        }
        Ok(inner.route(&request))
    }
}

impl Inner {
    fn route(&mut self, request: &ApiRequest) -> ApiResponse {
        let path = request.url.path().trim_end_matches('/').to_string();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let method = &request.method;
        let body = request.json_body();

        match segments.as_slice() {
            ["acs", "api", "v1", "auth", "login"] => login(&body),
            ["acs", "api", "v1", "groups", gid, "users"] => self.group_members(gid),
            ["acs", "api", "v1", "groups", gid, "users", uid] => {
                self.membership(method, gid, uid)
            },
            ["acs", "api", "v1", "acls", rid, "users", uid, action] => {
                self.grant(method, rid, uid, action)
            },
            ["acs", "api", "v1", "auth", "saml", "providers", id, "acs-callback-url"] => {
                self.saml_callback(request, id)
            },
            ["acs", "api", "v1", "auth", "saml", "providers", id, "sp-metadata"] => {
                self.saml_metadata(request, id)
            },
            ["acs", "api", "v1", ..] | ["secrets", "v1", "secret", ..] => {
                self.create_on_put(method, &path, body)
            },
            ["service", "metronome", "v1", "jobs"] if *method == Method::POST => {
                self.post_into(&path, body)
            },
            ["service", "metronome", "v1", "jobs", job, "schedules"] if *method == Method::POST => {
                if !self.objects.contains_key(&format!("{}/{}", JOBS_PATH, job)) {
                    return not_found(format!("Job '{}' does not exist", job));
                }
                self.post_into(&path, body)
            },
            ["service", "metronome", "v1", "jobs", ..] => self.replace_on_put(method, &path, body),
            ["package", "install"] => self.install(&body),
            ["package", "uninstall"] => self.uninstall(&body),
            ["cosmos", "service", "describe"] => self.describe_service(&body),
            ["cosmos", "service", "update"] => self.update_service(&body),
            ["package", "describe"] => self.describe_package(&body),
            ["package", "list-versions"] => self.list_versions(&body),
            ["package", "repository", "add"] => self.add_repository(&body),
            ["package", "repository", "list"] => self.repository_list(),
            ["package", "repository", "delete"] => self.delete_repository(&body),
            ["marathon", "v2", "apps", rest @ ..] => {
                let id = normalize_app_id(&rest.join("/"));
                match self.apps.get(&id) {
                    Some(app) => ok(json!({ "app": app })),
                    None => not_found(format!("App '{}' does not exist", id)),
                }
            },
            ["dcos-metadata", "dcos-version.json"] => ok(self.version.clone().unwrap_or_else(|| {
                json!({
                    "version": "2.2.0",
                    "dcos-variant": "open",
                    "dcos-image-commit": "6a5a3b2c",
                    "bootstrap-id": "4f0c8d1e"
                })
            })),
            _ => not_found(format!("no route for {}", path)),
        }
    }

    /// IAM and secrets semantics: PUT creates, PATCH merges.
    fn create_on_put(&mut self, method: &Method, path: &str, mut body: Value) -> ApiResponse {
        match *method {
            Method::PUT => {
                if self.objects.contains_key(path) {
                    return iam_error(StatusCode::CONFLICT, "ERR_ALREADY_EXISTS", "already exists");
                }
                if !body.is_object() {
                    body = json!({});
                }
                annotate(path, &mut body);
                self.objects.insert(path.to_string(), body);
                ApiResponse::empty(StatusCode::CREATED)
            },
            Method::GET => match self.objects.get(path) {
                Some(stored) => {
                    let mut shown = stored.clone();
                    if let Some(map) = shown.as_object_mut() {
                        map.remove("password");
                    }
                    ok(shown)
                },
                None => iam_error(StatusCode::NOT_FOUND, "ERR_UNKNOWN_ENTITY", "not found"),
            },
            Method::PATCH => match self.objects.get_mut(path) {
                Some(stored) => {
                    merge(stored, &body);
                    ApiResponse::empty(StatusCode::NO_CONTENT)
                },
                None => iam_error(StatusCode::NOT_FOUND, "ERR_UNKNOWN_ENTITY", "not found"),
            },
            Method::DELETE => {
                if self.objects.remove(path).is_none() {
                    return iam_error(StatusCode::NOT_FOUND, "ERR_UNKNOWN_ENTITY", "not found");
                }
                if let Some(gid) = path.strip_prefix(&format!("{}groups/", IAM_PREFIX)) {
                    self.members.remove(gid);
                }
                if let Some(rid) = path.strip_prefix(&format!("{}acls/", IAM_PREFIX)) {
                    self.grants.retain(|(r, _, _)| r != rid);
                }
                ApiResponse::empty(StatusCode::NO_CONTENT)
            },
            _ => method_not_allowed(),
        }
    }

    /// Metronome semantics: POST on the collection creates, PUT replaces.
    fn replace_on_put(&mut self, method: &Method, path: &str, body: Value) -> ApiResponse {
        match *method {
            Method::GET => match self.objects.get(path) {
                Some(stored) => ok(stored.clone()),
                None => not_found("Object not found".to_string()),
            },
            Method::PUT => match self.objects.get_mut(path) {
                Some(stored) => {
                    *stored = body.clone();
                    ok(body)
                },
                None => not_found("Object not found".to_string()),
            },
            Method::DELETE => {
                if self.objects.remove(path).is_none() {
                    return not_found("Object not found".to_string());
                }
                let nested = format!("{}/", path);
                self.objects.retain(|key, _| !key.starts_with(&nested));
                ApiResponse::empty(StatusCode::OK)
            },
            _ => method_not_allowed(),
        }
    }

    fn post_into(&mut self, collection: &str, body: Value) -> ApiResponse {
        let Some(id) = body["id"].as_str().filter(|id| !id.is_empty()) else {
            return message(StatusCode::UNPROCESSABLE_ENTITY, "Object is not valid");
        };
        let path = format!("{}/{}", collection, id);
        if self.objects.contains_key(&path) {
            return message(StatusCode::CONFLICT, "Job with this id already exists");
        }
        self.objects.insert(path, body.clone());
        ApiResponse::json(StatusCode::CREATED, &body)
    }

    fn group_members(&self, gid: &str) -> ApiResponse {
        if !self.objects.contains_key(&iam_path("groups", gid)) {
            return iam_error(StatusCode::NOT_FOUND, "ERR_UNKNOWN_GROUP_ID", "group not found");
        }
        let array: Vec<Value> = self
            .members
            .get(gid)
            .into_iter()
            .flatten()
            .map(|uid| {
                let user = self
                    .objects
                    .get(&iam_path("users", uid))
                    .cloned()
                    .unwrap_or_else(|| json!({ "uid": uid }));
                json!({ "user": user })
            })
            .collect();
        ok(json!({ "array": array }))
    }

    fn membership(&mut self, method: &Method, gid: &str, uid: &str) -> ApiResponse {
        if !self.objects.contains_key(&iam_path("groups", gid)) {
            return iam_error(StatusCode::NOT_FOUND, "ERR_UNKNOWN_GROUP_ID", "group not found");
        }
        let members = self.members.entry(gid.to_string()).or_default();
        match *method {
            Method::PUT => {
                if !members.insert(uid.to_string()) {
                    return iam_error(StatusCode::CONFLICT, "ERR_ALREADY_EXISTS", "already member");
                }
                ApiResponse::empty(StatusCode::NO_CONTENT)
            },
            Method::DELETE => {
                if !members.remove(uid) {
                    return iam_error(StatusCode::NOT_FOUND, "ERR_UNKNOWN_ENTITY", "not a member");
                }
                ApiResponse::empty(StatusCode::NO_CONTENT)
            },
            _ => method_not_allowed(),
        }
    }

    fn grant(&mut self, method: &Method, rid: &str, uid: &str, action: &str) -> ApiResponse {
        if !self.objects.contains_key(&iam_path("acls", rid)) {
            return iam_error(StatusCode::NOT_FOUND, "ERR_UNKNOWN_RESOURCE_ID", "ACL not found");
        }
        let key = (rid.to_string(), uid.to_string(), action.to_string());
        match *method {
            Method::GET => ok(json!({ "allowed": self.grants.contains(&key) })),
            Method::PUT => {
                if !self.grants.insert(key) {
                    return iam_error(StatusCode::CONFLICT, "ERR_ALREADY_EXISTS", "already granted");
                }
                ApiResponse::empty(StatusCode::NO_CONTENT)
            },
            Method::DELETE => {
                if !self.grants.remove(&key) {
                    return iam_error(StatusCode::NOT_FOUND, "ERR_UNKNOWN_ENTITY", "not granted");
                }
                ApiResponse::empty(StatusCode::NO_CONTENT)
            },
            _ => method_not_allowed(),
        }
    }

    fn saml_callback(&self, request: &ApiRequest, id: &str) -> ApiResponse {
        let provider = format!("{}auth/saml/providers/{}", IAM_PREFIX, id);
        if !self.objects.contains_key(&provider) {
            return iam_error(StatusCode::NOT_FOUND, "ERR_UNKNOWN_PROVIDER", "provider not found");
        }
        let url = format!(
            "{}{}/acs-callback",
            request.url.origin().ascii_serialization(),
            provider
        );
        ok(json!({ "acs-callback-url": url }))
    }

    fn saml_metadata(&self, request: &ApiRequest, id: &str) -> ApiResponse {
        let provider = format!("{}auth/saml/providers/{}", IAM_PREFIX, id);
        if !self.objects.contains_key(&provider) {
            return iam_error(StatusCode::NOT_FOUND, "ERR_UNKNOWN_PROVIDER", "provider not found");
        }
        ApiResponse::text(
            StatusCode::OK,
            format!(
                "<md:EntityDescriptor entityID=\"{}{}/sp-metadata\"/>",
                request.url.origin().ascii_serialization(),
                provider
            ),
        )
    }

    fn install(&mut self, body: &Value) -> ApiResponse {
        let name = body["packageName"].as_str().unwrap_or_default();
        let Some(versions) = self.catalog.get(name) else {
            return cosmos_error("PackageNotFound", format!("Package [{}] not found", name));
        };
        let version = match body["packageVersion"].as_str() {
            Some(v) if versions.iter().any(|known| known == v) => v.to_string(),
            Some(v) => {
                return cosmos_error("VersionNotFound", format!("Version [{}] not found", v))
            },
            None => versions.last().cloned().unwrap_or_default(),
        };
        let app_id = normalize_app_id(body["appId"].as_str().unwrap_or(name));
        if self.services.contains_key(&app_id) {
            return ApiResponse::json(
                StatusCode::CONFLICT,
                &json!({
                    "type": "MarathonAppAlreadyExists",
                    "message": format!("A service with the same name [{}] already exists", app_id)
                }),
            );
        }

        let options = body.get("options").cloned().unwrap_or_else(|| json!({}));
        self.services.insert(
            app_id.clone(),
            json!({
                "package": { "name": name, "version": version },
                "userProvidedOptions": options,
                "resolvedOptions": options,
            }),
        );
        self.apps.insert(
            app_id.clone(),
            json!({
                "id": app_id,
                "instances": 1,
                "labels": { "DCOS_PACKAGE_NAME": name, "DCOS_PACKAGE_VERSION": version },
                "tasksRunning": 1,
                "tasksHealthy": 1
            }),
        );
        ok(json!({ "packageName": name, "packageVersion": version, "appId": app_id }))
    }

    fn uninstall(&mut self, body: &Value) -> ApiResponse {
        let app_id = normalize_app_id(body["appId"].as_str().unwrap_or_default());
        if self.services.remove(&app_id).is_none() {
            return not_found(format!("Service [{}] not found", app_id));
        }
        self.apps.remove(&app_id);
        ok(json!({
            "results": [{ "packageName": body["packageName"], "appId": app_id }]
        }))
    }

    fn describe_service(&self, body: &Value) -> ApiResponse {
        let app_id = normalize_app_id(body["appId"].as_str().unwrap_or_default());
        match self.services.get(&app_id) {
            Some(service) => ok(service.clone()),
            None => cosmos_error("MarathonAppNotFound", format!("Service [{}] not found", app_id)),
        }
    }

    fn update_service(&mut self, body: &Value) -> ApiResponse {
        let app_id = normalize_app_id(body["appId"].as_str().unwrap_or_default());
        let Some(service) = self.services.get_mut(&app_id) else {
            return cosmos_error("MarathonAppNotFound", format!("Service [{}] not found", app_id));
        };

        if let Some(version) = body["packageVersion"].as_str() {
            let name = service["package"]["name"].as_str().unwrap_or_default();
            let known = self
                .catalog
                .get(name)
                .is_some_and(|versions| versions.iter().any(|v| v == version));
            if !known {
                return cosmos_error("VersionNotFound", format!("Version [{}] not found", version));
            }
            service["package"]["version"] = json!(version);
        }

        if let Some(options) = body.get("options").filter(|o| o.is_object()) {
            if body["replace"].as_bool().unwrap_or(false) {
                service["userProvidedOptions"] = options.clone();
            } else {
                merge(&mut service["userProvidedOptions"], options);
            }
            service["resolvedOptions"] = service["userProvidedOptions"].clone();
        }

        ok(json!({
            "package": service["package"].clone(),
            "resolvedOptions": service["resolvedOptions"].clone(),
            "marathonDeploymentId": "deployment-1"
        }))
    }

    fn describe_package(&self, body: &Value) -> ApiResponse {
        let name = body["packageName"].as_str().unwrap_or_default();
        let Some(versions) = self.catalog.get(name) else {
            return cosmos_error("PackageNotFound", format!("Package [{}] not found", name));
        };
        let version = match body["packageVersion"].as_str() {
            Some(v) if versions.iter().any(|known| known == v) => v.to_string(),
            Some(v) => {
                return cosmos_error("VersionNotFound", format!("Version [{}] not found", v))
            },
            None => versions.last().cloned().unwrap_or_default(),
        };
        ok(json!({
            "package": {
                "name": name,
                "version": version,
                "description": format!("{} package", name)
            }
        }))
    }

    fn list_versions(&self, body: &Value) -> ApiResponse {
        let name = body["packageName"].as_str().unwrap_or_default();
        match self.catalog.get(name) {
            Some(versions) => {
                let results: serde_json::Map<String, Value> = versions
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (v.clone(), json!(i.to_string())))
                    .collect();
                ok(json!({ "results": results }))
            },
            None => cosmos_error("PackageNotFound", format!("Package [{}] not found", name)),
        }
    }

    fn add_repository(&mut self, body: &Value) -> ApiResponse {
        let name = body["name"].as_str().unwrap_or_default();
        if self.repositories.iter().any(|r| r["name"] == name) {
            return ApiResponse::json(
                StatusCode::CONFLICT,
                &json!({
                    "type": "RepositoryAlreadyPresent",
                    "message": format!("Repository name [{}] is already present", name)
                }),
            );
        }
        let repo = json!({ "name": name, "uri": body["uri"] });
        let index = body["index"]
            .as_u64()
            .map(|i| (i as usize).min(self.repositories.len()))
            .unwrap_or(self.repositories.len());
        self.repositories.insert(index, repo);
        self.repository_list()
    }

    fn repository_list(&self) -> ApiResponse {
        ok(json!({ "repositories": self.repositories }))
    }

    fn delete_repository(&mut self, body: &Value) -> ApiResponse {
        let name = body["name"].as_str().unwrap_or_default();
        let before = self.repositories.len();
        self.repositories.retain(|r| r["name"] != name);
        if self.repositories.len() == before {
            return not_found(format!("Repository [{}] is not present", name));
        }
        self.repository_list()
    }
}

fn login(body: &Value) -> ApiResponse {
    let uid = body["uid"].as_str().unwrap_or_default();
    let has_secret = ["password", "token"]
        .iter()
        .any(|key| body[*key].as_str().is_some_and(|s| !s.is_empty()));
    if uid.is_empty() || !has_secret {
        return iam_error(
            StatusCode::UNAUTHORIZED,
            "ERR_INVALID_CREDENTIALS",
            "login request is missing credentials",
        );
    }
    ok(json!({ "token": format!("token-for-{}", uid) }))
}

/// Fill in the fields the IAM service derives itself.
fn annotate(path: &str, body: &mut Value) {
    let Some(rest) = path.strip_prefix(IAM_PREFIX) else {
        return;
    };
    if let Some(uid) = rest.strip_prefix("users/") {
        body["uid"] = json!(uid);
        body["is_service"] = json!(body.get("public_key").is_some_and(|k| !k.is_null()));
    } else if let Some(gid) = rest.strip_prefix("groups/") {
        body["gid"] = json!(gid);
    }
}

fn merge(target: &mut Value, patch: &Value) {
    let (Some(target), Some(patch)) = (target.as_object_mut(), patch.as_object()) else {
        return;
    };
    for (key, value) in patch {
        if !value.is_null() {
            target.insert(key.clone(), value.clone());
        }
    }
}

fn iam_path(kind: &str, id: &str) -> String {
    format!("{}{}/{}", IAM_PREFIX, kind, id)
}

fn normalize_app_id(id: &str) -> String {
    format!("/{}", id.trim_matches('/'))
}

fn ok(body: Value) -> ApiResponse {
    ApiResponse::json(StatusCode::OK, &body)
}

fn message(status: StatusCode, message: &str) -> ApiResponse {
    ApiResponse::json(status, &json!({ "message": message }))
}

fn not_found(msg: String) -> ApiResponse {
    message(StatusCode::NOT_FOUND, &msg)
}

fn method_not_allowed() -> ApiResponse {
    message(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
}

fn iam_error(status: StatusCode, code: &str, description: &str) -> ApiResponse {
    ApiResponse::json(
        status,
        &json!({
            "title": status.canonical_reason().unwrap_or_default(),
            "description": description,
            "code": code
        }),
    )
}

fn cosmos_error(kind: &str, msg: String) -> ApiResponse {
    ApiResponse::json(
        StatusCode::BAD_REQUEST,
        &json!({ "type": kind, "message": msg }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::DcosClient;
    use crate::config::ClusterConfig;
    use std::sync::Arc;

    fn client(fake: &Arc<FakeCluster>) -> DcosClient {
        DcosClient::with_transport(ClusterConfig::new("https://cluster"), fake.clone()).unwrap()
    }

    #[tokio::test]
    async fn test_override_wins_over_routes() {
        let fake = Arc::new(FakeCluster::new());
        fake.respond(
            Method::GET,
            "/dcos-metadata/dcos-version.json",
            ApiResponse::json(StatusCode::OK, &json!({"version": "1.13.0"})),
        );
        let version = client(&fake).metadata().version().await.unwrap();
        assert_eq!(version.version, "1.13.0");
    }

    #[tokio::test]
    async fn test_users_hide_passwords() {
        let fake = Arc::new(FakeCluster::new());
        let path = "/acs/api/v1/users/alice";
        fake.insert(path, json!({"uid": "alice", "password": "x"}));

        let client = client(&fake);
        client.iam().get_user("alice").await.unwrap();
        let raw = fake.get(path).unwrap();
        assert_eq!(raw["password"], "x");

        let response = fake
            .execute(fake.requests()[0].clone())
            .await
            .unwrap();
        let shown: Value = serde_json::from_slice(&response.body).unwrap();
        assert!(shown.get("password").is_none());
    }

    #[tokio::test]
    async fn test_schedules_require_job() {
        let fake = Arc::new(FakeCluster::new());
        let schedule = crate::client::jobs::JobSchedule {
            id: "daily".into(),
            cron: "0 0 * * *".into(),
            timezone: "UTC".into(),
            enabled: true,
            starting_deadline_seconds: None,
            concurrency_policy: "ALLOW".into(),
        };
        let err = client(&fake)
            .jobs()
            .create_schedule("missing", &schedule)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let fake = Arc::new(FakeCluster::new());
        let err = client(&fake)
            .marathon()
            .get_app("/nowhere")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(fake.requests().len(), 1);
        fake.clear_requests();
        assert!(fake.requests().is_empty());
    }
}
