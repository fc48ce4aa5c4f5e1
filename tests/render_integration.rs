//! End-to-end tests through the axum router.
//!
//! Outbound HTTP is replaced by an in-memory upstream, so these tests never
//! touch the network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use axum::response::Response;
use tower::ServiceExt;
use url::Url;

use subtmpl_service::config::Settings;
use subtmpl_service::server::{create_app, AppState};
use subtmpl_service::source::{Upstream, UpstreamError};

const USERINFO: &str = "subscription-userinfo";

/// Serves canned templates and userinfo headers keyed by URL.
#[derive(Default)]
struct FakeUpstream {
    templates: HashMap<String, String>,
    userinfo: HashMap<String, String>,
    fetches: AtomicUsize,
    lookups: AtomicUsize,
}

impl FakeUpstream {
    fn template(mut self, url: &str, body: &str) -> Self {
        self.templates.insert(url.to_string(), body.to_string());
        self
    }

    fn userinfo(mut self, url: &str, value: &str) -> Self {
        self.userinfo.insert(url.to_string(), value.to_string());
        self
    }
}

#[async_trait]
impl Upstream for FakeUpstream {
    async fn fetch_template(&self, url: &Url) -> Result<String, UpstreamError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.templates
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| UpstreamError::Other(format!("connection refused: {}", url)))
    }

    async fn fetch_userinfo(&self, url: &str) -> Result<Option<HeaderValue>, UpstreamError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        match self.userinfo.get(url) {
            Some(value) => Ok(Some(
                HeaderValue::from_str(value).map_err(|e| UpstreamError::Other(e.to_string()))?,
            )),
            None => Err(UpstreamError::Other("dns error".to_string())),
        }
    }
}

struct TestApp {
    upstream: Arc<FakeUpstream>,
    state: AppState,
}

impl TestApp {
    fn new(upstream: FakeUpstream) -> Self {
        let upstream = Arc::new(upstream);
        let state = AppState::with_upstream(Settings::default(), upstream.clone());
        Self { upstream, state }
    }

    async fn send(&self, method: Method, uri: &str, body: &str) -> Response {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::from(body.to_string()))
            .unwrap();

        create_app(self.state.clone()).oneshot(request).await.unwrap()
    }

    async fn get(&self, uri: &str) -> Response {
        self.send(Method::GET, uri, "").await
    }

    async fn post(&self, uri: &str, body: &str) -> Response {
        self.send(Method::POST, uri, body).await
    }

    fn fetches(&self) -> usize {
        self.upstream.fetches.load(Ordering::SeqCst)
    }
}

async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_text(response: Response) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}

const RAW: &str = "https://raw.githubusercontent.com/acme/templates/main/clash.tmpl";

#[tokio::test]
async fn test_get_renders_whitelisted_template() {
    let app = TestApp::new(FakeUpstream::default().template(RAW, "Hello, {{.name}}!\n"));

    let response = app
        .get(&format!("/?template={}&name=World", RAW))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
    assert_eq!(body_text(response).await, "Hello, World!\n");
    assert_eq!(app.fetches(), 1);
}

#[tokio::test]
async fn test_get_is_path_agnostic() {
    let app = TestApp::new(FakeUpstream::default().template(RAW, "ok"));

    let response = app
        .get(&format!("/any/path/at/all?template={}", RAW))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "ok");
}

#[tokio::test]
async fn test_get_rejects_unlisted_hosts() {
    let app = TestApp::new(FakeUpstream::default());

    for uri in [
        "/?template=http://example.com/x",
        "/?template=https://evil.test/raw.githubusercontent.com/x",
        "/?template=http://127.0.0.1:8080/admin",
        "/?template=http://localhost/",
    ] {
        let response = app.get(uri).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{}", uri);
    }
    assert_eq!(app.fetches(), 0);
}

#[tokio::test]
async fn test_get_rejects_non_http_scheme_before_network() {
    let app = TestApp::new(FakeUpstream::default());

    let response = app
        .get("/?template=ftp://raw.githubusercontent.com/acme/x")
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_text(response).await,
        "Unsupported url ftp://raw.githubusercontent.com/acme/x\n"
    );
    assert_eq!(app.fetches(), 0);
}

#[tokio::test]
async fn test_get_without_template_param() {
    let app = TestApp::new(FakeUpstream::default());

    let response = app.get("/?name=x").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_text(response).await,
        "Query parameter 'template' not found\n"
    );
}

#[tokio::test]
async fn test_get_fetch_failure_is_forbidden() {
    let app = TestApp::new(FakeUpstream::default());

    let response = app
        .get("/?template=https://gist.githubusercontent.com/missing")
        .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(body_text(response)
        .await
        .starts_with("Fetch template from https://gist.githubusercontent.com/missing: "));
}

#[tokio::test]
async fn test_fetched_template_parse_failure_is_forbidden() {
    let app = TestApp::new(FakeUpstream::default().template(RAW, "{{ .name "));

    let response = app.get(&format!("/?template={}", RAW)).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(body_text(response).await.starts_with("Parse template: "));
}

#[tokio::test]
async fn test_post_renders_body_with_query_variables() {
    let app = TestApp::new(FakeUpstream::default());

    let response = app
        .post("/?v=1&v=2&host=a.example", "v={{.v}} host={{.host}}")
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "v=2 host=a.example");
    assert_eq!(app.fetches(), 0);
}

#[tokio::test]
async fn test_post_empty_body_is_bad_request() {
    let app = TestApp::new(FakeUpstream::default());

    let response = app.post("/?x=1", "").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(response).await, "Empty template from body\n");
}

#[tokio::test]
async fn test_post_parse_failure_is_forbidden() {
    let app = TestApp::new(FakeUpstream::default());

    let response = app.post("/", "{{ undefinedHelper .x }}").await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_execution_failure_is_bad_request() {
    let app = TestApp::new(FakeUpstream::default());

    let response = app.post("/", r#"{{ encodeBase64 "a" "b" }}"#).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(response).await.starts_with("Render template: "));
}

#[tokio::test]
async fn test_malformed_helper_input_still_renders() {
    let app = TestApp::new(FakeUpstream::default());

    let response = app
        .post(
            "/?bad=%25zz",
            "[{{ decodeBase64 \"***\" }}][{{ decodeUrl .bad }}][{{ encodeBase64 \"hi\" }}][{{ decodeBase64 \"aGk=\" }}]",
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "[][][aGk=][hi]");
}

#[tokio::test]
async fn test_unsupported_methods_get_empty_405() {
    let app = TestApp::new(FakeUpstream::default());

    for method in [Method::PUT, Method::DELETE, Method::PATCH, Method::HEAD] {
        let response = app.send(method.clone(), "/?template=x", "body").await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "{}", method);
        assert!(body_text(response).await.is_empty());
    }
}

#[tokio::test]
async fn test_directives_set_response_headers() {
    let upstream = FakeUpstream::default()
        .template(
            RAW,
            "# Attribute: filename={{.name}}.yaml\n\
             # Attribute: userinfo-url=https://sub.example/api?token={{.token}}\n\
             proxies: []\n",
        )
        .userinfo(
            "https://sub.example/api?token=abc",
            "upload=1; download=2; total=10; expire=0",
        );
    let app = TestApp::new(upstream);

    let response = app
        .get(&format!("/?template={}&name=clash&token=abc", RAW))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=clash.yaml"
    );
    assert_eq!(
        response.headers()[USERINFO],
        "upload=1; download=2; total=10; expire=0"
    );
    assert!(body_text(response)
        .await
        .starts_with("# Attribute: filename=clash.yaml\n"));
}

#[tokio::test]
async fn test_directives_after_content_are_ignored() {
    let app = TestApp::new(FakeUpstream::default());

    let response = app
        .post(
            "/",
            "# Attribute: filename=a.txt\nhello\n# Attribute: userinfo-url=http://x\n",
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=a.txt"
    );
    assert!(response.headers().get(USERINFO).is_none());
    assert_eq!(app.upstream.lookups.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_failed_userinfo_lookup_is_ignored() {
    let app = TestApp::new(FakeUpstream::default());

    let response = app
        .post("/", "# Attribute: userinfo-url=https://down.example/\nbody")
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(USERINFO).is_none());
    assert_eq!(app.upstream.lookups.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_non_ascii_filename_is_encoded() {
    let app = TestApp::new(FakeUpstream::default());

    let response = app
        .post("/?n=%E9%85%8D%E7%BD%AE", "# Attribute: filename={{.n}}.yaml\n")
        .await;

    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename*=utf-8''%E9%85%8D%E7%BD%AE.yaml"
    );
}

#[tokio::test]
async fn test_index_reaches_dashed_parameter_names() {
    let app = TestApp::new(FakeUpstream::default());

    let template = r#"{{ index . "k-dash" }} {{ if gt (len .port) 3 }}long{{ end }}"#;
    let response = app.post("/?k-dash=v&port=8443", template).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "v long");
}

#[tokio::test]
async fn test_line_wrapped_base64_parameter_decodes() {
    let app = TestApp::new(FakeUpstream::default());

    let response = app
        .post("/?b=aGVs%0D%0AbG8%3D", "{{ decodeBase64 .b }}")
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "hello");
}

#[tokio::test]
async fn test_decoded_binary_reaches_the_client_unchanged() {
    let app = TestApp::new(FakeUpstream::default());

    let response = app
        .post("/?raw=%25FF%2500%25FE", "{{ decodeUrl .raw }}|{{ decodeBase64 \"/w==\" }}")
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, vec![0xFF, 0x00, 0xFE, b'|', 0xFF]);
}

#[tokio::test]
async fn test_url_accessors_on_parameters() {
    let app = TestApp::new(FakeUpstream::default());

    let response = app
        .post(
            "/?rel=%2Fa%2Fb%3Fx%3D1&abs=https%3A%2F%2Fcdn.example%3A443%2Fp",
            "{{ pathOf .rel }}|{{ queriesOf .rel }}|{{ hostOf .abs }}|{{ schemeOf .abs }}",
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "/a/b|x=1|cdn.example:443|https");
}

#[tokio::test]
async fn test_named_templates_render() {
    let app = TestApp::new(FakeUpstream::default());

    let template = "{{ define \"proxy\" }}- name: {{ . }}\n{{ end }}\
                    {{ range $i := 3 }}{{ template \"proxy\" (printf \"node-%d\" $i) }}{{ end }}";
    let response = app.post("/", template).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_text(response).await,
        "- name: node-0\n- name: node-1\n- name: node-2\n"
    );
}

#[tokio::test]
async fn test_excessive_nesting_is_rejected() {
    let app = TestApp::new(FakeUpstream::default());

    let nested = format!("{}x{}", "{{ if true }}".repeat(101), "{{ end }}".repeat(101));
    let response = app.post("/", &nested).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let recursive = r#"{{ define "r" }}{{ template "r" . }}{{ end }}{{ template "r" . }}"#;
    let response = app.post("/", recursive).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(response)
        .await
        .contains("exceeded maximum template depth"));
}
