use letsencrypt_webfaction::hosting::webfaction::WebfactionApi;
use letsencrypt_webfaction::hosting::{
    CertificateUpload, HostingApi, HostingCredentials, HostingError,
};
use wiremock::matchers::{body_string_contains, method};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zeroize::Zeroizing;

const LOGIN_OK: &str = r#"<?xml version='1.0'?>
<methodResponse><params><param><value><array><data>
<value><string>session-abc</string></value>
<value><struct><member><name>username</name><value><string>alice</string></value></member></struct></value>
</data></array></value></param></params></methodResponse>"#;

const LOGIN_FAULT: &str = r#"<?xml version='1.0'?>
<methodResponse><fault><value><struct>
<member><name>faultCode</name><value><int>1</int></value></member>
<member><name>faultString</name><value><string>LoginError</string></value></member>
</struct></value></fault></methodResponse>"#;

const LIST_WITH_SITE: &str = r#"<?xml version='1.0'?>
<methodResponse><params><param><value><array><data>
<value><struct>
<member><name>id</name><value><int>12</int></value></member>
<member><name>name</name><value><string>site</string></value></member>
<member><name>domains</name><value><string>example.com</string></value></member>
</struct></value>
</data></array></value></param></params></methodResponse>"#;

const EMPTY_OK: &str = r#"<?xml version='1.0'?>
<methodResponse><params><param><value><struct></struct></value></param></params></methodResponse>"#;

fn credentials(api_url: String) -> HostingCredentials {
    HostingCredentials {
        username: "alice".into(),
        password: Zeroizing::new("s3cret&<".into()),
        server_name: "Web500".into(),
        api_url,
    }
}

async fn mount(server: &MockServer, method_name: &str, status: u16, body: &str) {
    Mock::given(method("POST"))
        .and(body_string_contains(format!(
            "<methodName>{method_name}</methodName>"
        )))
        .respond_with(ResponseTemplate::new(status).set_body_string(body.to_string()))
        .mount(server)
        .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn login_list_and_update_over_http() {
    let server = MockServer::start().await;
    mount(&server, "login", 200, LOGIN_OK).await;
    mount(&server, "list_certificates", 200, LIST_WITH_SITE).await;
    mount(&server, "update_certificate", 200, EMPTY_OK).await;

    let creds = credentials(server.uri());
    let listed = tokio::task::spawn_blocking(move || {
        let mut api = WebfactionApi::new();
        api.login(&creds)?;
        assert!(api.is_authenticated());
        let listed = api.list_certificates()?;
        api.update_certificate(&CertificateUpload {
            name: "site",
            certificate: "-----BEGIN CERTIFICATE-----\nleaf\n-----END CERTIFICATE-----\n",
            private_key: "key",
            intermediates: "",
        })?;
        Ok::<_, HostingError>(listed)
    })
    .await
    .expect("blocking task")
    .expect("api calls succeed");

    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "site");
    assert_eq!(listed[0].id, Some(12));

    let requests = server.received_requests().await.expect("recorded requests");
    let bodies: Vec<String> = requests
        .iter()
        .map(|request| String::from_utf8_lossy(&request.body).into_owned())
        .collect();
    assert_eq!(bodies.len(), 3);
    assert!(bodies[0].contains("<string>s3cret&amp;&lt;</string>"));
    assert!(bodies[0].contains("<int>2</int>"));
    assert!(bodies[1].contains("<string>session-abc</string>"));
    assert!(bodies[2].contains("<string>session-abc</string>"));
    assert!(bodies[2].contains("<string>site</string>"));
}

#[tokio::test(flavor = "multi_thread")]
async fn login_fault_is_an_authentication_error() {
    let server = MockServer::start().await;
    mount(&server, "login", 200, LOGIN_FAULT).await;

    let creds = credentials(server.uri());
    let result = tokio::task::spawn_blocking(move || {
        let mut api = WebfactionApi::new();
        let result = api.login(&creds);
        (result, api.is_authenticated())
    })
    .await
    .expect("blocking task");

    let (result, authenticated) = result;
    assert!(matches!(result, Err(HostingError::Authentication(msg)) if msg.contains("LoginError")));
    assert!(!authenticated);
}

#[tokio::test(flavor = "multi_thread")]
async fn faults_after_login_are_not_authentication_errors() {
    let server = MockServer::start().await;
    mount(&server, "login", 200, LOGIN_OK).await;
    mount(&server, "create_certificate", 200, LOGIN_FAULT).await;

    let creds = credentials(server.uri());
    let result = tokio::task::spawn_blocking(move || {
        let mut api = WebfactionApi::new();
        api.login(&creds)?;
        api.create_certificate(&CertificateUpload {
            name: "site",
            certificate: "cert",
            private_key: "key",
            intermediates: "",
        })
    })
    .await
    .expect("blocking task");

    assert!(matches!(result, Err(HostingError::Fault { code: 1, .. })));
}

#[tokio::test(flavor = "multi_thread")]
async fn http_errors_are_mapped_by_status() {
    let server = MockServer::start().await;
    mount(&server, "login", 403, "forbidden").await;

    let creds = credentials(server.uri());
    let forbidden = tokio::task::spawn_blocking(move || WebfactionApi::new().login(&creds))
        .await
        .expect("blocking task");
    assert!(matches!(forbidden, Err(HostingError::Authentication(_))));

    let server = MockServer::start().await;
    mount(&server, "login", 502, "bad gateway").await;
    let creds = credentials(server.uri());
    let unavailable = tokio::task::spawn_blocking(move || WebfactionApi::new().login(&creds))
        .await
        .expect("blocking task");
    assert!(matches!(unavailable, Err(HostingError::Api(msg)) if msg.contains("bad gateway")));
}

#[tokio::test(flavor = "multi_thread")]
async fn non_xml_responses_are_malformed() {
    let server = MockServer::start().await;
    mount(&server, "login", 200, "<html>maintenance</html>").await;

    let creds = credentials(server.uri());
    let result = tokio::task::spawn_blocking(move || WebfactionApi::new().login(&creds))
        .await
        .expect("blocking task");
    assert!(matches!(result, Err(HostingError::Malformed(_))));
}
