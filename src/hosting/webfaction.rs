use log::{debug, info};
use reqwest::blocking::Client;
use zeroize::Zeroizing;

use super::http::{HttpClient, status_error};
use super::xmlrpc::{self, Value, XmlRpcError};
use super::{CertificateResource, CertificateUpload, HostingApi, HostingCredentials, HostingError};

/// Version of the WebFaction API this client speaks.
const API_VERSION: i64 = 2;

struct Session {
    endpoint: String,
    id: Zeroizing<String>,
}

/// WebFaction XML-RPC client.
pub struct WebfactionApi {
    client: &'static Client,
    session: Option<Session>,
}

impl Default for WebfactionApi {
    fn default() -> Self {
        Self::new()
    }
}

impl WebfactionApi {
    pub fn new() -> Self {
        Self {
            client: HttpClient::shared(),
            session: None,
        }
    }

    fn call(&self, endpoint: &str, method: &str, params: &[Value]) -> Result<Value, HostingError> {
        debug!("[hosting] calling {method}");
        let response = self
            .client
            .post(endpoint)
            .header("Content-Type", "text/xml")
            .body(xmlrpc::encode_call(method, params))
            .send()
            .map_err(|e| HostingError::Transport(format!("{method}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().ok();
            return Err(status_error(status, body));
        }
        let body = response
            .text()
            .map_err(|e| HostingError::Transport(format!("{method}: {e}")))?;

        xmlrpc::decode_response(&body).map_err(|err| match err {
            XmlRpcError::Fault { code, message } => HostingError::Fault { code, message },
            XmlRpcError::Malformed(message) => HostingError::Malformed(message),
        })
    }

    fn session_call(&self, method: &str, params: &[Value]) -> Result<Value, HostingError> {
        let session = self.session.as_ref().ok_or(HostingError::NotLoggedIn)?;
        let mut all = Vec::with_capacity(params.len() + 1);
        all.push(Value::String(session.id.to_string()));
        all.extend_from_slice(params);
        self.call(&session.endpoint, method, &all)
    }

    fn upload_params(upload: &CertificateUpload<'_>) -> [Value; 4] {
        [
            upload.name.into(),
            upload.certificate.into(),
            upload.private_key.into(),
            upload.intermediates.into(),
        ]
    }
}

fn parse_certificate(value: &Value) -> Result<CertificateResource, HostingError> {
    let name = value
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| HostingError::Malformed("certificate entry without a name".into()))?;
    Ok(CertificateResource {
        id: value.get("id").and_then(Value::as_i64),
        name: name.to_string(),
        domains: value.get("domains").and_then(Value::as_str).map(str::to_string),
        expiry_date: value
            .get("expiry_date")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

impl HostingApi for WebfactionApi {
    fn login(&mut self, credentials: &HostingCredentials) -> Result<(), HostingError> {
        let params = [
            credentials.username.as_str().into(),
            credentials.password.as_str().into(),
            credentials.server_name.as_str().into(),
            Value::Int(API_VERSION),
        ];
        let response = self
            .call(&credentials.api_url, "login", &params)
            .map_err(|err| match err {
                HostingError::Fault { code, message } => {
                    HostingError::Authentication(format!("fault {code}: {message}"))
                }
                other => other,
            })?;

        let session_id = response
            .as_array()
            .and_then(|items| items.first())
            .and_then(Value::as_str)
            .ok_or_else(|| HostingError::Malformed("login did not return a session id".into()))?;

        info!(
            "[hosting] logged in as {} on {}",
            credentials.username, credentials.server_name
        );
        self.session = Some(Session {
            endpoint: credentials.api_url.clone(),
            id: Zeroizing::new(session_id.to_string()),
        });
        Ok(())
    }

    fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    fn list_certificates(&mut self) -> Result<Vec<CertificateResource>, HostingError> {
        let response = self.session_call("list_certificates", &[])?;
        let items = response
            .as_array()
            .ok_or_else(|| HostingError::Malformed("list_certificates did not return an array".into()))?;
        items.iter().map(parse_certificate).collect()
    }

    fn create_certificate(&mut self, upload: &CertificateUpload<'_>) -> Result<(), HostingError> {
        self.session_call("create_certificate", &Self::upload_params(upload))?;
        Ok(())
    }

    fn update_certificate(&mut self, upload: &CertificateUpload<'_>) -> Result<(), HostingError> {
        self.session_call("update_certificate", &Self::upload_params(upload))?;
        Ok(())
    }
}
