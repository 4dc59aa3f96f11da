//! レジストリ認証
//!
//! Docker の config.json（`auths` / `credsStore` / `credHelpers`）から
//! プッシュ・プル時に使う認証情報を解決します。

use crate::error::{EngineError, EngineResult};
use base64::Engine;
use bollard::auth::DockerCredentials;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

const DOCKER_HUB: &str = "docker.io";
const DOCKER_HUB_INDEX: &str = "https://index.docker.io/v1/";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DockerConfigFile {
    #[serde(default)]
    auths: HashMap<String, AuthEntry>,
    #[serde(default)]
    creds_store: Option<String>,
    #[serde(default)]
    cred_helpers: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct AuthEntry {
    auth: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HelperResponse {
    username: String,
    secret: String,
}

/// レジストリ認証情報の解決
#[derive(Debug, Clone)]
pub struct RegistryAuth {
    config_path: PathBuf,
}

impl Default for RegistryAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryAuth {
    /// DOCKER_CONFIG または ~/.docker/config.json を使用
    pub fn new() -> Self {
        let dir = std::env::var_os("DOCKER_CONFIG")
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|h| h.join(".docker")))
            .unwrap_or_else(|| PathBuf::from(".docker"));

        Self::with_config_path(dir.join("config.json"))
    }

    pub fn with_config_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    /// イメージ参照に対応するレジストリの認証情報
    ///
    /// 見つからない場合は `Ok(None)`（匿名アクセス）。
    pub fn credentials_for(&self, image: &str) -> EngineResult<Option<DockerCredentials>> {
        if !self.config_path.exists() {
            tracing::debug!("docker config not found: {}", self.config_path.display());
            return Ok(None);
        }

        let registry = registry_for(image);
        let config = self.load()?;

        // 1. レジストリ個別の credential helper
        if let Some(helper) = config.cred_helpers.get(&registry) {
            return self.from_helper(helper, &registry);
        }

        // 2. auths
        let mut keys = vec![registry.as_str()];
        if registry == DOCKER_HUB {
            keys.insert(0, DOCKER_HUB_INDEX);
        }
        for key in keys {
            if let Some(auth) = config.auths.get(key).and_then(|e| e.auth.as_deref()) {
                if let Some(creds) = decode_auth(auth, key)? {
                    return Ok(Some(creds));
                }
            }
        }

        // 3. 共通の credential helper
        if let Some(store) = &config.creds_store {
            let server = if registry == DOCKER_HUB {
                DOCKER_HUB_INDEX
            } else {
                registry.as_str()
            };
            return self.from_helper(store, server);
        }

        Ok(None)
    }

    fn load(&self) -> EngineResult<DockerConfigFile> {
        let auth_error = |message: String| EngineError::AuthFailed {
            registry: self.config_path.display().to_string(),
            message,
        };

        let content = std::fs::read_to_string(&self.config_path)
            .map_err(|e| auth_error(format!("failed to read config.json: {}", e)))?;
        serde_json::from_str(&content)
            .map_err(|e| auth_error(format!("failed to parse config.json: {}", e)))
    }

    fn from_helper(&self, helper: &str, server: &str) -> EngineResult<Option<DockerCredentials>> {
        let program = format!("docker-credential-{}", helper);
        let auth_error = |message: String| EngineError::AuthFailed {
            registry: server.to_string(),
            message,
        };

        let mut child = Command::new(&program)
            .arg("get")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| auth_error(format!("failed to run {}: {}", program, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(server.as_bytes()).ok();
        }

        let output = child
            .wait_with_output()
            .map_err(|e| auth_error(format!("{} failed: {}", program, e)))?;

        if !output.status.success() {
            tracing::debug!(
                "{} has no credentials for {}: {}",
                program,
                server,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return Ok(None);
        }

        let response: HelperResponse = serde_json::from_slice(&output.stdout)
            .map_err(|e| auth_error(format!("invalid response from {}: {}", program, e)))?;

        Ok(Some(DockerCredentials {
            username: Some(response.username),
            password: Some(response.secret),
            serveraddress: Some(server.to_string()),
            ..Default::default()
        }))
    }
}

fn decode_auth(auth_b64: &str, server: &str) -> EngineResult<Option<DockerCredentials>> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(auth_b64.trim())
        .map_err(|e| EngineError::AuthFailed {
            registry: server.to_string(),
            message: format!("failed to decode auth: {}", e),
        })?;
    let decoded = String::from_utf8_lossy(&decoded);

    Ok(decoded
        .split_once(':')
        .map(|(username, password)| DockerCredentials {
            username: Some(username.to_string()),
            password: Some(password.to_string()),
            serveraddress: Some(server.to_string()),
            ..Default::default()
        }))
}

/// イメージ参照からレジストリを取り出す
///
/// - `ghcr.io/org/app:v1` -> `ghcr.io`
/// - `localhost:5000/app` -> `localhost:5000`
/// - `myuser/app`, `nginx` -> `docker.io`
pub fn registry_for(image: &str) -> String {
    match image.split_once('/') {
        Some((first, _)) if first.contains('.') || first.contains(':') || first == "localhost" => {
            first.to_string()
        }
        _ => DOCKER_HUB.to_string(),
    }
}
