//! Authenticated session with a MusicBrainz server
//!
//! MusicBrainz has no editing API, so edits are made the way a browser makes
//! them: log in through the HTML form, keep the session cookie, and POST
//! form-encoded bodies to the same endpoints the website's forms use.
//!
//! Every request (including dry-run ones) first waits on a token bucket so
//! the bot stays within https://musicbrainz.org/doc/MusicBrainz_API/Rate_Limiting.
//! The wait is the only suspension point besides the request itself and
//! aborts with [`EditError::Cancelled`] when the session's token fires.

use crate::batch::{edit_id_regex, find_edit_id, parse_batch_response, FormFields, RELATIONSHIP_EDITOR_PATH};
use crate::error::{EditError, EditResult};
use crate::models::Entity;
use crate::scrape::parse_edit_page;
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use mbbot_common::config::{Credentials, Settings};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{header, Client, StatusCode};
use std::num::NonZeroU32;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// Hidden inputs on the login form. Without them the server rejects the login
// as an expired form submission.
static CSRF_SESSION_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<input name="csrf_session_key"\s+type="hidden"\s+value="([^"]+)""#)
        .expect("csrf_session_key regex")
});
static CSRF_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<input name="csrf_token"\s+type="hidden"\s+value="([^"]+)""#)
        .expect("csrf_token regex")
});

const BAD_LOGIN_TEXT: &str = "Incorrect username or password";

/// Reads entity state from the server
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Fetch the entity of `entity_type` (e.g. "url") identified by `mbid`.
    async fn fetch_entity(&self, mbid: &str, entity_type: &str) -> EditResult<Entity>;
}

/// Enters and cancels edits
#[async_trait]
pub trait EditSubmitter: Send + Sync {
    /// POST an entity edit page and return the ID of the created edit.
    async fn submit_field_edit(&self, path: &str, form: &FormFields) -> EditResult<u64>;

    /// POST to the relationship editor and return one relationship ID per
    /// operation (0 for edits of existing relationships).
    async fn submit_relationship_batch(&self, form: &FormFields) -> EditResult<Vec<u64>>;

    /// Cancel a previously-entered edit.
    async fn cancel_edit(&self, edit_id: u64, edit_note: &str) -> EditResult<()>;
}

/// Connection options
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Base URL without trailing slash, e.g. "https://musicbrainz.org"
    pub server_url: String,
    pub user_agent: String,
    pub max_qps: u32,
    /// Log POSTs instead of sending them
    pub dry_run: bool,
}

impl SessionOptions {
    pub fn from_settings(settings: &Settings, dry_run: bool) -> Self {
        Self {
            server_url: settings.server_url.clone(),
            user_agent: settings.user_agent.clone(),
            max_qps: settings.max_qps,
            dry_run,
        }
    }
}

/// Cookie-authenticated, rate-limited connection to a server
pub struct Session {
    server_url: String,
    client: Client,
    limiter: DefaultDirectRateLimiter,
    dry_run: bool,
    edit_id_re: Regex,
    cancel: CancellationToken,
}

impl Session {
    /// Create a session. No requests are made until [`Session::login`].
    pub fn new(opts: SessionOptions, cancel: CancellationToken) -> EditResult<Self> {
        let max_qps = NonZeroU32::new(opts.max_qps).ok_or_else(|| {
            EditError::Common(mbbot_common::Error::Config(
                "max_qps must be greater than zero".to_string(),
            ))
        })?;
        let edit_id_re = edit_id_regex(&opts.server_url)
            .map_err(|e| EditError::Common(mbbot_common::Error::Config(e.to_string())))?;

        let client = Client::builder()
            .user_agent(opts.user_agent)
            .cookie_store(true)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            server_url: opts.server_url,
            client,
            limiter: RateLimiter::direct(Quota::per_second(max_qps)),
            dry_run: opts.dry_run,
            edit_id_re,
            cancel,
        })
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Log in through the website's login form.
    ///
    /// The login POST is sent even in dry-run mode so that the credentials
    /// and the page fetches that follow are real.
    pub async fn login(&self, creds: &Credentials) -> EditResult<()> {
        let page = self.get("/login").await?;
        let session_key = capture(&CSRF_SESSION_KEY, &page)
            .ok_or_else(|| EditError::Login("didn't find csrf_session_key input".to_string()))?;
        let token = capture(&CSRF_TOKEN, &page)
            .ok_or_else(|| EditError::Login("didn't find csrf_token input".to_string()))?;

        let form: FormFields = [
            ("csrf_session_key", session_key.as_str()),
            ("csrf_token", token.as_str()),
            ("username", creds.username.as_str()),
            ("password", creds.password.as_str()),
            ("remember_me", "1"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let page = self.send_form("/login", &form).await?;

        // The session cookie is set even for anonymous visitors, so check the
        // page for an error message and then for a link to the user's profile.
        if page.contains(BAD_LOGIN_TEXT) {
            return Err(EditError::Login("incorrect username or password".to_string()));
        }
        if !page.contains(&format!(r#"<a href="/user/{}">"#, creds.username)) {
            debug!(body = %page, "Login response without profile link");
            return Err(EditError::Login("missing profile link".to_string()));
        }

        info!(user = %creds.username, server = %self.server_url, "Logged in");
        Ok(())
    }

    /// GET `path` and return the response body.
    pub async fn get(&self, path: &str) -> EditResult<String> {
        self.wait_for_permit().await?;
        let url = format!("{}{}", self.server_url, path);
        debug!(url = %url, "GET");
        let response = self.client.get(&url).send().await?;
        read_body(path, response).await
    }

    /// POST `form` to `path`. In dry-run mode the request is only logged and
    /// a canned response is returned.
    pub async fn post(&self, path: &str, form: &FormFields) -> EditResult<String> {
        if self.dry_run {
            self.wait_for_permit().await?;
            info!(path = %path, fields = ?form, "Dry run: not posting");
            return Ok(self.dry_run_response(path, form));
        }
        self.send_form(path, form).await
    }

    async fn send_form(&self, path: &str, form: &FormFields) -> EditResult<String> {
        self.wait_for_permit().await?;
        let url = format!("{}{}", self.server_url, path);
        debug!(url = %url, fields = form.len(), "POST");
        let response = self
            .client
            .post(&url)
            .header(header::ORIGIN, &self.server_url)
            .form(form)
            .send()
            .await?;
        read_body(path, response).await
    }

    async fn wait_for_permit(&self) -> EditResult<()> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(EditError::Cancelled),
            _ = self.limiter.until_ready() => Ok(()),
        }
    }

    fn dry_run_response(&self, path: &str, form: &FormFields) -> String {
        if path == RELATIONSHIP_EDITOR_PATH {
            // One successful outcome per operation in the batch
            let ops = form
                .keys()
                .filter(|k| k.starts_with("rel-editor.rels.") && k.ends_with(".action"))
                .count();
            let outcome = serde_json::json!({ "edit_type": 1, "response": 1 });
            serde_json::json!({ "edits": vec![outcome; ops] }).to_string()
        } else if path.ends_with("/edit") {
            format!("{}/edit/0", self.server_url)
        } else {
            String::new()
        }
    }
}

#[async_trait]
impl CatalogClient for Session {
    async fn fetch_entity(&self, mbid: &str, entity_type: &str) -> EditResult<Entity> {
        let page = self.get(&format!("/{}/{}/edit", entity_type, mbid)).await?;
        parse_edit_page(&page)
    }
}

#[async_trait]
impl EditSubmitter for Session {
    async fn submit_field_edit(&self, path: &str, form: &FormFields) -> EditResult<u64> {
        let body = self.post(path, form).await?;
        find_edit_id(&self.edit_id_re, &body).ok_or(EditError::MissingEditId)
    }

    async fn submit_relationship_batch(&self, form: &FormFields) -> EditResult<Vec<u64>> {
        let body = self.post(RELATIONSHIP_EDITOR_PATH, form).await?;
        parse_batch_response(&body)
    }

    async fn cancel_edit(&self, edit_id: u64, edit_note: &str) -> EditResult<()> {
        let mut form = FormFields::new();
        form.insert("confirm.edit_note".to_string(), edit_note.to_string());
        self.post(&format!("/edit/{}/cancel", edit_id), &form).await?;
        Ok(())
    }
}

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)?.get(1).map(|m| m.as_str().to_string())
}

/// Map the response status to an error, or return the body on success.
async fn read_body(path: &str, response: reqwest::Response) -> EditResult<String> {
    let status = response.status();
    let body = response.text().await?;
    if status.is_success() {
        return Ok(body);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(EditError::NotFound(path.to_string()));
    }
    if status.is_server_error() {
        return Err(EditError::Transient(format!("{} for {}", status, path)));
    }
    Err(EditError::Http {
        status: status.as_u16(),
        path: path.to_string(),
        body,
    })
}
