//! Client for the remote preset API.

use reqwest::{Client, Response, Url};
use serde::Serialize;
use tracing::debug;

use crate::error::PidsError;
use crate::models::LineData;

/// Longest response body kept in a [`PidsError::PresetApi`].
const ERROR_BODY_LIMIT: usize = 512;

#[derive(Serialize)]
struct CreateBody<'a> {
    name: &'a str,
    line: &'a LineData,
}

/// CRUD over named presets at `{base}/lines`.
#[derive(Clone)]
pub struct PresetClient {
    http: Client,
    base: Url,
}

impl PresetClient {
    pub fn new(base: &str) -> Result<Self, PidsError> {
        let base = Url::parse(base).map_err(|_| PidsError::InvalidUrl(base.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(PidsError::InvalidUrl(base.to_string()));
        }
        let http = Client::builder()
            .user_agent(concat!("pids/", env!("CARGO_PKG_VERSION")))
            .gzip(true)
            .build()?;
        Ok(Self { http, base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// `{base}/lines` or `{base}/lines/{name}`, with `name` percent-encoded.
    pub fn url(&self, name: Option<&str>) -> Result<Url, PidsError> {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| PidsError::InvalidUrl(self.base.to_string()))?;
            segments.pop_if_empty().push("lines");
            if let Some(name) = name {
                segments.push(name);
            }
        }
        Ok(url)
    }

    pub async fn list(&self) -> Result<Vec<String>, PidsError> {
        let response = self.http.get(self.url(None)?).send().await?;
        Ok(check(response).await?.json().await?)
    }

    pub async fn fetch(&self, name: &str) -> Result<LineData, PidsError> {
        let response = self.http.get(self.url(Some(name))?).send().await?;
        let mut line: LineData = check(response).await?.json().await?;
        line.normalize();
        Ok(line)
    }

    pub async fn create(&self, name: &str, line: &LineData) -> Result<(), PidsError> {
        let response = self
            .http
            .post(self.url(None)?)
            .json(&CreateBody { name, line })
            .send()
            .await?;
        check(response).await?;
        debug!(name, "preset created remotely");
        Ok(())
    }

    pub async fn update(&self, name: &str, line: &LineData) -> Result<(), PidsError> {
        let response = self.http.put(self.url(Some(name))?).json(line).send().await?;
        check(response).await?;
        debug!(name, "preset updated remotely");
        Ok(())
    }

    pub async fn delete(&self, name: &str) -> Result<(), PidsError> {
        let response = self.http.delete(self.url(Some(name))?).send().await?;
        check(response).await?;
        debug!(name, "preset deleted remotely");
        Ok(())
    }
}

async fn check(response: Response) -> Result<Response, PidsError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > ERROR_BODY_LIMIT {
        let cut = (0..=ERROR_BODY_LIMIT)
            .rev()
            .find(|idx| body.is_char_boundary(*idx))
            .unwrap_or(0);
        body.truncate(cut);
    }
    Err(PidsError::PresetApi {
        status: status.as_u16(),
        body,
    })
}
