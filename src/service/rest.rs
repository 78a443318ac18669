use super::VoteStore;
use crate::config::Config;
use crate::error::{Result, VoteError};
use crate::models::NewVote;
use async_trait::async_trait;
use log::debug;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use url::Url;

/// PostgREST client for the hosted `votes` table.
pub struct RestStore {
    client: Client,
    votes_url: Url,
    api_key: String,
}

#[derive(Deserialize)]
struct OptionRow {
    option_id: Option<i64>,
}

impl RestStore {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            client: Client::builder().build()?,
            votes_url: config.votes_url()?,
            api_key: config.anon_key.clone(),
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn checked(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(VoteError::Service {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl VoteStore for RestStore {
    async fn find_vote(&self, fingerprint: &str) -> Result<bool> {
        let filter = format!("eq.{fingerprint}");
        let request = self
            .client
            .get(self.votes_url.clone())
            .query(&[("select", "id"), ("user_agent", filter.as_str()), ("limit", "1")]);
        let response = Self::checked(self.authorized(request).send().await?).await?;
        let rows: Vec<serde_json::Value> = response.json().await?;
        Ok(!rows.is_empty())
    }

    async fn option_ids(&self) -> Result<Vec<i64>> {
        let request = self
            .client
            .get(self.votes_url.clone())
            .query(&[("select", "option_id")]);
        let response = Self::checked(self.authorized(request).send().await?).await?;
        let rows: Vec<OptionRow> = response.json().await?;
        debug!("Fetched {} vote rows", rows.len());
        Ok(rows.into_iter().filter_map(|row| row.option_id).collect())
    }

    async fn insert_vote(&self, vote: NewVote) -> Result<()> {
        let request = self
            .client
            .post(self.votes_url.clone())
            .header("Prefer", "return=minimal")
            .json(&[vote]);
        Self::checked(self.authorized(request).send().await?).await?;
        Ok(())
    }
}
