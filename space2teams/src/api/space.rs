use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use std::time::Duration;

use super::auth::{ClientCredentials, CredentialStyle, TokenCache};
use super::ensure_success;
use crate::error::ApiError;
use crate::models::space::{ChannelsBatch, GetMessagesResponse};
use crate::models::{ChannelRecord, MessagePage};

const CHANNEL_FIELDS: &str = "next,totalCount,data(channelId,created,description,name,totalMessages)";
const MESSAGE_FIELDS: &str = "nextStartFromDate,orgLimitReached,\
messages(archived,author(details(className,user(emails(email))),name),created,text)";

/// Read access to the source chat.
#[async_trait]
pub trait SpaceApi: Send + Sync {
    /// All channels that are not archived.
    async fn list_channels(&self) -> Result<Vec<ChannelRecord>, ApiError>;

    /// One page of messages, oldest first, starting at `start_from`.
    async fn get_messages(
        &self,
        channel_id: &str,
        start_from: Option<&str>,
        batch_size: usize,
    ) -> Result<MessagePage, ApiError>;
}

pub struct SpaceClient {
    client: Client,
    base_url: String,
    auth: TokenCache,
}

impl SpaceClient {
    pub fn new(base_url: String, client_id: String, client_secret: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build Space HTTP client")?;

        let base_url = base_url.trim_end_matches('/').to_string();
        let auth = TokenCache::new(
            client.clone(),
            ClientCredentials {
                token_url: format!("{base_url}/oauth/token"),
                client_id,
                client_secret,
                scope: "**".to_string(),
                style: CredentialStyle::BasicAuth,
            },
        );

        Ok(Self {
            client,
            base_url,
            auth,
        })
    }
}

#[async_trait]
impl SpaceApi for SpaceClient {
    async fn list_channels(&self) -> Result<Vec<ChannelRecord>, ApiError> {
        let url = format!("{}/api/http/chats/channels/all-channels", self.base_url);
        let mut channels = Vec::new();
        let mut skip = String::from("0");

        loop {
            let response = self
                .client
                .get(&url)
                .bearer_auth(self.auth.bearer().await?)
                .query(&[
                    ("query", ""),
                    ("withArchived", "false"),
                    ("$skip", skip.as_str()),
                    ("$fields", CHANNEL_FIELDS),
                ])
                .send()
                .await?;

            let batch: ChannelsBatch = ensure_success(response).await?.json().await?;
            debug!(
                "received {} channels (total {:?})",
                batch.data.len(),
                batch.total_count
            );

            let done = batch.data.is_empty() || batch.next.is_empty() || batch.next == skip;
            channels.extend(batch.data.into_iter().map(ChannelRecord::from));

            if done
                || batch
                    .total_count
                    .is_some_and(|total| channels.len() as u64 >= total)
            {
                break;
            }
            skip = batch.next;
        }

        Ok(channels)
    }

    async fn get_messages(
        &self,
        channel_id: &str,
        start_from: Option<&str>,
        batch_size: usize,
    ) -> Result<MessagePage, ApiError> {
        let url = format!("{}/api/http/chats/messages", self.base_url);
        let channel = format!("id:{channel_id}");
        let batch_size = batch_size.to_string();

        let mut query = vec![
            ("channel", channel.as_str()),
            ("sorting", "FromOldestToNewest"),
            ("batchSize", batch_size.as_str()),
            ("$fields", MESSAGE_FIELDS),
        ];
        if let Some(start_from) = start_from {
            query.push(("startFromDate", start_from));
        }

        let response = self
            .client
            .get(&url)
            .bearer_auth(self.auth.bearer().await?)
            .query(&query)
            .send()
            .await?;

        let page: GetMessagesResponse = ensure_success(response).await?.json().await?;

        Ok(page.into())
    }
}
