use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::auth::{ClientCredentials, CredentialStyle, TokenCache};
use super::ensure_success;
use crate::error::ApiError;
use crate::models::teams::{
    AddMembersRequest, Channel, ChannelChangeset, ChatMessage, DirectoryUser, GRAPH_URL,
    MemberBinding, NewChatMessage, NewTeam, ODataPage, Team,
};

/// Write access to the destination tenant.
#[async_trait]
pub trait TeamsApi: Send + Sync {
    async fn list_teams(&self) -> Result<Vec<Team>, ApiError>;
    /// Provisioning is asynchronous: the team shows up in `list_teams` some time later.
    async fn create_team(&self, team: &NewTeam) -> Result<(), ApiError>;
    /// Deletes the group backing a team, which removes the team with it.
    async fn delete_group(&self, group_id: &str) -> Result<(), ApiError>;

    async fn list_channels(&self, team_id: &str) -> Result<Vec<Channel>, ApiError>;
    async fn get_channel(&self, team_id: &str, channel_id: &str) -> Result<Channel, ApiError>;
    async fn create_channel(
        &self,
        team_id: &str,
        channel: &ChannelChangeset,
    ) -> Result<Channel, ApiError>;
    async fn patch_channel(
        &self,
        team_id: &str,
        channel_id: &str,
        changeset: &ChannelChangeset,
    ) -> Result<(), ApiError>;
    async fn delete_channel(&self, team_id: &str, channel_id: &str) -> Result<(), ApiError>;

    async fn create_message(
        &self,
        team_id: &str,
        channel_id: &str,
        message: &NewChatMessage,
    ) -> Result<ChatMessage, ApiError>;

    async fn add_members(&self, team_id: &str, members: &[MemberBinding]) -> Result<(), ApiError>;

    async fn complete_channel_migration(
        &self,
        team_id: &str,
        channel_id: &str,
    ) -> Result<(), ApiError>;
    async fn complete_team_migration(&self, team_id: &str) -> Result<(), ApiError>;

    async fn list_users(&self) -> Result<Vec<DirectoryUser>, ApiError>;
}

pub struct GraphClient {
    client: Client,
    base_url: String,
    auth: TokenCache,
}

impl GraphClient {
    pub fn new(tenant_id: String, client_id: String, client_secret: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build Graph HTTP client")?;

        let auth = TokenCache::new(
            client.clone(),
            ClientCredentials {
                token_url: format!(
                    "https://login.microsoftonline.com/{tenant_id}/oauth2/v2.0/token"
                ),
                client_id,
                client_secret,
                scope: "https://graph.microsoft.com/.default".to_string(),
                style: CredentialStyle::FormBody,
            },
        );

        Ok(Self {
            client,
            base_url: GRAPH_URL.to_string(),
            auth,
        })
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, ApiError> {
        let response = request
            .bearer_auth(self.auth.bearer().await?)
            .send()
            .await?;
        ensure_success(response).await
    }

    /// Follow `@odata.nextLink` until the collection is exhausted.
    async fn get_all<T: DeserializeOwned + Send>(&self, url: String) -> Result<Vec<T>, ApiError> {
        let mut items = Vec::new();
        let mut next = Some(url);

        while let Some(url) = next {
            let page: ODataPage<T> = self.send(self.client.get(&url)).await?.json().await?;
            debug!("GET {} returned {} items", url, page.value.len());
            items.extend(page.value);
            next = page.next_link;
        }

        Ok(items)
    }

    fn team_url(&self, team_id: &str) -> String {
        format!("{}/teams/{}", self.base_url, team_id)
    }

    fn channel_url(&self, team_id: &str, channel_id: &str) -> String {
        format!("{}/channels/{}", self.team_url(team_id), channel_id)
    }
}

#[async_trait]
impl TeamsApi for GraphClient {
    async fn list_teams(&self) -> Result<Vec<Team>, ApiError> {
        self.get_all(format!("{}/teams?$select=id,displayName", self.base_url))
            .await
    }

    async fn create_team(&self, team: &NewTeam) -> Result<(), ApiError> {
        let url = format!("{}/teams", self.base_url);
        self.send(self.client.post(&url).json(team)).await?;
        Ok(())
    }

    async fn delete_group(&self, group_id: &str) -> Result<(), ApiError> {
        let url = format!("{}/groups/{}", self.base_url, group_id);
        self.send(self.client.delete(&url)).await?;
        Ok(())
    }

    async fn list_channels(&self, team_id: &str) -> Result<Vec<Channel>, ApiError> {
        self.get_all(format!("{}/channels", self.team_url(team_id)))
            .await
    }

    async fn get_channel(&self, team_id: &str, channel_id: &str) -> Result<Channel, ApiError> {
        let url = self.channel_url(team_id, channel_id);
        Ok(self.send(self.client.get(&url)).await?.json().await?)
    }

    async fn create_channel(
        &self,
        team_id: &str,
        channel: &ChannelChangeset,
    ) -> Result<Channel, ApiError> {
        let url = format!("{}/channels", self.team_url(team_id));
        Ok(self
            .send(self.client.post(&url).json(channel))
            .await?
            .json()
            .await?)
    }

    async fn patch_channel(
        &self,
        team_id: &str,
        channel_id: &str,
        changeset: &ChannelChangeset,
    ) -> Result<(), ApiError> {
        let url = self.channel_url(team_id, channel_id);
        self.send(self.client.patch(&url).json(changeset)).await?;
        Ok(())
    }

    async fn delete_channel(&self, team_id: &str, channel_id: &str) -> Result<(), ApiError> {
        let url = self.channel_url(team_id, channel_id);
        self.send(self.client.delete(&url)).await?;
        Ok(())
    }

    async fn create_message(
        &self,
        team_id: &str,
        channel_id: &str,
        message: &NewChatMessage,
    ) -> Result<ChatMessage, ApiError> {
        let url = format!("{}/messages", self.channel_url(team_id, channel_id));
        Ok(self
            .send(self.client.post(&url).json(message))
            .await?
            .json()
            .await?)
    }

    async fn add_members(&self, team_id: &str, members: &[MemberBinding]) -> Result<(), ApiError> {
        let url = format!("{}/members/add", self.team_url(team_id));
        let body = AddMembersRequest { values: members };
        self.send(self.client.post(&url).json(&body)).await?;
        Ok(())
    }

    async fn complete_channel_migration(
        &self,
        team_id: &str,
        channel_id: &str,
    ) -> Result<(), ApiError> {
        let url = format!("{}/completeMigration", self.channel_url(team_id, channel_id));
        self.send(self.client.post(&url)).await?;
        Ok(())
    }

    async fn complete_team_migration(&self, team_id: &str) -> Result<(), ApiError> {
        let url = format!("{}/completeMigration", self.team_url(team_id));
        self.send(self.client.post(&url)).await?;
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<DirectoryUser>, ApiError> {
        self.get_all(format!(
            "{}/users?$select=id,displayName,mail",
            self.base_url
        ))
        .await
    }
}
