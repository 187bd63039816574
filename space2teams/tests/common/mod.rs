#![allow(dead_code)]

use async_trait::async_trait;
use reqwest::StatusCode;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use space2teams::api::space::SpaceApi;
use space2teams::api::teams::TeamsApi;
use space2teams::error::ApiError;
use space2teams::models::teams::{
    Channel, ChannelChangeset, ChatMessage, DirectoryUser, MemberBinding, NewChatMessage, NewTeam,
    Team,
};
use space2teams::models::{
    Author, AuthorDetails, ChannelRecord, MessagePage, MessageRecord, PrincipalKind,
};

pub fn channel(id: &str, name: &str, created: i64, total_messages: u64) -> ChannelRecord {
    ChannelRecord {
        id: id.to_string(),
        name: name.to_string(),
        description: Some(format!("about {name}")),
        created,
        total_messages,
    }
}

pub fn message(email: &str, created: i64, text: &str) -> MessageRecord {
    MessageRecord {
        author: Author {
            name: email.split('@').next().unwrap_or(email).to_string(),
            details: Some(AuthorDetails {
                kind: PrincipalKind::User,
                emails: vec![email.to_string()],
            }),
        },
        created,
        text: text.to_string(),
        archived: false,
    }
}

pub fn bot_message(created: i64, text: &str) -> MessageRecord {
    MessageRecord {
        author: Author {
            name: "CI".to_string(),
            details: Some(AuthorDetails {
                kind: PrincipalKind::Application,
                emails: vec![],
            }),
        },
        created,
        text: text.to_string(),
        archived: false,
    }
}

pub fn deleted_message(created: i64, text: &str) -> MessageRecord {
    MessageRecord {
        author: Author {
            name: " Deleted ".to_string(),
            details: None,
        },
        created,
        text: text.to_string(),
        archived: false,
    }
}

pub fn user(id: &str, email: &str) -> DirectoryUser {
    DirectoryUser {
        id: id.to_string(),
        display_name: Some(email.split('@').next().unwrap_or(email).to_string()),
        mail: Some(email.to_string()),
    }
}

/// Source chat held in memory. The page cursor is the offset of the next message.
#[derive(Default)]
pub struct FakeSpace {
    pub channels: Vec<ChannelRecord>,
    pub messages: HashMap<String, Vec<MessageRecord>>,
    /// Report the organization limit once this many pages have been served.
    pub org_limit_after: Option<usize>,
    pub failing_channels: HashSet<String>,
    pub requests: Mutex<Vec<(String, Option<String>)>>,
}

impl FakeSpace {
    pub fn with_channel(mut self, record: ChannelRecord, messages: Vec<MessageRecord>) -> Self {
        self.messages.insert(record.id.clone(), messages);
        self.channels.push(record);
        self
    }

    pub fn requests_for(&self, channel_id: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == channel_id)
            .count()
    }
}

#[async_trait]
impl SpaceApi for FakeSpace {
    async fn list_channels(&self) -> Result<Vec<ChannelRecord>, ApiError> {
        Ok(self.channels.clone())
    }

    async fn get_messages(
        &self,
        channel_id: &str,
        start_from: Option<&str>,
        batch_size: usize,
    ) -> Result<MessagePage, ApiError> {
        let served = {
            let mut requests = self.requests.lock().unwrap();
            requests.push((channel_id.to_string(), start_from.map(str::to_string)));
            requests.len()
        };

        if self.failing_channels.contains(channel_id) && start_from.is_some() {
            return Err(ApiError::status(StatusCode::INTERNAL_SERVER_ERROR, "boom"));
        }

        let all = self.messages.get(channel_id).cloned().unwrap_or_default();
        let offset: usize = start_from.map(|s| s.parse().unwrap()).unwrap_or(0);
        let end = (offset + batch_size).min(all.len());
        let messages = all[offset.min(end)..end].to_vec();

        Ok(MessagePage {
            messages,
            next_start_from: Some(end.to_string()),
            org_limit_reached: self.org_limit_after.is_some_and(|limit| served >= limit),
        })
    }
}

#[derive(Default)]
pub struct Tenant {
    pub teams: Vec<Team>,
    pub channels: HashMap<String, Vec<Channel>>,
    pub messages: HashMap<String, Vec<NewChatMessage>>,
    pub patches: Vec<(String, ChannelChangeset)>,
    pub created_teams: Vec<NewTeam>,
    pub members: HashMap<String, Vec<MemberBinding>>,
    pub users: Vec<DirectoryUser>,
    /// Every mutating call, in order.
    pub calls: Vec<String>,
    /// Operation name → number of classified failures still to produce.
    pub failures: HashMap<String, u32>,
    /// Message text → number of classified failures still to produce.
    pub message_failures: HashMap<String, u32>,
    /// Message texts that fail without a status, as a dropped connection would.
    pub broken_messages: HashSet<String>,
    /// Channels that left migration mode.
    pub completed: HashSet<String>,
    /// Number of `list_teams` calls before a new team becomes visible.
    pub provisioning_polls: u32,
    pending_teams: Vec<(Team, u32)>,
    next_id: u32,
}

impl Tenant {
    fn id(&mut self, kind: &str) -> String {
        self.next_id += 1;
        format!("{kind}-{}", self.next_id)
    }

    fn fail(&mut self, operation: &str) -> Result<(), ApiError> {
        match self.failures.get_mut(operation) {
            Some(left) if *left > 0 => {
                *left -= 1;
                Err(ApiError::status(
                    StatusCode::SERVICE_UNAVAILABLE,
                    format!("{operation} unavailable"),
                ))
            }
            _ => Ok(()),
        }
    }

    fn team_name(&self, team_id: &str) -> String {
        self.teams
            .iter()
            .find(|t| t.id == team_id)
            .map(|t| t.display_name.clone())
            .unwrap_or_default()
    }

    fn channel(&self, team_id: &str, channel_id: &str) -> Option<&Channel> {
        self.channels
            .get(team_id)?
            .iter()
            .find(|c| c.id == channel_id)
    }

    /// Team name → channel name → message contents, sorted for comparison.
    pub fn snapshot(&self) -> Vec<(String, Vec<(String, Vec<String>)>)> {
        let mut teams: Vec<_> = self
            .teams
            .iter()
            .map(|team| {
                let mut channels: Vec<_> = self
                    .channels
                    .get(&team.id)
                    .into_iter()
                    .flatten()
                    .map(|channel| {
                        let messages = self
                            .messages
                            .get(&channel.id)
                            .into_iter()
                            .flatten()
                            .map(|m| m.body.content.clone())
                            .collect();
                        (channel.display_name.clone(), messages)
                    })
                    .collect();
                channels.sort();
                (team.display_name.clone(), channels)
            })
            .collect();
        teams.sort();
        teams
    }
}

#[derive(Default)]
pub struct FakeTeams {
    pub tenant: Mutex<Tenant>,
}

impl FakeTeams {
    pub fn with_users(users: Vec<DirectoryUser>) -> Self {
        let fake = Self::default();
        fake.tenant.lock().unwrap().users = users;
        fake
    }

    pub fn fail(&self, operation: &str, times: u32) {
        self.tenant
            .lock()
            .unwrap()
            .failures
            .insert(operation.to_string(), times);
    }

    pub fn fail_message(&self, text: &str, times: u32) {
        self.tenant
            .lock()
            .unwrap()
            .message_failures
            .insert(text.to_string(), times);
    }

    pub fn break_message(&self, text: &str) {
        self.tenant
            .lock()
            .unwrap()
            .broken_messages
            .insert(text.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.tenant.lock().unwrap().calls.clone()
    }

    pub fn messages_in(&self, team: &str, channel: &str) -> Vec<NewChatMessage> {
        let tenant = self.tenant.lock().unwrap();
        let Some(team) = tenant.teams.iter().find(|t| t.display_name == team) else {
            return vec![];
        };
        let Some(channel) = tenant
            .channels
            .get(&team.id)
            .and_then(|channels| channels.iter().find(|c| c.display_name == channel))
        else {
            return vec![];
        };
        tenant.messages.get(&channel.id).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl TeamsApi for FakeTeams {
    async fn list_teams(&self) -> Result<Vec<Team>, ApiError> {
        let mut tenant = self.tenant.lock().unwrap();
        tenant.fail("list_teams")?;

        let mut visible = vec![];
        for (team, polls) in std::mem::take(&mut tenant.pending_teams) {
            if polls == 0 {
                visible.push(team);
            } else {
                tenant.pending_teams.push((team, polls - 1));
            }
        }
        tenant.teams.extend(visible);

        Ok(tenant.teams.clone())
    }

    async fn create_team(&self, team: &NewTeam) -> Result<(), ApiError> {
        let mut tenant = self.tenant.lock().unwrap();
        tenant.fail("create_team")?;
        tenant.calls.push(format!("create_team:{}", team.display_name));
        tenant.created_teams.push(team.clone());

        let team_id = tenant.id("team");
        let general_id = tenant.id("general");
        tenant.channels.insert(
            team_id.clone(),
            vec![Channel {
                id: general_id,
                display_name: "General".to_string(),
                description: None,
            }],
        );
        let polls = tenant.provisioning_polls;
        tenant.pending_teams.push((
            Team {
                id: team_id,
                display_name: team.display_name.clone(),
            },
            polls,
        ));
        Ok(())
    }

    async fn delete_group(&self, group_id: &str) -> Result<(), ApiError> {
        let mut tenant = self.tenant.lock().unwrap();
        tenant.fail("delete_group")?;
        let name = tenant.team_name(group_id);
        tenant.calls.push(format!("delete_group:{name}"));

        tenant.teams.retain(|t| t.id != group_id);
        let channels = tenant.channels.remove(group_id).unwrap_or_default();
        for channel in channels {
            tenant.messages.remove(&channel.id);
        }
        tenant.members.remove(group_id);
        Ok(())
    }

    async fn list_channels(&self, team_id: &str) -> Result<Vec<Channel>, ApiError> {
        let mut tenant = self.tenant.lock().unwrap();
        tenant.fail("list_channels")?;
        Ok(tenant.channels.get(team_id).cloned().unwrap_or_default())
    }

    async fn get_channel(&self, team_id: &str, channel_id: &str) -> Result<Channel, ApiError> {
        let mut tenant = self.tenant.lock().unwrap();
        tenant.fail("get_channel")?;
        tenant
            .channel(team_id, channel_id)
            .cloned()
            .ok_or_else(|| ApiError::status(StatusCode::NOT_FOUND, "no such channel"))
    }

    async fn create_channel(
        &self,
        team_id: &str,
        channel: &ChannelChangeset,
    ) -> Result<Channel, ApiError> {
        let mut tenant = self.tenant.lock().unwrap();
        tenant.fail("create_channel")?;

        let name = channel.display_name.clone().unwrap_or_default();
        if name.eq_ignore_ascii_case("general") {
            return Err(ApiError::status(StatusCode::BAD_REQUEST, "name is reserved"));
        }
        tenant.calls.push(format!("create_channel:{name}"));

        let created = Channel {
            id: tenant.id("channel"),
            display_name: name,
            description: channel.description.clone(),
        };
        tenant
            .channels
            .entry(team_id.to_string())
            .or_default()
            .push(created.clone());
        Ok(created)
    }

    async fn patch_channel(
        &self,
        team_id: &str,
        channel_id: &str,
        changeset: &ChannelChangeset,
    ) -> Result<(), ApiError> {
        let mut tenant = self.tenant.lock().unwrap();
        tenant.fail("patch_channel")?;
        let name = tenant
            .channel(team_id, channel_id)
            .map(|c| c.display_name.clone())
            .ok_or_else(|| ApiError::status(StatusCode::NOT_FOUND, "no such channel"))?;
        tenant.calls.push(format!("patch_channel:{name}"));
        tenant.patches.push((channel_id.to_string(), changeset.clone()));
        Ok(())
    }

    async fn delete_channel(&self, team_id: &str, channel_id: &str) -> Result<(), ApiError> {
        let mut tenant = self.tenant.lock().unwrap();
        tenant.fail("delete_channel")?;
        let name = tenant
            .channel(team_id, channel_id)
            .map(|c| c.display_name.clone())
            .unwrap_or_default();
        tenant.calls.push(format!("delete_channel:{name}"));

        if let Some(channels) = tenant.channels.get_mut(team_id) {
            channels.retain(|c| c.id != channel_id);
        }
        tenant.messages.remove(channel_id);
        Ok(())
    }

    async fn create_message(
        &self,
        _team_id: &str,
        channel_id: &str,
        message: &NewChatMessage,
    ) -> Result<ChatMessage, ApiError> {
        let mut tenant = self.tenant.lock().unwrap();
        tenant.fail("create_message")?;

        if tenant.completed.contains(channel_id) {
            return Err(ApiError::status(
                StatusCode::BAD_REQUEST,
                "channel is not in migration mode",
            ));
        }
        if tenant.broken_messages.contains(&message.body.content) {
            return Err(ApiError::transport("connection reset by peer"));
        }
        if let Some(left) = tenant.message_failures.get_mut(&message.body.content) {
            if *left > 0 {
                *left -= 1;
                return Err(ApiError::status(StatusCode::TOO_MANY_REQUESTS, "throttled"));
            }
        }

        let id = tenant.id("message");
        tenant
            .messages
            .entry(channel_id.to_string())
            .or_default()
            .push(message.clone());
        Ok(ChatMessage { id })
    }

    async fn add_members(&self, team_id: &str, members: &[MemberBinding]) -> Result<(), ApiError> {
        let mut tenant = self.tenant.lock().unwrap();
        tenant.fail("add_members")?;
        let name = tenant.team_name(team_id);
        tenant.calls.push(format!("add_members:{name}"));
        tenant
            .members
            .insert(team_id.to_string(), members.to_vec());
        Ok(())
    }

    async fn complete_channel_migration(
        &self,
        team_id: &str,
        channel_id: &str,
    ) -> Result<(), ApiError> {
        let mut tenant = self.tenant.lock().unwrap();
        tenant.fail("complete_channel_migration")?;
        let name = tenant
            .channel(team_id, channel_id)
            .map(|c| c.display_name.clone())
            .unwrap_or_default();
        if !tenant.completed.insert(channel_id.to_string()) {
            return Err(ApiError::status(
                StatusCode::BAD_REQUEST,
                "channel migration already completed",
            ));
        }
        tenant.calls.push(format!("complete_channel:{name}"));
        Ok(())
    }

    async fn complete_team_migration(&self, team_id: &str) -> Result<(), ApiError> {
        let mut tenant = self.tenant.lock().unwrap();
        tenant.fail("complete_team_migration")?;
        let name = tenant.team_name(team_id);
        tenant.calls.push(format!("complete_team:{name}"));
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<DirectoryUser>, ApiError> {
        let mut tenant = self.tenant.lock().unwrap();
        tenant.fail("list_users")?;
        Ok(tenant.users.clone())
    }
}
