use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info, warn};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use crate::api::teams::TeamsApi;
use crate::error::{ApiError, MigrationError, reason};
use crate::mapping::{Mapping, ResolvedChannel, team_created_at};
use crate::models::teams::{
    Channel, ChannelChangeset, DirectoryUser, MemberBinding, NewChatMessage, NewTeam, Team,
};
use crate::models::{Author, ChannelRecord, MessageRecord};
use crate::pacing::Pacing;
use crate::retry::RetryBudget;
use crate::staging::StagingStore;
use crate::timestamps::TimestampDeduplicator;

/// Author name the source uses for accounts that no longer exist.
pub const DELETED_AUTHOR: &str = "deleted";

pub const DEFAULT_TEAM_DESCRIPTION: &str = "Migrated from JetBrains Space";

/// Mutable state of one import run.
#[derive(Debug, Default)]
pub struct RunState {
    pub budget: RetryBudget,
    pub timestamps: TimestampDeduplicator,
    /// Teams deleted by the cleanup; their names may linger in listings for a while.
    removed_teams: HashSet<String>,
}

impl RunState {
    pub fn new(budget: RetryBudget) -> Self {
        Self {
            budget,
            timestamps: TimestampDeduplicator::new(),
            removed_teams: HashSet::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub team_description: String,
    /// Member posting on behalf of deleted accounts.
    pub fallback_member: Option<String>,
    pub pacing: Pacing,
    pub show_progress: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            team_description: DEFAULT_TEAM_DESCRIPTION.to_string(),
            fallback_member: None,
            pacing: Pacing::default(),
            show_progress: true,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct ChannelReport {
    pub name: String,
    pub imported: usize,
    pub skipped: usize,
    /// Messages that needed more than one attempt.
    pub requeued: usize,
}

#[derive(Debug, Default, Clone)]
pub struct TeamReport {
    pub name: String,
    pub channels: Vec<ChannelReport>,
    pub members: usize,
}

impl TeamReport {
    pub fn imported(&self) -> usize {
        self.channels.iter().map(|c| c.imported).sum()
    }

    pub fn skipped(&self) -> usize {
        self.channels.iter().map(|c| c.skipped).sum()
    }
}

#[derive(Debug, Default)]
pub struct ImportSummary {
    pub teams: Vec<TeamReport>,
    /// Teams with no staged channel, never created.
    pub skipped_teams: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SkipReason {
    Application,
    Blank,
    UnknownAuthor,
}

/// Messages of one channel that the destination rejected, by position, with
/// the second reserved for them on the first attempt.
#[derive(Debug, Default)]
struct FailedMessages {
    entries: BTreeMap<usize, i64>,
}

impl FailedMessages {
    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn insert(&mut self, index: usize, seconds: i64) {
        self.entries.insert(index, seconds);
    }

    fn remove(&mut self, index: usize) {
        self.entries.remove(&index);
    }

    fn reserved(&self, index: usize) -> Option<i64> {
        self.entries.get(&index).copied()
    }

    fn indices(&self) -> Vec<usize> {
        self.entries.keys().copied().collect()
    }
}

/// Migration-mode metadata for a channel created at the record's creation time.
fn channel_changeset(record: &ChannelRecord) -> Result<ChannelChangeset, MigrationError> {
    let created = record
        .created_at()
        .ok_or(MigrationError::InvalidTimestamp {
            seconds: record.created.div_euclid(1000),
        })?;

    Ok(ChannelChangeset::migration(created).with_description(record.description.clone()))
}

/// Recreates staged channels as teams in the destination tenant.
pub struct Importer<'a, T: TeamsApi> {
    teams: &'a T,
    staging: &'a StagingStore,
    mapping: &'a Mapping,
    options: ImportOptions,
    directory: Vec<DirectoryUser>,
}

impl<'a, T: TeamsApi> Importer<'a, T> {
    pub fn new(
        teams: &'a T,
        staging: &'a StagingStore,
        mapping: &'a Mapping,
        options: ImportOptions,
    ) -> Self {
        Self {
            teams,
            staging,
            mapping,
            options,
            directory: vec![],
        }
    }

    /// Load the organization's user directory; authors and members are resolved against it.
    pub async fn collect_members(&mut self, state: &mut RunState) -> Result<usize> {
        info!("Collect all users of this organization");
        let teams = self.teams;
        self.directory = state
            .budget
            .run("list users", || teams.list_users())
            .await?;
        info!("Found {} users", self.directory.len());

        Ok(self.directory.len())
    }

    fn find_member(&self, email: &str) -> Option<&DirectoryUser> {
        self.directory
            .iter()
            .find(|user| user.mail.as_deref() == Some(email))
    }

    /// Every declared team needs members and its owner in the directory;
    /// other members are optional.
    pub fn check_owners(&self) -> Result<()> {
        let members = &self.mapping.members;

        for team in self.mapping.team_names() {
            let Some(owner) = members.owner(team) else {
                return Err(MigrationError::TeamWithoutMembers {
                    team: team.to_string(),
                }
                .into());
            };

            if self.find_member(owner).is_none() {
                return Err(MigrationError::UnknownOwner {
                    team: team.to_string(),
                    email: owner.to_string(),
                }
                .into());
            }
            for email in members
                .members(team)
                .iter()
                .skip(1)
                .filter(|e| self.find_member(e).is_none())
            {
                warn!("Member {} of team \"{}\" not found, skipping", email, team);
            }
        }

        Ok(())
    }

    /// Destination teams that share a name with a configured team.
    pub async fn plan_cleanup(&self, state: &mut RunState) -> Result<Vec<Team>> {
        info!("Get all teams");
        let teams = self.teams;
        let all_teams = state.budget.run("list teams", || teams.list_teams()).await?;
        info!("Found {} teams", all_teams.len());

        Ok(all_teams
            .into_iter()
            .filter(|team| self.mapping.contains_team(&team.display_name))
            .collect())
    }

    /// Delete the given teams, channels first, then the backing group.
    pub async fn remove_teams(&self, state: &mut RunState, remove: &[Team]) -> Result<()> {
        let teams = self.teams;

        for team in remove {
            let channels = state
                .budget
                .run("list channels", || teams.list_channels(&team.id))
                .await?;

            for channel in channels.iter().filter(|c| !c.is_general()) {
                info!(
                    "Remove channel \"{}\" in team \"{}\"",
                    channel.display_name, team.display_name
                );
                state
                    .budget
                    .run("delete channel", || {
                        teams.delete_channel(&team.id, &channel.id)
                    })
                    .await?;
            }

            info!("Remove group \"{}\"", team.display_name);
            state
                .budget
                .run("delete group", || teams.delete_group(&team.id))
                .await?;
            state.removed_teams.insert(team.id.clone());
        }

        Ok(())
    }

    /// Import every team that has members, in declaration order.
    pub async fn import(&self, state: &mut RunState) -> Result<ImportSummary> {
        let staged = self.staging.load_channels()?;
        let mut summary = ImportSummary::default();

        for (team_name, members) in self.mapping.members.iter() {
            let channels = self.mapping.resolve(team_name, &staged);

            let Some(created) = team_created_at(&channels) else {
                warn!("No staged channels for team \"{}\", skipping it", team_name);
                summary.skipped_teams.push(team_name.to_string());
                continue;
            };

            let report = self
                .import_team(state, team_name, members, &channels, created)
                .await
                .with_context(|| format!("Import of team \"{team_name}\" failed"))?;
            summary.teams.push(report);
        }

        Ok(summary)
    }

    async fn import_team(
        &self,
        state: &mut RunState,
        name: &str,
        members: &[String],
        channels: &[ResolvedChannel<'_>],
        created: DateTime<Utc>,
    ) -> Result<TeamReport> {
        let team = self.create_team(state, name, created).await?;
        let mut report = TeamReport {
            name: name.to_string(),
            ..TeamReport::default()
        };

        info!("Import channels for team \"{}\"", name);
        let general: Vec<&ResolvedChannel<'_>> =
            channels.iter().filter(|c| c.is_general).collect();
        let mut general_imported = false;

        for resolved in channels {
            if resolved.is_general {
                if !general_imported {
                    let channel_report = self.import_general(state, &team, &general).await?;
                    report.channels.push(channel_report);
                    general_imported = true;
                }
                continue;
            }

            info!(
                "Import channel \"{}\" into team \"{}\"",
                resolved.record.name, name
            );
            let channel = self.create_channel(state, &team, resolved.record).await?;
            let messages = self.staging.load_messages(&resolved.record.id)?;

            info!("Channel ready. Import {} messages...", messages.len());
            let mut channel_report = self
                .import_messages(state, &team, &channel, &messages)
                .await?;
            channel_report.name = resolved.record.name.clone();
            info!("Imported {} messages.", channel_report.imported);

            self.complete_channel_migration(state, &team.id, &channel.id)
                .await?;
            report.channels.push(channel_report);
        }

        self.complete_general_channel_migration(state, &team).await?;
        self.complete_team_migration(state, &team.id).await?;
        report.members = self.add_members(state, &team.id, members).await?;

        Ok(report)
    }

    async fn create_team(
        &self,
        state: &mut RunState,
        name: &str,
        created: DateTime<Utc>,
    ) -> Result<Team> {
        info!("Create team \"{}\"", name);
        let teams = self.teams;
        let request = NewTeam::migration(name, &self.options.team_description, created);

        state
            .budget
            .run("create team", || teams.create_team(&request))
            .await?;

        self.wait_for_team(state, name).await
    }

    /// Poll until the new team shows up; creation completes in the background.
    async fn wait_for_team(&self, state: &mut RunState, name: &str) -> Result<Team> {
        loop {
            state.budget.spend("find team")?;
            self.pause(self.options.pacing.provisioning_pause).await;
            info!("Searching for team \"{}\"", name);

            match self.teams.list_teams().await {
                Ok(found) => {
                    if let Some(team) = found.into_iter().find(|team| {
                        team.display_name == name && !state.removed_teams.contains(&team.id)
                    }) {
                        state.budget.reset();
                        return Ok(team);
                    }
                }
                Err(e) => self.poll_failed("find team", e)?,
            }
        }
    }

    /// Classified errors during polling just mean "not yet".
    fn poll_failed(&self, operation: &str, error: ApiError) -> Result<(), MigrationError> {
        match error {
            ApiError::Status {
                status, message, ..
            } => {
                warn!(
                    "{} returned status code: {} ({})",
                    operation,
                    status.as_u16(),
                    reason(status)
                );
                warn!("Error message: {}", message);
                Ok(())
            }
            error => Err(MigrationError::unrecoverable(operation, error)),
        }
    }

    async fn wait_for_general_channel(&self, state: &mut RunState, team_id: &str) -> Result<Channel> {
        loop {
            state.budget.spend("find general channel")?;

            match self.teams.list_channels(team_id).await {
                Ok(channels) => {
                    if let Some(channel) = channels.into_iter().find(Channel::is_general) {
                        state.budget.reset();
                        return Ok(channel);
                    }
                }
                Err(e) => self.poll_failed("find general channel", e)?,
            }

            self.pause(self.options.pacing.provisioning_pause).await;
        }
    }

    /// Import every channel that lands in General as one stream, oldest
    /// message first. General is completed later, once.
    async fn import_general(
        &self,
        state: &mut RunState,
        team: &Team,
        sources: &[&ResolvedChannel<'_>],
    ) -> Result<ChannelReport> {
        let Some(oldest) = sources.first() else {
            return Ok(ChannelReport::default());
        };
        let names: Vec<&str> = sources.iter().map(|c| c.record.name.as_str()).collect();
        info!(
            "Import channels {} into General of team \"{}\"",
            names.join(", "),
            team.display_name
        );

        let general = self.wait_for_general_channel(state, &team.id).await?;
        let changeset = channel_changeset(oldest.record)?;
        let teams = self.teams;
        state
            .budget
            .run("patch general channel", || {
                teams.patch_channel(&team.id, &general.id, &changeset)
            })
            .await?;

        let mut messages = Vec::new();
        for source in sources {
            messages.extend(self.staging.load_messages(&source.record.id)?);
        }
        messages.sort_by_key(|m| m.created);

        info!("Channel ready. Import {} messages...", messages.len());
        let mut report = self
            .import_messages(state, team, &general, &messages)
            .await?;
        report.name = names.join(", ");
        info!("Imported {} messages.", report.imported);

        Ok(report)
    }

    async fn create_channel(
        &self,
        state: &mut RunState,
        team: &Team,
        record: &ChannelRecord,
    ) -> Result<Channel> {
        let changeset = channel_changeset(record)?.with_display_name(record.name.clone());
        let teams = self.teams;

        let channel = state
            .budget
            .run("create channel", || teams.create_channel(&team.id, &changeset))
            .await?;

        Ok(channel)
    }

    async fn import_messages(
        &self,
        state: &mut RunState,
        team: &Team,
        channel: &Channel,
        messages: &[MessageRecord],
    ) -> Result<ChannelReport> {
        let progress = self.progress_bar(messages.len())?;
        let mut report = ChannelReport::default();
        let mut failed = FailedMessages::default();

        let all: Vec<usize> = (0..messages.len()).collect();
        self.send_pass(
            state,
            team,
            channel,
            messages,
            &all,
            &mut failed,
            &mut report,
            &progress,
        )
        .await?;
        state.budget.reset();

        report.requeued = failed.len();
        while !failed.is_empty() {
            state.budget.spend("requeue failed messages")?;
            info!(
                "Retrying {} failed messages in channel \"{}\"",
                failed.len(),
                channel.display_name
            );
            let pending = failed.indices();
            self.send_pass(
                state,
                team,
                channel,
                messages,
                &pending,
                &mut failed,
                &mut report,
                &progress,
            )
            .await?;
        }
        state.budget.reset();
        progress.finish_and_clear();

        Ok(report)
    }

    /// Send the messages at `pending` once, in order.
    #[allow(clippy::too_many_arguments)]
    async fn send_pass(
        &self,
        state: &mut RunState,
        team: &Team,
        channel: &Channel,
        messages: &[MessageRecord],
        pending: &[usize],
        failed: &mut FailedMessages,
        report: &mut ChannelReport,
        progress: &ProgressBar,
    ) -> Result<()> {
        let pacing = &self.options.pacing;

        for (position, &index) in pending.iter().enumerate() {
            let message = &messages[index];

            match self.resolve_author(message) {
                Err(skip) => {
                    match skip {
                        SkipReason::UnknownAuthor => {
                            warn!("Member with \"{}\" not found.", message.author.name)
                        }
                        SkipReason::Application | SkipReason::Blank => {}
                    }
                    debug!("Skipped message {} ({:?})", index + 1, skip);
                    report.skipped += 1;
                    progress.inc(1);
                }
                Ok(author) => {
                    let seconds = failed
                        .reserved(index)
                        .unwrap_or_else(|| state.timestamps.assign(message.created));
                    let created = DateTime::from_timestamp(seconds, 0)
                        .ok_or(MigrationError::InvalidTimestamp { seconds })?;
                    let request = NewChatMessage::new(author, created, &message.text);

                    match self
                        .teams
                        .create_message(&team.id, &channel.id, &request)
                        .await
                    {
                        Ok(_) => {
                            report.imported += 1;
                            failed.remove(index);
                            progress.inc(1);
                        }
                        Err(ApiError::Status {
                            status, message: error_message, ..
                        }) => {
                            error!("Failed message import on message {}", index + 1);
                            error!("TeamID: {}", team.id);
                            error!("ChannelID: {}", channel.id);
                            error!(
                                "Message: {}",
                                serde_json::to_string(message).unwrap_or_default()
                            );
                            error!(
                                "Request returned status code: {} ({})",
                                status.as_u16(),
                                reason(status)
                            );
                            error!("Error message: {}", error_message);
                            failed.insert(index, seconds);
                        }
                        Err(e) => {
                            error!("Failed message import on message {}", index + 1);
                            return Err(MigrationError::unrecoverable("create message", e).into());
                        }
                    }
                }
            }

            if (position + 1) % pacing.messages_per_second.max(1) == 0 {
                self.pause(pacing.message_pause).await;
            }
        }

        self.pause(pacing.message_pause).await;
        Ok(())
    }

    fn resolve_author(&self, message: &MessageRecord) -> Result<&DirectoryUser, SkipReason> {
        if message.is_from_application() {
            return Err(SkipReason::Application);
        }
        if message.is_blank() {
            return Err(SkipReason::Blank);
        }

        self.resolve_identity(&message.author)
            .ok_or(SkipReason::UnknownAuthor)
    }

    fn resolve_identity(&self, author: &Author) -> Option<&DirectoryUser> {
        match &author.details {
            Some(details) => details
                .emails
                .iter()
                .find_map(|email| self.find_member(email)),
            None if author.name.trim().eq_ignore_ascii_case(DELETED_AUTHOR) => self
                .options
                .fallback_member
                .as_deref()
                .and_then(|email| self.find_member(email)),
            None => None,
        }
    }

    async fn complete_channel_migration(
        &self,
        state: &mut RunState,
        team_id: &str,
        channel_id: &str,
    ) -> Result<()> {
        let teams = self.teams;
        let channel = state
            .budget
            .run("get channel", || teams.get_channel(team_id, channel_id))
            .await?;

        info!(
            "Completing channel migration for channel \"{}\".",
            channel.display_name
        );
        state
            .budget
            .run("complete channel migration", || {
                teams.complete_channel_migration(team_id, channel_id)
            })
            .await?;

        Ok(())
    }

    async fn complete_general_channel_migration(
        &self,
        state: &mut RunState,
        team: &Team,
    ) -> Result<()> {
        let general = self.wait_for_general_channel(state, &team.id).await?;

        self.pause(self.options.pacing.provisioning_pause).await;
        self.complete_channel_migration(state, &team.id, &general.id)
            .await?;
        self.pause(self.options.pacing.provisioning_pause).await;

        Ok(())
    }

    async fn complete_team_migration(&self, state: &mut RunState, team_id: &str) -> Result<()> {
        info!("Completing team migration.");
        let teams = self.teams;
        state
            .budget
            .run("complete team migration", || {
                teams.complete_team_migration(team_id)
            })
            .await?;

        Ok(())
    }

    /// Add the team's members in one call, the first listed one as owner.
    async fn add_members(
        &self,
        state: &mut RunState,
        team_id: &str,
        members: &[String],
    ) -> Result<usize> {
        self.pause(self.options.pacing.provisioning_pause).await;

        let bindings: Vec<MemberBinding> = members
            .iter()
            .enumerate()
            .filter_map(|(index, email)| {
                let user = self.find_member(email)?;
                Some((index, user))
            })
            .map(|(index, user)| {
                info!("- \"{}\"", user.name());
                MemberBinding::new(&user.id, index == 0)
            })
            .collect();

        if bindings.is_empty() {
            warn!("No members to add");
            return Ok(0);
        }

        info!("Add {} members to team", bindings.len());
        let teams = self.teams;
        state
            .budget
            .run("add members", || teams.add_members(team_id, &bindings))
            .await?;
        self.pause(self.options.pacing.provisioning_pause).await;

        Ok(bindings.len())
    }

    fn progress_bar(&self, len: usize) -> Result<ProgressBar> {
        if !self.options.show_progress {
            return Ok(ProgressBar::hidden());
        }

        let progress = ProgressBar::new(len as u64);
        progress.set_style(ProgressStyle::with_template(
            "{bar:40.cyan/blue} {pos}/{len} messages ({eta})",
        )?);
        Ok(progress)
    }

    async fn pause(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}
