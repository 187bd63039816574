use chrono::{DateTime, Utc};

use crate::models::ChannelRecord;
use crate::models::teams::GENERAL_CHANNEL;

/// Separates a channel's team prefix from the rest of its name.
pub const PREFIX_DELIMITER: char = '-';

/// Team name → channel patterns, in declaration order.
///
/// A pattern is either a full channel name or a prefix ending in
/// [`PREFIX_DELIMITER`], e.g. `eng-` for every `eng-*` channel.
#[derive(Debug, Clone, Default)]
pub struct TeamMapping {
    teams: Vec<(String, Vec<String>)>,
}

impl TeamMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, pattern: &str, team: &str) {
        match self.teams.iter_mut().find(|(name, _)| name == team) {
            Some((_, patterns)) => patterns.push(pattern.to_string()),
            None => self
                .teams
                .push((team.to_string(), vec![pattern.to_string()])),
        }
    }

    pub fn patterns(&self, team: &str) -> &[String] {
        self.teams
            .iter()
            .find(|(name, _)| name == team)
            .map(|(_, patterns)| patterns.as_slice())
            .unwrap_or(&[])
    }

    pub fn team_names(&self) -> impl Iterator<Item = &str> {
        self.teams.iter().map(|(name, _)| name.as_str())
    }
}

/// Team name → member emails. The first member of a team becomes its owner.
#[derive(Debug, Clone, Default)]
pub struct MemberMapping {
    teams: Vec<(String, Vec<String>)>,
}

impl MemberMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, email: &str, team: &str) {
        match self.teams.iter_mut().find(|(name, _)| name == team) {
            Some((_, members)) => members.push(email.to_string()),
            None => self.teams.push((team.to_string(), vec![email.to_string()])),
        }
    }

    pub fn members(&self, team: &str) -> &[String] {
        self.teams
            .iter()
            .find(|(name, _)| name == team)
            .map(|(_, members)| members.as_slice())
            .unwrap_or(&[])
    }

    pub fn owner(&self, team: &str) -> Option<&str> {
        self.members(team).first().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.teams
            .iter()
            .map(|(name, members)| (name.as_str(), members.as_slice()))
    }
}

/// A staged channel assigned to a team.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedChannel<'a> {
    pub record: &'a ChannelRecord,
    /// Lands in the team's auto-provisioned General channel instead of a new one.
    pub is_general: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Mapping {
    pub channels: TeamMapping,
    pub members: MemberMapping,
}

impl Mapping {
    pub fn new(channels: TeamMapping, members: MemberMapping) -> Self {
        Self { channels, members }
    }

    /// Whether `team` is declared in either table.
    pub fn contains_team(&self, team: &str) -> bool {
        self.team_names().any(|name| name == team)
    }

    /// Every declared team once, channel table first.
    pub fn team_names(&self) -> impl Iterator<Item = &str> {
        let from_members = self
            .members
            .iter()
            .map(|(name, _)| name)
            .filter(|name| !self.channels.team_names().any(|other| other == *name));

        self.channels.team_names().chain(from_members)
    }

    /// Staged channels belonging to `team`, oldest first.
    pub fn resolve<'a>(&self, team: &str, staged: &'a [ChannelRecord]) -> Vec<ResolvedChannel<'a>> {
        let patterns = self.channels.patterns(team);

        let mut resolved: Vec<ResolvedChannel<'a>> = staged
            .iter()
            .filter_map(|record| match_channel(&record.name, patterns).map(|is_general| {
                ResolvedChannel { record, is_general }
            }))
            .collect();

        resolved.sort_by(|a, b| {
            a.record
                .created
                .cmp(&b.record.created)
                .then_with(|| a.record.id.cmp(&b.record.id))
        });

        resolved
    }
}

/// `Some(is_general)` when `name` matches one of `patterns`.
fn match_channel(name: &str, patterns: &[String]) -> Option<bool> {
    if patterns.iter().any(|p| p == name) {
        return Some(is_general_name(name));
    }

    let (prefix, _) = name.split_once(PREFIX_DELIMITER)?;
    let prefix = format!("{prefix}{PREFIX_DELIMITER}");

    patterns
        .iter()
        .any(|p| *p == prefix)
        .then(|| is_general_name(name))
}

/// `general`, or `general` after the team prefix, e.g. `eng-general`.
fn is_general_name(name: &str) -> bool {
    name.eq_ignore_ascii_case(GENERAL_CHANNEL)
        || name
            .split_once(PREFIX_DELIMITER)
            .is_some_and(|(_, rest)| rest.eq_ignore_ascii_case(GENERAL_CHANNEL))
}

/// Creation time for a team: the oldest of its channels.
pub fn team_created_at(channels: &[ResolvedChannel<'_>]) -> Option<DateTime<Utc>> {
    channels
        .iter()
        .map(|c| c.record.created)
        .min()
        .and_then(DateTime::from_timestamp_millis)
}
