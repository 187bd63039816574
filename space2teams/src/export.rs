use anyhow::Result;
use log::{error, info, warn};
use std::collections::BTreeSet;

use crate::api::space::SpaceApi;
use crate::error::{ApiError, MigrationError};
use crate::models::{ChannelRecord, MessageRecord};
use crate::staging::StagingStore;

pub const DEFAULT_BATCH_SIZE: usize = 50;

#[derive(Debug, Default)]
pub struct ExportSummary {
    pub channels: usize,
    pub messages: u64,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
}

impl ExportSummary {
    /// Fail when any channel could not be exported.
    pub fn into_result(self) -> Result<Self, MigrationError> {
        if self.failed.is_empty() {
            Ok(self)
        } else {
            Err(MigrationError::ExportIncomplete {
                channels: self.failed,
            })
        }
    }
}

/// Copies every channel of the source chat into the staging store.
pub struct Exporter<'a, S: SpaceApi> {
    space: &'a S,
    staging: &'a StagingStore,
    batch_size: usize,
    clean_up: bool,
    skip_channels: BTreeSet<String>,
}

impl<'a, S: SpaceApi> Exporter<'a, S> {
    pub fn new(space: &'a S, staging: &'a StagingStore) -> Self {
        Self {
            space,
            staging,
            batch_size: DEFAULT_BATCH_SIZE,
            clean_up: true,
            skip_channels: BTreeSet::new(),
        }
    }

    pub fn set_batch_size(&mut self, batch_size: usize) {
        self.batch_size = batch_size.max(1);
    }

    /// Whether to wipe the staging directory before exporting.
    pub fn set_clean_up(&mut self, clean_up: bool) {
        self.clean_up = clean_up;
    }

    pub fn skip_channel(&mut self, name: &str) {
        self.skip_channels.insert(name.to_string());
    }

    pub fn do_not_skip_channel(&mut self, name: &str) {
        self.skip_channels.remove(name);
    }

    pub fn is_skipped(&self, name: &str) -> bool {
        self.skip_channels.contains(name)
    }

    pub async fn export(&self) -> Result<ExportSummary> {
        if self.clean_up {
            self.staging.wipe()?;
        }
        self.staging.write_manifest()?;

        let channels = self
            .space
            .list_channels()
            .await
            .map_err(|e| MigrationError::unrecoverable("list channels", e))?;
        info!("Found {} channels", channels.len());

        let mut summary = ExportSummary::default();

        for channel in &channels {
            if self.is_skipped(&channel.name) {
                info!("Skipping channel \"{}\"", channel.name);
                summary.skipped.push(channel.name.clone());
                continue;
            }

            let staged_before = self.staging.has_slot(&channel.id);
            match self.export_channel(channel, staged_before).await? {
                Ok(count) => {
                    summary.channels += 1;
                    summary.messages += count as u64;
                }
                Err(e) => {
                    error!("Export of channel \"{}\" failed: {}", channel.name, e);
                    if staged_before {
                        warn!("Keeping the previous export of \"{}\"", channel.name);
                    } else {
                        self.staging.remove_slot(&channel.id)?;
                    }
                    summary.failed.push(channel.name.clone());
                }
            }
        }

        Ok(summary)
    }

    /// The outer result carries local I/O failures, the inner one the
    /// remote failure that aborted this channel.
    async fn export_channel(
        &self,
        channel: &ChannelRecord,
        staged_before: bool,
    ) -> Result<Result<usize, ApiError>> {
        // an earlier export stays untouched until this one has all its pages
        if !staged_before {
            self.staging.create_slot(channel)?;
        }

        info!(
            "Adding {} messages from channel \"{}\"",
            channel.total_messages, channel.name
        );
        let messages = match self.fetch_messages(channel).await {
            Ok(messages) => messages,
            Err(e) => return Ok(Err(e)),
        };

        if staged_before {
            self.staging.create_slot(channel)?;
        }
        self.staging.write_messages(&channel.id, &messages)?;
        info!("Added {} messages.", messages.len());

        Ok(Ok(messages.len()))
    }

    /// Page through the channel oldest first and keep every page in memory.
    async fn fetch_messages(&self, channel: &ChannelRecord) -> Result<Vec<MessageRecord>, ApiError> {
        let mut messages = Vec::new();
        let mut start_from: Option<String> = None;

        loop {
            let page = self
                .space
                .get_messages(&channel.id, start_from.as_deref(), self.batch_size)
                .await?;
            let received = page.messages.len();
            messages.extend(page.messages);

            if page.org_limit_reached {
                info!("Organization limit reached in channel \"{}\"", channel.name);
                break;
            }
            let complete =
                channel.total_messages > 0 && messages.len() as u64 >= channel.total_messages;
            if received < self.batch_size || complete {
                break;
            }
            match page.next_start_from {
                Some(next) => start_from = Some(next),
                None => break,
            }
        }

        Ok(messages)
    }
}
