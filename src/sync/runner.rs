//! Combined sync: pull then push, either batched or one file at a time.

use anyhow::Result;
use serde::Serialize;
use tracing::info;

use crate::backend::{DeviceBackend, RemoteBackend};
use crate::config::Config;
use crate::state::StateStore;
use crate::sync::puller::{PullResult, Puller};
use crate::sync::pusher::{PushResult, Pusher};
use crate::sync::streamer::{StreamOptions, StreamResult, Streamer};

/// How a combined sync interleaves its two halves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncMode {
    /// Pull every file of every source, then push every destination.
    #[default]
    Batched,
    /// Stream each file straight through without keeping a local copy.
    Interleaved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SyncReport {
    Batched {
        pulls: Vec<PullResult>,
        pushes: Vec<PushResult>,
    },
    Interleaved {
        streams: Vec<StreamResult>,
    },
}

impl SyncReport {
    /// Every error collected anywhere in the run.
    pub fn errors(&self) -> Vec<&str> {
        match self {
            SyncReport::Batched { pulls, pushes } => pulls
                .iter()
                .flat_map(|r| r.errors.iter())
                .chain(pushes.iter().flat_map(|r| r.errors.iter()))
                .map(String::as_str)
                .collect(),
            SyncReport::Interleaved { streams } => streams
                .iter()
                .flat_map(|r| r.errors.iter())
                .map(String::as_str)
                .collect(),
        }
    }
}

pub struct SyncRunner<'a> {
    device: &'a dyn DeviceBackend,
    remote: &'a dyn RemoteBackend,
    store: &'a StateStore,
    config: &'a Config,
}

impl<'a> SyncRunner<'a> {
    pub fn new(
        device: &'a dyn DeviceBackend,
        remote: &'a dyn RemoteBackend,
        store: &'a StateStore,
        config: &'a Config,
    ) -> Self {
        Self {
            device,
            remote,
            store,
            config,
        }
    }

    /// Run one combined sync. `source` limits the pull side to a single
    /// source; otherwise every online source is visited. Fails only when the
    /// sources cannot be enumerated at all.
    pub fn run(&self, mode: SyncMode, source: Option<&str>) -> Result<SyncReport> {
        match mode {
            SyncMode::Batched => {
                let puller = Puller::new(self.device, self.store, self.config);
                let pulls = match source {
                    Some(id) => vec![puller.pull_source(id)],
                    None => puller.pull_all()?,
                };
                info!(sources = pulls.len(), "pull phase finished");

                let pushes = Pusher::new(self.remote, self.store, self.config).push_all();
                Ok(SyncReport::Batched { pulls, pushes })
            }
            SyncMode::Interleaved => {
                let streamer = Streamer::new(
                    self.device,
                    self.remote,
                    self.store,
                    self.config,
                    StreamOptions::skip_local(),
                );
                let streams = match source {
                    Some(id) => vec![streamer.stream_source(id)],
                    None => streamer.stream_all()?,
                };
                Ok(SyncReport::Interleaved { streams })
            }
        }
    }
}
