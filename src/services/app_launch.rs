//! Opening other apps by voice
//!
//! An utterance that names a known app ("打开QQ音乐") opens it through the
//! platform's URL handler instead of going to the model.

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::error::Result;

/// Platform hook for opening URL schemes
pub trait AppLauncher: Send + Sync {
    /// Whether an installed app handles `uri`
    fn can_open(&self, uri: &str) -> bool;

    /// Hand `uri` to the platform
    fn open(&self, uri: &str) -> Result<()>;
}

/// Launcher for hosts with no other apps to open, such as the CLI
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadlessLauncher;

impl AppLauncher for HeadlessLauncher {
    fn can_open(&self, _uri: &str) -> bool {
        false
    }

    fn open(&self, uri: &str) -> Result<()> {
        Err(format!("cannot open {uri} without a desktop").into())
    }
}

/// Outcome of an app launch attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppLaunchResult {
    pub launched: bool,
    pub message: String,
}

/// Matches app names in utterances and launches them
pub struct AppLaunchService {
    apps: IndexMap<String, String>,
    launcher: Arc<dyn AppLauncher>,
}

impl AppLaunchService {
    /// Service with the built-in app table
    pub fn new(launcher: Arc<dyn AppLauncher>) -> Self {
        let apps = [
            ("QQ音乐", "qqmusic://"),
            ("网易云音乐", "orpheuswidget://"),
            ("喜马拉雅", "iting://open"),
        ]
        .into_iter()
        .map(|(name, uri)| (name.to_string(), uri.to_string()))
        .collect();

        Self { apps, launcher }
    }

    /// Register another app keyword
    #[must_use]
    pub fn with_app(mut self, keyword: impl Into<String>, uri: impl Into<String>) -> Self {
        self.apps.insert(keyword.into(), uri.into());
        self
    }

    /// Launch the first app named in `command`, if any
    ///
    /// `None` means no app was mentioned and the command should go to chat.
    pub fn check_and_launch(&self, command: &str) -> Option<AppLaunchResult> {
        let Some((name, uri)) = self.apps.iter().find(|(name, _)| command.contains(name.as_str()))
        else {
            debug!("no app keyword in command");
            return None;
        };

        info!(app = %name, %uri, "launching app");
        if !self.launcher.can_open(uri) {
            debug!(app = %name, "no handler installed");
            return Some(AppLaunchResult {
                launched: false,
                message: format!("您似乎没有安装{name}，请先安装该应用。"),
            });
        }

        match self.launcher.open(uri) {
            Ok(()) => Some(AppLaunchResult {
                launched: true,
                message: format!("正在为您打开{name}..."),
            }),
            Err(e) => {
                warn!(app = %name, error = %e, "app launch failed");
                Some(AppLaunchResult {
                    launched: false,
                    message: format!("打开{name}失败了，请稍后再试。"),
                })
            }
        }
    }
}

impl std::fmt::Debug for AppLaunchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppLaunchService")
            .field("apps", &self.apps)
            .finish_non_exhaustive()
    }
}
