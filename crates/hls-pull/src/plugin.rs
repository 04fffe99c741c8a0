use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::session::StreamSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Publishes streams pulled from a remote origin.
    Publisher,
    /// Reacts to publish events of the host.
    Hook,
}

/// Static registration data announced to the host.
#[derive(Debug, Clone, Copy)]
pub struct PluginInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub capabilities: &'static [Capability],
}

pub const PLUGIN_INFO: PluginInfo = PluginInfo {
    name: "HLS",
    version: env!("CARGO_PKG_VERSION"),
    capabilities: &[Capability::Publisher, Capability::Hook],
};

/// Called with every newly registered session, before its loops start.
pub type PublishHook = Arc<dyn Fn(&Arc<StreamSession>) + Send + Sync>;

#[derive(Default, Clone)]
pub struct PublishHooks {
    hooks: Vec<PublishHook>,
}

impl PublishHooks {
    pub fn add(&mut self, hook: PublishHook) {
        self.hooks.push(hook);
    }

    pub fn run(&self, session: &Arc<StreamSession>) {
        for hook in &self.hooks {
            hook(session);
        }
    }
}

impl fmt::Debug for PublishHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublishHooks")
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

/// Keeps segment saving on for the whole life of every published session.
pub fn persistence_hook() -> PublishHook {
    Arc::new(|session: &Arc<StreamSession>| {
        session.save_switch().hold();
        info!(stream_path = %session.stream_path(), "Persisting HLS segments");
    })
}
