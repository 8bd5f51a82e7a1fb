//! Run command: start the agent until interrupted.

use std::sync::Arc;

use anyhow::Context;

use crate::config::Settings;
use crate::dispatch::DispatchHandler;
use crate::orchestrator::Orchestrator;
use crate::reaction::{HttpPusher, ReactionDispatcher};
use crate::rules::RuleSet;

/// Load the rules, wire the reaction handler and run until Ctrl+C.
pub async fn run(settings: &Settings) -> anyhow::Result<()> {
    let rules = RuleSet::load(&settings.rules_path)
        .with_context(|| format!("cannot load rules from {}", settings.rules_path.display()))?;

    let remote = settings
        .remote
        .address
        .as_deref()
        .map(|address| HttpPusher::new(address).map(|p| p.with_timeout(settings.remote.timeout())))
        .transpose()
        .context("invalid remote address")?;

    if let Some(pusher) = &remote {
        crate::log_event!("run", "reporting to", "{}", pusher.base_url());
    }

    let timeout = settings.reaction.timeout();
    let push_path = settings.remote.push_path.clone();

    let mut orchestrator = Orchestrator::builder()
        .rules(rules)
        .workers(settings.reaction.workers)
        .handler(move |pool| {
            let mut dispatcher = ReactionDispatcher::new(pool, timeout);
            if let Some(pusher) = remote {
                dispatcher = dispatcher.with_remote(pusher, push_path);
            }
            let handler: Arc<dyn DispatchHandler> = Arc::new(dispatcher);
            handler
        })
        .build()?;

    eprintln!(
        "Watching {} path(s) from {}. Press Ctrl+C to stop.",
        orchestrator.watchers().len(),
        settings.rules_path.display()
    );

    orchestrator.run_until_shutdown().await?;
    Ok(())
}
