use std::sync::Arc;

use tracing::info;

use nodefleet_core::{ClusterHook, HookEvent, RecreateSummary, WriterProgress};

use super::App;

/// Recreate node containers on the given nodes, or on every configured node.
pub async fn recreate(app: &App, nodes: &[String], keep_existing: bool) -> anyhow::Result<()> {
    let nodes = nodes.iter().map(|a| app.provisioner.resolve(a)).collect();
    let recreator = app
        .recreator()
        .with_progress(Arc::new(WriterProgress::new(std::io::stdout())));

    let summary = recreator.ensure_started(!keep_existing, nodes).await?;
    report(&summary);
    Ok(())
}

/// Run the node registration hook for a node that just joined.
pub async fn node_added(app: &App, address: &str) -> anyhow::Result<()> {
    let node = app.provisioner.resolve(address);
    let recreator = app
        .recreator()
        .with_progress(Arc::new(WriterProgress::new(std::io::stdout())));

    let summary = match app.config.baseline_container() {
        Some(baseline) => {
            ClusterHook::new(recreator, baseline)
                .run(HookEvent::AfterNodeRegister, &node)
                .await?
        }
        None => {
            info!("no baseline configured, starting existing node containers only");
            recreator.ensure_started(false, vec![node]).await?
        }
    };
    report(&summary);
    Ok(())
}

fn report(summary: &RecreateSummary) {
    println!(
        "✓ {} node container(s) ready ({} node(s) × {} config(s))",
        summary.units, summary.nodes, summary.configs
    );
}
