//! Command implementations.
//!
//! Each command writes its human-readable output to `out` so it can be
//! exercised without a terminal.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::Utc;
use odyn_store::policy::{Decision, Right, parse_timestamp};
use odyn_store::resource::{NodeId, codec};
use odyn_store::{
    Actor, Connection, PolicyEngine, PropValue, Resource, ResourceData, ResourcePath,
    StorageEngine,
};
use tracing::info;

use crate::cli::Command;

/// Mask shown in place of secret values.
const MASK: &str = "********";

/// How a command finished, when it did not fail outright.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// A permission check ran and denied.
    Denied,
}

/// Run `command` against `engine`.
pub async fn run(
    command: &Command,
    engine: Arc<dyn StorageEngine>,
    out: &mut (dyn Write + Send),
) -> anyhow::Result<Outcome> {
    match command {
        Command::Prep => {
            engine.prep().await?;
            writeln!(out, "storage prepared ({})", engine.name())?;
        }
        Command::Erase { yes } => {
            if !yes {
                bail!("refusing to erase without --yes");
            }
            engine.erase().await?;
            writeln!(out, "storage erased ({})", engine.name())?;
        }
        Command::Migrate { from, to } => {
            engine.migrate(from, to).await?;
            writeln!(out, "migrated {from} -> {to}")?;
        }
        Command::Show { path, reveal } => {
            let path = parse_path(path)?;
            with_connection(engine.as_ref(), |conn| async move {
                let mut data = conn.load_resource(&path).await?;
                if !reveal {
                    mask_secrets(&mut data)?;
                }
                let doc = codec::encode(&data)?;
                out.write_all(&codec::to_pretty_bytes(&doc)?)?;
                writeln!(out)?;
                Ok(Outcome::Success)
            })
            .await?;
        }
        Command::Delete { path } => {
            let path = parse_path(path)?;
            with_connection(engine.as_ref(), |conn| async move {
                conn.delete_resource(&path).await?;
                info!(%path, "resource deleted");
                writeln!(out, "deleted {path}")?;
                Ok(Outcome::Success)
            })
            .await?;
        }
        Command::Check {
            actor,
            path,
            right,
            property,
            app,
            at,
        } => {
            let right = Right::from_letter(*right)
                .with_context(|| format!("unknown right '{right}' (expected one of gsmcdG)"))?;
            let now = match at {
                Some(ts) => parse_timestamp(ts)?,
                None => Utc::now(),
            };
            let actor = match app {
                Some(app) => Actor::on_behalf_of(parse_path(actor)?, parse_path(app)?),
                None => Actor::new(parse_path(actor)?),
            };
            let path = parse_path(path)?;

            return with_connection(engine.as_ref(), |conn| async move {
                let resource = Resource::load(Arc::clone(&conn), path).await?;
                let prop = property
                    .as_deref()
                    .map(|dotted| resource.property_at(dotted))
                    .transpose()?;
                let decision = PolicyEngine::new(conn)
                    .evaluate(&actor, &resource, prop, right, now)
                    .await?;
                writeln!(out, "{decision}")?;
                Ok(match decision {
                    Decision::Allow { .. } => Outcome::Success,
                    Decision::Deny(_) => Outcome::Denied,
                })
            })
            .await;
        }
    }
    Ok(Outcome::Success)
}

fn parse_path(s: &str) -> anyhow::Result<ResourcePath> {
    ResourcePath::parse(s).with_context(|| format!("bad resource path '{s}'"))
}

/// Prep, connect, run `f`, and close the connection whatever happened.
async fn with_connection<F, Fut>(engine: &dyn StorageEngine, f: F) -> anyhow::Result<Outcome>
where
    F: FnOnce(Arc<dyn Connection>) -> Fut,
    Fut: Future<Output = anyhow::Result<Outcome>>,
{
    engine.prep().await?;
    let conn = engine.connect().await?;
    let result = f(Arc::clone(&conn)).await;
    conn.close().await?;
    result
}

/// Replace every non-null secret value with a mask.
fn mask_secrets(data: &mut ResourceData) -> anyhow::Result<()> {
    let mut stack: Vec<NodeId> = data.roots().values().copied().collect();
    let mut secrets = Vec::new();
    while let Some(id) = stack.pop() {
        let node = data.node(id);
        if node.datatype().is_secret() && !node.value().is_null() {
            secrets.push(id);
        }
        stack.extend(node.children().values().copied());
    }
    for id in secrets {
        data.set_value(id, PropValue::from(MASK))?;
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
