//! Image resolution, pulling, and digest pinning.
//!
//! Floating references (no tag, or `latest`) are pinned to the digest
//! reported by the first successful pull, so later recreations deploy the
//! exact same bits. Explicit tags are trusted as immutable and left alone.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::engine::ContainerEngine;
use crate::error::{Error, Result};
use crate::registry::Registry;
use crate::types::{NodeContainerConfig, RegistryAuth};

/// Pull attempts used by the lifecycle manager unless overridden.
pub const DEFAULT_PULL_ATTEMPTS: u32 = 3;

static DIGEST_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^Digest: (\S+)").expect("digest pattern is valid"));

/// The image to deploy: the pinned digest if recorded, else the declared image.
pub fn effective_image(config: &NodeContainerConfig) -> Option<&str> {
    config
        .pinned_image
        .as_deref()
        .filter(|image| !image.is_empty())
        .or_else(|| config.config.image.as_deref().filter(|image| !image.is_empty()))
}

/// Whether a successfully pulled `image` should be pinned to its digest.
///
/// True when the reference has no tag or is tagged `latest`. A registry host
/// with a port (`host:5000/app`) is not mistaken for a tag.
pub fn should_pin(image: &str) -> bool {
    let last = image.splitn(3, '/').last().unwrap_or(image);
    match last.split_once(':') {
        None => true,
        Some((_, tag)) => tag == "latest",
    }
}

/// The first `Digest: <digest>` line of a pull output stream.
pub fn extract_digest(output: &str) -> Option<&str> {
    DIGEST_LINE
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Result of a successful pull.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullOutcome {
    /// Rendered output of the successful attempt.
    pub output: String,
    /// Attempts consumed, including the successful one.
    pub attempts: u32,
}

/// Pull `image` up to `max_attempts` times back to back.
///
/// Every error is retried the same way; after the last attempt its error is
/// returned. At least one attempt is always made.
pub async fn pull_with_retry(
    engine: &dyn ContainerEngine,
    image: &str,
    auth: &RegistryAuth,
    max_attempts: u32,
) -> Result<PullOutcome> {
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        let mut output = String::new();
        match engine.pull_image(image, auth, &mut output).await {
            Ok(()) => {
                debug!(%image, attempt, "image pulled");
                return Ok(PullOutcome {
                    output,
                    attempts: attempt,
                });
            }
            Err(e) if attempt < max_attempts => {
                warn!(%image, attempt, max_attempts, error = %e, "image pull failed, retrying");
            }
            Err(e) => {
                warn!(%image, attempt, error = %e, "image pull failed, giving up");
                return Err(Error::Pull {
                    image: image.to_string(),
                    attempts: attempt,
                    source: e,
                });
            }
        }
    }
}

/// Pin `config` to the digest found in `output` when `image` is floating.
///
/// Pinning never fails the caller: a missing digest or a store error is
/// logged and the container is created from the floating reference.
/// Returns the pinned reference when one was recorded.
pub fn pin_if_needed(
    registry: &Registry,
    config: &mut NodeContainerConfig,
    image: &str,
    output: &str,
) -> Option<String> {
    if !should_pin(image) {
        return None;
    }
    let Some(digest) = extract_digest(output) else {
        debug!(name = %config.name, %image, "no digest in pull output, image left unpinned");
        return None;
    };
    let pinned = format!("{image}@{digest}");
    if pinned == image {
        return None;
    }
    if let Err(e) = registry.set_pinned_image(&config.name, &pinned) {
        warn!(name = %config.name, %pinned, error = %e, "failed to record pinned image");
        return None;
    }
    config.pinned_image = Some(pinned.clone());
    Some(pinned)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::engine::EngineError;
    use crate::fakes::FakeEngine;
    use nodefleet_state::StateStore;

    const PULL_OUTPUT: &str = "Pulling from fleet/agent\n\
        a3ed95caeb02: Pull complete\n\
        Digest: sha256:5d4d4c0e1f\n\
        Status: Downloaded newer image for fleet/agent:latest\n";

    #[test]
    fn effective_image_prefers_pinned() {
        let mut cfg = NodeContainerConfig::new("agent");
        assert_eq!(effective_image(&cfg), None);

        cfg.config.image = Some("fleet/agent".to_string());
        assert_eq!(effective_image(&cfg), Some("fleet/agent"));

        cfg.pinned_image = Some("fleet/agent@sha256:1".to_string());
        assert_eq!(effective_image(&cfg), Some("fleet/agent@sha256:1"));

        cfg.pinned_image = Some(String::new());
        assert_eq!(effective_image(&cfg), Some("fleet/agent"));
    }

    #[test]
    fn should_pin_floating_references_only() {
        assert!(!should_pin("x/y:v1"));
        assert!(should_pin("x/y:latest"));
        assert!(should_pin("x/y"));
        assert!(should_pin("agent"));
        assert!(should_pin("registry.local:5000/team/agent"));
        assert!(!should_pin("registry.local:5000/team/agent:1.2"));
        assert!(!should_pin("x/y@sha256:abc"));
    }

    #[test]
    fn extract_digest_finds_first_digest_line() {
        assert_eq!(extract_digest(PULL_OUTPUT), Some("sha256:5d4d4c0e1f"));
        assert_eq!(extract_digest("Status: Image is up to date\n"), None);
        assert_eq!(extract_digest("Digest: \n"), None);
    }

    #[tokio::test]
    async fn pull_succeeds_on_third_attempt() {
        let engine = FakeEngine::new();
        engine.fail_pulls(2, EngineError::Transport("timeout".into()));

        let outcome = pull_with_retry(&engine, "fleet/agent", &RegistryAuth::default(), 3)
            .await
            .unwrap();

        assert_eq!(outcome.attempts, 3);
        assert_eq!(engine.pull_count(), 3);
    }

    #[tokio::test]
    async fn pull_returns_last_error_after_exhausting_attempts() {
        let engine = FakeEngine::new();
        engine.script_pulls(vec![
            Err(EngineError::Transport("first".into())),
            Err(EngineError::Transport("second".into())),
            Err(EngineError::Pull("third".into())),
        ]);

        let err = pull_with_retry(&engine, "fleet/agent", &RegistryAuth::default(), 3)
            .await
            .unwrap_err();

        match err {
            Error::Pull { attempts, source, .. } => {
                assert_eq!(attempts, 3);
                assert_eq!(source, EngineError::Pull("third".into()));
            }
            other => panic!("expected pull error, got {other:?}"),
        }
        assert_eq!(engine.pull_count(), 3);
    }

    #[tokio::test]
    async fn pull_with_zero_attempts_still_tries_once() {
        let engine = FakeEngine::new();
        let outcome = pull_with_retry(&engine, "fleet/agent", &RegistryAuth::default(), 0)
            .await
            .unwrap();
        assert_eq!(outcome.attempts, 1);
    }

    fn registry_with_agent(image: &str) -> Registry {
        let registry = Registry::new(Arc::new(StateStore::open_in_memory().unwrap()));
        let mut cfg = NodeContainerConfig::new("agent");
        cfg.config.image = Some(image.to_string());
        registry.add("", &cfg).unwrap();
        registry
    }

    #[test]
    fn pin_records_digest_for_floating_tag() {
        let registry = registry_with_agent("fleet/agent:latest");
        let mut cfg = registry.load("", "agent").unwrap();

        let pinned = pin_if_needed(&registry, &mut cfg, "fleet/agent:latest", PULL_OUTPUT);

        assert_eq!(pinned.as_deref(), Some("fleet/agent:latest@sha256:5d4d4c0e1f"));
        assert_eq!(cfg.pinned_image, pinned);
        assert_eq!(registry.load("edge", "agent").unwrap().pinned_image, pinned);
    }

    #[test]
    fn pin_skips_versioned_tags() {
        let registry = registry_with_agent("fleet/agent:v1");
        let mut cfg = registry.load("", "agent").unwrap();

        assert_eq!(pin_if_needed(&registry, &mut cfg, "fleet/agent:v1", PULL_OUTPUT), None);
        assert_eq!(registry.load("", "agent").unwrap().pinned_image, None);
    }

    #[test]
    fn pin_without_digest_is_not_an_error() {
        let registry = registry_with_agent("fleet/agent");
        let mut cfg = registry.load("", "agent").unwrap();

        assert_eq!(pin_if_needed(&registry, &mut cfg, "fleet/agent", "no digest here"), None);
        assert_eq!(cfg.pinned_image, None);
    }
}
