//! Agent attachment: the ephemeral container every target pod receives (C3)

use std::time::Duration;
use tracing::{event, instrument, Level};

use crate::conf::DisruptorConfig;
use crate::pod_helper::{AttachOptions, EphemeralContainerSpec, PodHelper};
use crate::Error;

/// The fixed name every agent ephemeral container is attached under
pub const AGENT_CONTAINER_NAME: &str = "xk6-agent";

/// Build the ephemeral container spec the agent is attached with, per §4.3 / §6
///
/// # Arguments
///
/// * `conf` - Carries the agent image repository and fallback tag
/// * `build_id` - The caller's own build identifier, used as the image tag when present
/// * `argv` - The argv the agent container runs
#[must_use]
pub fn agent_container_spec(
    conf: &DisruptorConfig,
    build_id: Option<&str>,
    argv: Vec<String>,
) -> EphemeralContainerSpec {
    let tag = build_id.unwrap_or(&conf.agent_tag);
    EphemeralContainerSpec {
        name: AGENT_CONTAINER_NAME.to_owned(),
        image: format!("{}:{tag}", conf.agent_image),
        command: argv,
    }
}

/// Attach the agent to a pod, honoring the negative-timeout-is-zero test shortcut from §4.3
///
/// # Arguments
///
/// * `helper` - The pod helper to patch the ephemeral container through
/// * `pod` - The target pod's name
/// * `spec` - The ephemeral container spec to attach
/// * `timeout` - How long to wait for `Running`; negative values are treated as zero
#[instrument(name = "agent::attach", skip(helper, spec), err(Debug))]
pub async fn attach(
    helper: &dyn PodHelper,
    pod: &str,
    spec: &EphemeralContainerSpec,
    timeout: Duration,
) -> Result<(), Error> {
    let opts = AttachOptions {
        timeout,
        ignore_if_exists: true,
    };
    helper.attach_ephemeral(pod, spec, opts).await?;
    event!(Level::INFO, pod, container = %spec.name, msg = "agent attached");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_falls_back_to_configured_tag() {
        let conf = DisruptorConfig::default();
        let spec = agent_container_spec(&conf, None, vec!["disruptor-agent".to_owned()]);
        assert_eq!(spec.name, AGENT_CONTAINER_NAME);
        assert!(spec.image.ends_with(":latest"));
    }

    #[test]
    fn spec_prefers_build_id_as_tag() {
        let conf = DisruptorConfig::default();
        let spec = agent_container_spec(&conf, Some("v1.2.3"), vec!["disruptor-agent".to_owned()]);
        assert!(spec.image.ends_with(":v1.2.3"));
    }
}
