use std::time::Duration;
use anyhow::Result;

use crate::endpoint::Endpoint;

pub(crate) const DEFAULT_BOOTSTRAP_ID: u32 = 1;
pub(crate) const DEFAULT_BOOTSTRAP_PORT: u16 = 0;
pub(crate) const DEFAULT_GOSSIP_FANOUT: usize = 2;
pub(crate) const DEFAULT_FAIL_TIMEOUT: u64 = 5; // in ticks
pub(crate) const DEFAULT_REMOVE_TIMEOUT: u64 = 20; // in ticks
pub(crate) const DEFAULT_EXPIRY_CADENCE: u64 = 1; // run expiry every N ticks
pub(crate) const DEFAULT_GOSSIP_INTERVAL: u64 = 1_000; // in millis

#[derive(Debug, Clone)]
pub struct GossipmeshConfig {
    pub(crate) endpoint: Endpoint,
    pub(crate) bootstrap: Endpoint,
    pub(crate) gossip_fanout: usize,
    pub(crate) fail_timeout: u64,
    pub(crate) remove_timeout: u64,
    pub(crate) expiry_cadence: u64,
    pub(crate) gossip_interval: Duration,
}

impl GossipmeshConfig {
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    /// The well-known rendezvous endpoint joiners contact at startup.
    pub fn bootstrap(&self) -> Endpoint {
        self.bootstrap
    }

    /// Whether this node is the statically designated coordinator.
    pub fn is_coordinator(&self) -> bool {
        self.endpoint == self.bootstrap
    }

    pub fn gossip_fanout(&self) -> usize {
        self.gossip_fanout
    }

    pub fn gossip_interval(&self) -> Duration {
        self.gossip_interval
    }
}

/// Configuration for the membership protocol.
#[derive(Debug, Clone)]
pub struct GossipmeshConfigBuilder {
    /// Identity of the local node.
    pub(crate) endpoint: Option<Endpoint>,

    /// Rendezvous coordinator identity. Every node in one topology must
    /// agree on this value.
    pub(crate) bootstrap: Endpoint,

    /// Number of peers pushed to per gossip round.
    pub(crate) gossip_fanout: usize,

    /// Ticks without a heartbeat advance before a member is suspected.
    pub(crate) fail_timeout: u64,

    /// Additional ticks after suspicion before a member is removed.
    pub(crate) remove_timeout: u64,

    /// Run failure expiry every this many ticks.
    pub(crate) expiry_cadence: u64,

    /// Wall-clock interval between scheduler ticks when self-driven.
    pub(crate) gossip_interval: Duration,
}

impl Default for GossipmeshConfigBuilder {
    fn default() -> GossipmeshConfigBuilder {
        Self {
            endpoint: None,
            bootstrap: Endpoint::new(DEFAULT_BOOTSTRAP_ID, DEFAULT_BOOTSTRAP_PORT),
            gossip_fanout: DEFAULT_GOSSIP_FANOUT,
            fail_timeout: DEFAULT_FAIL_TIMEOUT,
            remove_timeout: DEFAULT_REMOVE_TIMEOUT,
            expiry_cadence: DEFAULT_EXPIRY_CADENCE,
            gossip_interval: Duration::from_millis(DEFAULT_GOSSIP_INTERVAL),
        }
    }
}

impl GossipmeshConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the local node identity.
    pub fn endpoint(mut self, endpoint: impl Into<Endpoint>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Sets the rendezvous coordinator identity.
    pub fn bootstrap(mut self, bootstrap: impl Into<Endpoint>) -> Self {
        self.bootstrap = bootstrap.into();
        self
    }

    /// Sets the gossip fan-out.
    pub fn gossip_fanout(mut self, fanout: usize) -> Self {
        self.gossip_fanout = fanout;
        self
    }

    /// Sets the fail timeout, in ticks.
    pub fn fail_timeout(mut self, ticks: u64) -> Self {
        self.fail_timeout = ticks;
        self
    }

    /// Sets the remove timeout, in ticks.
    pub fn remove_timeout(mut self, ticks: u64) -> Self {
        self.remove_timeout = ticks;
        self
    }

    /// Sets how often failure expiry runs, in ticks.
    pub fn expiry_cadence(mut self, ticks: u64) -> Self {
        self.expiry_cadence = ticks;
        self
    }

    /// Sets the wall-clock interval between self-driven ticks.
    pub fn gossip_interval(mut self, interval: Duration) -> Self {
        self.gossip_interval = interval;
        self
    }

    /// Validate the configuration to ensure all values are set.
    pub(crate) fn validate(&self) -> Result<()> {
        match self.endpoint {
            None => anyhow::bail!("node endpoint is not set"),
            Some(endpoint) if endpoint.is_null() => {
                anyhow::bail!("node endpoint is the null sentinel")
            }
            Some(_) => {}
        }
        if self.bootstrap.is_null() {
            anyhow::bail!("bootstrap endpoint is the null sentinel");
        }
        if self.gossip_fanout == 0 {
            anyhow::bail!("gossip fanout is not set");
        }
        if self.fail_timeout == 0 {
            anyhow::bail!("fail timeout is not set");
        }
        if self.remove_timeout == 0 {
            anyhow::bail!("remove timeout is not set");
        }
        if self.expiry_cadence == 0 {
            anyhow::bail!("expiry cadence is not set");
        }
        if self.gossip_interval.as_millis() == 0 {
            anyhow::bail!("gossip interval is not set");
        }
        Ok(())
    }

    pub fn build(self) -> Result<GossipmeshConfig> {
        self.validate()?;

        Ok(GossipmeshConfig {
            endpoint: self.endpoint.expect("validated above"),
            bootstrap: self.bootstrap,
            gossip_fanout: self.gossip_fanout,
            fail_timeout: self.fail_timeout,
            remove_timeout: self.remove_timeout,
            expiry_cadence: self.expiry_cadence,
            gossip_interval: self.gossip_interval,
        })
    }
}
