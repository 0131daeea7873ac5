//! # Zone-Backed Binding Store
//!
//! Here the authoritative DNS zone *is* the system of record. `check` does
//! live lookups against the zone's primary server; `update` and `revoke`
//! send RFC 2136 change-batches to the same server. There is no resolver
//! component in front of this backend: the zone is served to the world by
//! ordinary DNS infrastructure, and this store is merely its management
//! client.
//!
//! Two deliberate asymmetries against the file backend:
//!
//! - No TTL concept. A record's presence is the registered state; a
//!   zone-registered binding never expires on its own.
//! - The revocation sentinel (`r-<identity>`, an A record pointing at
//!   127.0.0.1) is upserted once and never removed by this component.
//!   There is no un-revoke.
//!
//! Every network call is wrapped in a bounded timeout and surfaced as a
//! [`StoreError`]; nothing here retries.

use async_trait::async_trait;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tracing::debug;

use hickory_client::client::{Client, ClientHandle};
use hickory_proto::op::ResponseCode;
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{DNSClass, Name, RData, Record, RecordType};
use hickory_proto::runtime::TokioRuntimeProvider;
use hickory_proto::udp::UdpClientStream;
use hickory_proto::xfer::DnsResponse;

use crate::config::{DEFAULT_ZONE_TIMEOUT, ZONE_RECORD_TTL};
use crate::identity::Identity;

use super::{BindingStatus, BindingStore, StoreError};

/// Address value of a revocation sentinel record. The sentinel only needs
/// to exist; the loopback value keeps it harmless if anyone resolves it.
const SENTINEL_ADDR: Ipv4Addr = Ipv4Addr::new(127, 0, 0, 1);

/// Configuration for a [`ZoneStore`].
#[derive(Debug, Clone)]
pub struct ZoneConfig {
    /// The zone primary accepting queries and RFC 2136 updates.
    pub endpoint: SocketAddr,
    /// Zone origin, e.g. `sigil.test` (trailing dot optional).
    pub origin: String,
    /// TTL stamped on upserted records.
    pub record_ttl: u32,
    /// Per-call network timeout.
    pub timeout: Duration,
}

impl ZoneConfig {
    /// Config with standard TTL and timeout for the given endpoint + origin.
    pub fn new(endpoint: SocketAddr, origin: impl Into<String>) -> Self {
        Self {
            endpoint,
            origin: origin.into(),
            record_ttl: ZONE_RECORD_TTL,
            timeout: DEFAULT_ZONE_TIMEOUT,
        }
    }
}

/// Binding store speaking to an authoritative zone over DNS.
pub struct ZoneStore {
    config: ZoneConfig,
    origin: Name,
}

impl ZoneStore {
    /// Validate the origin name and build the store. No connection is made
    /// until the first operation.
    pub fn new(config: ZoneConfig) -> Result<Self, StoreError> {
        let mut origin_str = config.origin.trim_end_matches('.').to_owned();
        origin_str.push('.');
        let origin = Name::from_ascii(&origin_str)
            .map_err(|e| StoreError::Zone(format!("invalid zone origin {origin_str:?}: {e}")))?;
        Ok(Self { config, origin })
    }

    fn binding_name(&self, identity: &Identity) -> Result<Name, StoreError> {
        self.child_name(identity.as_str())
    }

    fn sentinel_name(&self, identity: &Identity) -> Result<Name, StoreError> {
        self.child_name(&identity.revocation_label())
    }

    fn child_name(&self, label: &str) -> Result<Name, StoreError> {
        Name::from_ascii(format!("{label}.{}", self.origin))
            .map_err(|e| StoreError::Zone(format!("invalid record name: {e}")))
    }

    /// Open a fresh connection to the zone primary. Connections are
    /// per-operation; this store is not on any hot path that would justify
    /// pooling them.
    async fn connect(&self) -> Result<Client, StoreError> {
        let stream =
            UdpClientStream::builder(self.config.endpoint, TokioRuntimeProvider::new()).build();
        let (client, bg) = self.bounded("connect", Client::connect(stream)).await?;
        tokio::spawn(bg);
        Ok(client)
    }

    /// Run a zone call under the configured timeout.
    async fn bounded<T, E, F>(&self, what: &str, fut: F) -> Result<T, StoreError>
    where
        F: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        match tokio::time::timeout(self.config.timeout, fut).await {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) => Err(StoreError::Zone(format!("{what}: {e}"))),
            Err(_) => Err(StoreError::Timeout(self.config.timeout)),
        }
    }

    /// Query the zone for an A record, returning its address text if any.
    async fn query_a(&self, name: Name) -> Result<Option<String>, StoreError> {
        let mut client = self.connect().await?;
        let response = self
            .bounded("query", client.query(name, DNSClass::IN, RecordType::A))
            .await?;
        Ok(first_a(&response))
    }

    fn ensure_accepted(&self, what: &str, response: &DnsResponse) -> Result<(), StoreError> {
        if response.response_code() == ResponseCode::NoError {
            Ok(())
        } else {
            Err(StoreError::Zone(format!(
                "{what} rejected by zone: {}",
                response.response_code()
            )))
        }
    }

    /// Replace the A rrset at `name` with a single record. RFC 2136 has no
    /// single upsert op, so this is delete-rrset followed by append; rrset
    /// deletes of absent names succeed silently per the RFC.
    async fn upsert_a(&self, name: Name, addr: Ipv4Addr) -> Result<(), StoreError> {
        let mut client = self.connect().await?;

        let probe = Record::from_rdata(name.clone(), 0, RData::A(A::from(Ipv4Addr::UNSPECIFIED)));
        let response = self
            .bounded(
                "delete rrset",
                client.delete_rrset(probe, self.origin.clone()),
            )
            .await?;
        self.ensure_accepted("delete rrset", &response)?;

        let record = Record::from_rdata(name, self.config.record_ttl, RData::A(A::from(addr)));
        let response = self
            .bounded("append", client.append(record, self.origin.clone(), false))
            .await?;
        self.ensure_accepted("append", &response)
    }

    /// Remove the whole A rrset at `name`.
    async fn delete_a(&self, name: Name) -> Result<(), StoreError> {
        let mut client = self.connect().await?;
        let probe = Record::from_rdata(name, 0, RData::A(A::from(Ipv4Addr::UNSPECIFIED)));
        let response = self
            .bounded(
                "delete rrset",
                client.delete_rrset(probe, self.origin.clone()),
            )
            .await?;
        self.ensure_accepted("delete rrset", &response)
    }
}

fn first_a(response: &DnsResponse) -> Option<String> {
    response.answers().iter().find_map(|record| {
        if let RData::A(a) = record.data() {
            Some(a.0.to_string())
        } else {
            None
        }
    })
}

#[async_trait]
impl BindingStore for ZoneStore {
    async fn check(&self, identity: &Identity) -> Result<BindingStatus, StoreError> {
        // Sentinel first: a revoked identity must read as revoked even if a
        // live A record somehow coexists with it.
        if self.query_a(self.sentinel_name(identity)?).await?.is_some() {
            return Ok(BindingStatus::Revoked);
        }
        match self.query_a(self.binding_name(identity)?).await? {
            Some(address) => Ok(BindingStatus::Registered { address }),
            None => Ok(BindingStatus::Unregistered),
        }
    }

    async fn update(&self, identity: &Identity, address: &str) -> Result<(), StoreError> {
        let addr: Ipv4Addr = address
            .parse()
            .map_err(|_| StoreError::BadAddress(address.to_owned()))?;
        self.upsert_a(self.binding_name(identity)?, addr).await?;
        debug!(identity = %identity, address, "zone binding upserted");
        Ok(())
    }

    async fn revoke(&self, identity: &Identity) -> Result<(), StoreError> {
        match self.check(identity).await? {
            BindingStatus::Revoked => Ok(()), // already terminal, nothing to do
            current => {
                if let BindingStatus::Registered { .. } = current {
                    self.delete_a(self.binding_name(identity)?).await?;
                }
                self.upsert_a(self.sentinel_name(identity)?, SENTINEL_ADDR)
                    .await?;
                debug!(identity = %identity, "zone revocation sentinel written");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::SigilKeypair;

    fn test_store() -> ZoneStore {
        // Port 1 is never contacted by these tests; everything below stops
        // before any network call.
        ZoneStore::new(ZoneConfig::new(
            "127.0.0.1:1".parse().unwrap(),
            "sigil.test",
        ))
        .unwrap()
    }

    #[test]
    fn origin_is_normalized_to_fqdn() {
        let store = test_store();
        assert_eq!(store.origin.to_string(), "sigil.test.");

        let dotted = ZoneStore::new(ZoneConfig::new(
            "127.0.0.1:1".parse().unwrap(),
            "sigil.test.",
        ))
        .unwrap();
        assert_eq!(dotted.origin.to_string(), "sigil.test.");
    }

    #[test]
    fn record_names_carry_identity_and_sentinel_labels() {
        let store = test_store();
        let id = Identity::derive(&SigilKeypair::generate().public_key()).unwrap();

        let binding = store.binding_name(&id).unwrap();
        assert_eq!(binding.to_string(), format!("{id}.sigil.test."));

        let sentinel = store.sentinel_name(&id).unwrap();
        assert_eq!(sentinel.to_string(), format!("r-{id}.sigil.test."));
    }

    #[tokio::test]
    async fn update_rejects_unusable_addresses_before_any_network_call() {
        let store = test_store();
        let id = Identity::derive(&SigilKeypair::generate().public_key()).unwrap();
        let err = store.update(&id, "not-an-address").await.unwrap_err();
        assert!(matches!(err, StoreError::BadAddress(_)));
    }

    #[tokio::test]
    async fn unreachable_zone_surfaces_as_store_error_not_hang() {
        let mut config = ZoneConfig::new("127.0.0.1:1".parse().unwrap(), "sigil.test");
        config.timeout = Duration::from_millis(200);
        let store = ZoneStore::new(config).unwrap();
        let id = Identity::derive(&SigilKeypair::generate().public_key()).unwrap();

        let err = store.check(&id).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Zone(_) | StoreError::Timeout(_)
        ));
    }
}
