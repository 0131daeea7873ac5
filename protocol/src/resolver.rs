//! # Name Resolver
//!
//! Answers address-record queries for claimed names out of a binding store.
//! Used only with the file-backed store; the zone backend is served by the
//! zone's own infrastructure.
//!
//! The contract is narrow on purpose: a query is inspected only if its
//! leftmost label has the identity shape (56 lowercase hex characters) and
//! the query type is A. A fresh binding yields exactly one A record with a
//! short fixed TTL; everything else, including expired bindings, unknown
//! names, other query types, and even store failures, yields an empty
//! answer section with a NoError rcode. DNS clients fall back to ordinary
//! negative caching; absence of a fresh binding is indistinguishable from
//! absence of the name.

use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{debug, warn};

use hickory_proto::op::{Header, ResponseCode};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{Name, RData, Record, RecordType};
use hickory_server::authority::MessageResponseBuilder;
use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};

use crate::config::DNS_ANSWER_TTL;
use crate::identity::Identity;
use crate::store::{BindingStatus, BindingStore};

/// DNS request handler that resolves identity labels against a binding
/// store. Plugs straight into hickory's `ServerFuture`.
pub struct NameResolver {
    store: Arc<dyn BindingStore>,
    answer_ttl: u32,
}

impl NameResolver {
    /// Build a resolver reading from the given store.
    pub fn new(store: Arc<dyn BindingStore>) -> Self {
        Self {
            store,
            answer_ttl: DNS_ANSWER_TTL,
        }
    }

    /// Decide the answer for an A query: `Some(ip)` only for an
    /// identity-shaped leftmost label with a fresh IPv4 binding.
    pub async fn resolve_a(&self, query_name: &str) -> Option<Ipv4Addr> {
        let label = query_name.split('.').next()?;
        let identity = Identity::parse(label).ok()?;

        match self.store.check(&identity).await {
            Ok(BindingStatus::Registered { address }) => match address.trim().parse() {
                Ok(ip) => Some(ip),
                Err(_) => {
                    // A binding that is not an IPv4 address cannot back an A
                    // record; treat it as absent rather than erroring.
                    warn!(identity = %identity, address, "binding is not an IPv4 address");
                    None
                }
            },
            Ok(_) => None,
            Err(e) => {
                // Store trouble never reaches DNS clients.
                warn!(identity = %identity, error = %e, "binding lookup failed");
                None
            }
        }
    }
}

#[async_trait::async_trait]
impl RequestHandler for NameResolver {
    async fn handle_request<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handle: R,
    ) -> ResponseInfo {
        let mut header = Header::response_from_request(request.header());
        header.set_authoritative(true);

        let info = match request.request_info() {
            Ok(info) => info,
            Err(e) => {
                debug!(error = %e, "unanswerable DNS request");
                header.set_response_code(ResponseCode::FormErr);
                let builder = MessageResponseBuilder::from_message_request(request);
                let response = builder.error_msg(&header, ResponseCode::FormErr);
                return match response_handle.send_response(response).await {
                    Ok(sent) => sent,
                    Err(_) => header.into(),
                };
            }
        };

        let query_name = info.query.name().to_string();
        let mut answers = Vec::new();
        if info.query.query_type() == RecordType::A {
            if let Some(ip) = self.resolve_a(&query_name).await {
                let name = Name::from(info.query.name().clone());
                answers.push(Record::from_rdata(
                    name,
                    self.answer_ttl,
                    RData::A(A::from(ip)),
                ));
                debug!(name = %query_name, %ip, "answered identity query");
            }
        }

        let builder = MessageResponseBuilder::from_message_request(request);
        let response = builder.build(header, answers.iter(), &[], &[], &[]);
        match response_handle.send_response(response).await {
            Ok(sent) => sent,
            Err(e) => {
                warn!(error = %e, "failed to send DNS response");
                header.set_response_code(ResponseCode::ServFail);
                header.into()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::SigilKeypair;
    use crate::store::FileStore;
    use std::time::{Duration, SystemTime};

    fn setup() -> (tempfile::TempDir, Arc<FileStore>, NameResolver) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileStore::open(dir.path(), Duration::from_secs(3600)).unwrap());
        let resolver = NameResolver::new(store.clone() as Arc<dyn BindingStore>);
        (dir, store, resolver)
    }

    fn test_identity() -> Identity {
        Identity::derive(&SigilKeypair::generate().public_key()).unwrap()
    }

    #[tokio::test]
    async fn fresh_binding_resolves() {
        let (_dir, store, resolver) = setup();
        let id = test_identity();
        store.update(&id, "203.0.113.9").await.unwrap();

        let ip = resolver.resolve_a(&format!("{id}.sigil.test.")).await;
        assert_eq!(ip, Some("203.0.113.9".parse().unwrap()));
    }

    #[tokio::test]
    async fn unknown_identity_resolves_to_nothing() {
        let (_dir, _store, resolver) = setup();
        let id = test_identity();
        assert_eq!(resolver.resolve_a(&format!("{id}.sigil.test.")).await, None);
    }

    #[tokio::test]
    async fn non_identity_labels_are_ignored() {
        let (_dir, store, resolver) = setup();
        let id = test_identity();
        store.update(&id, "203.0.113.9").await.unwrap();

        assert_eq!(resolver.resolve_a("www.sigil.test.").await, None);
        assert_eq!(resolver.resolve_a("sigil.test.").await, None);
        // Uppercase hex is not an identity.
        let upper = id.as_str().to_uppercase();
        assert_eq!(resolver.resolve_a(&format!("{upper}.sigil.test.")).await, None);
    }

    #[tokio::test]
    async fn expired_binding_resolves_to_nothing() {
        let (_dir, store, resolver) = setup();
        let id = test_identity();
        store.update(&id, "203.0.113.9").await.unwrap();

        // Backdate past the TTL; the file remains but the name must not resolve.
        let path = _dir.path().join("data").join(id.as_str());
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(4000))
            .unwrap();

        assert_eq!(resolver.resolve_a(&format!("{id}.sigil.test.")).await, None);
    }

    #[tokio::test]
    async fn revoked_identity_resolves_to_nothing() {
        let (_dir, store, resolver) = setup();
        let id = test_identity();
        store.update(&id, "203.0.113.9").await.unwrap();
        store.revoke(&id).await.unwrap();

        assert_eq!(resolver.resolve_a(&format!("{id}.sigil.test.")).await, None);
    }

    #[tokio::test]
    async fn non_ipv4_binding_resolves_to_nothing() {
        let (_dir, store, resolver) = setup();
        let id = test_identity();
        store.update(&id, "2001:db8::1").await.unwrap();

        assert_eq!(resolver.resolve_a(&format!("{id}.sigil.test.")).await, None);
    }
}
