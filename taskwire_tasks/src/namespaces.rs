use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::codec::Codec;
use crate::router::Router;
use crate::transport::Transport;

/// What a namespace has been told about itself so far: its codec, its
/// transport, and the router that owns its task table. Each is set
/// independently and late — a namespace may have tasks registered against its
/// router well before a transport is wired up for it.
#[derive(Default, Clone)]
struct NamespaceRecord {
    codec: Option<Arc<dyn Codec>>,
    transport: Option<Arc<dyn Transport>>,
    router: Option<Arc<Router>>,
}

fn table() -> &'static DashMap<String, NamespaceRecord> {
    static TABLE: OnceLock<DashMap<String, NamespaceRecord>> = OnceLock::new();
    TABLE.get_or_init(DashMap::new)
}

/// A process-wide facade over every namespace's [`Router`], [`Codec`], and
/// [`Transport`], mirroring the singleton-registry role the original Python
/// `Manager` played at module scope.
///
/// There is deliberately no way to construct this type — its functions all
/// operate on a single global table, analogous to [`taskwire_runtime::AppContext`]'s
/// `OnceLock`-backed facade.
pub struct Namespaces;

impl Namespaces {
    /// Returns the [`Router`] for `namespace`, creating one in *unite* mode
    /// `unite` if this is the first time this namespace has been touched.
    /// Subsequent calls, regardless of `unite`, return the same router.
    pub fn router(namespace: &str, unite: bool) -> Arc<Router> {
        match table().entry(namespace.to_string()) {
            Entry::Occupied(mut entry) => {
                let record = entry.get_mut();
                if let Some(router) = &record.router {
                    Arc::clone(router)
                } else {
                    let router = Arc::new(Router::new(namespace, unite));
                    record.router = Some(Arc::clone(&router));
                    router
                }
            }
            Entry::Vacant(entry) => {
                let router = Arc::new(Router::new(namespace, unite));
                entry.insert(NamespaceRecord {
                    router: Some(Arc::clone(&router)),
                    ..Default::default()
                });
                router
            }
        }
    }

    /// Sets the [`Codec`] a namespace uses to encode and decode payloads.
    pub fn set_codec(namespace: &str, codec: Arc<dyn Codec>) {
        table()
            .entry(namespace.to_string())
            .or_default()
            .codec = Some(codec);
    }

    /// Sets the [`Transport`] a namespace sends and receives requests through.
    pub fn set_transport(namespace: &str, transport: Arc<dyn Transport>) {
        table()
            .entry(namespace.to_string())
            .or_default()
            .transport = Some(transport);
    }

    /// Returns the codec configured for `namespace`, if any.
    pub fn codec(namespace: &str) -> Option<Arc<dyn Codec>> {
        table().get(namespace).and_then(|record| record.codec.clone())
    }

    /// Returns the transport configured for `namespace`, if any.
    pub fn transport(namespace: &str) -> Option<Arc<dyn Transport>> {
        table().get(namespace).and_then(|record| record.transport.clone())
    }

    /// Activates `namespace`'s router against its configured codec and
    /// transport. Both must have been set via [`Namespaces::set_codec`] and
    /// [`Namespaces::set_transport`] first.
    pub async fn activate(namespace: &str, unite: bool) -> Result<(), crate::error::TransportError> {
        let router = Self::router(namespace, unite);
        let codec = Self::codec(namespace).unwrap_or_else(|| Arc::new(crate::codec::JsonCodec));
        let transport = Self::transport(namespace).ok_or(crate::error::TransportError::NotConnected)?;

        router.activate(codec, transport).await
    }

    /// Removes every trace of a namespace from the table. Used by tests that
    /// need a clean slate; production code has no reason to call this since
    /// namespaces live for the lifetime of the process.
    #[cfg(test)]
    pub(crate) fn reset(namespace: &str) {
        table().remove(namespace);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use crate::loopback::LoopbackTransport;
    use pretty_assertions::assert_eq;

    #[test]
    fn router_is_memoized_per_namespace() {
        Namespaces::reset("ns-memo");

        let first = Namespaces::router("ns-memo", false);
        let second = Namespaces::router("ns-memo", true);

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn activate_wires_configured_codec_and_transport() {
        Namespaces::reset("ns-activate");
        Namespaces::set_codec("ns-activate", Arc::new(JsonCodec));
        Namespaces::set_transport("ns-activate", Arc::new(LoopbackTransport::new()));

        let result = Namespaces::activate("ns-activate", false).await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn activate_fails_without_a_transport() {
        Namespaces::reset("ns-no-transport");

        let result = Namespaces::activate("ns-no-transport", false).await;

        assert!(result.is_err());
    }
}
