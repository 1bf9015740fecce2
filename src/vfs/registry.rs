/*!
 * Name Registry
 * Maps local-socket names to endpoints
 *
 * Two instances exist per VFS: the abstract namespace and the logd
 * pathname namespace. Which one a caller consults is decided purely by how
 * the sockaddr_un was parsed; no filesystem is ever involved.
 */

use crate::core::errors::{SockResult, SocketError};
use crate::socket::Endpoint;
use ahash::RandomState;
use std::collections::HashMap;
use std::sync::Arc;

/// One name → endpoint namespace. Lives inside the VFS lock; the lifetime
/// of an entry is managed by the endpoint's last-reference hook, which
/// binds the name to `None`.
pub struct NameRegistry {
    label: &'static str,
    map: HashMap<Vec<u8>, Arc<Endpoint>, RandomState>,
}

impl NameRegistry {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            map: HashMap::with_hasher(RandomState::new()),
        }
    }

    /// Associate `name` with an endpoint, or clear the association when
    /// `endpoint` is `None`.
    pub fn bind(&mut self, name: &[u8], endpoint: Option<&Arc<Endpoint>>) -> SockResult<()> {
        match endpoint {
            None => {
                self.map.remove(name);
                Ok(())
            }
            Some(endpoint) => {
                if self.map.contains_key(name) {
                    return Err(SocketError::AddressInUse(
                        String::from_utf8_lossy(name).into_owned(),
                    ));
                }
                self.map.insert(name.to_vec(), Arc::clone(endpoint));
                log::debug!(
                    "{} registry bound {:?}",
                    self.label,
                    String::from_utf8_lossy(name)
                );
                Ok(())
            }
        }
    }

    pub fn lookup(&self, name: &[u8]) -> Option<Arc<Endpoint>> {
        self.map.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl std::fmt::Debug for NameRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NameRegistry")
            .field("label", &self.label)
            .field("bound", &self.map.len())
            .finish()
    }
}
