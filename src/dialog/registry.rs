use super::dialog::Dialog;
use crate::{sip, Error, Result};
use rsip::Request;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::RwLock;
use tracing::{debug, info};

/// The dialog key: the Contact's `+sip.instance` urn when the client
/// sends one, otherwise the Contact uri itself. The urn is preferred
/// because it survives port remapping and spans call-ids.
pub fn derive_key(req: &Request) -> Result<String> {
    match sip::instance_id(req)? {
        Some(urn) => Ok(urn),
        None => sip::contact_uri(req),
    }
}

/// All live dialogs, indexed by dialog key.
///
/// The lock is held only across map access; dialog handlers run on a
/// cloned handle with the lock released. Cardinality is one peer in
/// practice, so the call-id fallback is a plain scan.
pub struct DialogRegistry {
    dialogs: RwLock<HashMap<String, Dialog>>,
}

impl Default for DialogRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DialogRegistry {
    pub fn new() -> Self {
        DialogRegistry {
            dialogs: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<Dialog> {
        self.dialogs.read().unwrap().get(key).cloned()
    }

    /// Find the dialog a request belongs to. Requests without a usable
    /// Contact (ACK, BYE and CANCEL from most clients) fall back to the
    /// call-id: first the call-id of the latest REGISTER, then any
    /// call-id previously seen on the dialog.
    pub fn lookup(&self, req: &Request) -> Result<Option<Dialog>> {
        match derive_key(req) {
            Ok(key) => Ok(self.get(&key)),
            Err(Error::MissingContact) | Err(Error::MissingKey) => {
                let call_id = sip::call_id_of(req)?;
                let dialogs = self.dialogs.read().unwrap();
                for dialog in dialogs.values() {
                    if dialog.register_call_id().as_deref() == Some(call_id.as_str())
                        || dialog.knows_call_id(&call_id)
                    {
                        return Ok(Some(dialog.clone()));
                    }
                }
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Insert a new dialog for the request's key. The caller is expected
    /// to have looked the key up first; a bound key is an error.
    pub fn create(&self, req: &Request, remote_addr: SocketAddr) -> Result<Dialog> {
        let key = derive_key(req)?;
        let mut dialogs = self.dialogs.write().unwrap();
        if dialogs.contains_key(&key) {
            return Err(Error::DialogExists(key));
        }
        let dialog = Dialog::new(key.clone(), remote_addr)?;
        debug!(key = %key, addr = %remote_addr, "added dialog");
        dialogs.insert(key, dialog.clone());
        Ok(dialog)
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        let mut dialogs = self.dialogs.write().unwrap();
        if dialogs.remove(key).is_none() {
            return Err(Error::DialogNotFound);
        }
        Ok(())
    }

    /// Tear a dialog down on unregister: cancel its work, then drop it
    /// from the map.
    pub fn close(&self, req: &Request) -> Result<()> {
        let dialog = self.lookup(req)?.ok_or(Error::DialogNotFound)?;
        dialog.close();
        self.remove(dialog.key())?;
        info!(key = %dialog.key(), remaining = self.len(), "removed dialog");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.dialogs.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One line per dialog, for the post-message diagnostic dump.
    pub fn render(&self) -> String {
        let dialogs = self.dialogs.read().unwrap();
        if dialogs.is_empty() {
            return "no dialogs".to_string();
        }
        dialogs
            .values()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
