//! LDAP directory client.
//!
//! Owns one long-lived directory session. State machine:
//! `Disconnected -> (connect + bind) -> Bound -> (search/modify)* `.
//! An operation that hits a dropped session falls back to `Disconnected`,
//! re-runs the connect/bind once, and re-attempts the operation once; a
//! second failure is fatal for that call. Not safe for concurrent use;
//! callers serialize access (the certificate repository holds the client
//! behind a mutex).

use std::collections::HashSet;
use std::time::Duration;

use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapError, Mod, Scope, SearchEntry};
use tracing::{debug, info, warn};

use crate::config::DirectoryConfig;
use crate::error::{Result, StoreError};

const LDAP_NO_SUCH_OBJECT: u32 = 32;
const LDAP_ALREADY_EXISTS: u32 = 68;

pub struct DirectoryClient {
    config: DirectoryConfig,
    session: Option<Ldap>,
}

impl DirectoryClient {
    pub fn new(config: DirectoryConfig) -> DirectoryClient {
        DirectoryClient {
            config,
            session: None,
        }
    }

    /// Connect and bind if disconnected; no-op when already bound.
    pub async fn ensure_connected(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }
        let settings = LdapConnSettings::new()
            .set_conn_timeout(Duration::from_secs(self.config.conn_timeout_secs));
        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &self.config.url)
            .await
            .map_err(|e| StoreError::connection(format!("{}: {e}", self.config.url)))?;
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "directory connection driver exited");
            }
        });
        ldap.with_timeout(self.op_timeout())
            .simple_bind(&self.config.bind_dn, &self.config.bind_password)
            .await
            .and_then(|r| r.success())
            .map_err(|e| StoreError::connection(format!("bind as {}: {e}", self.config.bind_dn)))?;
        info!(url = %self.config.url, bind_dn = %self.config.bind_dn, "directory session bound");
        self.session = Some(ldap);
        Ok(())
    }

    /// Gracefully unbind. Dropping the client without calling this still
    /// releases the session: the connection driver terminates as soon as the
    /// handle is dropped, on every exit path.
    pub async fn close(&mut self) {
        if let Some(mut ldap) = self.session.take() {
            let _ = ldap.unbind().await;
        }
    }

    pub async fn search(
        &mut self,
        base: &str,
        scope: Scope,
        filter: &str,
        attrs: &[&str],
    ) -> Result<Vec<SearchEntry>> {
        let attrs: Vec<String> = attrs.iter().map(|a| a.to_string()).collect();
        let entries = self
            .with_retry(|mut ldap, t| {
                let attrs = attrs.clone();
                async move {
                    let (entries, _res) = ldap
                        .with_timeout(t)
                        .search(base, scope, filter, attrs)
                        .await?
                        .success()?;
                    Ok(entries)
                }
            })
            .await
            .map_err(|e| map_ldap_err(e, base))?;
        debug!(base, filter, n = entries.len(), "directory search");
        Ok(entries.into_iter().map(SearchEntry::construct).collect())
    }

    pub async fn add(&mut self, dn: &str, attrs: Vec<(Vec<u8>, HashSet<Vec<u8>>)>) -> Result<()> {
        self.with_retry(|mut ldap, t| {
            let attrs = attrs.clone();
            async move {
                ldap.with_timeout(t).add(dn, attrs).await?.success()?;
                Ok(())
            }
        })
        .await
        .map_err(|e| map_ldap_err(e, dn))
    }

    pub async fn replace_attr(&mut self, dn: &str, attr: &[u8], values: Vec<Vec<u8>>) -> Result<()> {
        self.with_retry(|mut ldap, t| {
            let mods = vec![Mod::Replace(
                attr.to_vec(),
                values.iter().cloned().collect::<HashSet<_>>(),
            )];
            async move {
                ldap.with_timeout(t).modify(dn, mods).await?.success()?;
                Ok(())
            }
        })
        .await
        .map_err(|e| map_ldap_err(e, dn))
    }

    pub async fn delete(&mut self, dn: &str) -> Result<()> {
        self.with_retry(|mut ldap, t| async move {
            ldap.with_timeout(t).delete(dn).await?.success()?;
            Ok(())
        })
        .await
        .map_err(|e| map_ldap_err(e, dn))
    }

    fn op_timeout(&self) -> Duration {
        Duration::from_secs(self.config.op_timeout_secs)
    }

    fn bound_session(&self) -> std::result::Result<Ldap, LdapError> {
        // Ldap handles are cheap clones multiplexing one connection.
        self.session.as_ref().cloned().ok_or_else(|| {
            store_to_ldap_unavailable(StoreError::connection("directory session not established"))
        })
    }

    /// Run one operation against the bound session, reconnecting once if the
    /// session turns out to be gone. The second attempt's failure is final.
    async fn with_retry<T, F, Fut>(&mut self, mut op: F) -> std::result::Result<T, LdapError>
    where
        F: FnMut(Ldap, Duration) -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, LdapError>>,
    {
        let timeout = self.op_timeout();
        self.ensure_connected()
            .await
            .map_err(store_to_ldap_unavailable)?;
        match op(self.bound_session()?, timeout).await {
            Err(e) if is_session_error(&e) => {
                warn!(error = %e, "directory session dropped, reconnecting once");
                self.session = None;
                self.ensure_connected()
                    .await
                    .map_err(store_to_ldap_unavailable)?;
                op(self.bound_session()?, timeout).await
            }
            other => other,
        }
    }
}

/// A server-delivered result means the session is alive; anything else is
/// treated as a dropped/unusable session and triggers the single reconnect.
fn is_session_error(e: &LdapError) -> bool {
    !matches!(e, LdapError::LdapResult { .. } | LdapError::FilterParsing)
}

fn store_to_ldap_unavailable(e: StoreError) -> LdapError {
    LdapError::Io {
        source: std::io::Error::new(std::io::ErrorKind::NotConnected, e.to_string()),
    }
}

/// Map an LDAP failure onto the boundary error kinds. Result code 32
/// (noSuchObject) becomes the not-found kind so point reads can report
/// absence distinctly.
pub(crate) fn map_ldap_err(e: LdapError, target: &str) -> StoreError {
    match &e {
        LdapError::LdapResult { result } if result.rc == LDAP_NO_SUCH_OBJECT => {
            StoreError::not_found(format!("directory entry {target} does not exist"))
        }
        LdapError::LdapResult { result } if result.rc == LDAP_ALREADY_EXISTS => {
            StoreError::query(format!("entry already exists: {target}"))
        }
        LdapError::LdapResult { .. } | LdapError::FilterParsing => {
            StoreError::query(format!("{target}: {e}"))
        }
        _ => StoreError::connection(format!("{target}: {e}")),
    }
}

/// True when the failure was "entry already exists" (result code 68).
pub(crate) fn is_already_exists(e: &StoreError) -> bool {
    matches!(e, StoreError::Query(text) if text.starts_with("entry already exists:"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ldap3::LdapResult;

    fn ldap_result(rc: u32) -> LdapError {
        LdapError::LdapResult {
            result: LdapResult {
                rc,
                matched: String::new(),
                text: String::new(),
                refs: vec![],
                ctrls: vec![],
            },
        }
    }

    #[test]
    fn server_results_are_not_session_errors() {
        assert!(!is_session_error(&ldap_result(32)));
        assert!(!is_session_error(&LdapError::FilterParsing));
        assert!(is_session_error(&LdapError::EndOfStream));
    }

    #[test]
    fn no_such_object_maps_to_not_found() {
        let err = map_ldap_err(ldap_result(32), "cn=x,o=dsc,c=KR,dc=pkd");
        assert!(matches!(err, StoreError::NotFound(_)));

        let err = map_ldap_err(ldap_result(50), "cn=x");
        assert!(matches!(err, StoreError::Query(_)));

        let err = map_ldap_err(ldap_result(68), "cn=x");
        assert!(is_already_exists(&err));

        let err = map_ldap_err(LdapError::EndOfStream, "cn=x");
        assert!(matches!(err, StoreError::Connection(_)));
    }
}
