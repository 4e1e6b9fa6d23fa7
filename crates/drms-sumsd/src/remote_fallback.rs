//! Remote-site fallback (spec §4.8): before treating an empty `sudir` as
//! failure, check whether the sunum's site differs from the local site,
//! and if so ask an external resolver whether to retry.

use async_trait::async_trait;
use drms_types::storage_unit::{SiteKind, Sunum};

use crate::error::Result;

/// The resolver's verdict (spec §4.8): `0`/`1`/`-1` in the original,
/// modeled here as a plain enum rather than a magic int.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverVerdict {
    DontRetry,
    Retry,
    ResolverFailed,
}

/// `site_URL=series{sunum,sunum,...}` groupings (spec §4.8); kept as an
/// opaque trait since the resolver itself is an external service (spec §1
/// Non-goals: no new query language, no driver internals).
#[async_trait]
pub trait RemoteSiteResolver: Send + Sync {
    async fn resolve(&self, site_url: &str, series: &str, sunums: &[Sunum]) -> Result<ResolverVerdict>;
}

/// The decision spec §4.8 describes for one sunum whose `sudir` came back
/// empty. Returns `None` when no fallback applies (local site, or not the
/// first attempt) — callers treat the empty `sudir` as an ordinary
/// failure in that case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackOutcome {
    TryLater,
    RetryOnce,
    ResolverFailed,
}

/// Applies spec §4.8's gating: only first attempts at a remote sunum with
/// `retrieve == true` consult the resolver at all.
pub async fn resolve_empty_sudir(
    resolver: &dyn RemoteSiteResolver,
    site_url: &str,
    local_site: u16,
    series: &str,
    sunum: Sunum,
    retrieve: bool,
    first_attempt: bool,
) -> Result<Option<FallbackOutcome>> {
    if sunum.is_local(local_site) || !retrieve || !first_attempt {
        return Ok(None);
    }
    if sunum.site_kind().is_none() {
        return Ok(None);
    }

    Ok(Some(match resolver.resolve(site_url, series, &[sunum]).await? {
        ResolverVerdict::DontRetry => FallbackOutcome::TryLater,
        ResolverVerdict::Retry => FallbackOutcome::RetryOnce,
        ResolverVerdict::ResolverFailed => FallbackOutcome::ResolverFailed,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedResolver(ResolverVerdict);

    #[async_trait]
    impl RemoteSiteResolver for FixedResolver {
        async fn resolve(&self, _site_url: &str, _series: &str, _sunums: &[Sunum]) -> Result<ResolverVerdict> {
            Ok(self.0)
        }
    }

    #[tokio::test]
    async fn local_sunum_never_consults_resolver() {
        let resolver = FixedResolver(ResolverVerdict::Retry);
        let sunum = Sunum::new(5, 1);
        let outcome = resolve_empty_sudir(&resolver, "site", 5, "s.series", sunum, true, true)
            .await
            .unwrap();
        assert_eq!(outcome, None);
    }

    #[tokio::test]
    async fn remote_first_attempt_retrieve_consults_resolver() {
        let resolver = FixedResolver(ResolverVerdict::Retry);
        let sunum = Sunum::new(9, 1);
        let outcome = resolve_empty_sudir(&resolver, "site", 5, "s.series", sunum, true, true)
            .await
            .unwrap();
        assert_eq!(outcome, Some(FallbackOutcome::RetryOnce));
    }

    #[tokio::test]
    async fn non_first_attempt_skips_resolver() {
        let resolver = FixedResolver(ResolverVerdict::Retry);
        let sunum = Sunum::new(9, 1);
        let outcome = resolve_empty_sudir(&resolver, "site", 5, "s.series", sunum, true, false)
            .await
            .unwrap();
        assert_eq!(outcome, None);
    }
}
