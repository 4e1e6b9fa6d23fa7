//! Lazy series-template cache (spec §4.3 `template(series)`). Grounded on
//! `dekaf::spec_cache::SpecCache`'s `Mutex<HashMap<..>>` cache shape, minus
//! the TTL/pruning: spec §4.3 says cached templates are never freed
//! mid-session, so there's nothing to expire.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use drms_types::series::ArchiveFlag;
use drms_types::SeriesTemplate;

use crate::error::Result;
use crate::sql_channel::SqlChannel;

pub struct SeriesCache {
    store: Mutex<HashMap<String, Arc<SeriesTemplate>>>,
}

impl SeriesCache {
    pub fn new() -> Self {
        Self {
            store: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached template, populating it on miss via three
    /// separate catalog queries (spec §4.3): header, then segments+links,
    /// then keywords.
    #[tracing::instrument(skip(self, channel))]
    pub async fn template(
        &self,
        channel: &dyn SqlChannel,
        series: &str,
    ) -> Result<Arc<SeriesTemplate>> {
        if let Some(hit) = self.store.lock().unwrap().get(series) {
            tracing::debug!(series, "series cache hit");
            return Ok(hit.clone());
        }
        tracing::debug!(series, "series cache miss");

        let header = channel.fetch_series_header(series).await?;
        let segments = channel.fetch_segments(series).await?;
        let links = channel.fetch_links(series).await?;
        let keywords = channel.fetch_keywords(series).await?;

        let (archive, warn) = ArchiveFlag::from_raw(header.archive_raw);
        if warn {
            tracing::warn!(series, raw = header.archive_raw, "archive flag out of range, clamped to off");
        }

        let template = Arc::new(SeriesTemplate {
            name: header.name,
            description: header.description,
            author: header.author,
            owner: header.owner,
            unitsize: header.unitsize,
            archive,
            tapegroup: header.tapegroup,
            retention_days: header.retention_days,
            prime_keys_external: header.prime_keys_external,
            prime_keys_internal: header.prime_keys_internal,
            db_index: header.db_index,
            keywords: keywords.into_iter().map(|k| (k.name.clone(), k)).collect::<BTreeMap<_, _>>(),
            links: links.into_iter().map(|l| (l.name.clone(), l)).collect::<BTreeMap<_, _>>(),
            segments: segments.into_iter().map(|s| (s.name.clone(), s)).collect::<BTreeMap<_, _>>(),
        });

        self.store.lock().unwrap().insert(series.to_string(), template.clone());
        Ok(template)
    }
}

impl Default for SeriesCache {
    fn default() -> Self {
        Self::new()
    }
}
