//! Link resolution (spec §4.4) and the link-keyword hop chase that backs
//! step 3 of the keyword lookup algorithm (spec §4.3). Grounded in
//! `drms_link.c`'s `drms_link_resolve`/`followall` loops, reworked as an
//! explicit `(record, keyword, depth)` state machine rather than
//! recursion — each hop is one iteration, guarded by
//! `drms_types::link::MAX_LINK_DEPTH`.

use std::sync::Arc;

use drms_types::link::{LinkDef, LinkKind, LinkValue, MAX_LINK_DEPTH};
use drms_types::record::Record;
use drms_types::{DrmsError, SeriesTemplate};

use crate::error::{ClientError, Result};
use crate::series_cache::SeriesCache;
use crate::sql_channel::SqlChannel;

pub struct LinkResolver<'a> {
    channel: &'a dyn SqlChannel,
    series_cache: &'a SeriesCache,
}

impl<'a> LinkResolver<'a> {
    pub fn new(channel: &'a dyn SqlChannel, series_cache: &'a SeriesCache) -> Self {
        Self { channel, series_cache }
    }

    /// Resolves one link hop on `record`: static links are a no-op lookup
    /// of the stored target; dynamic links issue the single catalog query
    /// of spec §4.4, returning every match ordered highest-recnum-first —
    /// `_followall` callers keep them all, others take the first.
    async fn resolve_one(&self, record: &Record, link_name: &str, link_def: &LinkDef) -> Result<Vec<i64>> {
        match record.links.get(link_name) {
            None => Err(ClientError::Drms(DrmsError::LinkNotSet(link_name.to_string()))),
            Some(LinkValue::Static(target)) => {
                if link_def.kind != LinkKind::Static {
                    return Err(ClientError::Drms(DrmsError::InvalidLinkType(link_name.to_string())));
                }
                Ok(vec![*target])
            }
            Some(LinkValue::Dynamic { pidx_values, follow_all, .. }) => {
                if link_def.kind != LinkKind::Dynamic {
                    return Err(ClientError::Drms(DrmsError::InvalidLinkType(link_name.to_string())));
                }
                let mut recnums = self
                    .channel
                    .resolve_dynamic_link(&link_def.target_series, pidx_values)
                    .await?;
                if !*follow_all {
                    recnums.truncate(1);
                }
                Ok(recnums)
            }
        }
    }

    /// Walks the link-keyword chain starting at `(template, record,
    /// keyword_name)` until it reaches a keyword that isn't a link
    /// proxy, returning the record and keyword name to read the value
    /// from. Bails with `LinkDepthExceeded` past `MAX_LINK_DEPTH` hops
    /// (spec §3 testable property 5).
    pub async fn follow_keyword(
        &self,
        mut template: Arc<SeriesTemplate>,
        mut record: Record,
        mut keyword_name: String,
    ) -> Result<(Record, String)> {
        let mut depth = 0usize;
        loop {
            let kw = template
                .keyword(&keyword_name)
                .ok_or_else(|| ClientError::Drms(DrmsError::UnknownKeyword(keyword_name.clone())))?;
            let Some(link_info) = kw.link_info.clone() else {
                return Ok((record, keyword_name));
            };

            depth += 1;
            if depth > MAX_LINK_DEPTH {
                return Err(ClientError::Drms(DrmsError::LinkDepthExceeded(MAX_LINK_DEPTH)));
            }

            let link_def = template
                .link(&link_info.link_name)
                .ok_or_else(|| ClientError::Drms(DrmsError::UnknownLink(link_info.link_name.clone())))?
                .clone();

            let recnums = self.resolve_one(&record, &link_info.link_name, &link_def).await?;
            let target_recnum = *recnums
                .first()
                .ok_or_else(|| ClientError::Drms(DrmsError::LinkNotSet(link_info.link_name.clone())))?;

            let target_template = self.series_cache.template(self.channel, &link_def.target_series).await?;
            record = self.channel.fetch_record(&target_template, target_recnum).await?;
            template = target_template;
            keyword_name = link_info.target_keyword;
        }
    }
}
