//! Rendition resolution
//!
//! Turns one metadata query into the list of selectable quality variants:
//! formats with a usable height, labeled `"<height>p"`, one entry per label
//! (largest size wins) and ordered from the highest quality down.

use crate::error::{Error, Result};
use crate::fetcher::{MediaFetcher, MediaMetadata, parse_metadata_output};
use crate::types::Rendition;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Query the fetch tool once and list the renditions of `url`
///
/// # Errors
///
/// Propagates classification errors ([`Error::ContentRestricted`],
/// [`Error::ContentUnavailable`]) and generic metadata failures. An empty list
/// is a valid result.
pub async fn resolve_renditions(fetcher: &dyn MediaFetcher, url: &str) -> Result<Vec<Rendition>> {
    let output = fetcher.query_metadata(url).await?;
    let metadata = parse_metadata_output(&output)?;
    let renditions = renditions_from_metadata(&metadata);

    tracing::debug!(
        url,
        fetcher = fetcher.name(),
        count = renditions.len(),
        "resolved renditions"
    );

    Ok(renditions)
}

/// Build the deduplicated, sorted rendition list from a metadata document
pub fn renditions_from_metadata(metadata: &MediaMetadata) -> Vec<Rendition> {
    let candidates = metadata
        .candidate_formats()
        .into_iter()
        .filter_map(|format| {
            let height = format.usable_height()?;
            let format_identifier = format.format_id.clone().filter(|id| !id.is_empty())?;
            Some(Rendition {
                format_identifier,
                quality_label: format!("{height}p"),
                container_format: format
                    .ext
                    .clone()
                    .filter(|ext| !ext.is_empty())
                    .unwrap_or_else(|| "unknown".to_string()),
                size_bytes: format.best_size(),
            })
        })
        .collect();

    let mut renditions = dedupe_by_quality(candidates);
    sort_by_quality(&mut renditions);
    renditions
}

/// Keep one rendition per quality label, the one with the larger size
///
/// On equal sizes the earlier entry is kept. Output order follows the first
/// occurrence of each label.
pub fn dedupe_by_quality(renditions: Vec<Rendition>) -> Vec<Rendition> {
    let mut kept: Vec<Rendition> = Vec::with_capacity(renditions.len());
    let mut index_by_label: HashMap<String, usize> = HashMap::new();

    for rendition in renditions {
        match index_by_label.get(&rendition.quality_label) {
            Some(&idx) => {
                if rendition.size_bytes > kept[idx].size_bytes {
                    kept[idx] = rendition;
                }
            }
            None => {
                index_by_label.insert(rendition.quality_label.clone(), kept.len());
                kept.push(rendition);
            }
        }
    }

    kept
}

/// Sort by numeric quality, highest first; labels without a number go last
///
/// The sort is stable, so equal qualities keep their relative order.
pub fn sort_by_quality(renditions: &mut [Rendition]) {
    renditions.sort_by(|a, b| match (a.numeric_quality(), b.numeric_quality()) {
        (Some(qa), Some(qb)) => qb.cmp(&qa),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

/// Find the rendition with the given quality label
///
/// # Errors
///
/// Returns [`Error::RenditionNotFound`] listing the available labels.
pub fn select_rendition<'a>(renditions: &'a [Rendition], quality: &str) -> Result<&'a Rendition> {
    renditions
        .iter()
        .find(|r| r.quality_label == quality)
        .ok_or_else(|| Error::RenditionNotFound {
            quality: quality.to_string(),
            available: renditions.iter().map(|r| r.quality_label.clone()).collect(),
        })
}
