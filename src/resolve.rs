//! Timestamp resolution for a whole batch.
//!
//! Files with metadata keep their timestamp. Files without one are placed
//! between their nearest anchored neighbours in camera counter order, or next
//! to the only neighbour that exists. Anything left gets the fallback time.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime};
use rand::Rng;
use tracing::{debug, info};

use crate::config::{FallbackStrategy, ResolveConfig};
use crate::media::{Batch, MediaFile, Resolution, TimeSource};

/// Anchored point in a prefix group: (ordinal, timestamp).
type Anchor = (u64, NaiveDateTime);

/// Assign a timestamp to every file in the batch. Pure apart from `rng`,
/// which only feeds the one-sided jitter.
pub fn resolve<R: Rng + ?Sized>(mut batch: Batch, config: &ResolveConfig, rng: &mut R) -> Batch {
    let anchors = collect_anchors(batch.files());

    for file in batch.files_mut() {
        if file.resolution().is_some() {
            continue;
        }
        let resolution = match file.raw_timestamp {
            Some(timestamp) => Resolution {
                timestamp,
                source: TimeSource::Metadata,
            },
            None => match estimate(file, &anchors, config, rng) {
                Some(estimated) => estimated,
                None => {
                    debug!("{}: no anchored neighbour, using fallback", file.path().display());
                    fallback(file, config)
                }
            },
        };
        file.set_resolution(resolution);
    }

    let summary = batch.summary();
    info!(
        "Resolved {} files: {} from metadata, {} interpolated, {} extrapolated, {} fallback",
        batch.len(),
        summary.metadata,
        summary.interpolated,
        summary.extrapolated,
        summary.fallback
    );
    batch
}

/// Anchored files per prefix, sorted by (ordinal, timestamp).
fn collect_anchors(files: &[MediaFile]) -> BTreeMap<String, Vec<Anchor>> {
    let mut anchors: BTreeMap<String, Vec<Anchor>> = BTreeMap::new();
    for file in files {
        if let (Some(key), Some(ts)) = (&file.sequence_key, file.raw_timestamp) {
            anchors.entry(key.prefix.clone()).or_default().push((key.ordinal, ts));
        }
    }
    for group in anchors.values_mut() {
        group.sort_unstable();
    }
    anchors
}

fn estimate<R: Rng + ?Sized>(
    file: &MediaFile,
    anchors: &BTreeMap<String, Vec<Anchor>>,
    config: &ResolveConfig,
    rng: &mut R,
) -> Option<Resolution> {
    let key = file.sequence_key.as_ref()?;
    let group = anchors.get(&key.prefix)?;

    // An anchor with the same ordinal counts as both neighbours.
    let split = group.partition_point(|&(ordinal, _)| ordinal <= key.ordinal);
    let pred = split.checked_sub(1).map(|i| group[i]);
    let succ = group
        .get(group.partition_point(|&(ordinal, _)| ordinal < key.ordinal))
        .copied();

    let (timestamp, source) = match (pred, succ) {
        (Some(p), Some(s)) => (interpolate(p, s, key.ordinal), TimeSource::Interpolated),
        (Some((_, ts)), None) => (shift(ts, jitter(config, rng)), TimeSource::Extrapolated),
        (None, Some((_, ts))) => (shift(ts, -jitter(config, rng)), TimeSource::Extrapolated),
        (None, None) => return None,
    };
    debug!("{}: {:?} time {}", file.path().display(), source, timestamp);
    Some(Resolution { timestamp, source })
}

/// Linear interpolation by ordinal distance in whole seconds, floored.
fn interpolate(pred: Anchor, succ: Anchor, ordinal: u64) -> NaiveDateTime {
    let (pred_ordinal, pred_ts) = pred;
    let (succ_ordinal, succ_ts) = succ;
    if succ_ordinal == pred_ordinal {
        return pred_ts;
    }
    let span = i128::from(seconds(succ_ts)) - i128::from(seconds(pred_ts));
    let offset = (span * i128::from(ordinal - pred_ordinal))
        .div_euclid(i128::from(succ_ordinal - pred_ordinal));
    // |offset| <= |span|, so it fits back into i64
    let offset = i64::try_from(offset).unwrap_or(0);
    shift(pred_ts, offset)
}

fn jitter<R: Rng + ?Sized>(config: &ResolveConfig, rng: &mut R) -> i64 {
    i64::from(rng.gen_range(0..=config.max_jitter_seconds))
}

fn fallback(file: &MediaFile, config: &ResolveConfig) -> Resolution {
    let timestamp = match config.fallback {
        FallbackStrategy::FileModTime => file.modified.unwrap_or(config.fallback_epoch),
        FallbackStrategy::FixedEpoch => config.fallback_epoch,
    };
    Resolution {
        timestamp,
        source: TimeSource::Fallback,
    }
}

fn seconds(ts: NaiveDateTime) -> i64 {
    ts.and_utc().timestamp()
}

/// `ts` moved by `delta` seconds, dropping sub-second precision.
/// Saturates at the representable range.
fn shift(ts: NaiveDateTime, delta: i64) -> NaiveDateTime {
    let target = seconds(ts).saturating_add(delta);
    match DateTime::from_timestamp(target, 0) {
        Some(dt) => dt.naive_utc(),
        None if delta < 0 => NaiveDateTime::MIN,
        None => NaiveDateTime::MAX,
    }
}
