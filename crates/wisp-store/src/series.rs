//! On-disk series codec and slot-level operations.
//!
//! A metric's backing file is a small magic header followed by a
//! postcard-encoded [`SeriesSlice`]. The format is opaque to everything
//! above this module; peers exchange whole files as raw bytes.
//!
//! Slot-level rules:
//! - **merge** (backfill) writes a value into a slot only if that slot is
//!   currently a gap; it never overwrites a populated slot.
//! - **apply** (direct timeseries write) overwrites populated slots with
//!   populated incoming values; incoming gaps leave existing data alone.

use bytes::Bytes;
use wisp_types::SeriesSlice;

use crate::error::StoreError;

/// Magic prefix identifying a Wisp series file.
pub const SERIES_MAGIC: [u8; 4] = *b"WSP1";

/// Maximum number of slots a series, or a merge of two series, may span.
///
/// A merge allocates the union of both ranges, so without a cap two small
/// slices at distant epochs could demand an allocation proportional to the
/// epoch gap. 2^23 slots covers years of one-second data.
pub const MAX_SERIES_SLOTS: u64 = 1 << 23;

/// Error describing why raw bytes failed to decode as a series file.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct SeriesDecodeError(String);

/// Encode a series for storage.
pub fn encode(slice: &SeriesSlice) -> Result<Bytes, StoreError> {
    validate(slice)?;
    let body = postcard::to_allocvec(slice)
        .map_err(|e| StoreError::validation(format!("series encode failed: {e}")))?;

    let mut out = Vec::with_capacity(SERIES_MAGIC.len() + body.len());
    out.extend_from_slice(&SERIES_MAGIC);
    out.extend_from_slice(&body);
    Ok(Bytes::from(out))
}

/// Decode raw series-file bytes.
///
/// The caller maps the error by context: bad client payloads become
/// validation errors, bad on-disk data becomes a corruption error.
pub fn decode(bytes: &[u8]) -> Result<SeriesSlice, SeriesDecodeError> {
    let body = bytes
        .strip_prefix(&SERIES_MAGIC[..])
        .ok_or_else(|| SeriesDecodeError("missing series magic".to_string()))?;

    let slice: SeriesSlice = postcard::from_bytes(body)
        .map_err(|e| SeriesDecodeError(format!("undecodable series body: {e}")))?;
    validate(&slice).map_err(|e| SeriesDecodeError(e.to_string()))?;
    Ok(slice)
}

/// Check that a slice is well-formed enough to store or merge.
///
/// Rejects a zero interval, more than [`MAX_SERIES_SLOTS`] slots, and a
/// range that does not fit in the epoch domain.
pub fn validate(slice: &SeriesSlice) -> Result<(), StoreError> {
    if slice.interval == 0 {
        return Err(StoreError::validation("series interval must be non-zero"));
    }
    if slice.values.len() as u64 > MAX_SERIES_SLOTS {
        return Err(StoreError::validation(format!(
            "series has {} slots, limit is {MAX_SERIES_SLOTS}",
            slice.values.len()
        )));
    }
    if slice.checked_end().is_none() {
        return Err(StoreError::validation(
            "series range overflows the epoch domain",
        ));
    }
    Ok(())
}

/// Non-destructive backfill merge.
///
/// The result spans the union of both ranges. Populated slots of
/// `existing` always survive; `incoming` contributes only to slots that
/// are gaps (or outside `existing`'s range).
pub fn merge(existing: &SeriesSlice, incoming: &SeriesSlice) -> Result<SeriesSlice, StoreError> {
    combine(existing, incoming, false)
}

/// Direct point write.
///
/// Like [`merge`] but populated `incoming` slots overwrite whatever the
/// existing series holds at that slot.
pub fn apply(existing: &SeriesSlice, incoming: &SeriesSlice) -> Result<SeriesSlice, StoreError> {
    combine(existing, incoming, true)
}

fn combine(
    existing: &SeriesSlice,
    incoming: &SeriesSlice,
    overwrite: bool,
) -> Result<SeriesSlice, StoreError> {
    validate(existing)?;
    validate(incoming)?;

    if existing.interval != incoming.interval {
        return Err(StoreError::validation(format!(
            "interval mismatch: {} vs {}",
            existing.interval, incoming.interval
        )));
    }
    let interval = existing.interval;
    if existing.epoch.abs_diff(incoming.epoch) % interval != 0 {
        return Err(StoreError::validation(
            "series epochs are not slot-aligned",
        ));
    }

    let start = existing.epoch.min(incoming.epoch);
    let end = match (existing.checked_end(), incoming.checked_end()) {
        (Some(a), Some(b)) => a.max(b),
        // validate has already rejected this.
        _ => {
            return Err(StoreError::validation(
                "series range overflows the epoch domain",
            ));
        }
    };
    let span = (end - start) / interval;
    if span > MAX_SERIES_SLOTS {
        return Err(StoreError::validation(format!(
            "merged range spans {span} slots, limit is {MAX_SERIES_SLOTS}"
        )));
    }
    let len = span as usize;

    let mut values = vec![None; len];
    let offset = ((existing.epoch - start) / interval) as usize;
    values[offset..offset + existing.values.len()].copy_from_slice(&existing.values);

    let offset = ((incoming.epoch - start) / interval) as usize;
    for (i, value) in incoming.values.iter().enumerate() {
        let slot = &mut values[offset + i];
        if value.is_some() && (overwrite || slot.is_none()) {
            *slot = *value;
        }
    }

    Ok(SeriesSlice::new(start, interval, values))
}

/// Slots with timestamps in `[from, until]`, inclusive on both ends.
///
/// Returns an empty slice (same stride) when the range does not intersect
/// the stored data. Gap markers inside the range are preserved.
pub fn slice_range(slice: &SeriesSlice, from: u64, until: u64) -> SeriesSlice {
    if slice.is_empty() || until < from || until < slice.epoch {
        return SeriesSlice::empty(slice.epoch, slice.interval);
    }

    let first = if from <= slice.epoch {
        0
    } else {
        // First slot at or after `from`.
        ((from - slice.epoch).div_ceil(slice.interval)) as usize
    };
    let last = ((until - slice.epoch) / slice.interval) as usize;

    if first >= slice.values.len() {
        return SeriesSlice::empty(slice.epoch, slice.interval);
    }
    let last = last.min(slice.values.len() - 1);
    if last < first {
        return SeriesSlice::empty(slice.epoch, slice.interval);
    }

    SeriesSlice::new(
        slice.slot_time(first),
        slice.interval,
        slice.values[first..=last].to_vec(),
    )
}
