//! Date navigator: `(start_date, end_date)` → `(start_id, end_id)`.
//!
//! Sources with date-encoded IDs resolve instantly by arithmetic. Sequential
//! sources need a bounded binary search over a sparse, lookup-expensive
//! keyspace: probes go through the parser's lightweight `date_for`, tolerate
//! gaps by trying neighbor IDs, and give up rather than guess.

use chrono::{NaiveDate, NaiveDateTime};
use tracing::{debug, info, warn};

use crate::crawler::parser::{IdScheme, SiteParser};
use crate::crawler::transport::Transport;

/// Fixed back-off window for sequential sources when estimating bounds.
const SEQUENTIAL_SEARCH_RANGE: u64 = 1_000_000;

pub struct DateNavigator<'a, P: SiteParser> {
    parser: &'a P,
    transport: &'a Transport,
    pub max_search_iterations: u32,
    pub max_skip_attempts: u64,
    pub search_tolerance_days: i64,
}

impl<'a, P: SiteParser> DateNavigator<'a, P> {
    pub fn new(parser: &'a P, transport: &'a Transport) -> Self {
        Self {
            parser,
            transport,
            max_search_iterations: 50,
            max_skip_attempts: 10,
            search_tolerance_days: 1,
        }
    }

    /// Resolve the ID interval covering `[start_date, end_date]`.
    ///
    /// Date-encoded sources compute directly. Sequential sources binary
    /// search around `latest_id` (required in that case). Returns `None`
    /// when no valid interval is found; callers refuse the date-range
    /// request rather than sweep blindly.
    pub async fn find_id_range(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
        latest_id: Option<u64>,
    ) -> Option<(u64, u64)> {
        info!(
            source = self.parser.source_name(),
            %start_date,
            %end_date,
            "resolving ID range for date window"
        );

        if let IdScheme::DateEncoded { suffix_digits } = self.parser.id_scheme() {
            return Some(direct_range(start_date, end_date, suffix_digits));
        }

        let Some(latest_id) = latest_id else {
            warn!("latest_id is required for sequential-ID range estimation");
            return None;
        };

        let (lo, hi) = estimate_bounds(latest_id);

        debug!(lo, hi, "locating start date");
        let start_id = self.find_article_by_date(start_date, lo, hi).await?;
        debug!(lo, hi, "locating end date");
        let end_id = self.find_article_by_date(end_date, lo, hi).await?;

        let (start_id, end_id) = if start_id <= end_id {
            (start_id, end_id)
        } else {
            (end_id, start_id)
        };
        info!(start_id, end_id, "ID range resolved");
        Some((start_id, end_id))
    }

    /// Binary search for the ID closest to `target_date` within
    /// `[min_id, max_id]`. Returns the best match found, or `None` when no
    /// probe in the window produced a date.
    pub async fn find_article_by_date(
        &self,
        target_date: NaiveDate,
        min_id: u64,
        max_id: u64,
    ) -> Option<u64> {
        let target = target_date.and_hms_opt(0, 0, 0)?;
        let mut left = min_id;
        let mut right = max_id;
        let mut best: Option<(u64, i64)> = None;

        for iteration in 0..self.max_search_iterations {
            if left > right {
                break;
            }
            let mid = left + (right - left) / 2;

            let Some(mid_date) = self.probe_date(mid).await else {
                debug!(iteration, mid, "no valid date near probe, narrowing right half");
                if right - left <= 1 {
                    break;
                }
                left = mid + 1;
                continue;
            };

            let diff_secs = (mid_date - target).num_seconds();
            let abs_diff = diff_secs.abs();
            debug!(iteration, mid, %mid_date, diff_days = diff_secs / 86_400, "probe");

            if best.is_none_or(|(_, d)| abs_diff < d) {
                best = Some((mid, abs_diff));
            }

            if abs_diff <= self.search_tolerance_days * 86_400 {
                info!(id = mid, "probe within tolerance");
                return Some(mid);
            }

            if diff_secs > 0 {
                // Probe date is after the target: search the left half.
                match mid.checked_sub(1) {
                    Some(r) => right = r,
                    None => break,
                }
            } else {
                left = mid + 1;
            }
        }

        match best {
            Some((id, diff)) => {
                info!(id, diff_days = diff / 86_400, "binary search settled on best match");
                Some(id)
            }
            None => {
                warn!(min_id, max_id, "binary search found no valid article in range");
                None
            }
        }
    }

    /// Estimate the ID window for `target_date` from ≥2 sampled
    /// `(id, date)` points, assuming roughly linear ID growth. The window
    /// carries a ±3-day margin.
    pub async fn estimate_id_range(
        &self,
        sample_ids: &[u64],
        target_date: NaiveDate,
    ) -> Option<(u64, u64)> {
        if sample_ids.len() < 2 {
            warn!("need at least 2 sample IDs for estimation");
            return None;
        }

        let mut samples: Vec<(u64, NaiveDateTime)> = Vec::new();
        for &id in sample_ids {
            if let Some(date) = self.probe_date(id).await {
                samples.push((id, date));
            }
        }
        if samples.len() < 2 {
            warn!("not enough valid samples for estimation");
            return None;
        }
        samples.sort_by_key(|&(_, d)| d);

        let (first_id, first_date) = samples[0];
        let (last_id, last_date) = samples[samples.len() - 1];
        let span_secs = (last_date - first_date).num_seconds();
        if span_secs <= 0 {
            warn!("samples span no time, cannot estimate growth rate");
            return None;
        }
        let ids_per_sec = (last_id as f64 - first_id as f64) / span_secs as f64;

        let target = target_date.and_hms_opt(0, 0, 0)?;
        let (near_id, near_date) = samples
            .iter()
            .min_by_key(|(_, d)| (*d - target).num_seconds().abs())
            .copied()?;
        let offset = (target - near_date).num_seconds() as f64 * ids_per_sec;
        let estimated = (near_id as f64 + offset).max(1.0) as u64;

        let margin = (ids_per_sec * 86_400.0 * 3.0).abs() as u64;
        let lo = estimated.saturating_sub(margin).max(1);
        let hi = estimated.saturating_add(margin);
        info!(estimated, lo, hi, "estimated ID window from samples");
        Some((lo, hi))
    }

    /// Probe `date_for(id)`, tolerating gaps by fanning out to
    /// `±1, ±2, …, ±max_skip_attempts` neighbors.
    async fn probe_date(&self, article_id: u64) -> Option<NaiveDateTime> {
        if let Some(date) = self.parser.date_for(article_id, self.transport).await {
            return Some(date);
        }

        for offset in 1..=self.max_skip_attempts {
            if let Some(date) = self.parser.date_for(article_id + offset, self.transport).await {
                debug!(article_id, offset, "valid neighbor found above");
                return Some(date);
            }
            if let Some(lower) = article_id.checked_sub(offset) {
                if lower > 0 {
                    if let Some(date) = self.parser.date_for(lower, self.transport).await {
                        debug!(article_id, offset, "valid neighbor found below");
                        return Some(date);
                    }
                }
            }
        }
        debug!(article_id, tried = self.max_skip_attempts, "no valid article near ID");
        None
    }
}

/// Direct arithmetic for date-encoded IDs: the interval spans the first
/// suffix of `start_date` through the last suffix of `end_date`.
fn direct_range(start_date: NaiveDate, end_date: NaiveDate, suffix_digits: u8) -> (u64, u64) {
    let pow = 10u64.pow(suffix_digits as u32);
    let start_prefix: u64 = start_date
        .format("%Y%m%d")
        .to_string()
        .parse()
        .unwrap_or_default();
    let end_prefix: u64 = end_date
        .format("%Y%m%d")
        .to_string()
        .parse()
        .unwrap_or_default();
    let start_id = start_prefix * pow;
    let end_id = end_prefix * pow + (pow - 1);
    info!(start_id, end_id, suffix_digits, "direct ID range computed");
    (start_id, end_id)
}

/// Search bounds for sequential IDs: a fixed window back from the latest.
fn estimate_bounds(latest_id: u64) -> (u64, u64) {
    (latest_id.saturating_sub(SEQUENTIAL_SEARCH_RANGE), latest_id)
}
