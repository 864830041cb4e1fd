//! Drops matches past the retention horizon together with their receipts.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use metrics::counter;

use crate::store::Store;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub matches: usize,
    pub receipts: usize,
}

/// Delete matches with `start_time_utc < now - retention_days`, then orphaned receipts.
/// Both deletes run in one store transaction. A horizon reaching past the earliest
/// representable time prunes nothing.
pub fn prune(store: &Store, now: DateTime<Utc>, retention_days: u32) -> Result<PruneReport> {
    let cutoff = now
        .checked_sub_signed(Duration::days(i64::from(retention_days)))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    let (matches, receipts) = store.prune_before(cutoff)?;

    counter!("retention_pruned_matches_total").increment(matches as u64);
    counter!("retention_pruned_receipts_total").increment(receipts as u64);
    if matches > 0 || receipts > 0 {
        tracing::info!(target: "retention", matches, receipts, %cutoff, "pruned old data");
    }
    Ok(PruneReport { matches, receipts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Match;
    use chrono::TimeZone;

    #[test]
    fn thirty_day_horizon() {
        let store = Store::open_in_memory().unwrap();
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let stale = Match::new("A", "B", now - Duration::days(31), "ics", now);
        let recent = Match::new("C", "D", now - Duration::days(29), "ics", now);
        store.upsert_matches(&[stale.clone(), recent.clone()]).unwrap();
        store.record_receipt(&stale.id, "chan", now).unwrap();
        store.record_receipt(&recent.id, "chan", now).unwrap();

        let report = prune(&store, now, 30).unwrap();
        assert_eq!(report, PruneReport { matches: 1, receipts: 1 });
        assert!(store.get_match(&stale.id).unwrap().is_none());
        assert!(!store.is_notified(&stale.id, "chan").unwrap());
        assert!(store.get_match(&recent.id).unwrap().is_some());
        assert!(store.is_notified(&recent.id, "chan").unwrap());

        // Nothing left to do on a second run.
        assert_eq!(prune(&store, now, 30).unwrap(), PruneReport::default());
    }

    #[test]
    fn huge_horizon_keeps_everything() {
        let store = Store::open_in_memory().unwrap();
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let old = Match::new("A", "B", now - Duration::days(3650), "ics", now);
        store.upsert_match(&old).unwrap();

        assert_eq!(prune(&store, now, u32::MAX).unwrap(), PruneReport::default());
        assert!(store.get_match(&old.id).unwrap().is_some());
    }
}
