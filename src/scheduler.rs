use crate::service::OutreachService;
use chrono::{DateTime, Days, Local, NaiveTime, TimeZone};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Next instant strictly after `now` whose wall-clock time is `at`.
///
/// Days where `at` does not exist (a DST gap) are skipped.
pub fn next_daily_run<Tz: TimeZone>(now: &DateTime<Tz>, at: NaiveTime) -> DateTime<Tz> {
    let tz = now.timezone();
    let mut day = now.date_naive();
    loop {
        if let Some(candidate) = day.and_time(at).and_local_timezone(tz.clone()).earliest() {
            if candidate > *now {
                return candidate;
            }
        }
        day = match day.checked_add_days(Days::new(1)) {
            Some(next) => next,
            None => return now.clone(),
        };
    }
}

/// Start the background poll and daily report loops configured for
/// `service`. Disabled loops are not spawned.
pub fn spawn(service: Arc<OutreachService>) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    if let Some(period) = service.config().poll_interval() {
        log::info!("Polling for new leads every {}s", period.as_secs());
        handles.push(tokio::spawn(poll_loop(service.clone(), period)));
    }

    match service.config().daily_report_time() {
        Some(at) => {
            log::info!("Daily report scheduled at {}", at.format("%H:%M"));
            handles.push(tokio::spawn(report_loop(service.clone(), at)));
        }
        None => log::info!("Daily report disabled"),
    }

    handles
}

async fn poll_loop(service: Arc<OutreachService>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // first tick completes immediately
    interval.tick().await;

    loop {
        interval.tick().await;
        match service.poll_new_leads().await {
            Ok(summary) => log::debug!("Scheduled poll: {summary:?}"),
            Err(e) => log::error!("Scheduled poll failed: {e}"),
        }
    }
}

async fn report_loop(service: Arc<OutreachService>, at: NaiveTime) {
    loop {
        let now = Local::now();
        let next = next_daily_run(&now, at);
        let wait = (next - now).to_std().unwrap_or_default();
        log::debug!("Next daily report at {next}");
        tokio::time::sleep(wait).await;

        if let Err(e) = service.send_daily_report().await {
            log::error!("Scheduled daily report failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_later_today() {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 7, 30, 0).unwrap();
        let next = next_daily_run(&now, at(9, 0));
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap());
    }

    #[test]
    fn test_already_passed_rolls_to_tomorrow() {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap();
        let next = next_daily_run(&now, at(9, 0));
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 10, 17, 9, 0, 0).unwrap());

        let now = Utc.with_ymd_and_hms(2026, 12, 31, 23, 0, 0).unwrap();
        let next = next_daily_run(&now, at(9, 0));
        assert_eq!(next, Utc.with_ymd_and_hms(2027, 1, 1, 9, 0, 0).unwrap());
    }

    #[test]
    fn test_uses_local_wall_clock() {
        let ist = FixedOffset::east_opt(5 * 3600 + 1800).unwrap();
        let now = ist.with_ymd_and_hms(2026, 10, 16, 8, 0, 0).unwrap();
        let next = next_daily_run(&now, at(9, 0));
        assert_eq!(next.naive_local().time(), at(9, 0));
        assert_eq!((next - now).num_minutes(), 60);
    }
}
