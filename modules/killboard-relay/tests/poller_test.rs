//! Delta poller behaviour against in-memory feeds.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use killboard_common::{EventKey, EventKind, Normalizer};
use killboard_relay::poller::{DeltaPoller, PollerSettings};
use killboard_relay::testing::{death_record, kill_record, MemorySource, RecordingSink};

fn poller(source: &Arc<MemorySource>, sink: &Arc<RecordingSink>) -> DeltaPoller {
    DeltaPoller::new(
        source.clone(),
        sink.clone(),
        Normalizer::default(),
        PollerSettings::default(),
    )
}

fn ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
}

fn kill_cursor(p: &DeltaPoller) -> Option<EventKey> {
    p.cursor(EventKind::Kill).position().cloned()
}

#[tokio::test]
async fn duplicate_in_one_batch_is_delivered_once() {
    let source = Arc::new(MemorySource::new().ignoring_since());
    let sink = Arc::new(RecordingSink::new());
    let mut p = poller(&source, &sink);
    p.prime().await;

    source.push(EventKind::Kill, kill_record(1, "A", "B", "2024-05-01T12:00:00Z"));
    source.push(EventKind::Kill, kill_record(2, "A", "C", "2024-05-01T12:00:01Z"));
    source.push(EventKind::Kill, kill_record(1, "A", "B", "2024-05-01T12:00:00Z"));

    let stats = p.tick().await;
    assert_eq!(stats.kills.delivered, 2);
    assert_eq!(stats.kills.duplicates, 1);
    assert_eq!(sink.titles(), vec!["A ➔ B", "A ➔ C"]);
    assert_eq!(kill_cursor(&p), Some(EventKey::Id(2)));

    let stats = p.tick().await;
    assert_eq!(stats.kills.delivered, 0);
    assert_eq!(stats.kills.duplicates, 3);
    assert_eq!(sink.len(), 2);
}

#[tokio::test]
async fn priming_skips_existing_history() {
    let source = Arc::new(
        MemorySource::new().with_records(
            EventKind::Kill,
            vec![
                kill_record(3, "A", "B", "2024-05-01T12:00:03Z"),
                kill_record(1, "A", "B", "2024-05-01T12:00:01Z"),
                kill_record(2, "A", "B", "2024-05-01T12:00:02Z"),
            ],
        ),
    );
    let sink = Arc::new(RecordingSink::new());
    let mut p = poller(&source, &sink);

    let primed = p.prime().await;
    assert!(primed.kills.primed);
    assert_eq!(kill_cursor(&p), Some(EventKey::Id(3)));

    p.tick().await;
    assert!(sink.is_empty());

    source.push(EventKind::Kill, kill_record(4, "D", "E", "2024-05-01T12:00:04Z"));
    let stats = p.tick().await;
    assert_eq!(stats.kills.delivered, 1);
    assert_eq!(sink.titles(), vec!["D ➔ E"]);
    // The range query carries the cursor.
    assert!(source.calls().contains(&(EventKind::Kill, Some(EventKey::Id(3)))));
}

#[tokio::test]
async fn failed_priming_is_retried_on_next_tick() {
    let source = Arc::new(
        MemorySource::new().with_records(EventKind::Kill, vec![kill_record(9, "A", "B", "2024-05-01T12:00:00Z")]),
    );
    source.fail_next(EventKind::Kill, 1);
    let sink = Arc::new(RecordingSink::new());
    let mut p = poller(&source, &sink);

    let primed = p.prime().await;
    assert!(primed.kills.fetch_failed);
    assert!(!p.cursor(EventKind::Kill).is_primed());

    let stats = p.tick().await;
    assert!(stats.kills.primed);
    assert_eq!(kill_cursor(&p), Some(EventKey::Id(9)));
    assert!(sink.is_empty());
}

#[tokio::test]
async fn sink_failure_holds_cursor_then_delivers_exactly_once() {
    let source = Arc::new(MemorySource::new());
    let sink = Arc::new(RecordingSink::new());
    let mut p = poller(&source, &sink);
    p.prime().await;

    source.push(EventKind::Kill, kill_record(1, "A", "B", "2024-05-01T12:00:00Z"));
    source.push(EventKind::Kill, kill_record(2, "A", "C", "2024-05-01T12:00:01Z"));
    sink.fail_next(1);

    let stats = p.tick().await;
    assert!(stats.kills.delivery_failed);
    assert_eq!(stats.kills.delivered, 0);
    assert_eq!(kill_cursor(&p), None);

    let stats = p.tick().await;
    assert_eq!(stats.kills.delivered, 2);
    assert_eq!(kill_cursor(&p), Some(EventKey::Id(2)));

    p.tick().await;
    assert_eq!(sink.titles(), vec!["A ➔ B", "A ➔ C"]);
}

#[tokio::test]
async fn fetch_failure_skips_tick_without_moving_cursor() {
    let source = Arc::new(MemorySource::new());
    let sink = Arc::new(RecordingSink::new());
    let mut p = poller(&source, &sink);
    p.prime().await;

    source.push(EventKind::Kill, kill_record(1, "A", "B", "2024-05-01T12:00:00Z"));
    source.fail_next(EventKind::Kill, 1);

    let stats = p.tick().await;
    assert!(stats.kills.fetch_failed);
    assert!(!stats.deaths.fetch_failed);
    assert_eq!(kill_cursor(&p), None);

    p.tick().await;
    assert_eq!(sink.len(), 1);
}

#[tokio::test]
async fn excluded_subjects_are_seen_but_not_delivered() {
    let source = Arc::new(MemorySource::new());
    let sink = Arc::new(RecordingSink::new());
    let mut p = poller(&source, &sink);
    p.prime().await;

    source.push(EventKind::Kill, kill_record(1, "A", "NPC_Guard_01", "2024-05-01T12:00:00Z"));
    source.push(EventKind::Kill, kill_record(2, "A", "B", "2024-05-01T12:00:01Z"));
    source.push(EventKind::Kill, kill_record(3, "A", "PU_Pilot", "2024-05-01T12:00:02Z"));

    let stats = p.tick().await;
    assert_eq!(stats.kills.delivered, 1);
    assert_eq!(stats.kills.excluded, 2);
    assert_eq!(sink.titles(), vec!["A ➔ B"]);
    assert_eq!(kill_cursor(&p), Some(EventKey::Id(3)));
}

#[tokio::test]
async fn malformed_record_is_retried_then_stepped_over() {
    let source = Arc::new(MemorySource::new());
    let sink = Arc::new(RecordingSink::new());
    let mut p = poller(&source, &sink);
    p.prime().await;

    source.push(EventKind::Kill, kill_record(1, "A", "B", "2024-05-01T12:00:00Z"));
    source.push(EventKind::Kill, kill_record(2, "A", "C", "not a time"));
    source.push(EventKind::Kill, kill_record(3, "A", "D", "2024-05-01T12:00:02Z"));

    // Default cap is three attempts.
    let first = p.tick().await;
    assert_eq!(first.kills.delivered, 1);
    assert_eq!(first.kills.malformed, 1);
    assert_eq!(kill_cursor(&p), Some(EventKey::Id(1)));

    let second = p.tick().await;
    assert_eq!(second.kills.delivered, 0);
    assert_eq!(kill_cursor(&p), Some(EventKey::Id(1)));

    let third = p.tick().await;
    assert_eq!(third.kills.delivered, 1);
    assert_eq!(kill_cursor(&p), Some(EventKey::Id(3)));
    assert_eq!(sink.titles(), vec!["A ➔ B", "A ➔ D"]);
}

#[tokio::test]
async fn records_without_key_are_dropped() {
    let source = Arc::new(MemorySource::new());
    let sink = Arc::new(RecordingSink::new());
    let mut p = poller(&source, &sink);
    p.prime().await;

    source.push(
        EventKind::Kill,
        serde_json::json!({"player": "A", "victim": "B", "time": "2024-05-01T12:00:00Z"}),
    );
    source.push(EventKind::Kill, kill_record(5, "A", "C", "2024-05-01T12:00:01Z"));

    let stats = p.tick().await;
    assert_eq!(stats.kills.malformed, 1);
    assert_eq!(stats.kills.delivered, 1);
    assert_eq!(kill_cursor(&p), Some(EventKey::Id(5)));
}

#[tokio::test]
async fn deaths_are_keyed_and_ordered_by_time() {
    let source = Arc::new(MemorySource::new().ignoring_since());
    let sink = Arc::new(RecordingSink::new());
    let mut p = poller(&source, &sink);
    p.prime().await;

    source.push(EventKind::Death, death_record("X", "Me", "2024-05-01T12:00:05Z", "Bullet"));
    source.push(EventKind::Death, death_record("Y", "Me", "2024-05-01T08:00:01-04:00", "Bullet"));
    source.push(EventKind::Death, death_record("Me", "Me", "2024-05-01T12:00:09", "Suicide"));

    let stats = p.tick().await;
    assert_eq!(stats.deaths.delivered, 3);
    assert_eq!(
        sink.titles(),
        vec![
            "Me was killed by Y",
            "Me was killed by X",
            "Me died by their own hand",
        ]
    );
    assert!(sink.messages().iter().all(|m| m.channel == "deaths"));
    assert_eq!(
        p.cursor(EventKind::Death).position(),
        Some(&EventKey::death(ts("2024-05-01T12:00:09Z"), "Me", "Me"))
    );

    let stats = p.tick().await;
    assert_eq!(stats.deaths.delivered, 0);
    assert_eq!(stats.deaths.duplicates, 3);
}

#[tokio::test]
async fn simultaneous_deaths_are_all_delivered() {
    let source = Arc::new(MemorySource::new().ignoring_since());
    let sink = Arc::new(RecordingSink::new());
    let mut p = poller(&source, &sink);
    p.prime().await;

    // One explosion, two victims, same timestamp.
    source.push(EventKind::Death, death_record("X", "Me", "2024-05-01T12:00:05Z", "Explosion"));
    source.push(EventKind::Death, death_record("X", "Buddy", "2024-05-01T12:00:05Z", "Explosion"));

    let stats = p.tick().await;
    assert_eq!(stats.deaths.delivered, 2);
    assert_eq!(stats.deaths.duplicates, 0);
    assert_eq!(sink.titles(), vec!["Buddy was killed by X", "Me was killed by X"]);

    let stats = p.tick().await;
    assert_eq!(stats.deaths.delivered, 0);
    assert_eq!(stats.deaths.duplicates, 2);
}

#[tokio::test]
async fn cursor_never_decreases_and_deliveries_are_increasing() {
    let source = Arc::new(MemorySource::new().ignoring_since());
    let sink = Arc::new(RecordingSink::new());
    let mut p = poller(&source, &sink);
    p.prime().await;

    // Late arrivals with lower ids than the cursor must not be delivered.
    let batches: [&[i64]; 4] = [&[3, 1], &[2, 5], &[4], &[8, 6, 7]];
    let mut last = kill_cursor(&p);
    for batch in batches {
        for id in batch {
            source.push(EventKind::Kill, kill_record(*id, "A", &format!("V{id}"), "2024-05-01T12:00:00Z"));
        }
        p.tick().await;
        let now = kill_cursor(&p);
        assert!(now >= last);
        last = now;
    }

    let delivered: Vec<String> = sink.titles();
    assert_eq!(delivered, vec!["A ➔ V1", "A ➔ V3", "A ➔ V5", "A ➔ V6", "A ➔ V7", "A ➔ V8"]);
}

#[tokio::test]
async fn run_delivers_until_shutdown() {
    let source = Arc::new(MemorySource::new());
    let sink = Arc::new(RecordingSink::new());
    let settings = PollerSettings {
        interval: Duration::from_millis(10),
        ..PollerSettings::default()
    };
    let mut p = DeltaPoller::new(source.clone(), sink.clone(), Normalizer::default(), settings);
    p.prime().await;

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(p.run(rx));

    source.push(EventKind::Kill, kill_record(1, "A", "B", "2024-05-01T12:00:00Z"));
    for _ in 0..200 {
        if !sink.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(sink.len(), 1);

    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("poller did not stop")
        .unwrap();
}
