//! Session behaviour against the in-memory transport.
//!
//! Run with: `cargo test --package lywsd02-core --test session`

use std::time::Duration;

use lywsd02_core::codec::encode_clock;
use lywsd02_core::{
    Error, ErrorKind, FixedUtcOffset, MockTransport, SensorSession, SessionConfig,
    UnitPreference, WriteMode, uuids,
};
use proptest::prelude::*;
use time::OffsetDateTime;

const ADDR: &str = "E7:2E:00:B1:38:96";

/// 10.00 C, 50 %
const LIVE_MINIMAL: [u8; 3] = [0xE8, 0x03, 0x32];

fn session(transport: &MockTransport) -> SensorSession<MockTransport> {
    SensorSession::new(ADDR, transport.clone()).with_offset_source(FixedUtcOffset(3))
}

fn history_payload(index: u32, epoch: u32, max_t: i16, max_h: u8, min_t: i16, min_h: u8) -> Vec<u8> {
    let mut v = Vec::with_capacity(14);
    v.extend_from_slice(&index.to_le_bytes());
    v.extend_from_slice(&epoch.to_le_bytes());
    v.extend_from_slice(&max_t.to_le_bytes());
    v.push(max_h);
    v.extend_from_slice(&min_t.to_le_bytes());
    v.push(min_h);
    v
}

fn live_subscriptions(transport: &MockTransport) -> usize {
    transport
        .descriptor_writes()
        .iter()
        .filter(|(uuid, enable)| *uuid == uuids::LIVE_DATA && *enable)
        .count()
}

// =============================================================================
// Connection scope
// =============================================================================

#[tokio::test]
async fn test_nested_operations_share_one_link() {
    let transport = MockTransport::new();
    transport.set_value(uuids::BATTERY, vec![87]);
    transport.set_value(uuids::UNITS, vec![0xFF]);
    transport.set_value(uuids::CLOCK, encode_clock(1_700_000_000, 2).to_vec());
    let mut session = session(&transport);

    session.connect().await.unwrap();
    assert_eq!(session.get_battery().await.unwrap(), 87);
    assert_eq!(session.get_units().await.unwrap(), UnitPreference::Celsius);
    session.get_clock().await.unwrap();
    assert!(transport.is_connected_now());
    session.disconnect().await.unwrap();

    assert_eq!(transport.connect_count(), 1);
    assert_eq!(transport.disconnect_count(), 1);
    assert_eq!(transport.last_address().as_deref(), Some(ADDR));
    assert!(!session.is_connected());
}

#[tokio::test]
async fn test_standalone_operations_connect_each_time() {
    let transport = MockTransport::new();
    transport.set_value(uuids::BATTERY, vec![50]);
    let mut session = session(&transport);

    session.get_battery().await.unwrap();
    session.get_battery().await.unwrap();

    assert_eq!(transport.connect_count(), 2);
    assert_eq!(transport.disconnect_count(), 2);
}

#[tokio::test]
async fn test_unbalanced_nesting_keeps_link_open() {
    let transport = MockTransport::new();
    let mut session = session(&transport);

    session.connect().await.unwrap();
    session.connect().await.unwrap();
    session.connect().await.unwrap();
    session.disconnect().await.unwrap();
    session.disconnect().await.unwrap();

    assert_eq!(session.connection_depth(), 1);
    assert_eq!(transport.disconnect_count(), 0);
    assert!(transport.is_connected_now());

    session.disconnect().await.unwrap();
    assert_eq!(transport.connect_count(), 1);
    assert_eq!(transport.disconnect_count(), 1);
}

#[tokio::test]
async fn test_connect_failure_leaves_session_closed() {
    let transport = MockTransport::new();
    transport.set_fail_connect(true);
    let mut session = session(&transport);

    let err = session.get_battery().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert_eq!(session.connection_depth(), 0);
    assert_eq!(transport.disconnect_count(), 0);
}

#[tokio::test]
async fn test_read_failure_still_disconnects() {
    let transport = MockTransport::new();
    transport.set_fail_reads(true);
    let mut session = session(&transport);

    let err = session.get_battery().await.unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }));
    assert_eq!(session.connection_depth(), 0);
    assert_eq!(transport.disconnect_count(), 1);
    assert!(!transport.is_connected_now());
}

#[tokio::test]
async fn test_error_inside_nested_scope_keeps_outer_link() {
    let transport = MockTransport::new();
    transport.set_value(uuids::UNITS, vec![0x02]);
    transport.set_value(uuids::BATTERY, vec![70]);
    let mut session = session(&transport);

    session.connect().await.unwrap();
    assert!(session.get_units().await.is_err());
    assert_eq!(session.connection_depth(), 1);
    assert_eq!(session.get_battery().await.unwrap(), 70);
    session.disconnect().await.unwrap();

    assert_eq!(transport.connect_count(), 1);
    assert_eq!(transport.disconnect_count(), 1);
}

#[tokio::test]
async fn test_missing_characteristic() {
    let transport = MockTransport::new();
    transport.remove_characteristic(uuids::RECORD_COUNT);
    let mut session = session(&transport);

    let err = session.record_counts().await.unwrap_err();
    assert!(matches!(err, Error::CharacteristicNotFound { uuid } if uuid == uuids::RECORD_COUNT));
    assert_eq!(transport.disconnect_count(), 1);
}

// =============================================================================
// Live data
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_current_sample_end_to_end() {
    let transport = MockTransport::new();
    transport.on_subscribe(uuids::LIVE_DATA, vec![LIVE_MINIMAL.to_vec()]);
    let mut session = session(&transport);

    let sample = session.get_current_sample().await.unwrap();

    assert_eq!(sample.temperature, 10.0);
    assert_eq!(sample.humidity, 50);
    assert_eq!(sample.voltage_mv, None);
    assert_eq!(sample.battery_level, None);
    assert_eq!(session.current_sample(), Some(sample));
    assert_eq!(
        transport.descriptor_writes(),
        vec![(uuids::LIVE_DATA, true)]
    );
    assert_eq!(transport.disconnect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_throttle_serves_cached_sample() {
    let transport = MockTransport::new();
    transport.on_subscribe(uuids::LIVE_DATA, vec![LIVE_MINIMAL.to_vec()]);
    let mut session = session(&transport);

    let first = session.get_current_sample().await.unwrap();
    tokio::time::advance(Duration::from_secs(9)).await;
    let second = session.get_current_sample().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(live_subscriptions(&transport), 1);
    assert_eq!(transport.connect_count(), 1);

    tokio::time::advance(Duration::from_secs(1)).await;
    session.get_current_sample().await.unwrap();
    assert_eq!(live_subscriptions(&transport), 2);
    assert_eq!(transport.connect_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_throttle_disabled_with_zero_interval() {
    let transport = MockTransport::new();
    transport.on_subscribe(uuids::LIVE_DATA, vec![LIVE_MINIMAL.to_vec()]);
    let config = SessionConfig::default().min_fetch_interval(Duration::ZERO);
    let mut session = SensorSession::with_config(ADDR, transport.clone(), config);

    session.get_current_sample().await.unwrap();
    session.get_current_sample().await.unwrap();
    assert_eq!(live_subscriptions(&transport), 2);
}

#[tokio::test(start_paused = true)]
async fn test_field_accessors_share_throttle() {
    let transport = MockTransport::new();
    // 21.50 C, 45 %, 2900 mV
    transport.on_subscribe(uuids::LIVE_DATA, vec![vec![0x66, 0x08, 0x2D, 0x54, 0x0B]]);
    let mut session = session(&transport);

    session.connect().await.unwrap();
    assert_eq!(session.temperature().await.unwrap(), 21.5);
    assert_eq!(session.humidity().await.unwrap(), 45);
    assert_eq!(session.voltage_mv().await.unwrap(), Some(2900));
    assert_eq!(session.battery_level().await.unwrap(), Some(80));
    session.disconnect().await.unwrap();

    assert_eq!(live_subscriptions(&transport), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unresponsive_device() {
    let transport = MockTransport::new();
    let mut session = session(&transport);

    let start = tokio::time::Instant::now();
    let err = session.get_current_sample().await.unwrap_err();

    assert!(matches!(
        err,
        Error::DeviceUnresponsive { timeout } if timeout == Duration::from_secs(5)
    ));
    assert_eq!(err.kind(), ErrorKind::DeviceUnresponsive);
    assert!(start.elapsed() >= Duration::from_secs(5));
    assert_eq!(session.current_sample(), None);
    assert_eq!(session.connection_depth(), 0);
    assert_eq!(transport.disconnect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unresponsive_does_not_start_throttle() {
    let transport = MockTransport::new();
    let mut session = session(&transport);

    assert!(session.get_current_sample().await.is_err());
    transport.on_subscribe(uuids::LIVE_DATA, vec![LIVE_MINIMAL.to_vec()]);
    assert!(session.get_current_sample().await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_malformed_live_payload_is_decode_error() {
    let transport = MockTransport::new();
    transport.on_subscribe(uuids::LIVE_DATA, vec![vec![0x01, 0x02, 0x03, 0x04]]);
    let mut session = session(&transport);

    let err = session.get_current_sample().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Decode);
    assert_eq!(transport.disconnect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_notification_for_unsubscribed_handle_is_ignored() {
    let transport = MockTransport::new();
    transport.queue_notification(uuids::HISTORY, history_payload(1, 0, 0, 0, 0, 0));
    transport.on_subscribe(uuids::LIVE_DATA, vec![LIVE_MINIMAL.to_vec()]);
    let mut session = session(&transport);

    let sample = session.get_current_sample().await.unwrap();
    assert_eq!(sample.temperature, 10.0);
    assert!(session.history().is_empty());
}

// =============================================================================
// History
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_history_overwrites_duplicates_in_place() {
    let transport = MockTransport::new();
    transport.on_subscribe(
        uuids::HISTORY,
        vec![
            history_payload(3, 1_700_010_800, 2300, 60, 2100, 50),
            history_payload(1, 1_700_003_600, 2200, 58, 2000, 48),
            history_payload(2, 1_700_007_200, 2250, 59, 2050, 49),
            history_payload(1, 1_700_003_600, 2400, 61, 1900, 47),
        ],
    );
    let mut session = session(&transport);

    let history = session.fetch_history().await.unwrap();

    assert_eq!(history.len(), 3);
    assert_eq!(history.indices().collect::<Vec<_>>(), vec![3, 1, 2]);
    let one = history.get(1).unwrap();
    assert_eq!(one.max_temperature, 24.0);
    assert_eq!(one.max_humidity, 61);
    assert_eq!(one.min_temperature, 19.0);
    assert_eq!(one.min_humidity, 47);
    assert_eq!(one.timestamp.unix_timestamp(), 1_700_003_600);

    assert_eq!(session.history(), &history);
    assert_eq!(transport.disconnect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_empty_history_is_not_an_error() {
    let transport = MockTransport::new();
    let mut session = session(&transport);

    let history = session.fetch_history().await.unwrap();
    assert!(history.is_empty());
    assert_eq!(
        transport.descriptor_writes(),
        vec![(uuids::HISTORY, true)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_history_accumulates_across_fetches() {
    let transport = MockTransport::new();
    transport.on_subscribe(uuids::HISTORY, vec![history_payload(1, 0, 100, 10, 50, 5)]);
    let mut session = session(&transport);
    session.fetch_history().await.unwrap();

    transport.on_subscribe(uuids::HISTORY, vec![history_payload(2, 3600, 200, 20, 150, 15)]);
    let history = session.fetch_history().await.unwrap();

    assert_eq!(history.indices().collect::<Vec<_>>(), vec![1, 2]);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_history_record_fails_fetch() {
    let transport = MockTransport::new();
    transport.on_subscribe(
        uuids::HISTORY,
        vec![history_payload(1, 0, 0, 0, 0, 0), vec![0u8; 10]],
    );
    let mut session = session(&transport);

    let err = session.fetch_history().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Decode);
    assert_eq!(session.history().len(), 1);
    assert_eq!(session.connection_depth(), 0);
}

#[tokio::test]
async fn test_record_counts_and_cursor() {
    let transport = MockTransport::new();
    transport.set_value(uuids::RECORD_COUNT, vec![0x10, 0x27, 0, 0, 0xA0, 0x05, 0, 0]);
    let mut session = session(&transport);

    let counts = session.record_counts().await.unwrap();
    assert_eq!((counts.total, counts.current), (10_000, 1_440));

    assert_eq!(session.history_cursor().await.unwrap(), 0);
    session.set_history_cursor(1234).await.unwrap();
    assert_eq!(session.history_cursor().await.unwrap(), 1234);

    let write = transport.writes().pop().unwrap();
    assert_eq!(write.uuid, uuids::RECORD_INDEX);
    assert_eq!(write.value, 1234u32.to_le_bytes().to_vec());
    assert_eq!(write.mode, WriteMode::WithResponse);
}

// =============================================================================
// Units, clock, battery
// =============================================================================

#[tokio::test]
async fn test_units_round_trip() {
    let transport = MockTransport::new();
    transport.set_value(uuids::UNITS, vec![0xFF]);
    let mut session = session(&transport);

    assert_eq!(session.get_units().await.unwrap(), UnitPreference::Celsius);

    session.set_units(UnitPreference::Fahrenheit).await.unwrap();
    let write = transport.writes().pop().unwrap();
    assert_eq!(write.uuid, uuids::UNITS);
    assert_eq!(write.value, vec![0x01]);
    assert_eq!(write.mode, WriteMode::WithResponse);

    assert_eq!(
        session.get_units().await.unwrap(),
        UnitPreference::Fahrenheit
    );
}

#[tokio::test]
async fn test_set_units_by_name() {
    let transport = MockTransport::new();
    let mut session = session(&transport);

    session.set_units_by_name("c").await.unwrap();
    assert_eq!(transport.value(uuids::UNITS), Some(vec![0xFF]));

    let err = session.set_units_by_name("kelvin").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(transport.connect_count(), 1);
}

#[tokio::test]
async fn test_invalid_unit_byte() {
    let transport = MockTransport::new();
    transport.set_value(uuids::UNITS, vec![0x00]);
    let mut session = session(&transport);

    let err = session.get_units().await.unwrap_err();
    assert!(matches!(
        err,
        Error::Decode(lywsd02_core::DecodeError::InvalidUnitCode(0x00))
    ));
}

#[tokio::test]
async fn test_get_clock_with_and_without_offset() {
    let transport = MockTransport::new();
    let mut session = session(&transport);

    transport.set_value(uuids::CLOCK, encode_clock(1_700_000_000, -5).to_vec());
    let (time, offset) = session.get_clock().await.unwrap();
    assert_eq!(time.unix_timestamp(), 1_700_000_000);
    assert_eq!(offset, -5);

    transport.set_value(uuids::CLOCK, 1_700_000_000u32.to_le_bytes().to_vec());
    let (time, offset) = session.get_clock().await.unwrap();
    assert_eq!(time.unix_timestamp(), 1_700_000_000);
    assert_eq!(offset, 0);

    transport.set_value(uuids::CLOCK, vec![0; 6]);
    assert_eq!(
        session.get_clock().await.unwrap_err().kind(),
        ErrorKind::Decode
    );
}

#[tokio::test]
async fn test_set_clock_uses_host_offset() {
    let transport = MockTransport::new();
    let mut session = session(&transport);
    let time = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();

    session.set_clock(time).await.unwrap();

    let write = transport.writes().pop().unwrap();
    assert_eq!(write.uuid, uuids::CLOCK);
    assert_eq!(write.value, encode_clock(1_700_000_000, 3).to_vec());
    assert_eq!(write.mode, WriteMode::WithResponse);
}

#[tokio::test]
async fn test_set_clock_uses_override() {
    let transport = MockTransport::new();
    let mut session = session(&transport);
    session.set_tz_offset(Some(-8));
    let time = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();

    session.set_clock(time).await.unwrap();

    assert_eq!(
        transport.value(uuids::CLOCK),
        Some(encode_clock(1_700_000_000, -8).to_vec())
    );
}

#[tokio::test]
async fn test_battery() {
    let transport = MockTransport::new();
    transport.set_value(uuids::BATTERY, vec![93]);
    let mut session = session(&transport);

    assert_eq!(session.get_battery().await.unwrap(), 93);

    transport.set_value(uuids::BATTERY, vec![]);
    assert_eq!(
        session.get_battery().await.unwrap_err().kind(),
        ErrorKind::Decode
    );
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_cancelled_live_fetch_gives_back_scope() {
    let transport = MockTransport::new();
    let mut session = session(&transport);

    let cancelled = tokio::time::timeout(Duration::from_secs(1), session.get_current_sample()).await;
    assert!(cancelled.is_err());

    assert_eq!(session.connection_depth(), 0);
    assert!(!session.is_connected());
    // Nobody was left to disconnect; the next use of the scope does it.
    assert!(transport.is_connected_now());

    session.disconnect().await.unwrap();
    assert_eq!(transport.disconnect_count(), 1);
    assert!(!transport.is_connected_now());
}

#[tokio::test(start_paused = true)]
async fn test_operation_after_cancel_starts_fresh_link() {
    let transport = MockTransport::new();
    transport.set_value(uuids::BATTERY, vec![64]);
    let mut session = session(&transport);

    let cancelled = tokio::time::timeout(Duration::from_secs(1), session.get_current_sample()).await;
    assert!(cancelled.is_err());

    assert_eq!(session.get_battery().await.unwrap(), 64);
    assert_eq!(session.connection_depth(), 0);
    assert_eq!(transport.connect_count(), 2);
    assert_eq!(transport.disconnect_count(), 2);
    assert!(!transport.is_connected_now());

    // The live subscription went with the old link.
    transport.on_subscribe(uuids::LIVE_DATA, vec![LIVE_MINIMAL.to_vec()]);
    session.get_current_sample().await.unwrap();
    assert_eq!(live_subscriptions(&transport), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_inside_explicit_connect_keeps_link() {
    let transport = MockTransport::new();
    transport.set_value(uuids::BATTERY, vec![64]);
    let mut session = session(&transport);

    session.connect().await.unwrap();
    let cancelled = tokio::time::timeout(Duration::from_secs(1), session.fetch_history()).await;
    assert!(cancelled.is_err());

    assert_eq!(session.connection_depth(), 1);
    assert_eq!(session.get_battery().await.unwrap(), 64);
    assert_eq!(transport.connect_count(), 1);
    assert_eq!(transport.disconnect_count(), 0);

    session.disconnect().await.unwrap();
    assert_eq!(session.connection_depth(), 0);
    assert_eq!(transport.disconnect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_aborted_task_gives_back_scope() {
    let transport = MockTransport::new();
    transport.set_value(uuids::BATTERY, vec![64]);
    let shared = session(&transport).into_shared();

    let task = {
        let shared = shared.clone();
        tokio::spawn(async move { shared.lock().await.get_current_sample().await })
    };
    while live_subscriptions(&transport) == 0 {
        tokio::task::yield_now().await;
    }
    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());

    let mut session = shared.lock().await;
    assert_eq!(session.connection_depth(), 0);
    assert_eq!(session.get_battery().await.unwrap(), 64);
    assert_eq!(transport.disconnect_count(), 2);
    assert!(!transport.is_connected_now());
}

#[tokio::test]
async fn test_panicking_transport_gives_back_scope() {
    let transport = MockTransport::new();
    transport.set_value(uuids::BATTERY, vec![64]);
    transport.set_panic_reads(true);
    let shared = session(&transport).into_shared();

    let task = {
        let shared = shared.clone();
        tokio::spawn(async move { shared.lock().await.get_battery().await })
    };
    assert!(task.await.unwrap_err().is_panic());

    let mut session = shared.lock().await;
    assert_eq!(session.connection_depth(), 0);
    assert!(transport.is_connected_now());

    transport.set_panic_reads(false);
    assert_eq!(session.get_battery().await.unwrap(), 64);
    assert_eq!(transport.connect_count(), 2);
    assert_eq!(transport.disconnect_count(), 2);
    assert!(!transport.is_connected_now());
}

// =============================================================================
// Shared session
// =============================================================================

#[tokio::test]
async fn test_shared_session_serializes_tasks() {
    let transport = MockTransport::new();
    transport.set_value(uuids::BATTERY, vec![64]);
    let shared = session(&transport).into_shared();

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let shared = shared.clone();
        tasks.push(tokio::spawn(async move {
            shared.lock().await.get_battery().await
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), 64);
    }

    assert_eq!(transport.connect_count(), 4);
    assert_eq!(transport.disconnect_count(), 4);
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Whatever the arrival order, each index ends up holding its last value.
    #[test]
    fn history_keeps_last_value_per_index(indices in proptest::collection::vec(0u32..8, 0..24)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();

        let transport = MockTransport::new();
        let payloads = indices
            .iter()
            .enumerate()
            .map(|(i, &index)| history_payload(index, 0, i as i16, 0, 0, 0))
            .collect();
        transport.on_subscribe(uuids::HISTORY, payloads);
        let mut session = session(&transport);

        let history = runtime.block_on(session.fetch_history()).unwrap();

        let mut distinct = indices.clone();
        distinct.sort_unstable();
        distinct.dedup();
        prop_assert_eq!(history.len(), distinct.len());

        for (pos, &index) in indices.iter().enumerate() {
            let last = indices.iter().rposition(|&i| i == index).unwrap();
            if pos == last {
                let record = history.get(index).unwrap();
                prop_assert_eq!(record.max_temperature, f64::from(last as i16) / 100.0);
            }
        }
    }
}
