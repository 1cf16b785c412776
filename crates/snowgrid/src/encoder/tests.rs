use crate::test_clock::{ManualTime, ScriptedTime};
use crate::{
    Error, IdEncoder, IdKind, IdLayout, IdValue, MAX_TIMESTAMP_DELTA, SnowflakeEncoder, WallClock,
    Worker,
};
use num_bigint::BigUint;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::thread::scope;

/// 2024-03-05T00:00:00Z
const MARCH_5_2024: u64 = 1_709_596_800_000;

fn layout() -> IdLayout {
    IdLayout::new(5).unwrap()
}

fn encoder_at<T>(start_time: u64, worker: Worker, time: T) -> SnowflakeEncoder<T>
where
    T: crate::TimeSource + Clone + Send + Sync,
{
    SnowflakeEncoder::new(start_time, layout(), worker, time).unwrap()
}

#[test]
fn sequence_increments_within_same_tick() {
    let encoder = encoder_at(0, Worker::ZERO, ManualTime::at(42));
    let ids: Vec<_> = (0..3).map(|_| layout().decode(encoder.next().unwrap())).collect();

    for (i, id) in ids.iter().enumerate() {
        assert_eq!(id.timestamp_delta, 42);
        assert_eq!(id.sequence as usize, i);
    }
}

#[test]
fn sequences_within_one_millisecond_are_distinct_and_ordered() {
    let encoder = encoder_at(0, Worker::ZERO, ManualTime::at(42));
    let mut seen = HashSet::new();

    for expected in 0..4096u16 {
        let decoded = layout().decode(encoder.next().unwrap());
        assert_eq!(decoded.timestamp_delta, 42);
        assert_eq!(decoded.sequence, expected);
        assert!(seen.insert(decoded.sequence));
    }
}

#[test]
fn sequence_resets_when_millisecond_advances() {
    let time = ManualTime::at(10);
    let encoder = encoder_at(0, Worker::ZERO, time.clone());
    encoder.next().unwrap();
    encoder.next().unwrap();

    time.set(11);
    let decoded = layout().decode(encoder.next().unwrap());
    assert_eq!(decoded.timestamp_delta, 11);
    assert_eq!(decoded.sequence, 0);
}

#[test]
fn rollover_spins_until_the_next_millisecond() {
    // Reads 0..=4095 serve the first 4096 ids, read 4096 wraps the sequence,
    // read 4097 is still inside the same millisecond, read 4098 advances.
    let time = ScriptedTime::new(|n| if n < 4098 { 42 } else { 43 });
    let encoder = encoder_at(0, Worker::ZERO, time.clone());

    for _ in 0..4096 {
        encoder.next().unwrap();
    }
    let reads_before = time.reads();

    let decoded = layout().decode(encoder.next().unwrap());
    assert_eq!(decoded.timestamp_delta, 43);
    assert_eq!(decoded.sequence, 0);
    assert!(time.reads() - reads_before >= 3, "expected to spin on the clock");
}

#[test]
fn ids_are_strictly_increasing() {
    let encoder = encoder_at(crate::CUSTOM_EPOCH, Worker::ZERO, WallClock::new());
    let mut last = encoder.next().unwrap();

    for _ in 0..4096 * 64 {
        let id = encoder.next().unwrap();
        assert!(id > last, "{id} <= {last}");

        let (a, b) = (layout().decode(last), layout().decode(id));
        assert!(
            b.timestamp_delta > a.timestamp_delta
                || (b.timestamp_delta == a.timestamp_delta && b.sequence > a.sequence)
        );
        last = id;
    }
}

#[test]
fn threaded_ids_are_unique() {
    const THREADS: usize = 8;
    const TOTAL_IDS: usize = 4096 * 64;
    const IDS_PER_THREAD: usize = TOTAL_IDS / THREADS;

    let encoder = Arc::new(encoder_at(
        crate::CUSTOM_EPOCH,
        Worker::ZERO,
        WallClock::new(),
    ));
    let seen_ids = Arc::new(Mutex::new(HashSet::with_capacity(TOTAL_IDS)));

    scope(|s| {
        for _ in 0..THREADS {
            let encoder = Arc::clone(&encoder);
            let seen_ids = Arc::clone(&seen_ids);
            s.spawn(move || {
                for _ in 0..IDS_PER_THREAD {
                    let id = encoder.next().unwrap();
                    assert!(seen_ids.lock().unwrap().insert(id));
                }
            });
        }
    });

    assert_eq!(seen_ids.lock().unwrap().len(), TOTAL_IDS);
}

#[test]
fn decoding_recovers_worker_and_elapsed_time() {
    let layout = layout();
    let worker = Worker::create(21, 30, &layout).unwrap();
    let encoder = encoder_at(1_000, worker, ManualTime::at(1_000 + 987_654));

    let decoded = layout.decode(encoder.next().unwrap());
    assert_eq!(decoded.data_center_id, 21);
    assert_eq!(decoded.worker_id, 30);
    assert_eq!(decoded.timestamp_delta, 987_654);
    assert_eq!(decoded.sequence, 0);
}

#[test]
fn construction_rejects_worker_outside_layout() {
    let wide = IdLayout::new(9).unwrap();
    let narrow = IdLayout::new(4).unwrap();

    let fits = Worker::create(0, 15, &wide).unwrap();
    assert!(SnowflakeEncoder::new(0, narrow, fits, ManualTime::at(0)).is_ok());

    let too_big = Worker::create(0, 16, &wide).unwrap();
    assert_eq!(
        SnowflakeEncoder::new(0, narrow, too_big, ManualTime::at(0)).unwrap_err(),
        Error::WorkerIdOutOfRange { got: 16, max: 15 }
    );
}

#[test]
fn small_drift_is_waited_out() {
    let time = ScriptedTime::sequence(&[100, 97, 100]);
    let encoder = encoder_at(0, Worker::ZERO, time.clone());

    encoder.next().unwrap();
    let decoded = layout().decode(encoder.next().unwrap());
    assert_eq!(decoded.timestamp_delta, 100);
    assert_eq!(decoded.sequence, 1);
    assert_eq!(time.reads(), 3);
}

#[test]
fn large_drift_fails_without_waiting() {
    let time = ScriptedTime::sequence(&[100, 90, 100]);
    let encoder = encoder_at(0, Worker::ZERO, time.clone());

    encoder.next().unwrap();
    assert_eq!(
        encoder.next(),
        Err(Error::ClockMovedBackwards { offset: 10 })
    );
    // The clock was read once for the failed call: no re-read after a wait.
    assert_eq!(time.reads(), 2);

    // State is untouched, so the next call continues the sequence.
    let decoded = layout().decode(encoder.next().unwrap());
    assert_eq!(decoded.timestamp_delta, 100);
    assert_eq!(decoded.sequence, 1);
}

#[test]
fn unrecovered_drift_fails_after_waiting() {
    let time = ScriptedTime::sequence(&[100, 97, 98]);
    let encoder = encoder_at(0, Worker::ZERO, time.clone());

    encoder.next().unwrap();
    assert_eq!(encoder.next(), Err(Error::ClockMovedBackwards { offset: 2 }));
    assert_eq!(time.reads(), 3);
}

#[test]
fn clock_before_start_time_is_rejected() {
    let encoder = encoder_at(5_000, Worker::ZERO, ManualTime::at(4_999));
    assert_eq!(
        encoder.next(),
        Err(Error::ClockBeforeStartTime {
            now: 4_999,
            start_time: 5_000
        })
    );
}

#[test]
fn timestamp_overflow_is_rejected() {
    let encoder = encoder_at(0, Worker::ZERO, ManualTime::at(MAX_TIMESTAMP_DELTA + 1));
    assert!(matches!(
        encoder.next(),
        Err(Error::TimestampOverflow { bits: 41, .. })
    ));
}

#[test]
fn suffixed_string_has_date_id_and_padded_suffix() {
    let encoder = encoder_at(MARCH_5_2024 - 1_000, Worker::ZERO, ManualTime::at(MARCH_5_2024));

    assert_eq!(
        encoder.next_as_string_with_suffix(12_345).unwrap(),
        "20240305419430400012345"
    );
    assert_eq!(
        encoder.next_as_string_with_suffix(100_000).unwrap(),
        "20240305419430400100000"
    );
    assert_eq!(
        encoder.next_as_string_with_suffix(7).unwrap(),
        "20240305419430400200007"
    );
}

#[test]
fn negative_suffix_fails_before_any_state_change() {
    let encoder = encoder_at(0, Worker::ZERO, ManualTime::at(42));
    assert_eq!(
        encoder.next_as_string_with_suffix(-1),
        Err(Error::NegativeSuffix(-1))
    );

    let decoded = layout().decode(encoder.next().unwrap());
    assert_eq!(decoded.sequence, 0);
}

#[test]
fn plain_string_is_the_decimal_id() {
    let time = ManualTime::at(42);
    let a = encoder_at(0, Worker::ZERO, time.clone());
    let b = encoder_at(0, Worker::ZERO, time);
    assert_eq!(a.next_as_string().unwrap(), b.next().unwrap().to_string());
}

#[test]
fn big_integer_with_suffix_parses_the_composite_string() {
    let time = ManualTime::at(MARCH_5_2024);
    let a = encoder_at(MARCH_5_2024 - 1_000, Worker::ZERO, time.clone());
    let b = encoder_at(MARCH_5_2024 - 1_000, Worker::ZERO, time);

    let big = a.next_with_suffix(99).unwrap();
    let digits = b.next_as_string_with_suffix(99).unwrap();
    assert_eq!(big.to_string(), digits);
    assert_eq!(big, "20240305419430400000099".parse::<BigUint>().unwrap());
}

#[test]
fn next_as_dispatches_on_kind() {
    let encoder = encoder_at(MARCH_5_2024 - 1_000, Worker::ZERO, ManualTime::at(MARCH_5_2024));

    assert_eq!(
        encoder.next_as(IdKind::Integer, Some(5)).unwrap(),
        IdValue::Integer(4_194_304_000)
    );
    assert_eq!(
        encoder.next_as(IdKind::String, None).unwrap(),
        IdValue::String("4194304001".into())
    );
    assert_eq!(
        encoder.next_as(IdKind::String, Some(5)).unwrap(),
        IdValue::String("20240305419430400200005".into())
    );
    assert_eq!(
        encoder.next_as(IdKind::BigInteger, None).unwrap(),
        IdValue::BigInteger(BigUint::from(4_194_304_003u64))
    );
    assert_eq!(
        encoder.next_as(IdKind::BigInteger, Some(5)).unwrap().kind(),
        IdKind::BigInteger
    );
}

#[test]
fn suffix_numbers_from_correlated_values() {
    assert_eq!(IdValue::Integer(123_456).suffix_number(), Ok(123_456));
    assert_eq!(
        IdValue::BigInteger(BigUint::from(9_876_543_210u64)).suffix_number(),
        Ok(43_210)
    );
    assert_eq!(
        IdValue::String("20240305419430400012345".into()).suffix_number(),
        Ok(12_345)
    );
    assert_eq!(IdValue::String("42".into()).suffix_number(), Ok(42));
    assert_eq!(
        IdValue::String("12ab".into()).suffix_number(),
        Err(Error::InvalidCorrelatedValue("12ab".into()))
    );
    assert!(IdValue::String(String::new()).suffix_number().is_err());
}

#[test]
fn id_kind_parses_aliases() {
    assert_eq!("long".parse::<IdKind>(), Ok(IdKind::Integer));
    assert_eq!("String".parse::<IdKind>(), Ok(IdKind::String));
    assert_eq!("bigint".parse::<IdKind>(), Ok(IdKind::BigInteger));
    assert!("uuid".parse::<IdKind>().is_err());
}
