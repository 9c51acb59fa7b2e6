//! Wire codec for LYWSD02 characteristic payloads.
//!
//! Every decoder is total over its input: a payload whose length matches none
//! of the layouts documented on the function is reported as
//! [`DecodeError::UnexpectedLength`], never guessed at. All multi-byte fields
//! are little-endian.

use bytes::Buf;

use crate::error::{DecodeError, DecodeResult};
use crate::types::{
    ClockSetting, HistoryRecord, RecordCounts, SensorSample, UnitPreference,
    timestamp_from_epoch,
};

/// Live-data payload without voltage (older firmware).
pub const LIVE_SAMPLE_MINIMAL_LEN: usize = 3;
/// Live-data payload with trailing voltage.
pub const LIVE_SAMPLE_EXTENDED_LEN: usize = 5;
/// History record payload.
pub const HISTORY_RECORD_LEN: usize = 14;
/// Clock payload without the timezone byte.
pub const CLOCK_SHORT_LEN: usize = 4;
/// Clock payload with the timezone byte.
pub const CLOCK_LEN: usize = 5;
/// Record-count payload.
pub const RECORD_COUNTS_LEN: usize = 8;
/// History cursor payload.
pub const HISTORY_CURSOR_LEN: usize = 4;

/// Display-unit wire code for Celsius.
pub const UNIT_CODE_CELSIUS: u8 = 0xFF;
/// Display-unit wire code for Fahrenheit.
pub const UNIT_CODE_FAHRENHEIT: u8 = 0x01;

/// Voltage at which the battery is considered empty.
pub const BATTERY_EMPTY_MV: u16 = 2100;

fn expect_len(
    record: &'static str,
    data: &[u8],
    expected: &'static [usize],
) -> DecodeResult<()> {
    if expected.contains(&data.len()) {
        Ok(())
    } else {
        Err(DecodeError::unexpected_length(record, expected, data.len()))
    }
}

fn centi_degrees(raw: i16) -> f64 {
    f64::from(raw) / 100.0
}

/// Decode a live-data notification.
///
/// Accepted lengths:
/// - 3 bytes: `i16` temperature x100, `u8` humidity.
/// - 5 bytes: the same, followed by `u16` cell voltage in millivolts.
///
/// The battery level is derived from the voltage when present; see
/// [`battery_level_from_voltage`].
///
/// ```
/// use lywsd02_types::codec::decode_live_sample;
///
/// let sample = decode_live_sample(&[0xE8, 0x03, 0x32]).unwrap();
/// assert_eq!(sample.temperature, 10.0);
/// assert_eq!(sample.humidity, 50);
/// assert!(sample.voltage_mv.is_none());
/// ```
pub fn decode_live_sample(data: &[u8]) -> DecodeResult<SensorSample> {
    expect_len(
        "live sample",
        data,
        &[LIVE_SAMPLE_MINIMAL_LEN, LIVE_SAMPLE_EXTENDED_LEN],
    )?;

    let mut buf = data;
    let temperature = centi_degrees(buf.get_i16_le());
    let humidity = buf.get_u8();
    let voltage_mv = (buf.remaining() == 2).then(|| buf.get_u16_le());

    Ok(SensorSample {
        temperature,
        humidity,
        voltage_mv,
        battery_level: voltage_mv.map(battery_level_from_voltage),
    })
}

/// Linear battery estimate before clamping.
///
/// The curve is anchored at 2.1 V = 0 % and gains one percent per 10 mV.
/// The volt difference is rounded to two decimals on its exact binary value
/// (ties to even) and then truncated to whole percent, which reproduces the
/// readings of the vendor tooling bit for bit. Below 2.1 V the result is
/// negative and from 3.095 V up it is at least 100.
#[must_use]
pub fn raw_battery_level(voltage_mv: u16) -> i32 {
    let delta = f64::from(voltage_mv) / 1000.0 - f64::from(BATTERY_EMPTY_MV) / 1000.0;
    // `{:.2}` rounds the exact decimal expansion, unlike `(x * 100.0).round()`.
    let rounded = format!("{delta:.2}").parse::<f64>().unwrap_or(delta);
    // Truncates toward zero; the magnitude always fits in i32.
    (rounded * 100.0) as i32
}

/// Battery percentage for a cell voltage, clamped to `0..=100`.
#[must_use]
pub fn battery_level_from_voltage(voltage_mv: u16) -> u8 {
    // Clamped into u8 range above, so the cast is lossless.
    raw_battery_level(voltage_mv).clamp(0, 100) as u8
}

/// Decode one 14-byte history record.
///
/// Layout: `u32` index, `u32` epoch seconds, `i16` max temperature x100,
/// `u8` max humidity, `i16` min temperature x100, `u8` min humidity.
pub fn decode_history_record(data: &[u8]) -> DecodeResult<HistoryRecord> {
    expect_len("history record", data, &[HISTORY_RECORD_LEN])?;

    let mut buf = data;
    let index = buf.get_u32_le();
    let epoch = buf.get_u32_le();
    let max_temperature = centi_degrees(buf.get_i16_le());
    let max_humidity = buf.get_u8();
    let min_temperature = centi_degrees(buf.get_i16_le());
    let min_humidity = buf.get_u8();

    Ok(HistoryRecord {
        index,
        timestamp: timestamp_from_epoch(epoch),
        min_temperature,
        min_humidity,
        max_temperature,
        max_humidity,
    })
}

/// Decode the clock characteristic.
///
/// Accepted lengths:
/// - 5 bytes: `u32` epoch seconds, `i8` timezone offset in hours.
/// - 4 bytes: `u32` epoch seconds only; the offset decodes as 0 and
///   [`ClockSetting::offset_present`] is `false`.
pub fn decode_clock(data: &[u8]) -> DecodeResult<ClockSetting> {
    expect_len("clock", data, &[CLOCK_SHORT_LEN, CLOCK_LEN])?;

    let mut buf = data;
    let epoch_seconds = buf.get_u32_le();
    let offset_present = buf.has_remaining();
    let tz_offset_hours = if offset_present { buf.get_i8() } else { 0 };

    Ok(ClockSetting {
        epoch_seconds,
        tz_offset_hours,
        offset_present,
    })
}

/// Encode a clock value. Always produces the 5-byte form.
#[must_use]
pub fn encode_clock(epoch_seconds: u32, tz_offset_hours: i8) -> [u8; CLOCK_LEN] {
    let mut out = [0u8; CLOCK_LEN];
    out[..4].copy_from_slice(&epoch_seconds.to_le_bytes());
    out[4] = tz_offset_hours.to_le_bytes()[0];
    out
}

/// Decode a display-unit byte.
pub fn decode_unit(code: u8) -> DecodeResult<UnitPreference> {
    match code {
        UNIT_CODE_CELSIUS => Ok(UnitPreference::Celsius),
        UNIT_CODE_FAHRENHEIT => Ok(UnitPreference::Fahrenheit),
        other => Err(DecodeError::InvalidUnitCode(other)),
    }
}

/// Decode the units characteristic payload, which must be a single byte.
pub fn decode_unit_payload(data: &[u8]) -> DecodeResult<UnitPreference> {
    expect_len("units", data, &[1])?;
    decode_unit(data[0])
}

/// Encode a display unit as its wire byte.
#[must_use]
pub fn encode_unit(unit: UnitPreference) -> u8 {
    match unit {
        UnitPreference::Celsius => UNIT_CODE_CELSIUS,
        UnitPreference::Fahrenheit => UNIT_CODE_FAHRENHEIT,
    }
}

/// Decode the battery characteristic: one unsigned percentage byte.
pub fn decode_battery(data: &[u8]) -> DecodeResult<u8> {
    expect_len("battery", data, &[1])?;
    Ok(data[0])
}

/// Decode the 8-byte record-count characteristic (`u32` total, `u32` current).
pub fn decode_record_counts(data: &[u8]) -> DecodeResult<RecordCounts> {
    expect_len("record count", data, &[RECORD_COUNTS_LEN])?;

    let mut buf = data;
    Ok(RecordCounts {
        total: buf.get_u32_le(),
        current: buf.get_u32_le(),
    })
}

/// Decode the history cursor. An empty payload means the cursor was never set
/// and reads as 0.
pub fn decode_history_cursor(data: &[u8]) -> DecodeResult<u32> {
    expect_len("history cursor", data, &[0, HISTORY_CURSOR_LEN])?;

    let mut buf = data;
    Ok(if buf.has_remaining() {
        buf.get_u32_le()
    } else {
        0
    })
}

/// Encode a history cursor value.
#[must_use]
pub fn encode_history_cursor(index: u32) -> [u8; HISTORY_CURSOR_LEN] {
    index.to_le_bytes()
}
