//! # Telemetry Record Parser
//!
//! Decodes one textual record into a [`TelemetrySample`]. Stateless, so a
//! noisy link can feed it garbage forever without affecting later records.

use thiserror::Error;

use super::protocol::*;

/// Why a record was not turned into a sample
///
/// Both kinds are per-record conditions: the caller drops the record and
/// keeps reading.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameRejection {
    /// Wrong number of comma-separated fields
    #[error("malformed frame: expected 7 fields, got {fields}")]
    MalformedFrame { fields: usize },

    /// A field could not be decoded as its declared type
    #[error("field {index} could not be decoded: {value:?}")]
    FieldDecodeError { index: usize, value: String },
}

/// Decode a complete telemetry record
///
/// # Arguments
///
/// * `record` - One record without its line terminator
///
/// # Returns
///
/// * `Result<TelemetrySample, FrameRejection>` - Decoded sample, or why it was rejected
///
/// # Errors
///
/// Returns error if:
/// - The record does not have exactly 7 fields
/// - A flag is not `true`/`false` (case-insensitive)
/// - A channel value is not a finite decimal number
///
/// Values outside a gauge's display range are passed through untouched.
///
/// # Examples
///
/// ```
/// use mechanic::frame::parse_record;
///
/// let sample = parse_record("false,true,60.0,15.0,2.0,3.0,50.0").unwrap();
/// assert_eq!(sample.speed, 60.0);
/// assert!(sample.extended_ids);
/// ```
pub fn parse_record(record: &str) -> Result<TelemetrySample, FrameRejection> {
    let fields: Vec<&str> = record.split(FIELD_SEPARATOR).collect();

    if fields.len() != RECORD_FIELD_COUNT {
        return Err(FrameRejection::MalformedFrame { fields: fields.len() });
    }

    let flag = |index: usize| decode_bool(fields[index], index);
    let channel = |index: usize| decode_f64(fields[index], index);

    Ok(TelemetrySample {
        slow_bitrate: flag(0)?,
        extended_ids: flag(1)?,
        speed: channel(FIRST_CHANNEL_FIELD)?,
        rpm: channel(FIRST_CHANNEL_FIELD + 1)?,
        load: channel(FIRST_CHANNEL_FIELD + 2)?,
        temp: channel(FIRST_CHANNEL_FIELD + 3)?,
        fuel: channel(FIRST_CHANNEL_FIELD + 4)?,
    })
}

fn decode_bool(raw: &str, index: usize) -> Result<bool, FrameRejection> {
    let value = raw.trim();
    if value.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if value.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(field_error(raw, index))
    }
}

fn decode_f64(raw: &str, index: usize) -> Result<f64, FrameRejection> {
    // str::parse is locale-independent: '.' is always the decimal point
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(field_error(raw, index)),
    }
}

fn field_error(raw: &str, index: usize) -> FrameRejection {
    FrameRejection::FieldDecodeError {
        index,
        value: raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD_RECORD: &str = "false,true,60.0,15.0,2.0,3.0,50.0";

    #[test]
    fn test_parse_valid_record() {
        let sample = parse_record(GOOD_RECORD).unwrap();

        assert!(!sample.slow_bitrate);
        assert!(sample.extended_ids);
        assert_eq!(sample.speed, 60.0);
        assert_eq!(sample.rpm, 15.0);
        assert_eq!(sample.load, 2.0);
        assert_eq!(sample.temp, 3.0);
        assert_eq!(sample.fuel, 50.0);
    }

    #[test]
    fn test_parse_is_idempotent() {
        assert_eq!(parse_record(GOOD_RECORD), parse_record(GOOD_RECORD));
    }

    #[test]
    fn test_wrong_field_counts_are_malformed() {
        for record in ["", "x,y", "true,false,1,2,3,4", "true,false,1,2,3,4,5,6", ",,,,,,,,"] {
            let expected = record.split(',').count();
            assert_eq!(
                parse_record(record),
                Err(FrameRejection::MalformedFrame { fields: expected }),
                "record {:?} should be malformed",
                record
            );
        }
    }

    #[test]
    fn test_booleans_are_case_insensitive() {
        let sample = parse_record("TRUE,False,0,0,0,0,0").unwrap();
        assert!(sample.slow_bitrate);
        assert!(!sample.extended_ids);
    }

    #[test]
    fn test_unknown_boolean_text_is_rejected() {
        // Not silently read as false
        assert_eq!(
            parse_record("yes,true,0,0,0,0,0"),
            Err(FrameRejection::FieldDecodeError { index: 0, value: "yes".to_string() })
        );
        assert_eq!(
            parse_record("true,1,0,0,0,0,0"),
            Err(FrameRejection::FieldDecodeError { index: 1, value: "1".to_string() })
        );
    }

    #[test]
    fn test_bad_float_reports_field_index() {
        assert_eq!(
            parse_record("false,false,60.0,abc,2.0,3.0,50.0"),
            Err(FrameRejection::FieldDecodeError { index: 3, value: "abc".to_string() })
        );
        // Comma decimal separators are not accepted; they change the field count
        assert!(matches!(
            parse_record("false,false,60,5,15.0,2.0,3.0,50.0"),
            Err(FrameRejection::MalformedFrame { fields: 8 })
        ));
    }

    #[test]
    fn test_first_failing_field_wins() {
        match parse_record("false,false,x,y,z,0,0") {
            Err(FrameRejection::FieldDecodeError { index, .. }) => assert_eq!(index, 2),
            other => panic!("Expected FieldDecodeError, got: {:?}", other),
        }
    }

    #[test]
    fn test_non_finite_values_are_rejected() {
        for (record, index) in [
            ("false,false,NaN,0,0,0,0", 2),
            ("false,false,0,inf,0,0,0", 3),
            ("false,false,0,0,0,0,-infinity", 6),
        ] {
            match parse_record(record) {
                Err(FrameRejection::FieldDecodeError { index: got, .. }) => assert_eq!(got, index),
                other => panic!("Expected FieldDecodeError for {:?}, got: {:?}", record, other),
            }
        }
    }

    #[test]
    fn test_out_of_range_values_pass_through() {
        let sample = parse_record("false,false,-12.5,99999,250,-300,1e3").unwrap();
        assert_eq!(sample.speed, -12.5);
        assert_eq!(sample.rpm, 99999.0);
        assert_eq!(sample.temp, -300.0);
        assert_eq!(sample.fuel, 1000.0);
    }

    #[test]
    fn test_surrounding_whitespace_is_ignored() {
        let sample = parse_record(" true , false , 1.5 ,2,3,4,5\r").unwrap();
        assert!(sample.slow_bitrate);
        assert_eq!(sample.speed, 1.5);
        assert_eq!(sample.fuel, 5.0);
    }

    #[test]
    fn test_rejection_messages() {
        let malformed = FrameRejection::MalformedFrame { fields: 2 };
        assert_eq!(malformed.to_string(), "malformed frame: expected 7 fields, got 2");

        let decode = FrameRejection::FieldDecodeError { index: 4, value: "q".to_string() };
        assert_eq!(decode.to_string(), "field 4 could not be decoded: \"q\"");
    }
}
