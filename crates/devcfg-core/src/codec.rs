//! Type-driven string conversion used when an entry has no codec of its own.

use crate::entry::{Backing, Entry, EntryType};
use crate::error::{RegistryError, Result};

/// Render the entry's current value as text.
///
/// Integers render in decimal, floats with six fractional digits, text
/// verbatim. Choice, blob and image entries have no text form.
pub fn default_to_string(entry: &Entry) -> Result<String> {
    let entry_type = entry.entry_type();
    let text = match (entry_type, entry.backing()) {
        (EntryType::I8, Backing::I8(s)) => s.get().to_string(),
        (EntryType::U8, Backing::U8(s)) => s.get().to_string(),
        (EntryType::I16, Backing::I16(s)) => s.get().to_string(),
        (EntryType::U16, Backing::U16(s)) => s.get().to_string(),
        (EntryType::I32, Backing::I32(s)) => s.get().to_string(),
        (EntryType::U32, Backing::U32(s)) => s.get().to_string(),
        (EntryType::I64, Backing::I64(s)) => s.get().to_string(),
        (EntryType::U64, Backing::U64(s)) => s.get().to_string(),
        (EntryType::Float, Backing::F32(s)) => format!("{:.6}", s.get()),
        (EntryType::Double, Backing::F64(s)) => format!("{:.6}", s.get()),
        (EntryType::Text | EntryType::Password, Backing::Text(s)) => s.get(),
        (
            EntryType::SingleChoice
            | EntryType::MultipleChoice
            | EntryType::Blob
            | EntryType::Image,
            _,
        ) => return Err(RegistryError::NotImplemented(entry_type)),
        (_, backing) => return Err(unknown_type(entry, backing)),
    };
    Ok(text)
}

/// Parse `source` and store it into the entry's backing.
///
/// Integer parsing is lenient: leading whitespace and a sign are accepted,
/// digits are read up to the first non-digit, anything unparsable is 0 and
/// out-of-range values wrap to the target width. Text longer than the
/// backing's maximum is rejected and the stored value is left as is.
pub fn default_from_string(entry: &Entry, source: &str) -> Result<()> {
    let entry_type = entry.entry_type();
    match (entry_type, entry.backing()) {
        (EntryType::I8, Backing::I8(s)) => s.set(parse_decimal(source) as i8),
        (EntryType::U8, Backing::U8(s)) => s.set(parse_decimal(source) as u8),
        (EntryType::I16, Backing::I16(s)) => s.set(parse_decimal(source) as i16),
        (EntryType::U16, Backing::U16(s)) => s.set(parse_decimal(source) as u16),
        (EntryType::I32, Backing::I32(s)) => s.set(parse_decimal(source) as i32),
        (EntryType::U32, Backing::U32(s)) => s.set(parse_decimal(source) as u32),
        (EntryType::I64, Backing::I64(s)) => s.set(parse_decimal(source) as i64),
        (EntryType::U64, Backing::U64(s)) => s.set(parse_decimal(source) as u64),
        (EntryType::Text | EntryType::Password, Backing::Text(s)) => {
            s.set(source).map_err(|max| {
                RegistryError::InvalidArgument(format!(
                    "value for `{}` is {} bytes, maximum is {}",
                    entry.key(),
                    source.len(),
                    max
                ))
            })?
        }
        (
            EntryType::Float
            | EntryType::Double
            | EntryType::SingleChoice
            | EntryType::MultipleChoice
            | EntryType::Blob
            | EntryType::Image,
            _,
        ) => return Err(RegistryError::NotImplemented(entry_type)),
        (_, backing) => return Err(unknown_type(entry, backing)),
    }
    Ok(())
}

/// Lenient base-10 parse.
///
/// The result is accumulated with wrapping arithmetic so that casting it to
/// any integer width up to 64 bits yields the two's-complement truncation of
/// the written number.
pub fn parse_decimal(source: &str) -> i128 {
    let s = source.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let magnitude = digits
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0i128, |acc, d| {
            acc.wrapping_mul(10).wrapping_add(i128::from(d - b'0'))
        });
    if negative {
        magnitude.wrapping_neg()
    } else {
        magnitude
    }
}

fn unknown_type(entry: &Entry, backing: &Backing) -> RegistryError {
    RegistryError::UnknownType {
        key: entry.key().to_string(),
        declared: entry.entry_type(),
        backing: backing.kind_name(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{Setting, TextSetting, Value};
    use pretty_assertions::assert_eq;

    fn round_trip<T>(entry_type: EntryType, values: &[T])
    where
        T: Copy + Default + PartialEq + std::fmt::Debug,
        Setting<T>: Into<Backing>,
        T: Into<Value>,
    {
        let setting = Setting::new(T::default());
        let entry = Entry::new("n", "N", entry_type, setting.clone(), T::default());
        for &v in values {
            setting.set(v);
            let text = default_to_string(&entry).unwrap();
            setting.set(T::default());
            default_from_string(&entry, &text).unwrap();
            assert_eq!(setting.get(), v, "round trip of {text}");
        }
    }

    #[test]
    fn test_integer_round_trip_at_limits() {
        round_trip(EntryType::I8, &[i8::MIN, -1, 0, 1, i8::MAX]);
        round_trip(EntryType::U8, &[u8::MIN, 1, u8::MAX]);
        round_trip(EntryType::I16, &[i16::MIN, 0, i16::MAX]);
        round_trip(EntryType::U16, &[u16::MIN, 8080, u16::MAX]);
        round_trip(EntryType::I32, &[i32::MIN, 0, i32::MAX]);
        round_trip(EntryType::U32, &[u32::MIN, u32::MAX]);
        round_trip(EntryType::I64, &[i64::MIN, 0, i64::MAX]);
        round_trip(EntryType::U64, &[u64::MIN, u64::MAX]);
    }

    #[test]
    fn test_parse_decimal_is_lenient() {
        assert_eq!(parse_decimal("42"), 42);
        assert_eq!(parse_decimal("  -17"), -17);
        assert_eq!(parse_decimal("+5"), 5);
        assert_eq!(parse_decimal("12abc"), 12);
        assert_eq!(parse_decimal("abc"), 0);
        assert_eq!(parse_decimal(""), 0);
        assert_eq!(parse_decimal("-"), 0);
    }

    #[test]
    fn test_out_of_range_wraps() {
        let setting = Setting::new(0u16);
        let entry = Entry::new("port", "Port", EntryType::U16, setting.clone(), 0u16);
        default_from_string(&entry, "65536").unwrap();
        assert_eq!(setting.get(), 0);
        default_from_string(&entry, "-1").unwrap();
        assert_eq!(setting.get(), u16::MAX);
    }

    #[test]
    fn test_float_renders_six_digits() {
        let entry = Entry::new("gain", "Gain", EntryType::Float, Setting::new(1.5f32), 0.0f32);
        assert_eq!(default_to_string(&entry).unwrap(), "1.500000");
        let entry = Entry::new("ratio", "Ratio", EntryType::Double, Setting::new(-0.25f64), 0.0f64);
        assert_eq!(default_to_string(&entry).unwrap(), "-0.250000");
    }

    #[test]
    fn test_float_parse_not_implemented() {
        let entry = Entry::new("gain", "Gain", EntryType::Float, Setting::new(1.5f32), 0.0f32);
        assert_eq!(
            default_from_string(&entry, "2.0"),
            Err(RegistryError::NotImplemented(EntryType::Float))
        );
    }

    #[test]
    fn test_text_copy_is_bounded() {
        let text = TextSetting::new("old", 5);
        let entry = Entry::new("name", "Name", EntryType::Text, text.clone(), "");
        default_from_string(&entry, "hello").unwrap();
        assert_eq!(default_to_string(&entry).unwrap(), "hello");

        let err = default_from_string(&entry, "too long").unwrap_err();
        assert!(matches!(err, RegistryError::InvalidArgument(_)));
        assert_eq!(text.get(), "hello");
    }

    #[test]
    fn test_choice_and_blob_not_implemented() {
        let single = Entry::new("mode", "Mode", EntryType::SingleChoice, Setting::new(1u8), 0u8);
        assert_eq!(
            default_to_string(&single),
            Err(RegistryError::NotImplemented(EntryType::SingleChoice))
        );
        let blob = Entry::new("cert", "Cert", EntryType::Blob, Setting::new(vec![1u8]), Vec::<u8>::new());
        assert_eq!(
            default_from_string(&blob, "x"),
            Err(RegistryError::NotImplemented(EntryType::Blob))
        );
    }

    #[test]
    fn test_mismatched_backing_is_unknown_type() {
        let entry = Entry::new("port", "Port", EntryType::U32, Setting::new(0u16), 0u16);
        assert!(matches!(
            default_to_string(&entry),
            Err(RegistryError::UnknownType { backing: "u16", .. })
        ));
        assert!(matches!(
            default_from_string(&entry, "1"),
            Err(RegistryError::UnknownType { .. })
        ));
    }
}
