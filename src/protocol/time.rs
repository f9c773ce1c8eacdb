//! 7K time stamps
//!
//! Every data record frame carries a 10-byte UTC time stamp:
//!
//! ```text
//! +----------+---------+-------------+----------+------------+
//! | Year(u16)| Day(u16)| Seconds(f32)| Hours(u8)| Minutes(u8)|
//! +----------+---------+-------------+----------+------------+
//! ```
//!
//! `Day` is the 1-based day of the year.

use bytes::{Buf, BufMut};
use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};

/// Encoded size of a 7K time stamp
pub const TIME_BYTES: usize = 10;

/// 7K time stamp
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SevenKTime {
    pub year: u16,
    pub day: u16,
    pub seconds: f32,
    pub hours: u8,
    pub minutes: u8,
}

impl SevenKTime {
    /// Current UTC time
    pub fn now() -> Self {
        let now = Utc::now();
        Self {
            year: now.year() as u16,
            day: now.ordinal() as u16,
            seconds: now.second() as f32 + now.nanosecond() as f32 / 1.0e9,
            hours: now.hour() as u8,
            minutes: now.minute() as u8,
        }
    }

    /// Build from seconds since the Unix epoch
    pub fn from_unix_seconds(t: f64) -> Option<Self> {
        let whole = t.floor();
        let frac = t - whole;
        let dt = DateTime::from_timestamp(whole as i64, 0)?;

        Some(Self {
            year: dt.year() as u16,
            day: dt.ordinal() as u16,
            seconds: dt.second() as f32 + frac as f32,
            hours: dt.hour() as u8,
            minutes: dt.minute() as u8,
        })
    }

    /// Seconds since the Unix epoch, or `None` if the fields do not form a
    /// valid time. Two-digit years are taken as 20xx.
    pub fn to_unix_seconds(&self) -> Option<f64> {
        if self.hours > 23 || self.minutes > 59 {
            return None;
        }
        if !self.seconds.is_finite() || self.seconds < 0.0 || self.seconds >= 61.0 {
            return None;
        }

        let year = if self.year < 100 {
            2000 + i32::from(self.year)
        } else {
            i32::from(self.year)
        };
        let date = NaiveDate::from_yo_opt(year, u32::from(self.day))?;
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?;
        let days = date.signed_duration_since(epoch).num_days();

        Some(
            days as f64 * 86_400.0
                + f64::from(self.hours) * 3_600.0
                + f64::from(self.minutes) * 60.0
                + f64::from(self.seconds),
        )
    }

    /// Read from a buffer holding at least [`TIME_BYTES`]
    pub(crate) fn read(buf: &mut impl Buf) -> Self {
        Self {
            year: buf.get_u16_le(),
            day: buf.get_u16_le(),
            seconds: buf.get_f32_le(),
            hours: buf.get_u8(),
            minutes: buf.get_u8(),
        }
    }

    pub(crate) fn write(&self, buf: &mut impl BufMut) {
        buf.put_u16_le(self.year);
        buf.put_u16_le(self.day);
        buf.put_f32_le(self.seconds);
        buf.put_u8(self.hours);
        buf.put_u8(self.minutes);
    }
}
