//! Product keys: which observation of which product to publish.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::error::{PublishError, Result};

/// Timestamp format the tile cache expects for TIME values.
pub const CACHE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// One observation of a product: `(product, year, month, day, HHMM slot)`.
///
/// The date parts are kept as the zero-padded strings they appear as in
/// directory and file names; construction checks they name a real UTC
/// instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductKey {
    product: String,
    year: String,
    month: String,
    day: String,
    slot: String,
    timestamp: DateTime<Utc>,
}

impl ProductKey {
    pub fn new(
        product: impl Into<String>,
        year: &str,
        month: &str,
        day: &str,
        slot: &str,
    ) -> Result<Self> {
        let product = product.into();
        if product.trim().is_empty() {
            return Err(PublishError::InvalidKey {
                field: "product",
                value: product,
                reason: "must not be empty",
            });
        }

        let y = digits("year", year, 4)?;
        let m = digits("month", month, 2)?;
        let d = digits("day", day, 2)?;
        digits("time slot", slot, 4)?;

        let date = NaiveDate::from_ymd_opt(y as i32, m, d).ok_or_else(|| {
            PublishError::InvalidKey {
                field: "date",
                value: format!("{}-{}-{}", year, month, day),
                reason: "not a calendar date",
            }
        })?;
        let (hours, minutes) = (slot[..2].parse::<u32>(), slot[2..].parse::<u32>());
        let time = match (hours, minutes) {
            (Ok(h), Ok(min)) => NaiveTime::from_hms_opt(h, min, 0),
            _ => None,
        }
        .ok_or_else(|| PublishError::InvalidKey {
            field: "time slot",
            value: slot.to_string(),
            reason: "not a valid HHMM time",
        })?;

        Ok(Self {
            product,
            year: year.to_string(),
            month: month.to_string(),
            day: day.to_string(),
            slot: slot.to_string(),
            timestamp: Utc.from_utc_datetime(&date.and_time(time)),
        })
    }

    pub fn product(&self) -> &str {
        &self.product
    }

    pub fn year(&self) -> &str {
        &self.year
    }

    pub fn month(&self) -> &str {
        &self.month
    }

    pub fn day(&self) -> &str {
        &self.day
    }

    pub fn slot(&self) -> &str {
        &self.slot
    }

    /// Observation time in UTC.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// `yyyymmdd`, as embedded in file names.
    pub fn date_tag(&self) -> String {
        format!("{}{}{}", self.year, self.month, self.day)
    }

    /// Observation time in the tile cache's TIME format.
    pub fn cache_time(&self) -> String {
        self.timestamp.format(CACHE_TIME_FORMAT).to_string()
    }
}

impl fmt::Display for ProductKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}-{}-{} {}",
            self.product, self.year, self.month, self.day, self.slot
        )
    }
}

fn digits(field: &'static str, value: &str, len: usize) -> Result<u32> {
    if value.len() != len || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PublishError::InvalidKey {
            field,
            value: value.to_string(),
            reason: match len {
                2 => "expected 2 digits",
                _ => "expected 4 digits",
            },
        });
    }
    value.parse().map_err(|_| PublishError::InvalidKey {
        field,
        value: value.to_string(),
        reason: "not a number",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_valid_key() {
        let key = ProductKey::new("ELECTRO_L_2_RGB_GEOSERVER", "2021", "07", "19", "2030").unwrap();
        assert_eq!(key.product(), "ELECTRO_L_2_RGB_GEOSERVER");
        assert_eq!(key.date_tag(), "20210719");
        assert_eq!(key.slot(), "2030");

        let ts = key.timestamp();
        assert_eq!((ts.year(), ts.month(), ts.day()), (2021, 7, 19));
        assert_eq!((ts.hour(), ts.minute()), (20, 30));
        assert_eq!(key.cache_time(), "2021-07-19T20:30:00.000Z");
        assert_eq!(key.to_string(), "ELECTRO_L_2_RGB_GEOSERVER 2021-07-19 2030");
    }

    #[test]
    fn test_rejects_unpadded_parts() {
        let err = ProductKey::new("P", "2021", "7", "19", "2030").unwrap_err();
        assert!(matches!(err, PublishError::InvalidKey { field: "month", .. }));

        let err = ProductKey::new("P", "21", "07", "19", "2030").unwrap_err();
        assert!(matches!(err, PublishError::InvalidKey { field: "year", .. }));

        let err = ProductKey::new("P", "2021", "07", "19", "830").unwrap_err();
        assert!(matches!(err, PublishError::InvalidKey { field: "time slot", .. }));
    }

    #[test]
    fn test_rejects_impossible_dates() {
        let err = ProductKey::new("P", "2021", "02", "30", "0000").unwrap_err();
        assert!(matches!(err, PublishError::InvalidKey { field: "date", .. }));

        let err = ProductKey::new("P", "2021", "13", "01", "0000").unwrap_err();
        assert!(matches!(err, PublishError::InvalidKey { field: "date", .. }));

        let err = ProductKey::new("P", "2021", "07", "19", "2460").unwrap_err();
        assert!(matches!(err, PublishError::InvalidKey { field: "time slot", .. }));
    }

    #[test]
    fn test_rejects_empty_product() {
        let err = ProductKey::new(" ", "2021", "07", "19", "2030").unwrap_err();
        assert!(matches!(err, PublishError::InvalidKey { field: "product", .. }));
    }
}
