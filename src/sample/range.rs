use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DatasetError;

/// Inclusive, 1-based range of sample numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleRange {
    start: u32,
    end: u32,
}

impl SampleRange {
    /// Creates a validated range.
    ///
    /// # Errors
    ///
    /// Returns `DatasetError::InvalidRange` if `start < 1` or `end < start`.
    pub fn new(start: u32, end: u32) -> Result<Self, DatasetError> {
        if start < 1 {
            return Err(DatasetError::InvalidRange(format!(
                "start must be >= 1, got {}",
                start
            )));
        }
        if end < start {
            return Err(DatasetError::InvalidRange(format!(
                "end ({}) must be >= start ({})",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    /// Parses the string form used by the dataset configuration form.
    pub fn parse(start: &str, end: &str) -> Result<Self, DatasetError> {
        let parse_bound = |name: &str, raw: &str| -> Result<i64, DatasetError> {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Err(DatasetError::InvalidRange(format!("{} is empty", name)));
            }
            trimmed.parse::<i64>().map_err(|_| {
                DatasetError::InvalidRange(format!("{} '{}' is not an integer", name, raw))
            })
        };

        let start = parse_bound("start", start)?;
        let end = parse_bound("end", end)?;
        let to_u32 = |name: &str, v: i64| -> Result<u32, DatasetError> {
            if v < 1 {
                return Err(DatasetError::InvalidRange(format!(
                    "{} must be >= 1, got {}",
                    name, v
                )));
            }
            u32::try_from(v)
                .map_err(|_| DatasetError::InvalidRange(format!("{} {} is too large", name, v)))
        };
        Self::new(to_u32("start", start)?, to_u32("end", end)?)
    }

    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn end(&self) -> u32 {
        self.end
    }

    /// Number of samples in the range.
    pub fn len(&self) -> usize {
        (self.end - self.start) as usize + 1
    }

    /// Always false; a valid range holds at least one sample.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn iter(&self) -> std::ops::RangeInclusive<u32> {
        self.start..=self.end
    }
}

impl IntoIterator for SampleRange {
    type Item = u32;
    type IntoIter = std::ops::RangeInclusive<u32>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Display for SampleRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_ranges() {
        let range = SampleRange::new(1, 3).unwrap();
        assert_eq!(range.len(), 3);
        assert_eq!(range.iter().collect::<Vec<_>>(), vec![1, 2, 3]);

        let single = SampleRange::new(5, 5).unwrap();
        assert_eq!(single.len(), 1);
        assert_eq!(single.to_string(), "5..=5");
    }

    #[test]
    fn test_invalid_ranges() {
        assert!(matches!(SampleRange::new(0, 3), Err(DatasetError::InvalidRange(_))));
        assert!(matches!(SampleRange::new(4, 3), Err(DatasetError::InvalidRange(_))));
    }

    #[test]
    fn test_parse_form_strings() {
        let range = SampleRange::parse("1", " 3 ").unwrap();
        assert_eq!((range.start(), range.end()), (1, 3));

        assert!(SampleRange::parse("", "3").is_err());
        assert!(SampleRange::parse("1", "three").is_err());
        assert!(SampleRange::parse("-2", "3").is_err());
        assert!(SampleRange::parse("3", "1").is_err());
        assert!(SampleRange::parse("1", "99999999999").is_err());
    }

    #[test]
    fn test_covers_every_integer_once() {
        for (start, end) in [(1, 1), (1, 10), (7, 19), (100, 101)] {
            let range = SampleRange::new(start, end).unwrap();
            let numbers: Vec<u32> = range.into_iter().collect();
            assert_eq!(numbers.len(), (end - start + 1) as usize);
            assert!(numbers.windows(2).all(|w| w[1] == w[0] + 1));
            assert_eq!(numbers.first(), Some(&start));
            assert_eq!(numbers.last(), Some(&end));
        }
    }
}
