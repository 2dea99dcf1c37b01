//! Normal Play Time ranges (RFC 2326 §3.6).
//!
//! Carried by the session-level `a=range:` SDP attribute:
//!
//! ```text
//! a=range:npt=0.000-326.500     ← finite presentation
//! a=range:npt=now-              ← live stream, no known end
//! a=range:npt=10-               ← from 10s, open-ended
//! ```

use std::time::Duration;

/// One end of an npt range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NptTime {
    /// The literal `now` marker (live position).
    Now,
    /// Upper bound left empty: the presentation has no known end.
    Open,
    /// A position in seconds.
    Seconds(f64),
}

/// A playable time range `from-to`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    pub from: NptTime,
    pub to: NptTime,
}

impl Range {
    /// Parse an `npt` range value, with or without the `npt=` prefix.
    ///
    /// Returns `None` for other time formats (`clock=`, `smpte=`) and for
    /// values whose numbers do not parse.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        let value = match value.split_once('=') {
            Some((unit, rest)) if unit.trim().eq_ignore_ascii_case("npt") => rest,
            Some(_) => return None,
            None => value,
        };

        let (from, to) = value.split_once('-')?;

        let from = match from.trim() {
            "" => NptTime::Seconds(0.0),
            t if t.eq_ignore_ascii_case("now") => NptTime::Now,
            t => NptTime::Seconds(parse_npt_seconds(t)?),
        };
        let to = match to.trim() {
            "" => NptTime::Open,
            t if t.eq_ignore_ascii_case("now") => NptTime::Now,
            t => NptTime::Seconds(parse_npt_seconds(t)?),
        };

        Some(Range { from, to })
    }

    /// Length of the range when both ends are numeric; `None` means the
    /// duration is unknown. Lengths too large for a [`Duration`] are
    /// unknown as well.
    pub fn duration(&self) -> Option<Duration> {
        match (self.from, self.to) {
            (NptTime::Seconds(from), NptTime::Seconds(to)) if to >= from => {
                Duration::try_from_secs_f64(to - from).ok()
            }
            _ => None,
        }
    }
}

/// `npt-sec` (`123.45`) or `npt-hhmmss` (`1:02:03.5`).
fn parse_npt_seconds(text: &str) -> Option<f64> {
    let mut total = 0.0;
    let mut fields = 0;
    for part in text.split(':') {
        let value: f64 = part.parse().ok()?;
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        total = total * 60.0 + value;
        fields += 1;
    }
    (fields <= 3).then_some(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finite_range() {
        let range = Range::parse("npt=0.000-326.500").unwrap();
        assert_eq!(range.from, NptTime::Seconds(0.0));
        assert_eq!(range.to, NptTime::Seconds(326.5));
        assert_eq!(range.duration(), Some(Duration::from_millis(326_500)));
    }

    #[test]
    fn bare_range_without_prefix() {
        let range = Range::parse("0.000-326.500").unwrap();
        assert_eq!(range.duration().map(|d| d.as_millis()), Some(326_500));
    }

    #[test]
    fn live_range_is_unknown() {
        let range = Range::parse("npt=now-").unwrap();
        assert_eq!(range.from, NptTime::Now);
        assert_eq!(range.to, NptTime::Open);
        assert_eq!(range.duration(), None);
    }

    #[test]
    fn huge_bound_is_unknown() {
        let range = Range::parse("npt=0-1e30").unwrap();
        assert_eq!(range.to, NptTime::Seconds(1e30));
        assert_eq!(range.duration(), None);
    }

    #[test]
    fn open_upper_bound_is_unknown() {
        let range = Range::parse("npt=10-").unwrap();
        assert_eq!(range.from, NptTime::Seconds(10.0));
        assert_eq!(range.duration(), None);
    }

    #[test]
    fn hhmmss_form() {
        let range = Range::parse("npt=0:00:10-0:01:10.5").unwrap();
        assert_eq!(range.duration(), Some(Duration::from_millis(60_500)));
    }

    #[test]
    fn other_formats_are_absent() {
        assert!(Range::parse("clock=19961108T142300Z-19961108T143520Z").is_none());
        assert!(Range::parse("npt=abc-10").is_none());
        assert!(Range::parse("npt=10").is_none());
    }
}
