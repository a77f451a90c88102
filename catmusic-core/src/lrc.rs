use crate::error::CoreError;
use crate::time::DurationExt;
use regex::{Captures, Regex};
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

/// `text[mm:ss.ff]` - lyric text terminated by its timestamp.
#[allow(clippy::expect_used)]
static TRAILING_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)(.*?)\[([0-9]+):([0-9]+)(?:\.([0-9]+))?\]").expect("valid trailing tag pattern")
});

/// A bare `[mm:ss.ff]` timestamp tag.
#[allow(clippy::expect_used)]
static TIMESTAMP_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[([0-9]+):([0-9]+)(?:\.([0-9]+))?\]").expect("valid timestamp tag pattern")
});

/// Any bracketed tag, timestamps and ID tags alike.
#[allow(clippy::expect_used)]
static ANY_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[.*?\]").expect("valid bracket tag pattern"));

/// A single lyric line with its start time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedLine {
    pub start_time: Duration,
    pub text: String,
}

impl TimedLine {
    #[must_use]
    pub fn new(start_time: Duration, text: impl Into<String>) -> Self {
        Self {
            start_time,
            text: text.into(),
        }
    }
}

/// Ordered lyric lines for one track.
///
/// Lines are kept in non-decreasing start time order. Lines sharing a start
/// time keep the order they were supplied in. A timeline is never edited in
/// place; loading new lyrics replaces it wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timeline {
    lines: Vec<TimedLine>,
}

impl Timeline {
    /// Build a timeline, sorting lines by start time (stable on ties)
    #[must_use]
    pub fn new(mut lines: Vec<TimedLine>) -> Self {
        lines.sort_by_key(|line| line.start_time);
        Self { lines }
    }

    /// Parse raw lyric text into a timeline.
    ///
    /// Literal and escaped (`\n`) newlines are folded into spaces first, so a
    /// multi-line blob and a single-line escaped blob parse identically. Three
    /// conventions are tried in order, each only if the previous one produced
    /// no lines:
    ///
    /// 1. trailing tags, `Hello[00:01.50]World[00:03.00]`
    /// 2. leading tags, `[00:01.50]Hello`
    /// 3. untagged text, which becomes a single line at time zero
    ///
    /// Returns `None` when the input is blank or nothing usable remains.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.trim().is_empty() {
            return None;
        }

        let cleaned = normalize_newlines(raw);

        let mut lines = parse_trailing_tags(&cleaned);
        if lines.is_empty() {
            lines = parse_leading_tags(&cleaned);
        }
        if lines.is_empty() {
            let text = ANY_TAG.replace_all(&cleaned, "");
            let text = text.trim();
            if text.is_empty() {
                return None;
            }
            lines.push(TimedLine::new(Duration::ZERO, text));
        }

        Some(Self::new(lines))
    }

    /// Index of the most recently started line at `position`.
    ///
    /// `None` when the timeline is empty or `position` is before the first
    /// line. For a fixed timeline the result never decreases as `position`
    /// grows.
    #[must_use]
    pub fn current_index(&self, position: Duration) -> Option<usize> {
        self.lines
            .partition_point(|line| line.start_time <= position)
            .checked_sub(1)
    }

    /// Line at [`Self::current_index`]
    #[must_use]
    pub fn current_line(&self, position: Duration) -> Option<&TimedLine> {
        self.current_index(position).and_then(|i| self.lines.get(i))
    }

    /// Start time of the last line, or zero when empty
    #[must_use]
    pub fn total_duration(&self) -> Duration {
        self.lines.last().map_or(Duration::ZERO, |line| line.start_time)
    }

    #[must_use]
    pub fn lines(&self) -> &[TimedLine] {
        &self.lines
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Render as trailing-tag text, `text[mm:ss.mmm]` per line.
    #[must_use]
    pub fn to_trailing_tagged(&self) -> String {
        self.lines
            .iter()
            .map(|line| {
                let millis = line.start_time.as_millis_u64();
                format!(
                    "{}[{:02}:{:02}.{:03}]",
                    line.text,
                    millis / 60_000,
                    (millis / 1000) % 60,
                    millis % 1000
                )
            })
            .collect()
    }
}

impl FromStr for Timeline {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or(CoreError::ParseFailure)
    }
}

/// Check whether any line of `raw` starts a lyric with a `[mm:ss]` tag.
#[must_use]
pub fn is_valid_lrc(raw: &str) -> bool {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .any(|line| TIMESTAMP_TAG.is_match(line))
}

/// Look up an ID tag such as `[ti:Title]` or `[ar:Artist]`.
#[must_use]
pub fn lyric_tag(raw: &str, name: &str) -> Option<String> {
    let pattern = Regex::new(&format!(r"\[{}:(.+?)\]", regex::escape(name))).ok()?;
    pattern
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
}

fn normalize_newlines(raw: &str) -> String {
    raw.replace("\r\n", " ")
        .replace('\n', " ")
        .replace("\\r\\n", " ")
        .replace("\\n", " ")
}

fn parse_trailing_tags(cleaned: &str) -> Vec<TimedLine> {
    let mut lines = Vec::new();

    for caps in TRAILING_TAG.captures_iter(cleaned) {
        let text = caps.get(1).map_or("", |m| m.as_str()).trim();
        if text.is_empty() {
            continue;
        }
        if let Some(start_time) = decode_captured(&caps, 2) {
            lines.push(TimedLine::new(start_time, text));
        }
    }

    lines
}

fn parse_leading_tags(cleaned: &str) -> Vec<TimedLine> {
    let mut lines = Vec::new();

    for caps in TIMESTAMP_TAG.captures_iter(cleaned) {
        let Some(tag) = caps.get(0) else {
            continue;
        };
        let rest = &cleaned[tag.end()..];
        let text = rest[..rest.find('[').unwrap_or(rest.len())].trim();
        if text.is_empty() {
            continue;
        }
        if let Some(start_time) = decode_captured(&caps, 1) {
            lines.push(TimedLine::new(start_time, text));
        }
    }

    lines
}

/// Decode minutes, seconds and optional fraction captured from `first` on.
fn decode_captured(caps: &Captures<'_>, first: usize) -> Option<Duration> {
    decode_timestamp(
        caps.get(first)?.as_str(),
        caps.get(first + 1)?.as_str(),
        caps.get(first + 2).map(|m| m.as_str()),
    )
}

/// Two fraction digits are centiseconds, three or more are truncated to
/// milliseconds, a single digit contributes nothing.
fn decode_timestamp(minutes: &str, seconds: &str, fraction: Option<&str>) -> Option<Duration> {
    let minutes: u64 = minutes.parse().ok()?;
    let seconds: u64 = seconds.parse().ok()?;
    let fraction_ms: u64 = match fraction {
        Some(f) if f.len() == 2 => f.parse::<u64>().ok()? * 10,
        Some(f) if f.len() >= 3 => f.get(..3)?.parse().ok()?,
        _ => 0,
    };

    let total_ms = minutes
        .checked_mul(60_000)?
        .checked_add(seconds.checked_mul(1000)?)?
        .checked_add(fraction_ms)?;
    Some(Duration::from_millis(total_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    fn pairs(timeline: &Timeline) -> Vec<(u64, &str)> {
        timeline
            .lines()
            .iter()
            .map(|l| (u64::try_from(l.start_time.as_millis()).unwrap(), l.text.as_str()))
            .collect()
    }

    #[test]
    fn test_parse_trailing_tags() {
        let timeline = Timeline::parse("Hello[00:01.50]World[00:03.00]").unwrap();
        assert_eq!(pairs(&timeline), vec![(1500, "Hello"), (3000, "World")]);

        assert_eq!(timeline.current_index(ms(2000)), Some(0));
        assert_eq!(timeline.current_index(ms(3500)), Some(1));
        assert_eq!(timeline.current_index(ms(500)), None);
    }

    #[test]
    fn test_parse_multiline_and_escaped_newlines_agree() {
        let multiline = Timeline::parse("First[00:05.00]\nSecond[00:10.00]\r\nThird[00:15.00]").unwrap();
        let escaped = Timeline::parse(r"First[00:05.00]\nSecond[00:10.00]\nThird[00:15.00]").unwrap();
        assert_eq!(multiline, escaped);
        assert_eq!(
            pairs(&multiline),
            vec![(5000, "First"), (10_000, "Second"), (15_000, "Third")]
        );
    }

    #[test]
    fn test_parse_leading_tags_when_no_trailing_segments() {
        let timeline = Timeline::parse("[00:01.00] [00:02.50]Hello world").unwrap();
        assert_eq!(pairs(&timeline), vec![(2500, "Hello world")]);

        let timeline = Timeline::parse("[01:02.345]Only line").unwrap();
        assert_eq!(pairs(&timeline), vec![(62_345, "Only line")]);
    }

    #[test]
    fn test_trailing_form_takes_priority() {
        // Text after the final tag has no terminating timestamp and is dropped.
        let timeline = Timeline::parse("[00:01.00]Hello[00:02.50]World").unwrap();
        assert_eq!(pairs(&timeline), vec![(2500, "Hello")]);
    }

    #[test]
    fn test_parse_untagged_text() {
        let timeline = Timeline::parse("[ti:Song] just some words [ar:Someone]").unwrap();
        assert_eq!(pairs(&timeline), vec![(0, "just some words")]);
    }

    #[test]
    fn test_parse_blank_input() {
        assert!(Timeline::parse("").is_none());
        assert!(Timeline::parse("   \n\t").is_none());
        assert!(Timeline::parse("[ti:Song][ar:Someone]").is_none());
        assert!(Timeline::parse("[00:01.00][00:02.00]").is_none());
    }

    #[test]
    fn test_fraction_decoding() {
        assert_eq!(decode_timestamp("0", "1", Some("50")), Some(ms(1500)));
        assert_eq!(decode_timestamp("0", "1", Some("505")), Some(ms(1505)));
        assert_eq!(decode_timestamp("0", "1", Some("50519")), Some(ms(1505)));
        assert_eq!(decode_timestamp("0", "1", Some("5")), Some(ms(1000)));
        assert_eq!(decode_timestamp("2", "3", None), Some(ms(123_000)));
    }

    #[test]
    fn test_unparseable_tag_is_dropped() {
        let raw = "Too big[99999999999999999999:00.00]Fine[00:04.00]";
        let timeline = Timeline::parse(raw).unwrap();
        assert_eq!(pairs(&timeline), vec![(4000, "Fine")]);
    }

    #[test]
    fn test_lines_sorted_stable_on_ties() {
        let timeline = Timeline::parse("C[00:09.00]A[00:02.00]B[00:02.00]").unwrap();
        assert_eq!(pairs(&timeline), vec![(2000, "A"), (2000, "B"), (9000, "C")]);
        assert_eq!(timeline.current_index(ms(2000)), Some(1));
    }

    #[test]
    fn test_current_index_boundaries() {
        let timeline = Timeline::parse("A[00:01.00]B[00:02.00]C[00:03.00]").unwrap();
        assert_eq!(timeline.current_index(ms(999)), None);
        assert_eq!(timeline.current_index(ms(1000)), Some(0));
        assert_eq!(timeline.current_index(ms(3000)), Some(2));
        assert_eq!(timeline.current_index(Duration::from_secs(600)), Some(2));
        assert_eq!(Timeline::default().current_index(ms(1000)), None);
    }

    #[test]
    fn test_current_index_monotone() {
        let timeline =
            Timeline::parse("A[00:00.50]B[00:01.00]C[00:01.00]D[00:04.20]E[00:07.00]").unwrap();
        let mut previous = None;
        for t in 0..8000 {
            let index = timeline.current_index(ms(t));
            assert!(index >= previous, "index went backwards at {t}ms");
            previous = index;
        }
    }

    #[test]
    fn test_current_line_and_total_duration() {
        let timeline = Timeline::parse("A[00:01.00]B[00:02.00]").unwrap();
        assert_eq!(timeline.current_line(ms(1500)).unwrap().text, "A");
        assert_eq!(timeline.total_duration(), ms(2000));
        assert_eq!(Timeline::default().total_duration(), Duration::ZERO);
    }

    #[test]
    fn test_trailing_tagged_round_trip() {
        let original = Timeline::new(vec![
            TimedLine::new(ms(0), "Intro"),
            TimedLine::new(ms(1234), "你好世界"),
            TimedLine::new(ms(61_005), "Second verse"),
            TimedLine::new(ms(3_600_999), "Long tail"),
        ]);
        let reparsed = Timeline::parse(&original.to_trailing_tagged()).unwrap();
        assert_eq!(reparsed, original);
    }

    #[test]
    fn test_trailing_tagged_round_trip_generated() {
        const WORDS: [&str; 6] = ["la", "星空", "over the hill", "x", "don't stop", "99"];
        let mut rng = StdRng::seed_from_u64(0x1ac);

        for _ in 0..50 {
            let k = rng.random_range(1..=12);
            let mut at = rng.random_range(0..5_000_u64);
            let lines: Vec<TimedLine> = (0..k)
                .map(|i| {
                    let word = WORDS[rng.random_range(0..WORDS.len())];
                    let line = TimedLine::new(ms(at), format!("{word} {i}"));
                    at += rng.random_range(1..=90_000);
                    line
                })
                .collect();
            let original = Timeline::new(lines);

            let reparsed = Timeline::parse(&original.to_trailing_tagged()).unwrap();
            assert_eq!(reparsed, original);
            assert_eq!(reparsed.len(), k);
        }
    }

    #[test]
    fn test_from_str_reports_parse_failure() {
        assert!(matches!("".parse::<Timeline>(), Err(CoreError::ParseFailure)));
        assert_eq!("Hi[00:01.00]".parse::<Timeline>().unwrap().len(), 1);
    }

    #[test]
    fn test_is_valid_lrc() {
        assert!(is_valid_lrc("[ti:Song]\n[00:01.00]Hello"));
        assert!(is_valid_lrc("Hello[00:01]"));
        assert!(!is_valid_lrc("[ti:Song]\nplain words"));
        assert!(!is_valid_lrc("   "));
    }

    #[test]
    fn test_lyric_tag() {
        let raw = "[ti: Song Title ]\n[ar:Artist Name]\n[00:01.00]Hello";
        assert_eq!(lyric_tag(raw, "ti"), Some("Song Title".to_string()));
        assert_eq!(lyric_tag(raw, "ar"), Some("Artist Name".to_string()));
        assert_eq!(lyric_tag(raw, "al"), None);
    }
}
