//! SubRip cue parser.
//!
//! Index lines are optional and malformed timing lines are skipped one cue at
//! a time.  Cue settings after the end timestamp are ignored.

/// One timed subtitle span.  Times are seconds from the start of the media.
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleCue {
    pub start_secs: f64,
    pub end_secs: f64,
    pub text: String,
}

impl SubtitleCue {
    /// Boundaries to register with the engine for a user offset.  The cue
    /// itself is left untouched.
    pub fn shifted(&self, offset_secs: f64) -> (f64, f64) {
        (self.start_secs + offset_secs, self.end_secs + offset_secs)
    }
}

const ARROW: &str = "-->";

/// Parse SubRip text into cues, in source order.
pub fn parse_srt(content: &str) -> Vec<SubtitleCue> {
    let normalized = content.replace('\r', "");
    let lines: Vec<&str> = normalized.split('\n').collect();
    let mut cues = Vec::new();

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        if !line.contains(ARROW) {
            i += 1;
            continue;
        }

        let mut j = i + 1;
        let mut text_lines = Vec::new();
        while j < lines.len() && !lines[j].trim().is_empty() {
            text_lines.push(lines[j]);
            j += 1;
        }

        match parse_timing_line(line) {
            Some((start_secs, end_secs)) if start_secs <= end_secs => cues.push(SubtitleCue {
                start_secs,
                end_secs,
                text: text_lines.join("\n"),
            }),
            Some((start, end)) => {
                tracing::debug!("srt: skipping cue ending before it starts ({} > {})", start, end);
            }
            None => tracing::debug!("srt: skipping malformed timing line {:?}", line),
        }

        i = j;
    }

    cues
}

fn parse_timing_line(line: &str) -> Option<(f64, f64)> {
    let (start, end) = line.split_once(ARROW)?;
    // anything after the end timestamp (position settings) is ignored
    let end = end.split_whitespace().next()?;
    Some((parse_timestamp(start.trim())?, parse_timestamp(end)?))
}

/// `HH:MM:SS,mmm` → seconds.  All four fields must be integers.
pub fn parse_timestamp(s: &str) -> Option<f64> {
    let mut fields = s.split([':', ',', '.']);
    let mut next = || -> Option<u64> { fields.next()?.trim().parse::<u64>().ok() };
    let hours = next()?;
    let minutes = next()?;
    let seconds = next()?;
    let millis = next()?;
    if fields.next().is_some() {
        return None;
    }
    let whole = hours
        .checked_mul(3600)?
        .checked_add(minutes.checked_mul(60)?)?
        .checked_add(seconds)?;
    Some(whole as f64 + millis as f64 / 1000.0)
}

/// Seconds → `HH:MM:SS,mmm`.  Negative times clamp to zero.
pub fn format_timestamp(secs: f64) -> String {
    let total_ms = (secs.max(0.0) * 1000.0).round() as u64;
    let (h, rem) = (total_ms / 3_600_000, total_ms % 3_600_000);
    let (m, rem) = (rem / 60_000, rem % 60_000);
    let (s, ms) = (rem / 1000, rem % 1000);
    format!("{:02}:{:02}:{:02},{:03}", h, m, s, ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overflowing_fields_skip_only_that_cue() {
        let cues = parse_srt(
            "1\n18446744073709551615:00:00,000 --> 18446744073709551615:00:01,000\nboom\n\n\
             2\n00:00:05,000 --> 00:00:06,000\nok\n",
        );
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].start_secs, 5.0);
        assert_eq!(cues[0].text, "ok");
        assert_eq!(parse_timestamp("0:307445734561825861:00,000"), None);
    }

    #[test]
    fn test_single_cue() {
        let cues = parse_srt("1\n00:00:01,000 --> 00:00:03,500\nHello\n\n");
        assert_eq!(
            cues,
            vec![SubtitleCue {
                start_secs: 1.0,
                end_secs: 3.5,
                text: "Hello".to_string()
            }]
        );
    }

    #[test]
    fn test_multiline_text_and_crlf() {
        let src = "1\r\n00:01:02,250 --> 01:00:00,000\r\nfirst line\r\nsecond line\r\n\r\n2\r\n01:00:01,000 --> 01:00:02,000\r\nlast";
        let cues = parse_srt(src);
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].start_secs, 62.25);
        assert_eq!(cues[0].end_secs, 3600.0);
        assert_eq!(cues[0].text, "first line\nsecond line");
        assert_eq!(cues[1].text, "last");
    }

    #[test]
    fn test_missing_index_lines_are_fine() {
        let cues = parse_srt("00:00:01,000 --> 00:00:02,000\na\n\n00:00:03,000 --> 00:00:04,000\nb\n");
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[1].start_secs, 3.0);
    }

    #[test]
    fn test_malformed_cue_does_not_abort() {
        let src = "1\n00:00:xx,000 --> 00:00:02,000\nbroken\n\n2\n00:00:05,000 --> 00:00:06,000\nok\n";
        let cues = parse_srt(src);
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].text, "ok");
    }

    #[test]
    fn test_reversed_cue_is_skipped() {
        let cues = parse_srt("00:00:09,000 --> 00:00:02,000\nbackwards\n\n");
        assert!(cues.is_empty());
    }

    #[test]
    fn test_source_order_is_kept() {
        let src = "00:00:10,000 --> 00:00:11,000\nlate\n\n00:00:01,000 --> 00:00:02,000\nearly\n";
        let texts: Vec<_> = parse_srt(src).into_iter().map(|c| c.text).collect();
        assert_eq!(texts, vec!["late", "early"]);
    }

    #[test]
    fn test_position_settings_after_end_are_ignored() {
        let cues = parse_srt("00:00:01,000 --> 00:00:02,000 X1:40 X2:600\nhi\n");
        assert_eq!(cues[0].end_secs, 2.0);
    }

    #[test]
    fn test_timestamp_needs_four_fields() {
        assert_eq!(parse_timestamp("00:00:01"), None);
        assert_eq!(parse_timestamp("00:00:01,000,5"), None);
        assert_eq!(parse_timestamp("00:00:01,-5"), None);
        assert_eq!(parse_timestamp("00:00:01,250"), Some(1.25));
    }

    #[test]
    fn test_shifted_leaves_cue_alone() {
        let cue = SubtitleCue {
            start_secs: 1.0,
            end_secs: 3.5,
            text: "x".into(),
        };
        assert_eq!(cue.shifted(0.5), (1.5, 4.0));
        assert_eq!(cue.start_secs, 1.0);
        assert_eq!(cue.end_secs, 3.5);
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(3723.004), "01:02:03,004");
        assert_eq!(format_timestamp(-2.0), "00:00:00,000");
    }
}
