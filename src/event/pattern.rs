//! Topic pattern matching: literal segments, single-segment `*`, and a
//! trailing `**` matching zero or more trailing segments.

/// A compiled topic pattern. Patterns are `.`-separated segments; a
/// segment of `*` matches exactly one segment, and a trailing `**`
/// matches zero or more remaining segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    segments: Vec<Segment>,
    raw: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Single,
    TrailingAny,
}

impl Pattern {
    pub fn new(pattern: impl Into<String>) -> Self {
        let raw = pattern.into();
        let mut segments: Vec<Segment> = raw
            .split('.')
            .map(|s| match s {
                "*" => Segment::Single,
                "**" => Segment::TrailingAny,
                literal => Segment::Literal(literal.to_string()),
            })
            .collect();

        // A trailing `**` that isn't actually last is treated as a literal
        // segment named "**" for matching purposes; only true trailing
        // position gets wildcard semantics.
        if let Some(pos) = segments.iter().position(|s| matches!(s, Segment::TrailingAny)) {
            if pos != segments.len() - 1 {
                segments[pos] = Segment::Literal("**".to_string());
            }
        }

        Self { segments, raw }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, topic: &str) -> bool {
        let topic_segments: Vec<&str> = topic.split('.').collect();
        match_segments(&self.segments, &topic_segments)
    }
}

fn match_segments(pattern: &[Segment], topic: &[&str]) -> bool {
    match pattern.first() {
        None => topic.is_empty(),
        Some(Segment::TrailingAny) => true,
        Some(Segment::Single) => {
            !topic.is_empty() && match_segments(&pattern[1..], &topic[1..])
        }
        Some(Segment::Literal(lit)) => {
            !topic.is_empty() && topic[0] == lit && match_segments(&pattern[1..], &topic[1..])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_matches_only_itself() {
        assert!(Pattern::new("test.event1").matches("test.event1"));
        assert!(!Pattern::new("test.event1").matches("test.event2"));
    }

    #[test]
    fn single_wildcard_matches_one_segment() {
        let p = Pattern::new("test.*");
        assert!(p.matches("test.event1"));
        assert!(p.matches("test.event2"));
        assert!(!p.matches("test"));
        assert!(!p.matches("test.event1.extra"));
    }

    #[test]
    fn trailing_wildcard_matches_zero_or_more() {
        let p = Pattern::new("data.**");
        assert!(p.matches("data"));
        assert!(p.matches("data.foo"));
        assert!(p.matches("data.foo.bar"));
        assert!(!p.matches("other.foo"));
    }

    #[test]
    fn bare_star_matches_any_single_segment_topic() {
        assert!(Pattern::new("*").matches("anything"));
        assert!(!Pattern::new("*").matches("a.b"));
    }

    #[test]
    fn non_trailing_double_star_is_literal() {
        let p = Pattern::new("a.**.b");
        assert!(p.matches("a.**.b"));
        assert!(!p.matches("a.x.b"));
    }
}
