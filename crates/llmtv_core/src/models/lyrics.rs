//! Structured song lyrics.

use serde::{Deserialize, Serialize};

/// Structural role of a lyric line within the song.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionRole {
    Intro,
    Verse,
    PreChorus,
    Chorus,
    Bridge,
    Outro,
    /// Any tag the lyricist used that has no dedicated role.
    Other(String),
}

impl SectionRole {
    /// Parse a section tag such as `Verse 2` or `Pre-Chorus`.
    ///
    /// Trailing numbers are ignored, matching is case-insensitive.
    pub fn from_tag(tag: &str) -> Self {
        let normalized: String = tag
            .trim()
            .trim_end_matches(|c: char| c.is_ascii_digit() || c.is_whitespace())
            .to_ascii_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .collect();

        match normalized.as_str() {
            "intro" => SectionRole::Intro,
            "verse" => SectionRole::Verse,
            "prechorus" => SectionRole::PreChorus,
            "chorus" | "hook" => SectionRole::Chorus,
            "bridge" => SectionRole::Bridge,
            "outro" => SectionRole::Outro,
            _ => SectionRole::Other(tag.trim().to_string()),
        }
    }

    /// Tag text used when rendering lyrics back to the tagged form.
    pub fn tag(&self) -> &str {
        match self {
            SectionRole::Intro => "Intro",
            SectionRole::Verse => "Verse",
            SectionRole::PreChorus => "Pre-Chorus",
            SectionRole::Chorus => "Chorus",
            SectionRole::Bridge => "Bridge",
            SectionRole::Outro => "Outro",
            SectionRole::Other(tag) => tag,
        }
    }
}

impl std::fmt::Display for SectionRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// One sung line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LyricLine {
    pub text: String,
    pub role: SectionRole,
}

/// Ordered lyric lines with their structural roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LyricsDocument {
    lines: Vec<LyricLine>,
}

impl LyricsDocument {
    /// Build a document from lines. Returns `None` when there are none.
    pub fn new(lines: Vec<LyricLine>) -> Option<Self> {
        if lines.is_empty() {
            None
        } else {
            Some(Self { lines })
        }
    }

    /// Parse lyrics in the `[Tag]` header format.
    ///
    /// Lines before the first header are treated as verse. Returns `None`
    /// if no lyric line remains after dropping headers and blank lines.
    pub fn parse_tagged(text: &str) -> Option<Self> {
        let mut role = SectionRole::Verse;
        let mut lines = Vec::new();

        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') && line.len() > 2 {
                role = SectionRole::from_tag(&line[1..line.len() - 1]);
                continue;
            }

            lines.push(LyricLine {
                text: line.to_string(),
                role: role.clone(),
            });
        }

        Self::new(lines)
    }

    pub fn lines(&self) -> &[LyricLine] {
        &self.lines
    }

    /// Render back to the tagged format, one header per role change.
    pub fn to_tagged_text(&self) -> String {
        let mut out = String::new();
        let mut current: Option<&SectionRole> = None;

        for line in &self.lines {
            if current != Some(&line.role) {
                if current.is_some() {
                    out.push('\n');
                }
                out.push_str(&format!("[{}]\n", line.role));
                current = Some(&line.role);
            }
            out.push_str(&line.text);
            out.push('\n');
        }

        out
    }
}
