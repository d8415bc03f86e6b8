//! Front matter and section parsing for a single markdown document.

use regex::Regex;
use serde::{Deserialize, Deserializer};

use crate::normalize::slugify;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FrontMatter {
    pub id: Option<String>,
    pub title: Option<String>,
    pub doc_type: Option<String>,
    pub topic: Option<String>,
    #[serde(deserialize_with = "one_or_many")]
    pub aliases: Vec<String>,
    pub tone: Option<String>,
    pub emotion: Option<String>,
    pub criticality: Option<String>,
    pub verbatim: bool,
    pub cta_text: Option<String>,
    pub cta_link: Option<String>,
    pub cta_action: Option<String>,
    #[serde(alias = "primary_h2_id")]
    pub primary_section: Option<String>,
    #[serde(deserialize_with = "one_or_many")]
    pub tags: Vec<String>,
}

impl FrontMatter {
    pub fn doc_type(&self) -> String {
        non_blank(self.doc_type.as_deref()).unwrap_or("info").to_string()
    }

    pub fn topic(&self) -> String {
        non_blank(self.topic.as_deref()).map_or_else(|| self.doc_type(), str::to_string)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(value)) => vec![value],
        Some(OneOrMany::Many(values)) => values,
    })
}

#[derive(Debug, Clone, Default)]
pub struct ParsedSubsection {
    pub title: String,
    pub aliases: Vec<String>,
    pub body: String,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedSection {
    pub title: String,
    pub id: String,
    pub aliases: Vec<String>,
    pub preamble: String,
    pub subsections: Vec<ParsedSubsection>,
}

pub struct ParsedDocument<'a> {
    pub front: FrontMatter,
    pub body: &'a str,
}

pub struct DocumentParser {
    heading_id: Regex,
    alias_note: Regex,
}

impl DocumentParser {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            heading_id: Regex::new(r"\{#([^}\s]+)\}\s*$")?,
            alias_note: Regex::new(r"(?i)^<!--\s*aliases\s*:\s*\[?(.*?)\]?\s*-->$")?,
        })
    }

    /// Splits a leading `---` YAML block off the content. A document without
    /// one gets default metadata.
    pub fn parse<'a>(&self, content: &'a str) -> Result<ParsedDocument<'a>, String> {
        let content = content.trim_start_matches('\u{feff}');
        let mut lines = content.split_inclusive('\n');
        let opens = lines.next().is_some_and(|first| first.trim() == "---");
        if !opens {
            return Ok(ParsedDocument { front: FrontMatter::default(), body: content });
        }

        let mut offset = content.find('\n').map_or(content.len(), |i| i + 1);
        let yaml_start = offset;
        for line in lines {
            let trimmed = line.trim();
            if trimmed == "---" || trimmed == "..." {
                let yaml = &content[yaml_start..offset];
                let front = if yaml.trim().is_empty() {
                    FrontMatter::default()
                } else {
                    serde_yaml::from_str(yaml).map_err(|e| format!("front matter: {e}"))?
                };
                let body = &content[offset + line.len()..];
                return Ok(ParsedDocument { front, body });
            }
            offset += line.len();
        }
        Err("front matter is not closed".to_string())
    }

    /// Splits a body into `##` sections and their `###` subsections. Text
    /// before the first `##` becomes an `intro` section titled `intro_title`.
    pub fn sections(&self, body: &str, intro_title: &str) -> Vec<ParsedSection> {
        let mut sections = Vec::new();
        let mut intro = String::new();
        let mut current: Option<ParsedSection> = None;
        let mut expect_aliases = false;
        let mut in_fence = false;

        for line in body.lines() {
            let trimmed = line.trim();
            let first_after_heading = expect_aliases && !trimmed.is_empty();
            if !trimmed.is_empty() {
                expect_aliases = false;
            }
            if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
                in_fence = !in_fence;
            } else if !in_fence {
                if let Some(text) = heading_text(trimmed, 2) {
                    if let Some(done) = current.take() {
                        sections.push(done);
                    }
                    let (title, id) = self.split_heading_id(text);
                    current = Some(ParsedSection { title, id, ..ParsedSection::default() });
                    expect_aliases = true;
                    continue;
                }
                if let (Some(text), Some(section)) = (heading_text(trimmed, 3), current.as_mut()) {
                    let (title, _) = self.split_heading_id(text);
                    section.subsections.push(ParsedSubsection { title, ..ParsedSubsection::default() });
                    expect_aliases = true;
                    continue;
                }
                if first_after_heading {
                    if let Some(aliases) = self.alias_list(trimmed) {
                        if let Some(section) = current.as_mut() {
                            match section.subsections.last_mut() {
                                Some(sub) => sub.aliases.extend(aliases),
                                None => section.aliases.extend(aliases),
                            }
                        }
                        continue;
                    }
                }
            }

            let target = match current.as_mut() {
                Some(section) => match section.subsections.last_mut() {
                    Some(sub) => &mut sub.body,
                    None => &mut section.preamble,
                },
                None => &mut intro,
            };
            target.push_str(line);
            target.push('\n');
        }
        if let Some(done) = current.take() {
            sections.push(done);
        }

        if !intro.trim().is_empty() {
            let intro_section = ParsedSection {
                title: intro_title.to_string(),
                id: "intro".to_string(),
                preamble: intro,
                ..ParsedSection::default()
            };
            sections.insert(0, intro_section);
        }
        sections
    }

    fn split_heading_id(&self, text: &str) -> (String, String) {
        if let Some(found) = self.heading_id.captures(text) {
            let whole = found.get(0).map_or(text.len(), |m| m.start());
            let title = text[..whole].trim().to_string();
            let id = found.get(1).map_or_else(|| slugify(&title), |m| m.as_str().to_string());
            return (title, id);
        }
        let title = text.trim().to_string();
        let mut id = slugify(&title);
        if id.is_empty() {
            id = "section".to_string();
        }
        (title, id)
    }

    fn alias_list(&self, line: &str) -> Option<Vec<String>> {
        let inner = self.alias_note.captures(line)?.get(1)?.as_str();
        Some(
            inner
                .split(',')
                .map(|a| a.trim().trim_matches(|c| c == '"' || c == '\'').trim().to_string())
                .filter(|a| !a.is_empty())
                .collect(),
        )
    }
}

/// Heading text if `line` is a heading of exactly `level`.
fn heading_text(line: &str, level: usize) -> Option<&str> {
    let hashes = line.chars().take_while(|c| *c == '#').count();
    if hashes != level {
        return None;
    }
    let rest = &line[level..];
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let text = rest.trim();
    (!text.is_empty()).then_some(text)
}
