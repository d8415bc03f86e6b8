use regex::Regex;

const INDEX_FILE_NAMES: &[&str] = &["alias.md", "aliases.md", "_aliases.md", "index.md", "_index.md"];

/// Decides which source files are navigation/alias indices rather than
/// knowledge documents.
pub struct DocumentFilter {
    extra_names: Vec<String>,
    min_body_chars: usize,
    phone: Regex,
    price: Regex,
    percent: Regex,
}

impl DocumentFilter {
    pub fn new(extra_names: &[String], min_body_chars: usize) -> Result<Self, regex::Error> {
        Ok(Self {
            extra_names: extra_names.iter().map(|n| n.to_lowercase()).collect(),
            min_body_chars,
            phone: Regex::new(r"(?:\+\d[\d\s\-()]{7,}\d)|(?:\b8[\s\-(]*\d{3}[\s\-)]*\d{3}[\s\-]*\d{2}[\s\-]*\d{2}\b)")?,
            price: Regex::new(r"(?i)\d[\d\s]*(?:[.,]\d+)?\s?(?:₽|руб|р\.|\$|€|usd|eur)")?,
            percent: Regex::new(r"\b\d{1,3}(?:[.,]\d{1,2})?\s?%")?,
        })
    }

    pub fn is_index_name(&self, file_name: &str) -> bool {
        let name = file_name.to_lowercase();
        INDEX_FILE_NAMES.contains(&name.as_str()) || self.extra_names.contains(&name)
    }

    /// Short bodies are only worth keeping when they state a fact.
    pub fn is_too_short(&self, body: &str) -> bool {
        body.trim().chars().count() < self.min_body_chars && !self.has_factual_signal(body)
    }

    pub fn has_factual_signal(&self, text: &str) -> bool {
        self.phone.is_match(text) || self.price.is_match(text) || self.percent.is_match(text)
    }
}
