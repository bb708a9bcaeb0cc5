use std::path::Path;

use regex::Regex;

use crate::config::ResolveConfig;
use crate::media::SequenceKey;

/// Recognises camera counter filenames: `<prefix><digits>...`.
#[derive(Debug, Clone)]
pub struct SequencePattern {
    prefix: String,
    regex: Regex,
}

impl SequencePattern {
    /// `ordinal_digits` pins the counter width; `None` accepts any run of digits.
    pub fn new(prefix: &str, ordinal_digits: Option<usize>) -> Result<Self, regex::Error> {
        let digits = match ordinal_digits {
            Some(n) => format!(r"(?P<ordinal>\d{{{n}}})(?:\D|$)"),
            None => r"(?P<ordinal>\d+)".to_string(),
        };
        let regex = Regex::new(&format!("^{}{}", regex::escape(prefix), digits))?;
        Ok(Self {
            prefix: prefix.to_string(),
            regex,
        })
    }

    pub fn from_config(config: &ResolveConfig) -> Result<Self, regex::Error> {
        Self::new(&config.filename_prefix, config.ordinal_digits)
    }

    /// Sequence key for a filename, or `None` when it does not follow the
    /// counter convention. Only the stem is inspected.
    pub fn parse(&self, filename: &str) -> Option<SequenceKey> {
        let stem = Path::new(filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(filename);

        let caps = self.regex.captures(stem)?;
        let ordinal = caps.name("ordinal")?.as_str().parse::<u64>().ok()?;
        Some(SequenceKey {
            prefix: self.prefix.clone(),
            ordinal,
        })
    }
}
