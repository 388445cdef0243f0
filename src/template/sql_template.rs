use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use super::params::QueryParams;
use crate::error::{FerryError, Result};

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // Escaped braces first so `{{x}}` stays literal.
    PATTERN.get_or_init(|| Regex::new(r"\{\{|\}\}|\{([^{}]*)\}|[{}]").unwrap())
}

enum Token<'a> {
    Text(&'a str),
    Placeholder(&'a str),
}

/// SQL text with `{name}` placeholders, filled by plain textual substitution.
///
/// Values are inserted verbatim, so templates must only be rendered with
/// trusted parameters. `{{` and `}}` produce literal braces.
#[derive(Debug, Clone)]
pub struct SqlTemplate {
    source: String,
    text: String,
}

impl SqlTemplate {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            source: "<inline>".to_string(),
            text: text.into(),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => FerryError::SqlFileNotFound(path.display().to_string()),
            _ => FerryError::Io(e),
        })?;

        Ok(Self {
            source: path.display().to_string(),
            text,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Distinct placeholder names in order of first appearance.
    pub fn placeholders(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = Vec::new();
        for token in self.tokens()? {
            if let Token::Placeholder(name) = token {
                if !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
        }
        Ok(names)
    }

    pub fn render(&self, params: &QueryParams) -> Result<String> {
        let tokens = self.tokens()?;
        let mut sql = String::with_capacity(self.text.len());
        let mut used = Vec::new();

        for token in tokens {
            match token {
                Token::Text(text) => sql.push_str(text),
                Token::Placeholder(name) => {
                    let value = params.get(name).ok_or_else(|| FerryError::MissingParameter {
                        placeholder: name.to_string(),
                        template: self.source.clone(),
                    })?;
                    sql.push_str(value);
                    used.push(name);
                }
            }
        }

        for key in params.keys().filter(|k| !used.contains(k)) {
            debug!(key, template = %self.source, "query parameter not referenced by template");
        }

        Ok(sql)
    }

    fn tokens(&self) -> Result<Vec<Token<'_>>> {
        let mut tokens = Vec::new();
        let mut last_end = 0;

        for caps in token_pattern().captures_iter(&self.text) {
            let Some(whole) = caps.get(0) else { continue };
            if whole.start() > last_end {
                tokens.push(Token::Text(&self.text[last_end..whole.start()]));
            }

            match whole.as_str() {
                "{{" => tokens.push(Token::Text("{")),
                "}}" => tokens.push(Token::Text("}")),
                "{" | "}" => {
                    return Err(self.malformed(format!("unmatched '{}' at byte {}", whole.as_str(), whole.start())));
                }
                _ => {
                    let name = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
                    if name.trim().is_empty() {
                        return Err(self.malformed(format!("empty placeholder at byte {}", whole.start())));
                    }
                    tokens.push(Token::Placeholder(name));
                }
            }
            last_end = whole.end();
        }

        if last_end < self.text.len() {
            tokens.push(Token::Text(&self.text[last_end..]));
        }
        Ok(tokens)
    }

    fn malformed(&self, message: String) -> FerryError {
        FerryError::MalformedTemplate {
            template: self.source.clone(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_without_placeholders_is_identity() {
        let sql = "SELECT a, b FROM `p.d.t` WHERE a > 1";
        let rendered = SqlTemplate::new(sql).render(&QueryParams::new()).unwrap();
        assert_eq!(rendered, sql);
    }

    #[test]
    fn test_render_replaces_every_occurrence() {
        let template = SqlTemplate::new("SELECT * FROM t WHERE a < {limit} OR b < {limit} AND c = '{region}'");
        let params = QueryParams::new().with("limit", 10).with("region", "apac");

        assert_eq!(
            template.render(&params).unwrap(),
            "SELECT * FROM t WHERE a < 10 OR b < 10 AND c = 'apac'"
        );
    }

    #[test]
    fn test_escaped_braces_are_literal() {
        let template = SqlTemplate::new("SELECT '{{\"k\": {v}}}' AS j");
        let params = QueryParams::new().with("v", 1);
        assert_eq!(template.render(&params).unwrap(), "SELECT '{\"k\": 1}' AS j");
    }

    #[test]
    fn test_missing_parameter() {
        let template = SqlTemplate::new("SELECT {a}, {b}");
        let err = template.render(&QueryParams::new().with("a", 1)).unwrap_err();

        match err {
            FerryError::MissingParameter { placeholder, .. } => assert_eq!(placeholder, "b"),
            other => panic!("Expected MissingParameter, got {:?}", other),
        }
    }

    #[test]
    fn test_unmatched_brace_is_malformed() {
        let err = SqlTemplate::new("SELECT {a FROM t").render(&QueryParams::new()).unwrap_err();
        assert!(matches!(err, FerryError::MalformedTemplate { .. }));

        let err = SqlTemplate::new("SELECT a} FROM t").render(&QueryParams::new()).unwrap_err();
        assert!(matches!(err, FerryError::MalformedTemplate { .. }));
    }

    #[test]
    fn test_empty_placeholder_is_malformed() {
        let err = SqlTemplate::new("SELECT {}").render(&QueryParams::new()).unwrap_err();
        assert!(matches!(err, FerryError::MalformedTemplate { .. }));
    }

    #[test]
    fn test_placeholders_in_first_seen_order() {
        let template = SqlTemplate::new("{b} {a} {b} {{c}}");
        assert_eq!(template.placeholders().unwrap(), vec!["b", "a"]);
    }

    #[test]
    fn test_extra_parameters_are_ignored() {
        let template = SqlTemplate::new("SELECT {a}");
        let params = QueryParams::new().with("a", 1).with("unused", 2);
        assert_eq!(template.render(&params).unwrap(), "SELECT 1");
    }
}
