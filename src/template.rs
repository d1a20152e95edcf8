// src/template.rs

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("template {template}: unknown placeholder {{{field}}}, expected one of: {expected}")]
    UnknownField {
        template: String,
        field: String,
        expected: String,
    },

    #[error("template {template}: unclosed {{ at byte {offset}")]
    Unclosed { template: String, offset: usize },

    #[error("template {template}: unmatched }} at byte {offset}")]
    Unmatched { template: String, offset: usize },
}

/// Values that can be substituted into a [`Template`]
pub trait Fields {
    /// Placeholder names this type understands
    const NAMES: &'static [&'static str];

    fn field(&self, name: &str) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Field(String),
}

/// A string with `{name}` placeholders; `{{` and `}}` stand for literal braces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    parts: Vec<Part>,
}

impl Template {
    pub fn parse<F: Fields>(name: &str, text: &str) -> Result<Self, TemplateError> {
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut chars = text.char_indices().peekable();

        while let Some((offset, ch)) = chars.next() {
            match ch {
                '{' if chars.peek().map(|&(_, c)| c) == Some('{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek().map(|&(_, c)| c) == Some('}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let rest = &text[offset + 1..];
                    let end = rest.find('}').ok_or_else(|| TemplateError::Unclosed {
                        template: name.to_string(),
                        offset,
                    })?;
                    let field = rest[..end].trim();
                    if !F::NAMES.contains(&field) {
                        return Err(TemplateError::UnknownField {
                            template: name.to_string(),
                            field: field.to_string(),
                            expected: F::NAMES.join(", "),
                        });
                    }
                    if !literal.is_empty() {
                        parts.push(Part::Literal(std::mem::take(&mut literal)));
                    }
                    parts.push(Part::Field(field.to_string()));
                    // skip past the closing brace
                    for (i, _) in chars.by_ref() {
                        if i == offset + 1 + end {
                            break;
                        }
                    }
                }
                '}' => {
                    return Err(TemplateError::Unmatched {
                        template: name.to_string(),
                        offset,
                    });
                }
                _ => literal.push(ch),
            }
        }
        if !literal.is_empty() {
            parts.push(Part::Literal(literal));
        }
        Ok(Self { parts })
    }

    pub fn render<F: Fields>(&self, fields: &F) -> String {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Literal(s) => out.push_str(s),
                Part::Field(name) => out.push_str(&fields.field(name)),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct Pair;

    impl Fields for Pair {
        const NAMES: &'static [&'static str] = &["a", "b"];

        fn field(&self, name: &str) -> String {
            name.to_uppercase()
        }
    }

    #[test]
    fn substitutes_fields() {
        let t = Template::parse::<Pair>("t", "x/{a}/y/{ b }#L{a}").unwrap();
        assert_eq!(t.render(&Pair), "x/A/y/B#LA");
    }

    #[test]
    fn doubled_braces_are_literal() {
        let t = Template::parse::<Pair>("t", "{{a}} {a}}}").unwrap();
        assert_eq!(t.render(&Pair), "{a} A}");
    }

    #[test]
    fn plain_text_renders_verbatim() {
        let t = Template::parse::<Pair>("t", "no placeholders, ünïcode").unwrap();
        assert_eq!(t.render(&Pair), "no placeholders, ünïcode");
        assert_eq!(Template::parse::<Pair>("t", "").unwrap().render(&Pair), "");
    }

    #[test]
    fn rejects_bad_templates() {
        assert_eq!(
            Template::parse::<Pair>("url", "{c}").unwrap_err(),
            TemplateError::UnknownField {
                template: "url".to_string(),
                field: "c".to_string(),
                expected: "a, b".to_string(),
            }
        );
        assert_eq!(
            Template::parse::<Pair>("url", "x{a").unwrap_err(),
            TemplateError::Unclosed {
                template: "url".to_string(),
                offset: 1
            }
        );
        assert_eq!(
            Template::parse::<Pair>("url", "x}a").unwrap_err(),
            TemplateError::Unmatched {
                template: "url".to_string(),
                offset: 1
            }
        );
    }
}
