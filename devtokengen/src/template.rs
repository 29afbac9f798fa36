//! Minimal output templates.
//!
//! Only two actions are understood, `{{.Id}}` and `{{.Token}}` (spaces inside
//! the braces are allowed).  Everything else between `{{` and `}}` is an
//! error, reported when the template is parsed rather than per line.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unclosed action starting at byte {0}")]
    Unclosed(usize),
    #[error("unknown action {{{{{0}}}}}")]
    UnknownAction(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Id,
    Token,
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut rest = source;
        let mut offset = 0;

        while let Some(open) = rest.find("{{") {
            if open > 0 {
                segments.push(Segment::Text(rest[..open].to_owned()));
            }
            let after_open = &rest[open + 2..];
            let close = after_open
                .find("}}")
                .ok_or(TemplateError::Unclosed(offset + open))?;
            let action = after_open[..close].trim();
            segments.push(match action {
                ".Id" => Segment::Id,
                ".Token" => Segment::Token,
                other => return Err(TemplateError::UnknownAction(other.to_owned())),
            });
            let consumed = open + 2 + close + 2;
            offset += consumed;
            rest = &rest[consumed..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Text(rest.to_owned()));
        }

        Ok(Self { segments })
    }

    pub fn render(&self, id: usize, token_hex: &str) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Id => out.push_str(&id.to_string()),
                Segment::Token => out.push_str(token_hex),
            }
        }
        out
    }
}

/// Parse `template` and render it once.
pub fn render(template: &str, id: usize, token_hex: &str) -> Result<String, TemplateError> {
    Ok(Template::parse(template)?.render(id, token_hex))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_both_actions() {
        let out = render("usr.{{.Id}} devtoken={{.Token}}", 7, "00ff").unwrap();
        assert_eq!(out, "usr.7 devtoken=00ff");
    }

    #[test]
    fn spaces_inside_braces_are_allowed() {
        assert_eq!(render("{{ .Id }}", 3, "").unwrap(), "3");
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(render("no actions here", 0, "aa").unwrap(), "no actions here");
        assert_eq!(render("", 0, "aa").unwrap(), "");
    }

    #[test]
    fn repeated_actions_repeat() {
        assert_eq!(render("{{.Token}}-{{.Token}}", 0, "ab").unwrap(), "ab-ab");
    }

    #[test]
    fn unknown_action_is_rejected() {
        assert_eq!(
            Template::parse("x {{.Name}}"),
            Err(TemplateError::UnknownAction(".Name".into()))
        );
    }

    #[test]
    fn unclosed_action_reports_offset() {
        assert_eq!(
            Template::parse("ab {{.Id}} {{.Token"),
            Err(TemplateError::Unclosed(11))
        );
    }

    #[test]
    fn error_message_shows_the_action() {
        let err = TemplateError::UnknownAction(".Name".into());
        assert_eq!(err.to_string(), "unknown action {{.Name}}");
    }
}
