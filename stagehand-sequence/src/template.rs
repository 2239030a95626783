//! Tera engine holding every `cmd:` template of a sequence document.
//!
//! Templates are compiled once, when the document is loaded, under the name
//! `<sequence>#<index>`. Each context variable renders as a map of the
//! bound object's fields plus `kind`, `tag`, `ref` and `labels`:
//!
//! ```text
//! deploy.RegionApp.push_app {{reg.tag}}_{{app.tag}}
//! ```

use tera::{Context, Tera};

use crate::arguments::ContextRow;
use crate::error::SequenceError;

pub struct CommandTemplates {
    tera: Tera,
}

impl CommandTemplates {
    /// Compile `(name, source)` pairs.
    pub fn new<I>(templates: I) -> Result<Self, SequenceError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut tera = Tera::default();
        for (name, source) in templates {
            tera.add_raw_template(&name, &source)
                .map_err(|source| SequenceError::Template { name, source })?;
        }
        Ok(Self { tera })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tera.get_template_names().any(|n| n == name)
    }

    /// Render `name` against one context row; surrounding whitespace is
    /// trimmed.
    pub fn render(&self, name: &str, row: &ContextRow<'_>) -> Result<String, SequenceError> {
        let context = Context::from_value(row.to_value())
            .map_err(|source| SequenceError::Template {
                name: name.to_owned(),
                source,
            })?;
        let rendered = self
            .tera
            .render(name, &context)
            .map_err(|source| SequenceError::Template {
                name: name.to_owned(),
                source,
            })?;
        Ok(rendered.trim().to_owned())
    }
}

impl std::fmt::Debug for CommandTemplates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.tera.get_template_names().collect();
        names.sort_unstable();
        f.debug_struct("CommandTemplates").field("templates", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syntax_errors_surface_at_compile_time() {
        let err = CommandTemplates::new([("s#0".to_string(), "a.B.c {{ reg.tag ".to_string())])
            .unwrap_err();
        assert!(matches!(err, SequenceError::Template { ref name, .. } if name == "s#0"));
    }

    #[test]
    fn renders_empty_row() {
        let t = CommandTemplates::new([("s#0".to_string(), " a.B.c fixed \n".to_string())]).unwrap();
        assert!(t.contains("s#0"));
        assert_eq!(t.render("s#0", &ContextRow::default()).unwrap(), "a.B.c fixed");
    }
}
