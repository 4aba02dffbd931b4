//! C7 — Prompt Builder.
//!
//! File-backed prompt templates composed from named sections and rendered
//! with `{var}` substitution, grounded in
//! `ccos::cognitive_engine::prompt::{PromptStore, FilePromptStore,
//! PromptManager}`. Each role (format inference, generator, validator,
//! checker) gets its own template id under `assets/prompts/testsynth/`.

use crate::error::PromptError;
use crate::types::PromptVars;
use std::fs;
use std::path::{Path, PathBuf};

pub const FORMAT_INFERENCE: &str = "format_inference";
pub const GENERATOR_INITIAL: &str = "generator_initial";
pub const GENERATOR_REVISION: &str = "generator_revision";
pub const VALIDATOR_INITIAL: &str = "validator_initial";
pub const VALIDATOR_REVISION: &str = "validator_revision";
pub const CHECKER_INITIAL: &str = "checker_initial";
pub const CHECKER_REVISION: &str = "checker_revision";
pub const GENERATOR_FALLBACK: &str = "generator_fallback";

const DEFAULT_VERSION: &str = "v1";

/// An assembled template: an ordered list of named sections, concatenated
/// in that order at render time.
#[derive(Clone, Debug)]
pub struct PromptTemplate {
    pub id: String,
    pub version: String,
    pub sections: Vec<(String, String)>,
}

pub trait PromptStore: Send + Sync {
    fn get_template(&self, id: &str, version: &str) -> Result<PromptTemplate, PromptError>;
}

/// Reads `{base_dir}/{id}/{version}/{section}.md` for each section name in
/// a fixed composition order, skipping any section file that doesn't exist.
#[derive(Clone)]
pub struct FilePromptStore {
    base_dir: PathBuf,
}

impl FilePromptStore {
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    fn read_section(&self, id: &str, version: &str, name: &str) -> Result<String, PromptError> {
        let path = self.base_dir.join(id).join(version).join(format!("{}.md", name));
        fs::read_to_string(&path).map_err(|e| PromptError::SectionUnreadable {
            id: id.to_string(),
            version: version.to_string(),
            section: name.to_string(),
            cause: e.to_string(),
        })
    }
}

const SECTION_NAMES: &[&str] = &["context", "constraints", "few_shots", "anti_patterns", "task"];

impl PromptStore for FilePromptStore {
    fn get_template(&self, id: &str, version: &str) -> Result<PromptTemplate, PromptError> {
        let mut sections = Vec::new();
        for name in SECTION_NAMES {
            if let Ok(content) = self.read_section(id, version, name) {
                sections.push((name.to_string(), content));
            }
        }
        if sections.is_empty() {
            return Err(PromptError::TemplateNotFound {
                id: id.to_string(),
                version: version.to_string(),
                base_dir: self.base_dir.display().to_string(),
            });
        }
        Ok(PromptTemplate {
            id: id.to_string(),
            version: version.to_string(),
            sections,
        })
    }
}

#[derive(Clone)]
pub struct PromptManager<S: PromptStore> {
    store: S,
}

impl<S: PromptStore> PromptManager<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn render(&self, id: &str, vars: &PromptVars) -> Result<String, PromptError> {
        self.render_version(id, DEFAULT_VERSION, vars)
    }

    pub fn render_version(
        &self,
        id: &str,
        version: &str,
        vars: &PromptVars,
    ) -> Result<String, PromptError> {
        let template = self.store.get_template(id, version)?;
        let mut buf = String::new();
        for (_name, content) in template.sections {
            buf.push_str(&content);
            if !buf.ends_with('\n') {
                buf.push('\n');
            }
            buf.push('\n');
        }
        let mut rendered = buf;
        for (k, v) in vars {
            let needle = format!("{{{}}}", k);
            rendered = rendered.replace(&needle, v);
        }
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct InMemoryStore(Vec<(&'static str, &'static str)>);

    impl PromptStore for InMemoryStore {
        fn get_template(&self, id: &str, version: &str) -> Result<PromptTemplate, PromptError> {
            if self.0.is_empty() {
                return Err(PromptError::TemplateNotFound {
                    id: id.to_string(),
                    version: version.to_string(),
                    base_dir: "<memory>".to_string(),
                });
            }
            Ok(PromptTemplate {
                id: id.to_string(),
                version: version.to_string(),
                sections: self.0.iter().map(|(n, c)| (n.to_string(), c.to_string())).collect(),
            })
        }
    }

    #[test]
    fn renders_sections_in_order_with_variable_substitution() {
        let store = InMemoryStore(vec![
            ("context", "Statement: {statement}"),
            ("task", "Write a generator for n <= {max_n}."),
        ]);
        let manager = PromptManager::new(store);
        let mut vars: PromptVars = HashMap::new();
        vars.insert("statement".to_string(), "sum of two integers".to_string());
        vars.insert("max_n".to_string(), "100000".to_string());
        let rendered = manager.render(GENERATOR_INITIAL, &vars).unwrap();
        assert!(rendered.contains("Statement: sum of two integers"));
        assert!(rendered.contains("n <= 100000"));
    }

    #[test]
    fn missing_template_is_an_error_not_a_panic() {
        let store = InMemoryStore(vec![]);
        let manager = PromptManager::new(store);
        let result = manager.render(FORMAT_INFERENCE, &HashMap::new());
        assert!(result.is_err());
    }
}
