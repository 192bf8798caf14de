//! Plugin Registry

use crate::{EvalContext, FunctionMeta, FunctionPlugin};
use galton_core::{GaltonError, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Central plugin registry
pub struct PluginRegistry {
    functions: HashMap<String, Arc<dyn FunctionPlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }

    pub fn with_function<F: FunctionPlugin + 'static>(mut self, f: F) -> Self {
        let name = f.meta().name.to_lowercase();
        self.functions.insert(name, Arc::new(f));
        self
    }

    pub fn get_function(&self, name: &str) -> Option<&dyn FunctionPlugin> {
        self.functions.get(&name.to_lowercase()).map(|f| f.as_ref())
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn call_function(&self, name: &str, args: &[Value], ctx: &EvalContext) -> Value {
        match self.get_function(name) {
            Some(f) => f.call(args, ctx),
            None => {
                // Find similar function names for better error message
                let similar = self.find_similar_functions(name);
                let mut err = GaltonError::undefined_func(name);
                if !similar.is_empty() {
                    let suggestions: Vec<&str> = similar.iter().take(5).map(|s| s.as_str()).collect();
                    err = err.with_suggestion(format!(
                        "Similar: {}. Use help() for full list.",
                        suggestions.join(", ")
                    ));
                }
                Value::Error(err)
            }
        }
    }

    /// Find function names similar to the given name (for error suggestions)
    fn find_similar_functions(&self, name: &str) -> Vec<String> {
        let name_lower = name.to_lowercase();
        let mut matches: Vec<(String, usize)> = self
            .functions
            .keys()
            .filter_map(|func_name| {
                let score = Self::similarity_score(&name_lower, func_name);
                if score > 0 {
                    Some((func_name.clone(), score))
                } else {
                    None
                }
            })
            .collect();

        // Higher score first, then by name so equal scores are stable
        matches.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        matches.into_iter().map(|(name, _)| name).collect()
    }

    fn similarity_score(query: &str, candidate: &str) -> usize {
        let mut score = 0;

        if candidate.starts_with(query) {
            score += 100;
        } else if candidate.contains(query) {
            score += 50;
        } else if query.contains(candidate) {
            score += 30;
        }

        // Shared characters
        let query_chars: std::collections::HashSet<char> = query.chars().collect();
        let candidate_chars: std::collections::HashSet<char> = candidate.chars().collect();
        let common = query_chars.intersection(&candidate_chars).count();
        score += common * 2;

        let len_diff = (query.len() as i32 - candidate.len() as i32).unsigned_abs() as usize;
        if len_diff < 5 && score > 0 {
            score += 5 - len_diff;
        }

        score
    }

    pub fn help(&self, name: Option<&str>) -> Value {
        match name {
            Some(n) => self.help_for(n),
            None => self.general_help(),
        }
    }

    fn help_for(&self, name: &str) -> Value {
        match self.functions.get(&name.to_lowercase()) {
            Some(f) => Self::function_to_help(f.meta()),
            None => Value::Error(
                GaltonError::new("NOT_FOUND", format!("No function named '{}'", name))
                    .with_suggestion("Call help() to list functions"),
            ),
        }
    }

    fn general_help(&self) -> Value {
        let mut funcs_by_cat: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, f) in &self.functions {
            funcs_by_cat
                .entry(f.meta().category.to_string())
                .or_default()
                .push(name.clone());
        }

        let functions = funcs_by_cat
            .into_iter()
            .map(|(cat, mut names)| {
                names.sort();
                (cat, Value::List(names.into_iter().map(Value::Text).collect()))
            })
            .collect();

        Value::object([
            ("functions", Value::Object(functions)),
            ("usage", Value::from("Call help('function_name') for detailed help.")),
        ])
    }

    fn function_to_help(meta: FunctionMeta) -> Value {
        let args = meta
            .args
            .iter()
            .map(|a| {
                Value::object([
                    ("name", Value::from(a.name)),
                    ("type", Value::from(a.typ)),
                    ("description", Value::from(a.description)),
                    ("optional", Value::Bool(a.optional)),
                    ("default", Value::from(a.default)),
                ])
            })
            .collect();

        Value::object([
            ("name", Value::from(meta.name)),
            ("description", Value::from(meta.description)),
            ("usage", Value::from(meta.usage)),
            ("returns", Value::from(meta.returns)),
            ("category", Value::from(meta.category)),
            ("args", Value::List(args)),
            ("examples", Value::List(meta.examples.iter().map(|e| Value::from(*e)).collect())),
            ("related", Value::List(meta.related.iter().map(|r| Value::from(*r)).collect())),
        ])
    }

    pub fn list_functions(&self, category: Option<&str>) -> Value {
        let mut metas: Vec<FunctionMeta> = self
            .functions
            .values()
            .map(|f| f.meta())
            .filter(|m| category.map_or(true, |c| m.category == c))
            .collect();
        metas.sort_by_key(|m| m.name);

        Value::List(
            metas
                .into_iter()
                .map(|meta| {
                    Value::object([
                        ("name", Value::from(meta.name)),
                        ("description", Value::from(meta.description)),
                        ("usage", Value::from(meta.usage)),
                        ("category", Value::from(meta.category)),
                    ])
                })
                .collect(),
        )
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ArgMeta;

    struct Echo;

    static ECHO_ARGS: [ArgMeta; 1] = [ArgMeta::required("x", "Any", "Value to echo")];

    impl FunctionPlugin for Echo {
        fn meta(&self) -> FunctionMeta {
            FunctionMeta {
                name: "echo",
                description: "Return the first argument",
                usage: "echo(x)",
                args: &ECHO_ARGS,
                returns: "Any",
                examples: &[],
                category: "test",
                related: &[],
            }
        }

        fn call(&self, args: &[Value], _ctx: &EvalContext) -> Value {
            args.first().cloned().unwrap_or(Value::Null)
        }
    }

    fn registry() -> Arc<PluginRegistry> {
        Arc::new(PluginRegistry::new().with_function(Echo))
    }

    #[test]
    fn test_call_is_case_insensitive() {
        let reg = registry();
        let ctx = EvalContext::new(reg.clone());
        let v = reg.call_function("ECHO", &[Value::Number(2.0)], &ctx);
        assert_eq!(v, Value::Number(2.0));
    }

    #[test]
    fn test_unknown_function_suggests_similar() {
        let reg = registry();
        let ctx = EvalContext::new(reg.clone());
        let v = reg.call_function("ech", &[], &ctx);
        let err = v.as_error().unwrap();
        assert_eq!(err.code, "UNDEFINED_FUNC");
        assert!(err.suggestion.as_deref().unwrap_or("").contains("echo"));
    }

    #[test]
    fn test_help_and_listing() {
        let reg = registry();
        assert_eq!(reg.help(Some("echo")).get("usage").as_text(), Some("echo(x)"));
        assert!(reg.help(Some("missing")).is_error());
        assert_eq!(reg.list_functions(Some("test")).as_list().map(|l| l.len()), Some(1));
        assert_eq!(reg.list_functions(Some("other")).as_list().map(|l| l.len()), Some(0));
    }
}
