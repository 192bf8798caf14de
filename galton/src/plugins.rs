//! Advisor functions: the pipeline exposed through the plugin registry

use crate::auditor::{HomogeneityVerdict, VarianceAuditor};
use crate::execute::{Execution, TestSpec};
use crate::profiler::DistributionProfiler;
use crate::selector::{Method, TestSelector};
use crate::Galton;
use galton_plugin::prelude::*;
use galton_stats::helpers::extract_numbers;
use serde::Serialize;

/// Load the advisor functions into registry
pub fn load_advisor_library(registry: PluginRegistry) -> PluginRegistry {
    registry
        .with_function(ProfileFn)
        .with_function(OutliersFn)
        .with_function(Homogeneity)
        .with_function(Recommend)
        .with_function(Diagnose)
        .with_function(RunTest)
}

/// Statistics kernels plus advisor functions
pub fn standard_registry() -> PluginRegistry {
    load_advisor_library(galton_stats::load_stats_library(PluginRegistry::new()))
}

fn to_value<T: Serialize>(x: &T) -> Value {
    match serde_json::to_value(x) {
        Ok(json) => Value::from_json(&json),
        Err(e) => Value::Error(GaltonError::internal(e.to_string())),
    }
}

fn sample_arg(args: &[Value], func: &str) -> Result<Vec<f64>, GaltonError> {
    match args.first() {
        Some(list @ Value::List(_)) => extract_numbers(std::slice::from_ref(list)),
        Some(Value::Error(e)) => Err(e.clone()),
        Some(other) => Err(GaltonError::arg_type(func, "list", "List", other.type_name())),
        None => Err(GaltonError::arg_count(func, 1, 0)),
    }
}

fn text_arg(args: &[Value], index: usize, func: &str, name: &str) -> Result<Option<String>, GaltonError> {
    match args.get(index) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Text(s)) => Ok(Some(s.clone())),
        Some(Value::Error(e)) => Err(e.clone()),
        Some(other) => Err(GaltonError::arg_type(func, name, "Text", other.type_name())),
    }
}

fn bool_arg(args: &[Value], index: usize, func: &str, name: &str) -> Result<Option<bool>, GaltonError> {
    match args.get(index) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(Value::Error(e)) => Err(e.clone()),
        Some(other) => Err(GaltonError::arg_type(func, name, "Bool", other.type_name())),
    }
}

fn number_arg(args: &[Value], index: usize, func: &str, name: &str) -> Result<Option<f64>, GaltonError> {
    match args.get(index) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(Some(*n)),
        Some(Value::Error(e)) => Err(e.clone()),
        Some(other) => Err(GaltonError::arg_type(func, name, "Number", other.type_name())),
    }
}

fn table_arg(args: &[Value], index: usize, func: &str) -> Result<Table, GaltonError> {
    match args.get(index) {
        Some(v) => Table::try_from(v).map_err(|e| e.in_function(func)),
        None => Err(GaltonError::arg_count(func, index + 1, args.len())),
    }
}

/// Column roles shared by `diagnose` and `run_test`, starting at `start`:
/// value_col, group_col?, subject_col?
fn spec_args(args: &[Value], start: usize, func: &str) -> Result<TestSpec, GaltonError> {
    let value_col = text_arg(args, start, func, "value_col")?
        .ok_or_else(|| GaltonError::arg_count(func, start + 1, args.len()))?;
    let mut spec = TestSpec::new(value_col);
    if let Some(g) = text_arg(args, start + 1, func, "group_col")? {
        spec = spec.with_group(g);
    }
    if let Some(s) = text_arg(args, start + 2, func, "subject_col")? {
        spec = spec.with_subject(s);
    }
    Ok(spec)
}

macro_rules! try_value {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(e) => return Value::Error(e),
        }
    };
}

// ============ Profile ============

pub struct ProfileFn;

static PROFILE_ARGS: [ArgMeta; 2] = [
    ArgMeta::required("list", "List<Number>", "Sample; null entries count as missing"),
    ArgMeta::optional("name", "Text", "Display name", "Data"),
];
static PROFILE_EXAMPLES: [&str; 1] = ["profile([310, 295, null, 330], \"RT\") → {n, dropped, description, outliers, normality}"];
static PROFILE_RELATED: [&str; 3] = ["moments", "outliers", "shapiro_wilk"];

impl FunctionPlugin for ProfileFn {
    fn meta(&self) -> FunctionMeta {
        FunctionMeta {
            name: "profile",
            description: "Moments, IQR outliers, modality and normality verdict of a sample",
            usage: "profile(list, name?)",
            args: &PROFILE_ARGS,
            returns: "Object",
            examples: &PROFILE_EXAMPLES,
            category: "advisor",
            related: &PROFILE_RELATED,
        }
    }

    fn call(&self, args: &[Value], ctx: &EvalContext) -> Value {
        let data = try_value!(sample_arg(args, "profile"));
        let name = try_value!(text_arg(args, 1, "profile", "name")).unwrap_or_else(|| "Data".to_string());
        let profiler = DistributionProfiler::from_slice(name, &data).with_config(ctx.config.clone());
        match profiler.profile() {
            Ok(p) => to_value(&p),
            Err(e) => Value::Error(e.in_function("profile")),
        }
    }
}

// ============ Outliers ============

pub struct OutliersFn;

static OUTLIERS_ARGS: [ArgMeta; 3] = [
    ArgMeta::required("list", "List<Number>", "Sample"),
    ArgMeta::optional("method", "Text", "\"iqr\" or \"zscore\"", "iqr"),
    ArgMeta::optional("threshold", "Number", "IQR multiplier (z-score always uses 3)", "1.5"),
];
static OUTLIERS_EXAMPLES: [&str; 2] = [
    "outliers([1,2,3,2,100]) → {indices: [4], values: [100], ...}",
    "outliers(x, \"zscore\") → |z| > 3",
];
static OUTLIERS_RELATED: [&str; 2] = ["outliers_iqr", "outliers_zscore"];

impl FunctionPlugin for OutliersFn {
    fn meta(&self) -> FunctionMeta {
        FunctionMeta {
            name: "outliers",
            description: "Flag outliers of a sample by IQR fences or z-score",
            usage: "outliers(list, method?, threshold?)",
            args: &OUTLIERS_ARGS,
            returns: "Object",
            examples: &OUTLIERS_EXAMPLES,
            category: "advisor",
            related: &OUTLIERS_RELATED,
        }
    }

    fn call(&self, args: &[Value], ctx: &EvalContext) -> Value {
        let data = try_value!(sample_arg(args, "outliers"));
        let method = try_value!(text_arg(args, 1, "outliers", "method")).unwrap_or_else(|| "iqr".to_string());
        let threshold = try_value!(number_arg(args, 2, "outliers", "threshold"));
        let profiler = DistributionProfiler::from_slice("Data", &data).with_config(ctx.config.clone());
        match profiler.detect_outliers(&method, threshold) {
            Ok(set) => to_value(&set),
            Err(e) => Value::Error(e.in_function("outliers")),
        }
    }
}

// ============ Homogeneity ============

pub struct Homogeneity;

static HOMOGENEITY_ARGS: [ArgMeta; 3] = [
    ArgMeta::required("table", "Table", "{\"columns\": {name: [...]}}"),
    ArgMeta::required("value_col", "Text", "Numeric column to compare"),
    ArgMeta::optional("group_col", "Text", "Column labelling the groups", "none"),
];
static HOMOGENEITY_EXAMPLES: [&str; 1] = ["homogeneity(t, \"RT\", \"Group\") → {levene_p, is_homogeneous}"];
static HOMOGENEITY_RELATED: [&str; 2] = ["levene", "recommend"];

impl FunctionPlugin for Homogeneity {
    fn meta(&self) -> FunctionMeta {
        FunctionMeta {
            name: "homogeneity",
            description: "Levene check of equal variances across groups; null verdict when not applicable",
            usage: "homogeneity(table, value_col, group_col?)",
            args: &HOMOGENEITY_ARGS,
            returns: "Object",
            examples: &HOMOGENEITY_EXAMPLES,
            category: "advisor",
            related: &HOMOGENEITY_RELATED,
        }
    }

    fn call(&self, args: &[Value], ctx: &EvalContext) -> Value {
        // Anything that is not an object cannot carry columns
        if !matches!(args.first(), Some(Value::Object(_))) {
            return to_value(&HomogeneityVerdict::not_applicable());
        }
        let table = try_value!(table_arg(args, 0, "homogeneity"));
        let value_col = match try_value!(text_arg(args, 1, "homogeneity", "value_col")) {
            Some(c) => c,
            None => return Value::Error(GaltonError::arg_count("homogeneity", 2, args.len())),
        };
        let group_col = try_value!(text_arg(args, 2, "homogeneity", "group_col"));
        let auditor = VarianceAuditor::new().with_config(ctx.config.clone());
        match auditor.check_homogeneity(&table, &value_col, group_col.as_deref()) {
            Ok(v) => to_value(&v),
            Err(e) => Value::Error(e.in_function("homogeneity")),
        }
    }
}

// ============ Recommend ============

pub struct Recommend;

static RECOMMEND_ARGS: [ArgMeta; 5] = [
    ArgMeta::required("is_normal", "Bool", "Normality verdict"),
    ArgMeta::optional("is_homogeneous", "Bool", "Homogeneity verdict; null means not checked", "null"),
    ArgMeta::optional("has_subject_id", "Bool", "Repeated measures per subject", "false"),
    ArgMeta::optional("is_paired", "Bool", "Paired observations", "false"),
    ArgMeta::optional("group_count", "Number", "Number of groups", "1"),
];
static RECOMMEND_EXAMPLES: [&str; 2] = [
    "recommend(true, true, false, false, 2) → Independent T-test",
    "recommend(false, null, true) → GLMM_or_LMM",
];
static RECOMMEND_RELATED: [&str; 2] = ["diagnose", "run_test"];

impl FunctionPlugin for Recommend {
    fn meta(&self) -> FunctionMeta {
        FunctionMeta {
            name: "recommend",
            description: "Pick a test family from verdicts and design",
            usage: "recommend(is_normal, is_homogeneous?, has_subject_id?, is_paired?, group_count?)",
            args: &RECOMMEND_ARGS,
            returns: "Object",
            examples: &RECOMMEND_EXAMPLES,
            category: "advisor",
            related: &RECOMMEND_RELATED,
        }
    }

    fn call(&self, args: &[Value], _ctx: &EvalContext) -> Value {
        if args.is_empty() || args.len() > 5 {
            return Value::Error(GaltonError::arg_count("recommend", 1, args.len()));
        }
        let is_normal = match try_value!(bool_arg(args, 0, "recommend", "is_normal")) {
            Some(b) => b,
            None => return Value::Error(GaltonError::arg_type("recommend", "is_normal", "Bool", "Null")),
        };
        let is_homogeneous = try_value!(bool_arg(args, 1, "recommend", "is_homogeneous"));
        let has_subject_id = try_value!(bool_arg(args, 2, "recommend", "has_subject_id")).unwrap_or(false);
        let is_paired = try_value!(bool_arg(args, 3, "recommend", "is_paired")).unwrap_or(false);
        let group_count = try_value!(number_arg(args, 4, "recommend", "group_count")).unwrap_or(1.0);
        if group_count.is_nan() || group_count < 0.0 || group_count.fract() != 0.0 {
            return Value::Error(GaltonError::invalid_argument(format!(
                "group_count must be a non-negative integer, got {}",
                group_count
            )));
        }

        let r = TestSelector::new().recommend(is_normal, is_homogeneous, has_subject_id, is_paired, group_count as usize);
        to_value(&r)
    }
}

// ============ Diagnose ============

pub struct Diagnose;

static DIAGNOSE_ARGS: [ArgMeta; 6] = [
    ArgMeta::required("table", "Table", "{\"columns\": {name: [...]}}"),
    ArgMeta::required("value_col", "Text", "Numeric column to diagnose"),
    ArgMeta::optional("group_col", "Text", "Column labelling the groups", "none"),
    ArgMeta::optional("subject_col", "Text", "Subject or cluster id column", "none"),
    ArgMeta::optional("paired", "Bool", "Groups are paired by row order", "false"),
    ArgMeta::optional("execute", "Bool", "Also run the recommended method", "false"),
];
static DIAGNOSE_EXAMPLES: [&str; 2] = [
    "diagnose(t, \"RT\", \"Group\") → {profile, homogeneity, recommendation}",
    "diagnose(t, \"Value\", \"Condition\", \"SubjectID\", false, true) → adds execution",
];
static DIAGNOSE_RELATED: [&str; 3] = ["profile", "homogeneity", "recommend"];

impl FunctionPlugin for Diagnose {
    fn meta(&self) -> FunctionMeta {
        FunctionMeta {
            name: "diagnose",
            description: "Profile, audit variance and recommend a test for a table column",
            usage: "diagnose(table, value_col, group_col?, subject_col?, paired?, execute?)",
            args: &DIAGNOSE_ARGS,
            returns: "Object",
            examples: &DIAGNOSE_EXAMPLES,
            category: "advisor",
            related: &DIAGNOSE_RELATED,
        }
    }

    fn call(&self, args: &[Value], ctx: &EvalContext) -> Value {
        if args.len() > 6 {
            return Value::Error(GaltonError::arg_count("diagnose", 6, args.len()));
        }
        let table = try_value!(table_arg(args, 0, "diagnose"));
        let spec = try_value!(spec_args(args, 1, "diagnose"));
        let paired = try_value!(bool_arg(args, 4, "diagnose", "paired")).unwrap_or(false);
        let execute = try_value!(bool_arg(args, 5, "diagnose", "execute")).unwrap_or(false);

        let galton = Galton::from_context(ctx);
        let report = match galton.diagnose(&table, &spec, paired) {
            Ok(r) => r,
            Err(e) => return Value::Error(e.in_function("diagnose")),
        };
        let mut value = to_value(&report);
        if execute {
            let execution = match galton.execute(report.recommendation.method, &table, &spec) {
                Ok(x) => execution_value(&x),
                Err(e) => Value::Error(e),
            };
            if let Value::Object(fields) = &mut value {
                fields.insert("execution".to_string(), execution);
            }
        }
        value
    }
}

/// Mixed-model fits carry their text summary alongside the numbers
fn execution_value(execution: &Execution) -> Value {
    match execution {
        Execution::MixedModel(fit) => {
            let mut v = fit.to_value();
            if let Value::Object(fields) = &mut v {
                fields.insert("kind".to_string(), Value::from("mixed_model"));
            }
            v
        }
        Execution::Test(_) => to_value(execution),
    }
}

// ============ RunTest ============

pub struct RunTest;

static RUN_TEST_ARGS: [ArgMeta; 7] = [
    ArgMeta::required("method", "Text", "Canonical method name, e.g. \"Welch's T-test\""),
    ArgMeta::required("table", "Table", "{\"columns\": {name: [...]}}"),
    ArgMeta::required("value_col", "Text", "Numeric response column"),
    ArgMeta::optional("group_col", "Text", "Column labelling the groups", "none"),
    ArgMeta::optional("subject_col", "Text", "Random-intercept column for mixed models", "none"),
    ArgMeta::optional("mu0", "Number", "Null location for one-sample methods", "0"),
    ArgMeta::optional("formula", "Text", "Mixed-model formula", "value_col ~ group_col"),
];
static RUN_TEST_EXAMPLES: [&str; 2] = [
    "run_test(\"Mann-Whitney U\", t, \"RT\", \"Group\") → {statistic, p_value}",
    "run_test(\"LMM\", t, \"Value\", \"Condition\", \"SubjectID\") → {converged, fixed_effects, summary}",
];
static RUN_TEST_RELATED: [&str; 2] = ["recommend", "diagnose"];

impl FunctionPlugin for RunTest {
    fn meta(&self) -> FunctionMeta {
        FunctionMeta {
            name: "run_test",
            description: "Run a named test or mixed model on table columns",
            usage: "run_test(method, table, value_col, group_col?, subject_col?, mu0?, formula?)",
            args: &RUN_TEST_ARGS,
            returns: "Object",
            examples: &RUN_TEST_EXAMPLES,
            category: "advisor",
            related: &RUN_TEST_RELATED,
        }
    }

    fn call(&self, args: &[Value], ctx: &EvalContext) -> Value {
        if args.len() < 3 || args.len() > 7 {
            return Value::Error(GaltonError::arg_count("run_test", 3, args.len()));
        }
        let method = match try_value!(text_arg(args, 0, "run_test", "method")) {
            Some(m) => try_value!(Method::parse(&m)),
            None => return Value::Error(GaltonError::arg_type("run_test", "method", "Text", "Null")),
        };
        let table = try_value!(table_arg(args, 1, "run_test"));
        let mut spec = try_value!(spec_args(args, 2, "run_test"));
        if let Some(mu0) = try_value!(number_arg(args, 5, "run_test", "mu0")) {
            spec = spec.with_mu0(mu0);
        }
        if let Some(formula) = try_value!(text_arg(args, 6, "run_test", "formula")) {
            spec = spec.with_formula(formula);
        }

        match Galton::from_context(ctx).execute(method, &table, &spec) {
            Ok(x) => execution_value(&x),
            Err(e) => Value::Error(e.in_function("run_test")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn eval_ctx() -> EvalContext {
        EvalContext::new(Arc::new(standard_registry()))
    }

    fn table_value() -> Value {
        Value::object([(
            "columns",
            Value::object([
                ("RT", Value::numbers(&[1.0, 2.0, 3.0, 4.0, 5.0, 3.0, 4.0, 5.0, 6.0, 7.0])),
                (
                    "Group",
                    Value::List(["a", "a", "a", "a", "a", "b", "b", "b", "b", "b"].into_iter().map(Value::from).collect()),
                ),
            ]),
        )])
    }

    #[test]
    fn test_registry_contents() {
        let registry = standard_registry();
        assert_eq!(registry.len(), 25);
        for name in ["profile", "outliers", "homogeneity", "recommend", "diagnose", "run_test"] {
            assert!(registry.get_function(name).is_some(), "missing {}", name);
        }
    }

    #[test]
    fn test_profile_plugin() {
        let args = vec![
            Value::List(vec![Value::Number(1.0), Value::Null, Value::Number(2.0), Value::Number(4.0), Value::Number(3.5)]),
            Value::from("RT"),
        ];
        let v = ProfileFn.call(&args, &eval_ctx());
        assert_eq!(v.get("name").as_text(), Some("RT"));
        assert_eq!(v.get("n").as_number(), Some(4.0));
        assert_eq!(v.get("dropped").as_number(), Some(1.0));
        assert!(v.get("normality").get("shapiro_p").as_number().is_some());
        assert!(v.get("description").get("skew_label").as_text().is_some());
    }

    #[test]
    fn test_outliers_plugin() {
        let args = vec![Value::numbers(&[1.0, 2.0, 3.0, 2.0, 100.0])];
        let v = OutliersFn.call(&args, &eval_ctx());
        assert_eq!(v.get("method").as_text(), Some("iqr"));
        assert_eq!(v.get("values"), Value::numbers(&[100.0]));

        let bad = vec![Value::numbers(&[1.0, 2.0]), Value::from("mad")];
        assert!(OutliersFn.call(&bad, &eval_ctx()).is_error());
    }

    #[test]
    fn test_homogeneity_plugin() {
        let ctx = eval_ctx();
        let v = Homogeneity.call(&[table_value(), Value::from("RT"), Value::from("Group")], &ctx);
        assert_eq!(v.get("is_homogeneous").as_bool(), Some(true));

        let not_tabular = Homogeneity.call(&[Value::numbers(&[1.0, 2.0]), Value::from("RT")], &ctx);
        assert!(not_tabular.get("levene_p").is_null());
        assert!(not_tabular.get("is_homogeneous").is_null());

        let missing = Homogeneity.call(&[table_value(), Value::from("Latency"), Value::from("Group")], &ctx);
        assert!(missing.is_error());
    }

    #[test]
    fn test_recommend_plugin() {
        let ctx = eval_ctx();
        let v = Recommend.call(
            &[Value::Bool(true), Value::Bool(true), Value::Bool(false), Value::Bool(false), Value::Number(2.0)],
            &ctx,
        );
        assert_eq!(v.get("method").as_text(), Some("Independent T-test"));

        let v = Recommend.call(&[Value::Bool(false), Value::Null, Value::Bool(true)], &ctx);
        assert_eq!(v.get("method").as_text(), Some("GLMM_or_LMM"));

        let v = Recommend.call(&[Value::Bool(false)], &ctx);
        assert_eq!(v.get("method").as_text(), Some("One-sample Wilcoxon"));

        assert!(Recommend.call(&[Value::Number(1.0)], &ctx).is_error());
        assert!(Recommend.call(&[Value::Bool(true), Value::Null, Value::Null, Value::Null, Value::Number(1.5)], &ctx).is_error());
    }

    #[test]
    fn test_diagnose_plugin_with_execution() {
        let args = vec![
            table_value(),
            Value::from("RT"),
            Value::from("Group"),
            Value::Null,
            Value::Bool(false),
            Value::Bool(true),
        ];
        let v = Diagnose.call(&args, &eval_ctx());
        assert_eq!(v.get("group_count").as_number(), Some(2.0));
        let method = v.get("recommendation").get("method");
        assert_eq!(v.get("execution").get("method"), method);
        assert!(v.get("execution").get("p_value").as_number().is_some());
    }

    #[test]
    fn test_run_test_plugin() {
        let ctx = eval_ctx();
        let args = vec![Value::from("Independent T-test"), table_value(), Value::from("RT"), Value::from("Group")];
        let v = RunTest.call(&args, &ctx);
        assert_eq!(v.get("kind").as_text(), Some("test"));
        assert!((v.get("statistic").as_number().unwrap() + 2.0).abs() < 1e-12);

        let unknown = vec![Value::from("Chi-square"), table_value(), Value::from("RT")];
        let err = RunTest.call(&unknown, &ctx);
        assert_eq!(err.as_error().map(|e| e.code.as_str()), Some(codes::INVALID_ARGUMENT));
    }

    #[test]
    fn test_run_test_one_sample_mu0() {
        let args = vec![
            Value::from("One-sample T-test"),
            table_value(),
            Value::from("RT"),
            Value::Null,
            Value::Null,
            Value::Number(4.0),
        ];
        let v = RunTest.call(&args, &eval_ctx());
        assert!(v.get("statistic").as_number().unwrap().abs() < 1e-12);
    }
}
