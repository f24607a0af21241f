//! Input document loading: YAML → data model.
//!
//! A document holds exactly one of `testcase` or `testsuite`. Suite case
//! references are paths resolved relative to the suite file, or inline
//! case definitions.

use crate::model::{CaseRef, ParallelConfig, Step, TestCase, TestSuite};
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(default)]
    testcase: Option<TestCase>,
    #[serde(default)]
    testsuite: Option<TestSuite>,
}

#[derive(Debug)]
pub enum Document {
    Case(TestCase),
    Suite(TestSuite),
}

/// A suite with every case reference resolved, ready for the runner.
#[derive(Debug)]
pub struct LoadedSuite {
    pub name: String,
    pub cases: Vec<TestCase>,
    pub parallel: ParallelConfig,
}

pub fn load_document(path: &Path) -> Result<Document> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("could not read {}", path.display()))?;
    parse_document(&text).with_context(|| format!("in {}", path.display()))
}

pub fn parse_document(text: &str) -> Result<Document> {
    let raw: RawDocument = serde_yaml::from_str(text).context("malformed YAML document")?;
    match (raw.testcase, raw.testsuite) {
        (Some(case), None) => {
            validate_case(&case)?;
            Ok(Document::Case(case))
        }
        (None, Some(suite)) => Ok(Document::Suite(suite)),
        (Some(_), Some(_)) => bail!("document has both 'testcase' and 'testsuite'"),
        (None, None) => bail!("document has neither 'testcase' nor 'testsuite'"),
    }
}

/// Resolve a suite's case references. Paths are read relative to
/// `base_dir`; referenced documents must themselves be cases (suites do
/// not nest).
pub fn resolve_suite(suite: TestSuite, base_dir: &Path) -> Result<LoadedSuite> {
    let mut cases = Vec::with_capacity(suite.testcases.len());
    for reference in suite.testcases {
        match reference {
            CaseRef::Inline(case) => {
                validate_case(&case)?;
                cases.push(case);
            }
            CaseRef::Path(raw_path) => {
                let path = base_dir.join(&raw_path);
                match load_document(&path)? {
                    Document::Case(case) => cases.push(case),
                    Document::Suite(_) => {
                        bail!("{raw_path}: suites cannot reference other suites")
                    }
                }
            }
        }
    }
    Ok(LoadedSuite {
        name: suite.name,
        cases,
        parallel: suite.parallel.unwrap_or_default(),
    })
}

fn validate_case(case: &TestCase) -> Result<()> {
    if case.name.is_empty() {
        bail!("testcase has no name");
    }
    for step in &case.steps {
        validate_step(&case.name, step)?;
    }
    Ok(())
}

fn validate_step(case_name: &str, step: &Step) -> Result<()> {
    if step.name.is_empty() {
        bail!("case '{case_name}' has a step without a name");
    }
    let control_keys = [
        step.if_cond.is_some(),
        step.for_source.is_some(),
        step.while_cond.is_some(),
    ]
    .iter()
    .filter(|present| **present)
    .count();
    if control_keys > 1 {
        bail!(
            "step '{}' mixes control-flow keys; use one of if, for, while",
            step.name
        );
    }
    if control_keys == 0 && step.action.is_empty() {
        bail!("step '{}' has neither an action nor a control-flow key", step.name);
    }
    if step.if_cond.is_some() && !step.body.is_empty() {
        bail!("step '{}': 'if' takes 'then', not 'do'", step.name);
    }
    if (step.for_source.is_some() || step.while_cond.is_some()) && !step.then.is_empty() {
        bail!("step '{}': loops take 'do', not 'then'", step.name);
    }
    for nested in step.then.iter().chain(step.body.iter()) {
        validate_step(case_name, nested)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    const CASE_DOC: &str = r#"
testcase:
  name: login flow
  description: exercise the login endpoint
  variables:
    user: ada
  steps:
    - name: bind
      action: variable
      args: ["n", 7]
    - name: check
      action: assert
      args: ["${n}", ">", "5"]
      timeout: 2s
"#;

    #[test]
    fn parses_a_case_document() {
        let Document::Case(case) = parse_document(CASE_DOC).unwrap() else {
            panic!("expected a case");
        };
        assert_eq!(case.name, "login flow");
        assert_eq!(case.steps.len(), 2);
        assert_eq!(case.variables["user"], Value::String("ada".into()));
        assert_eq!(case.steps[0].args, vec![Value::String("n".into()), Value::Int(7)]);
    }

    #[test]
    fn rejects_document_with_both_keys() {
        let doc = r#"
testcase:
  name: a
  steps: []
testsuite:
  name: b
  testcases: []
"#;
        assert!(parse_document(doc).unwrap_err().to_string().contains("both"));
    }

    #[test]
    fn rejects_empty_document() {
        assert!(parse_document("{}").is_err());
    }

    #[test]
    fn rejects_step_without_action_or_control() {
        let doc = r#"
testcase:
  name: bad
  steps:
    - name: confused
"#;
        assert!(parse_document(doc).is_err());
    }

    #[test]
    fn rejects_mixed_control_keys() {
        let doc = r#"
testcase:
  name: bad
  steps:
    - name: confused
      if: "1 == 1"
      while: "1 == 1"
"#;
        let err = parse_document(doc).unwrap_err().to_string();
        assert!(err.contains("control-flow"), "{err}");
    }

    #[test]
    fn parses_suite_with_inline_and_path_refs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("other.yaml"),
            "testcase:\n  name: referenced\n  steps:\n    - name: ok\n      action: log\n      args: [hi]\n",
        )
        .unwrap();

        let suite_doc = r#"
testsuite:
  name: nightly
  parallel:
    enabled: true
    max_concurrency: 2
  testcases:
    - other.yaml
    - name: inline case
      steps:
        - name: ok
          action: log
          args: [hello]
"#;
        let Document::Suite(suite) = parse_document(suite_doc).unwrap() else {
            panic!("expected a suite");
        };
        let loaded = resolve_suite(suite, dir.path()).unwrap();
        assert_eq!(loaded.name, "nightly");
        assert_eq!(loaded.cases.len(), 2);
        assert_eq!(loaded.cases[0].name, "referenced");
        assert_eq!(loaded.cases[1].name, "inline case");
        assert!(loaded.parallel.enabled);
        assert_eq!(loaded.parallel.max_concurrency, 2);
    }

    #[test]
    fn suite_cannot_reference_a_suite() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("inner.yaml"),
            "testsuite:\n  name: inner\n  testcases: []\n",
        )
        .unwrap();
        let suite = TestSuite {
            name: "outer".into(),
            testcases: vec![CaseRef::Path("inner.yaml".into())],
            parallel: None,
        };
        assert!(resolve_suite(suite, dir.path()).is_err());
    }

    #[test]
    fn control_flow_document_roundtrip() {
        let doc = r#"
testcase:
  name: loops
  steps:
    - name: counted
      for: "1..3"
      do:
        - name: remember
          action: variable
          args: ["last", "${iteration}"]
"#;
        let Document::Case(case) = parse_document(doc).unwrap() else {
            panic!("expected a case");
        };
        assert!(case.steps[0].for_source.is_some());
        assert_eq!(case.steps[0].body.len(), 1);
    }
}
