//! Detection validation harness
//!
//! Replays a CSV of observed requests with their expected action through the
//! detector and counts how the detector's answers compare.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tb_compiler::{CompiledAction, CompiledRule, RuleEvaluator};
use tb_core::url::normalize_resource_url;
use tb_core::{Action, Detector, ResourceType};

/// One input row: `resource_url,page_url,resource_type,expected_action`.
#[derive(Debug, Deserialize)]
struct ValidationRow {
    resource_url: String,
    page_url: String,
    #[serde(default)]
    resource_type: String,
    expected_action: String,
}

/// A row whose classification did not match its expectation.
#[derive(Debug, Serialize)]
struct MismatchRow<'a> {
    resource_url: &'a str,
    page_url: &'a str,
    resource_type: &'a str,
    expected_action: &'a str,
    actual_action: &'a str,
    tracker: &'a str,
    reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationCounts {
    pub rows: usize,
    /// Undecodable rows and rows whose resource URL cannot be parsed
    pub bad_rows: usize,
    pub not_found: usize,
    pub incorrectly_ignored: usize,
    pub incorrectly_blocked: usize,
    pub bad_expected_action: usize,
    pub passed: usize,
    /// Rows where the compiled rule list decides differently than the detector
    pub compiled_disagreements: Option<usize>,
}

impl fmt::Display for ValidationCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Rows:                {}", self.rows)?;
        writeln!(f, "Bad rows:            {}", self.bad_rows)?;
        writeln!(f, "Tracker not found:   {}", self.not_found)?;
        writeln!(f, "Incorrectly ignored: {}", self.incorrectly_ignored)?;
        writeln!(f, "Incorrectly blocked: {}", self.incorrectly_blocked)?;
        writeln!(f, "Bad expected action: {}", self.bad_expected_action)?;
        write!(f, "Passed:              {}", self.passed)?;
        if let Some(disagreements) = self.compiled_disagreements {
            write!(f, "\nCompiled rules disagree: {disagreements}")?;
        }
        Ok(())
    }
}

fn parse_expected(action: &str) -> Option<Action> {
    match action.trim().to_ascii_lowercase().as_str() {
        "block" => Some(Action::Block),
        "ignore" => Some(Action::Ignore),
        _ => None,
    }
}

fn action_name(action: Option<Action>) -> &'static str {
    match action {
        Some(Action::Block) => "block",
        Some(Action::Ignore) => "ignore",
        None => "none",
    }
}

/// Run every row of `input` through `detector`.
///
/// With `rules`, each row is also evaluated against the compiled rule list.
/// With `mismatches`, rows that were not found or classified wrongly are
/// written to that CSV file.
pub fn run(
    detector: &Detector,
    input: &Path,
    rules: Option<&[CompiledRule]>,
    mismatches: Option<&Path>,
) -> Result<ValidationCounts, String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(input)
        .map_err(|e| format!("Failed to open '{}': {}", input.display(), e))?;

    let mut writer = match mismatches {
        Some(path) => Some(
            csv::Writer::from_path(path).map_err(|e| format!("Failed to create '{}': {}", path.display(), e))?,
        ),
        None => None,
    };

    let evaluator = rules.map(RuleEvaluator::new);
    let mut counts = ValidationCounts {
        compiled_disagreements: evaluator.as_ref().map(|_| 0),
        ..ValidationCounts::default()
    };

    for record in reader.deserialize::<ValidationRow>() {
        counts.rows += 1;
        let row = match record {
            Ok(row) => row,
            Err(e) => {
                log::debug!("Bad row: {}", e);
                counts.bad_rows += 1;
                continue;
            }
        };

        if normalize_resource_url(&row.resource_url).is_none() {
            log::debug!("Bad resource URL: {}", row.resource_url);
            counts.bad_rows += 1;
            continue;
        }

        let resource_type = ResourceType::from_descriptor_name(&row.resource_type);
        let classification = detector.classify(&row.resource_url, &row.page_url, resource_type);
        let actual = classification.as_ref().map(|c| c.action);

        if let (Some(evaluator), Some(disagreements)) = (&evaluator, counts.compiled_disagreements.as_mut()) {
            let compiled = evaluator
                .evaluate(&row.resource_url, &row.page_url, resource_type)
                .map(|action| match action {
                    CompiledAction::Block => Action::Block,
                    _ => Action::Ignore,
                });
            // A page-wide ignore rule (trusted site) also matches non-trackers
            let compiled = if actual.is_none() && compiled == Some(Action::Ignore) {
                None
            } else {
                compiled
            };
            if compiled != actual {
                *disagreements += 1;
            }
        }

        let Some(ref classification) = classification else {
            counts.not_found += 1;
            write_mismatch(&mut writer, &row, None, "", String::from("not_found"))?;
            continue;
        };

        let Some(expected) = parse_expected(&row.expected_action) else {
            counts.bad_expected_action += 1;
            continue;
        };

        if expected == classification.action {
            counts.passed += 1;
            continue;
        }

        match expected {
            Action::Block => counts.incorrectly_ignored += 1,
            Action::Ignore => counts.incorrectly_blocked += 1,
        }
        write_mismatch(
            &mut writer,
            &row,
            Some(classification.action),
            &classification.matched_tracker_domain,
            format!("{:?}", classification.reason),
        )?;
    }

    if let Some(ref mut writer) = writer {
        writer.flush().map_err(|e| format!("Failed to write mismatches: {e}"))?;
    }
    Ok(counts)
}

fn write_mismatch<W: std::io::Write>(
    writer: &mut Option<csv::Writer<W>>,
    row: &ValidationRow,
    actual: Option<Action>,
    tracker: &str,
    reason: String,
) -> Result<(), String> {
    let Some(writer) = writer else {
        return Ok(());
    };
    writer
        .serialize(MismatchRow {
            resource_url: &row.resource_url,
            page_url: &row.page_url,
            resource_type: &row.resource_type,
            expected_action: &row.expected_action,
            actual_action: action_name(actual),
            tracker,
            reason,
        })
        .map_err(|e| format!("Failed to write mismatch row: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Arc;
    use tb_compiler::{compile, CompileOptions};
    use tb_core::{Entity, KnownTracker, TrackerData, TrackerRule};

    fn data() -> TrackerData {
        TrackerData::build(
            vec![
                KnownTracker::new("t.example", Action::Block)
                    .with_owner("T Co")
                    .with_rule(TrackerRule::new("ok/", Action::Ignore)),
                KnownTracker::new("u.example", Action::Ignore),
            ],
            vec![Entity::new("T Co", ["t.example", "t-site.example"])],
        )
    }

    const INPUT: &str = "\
resource_url,page_url,resource_type,expected_action
https://t.example/x.js,https://news.example/,script,block
https://t.example/ok/x.js,https://news.example/,script,block
https://t.example/x.js,https://t-site.example/,script,ignore
https://u.example/x.js,https://news.example/,script,block
https://nobody.example/x.js,https://news.example/,script,block
https://t.example/x.js,https://news.example/,image,maybe
not a url,https://news.example/,script,block
https://t.example/x.js
";

    #[test]
    fn counts_every_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.csv");
        let mismatches = dir.path().join("mismatches.csv");
        fs::write(&input, INPUT).unwrap();

        let data = Arc::new(data());
        let rules = compile(&data, &CompileOptions::default());
        let detector = Detector::new(data);

        let counts = run(&detector, &input, Some(&rules), Some(&mismatches)).unwrap();
        assert_eq!(counts.rows, 8);
        assert_eq!(counts.bad_rows, 2);
        assert_eq!(counts.not_found, 1);
        assert_eq!(counts.incorrectly_ignored, 2);
        assert_eq!(counts.incorrectly_blocked, 0);
        assert_eq!(counts.bad_expected_action, 1);
        assert_eq!(counts.passed, 2);
        assert_eq!(counts.compiled_disagreements, Some(0));

        let written = fs::read_to_string(&mismatches).unwrap();
        // header + 1 not found + 2 incorrectly ignored
        assert_eq!(written.lines().count(), 4);
        assert!(written.contains("nobody.example"));
    }

    #[test]
    fn missing_input_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let detector = Detector::new(Arc::new(data()));
        assert!(run(&detector, &dir.path().join("nope.csv"), None, None).is_err());
    }
}
