use std::collections::BTreeMap;
use std::path::Path;

use super::{EvalRecord, ScoringMode};

#[derive(Debug, Clone, PartialEq)]
pub struct DomainStat {
    pub domain: String,
    /// Mean score (continuous) or pass rate (binary) over the domain's items.
    pub metric: f64,
    pub count: usize,
}

/// Aggregate over a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalSummary {
    pub mode: ScoringMode,
    pub min_score: f64,
    pub total: usize,
    pub passing: usize,
    pub failing: usize,
    pub mean_score: f64,
    pub accuracy: f64,
    pub domains: Vec<DomainStat>,
}

fn metric_for(mode: ScoringMode, scores: &[f64], min_score: f64) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let n = scores.len() as f64;
    match mode {
        ScoringMode::Continuous => scores.iter().sum::<f64>() / n,
        ScoringMode::Binary => scores.iter().filter(|s| **s >= min_score).count() as f64 / n,
    }
}

pub fn summarize(records: &[EvalRecord], min_score: f64, mode: ScoringMode) -> EvalSummary {
    let scores: Vec<f64> = records.iter().map(|r| r.score).collect();
    let passing = records.iter().filter(|r| r.passed(min_score)).count();

    let mut by_domain: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for r in records {
        by_domain.entry(r.domain.as_str()).or_default().push(r.score);
    }
    let domains = by_domain
        .into_iter()
        .map(|(domain, d_scores)| DomainStat {
            domain: domain.to_string(),
            metric: metric_for(mode, &d_scores, min_score),
            count: d_scores.len(),
        })
        .collect();

    EvalSummary {
        mode,
        min_score,
        total: records.len(),
        passing,
        failing: records.len() - passing,
        mean_score: metric_for(ScoringMode::Continuous, &scores, min_score),
        accuracy: metric_for(ScoringMode::Binary, &scores, min_score),
        domains,
    }
}

impl EvalSummary {
    /// The number the run is judged on: mean score or accuracy.
    pub fn aggregate(&self) -> f64 {
        match self.mode {
            ScoringMode::Continuous => self.mean_score,
            ScoringMode::Binary => self.accuracy,
        }
    }

    /// Continuous runs also require that no single item failed.
    pub fn passed(&self) -> bool {
        match self.mode {
            ScoringMode::Continuous => self.mean_score >= self.min_score && self.failing == 0,
            ScoringMode::Binary => self.accuracy >= self.min_score,
        }
    }

    pub fn exit_code(&self) -> i32 {
        if self.passed() {
            0
        } else {
            1
        }
    }

    /// Summary block printed at the end of a run.
    pub fn render(&self, records: &[EvalRecord], run_name: &str) -> String {
        let mut out = String::new();
        let rule = "=".repeat(60);
        out.push_str(&format!("{}\nEVALUATION SUMMARY\n{}\n", rule, rule));
        for r in records {
            out.push_str(&format!(
                "  [{}] {:.2} | [{}|{}] {}\n",
                status_label(r, self.min_score),
                r.score,
                r.domain,
                r.tipologia,
                truncate_chars(&r.query, 50)
            ));
        }
        out.push('\n');
        match self.mode {
            ScoringMode::Continuous => {
                out.push_str(&format!("Average score: {:.2}\n", self.mean_score))
            }
            ScoringMode::Binary => out.push_str(&format!("Accuracy: {:.2}\n", self.accuracy)),
        }
        out.push_str(&format!(
            "Passing: {}/{} (threshold: {})\n",
            self.passing, self.total, self.min_score
        ));
        out.push_str(&format!("Dataset run: {}\n", run_name));
        if !self.domains.is_empty() {
            out.push_str("\nPer-domain breakdown:\n");
            for d in &self.domains {
                out.push_str(&format!("  {}: {:.2} ({} items)\n", d.domain, d.metric, d.count));
            }
        }
        out
    }

    pub fn verdict_line(&self) -> String {
        if self.passed() {
            "RESULT: PASSED".to_string()
        } else {
            format!("RESULT: FAILED ({} items below threshold)", self.failing)
        }
    }
}

fn status_label(record: &EvalRecord, min_score: f64) -> &'static str {
    if record.passed(min_score) {
        "PASS"
    } else {
        "FAIL"
    }
}

/// First `max` characters, never splitting a multi-byte character.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

const CSV_LINE_END: &str = "\r\n";

fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn csv_row(fields: &[&str]) -> String {
    let mut line = fields
        .iter()
        .map(|f| escape_csv(f))
        .collect::<Vec<_>>()
        .join(",");
    line.push_str(CSV_LINE_END);
    line
}

/// One row per item, a blank line, then the summary row. Rows end with CRLF.
pub fn render_csv(records: &[EvalRecord], summary: &EvalSummary, run_name: &str) -> String {
    let mut csv = csv_row(&["query", "score", "result", "domain", "tipologia", "reasoning"]);
    for r in records {
        csv.push_str(&csv_row(&[
            &r.query,
            &format!("{:.2}", r.score),
            status_label(r, summary.min_score),
            &r.domain,
            &r.tipologia,
            &r.reasoning,
        ]));
    }
    csv.push_str(CSV_LINE_END);
    csv.push_str(&csv_row(&[
        "SUMMARY",
        &format!("{:.2}", summary.aggregate()),
        &format!("{}/{} passing", summary.passing, summary.total),
        "",
        "",
        run_name,
    ]));
    csv
}

pub fn write_csv(
    path: &Path,
    records: &[EvalRecord],
    summary: &EvalSummary,
    run_name: &str,
) -> std::io::Result<()> {
    std::fs::write(path, render_csv(records, summary, run_name))
}
