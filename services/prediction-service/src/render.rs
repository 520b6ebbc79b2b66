//! Server-side HTML for the form and its optional views.

use std::fmt::Write;

use crate::categories::CategoryMapping;
use crate::config::OutputToggles;
use crate::error::Error;
use crate::history::LogEntry;
use crate::normalize::{derive_age_group, Column, InputRecord, MAX_AGE};
use crate::predict::{LogStatus, ServiceContext, Submission};
use crate::report::{format_metric, EvaluationReport};

pub const TITLE: &str = "Predictive Health Risk App";

pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

pub fn page(heading: &str, body: &str) -> String {
    format!(
        "<!doctype html>\n<html lang=\"en\"><head><meta charset=\"utf-8\"><title>{title}</title>\
<style>body{{font-family:sans-serif;max-width:46rem;margin:2rem auto}}.success{{color:#0a6b2d}}\
.info{{color:#1f4f8a}}.error{{color:#a31515}}table{{border-collapse:collapse}}td,th{{border:1px solid #ccc;padding:.25rem .5rem}}</style>\
</head><body><h1>{heading}</h1>\n{body}\n</body></html>",
        title = escape(TITLE),
        heading = escape(heading),
        body = body,
    )
}

fn nav(toggles: OutputToggles) -> String {
    let mut links = vec!["<a href=\"/\">Predict</a>"];
    if toggles.history {
        links.push("<a href=\"/history\">View past predictions</a>");
    }
    if toggles.evaluation_report {
        links.push("<a href=\"/performance\">Show model performance</a>");
    }
    if toggles.category_debug {
        links.push("<a href=\"/categories\">Category mappings</a>");
    }
    format!("<nav>{}</nav>", links.join(" | "))
}

fn select(name: &str, options: &[String], selected: Option<&str>) -> String {
    let mut out = format!("<select name=\"{name}\" id=\"{name}\">");
    for opt in options {
        let sel = if Some(opt.as_str()) == selected { " selected" } else { "" };
        let _ = write!(out, "<option value=\"{v}\"{sel}>{v}</option>", v = escape(opt));
    }
    out.push_str("</select>");
    out
}

/// The input form, pre-filled with the last submission when there is one.
pub fn form(ctx: &ServiceContext, prefill: Option<&InputRecord>) -> String {
    let cats = &ctx.artifact().categories;
    let age = prefill.map(|p| p.age).unwrap_or(30);
    let auto = prefill.map(InputRecord::is_derived).unwrap_or(true);
    let mut out = String::new();
    out.push_str(&nav(ctx.toggles()));
    out.push_str("<form method=\"post\" action=\"/predict\">");
    let _ = write!(
        out,
        "<p><label for=\"age\">Enter age</label> <input type=\"number\" name=\"age\" id=\"age\" min=\"0\" max=\"{MAX_AGE}\" step=\"1\" value=\"{age}\"></p>"
    );
    let _ = write!(out, "<p><label for=\"gender\">Gender</label> {}</p>", select("gender", &cats.options(Column::Gender), prefill.map(|p| p.gender.as_str())));
    let _ = write!(out, "<p><label for=\"location\">Location</label> {}</p>", select("location", &cats.options(Column::Location), prefill.map(|p| p.location.as_str())));
    let _ = write!(
        out,
        "<p><label><input type=\"checkbox\" name=\"auto_age_group\" value=\"on\"{}> Auto-derive Age Group from age</label></p>",
        if auto { " checked" } else { "" }
    );
    let group_sel = prefill.and_then(|p| p.age_group.as_deref());
    let _ = write!(out, "<p><label for=\"age_group\">Age group</label> {}</p>", select("age_group", &cats.options(Column::AgeGroup), group_sel));
    if ctx.toggles().log_predictions {
        out.push_str("<p><label><input type=\"checkbox\" name=\"log\" value=\"on\" checked> Log this prediction</label></p>");
    }
    let button = if ctx.exact_enabled() { "Predict Cause &amp; Group" } else { "Predict" };
    let _ = write!(out, "<p><button type=\"submit\">{button}</button></p></form>");
    out
}

pub fn submission(sub: &Submission, input: &InputRecord) -> String {
    let mut out = String::new();
    if input.is_derived() {
        let _ = write!(out, "<p class=\"info\">Derived age group: {}</p>", escape(derive_age_group(input.age).as_str()));
    }
    for msg in sub.result.messages() {
        let _ = write!(out, "<p class=\"success\">{}</p>", escape(&msg));
    }
    match &sub.log {
        LogStatus::Logged => out.push_str("<p class=\"info\">Prediction logged successfully!</p>"),
        LogStatus::Failed(e) => {
            let _ = write!(out, "<p class=\"error\">{}</p>", escape(e));
        }
        LogStatus::Skipped => {}
    }
    out
}

pub fn error(err: &Error) -> String {
    format!("<p class=\"error\">{}</p>", escape(&err.to_string()))
}

/// Shown on every route while the artifact cannot be used.
pub fn unavailable(err: &Error) -> String {
    page(TITLE, &error(err))
}

pub fn history(ctx: &ServiceContext, rows: Option<&[LogEntry]>) -> String {
    let mut out = nav(ctx.toggles());
    let rows = match rows {
        Some(r) if !r.is_empty() => r,
        _ => {
            out.push_str("<p class=\"info\">No predictions logged yet.</p>");
            return out;
        }
    };
    let columns = ctx.log().columns();
    out.push_str("<table><thead><tr>");
    for c in &columns {
        let _ = write!(out, "<th>{c}</th>");
    }
    out.push_str("</tr></thead><tbody>");
    for row in rows {
        let mut cells = vec![
            escape(&row.timestamp),
            row.age.to_string(),
            escape(&row.gender),
            escape(&row.location),
            escape(&row.age_group),
            escape(&row.cause_group),
        ];
        if columns.len() > cells.len() {
            cells.push(escape(row.cause_exact.as_deref().unwrap_or("")));
        }
        let _ = write!(out, "<tr><td>{}</td></tr>", cells.join("</td><td>"));
    }
    out.push_str("</tbody></table>");
    out
}

fn report_table(title: &str, report: &EvaluationReport) -> String {
    let columns = report.columns();
    let mut out = format!("<h3>{}</h3><table><thead><tr><th></th>", escape(title));
    for c in &columns {
        let _ = write!(out, "<th>{}</th>", c.name());
    }
    out.push_str("</tr></thead><tbody>");
    for (name, metrics) in report.class_rows() {
        let _ = write!(out, "<tr><th>{}</th>", escape(name));
        for c in &columns {
            let cell = metrics.get(*c).map(|v| format_metric(*c, v)).unwrap_or_default();
            let _ = write!(out, "<td>{cell}</td>");
        }
        out.push_str("</tr>");
    }
    out.push_str("</tbody></table>");
    for (name, value) in report.scalar_rows() {
        let _ = write!(out, "<p>{}: {value:.3}</p>", escape(name));
    }
    out
}

pub fn performance(ctx: &ServiceContext) -> String {
    let artifact = ctx.artifact();
    let mut out = nav(ctx.toggles());
    let mut any = false;
    if let Some(r) = &artifact.eval_group {
        out.push_str(&report_table("Group model performance", r));
        any = true;
    }
    if let (Some(r), true) = (&artifact.eval_exact, ctx.exact_enabled()) {
        out.push_str(&report_table("Exact cause model performance", r));
        any = true;
    }
    if !any {
        out.push_str("<p class=\"info\">No evaluation report is stored in the model artifact.</p>");
    }
    out
}

pub fn categories(ctx: &ServiceContext) -> String {
    let artifact = ctx.artifact();
    let mut out = nav(ctx.toggles());
    let _ = write!(
        out,
        "<p>Models consume {} inputs.</p>",
        if artifact.requires_encoding() { "integer-encoded" } else { "raw categorical" }
    );
    out.push_str("<table><thead><tr><th>column</th><th>mapping</th><th>values</th></tr></thead><tbody>");
    for (column, mapping) in artifact.categories.iter() {
        let (kind, values) = match mapping {
            CategoryMapping::Options(v) => ("options", v.iter().map(|s| escape(s)).collect::<Vec<_>>().join(", ")),
            CategoryMapping::Encoded(enc) => (
                "encoder",
                enc.classes().iter().enumerate().map(|(i, s)| format!("{i}={}", escape(s))).collect::<Vec<_>>().join(", "),
            ),
        };
        let _ = write!(out, "<tr><td>{column}</td><td>{kind}</td><td>{values}</td></tr>");
    }
    out.push_str("</tbody></table>");
    if let Some(labels) = artifact.group.labels() {
        let _ = write!(out, "<p>Cause group labels: {}</p>", escape(&labels.classes().join(", ")));
    }
    out
}
