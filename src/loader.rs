//! Directive text format for catalog data and framework bundles.
//!
//! The engine itself accepts triples through a narrow interface; this module
//! is the replaceable collaborator that turns the line-oriented authoring
//! format into staged assertions. All vocabulary and ownership validation
//! happens here, at load time; by the time inference starts, nothing can
//! fail.
//!
//! Data files:
//!
//! ```text
//! @container Hospital database
//! @container PatientInfo table Hospital
//! @container ssn field PatientInfo
//! @facet PatientInfo Healthcare Individual
//! @scope Research PatientInfo
//! @joinable PatientInfo PatientEncounters
//! @k AggregatedHealth 3
//! @sample AggregatedHealth zip age
//!   02139 34
//!   94110 61
//! ```
//!
//! Framework bundles open with `@framework <name>` and contain `@rule` and
//! `@kpolicy` blocks with indented keys.

use std::iter::Peekable;

use crate::error::{LoadError, ParajudicaResult};
use crate::kanon::TableSample;
use crate::rules::{
    Axis, Carries, ChildSelector, Condition, Framework, KPolicy, Rule, RuleBody, RuleTerm,
    TriplePattern,
};
use crate::term::{TermId, TermPool};
use crate::vocab::{ContainerKind, Vocab};

/// Staged assertions from one data file.
#[derive(Debug, Default)]
pub struct DataFile {
    pub containers: Vec<(TermId, ContainerKind, Option<TermId>)>,
    pub facets: Vec<(TermId, TermId)>,
    pub scope_members: Vec<(TermId, TermId)>,
    pub joinable: Vec<(TermId, TermId)>,
    pub declared_k: Vec<(TermId, u32)>,
    pub samples: Vec<(TermId, TableSample)>,
}

/// Parse a data file.
pub fn parse_data(
    text: &str,
    file: &str,
    pool: &TermPool,
    vocab: &Vocab,
) -> Result<DataFile, LoadError> {
    let mut out = DataFile::default();
    let mut lines = text.lines().enumerate().peekable();

    while let Some((idx, line)) = lines.next() {
        let lineno = idx + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut tokens = trimmed.split_whitespace();
        let directive = tokens.next().unwrap_or_default();
        let args: Vec<&str> = tokens.collect();

        match directive {
            "@container" => {
                if args.len() < 2 || args.len() > 3 {
                    return Err(syntax(file, lineno, "@container takes <name> <kind> [parent]"));
                }
                let kind = ContainerKind::from_label(args[1]).ok_or_else(|| {
                    LoadError::UnknownContainerKind {
                        file: file.into(),
                        line: lineno,
                        kind: args[1].into(),
                    }
                })?;
                let parent = args.get(2).map(|p| pool.intern(p));
                out.containers.push((pool.intern(args[0]), kind, parent));
            }
            "@facet" => {
                if args.len() < 2 {
                    return Err(syntax(file, lineno, "@facet takes <container> <facet>..."));
                }
                let container = pool.intern(args[0]);
                for facet in &args[1..] {
                    let term = pool.intern(facet);
                    if !vocab.is_facet(term) {
                        return Err(LoadError::UnknownFacet {
                            file: file.into(),
                            line: lineno,
                            facet: (*facet).into(),
                        });
                    }
                    out.facets.push((container, term));
                }
            }
            "@scope" => {
                if args.len() < 2 {
                    return Err(syntax(file, lineno, "@scope takes <scope> <container>..."));
                }
                let scope = pool.intern(args[0]);
                for container in &args[1..] {
                    out.scope_members.push((scope, pool.intern(container)));
                }
            }
            "@joinable" => {
                if args.len() != 2 {
                    return Err(syntax(file, lineno, "@joinable takes exactly two containers"));
                }
                out.joinable.push((pool.intern(args[0]), pool.intern(args[1])));
            }
            "@k" => {
                if args.len() != 2 {
                    return Err(syntax(file, lineno, "@k takes <table> <value>"));
                }
                let k: u32 = args[1]
                    .parse()
                    .map_err(|_| syntax(file, lineno, "@k value must be a non-negative integer"))?;
                out.declared_k.push((pool.intern(args[0]), k));
            }
            "@sample" => {
                if args.len() < 2 {
                    return Err(syntax(file, lineno, "@sample takes <table> <column>..."));
                }
                let table = pool.intern(args[0]);
                let columns: Vec<TermId> = args[1..].iter().map(|c| pool.intern(c)).collect();
                let rows = read_sample_rows(&mut lines, file, columns.len())?;
                out.samples.push((table, TableSample { columns, rows }));
            }
            other => {
                return Err(syntax(file, lineno, &format!("unknown directive `{other}`")));
            }
        }
    }
    Ok(out)
}

fn read_sample_rows<'a>(
    lines: &mut Peekable<impl Iterator<Item = (usize, &'a str)>>,
    file: &str,
    width: usize,
) -> Result<Vec<Vec<String>>, LoadError> {
    let mut rows = Vec::new();
    while let Some(&(idx, line)) = lines.peek() {
        if !line.starts_with([' ', '\t']) || line.trim().is_empty() {
            break;
        }
        lines.next();
        let values: Vec<String> = line.split_whitespace().map(String::from).collect();
        if values.len() != width {
            return Err(LoadError::SampleArity {
                file: file.into(),
                line: idx + 1,
                expected: width,
                got: values.len(),
            });
        }
        rows.push(values);
    }
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Framework bundles
// ---------------------------------------------------------------------------

/// Parse and validate a framework bundle.
pub fn parse_framework(
    text: &str,
    file: &str,
    pool: &TermPool,
    vocab: &Vocab,
) -> ParajudicaResult<Framework> {
    let mut framework: Option<Framework> = None;
    let mut lines = text.lines().enumerate().peekable();

    while let Some((idx, line)) = lines.next() {
        let lineno = idx + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        if let Some(rest) = trimmed.strip_prefix("@framework") {
            let name = rest.trim();
            if name.is_empty() {
                return Err(syntax(file, lineno, "@framework requires a name").into());
            }
            framework = Some(Framework::new(name));
        } else if let Some(rest) = trimmed.strip_prefix("@rule") {
            let fw = framework
                .as_mut()
                .ok_or_else(|| LoadError::MissingFramework { file: file.into() })?;
            let rule = parse_rule(rest, &mut lines, file, lineno, pool, vocab)?;
            fw.rules.push(rule);
        } else if trimmed.starts_with("@kpolicy") {
            let fw = framework
                .as_mut()
                .ok_or_else(|| LoadError::MissingFramework { file: file.into() })?;
            fw.k_policy = Some(parse_kpolicy(&mut lines, file, pool, vocab)?);
        } else {
            return Err(syntax(file, lineno, &format!("unknown directive `{trimmed}`")).into());
        }
    }

    let framework = framework.ok_or_else(|| LoadError::MissingFramework { file: file.into() })?;
    framework.validate(pool, vocab)?;
    Ok(framework)
}

fn parse_rule<'a>(
    header: &str,
    lines: &mut Peekable<impl Iterator<Item = (usize, &'a str)>>,
    file: &str,
    header_line: usize,
    pool: &TermPool,
    vocab: &Vocab,
) -> ParajudicaResult<Rule> {
    let parts: Vec<&str> = header.trim().split_whitespace().collect();
    if parts.len() != 2 {
        return Err(syntax(file, header_line, "@rule takes <name> <kind>").into());
    }
    let name = parts[0].to_string();
    let kind = parts[1];

    let mut body: Vec<TriplePattern> = Vec::new();
    let mut head: Vec<TriplePattern> = Vec::new();
    let mut condition: Option<Condition> = None;
    let mut term: Option<TermId> = None;
    let mut carries = Carries::Label;
    let mut axes: Vec<Axis> = Vec::new();

    while let Some(&(idx, line)) = lines.peek() {
        let entry = line.trim();
        if entry.is_empty() || entry.starts_with('@') {
            break;
        }
        lines.next();
        let lineno = idx + 1;

        if let Some(rest) = entry.strip_prefix("match:") {
            body = parse_pattern_list(rest, &name, file, lineno, pool, vocab)?;
        } else if let Some(rest) = entry.strip_prefix("produce:") {
            head = parse_pattern_list(rest, &name, file, lineno, pool, vocab)?;
        } else if let Some(rest) = entry.strip_prefix("where:") {
            condition = Some(parse_condition(rest, file, lineno, pool, vocab)?);
        } else if let Some(rest) = entry.strip_prefix("term:") {
            term = Some(pool.intern(rest.trim()));
        } else if let Some(rest) = entry.strip_prefix("carries:") {
            carries = match rest.trim() {
                "label" => Carries::Label,
                "facet" => Carries::Facet,
                other => {
                    return Err(syntax(
                        file,
                        lineno,
                        &format!("carries must be `label` or `facet`, got `{other}`"),
                    )
                    .into());
                }
            };
        } else if let Some(rest) = entry.strip_prefix("axes:") {
            for token in rest.split(',') {
                let axis = Axis::from_label(token).ok_or_else(|| LoadError::UnknownAxis {
                    file: file.into(),
                    line: lineno,
                    axis: token.trim().into(),
                })?;
                axes.push(axis);
            }
        }
        // Unknown keys are ignored, matching the data-format tolerance.
    }

    let rule_body = match kind {
        "Implication" => RuleBody::Implication { body, head },
        "ConditionalImplication" => {
            let condition = condition.ok_or_else(|| {
                syntax(file, header_line, "ConditionalImplication requires a `where:` line")
            })?;
            RuleBody::Conditional {
                body,
                condition,
                head,
            }
        }
        "Propagation" => {
            let term = term.ok_or_else(|| {
                syntax(file, header_line, "Propagation requires a `term:` line")
            })?;
            if axes.is_empty() {
                return Err(
                    syntax(file, header_line, "Propagation requires an `axes:` line").into(),
                );
            }
            RuleBody::Propagation {
                term,
                carries,
                axes,
            }
        }
        other => {
            return Err(LoadError::UnknownRuleKind {
                file: file.into(),
                line: header_line,
                kind: other.into(),
            }
            .into());
        }
    };

    Ok(Rule {
        name,
        body: rule_body,
    })
}

fn parse_pattern_list(
    rest: &str,
    rule: &str,
    file: &str,
    lineno: usize,
    pool: &TermPool,
    vocab: &Vocab,
) -> ParajudicaResult<Vec<TriplePattern>> {
    let mut patterns = Vec::new();
    for part in split_parenthesized(rest) {
        let pattern = TriplePattern::parse(part, pool, vocab).map_err(|e| {
            syntax(file, lineno, &format!("in rule `{rule}`: {e}"))
        })?;
        // A rule referencing an unknown facet is a configuration error now,
        // not a silently never-firing pattern at fixpoint time.
        if pattern.predicate == RuleTerm::Concrete(vocab.has_facet) {
            if let RuleTerm::Concrete(facet) = pattern.object {
                if !vocab.is_facet(facet) {
                    return Err(LoadError::UnknownFacet {
                        file: file.into(),
                        line: lineno,
                        facet: pool.text(facet),
                    }
                    .into());
                }
            }
        }
        patterns.push(pattern);
    }
    Ok(patterns)
}

/// Parse `some field of ?t hasFacet UniqueIdentifier` (or `some child of ...`).
fn parse_condition(
    rest: &str,
    file: &str,
    lineno: usize,
    pool: &TermPool,
    vocab: &Vocab,
) -> ParajudicaResult<Condition> {
    let tokens: Vec<&str> = rest.trim().split_whitespace().collect();
    let usage = "where: some <field|child> of ?var hasFacet <Facet>";
    if tokens.len() != 6 || tokens[0] != "some" || tokens[2] != "of" || tokens[4] != "hasFacet" {
        return Err(syntax(file, lineno, usage).into());
    }
    let selector = match tokens[1] {
        "field" => ChildSelector::FieldsOnly,
        "child" => ChildSelector::AnyChild,
        _ => return Err(syntax(file, lineno, usage).into()),
    };
    let var = tokens[3]
        .strip_prefix('?')
        .ok_or_else(|| syntax(file, lineno, usage))?;
    let facet = pool.intern(tokens[5]);
    if !vocab.is_facet(facet) {
        return Err(LoadError::UnknownFacet {
            file: file.into(),
            line: lineno,
            facet: tokens[5].into(),
        }
        .into());
    }
    Ok(Condition {
        container_var: var.to_string(),
        selector,
        facet,
    })
}

fn parse_kpolicy<'a>(
    lines: &mut Peekable<impl Iterator<Item = (usize, &'a str)>>,
    file: &str,
    pool: &TermPool,
    vocab: &Vocab,
) -> ParajudicaResult<KPolicy> {
    let mut threshold: Option<u32> = None;
    let mut risk: Option<TermId> = None;
    let mut accept: Option<TermId> = None;
    let mut singling_out: Option<TermId> = None;

    while let Some(&(idx, line)) = lines.peek() {
        let entry = line.trim();
        if entry.is_empty() || entry.starts_with('@') {
            break;
        }
        lines.next();
        let lineno = idx + 1;

        if let Some(rest) = entry.strip_prefix("threshold:") {
            threshold = Some(rest.trim().parse().map_err(|_| {
                syntax(file, lineno, "threshold must be a non-negative integer")
            })?);
        } else if let Some(rest) = entry.strip_prefix("risk:") {
            risk = Some(pool.intern(rest.trim()));
        } else if let Some(rest) = entry.strip_prefix("accept:") {
            accept = Some(pool.intern(rest.trim()));
        } else if let Some(rest) = entry.strip_prefix("singling-out:") {
            let facet = pool.intern(rest.trim());
            if !vocab.is_facet(facet) {
                return Err(LoadError::UnknownFacet {
                    file: file.into(),
                    line: lineno,
                    facet: rest.trim().into(),
                }
                .into());
            }
            singling_out = Some(facet);
        }
    }

    match (threshold, risk, accept) {
        (Some(threshold), Some(risk_label), Some(acceptance_label)) => Ok(KPolicy {
            threshold,
            risk_label,
            acceptance_label,
            singling_out_facet: singling_out,
        }),
        _ => Err(syntax(
            file,
            0,
            "@kpolicy requires `threshold:`, `risk:`, and `accept:` lines",
        )
        .into()),
    }
}

fn syntax(file: &str, line: usize, message: &str) -> LoadError {
    LoadError::Syntax {
        file: file.into(),
        line,
        message: message.into(),
    }
}

/// Split a comma-separated list of `(...)` groups.
fn split_parenthesized(s: &str) -> Vec<&str> {
    let s = s.trim();
    let mut results = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, ch) in s.char_indices() {
        match ch {
            '(' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            ')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    results.push(&s[start..=i]);
                }
            }
            _ => {}
        }
    }
    if results.is_empty() && !s.is_empty() {
        results.push(s);
    }
    results
}
