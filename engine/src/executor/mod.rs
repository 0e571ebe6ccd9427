//! Restricted snippet executor
//!
//! Runs one augmented snippet against an explicit, minimal environment: the
//! read-only active dataset (bound as `df`), the two side-channel slots, and
//! whatever locals the snippet creates itself. There is no ambient access —
//! no filesystem, no network, no orchestrator state — and the call returns
//! nothing; every observable result must be exported through a side-channel
//! trailer.
//!
//! The environment is a line-oriented interpreter for the generated-snippet
//! dialect. Anything outside the dialect is an [`ExecError`]; the turn
//! controller contains the error per snippet, so a failing snippet simply
//! contributes nothing to its side channel.

use crate::dataset::{Cell, Dataset};
use regex::Regex;
use sdk::errors::SessionError;
use std::collections::HashMap;
use uuid::Uuid;

/// Side-channel slot receiving figures
pub const FIGURES_CHANNEL: &str = "figures";

/// Side-channel slot receiving staged replacement datasets
pub const STAGED_FRAMES_CHANNEL: &str = "staged_frames";

/// The read-only active dataset binding
const ACTIVE_FRAME: &str = "df";

/// One recorded draw call on a figure
#[derive(Debug, Clone, PartialEq)]
pub struct DrawOp {
    /// The binding the call went through (`ax`, `plt`, ...)
    pub target: String,

    /// Method name
    pub method: String,

    /// Raw argument text, uninterpreted
    pub args: String,
}

/// A chart produced by an executed snippet
///
/// Opaque to the orchestrator beyond identity and draw-op count; rendering
/// belongs to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Figure {
    /// Figure identity
    pub id: Uuid,

    /// Draw calls in execution order
    pub ops: Vec<DrawOp>,
}

impl Figure {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            ops: Vec::new(),
        }
    }
}

/// Caller-owned output slots written by executed snippets
///
/// Cleared at the start of every attempt and read back immediately after
/// execution within the same attempt.
#[derive(Debug, Clone, Default)]
pub struct SideChannel {
    /// Figures exported by chart snippets
    pub figures: Vec<Figure>,

    /// Replacement datasets staged by mutation snippets
    pub staged_frames: Vec<Dataset>,
}

impl SideChannel {
    /// Create empty slots
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty both slots
    pub fn clear(&mut self) {
        self.figures.clear();
        self.staged_frames.clear();
    }
}

/// Errors raised while executing a snippet
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("Line {line}: unsupported statement: {text}")]
    UnsupportedStatement { line: usize, text: String },

    #[error("Unknown name: {0}")]
    UnknownName(String),

    #[error("{0} is read-only; deep copy it first")]
    ReadOnly(String),

    #[error("{0} is not a figure")]
    NotAFigure(String),

    #[error("{0} is not a dataset")]
    NotADataset(String),

    #[error("Unknown side channel: {0}")]
    UnknownChannel(String),

    #[error("Bad arguments for {method}: {detail}")]
    BadArguments { method: String, detail: String },

    #[error("Bad statement pattern: {0}")]
    Pattern(String),

    #[error(transparent)]
    Dataset(#[from] SessionError),
}

/// Run one augmented snippet
///
/// Synchronous; runs to completion or errors. `dataset` is never mutated —
/// a mutation snippet must deep-copy it into a staging local and export the
/// staged copy through the side channel.
pub fn execute(
    code: &str,
    dataset: &Dataset,
    channel: &mut SideChannel,
) -> Result<(), ExecError> {
    let mut interp = Interpreter::new(dataset, channel)?;
    for (index, line) in code.lines().enumerate() {
        interp.exec_line(index + 1, line)?;
    }
    Ok(())
}

/// Compiled statement patterns
struct Statements {
    subplots: Regex,
    deepcopy: Regex,
    copy: Regex,
    append: Regex,
    method: Regex,
}

impl Statements {
    fn new() -> Result<Self, ExecError> {
        let compile =
            |pattern: &str| Regex::new(pattern).map_err(|e| ExecError::Pattern(e.to_string()));
        Ok(Self {
            subplots: compile(r"^(\w+)\s*,\s*(\w+)\s*=\s*plt\.subplots\s*\(.*\)$")?,
            deepcopy: compile(r"^(\w+)\s*=\s*copy\.deepcopy\((\w+)\)$")?,
            copy: compile(r"^(\w+)\s*=\s*(\w+)\.copy\(\)$")?,
            append: compile(r"^(\w+)\.append\((\w+)\)$")?,
            method: compile(r"^(\w+)\.(\w+)\s*\((.*)\)$")?,
        })
    }
}

/// One parsed argument of a dataset method call
#[derive(Debug, Clone, PartialEq)]
enum Arg {
    Num(f64),
    Text(String),
}

struct Interpreter<'a> {
    dataset: &'a Dataset,
    channel: &'a mut SideChannel,
    statements: Statements,

    /// Dataset locals, each an isolated deep copy
    frames: HashMap<String, Dataset>,

    /// Figure scratch space; names alias into it so `fig` and `ax` from one
    /// subplots call record onto the same figure
    figures: Vec<Figure>,
    figure_names: HashMap<String, usize>,
}

impl<'a> Interpreter<'a> {
    fn new(dataset: &'a Dataset, channel: &'a mut SideChannel) -> Result<Self, ExecError> {
        Ok(Self {
            dataset,
            channel,
            statements: Statements::new()?,
            frames: HashMap::new(),
            figures: Vec::new(),
            figure_names: HashMap::new(),
        })
    }

    fn exec_line(&mut self, line_no: usize, raw: &str) -> Result<(), ExecError> {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(());
        }
        if line.starts_with("import ") || line.starts_with("from ") {
            return Ok(());
        }

        if let Some(caps) = self.statements.subplots.captures(line) {
            let index = self.figures.len();
            self.figures.push(Figure::new());
            self.bind_figure(caps[1].to_string(), index);
            self.bind_figure(caps[2].to_string(), index);
            return Ok(());
        }

        if let Some(caps) = self.statements.deepcopy.captures(line) {
            return self.copy_binding(&caps[1], &caps[2]);
        }
        if let Some(caps) = self.statements.copy.captures(line) {
            return self.copy_binding(&caps[1], &caps[2]);
        }

        if let Some(caps) = self.statements.append.captures(line) {
            return self.export(&caps[1], &caps[2]);
        }

        if let Some(caps) = self.statements.method.captures(line) {
            let (target, method, args) = (&caps[1], &caps[2], &caps[3]);
            return self.method_call(target, method, args);
        }

        Err(ExecError::UnsupportedStatement {
            line: line_no,
            text: line.to_string(),
        })
    }

    fn bind_figure(&mut self, name: String, index: usize) {
        self.frames.remove(&name);
        self.figure_names.insert(name, index);
    }

    fn bind_frame(&mut self, name: String, frame: Dataset) {
        self.figure_names.remove(&name);
        self.frames.insert(name, frame);
    }

    fn copy_binding(&mut self, target: &str, source: &str) -> Result<(), ExecError> {
        if source == ACTIVE_FRAME {
            self.bind_frame(target.to_string(), self.dataset.clone());
        } else if let Some(frame) = self.frames.get(source) {
            let copy = frame.clone();
            self.bind_frame(target.to_string(), copy);
        } else if let Some(&index) = self.figure_names.get(source) {
            let copy = self.figures[index].clone();
            let new_index = self.figures.len();
            self.figures.push(copy);
            self.bind_figure(target.to_string(), new_index);
        } else {
            return Err(ExecError::UnknownName(source.to_string()));
        }
        Ok(())
    }

    fn export(&mut self, channel_name: &str, source: &str) -> Result<(), ExecError> {
        match channel_name {
            FIGURES_CHANNEL => {
                let index = *self
                    .figure_names
                    .get(source)
                    .ok_or_else(|| ExecError::NotAFigure(source.to_string()))?;
                self.channel.figures.push(self.figures[index].clone());
                Ok(())
            }
            STAGED_FRAMES_CHANNEL => {
                let frame = self
                    .frames
                    .get(source)
                    .ok_or_else(|| ExecError::NotADataset(source.to_string()))?;
                self.channel.staged_frames.push(frame.clone());
                Ok(())
            }
            other => Err(ExecError::UnknownChannel(other.to_string())),
        }
    }

    fn method_call(&mut self, target: &str, method: &str, args: &str) -> Result<(), ExecError> {
        // Module-level plot calls attach to the most recent figure; a chart
        // snippet's style/layout calls may precede the subplots line.
        if target == "plt" {
            if let Some(figure) = self.figures.last_mut() {
                figure.ops.push(DrawOp {
                    target: target.to_string(),
                    method: method.to_string(),
                    args: args.to_string(),
                });
            }
            return Ok(());
        }

        if let Some(&index) = self.figure_names.get(target) {
            self.figures[index].ops.push(DrawOp {
                target: target.to_string(),
                method: method.to_string(),
                args: args.to_string(),
            });
            return Ok(());
        }

        if target == ACTIVE_FRAME {
            return Err(ExecError::ReadOnly(ACTIVE_FRAME.to_string()));
        }

        if self.frames.contains_key(target) {
            let args = parse_args(args).map_err(|detail| ExecError::BadArguments {
                method: method.to_string(),
                detail,
            })?;
            return self.frame_call(target, method, &args);
        }

        Err(ExecError::UnknownName(target.to_string()))
    }

    fn frame_call(&mut self, target: &str, method: &str, args: &[Arg]) -> Result<(), ExecError> {
        let frame = self
            .frames
            .get_mut(target)
            .ok_or_else(|| ExecError::UnknownName(target.to_string()))?;
        match method {
            "fillna" => {
                let column = arg_text(args, 0, method)?;
                let value = match args.get(1) {
                    Some(Arg::Num(n)) => Cell::Number(*n),
                    Some(Arg::Text(t)) => Cell::Text(t.clone()),
                    None => {
                        return Err(ExecError::BadArguments {
                            method: method.to_string(),
                            detail: "expected a fill value".to_string(),
                        })
                    }
                };
                frame.fill_na(&column, value)?;
            }
            "fillna_mean" => {
                let column = arg_text(args, 0, method)?;
                frame.fill_na_mean(&column)?;
            }
            "cap" => {
                let column = arg_text(args, 0, method)?;
                let lo = arg_num(args, 1, method)?;
                let hi = arg_num(args, 2, method)?;
                frame.cap(&column, lo, hi)?;
            }
            "drop_column" => {
                let column = arg_text(args, 0, method)?;
                frame.drop_column(&column)?;
            }
            "rename_column" => {
                let from = arg_text(args, 0, method)?;
                let to = arg_text(args, 1, method)?;
                frame.rename_column(&from, &to)?;
            }
            "set_value" => {
                let row = arg_num(args, 0, method)? as usize;
                let column = arg_text(args, 1, method)?;
                let value = match args.get(2) {
                    Some(Arg::Num(n)) => Cell::Number(*n),
                    Some(Arg::Text(t)) => Cell::Text(t.clone()),
                    None => {
                        return Err(ExecError::BadArguments {
                            method: method.to_string(),
                            detail: "expected a cell value".to_string(),
                        })
                    }
                };
                frame.set_value(row, &column, value)?;
            }
            other => {
                return Err(ExecError::BadArguments {
                    method: other.to_string(),
                    detail: "unknown dataset method".to_string(),
                })
            }
        }
        Ok(())
    }
}

/// Split a call's argument text into typed arguments
///
/// Supports quoted strings and bare numbers, comma-separated. Keyword
/// arguments and nesting are outside the dialect.
fn parse_args(raw: &str) -> Result<Vec<Arg>, String> {
    let mut args = Vec::new();
    for token in split_top_level(raw) {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        if (token.starts_with('"') && token.ends_with('"') && token.len() >= 2)
            || (token.starts_with('\'') && token.ends_with('\'') && token.len() >= 2)
        {
            args.push(Arg::Text(token[1..token.len() - 1].to_string()));
        } else if let Ok(value) = token.parse::<f64>() {
            args.push(Arg::Num(value));
        } else {
            return Err(format!("cannot parse argument: {token}"));
        }
    }
    Ok(args)
}

/// Split on commas that are outside quotes
fn split_top_level(raw: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    for ch in raw.chars() {
        match (ch, quote) {
            (q @ ('"' | '\''), None) => {
                quote = Some(q);
                current.push(ch);
            }
            (q, Some(open)) if q == open => {
                quote = None;
                current.push(ch);
            }
            (',', None) => {
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

fn arg_text(args: &[Arg], index: usize, method: &str) -> Result<String, ExecError> {
    match args.get(index) {
        Some(Arg::Text(t)) => Ok(t.clone()),
        _ => Err(ExecError::BadArguments {
            method: method.to_string(),
            detail: format!("argument {index} must be a quoted string"),
        }),
    }
}

fn arg_num(args: &[Arg], index: usize, method: &str) -> Result<f64, ExecError> {
    match args.get(index) {
        Some(Arg::Num(n)) => Ok(*n),
        _ => Err(ExecError::BadArguments {
            method: method.to_string(),
            detail: format!("argument {index} must be a number"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Column;

    fn sample() -> Dataset {
        Dataset::with_columns(vec![
            (
                "salary".to_string(),
                Column::numeric(vec![1.0, 2.0, f64::NAN, 1000.0]),
            ),
            ("team".to_string(), Column::texts(&["a", "b", "c", "d"])),
        ])
        .unwrap()
    }

    #[test]
    fn test_chart_snippet_exports_figure() {
        let dataset = sample();
        let mut channel = SideChannel::new();
        let code = "import matplotlib.pyplot as plt\n\
                    fig, ax = plt.subplots(figsize=(8, 8))\n\
                    ax.bar(\"team\", \"salary\")\n\
                    plt.tight_layout()\n\
                    ax.wrap_xticklabels(10)\n\
                    figures.append(fig)\n";
        execute(code, &dataset, &mut channel).unwrap();

        assert_eq!(channel.figures.len(), 1);
        let ops = &channel.figures[0].ops;
        assert_eq!(ops.len(), 3);
        assert_eq!(ops[0].method, "bar");
        assert_eq!(ops[1].method, "tight_layout");
        assert_eq!(ops[2].method, "wrap_xticklabels");
    }

    #[test]
    fn test_mutation_snippet_stages_copy() {
        let dataset = sample();
        let mut channel = SideChannel::new();
        let code = "import copy\n\
                    df_update = copy.deepcopy(df)\n\
                    df_update.fillna_mean(\"salary\")\n\
                    staged_frames.append(df_update)\n";
        execute(code, &dataset, &mut channel).unwrap();

        assert_eq!(channel.staged_frames.len(), 1);
        let staged = &channel.staged_frames[0];
        assert_eq!(staged.column("salary").unwrap().missing_count(), 0);
        // The active dataset is isolated from the staged copy.
        assert_eq!(dataset.column("salary").unwrap().missing_count(), 1);
    }

    #[test]
    fn test_copy_method_form() {
        let dataset = sample();
        let mut channel = SideChannel::new();
        let code = "df_update = df.copy()\n\
                    df_update.drop_column(\"team\")\n\
                    staged_frames.append(df_update)\n";
        execute(code, &dataset, &mut channel).unwrap();
        assert_eq!(channel.staged_frames[0].n_cols(), 1);
    }

    #[test]
    fn test_dataset_methods() {
        let dataset = sample();
        let mut channel = SideChannel::new();
        let code = "df_update = copy.deepcopy(df)\n\
                    df_update.fillna(\"salary\", 0)\n\
                    df_update.cap(\"salary\", 0, 100)\n\
                    df_update.rename_column(\"team\", \"group\")\n\
                    df_update.set_value(0, \"group\", 'x')\n\
                    staged_frames.append(df_update)\n";
        execute(code, &dataset, &mut channel).unwrap();

        let staged = &channel.staged_frames[0];
        assert!(staged.column("group").is_some());
        let Some(Column::Numeric(cells)) = staged.column("salary") else {
            panic!("expected numeric");
        };
        assert_eq!(cells[3], 100.0);
        assert_eq!(cells[2], 0.0);
    }

    #[test]
    fn test_active_frame_is_read_only() {
        let dataset = sample();
        let mut channel = SideChannel::new();
        let err = execute("df.fillna(\"salary\", 0)\n", &dataset, &mut channel).unwrap_err();
        assert!(matches!(err, ExecError::ReadOnly(_)));
    }

    #[test]
    fn test_unsupported_statement_leaves_channel_untouched() {
        let dataset = sample();
        let mut channel = SideChannel::new();
        let code = "df_update = copy.deepcopy(df)\n\
                    open('/etc/passwd')\n\
                    staged_frames.append(df_update)\n";
        let err = execute(code, &dataset, &mut channel).unwrap_err();
        assert!(matches!(err, ExecError::UnsupportedStatement { line: 2, .. }));
        assert!(channel.staged_frames.is_empty());
        assert!(channel.figures.is_empty());
    }

    #[test]
    fn test_unknown_source_in_deepcopy() {
        let dataset = sample();
        let mut channel = SideChannel::new();
        let err = execute("x = copy.deepcopy(ghost)\n", &dataset, &mut channel).unwrap_err();
        assert!(matches!(err, ExecError::UnknownName(name) if name == "ghost"));
    }

    #[test]
    fn test_append_type_mismatch() {
        let dataset = sample();
        let mut channel = SideChannel::new();
        let code = "df_update = copy.deepcopy(df)\nfigures.append(df_update)\n";
        let err = execute(code, &dataset, &mut channel).unwrap_err();
        assert!(matches!(err, ExecError::NotAFigure(_)));

        let code = "fig, ax = plt.subplots()\nstaged_frames.append(fig)\n";
        let err = execute(code, &dataset, &mut channel).unwrap_err();
        assert!(matches!(err, ExecError::NotADataset(_)));
    }

    #[test]
    fn test_unknown_channel() {
        let dataset = sample();
        let mut channel = SideChannel::new();
        let code = "fig, ax = plt.subplots()\nresults.append(fig)\n";
        let err = execute(code, &dataset, &mut channel).unwrap_err();
        assert!(matches!(err, ExecError::UnknownChannel(name) if name == "results"));
    }

    #[test]
    fn test_comments_imports_and_blanks_skipped() {
        let dataset = sample();
        let mut channel = SideChannel::new();
        let code = "# a comment\n\
                    \n\
                    import pandas as pd\n\
                    from copy import deepcopy\n";
        execute(code, &dataset, &mut channel).unwrap();
        assert!(channel.figures.is_empty());
    }

    #[test]
    fn test_plt_call_without_figure_is_noop() {
        let dataset = sample();
        let mut channel = SideChannel::new();
        execute("plt.tight_layout()\n", &dataset, &mut channel).unwrap();
        assert!(channel.figures.is_empty());
    }

    #[test]
    fn test_fig_and_ax_alias_one_figure() {
        let dataset = sample();
        let mut channel = SideChannel::new();
        let code = "fig, ax = plt.subplots(figsize=(8, 8))\n\
                    ax.set_title(\"salaries\")\n\
                    fig.suptitle(\"report\")\n\
                    figures.append(fig)\n";
        execute(code, &dataset, &mut channel).unwrap();
        assert_eq!(channel.figures.len(), 1);
        assert_eq!(channel.figures[0].ops.len(), 2);
    }

    #[test]
    fn test_bad_dataset_arguments() {
        let dataset = sample();
        let mut channel = SideChannel::new();
        let code = "df_update = copy.deepcopy(df)\ndf_update.fillna(salary, 0)\n";
        let err = execute(code, &dataset, &mut channel).unwrap_err();
        assert!(matches!(err, ExecError::BadArguments { .. }));
    }

    #[test]
    fn test_side_channel_clear() {
        let mut channel = SideChannel::new();
        channel.staged_frames.push(sample());
        channel.clear();
        assert!(channel.staged_frames.is_empty());
    }
}
