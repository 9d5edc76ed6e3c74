//! Oracle backed by an external NKPL checker run as an OS command.
//!
//! Policy expressions are converted from the tracer's symbolic algebra
//! into NKPL, written into a temporary program file, and handed to the
//! checker (`<tool> run <file>`). A `Check passed` on stdout means the
//! formula holds, a `Check failed` on stderr means it does not;
//! anything else is undecided and fatal.

use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use dynet_common::symbols::{AND, ASSIGN, EQUIV, NOT_EQUIV, ONE, POLICY_PLACEHOLDER, STAR, ZERO};

use crate::{OracleError, PolicyOracle, Result};

const NKPL_FILE_EXT: &str = "nkpl";
const NKPL_ASSIGN: &str = "\u{2190}"; // ←
const NKPL_STAR: &str = "\u{22c6}"; // ⋆
const NKPL_FALSE: &str = "\u{22a5}"; // ⊥
const NKPL_TRUE: &str = "\u{22a4}"; // ⊤
const NKPL_AND: &str = "\u{22c5}"; // ⋅
const NKPL_EQUIV: &str = "\u{2261}"; // ≡
const NKPL_NOT_EQUIV: &str = "\u{2262}"; // ≢
const NKPL_CHECK: &str = "check";

static FIELD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[a-zA-Z_]\w*").unwrap());

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A [`PolicyOracle`] shelling out to an NKPL checker binary.
#[derive(Debug, Clone)]
pub struct NkplOracle {
    tool_path: PathBuf,
    output_dir: PathBuf,
}

impl NkplOracle {
    pub fn new(tool_path: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            tool_path: tool_path.into(),
            output_dir: output_dir.into(),
        }
    }

    /// Converts a symbolic policy formula into NKPL: operator symbols
    /// are mapped to their NKPL glyphs and every packet field gets the
    /// required `@` prefix.
    fn tool_format(&self, expr: &str) -> String {
        let expr = if expr.is_empty() { ZERO } else { expr };
        let expr = expr
            .replace(ASSIGN, NKPL_ASSIGN)
            .replace(STAR, NKPL_STAR)
            .replace(NOT_EQUIV, NKPL_NOT_EQUIV)
            .replace(EQUIV, NKPL_EQUIV)
            .replace(ZERO, NKPL_FALSE)
            .replace(ONE, NKPL_TRUE)
            .replace(AND, NKPL_AND)
            .replace('"', "");
        FIELD_RE.replace_all(&expr, "@$0").into_owned()
    }

    fn run_program(&self, program: &str) -> Result<(String, String)> {
        let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let file = self
            .output_dir
            .join(format!("_tmp{}_{n}.{NKPL_FILE_EXT}", std::process::id()));
        std::fs::write(&file, program)?;
        debug!(program, "running oracle check");

        let output = Command::new(&self.tool_path).arg("run").arg(&file).output();
        let _ = std::fs::remove_file(&file);
        let output = output?;

        Ok((
            String::from_utf8_lossy(&output.stdout).into_owned(),
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ))
    }

    fn check(&self, formula: &str) -> Result<bool> {
        let program = format!("{NKPL_CHECK} {formula}");
        let (stdout, stderr) = self.run_program(&program)?;
        if stdout.contains("Check passed") {
            return Ok(true);
        }
        if stderr.contains("Check failed") {
            return Ok(false);
        }
        Err(OracleError::Undecided {
            query: program,
            reason: if stderr.is_empty() { stdout } else { stderr },
        })
    }
}

impl PolicyOracle for NkplOracle {
    fn are_not_equivalent(&self, a: &str, b: &str) -> Result<bool> {
        let formula = format!(
            "{} {NKPL_NOT_EQUIV} {}",
            self.tool_format(a),
            self.tool_format(b)
        );
        self.check(&formula)
    }

    fn property_holds(&self, template: &str, policy: &str) -> Result<bool> {
        let substituted = template.replace(POLICY_PLACEHOLDER, &format!("({policy})"));
        let formula = self.tool_format(&substituted);
        self.check(&formula)
    }
}
