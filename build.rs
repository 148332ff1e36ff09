use grep::regex::RegexMatcher;
use grep::searcher::{Searcher, Sink, SinkMatch};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// Directories whose Rust sources are held to the project rules.
const SCANNED_DIRS: &[&str] = &["src", "tests", "benches"];

// A single source-level rule enforced on every scanned file.
struct Rule {
    name: &'static str,
    pattern: &'static str,
    advice: &'static str,
    // Extra per-line filter applied after the regex matches.
    applies: fn(&str) -> bool,
}

const RULES: &[Rule] = &[
    Rule {
        name: "#[allow(dead_code)] attributes",
        pattern: r"#\s*\[\s*allow\s*\(\s*dead_code\s*\)\s*\]",
        advice: "Remove unused code instead of silencing the compiler.",
        applies: is_code_line,
    },
    Rule {
        name: "#[ignore] test attributes",
        pattern: r"#\s*\[\s*ignore\s*\]",
        advice: "Tests must run; fix or delete the test instead of ignoring it.",
        applies: is_code_line,
    },
    Rule {
        name: "`let _ =` bindings",
        pattern: r"\blet\s+_\s*=",
        advice: "Handle the value (or its error) instead of discarding it.",
        applies: is_code_line,
    },
    Rule {
        name: "`**` emphasis in comments",
        pattern: r"//.*\*\*",
        advice: "Plain comments only; markdown emphasis belongs in doc comments.",
        applies: is_plain_comment,
    },
];

fn is_doc_comment(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("///") || trimmed.starts_with("//!")
}

fn is_code_line(line: &str) -> bool {
    !line.trim_start().starts_with("//")
}

fn is_plain_comment(line: &str) -> bool {
    !is_doc_comment(line)
}

// Collects the matching lines of one file for one rule.
struct RuleCollector<'r> {
    rule: &'r Rule,
    file_path: PathBuf,
    violations: Vec<String>,
}

impl<'r> RuleCollector<'r> {
    fn new(rule: &'r Rule, file_path: &Path) -> Self {
        Self {
            rule,
            file_path: file_path.to_path_buf(),
            violations: Vec::new(),
        }
    }

    fn check_and_get_error_message(&self) -> Option<String> {
        if self.violations.is_empty() {
            return None;
        }

        let file_name = self.file_path.to_str().unwrap_or("?");
        let mut error_msg = format!(
            "\n❌ ERROR: Found {} {} in {}:\n",
            self.violations.len(),
            self.rule.name,
            file_name
        );
        for violation in &self.violations {
            error_msg.push_str(&format!("   {violation}\n"));
        }
        error_msg.push_str(&format!("\n⚠️ {}\n", self.rule.advice));
        Some(error_msg)
    }
}

impl Sink for RuleCollector<'_> {
    type Error = std::io::Error;

    fn matched(&mut self, _: &Searcher, mat: &SinkMatch) -> Result<bool, Self::Error> {
        let line_number = mat.line_number().unwrap_or(0);
        let line_text = std::str::from_utf8(mat.bytes()).unwrap_or("").trim_end();
        if (self.rule.applies)(line_text) {
            self.violations.push(format!("{line_number}:{line_text}"));
        }
        Ok(true)
    }
}

fn rust_sources() -> Vec<PathBuf> {
    SCANNED_DIRS
        .iter()
        .flat_map(|dir| {
            WalkDir::new(dir)
                .into_iter()
                .filter_map(|e: Result<walkdir::DirEntry, walkdir::Error>| e.ok())
                .filter(|e: &walkdir::DirEntry| e.file_type().is_file())
                .filter(|e: &walkdir::DirEntry| e.path().extension().is_some_and(|ext| ext == "rs"))
                .map(|e: walkdir::DirEntry| e.into_path())
        })
        .collect()
}

fn scan_rule(rule: &Rule, files: &[PathBuf]) -> Vec<String> {
    let mut all_violations = Vec::new();
    let matcher = match RegexMatcher::new_line_matcher(rule.pattern) {
        Ok(matcher) => matcher,
        Err(e) => {
            all_violations.push(format!("Error creating matcher for {}: {}", rule.name, e));
            return all_violations;
        }
    };

    let mut searcher = Searcher::new();
    for path in files {
        let mut collector = RuleCollector::new(rule, path);
        if searcher.search_path(&matcher, path, &mut collector).is_err() {
            continue;
        }
        if let Some(error_message) = collector.check_and_get_error_message() {
            all_violations.push(error_message);
        }
    }
    all_violations
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for dir in SCANNED_DIRS {
        println!("cargo:rerun-if-changed={dir}");
    }
    println!("cargo:rerun-if-env-changed=BFGS_SKIP_LINT_CHECKS");

    if std::env::var("BFGS_SKIP_LINT_CHECKS").is_ok() || std::env::var("DOCS_RS").is_ok() {
        return;
    }

    let files = rust_sources();
    let all_violations: Vec<String> = RULES
        .iter()
        .flat_map(|rule| scan_rule(rule, &files))
        .collect();

    if !all_violations.is_empty() {
        eprintln!("\n❌ VALIDATION ERRORS");
        eprintln!("====================");
        let violation_count = all_violations.len();
        for violation in all_violations {
            eprintln!("{violation}");
            eprintln!("--------------------");
        }
        eprintln!(
            "\n⚠️ Found {} total code quality violations. Fix all issues before committing.",
            violation_count
        );
        std::process::exit(1);
    }
}
