use grep::regex::RegexMatcher;
use grep::searcher::{Searcher, Sink, SinkMatch};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use walkdir::WalkDir;

// Source trees the hygiene rules apply to.
const SOURCE_DIRS: [&str; 4] = ["score", "cli", "tests", "benches"];

// What a rule looks for, and which matched lines it lets through.
#[derive(Clone, Copy)]
enum Rule {
    UnderscorePrefix,
    AllowDeadCode,
    ForbiddenCommentWord,
    AllCapsComment,
}

impl Rule {
    fn pattern(self) -> &'static str {
        match self {
            Rule::UnderscorePrefix => r"\b(_[a-zA-Z0-9_]+)\b",
            Rule::AllowDeadCode => r"#\s*\[\s*allow\s*\(\s*dead_code\s*\)\s*\]",
            Rule::ForbiddenCommentWord => {
                r"(//|/\*).*\b(?:FIXED|FIXES|FIX|CORRECTED|NEW|CHANGED|CHANGES|CHANGE|MODIFIED|MODIFY|UPDATED|UPDATES|UPDATE)\b"
            }
            Rule::AllCapsComment => r"(//|/\*).*",
        }
    }

    fn description(self) -> &'static str {
        match self {
            Rule::UnderscorePrefix => {
                "underscore-prefixed names. Either use the binding (without the underscore) or remove it"
            }
            Rule::AllowDeadCode => "#[allow(dead_code)] attributes. Use the code or delete it",
            Rule::ForbiddenCommentWord => {
                "comments narrating edits (FIX, NEW, CHANGE, UPDATE...). Describe the code, not its history"
            }
            Rule::AllCapsComment => "comments written entirely in capitals",
        }
    }

    fn is_violation(self, line: &str) -> bool {
        match self {
            Rule::UnderscorePrefix => !(is_comment(line) || underscore_only_in_strings(line)),
            Rule::AllowDeadCode | Rule::ForbiddenCommentWord => true,
            Rule::AllCapsComment => comment_text(line).is_some_and(|text| {
                let mut letters = text.chars().filter(|c| c.is_alphabetic()).peekable();
                letters.peek().is_some() && letters.all(char::is_uppercase)
            }),
        }
    }
}

// Collects the offending lines of one file.
struct ViolationCollector {
    rule: Rule,
    violations: Vec<String>,
    file_path: PathBuf,
}

impl ViolationCollector {
    fn new(rule: Rule, file_path: &Path) -> Self {
        Self {
            rule,
            violations: Vec::new(),
            file_path: file_path.to_path_buf(),
        }
    }

    fn check_and_get_error_message(&self) -> Option<String> {
        if self.violations.is_empty() {
            return None;
        }
        let mut error_msg = format!(
            "\n❌ ERROR: Found {} {} in {}:\n",
            self.violations.len(),
            self.rule.description(),
            self.file_path.display()
        );
        for violation in &self.violations {
            error_msg.push_str(&format!("   {violation}\n"));
        }
        Some(error_msg)
    }
}

impl Sink for ViolationCollector {
    type Error = std::io::Error;

    fn matched(&mut self, _: &Searcher, mat: &SinkMatch) -> Result<bool, Self::Error> {
        let line_number = mat.line_number().unwrap_or(0);
        let line_text = std::str::from_utf8(mat.bytes()).unwrap_or("").trim_end();
        if self.rule.is_violation(line_text) {
            self.violations.push(format!("{line_number}:{line_text}"));
        }
        Ok(true)
    }
}

fn is_comment(line: &str) -> bool {
    line.trim_start().starts_with("//")
}

// True when every underscore on the line sits between a pair of double quotes.
fn underscore_only_in_strings(line: &str) -> bool {
    line.contains('"')
        && line
            .split('"')
            .enumerate()
            .all(|(i, part)| i % 2 == 1 || !part.contains('_'))
}

fn comment_text(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    if let Some(rest) = trimmed.strip_prefix("///") {
        return Some(rest.trim());
    }
    if let Some(rest) = trimmed.strip_prefix("//!") {
        return Some(rest.trim());
    }
    if let Some(rest) = trimmed.strip_prefix("//") {
        return Some(rest.trim());
    }
    let start = line.find("/*")? + 2;
    let body = &line[start..];
    Some(body.find("*/").map_or(body, |end| &body[..end]).trim())
}

fn rust_sources() -> impl Iterator<Item = PathBuf> {
    SOURCE_DIRS.into_iter().flat_map(|dir| {
        WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
            .map(|e| e.into_path())
    })
}

fn scan(rule: Rule) -> Result<(), Box<dyn Error>> {
    let matcher = RegexMatcher::new_line_matcher(rule.pattern())?;
    let mut searcher = Searcher::new();
    for path in rust_sources() {
        let mut collector = ViolationCollector::new(rule, &path);
        searcher.search_path(&matcher, &path, &mut collector)?;
        if let Some(error_message) = collector.check_and_get_error_message() {
            return Err(error_message.into());
        }
    }
    Ok(())
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for dir in SOURCE_DIRS {
        println!("cargo:rerun-if-changed={dir}");
    }

    for rule in [
        Rule::UnderscorePrefix,
        Rule::AllowDeadCode,
        Rule::ForbiddenCommentWord,
        Rule::AllCapsComment,
    ] {
        if let Err(e) = scan(rule) {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    println!("cargo:rustc-env=RISKRANK_BUILD_TIMESTAMP={timestamp}");
}
