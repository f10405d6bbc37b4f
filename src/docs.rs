// Builds one markdown report out of every source's readme and code files,
// laid out as <root>/<language>/<source>/...

use std::fs;
use std::path::{Path, PathBuf};

use regex::{Captures, Regex};
use tracing::{info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::config::{DocsConfig, Language};
use crate::error::Result;

const TITLE: &str = "# Repository Codes Documentation\n";
const FENCE: &str = "```";

/// Deepens every markdown header by `increment` levels, leaving fenced code alone.
pub fn adjust_header_level(text: &str, increment: usize) -> String {
    lazy_static! {
        static ref RE_HEADER: Regex = Regex::new(r"(?m)^(#+)").unwrap();
    }

    let prefix = "#".repeat(increment);
    let mut adjusted = String::with_capacity(text.len() + 16);

    // parts alternate outside / inside a fence
    for (number, part) in text.split(FENCE).enumerate() {
        if number > 0 {
            adjusted.push_str(FENCE);
        }

        if number % 2 == 1 {
            adjusted.push_str(part);
        } else {
            let replaced = RE_HEADER.replace_all(part, |caps: &Captures| format!("{}{}", prefix, &caps[1]));
            adjusted.push_str(&replaced);
        }
    }

    adjusted
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Immediate children of `dir`, sorted by name.
fn children(dir: &Path) -> std::result::Result<Vec<DirEntry>, walkdir::Error> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by(|a, b| a.file_name().cmp(b.file_name()))
        .into_iter()
        .collect()
}

fn file_names(entries: &[DirEntry]) -> Vec<String> {
    entries
        .iter()
        .filter(|e| e.file_type().is_file())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect()
}

/// `<source>_readme.md`, then `readme.md`, then anything ending in `readme.md`.
fn pick_readme<'a>(source: &str, files: &'a [String]) -> Option<&'a String> {
    let specific = format!("{}_readme.md", source);

    files.iter().find(|f| **f == specific)
        .or_else(|| files.iter().find(|f| *f == "readme.md"))
        .or_else(|| files.iter().find(|f| f.to_lowercase().ends_with("readme.md")))
}

fn document_source(output: &mut Vec<String>, language: &Language, source: &str, path: &Path) {
    output.push(format!("## {}\n", source.to_uppercase()));

    let files = match children(path) {
        Ok(entries) => file_names(&entries),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to list source directory");
            return;
        }
    };

    if let Some(readme) = pick_readme(source, &files) {
        match fs::read_to_string(path.join(readme)) {
            Ok(content) => output.push(format!("{}\n", adjust_header_level(&content, 2))),
            Err(e) => {
                warn!(file = %readme, error = %e, "failed to read readme");
                output.push(format!("> Error reading readme file: {}\n", e));
            }
        }
    }

    for code_file in files.iter().filter(|f| f.ends_with(&language.extension)) {
        output.push(format!("### {}\n", code_file));

        match fs::read_to_string(path.join(code_file)) {
            Ok(content) => {
                output.push(format!("{}{}", FENCE, language.fence));
                output.push(content);
                output.push(format!("{}\n", FENCE));
            },
            Err(e) => {
                warn!(file = %code_file, error = %e, "failed to read code file");
                output.push(format!("> Error reading code file: {}\n", e));
            }
        }
    }
}

pub fn generate(config: &DocsConfig) -> String {
    let mut output = vec![TITLE.to_owned()];

    for language in &config.languages {
        let language_dir = config.root.join(&language.name);
        if !language_dir.is_dir() {
            warn!(directory = %language_dir.display(), "language directory not found");
            continue;
        }

        output.push(format!("# {}\n", capitalize(&language.name)));

        let sources = match children(&language_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(directory = %language_dir.display(), error = %e, "failed to list language directory");
                continue;
            }
        };

        for entry in sources.iter().filter(|e| e.file_type().is_dir()) {
            let source = entry.file_name().to_string_lossy();
            if source.starts_with('.') || source == "__pycache__" {
                continue;
            }

            document_source(&mut output, language, &source, entry.path());
        }
    }

    output.join("\n")
}

pub fn write(config: &DocsConfig) -> Result<PathBuf> {
    let report = generate(config);
    fs::write(&config.output, report)?;

    info!(output = %config.output.display(), "generated documentation");
    Ok(config.output.clone())
}

#[test]
fn test_adjust_header_level_skips_fences() {
    let text = "# Title\nSome text\n## Usage\n```python\n# a comment\n```\n### After\n";
    assert_eq!(
        adjust_header_level(text, 2),
        "### Title\nSome text\n#### Usage\n```python\n# a comment\n```\n##### After\n"
    );
}

#[test]
fn test_capitalize() {
    assert_eq!(capitalize("python"), "Python");
    assert_eq!(capitalize("R"), "R");
    assert_eq!(capitalize("mATLAB"), "Matlab");
}

#[test]
fn test_pick_readme() {
    let files: Vec<String> = vec!["README.md", "comext_readme.md", "readme.md"].into_iter().map(String::from).collect();
    assert_eq!(pick_readme("comext", &files).map(String::as_str), Some("comext_readme.md"));
    assert_eq!(pick_readme("ecb", &files).map(String::as_str), Some("readme.md"));

    let files = vec!["a.py".to_owned(), "Fred_README.md".to_owned()];
    assert_eq!(pick_readme("ecb", &files).map(String::as_str), Some("Fred_README.md"));
    assert_eq!(pick_readme("ecb", &files[..1]), None);
}

#[test]
fn test_generate() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    let comext = root.join("python").join("comext");
    fs::create_dir_all(&comext).unwrap();
    fs::write(comext.join("comext_readme.md"), "# COMEXT\nTrade data.").unwrap();
    fs::write(comext.join("comext_min.py"), "print('min')\n").unwrap();
    fs::write(comext.join("comext_example.py"), "print('example')\n").unwrap();
    fs::write(comext.join("notes.txt"), "ignored").unwrap();

    let cache = root.join("python").join("__pycache__");
    fs::create_dir_all(&cache).unwrap();
    fs::write(cache.join("cached.py"), "").unwrap();
    fs::create_dir_all(root.join("python").join(".hidden")).unwrap();

    let ecb = root.join("python").join("ecb");
    fs::create_dir_all(&ecb).unwrap();
    fs::write(ecb.join("ecb_min.py"), "pass\n").unwrap();

    let config = DocsConfig {
        root: root.to_path_buf(),
        output: root.join("repository_codes.md"),
        languages: vec![
            Language { name: "python".to_owned(), extension: ".py".to_owned(), fence: "python".to_owned() },
            Language { name: "stata".to_owned(), extension: ".do".to_owned(), fence: "stata".to_owned() },
        ],
    };

    let report = generate(&config);

    assert_eq!(
        report,
        [
            "# Repository Codes Documentation\n",
            "# Python\n",
            "## COMEXT\n",
            "### COMEXT\nTrade data.\n",
            "### comext_example.py\n",
            "```python",
            "print('example')\n",
            "```\n",
            "### comext_min.py\n",
            "```python",
            "print('min')\n",
            "```\n",
            "## ECB\n",
            "### ecb_min.py\n",
            "```python",
            "pass\n",
            "```\n",
        ].join("\n")
    );

    let written = write(&config).unwrap();
    assert_eq!(fs::read_to_string(written).unwrap(), report);
}
