//! Facing-page LaTeX book: English on the left page, Arabic on the right.
//!
//! The Arabic comes from the OCR results file, the English from the
//! completed outputs of the translation directory. Pages are matched by id
//! and emitted in natural id order; a page missing on one side is emitted
//! with an empty counterpart. The document targets XeLaTeX with
//! `polyglossia` and the Amiri font.

use crate::combine::load_completed;
use crate::error::FolioError;
use crate::natural_sort::natural_cmp;
use crate::pipeline::persist;
use crate::pipeline::postprocess::clean_page;
use crate::pipeline::source::load_work_items;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::{info, warn};

/// Front-matter of the generated book.
#[derive(Debug, Clone)]
pub struct BookOptions {
    pub title: String,
    pub author: String,
    pub translator: String,
    /// Heading placed before the first page pair.
    pub chapter: Option<String>,
}

impl Default for BookOptions {
    fn default() -> Self {
        Self {
            title: "Facing-Page Translation".to_string(),
            author: "Unknown".to_string(),
            translator: "Machine translation".to_string(),
            chapter: None,
        }
    }
}

/// Escape the characters LaTeX treats specially in text mode.
pub fn escape_latex(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str(r"\&"),
            '%' => out.push_str(r"\%"),
            '$' => out.push_str(r"\$"),
            '#' => out.push_str(r"\#"),
            '_' => out.push_str(r"\_"),
            '{' => out.push_str(r"\{"),
            '}' => out.push_str(r"\}"),
            '~' => out.push_str(r"\textasciitilde{}"),
            '^' => out.push_str(r"\^{}"),
            '\\' => out.push_str(r"\textbackslash{}"),
            _ => out.push(c),
        }
    }
    out
}

static RE_FOOTNOTE_RULE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^_+$").unwrap());
static RE_FOOTNOTE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+) (.+)$").unwrap());
static RE_PAGE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").unwrap());
static RE_BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.+?)\*\*").unwrap());
static RE_ITALIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*(.+?)\*").unwrap());

/// Split off a trailing line holding only a page number.
///
/// A page made of nothing but a number is left alone.
fn split_page_number(text: &str) -> (&str, Option<&str>) {
    match text.rsplit_once('\n') {
        Some((body, last)) if RE_PAGE_NUMBER.is_match(last.trim()) => {
            (body.trim_end(), Some(last.trim()))
        }
        _ => (text, None),
    }
}

/// Shared line walk: footnotes, page number, and a per-line formatter.
fn typeset(
    text: &str,
    line: impl Fn(&str) -> String,
    footnote: impl Fn(&str) -> String,
    page_number: impl Fn(&str) -> String,
) -> String {
    let cleaned = clean_page(text);
    let (body, number) = split_page_number(&cleaned);

    let lines: Vec<&str> = body.lines().collect();
    let mut out = Vec::with_capacity(lines.len() + 1);
    let mut i = 0;
    while i < lines.len() {
        let current = lines[i];
        let note = lines
            .get(i + 1)
            .filter(|_| RE_FOOTNOTE_RULE.is_match(current.trim()))
            .and_then(|next| RE_FOOTNOTE.captures(next.trim()));
        match note {
            Some(caps) => {
                out.push(footnote(&caps[2]));
                i += 2;
            }
            None => {
                out.push(line(current));
                i += 1;
            }
        }
    }
    if let Some(n) = number {
        out.push(page_number(n));
    }
    out.join("\n")
}

/// Prepare one page of Arabic OCR output.
pub fn process_arabic_text(text: &str) -> String {
    typeset(
        text,
        escape_latex,
        |note| format!(r"\footnote{{\textarabic{{{}}}}}", escape_latex(note)),
        |n| format!(r"\arabicpagenumber{{{n}}}"),
    )
}

fn english_inline(text: &str) -> String {
    let escaped = escape_latex(text);
    let bold = RE_BOLD.replace_all(&escaped, r"\textbf{$1}");
    RE_ITALIC.replace_all(&bold, r"\textit{$1}").into_owned()
}

/// Prepare one page of English translation.
pub fn process_english_text(text: &str) -> String {
    typeset(
        text,
        |line| {
            if let Some(heading) = line.strip_prefix("## ") {
                format!(r"\subsection*{{{}}}", english_inline(heading))
            } else if let Some(heading) = line.strip_prefix("# ") {
                format!(r"\section*{{{}}}", english_inline(heading))
            } else {
                english_inline(line)
            }
        },
        |note| format!(r"\footnote{{{}}}", english_inline(note)),
        |n| format!(r"\pagenumber{{{n}}}"),
    )
}

fn preamble(options: &BookOptions) -> String {
    let title = escape_latex(&options.title);
    let author = escape_latex(&options.author);
    let translator = escape_latex(&options.translator);
    format!(
        r"\documentclass[12pt,twoside,openright]{{book}}
\usepackage[a4paper,margin=1in]{{geometry}}
\usepackage{{fontspec}}
\usepackage{{polyglossia}}
\usepackage{{fancyhdr}}
\usepackage{{microtype}}
\usepackage[hidelinks]{{hyperref}}

\setmainfont{{Times New Roman}}
\newfontfamily\arabicfont[Script=Arabic]{{Amiri}}
\setmainlanguage{{english}}
\setotherlanguage{{arabic}}

\pagestyle{{fancy}}
\fancyhf{{}}
\renewcommand{{\headrulewidth}}{{0pt}}
\fancyfoot[LE,RO]{{\thepage}}

\newcommand{{\arabicpagenumber}}[1]{{{{\centering\textarabic{{#1}}\par}}}}
\newcommand{{\pagenumber}}[1]{{{{\centering#1\par}}}}

\title{{{title}}}
\author{{{author}\\\medskip\large {translator}}}
\date{{\today}}

\begin{{document}}

\begin{{titlepage}}
\centering
{{\huge\textbf{{{title}}}\par}}
\vspace{{2cm}}
{{\Large {author}\par}}
\vspace{{1.5cm}}
{{\large {translator}\par}}
\vfill
{{\large\today\par}}
\end{{titlepage}}

\tableofcontents
"
    )
}

/// Assemble the whole document.
///
/// `arabic` and `english` are `(id, text)` pairs; ids present on only one
/// side still get a page pair.
pub fn build_book(
    arabic: &[(String, String)],
    english: &[(String, String)],
    options: &BookOptions,
) -> String {
    if arabic.len() != english.len() {
        warn!(
            "Number of Arabic pages ({}) does not match English pages ({})",
            arabic.len(),
            english.len()
        );
    }

    let arabic_by_id: HashMap<&str, &str> = arabic
        .iter()
        .map(|(id, t)| (id.as_str(), t.as_str()))
        .collect();
    let english_by_id: HashMap<&str, &str> = english
        .iter()
        .map(|(id, t)| (id.as_str(), t.as_str()))
        .collect();
    let mut ids: Vec<&str> = arabic_by_id
        .keys()
        .chain(english_by_id.keys())
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    ids.sort_by(|a, b| natural_cmp(a, b));

    let mut parts = vec![preamble(options)];
    if let Some(ref chapter) = options.chapter {
        parts.push(format!(r"\chapter*{{{}}}", escape_latex(chapter)));
    }

    for id in ids {
        let en = english_by_id.get(id).copied().unwrap_or_default();
        let ar = arabic_by_id.get(id).copied().unwrap_or_default();

        parts.push(r"\newpage".to_string());
        parts.push(r"\begin{english}".to_string());
        parts.push(process_english_text(en));
        parts.push(r"\end{english}".to_string());

        parts.push(r"\newpage".to_string());
        parts.push(r"\begin{arabic}".to_string());
        parts.push(format!(r"\textarabic{{{}}}", process_arabic_text(ar)));
        parts.push(r"\end{arabic}".to_string());
    }

    parts.push("\n\\end{document}\n".to_string());
    parts.join("\n")
}

/// Read both sides, build the document and write it to `output`.
pub async fn write_book(
    ocr_file: &Path,
    translations_dir: &Path,
    output: &Path,
    options: &BookOptions,
) -> Result<(), FolioError> {
    let arabic: Vec<(String, String)> = load_work_items(ocr_file)
        .await
        .into_iter()
        .map(|item| (item.id, item.text))
        .collect();
    if arabic.is_empty() {
        return Err(FolioError::NoWorkItems {
            path: ocr_file.to_path_buf(),
        });
    }

    let english = load_completed(translations_dir).await?;
    if english.is_empty() {
        return Err(FolioError::NoTranslations {
            path: translations_dir.to_path_buf(),
        });
    }

    let document = build_book(&arabic, &english, options);
    persist::write_atomic(output, document)
        .await
        .map_err(|source| FolioError::OutputWriteFailed {
            path: output.to_path_buf(),
            source,
        })?;

    info!(
        "Wrote {} ({} Arabic, {} English pages)",
        output.display(),
        arabic.len(),
        english.len()
    );
    info!("Compile twice with: xelatex {}", output.display());
    Ok(())
}
