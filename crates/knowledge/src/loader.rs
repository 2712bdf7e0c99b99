//! Document store loader.
//!
//! Turns a directory of per-category travel data files into normalized
//! [`Document`]s. Files are read in name order, records in file order. A
//! file that cannot be read as a whole fails the load; individual bad
//! records are skipped with a warning.

use crate::types::{Category, Document};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use wayfarer_core::{AppError, AppResult};

/// Supported data file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    JsonLines,
    Json,
    Markdown,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("csv") => Some(Self::Csv),
            Some("jsonl") | Some("ndjson") => Some(Self::JsonLines),
            Some("json") => Some(Self::Json),
            Some("md") | Some("markdown") => Some(Self::Markdown),
            _ => None,
        }
    }
}

/// Result of a load: the documents plus what was left out.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub documents: Vec<Document>,
    pub files: usize,
    pub skipped_records: usize,
    pub skipped_files: Vec<PathBuf>,
}

/// A record before id assignment.
#[derive(Debug)]
struct RawRecord {
    id: Option<u64>,
    text: String,
    source_label: String,
    category: Category,
}

/// One JSON Lines (or JSON array) record.
#[derive(Debug, Deserialize)]
struct JsonRecord {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    text: String,
    #[serde(default, alias = "source")]
    source_label: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default, alias = "title")]
    name: Option<String>,
}

/// Load every supported file under `data_dir`.
pub fn load_documents(data_dir: &Path) -> AppResult<LoadReport> {
    if !data_dir.is_dir() {
        return Err(AppError::Load(format!(
            "Data directory {:?} does not exist",
            data_dir
        )));
    }

    let files: Vec<PathBuf> = WalkDir::new(data_dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
        .filter_map(|e| match e {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::warn!("Skipping unreadable entry in {:?}: {}", data_dir, err);
                None
            }
        })
        .filter(|e| e.file_type().is_file() && SourceFormat::from_path(e.path()).is_some())
        .map(|e| e.into_path())
        .collect();

    tracing::debug!("Found {} data files in {:?}", files.len(), data_dir);
    load_files(&files)
}

/// Load an explicit list of files; each must exist.
pub fn load_files(paths: &[PathBuf]) -> AppResult<LoadReport> {
    let mut report = LoadReport::default();
    let mut records = Vec::new();

    for path in paths {
        if !path.is_file() {
            return Err(AppError::Load(format!("Data file {:?} does not exist", path)));
        }
        let Some(format) = SourceFormat::from_path(path) else {
            tracing::warn!("Skipping {:?}: unsupported file type", path);
            report.skipped_files.push(path.clone());
            continue;
        };

        let stem = file_stem(path);
        let Some(category) = Category::from_file_stem(&stem) else {
            tracing::warn!("Skipping {:?}: cannot infer a category from its name", path);
            report.skipped_files.push(path.clone());
            continue;
        };

        let content = fs::read_to_string(path)
            .map_err(|e| AppError::Load(format!("Failed to read {:?}: {}", path, e)))?;

        let before = records.len();
        let skipped = match format {
            SourceFormat::Csv => parse_csv(path, &stem, category, &content, &mut records)?,
            SourceFormat::JsonLines => parse_jsonl(path, &stem, category, &content, &mut records),
            SourceFormat::Json => parse_json(path, &stem, category, &content, &mut records)?,
            SourceFormat::Markdown => parse_markdown(&stem, category, &content, &mut records),
        };

        tracing::debug!(
            "Loaded {} records from {:?} ({} skipped)",
            records.len() - before,
            path,
            skipped
        );
        report.files += 1;
        report.skipped_records += skipped;
    }

    let (documents, duplicates) = assign_ids(records);
    report.skipped_records += duplicates;
    report.documents = documents;

    tracing::info!(
        documents = report.documents.len(),
        files = report.files,
        skipped_records = report.skipped_records,
        "Loaded travel documents"
    );
    Ok(report)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn is_label_column(name: &str) -> bool {
    matches!(name, "source_label" | "source")
}

/// Parse CSV rows; returns the number of skipped rows.
fn parse_csv(
    path: &Path,
    stem: &str,
    category: Category,
    content: &str,
    out: &mut Vec<RawRecord>,
) -> AppResult<usize> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| AppError::Load(format!("Malformed CSV header in {:?}: {}", path, e)))?
        .iter()
        .map(|h| h.to_string())
        .collect();
    if headers.iter().all(|h| h.is_empty()) {
        return Err(AppError::Load(format!("CSV file {:?} has no header", path)));
    }
    let lower: Vec<String> = headers.iter().map(|h| h.to_lowercase()).collect();
    let column = |names: &[&str]| lower.iter().position(|h| names.contains(&h.as_str()));
    let label_col = column(&["source_label", "source"]);
    let name_col = column(&["name", "title"]);
    let category_col = column(&["category"]);
    let id_col = column(&["id"]);

    let mut skipped = 0;
    for (row_index, row) in reader.records().enumerate() {
        let row_number = row_index + 1;
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                tracing::warn!("Skipping row {} of {:?}: {}", row_number, path, e);
                skipped += 1;
                continue;
            }
        };

        let field = |col: Option<usize>| {
            col.and_then(|i| row.get(i))
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let record_category = match field(category_col) {
            Some(name) => match Category::parse(&name) {
                Some(c) => c,
                None => {
                    tracing::warn!(
                        "Skipping row {} of {:?}: unknown category '{}'",
                        row_number,
                        path,
                        name
                    );
                    skipped += 1;
                    continue;
                }
            },
            None => category,
        };

        let text = headers
            .iter()
            .zip(lower.iter())
            .zip(row.iter())
            .filter(|((_, key), value)| {
                !value.is_empty() && !is_label_column(key) && *key != "id" && *key != "category"
            })
            .map(|((header, _), value)| format!("{}: {}", header, value))
            .collect::<Vec<_>>()
            .join("\n");

        if text.is_empty() {
            tracing::warn!("Skipping row {} of {:?}: no text", row_number, path);
            skipped += 1;
            continue;
        }

        let id = match field(id_col).map(|v| v.parse::<u64>()) {
            Some(Ok(id)) => Some(id),
            Some(Err(_)) => {
                tracing::warn!("Skipping row {} of {:?}: id is not a number", row_number, path);
                skipped += 1;
                continue;
            }
            None => None,
        };

        let source_label = field(label_col)
            .or_else(|| field(name_col).map(|name| format!("{}:{}", stem, name)))
            .unwrap_or_else(|| format!("{}:{}", stem, row_number));

        out.push(RawRecord {
            id,
            text,
            source_label,
            category: record_category,
        });
    }
    Ok(skipped)
}

/// Convert one JSON record; `None` means it was skipped (already logged).
fn json_record(
    record: JsonRecord,
    stem: &str,
    category: Category,
    position: usize,
    path: &Path,
) -> Option<RawRecord> {
    let text = record.text.trim().to_string();
    if text.is_empty() {
        tracing::warn!("Skipping record {} of {:?}: empty text", position, path);
        return None;
    }

    let category = match record.category.as_deref() {
        Some(name) => match Category::parse(name) {
            Some(c) => c,
            None => {
                tracing::warn!(
                    "Skipping record {} of {:?}: unknown category '{}'",
                    position,
                    path,
                    name
                );
                return None;
            }
        },
        None => category,
    };

    let source_label = record
        .source_label
        .filter(|l| !l.trim().is_empty())
        .or_else(|| record.name.map(|name| format!("{}:{}", stem, name)))
        .unwrap_or_else(|| format!("{}:{}", stem, position));

    Some(RawRecord {
        id: record.id,
        text,
        source_label,
        category,
    })
}

/// Parse JSON Lines; returns the number of skipped lines.
fn parse_jsonl(
    path: &Path,
    stem: &str,
    category: Category,
    content: &str,
    out: &mut Vec<RawRecord>,
) -> usize {
    let mut skipped = 0;
    for (index, line) in content.lines().enumerate() {
        let line_number = index + 1;
        if line.trim().is_empty() {
            continue;
        }
        let record: JsonRecord = match serde_json::from_str(line) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("Skipping line {} of {:?}: {}", line_number, path, e);
                skipped += 1;
                continue;
            }
        };
        match json_record(record, stem, category, line_number, path) {
            Some(raw) => out.push(raw),
            None => skipped += 1,
        }
    }
    skipped
}

/// Parse a JSON array of records; a non-array file fails the load.
fn parse_json(
    path: &Path,
    stem: &str,
    category: Category,
    content: &str,
    out: &mut Vec<RawRecord>,
) -> AppResult<usize> {
    let values: Vec<serde_json::Value> = serde_json::from_str(content).map_err(|e| {
        AppError::Load(format!("{:?} is not a JSON array of records: {}", path, e))
    })?;

    let mut skipped = 0;
    for (index, value) in values.into_iter().enumerate() {
        let position = index + 1;
        let record: JsonRecord = match serde_json::from_value(value) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("Skipping record {} of {:?}: {}", position, path, e);
                skipped += 1;
                continue;
            }
        };
        match json_record(record, stem, category, position, path) {
            Some(raw) => out.push(raw),
            None => skipped += 1,
        }
    }
    Ok(skipped)
}

/// Split markdown on `## ` headings; returns the number of empty sections skipped.
fn parse_markdown(stem: &str, category: Category, content: &str, out: &mut Vec<RawRecord>) -> usize {
    let mut sections: Vec<(Option<String>, String)> = vec![(None, String::new())];
    for line in content.lines() {
        if let Some(heading) = line.strip_prefix("## ") {
            sections.push((Some(heading.trim().to_string()), String::new()));
        } else if let Some((_, body)) = sections.last_mut() {
            body.push_str(line);
            body.push('\n');
        }
    }

    let mut skipped = 0;
    let has_sections = sections.len() > 1;
    for (heading, body) in sections {
        let body = body.trim();
        let text = match &heading {
            Some(h) if body.is_empty() => {
                tracing::warn!("Skipping empty section '{}' in {}", h, stem);
                skipped += 1;
                continue;
            }
            Some(h) => format!("{}\n{}", h, body),
            // Intro text before the first heading (or the whole file)
            None if body.is_empty() => {
                if !has_sections {
                    tracing::warn!("Skipping empty markdown file {}", stem);
                    skipped += 1;
                }
                continue;
            }
            None => body.to_string(),
        };

        let source_label = match heading {
            Some(h) => format!("{}#{}", stem, h),
            None => stem.to_string(),
        };
        out.push(RawRecord {
            id: None,
            text,
            source_label,
            category,
        });
    }
    skipped
}

/// Honor explicit ids (first occurrence wins), then number the rest from the
/// lowest free id upward. Returns the documents and the duplicate count.
fn assign_ids(records: Vec<RawRecord>) -> (Vec<Document>, usize) {
    let mut taken = BTreeSet::new();
    let mut keep = Vec::with_capacity(records.len());
    let mut duplicates = 0;

    for record in records {
        if let Some(id) = record.id {
            if !taken.insert(id) {
                tracing::warn!(
                    "Skipping record '{}': duplicate id {}",
                    record.source_label,
                    id
                );
                duplicates += 1;
                continue;
            }
        }
        keep.push(record);
    }

    let mut next = 1u64;
    let documents = keep
        .into_iter()
        .map(|record| {
            let id = match record.id {
                Some(id) => id,
                None => {
                    while taken.contains(&next) {
                        next += 1;
                    }
                    taken.insert(next);
                    next
                }
            };
            Document::new(id, record.text, record.source_label, record.category)
        })
        .collect();

    (documents, duplicates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_missing_directory_is_load_error() {
        let temp = TempDir::new().unwrap();
        let result = load_documents(&temp.path().join("nope"));
        assert!(matches!(result, Err(AppError::Load(_))));
    }

    #[test]
    fn test_missing_named_file_is_load_error() {
        let temp = TempDir::new().unwrap();
        let result = load_files(&[temp.path().join("hotels.csv")]);
        assert!(matches!(result, Err(AppError::Load(_))));
    }

    #[test]
    fn test_csv_rows_become_documents() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            "srilanka_hotels.csv",
            "name,location,price\nJetwing Lighthouse,Galle,$$$\nAmaya Hills,Kandy,$$\n",
        );

        let report = load_documents(temp.path()).unwrap();
        assert_eq!(report.documents.len(), 2);

        let first = &report.documents[0];
        assert_eq!(first.id, 1);
        assert_eq!(first.category, Category::Hotel);
        assert_eq!(first.source_label, "srilanka_hotels:Jetwing Lighthouse");
        assert_eq!(
            first.text,
            "name: Jetwing Lighthouse\nlocation: Galle\nprice: $$$"
        );
    }

    #[test]
    fn test_csv_source_column_and_row_labels() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            "weather.csv",
            "region,best_months,source\nSouth coast,Dec-Apr,met-dept\nEast coast,May-Sep,\n",
        );

        let report = load_documents(temp.path()).unwrap();
        assert_eq!(report.documents[0].source_label, "met-dept");
        assert_eq!(report.documents[1].source_label, "weather:2");
        assert!(!report.documents[0].text.contains("met-dept"));
    }

    #[test]
    fn test_malformed_records_are_skipped() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            "destinations.csv",
            "name,description\nEla,Hill country town\nBroken row,with,too,many\n",
        );
        write(
            temp.path(),
            "transport.jsonl",
            concat!(
                "{\"text\": \"Kandy to Ella train takes about 7 hours\", \"source_label\": \"rail-guide\"}\n",
                "not json\n",
                "{\"text\": \"\"}\n",
                "{\"text\": \"Tuk-tuks are everywhere\", \"category\": \"spaceships\"}\n",
            ),
        );

        let report = load_documents(temp.path()).unwrap();
        assert_eq!(report.documents.len(), 2);
        assert_eq!(report.skipped_records, 4);
        assert!(report.documents.iter().all(|d| !d.text.is_empty()));
    }

    #[test]
    fn test_uncategorised_file_is_skipped() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "notes.jsonl", "{\"text\": \"misc\"}\n");
        write(temp.path(), "readme.txt", "ignored entirely");

        let report = load_documents(temp.path()).unwrap();
        assert!(report.documents.is_empty());
        assert_eq!(report.skipped_files.len(), 1);
    }

    #[test]
    fn test_explicit_ids_and_first_free_assignment() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            "culture.jsonl",
            concat!(
                "{\"text\": \"Kandy Esala Perahera in July/August\", \"id\": 2}\n",
                "{\"text\": \"Vesak lanterns in May\"}\n",
                "{\"text\": \"Duplicate id\", \"id\": 2}\n",
                "{\"text\": \"Sinhala and Tamil New Year in April\"}\n",
            ),
        );

        let report = load_documents(temp.path()).unwrap();
        let ids: Vec<u64> = report.documents.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![2, 1, 3]);
        assert_eq!(report.skipped_records, 1);
    }

    #[test]
    fn test_jsonl_category_override_and_labels() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            "destinations.jsonl",
            "{\"text\": \"Yala National Park is best visited Feb–Jun\", \"source_label\": \"wildlife-guide\", \"category\": \"weather\"}\n{\"text\": \"Mirissa beach\", \"name\": \"Mirissa\"}\n",
        );

        let report = load_documents(temp.path()).unwrap();
        assert_eq!(report.documents[0].category, Category::Weather);
        assert_eq!(report.documents[0].source_label, "wildlife-guide");
        assert_eq!(report.documents[1].category, Category::Destination);
        assert_eq!(report.documents[1].source_label, "destinations:Mirissa");
    }

    #[test]
    fn test_markdown_sections() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            "restaurants.md",
            "# Where to eat\nIntro paragraph.\n\n## Ministry of Crab\nColombo seafood.\n\n## Empty\n\n## Upali's\nRice and curry.\n",
        );

        let report = load_documents(temp.path()).unwrap();
        let labels: Vec<&str> = report
            .documents
            .iter()
            .map(|d| d.source_label.as_str())
            .collect();
        assert_eq!(
            labels,
            vec![
                "restaurants",
                "restaurants#Ministry of Crab",
                "restaurants#Upali's"
            ]
        );
        assert_eq!(report.skipped_records, 1);
    }

    #[test]
    fn test_broken_json_array_fails_load() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "hotels.json", "{\"text\": \"not an array\"}");
        assert!(matches!(
            load_documents(temp.path()),
            Err(AppError::Load(_))
        ));
    }

    #[test]
    fn test_files_load_in_name_order() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "weather.jsonl", "{\"text\": \"Monsoon\"}\n");
        write(temp.path(), "culture.jsonl", "{\"text\": \"Perahera\"}\n");

        let report = load_documents(temp.path()).unwrap();
        assert_eq!(report.documents[0].category, Category::Culture);
        assert_eq!(report.documents[0].id, 1);
        assert_eq!(report.documents[1].category, Category::Weather);
    }
}
