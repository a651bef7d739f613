//! PDFMark side file generation for document info and bookmarks.

use crate::models::{Bookmark, BookmarkParams, DocInfoParams};
use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fmt::Write as _;
use std::fs;

/// Escape text for a PostScript string literal.
///
/// Backslash and parentheses are escaped; bytes outside printable ASCII are
/// written as three-digit octal escapes.
pub fn escape_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for byte in text.bytes() {
        match byte {
            b'\\' | b'(' | b')' => {
                out.push('\\');
                out.push(byte as char);
            }
            0x20..=0x7e => out.push(byte as char),
            _ => {
                let _ = write!(out, "\\{:03o}", byte);
            }
        }
    }
    out
}

/// The `/DOCINFO` mark, or `None` when every field is empty.
pub fn docinfo_mark(docinfo: &DocInfoParams) -> Option<String> {
    if docinfo.is_empty() {
        return None;
    }

    let mut mark = String::from("[");
    for (key, value) in [
        ("Title", &docinfo.title),
        ("Author", &docinfo.author),
        ("Subject", &docinfo.subject),
        ("Keywords", &docinfo.keywords),
    ] {
        if !value.is_empty() {
            let _ = write!(mark, " /{} ({})", key, escape_string(value));
        }
    }
    mark.push_str(" /DOCINFO pdfmark");

    Some(mark)
}

/// Bookmark levels with jumps clamped, so no entry sits more than one level
/// below the entry before it. The first entry is always at level 0.
fn effective_levels(entries: &[Bookmark]) -> Vec<u32> {
    let mut levels = Vec::with_capacity(entries.len());
    let mut previous: Option<u32> = None;
    for bookmark in entries {
        let level = match previous {
            None => 0,
            Some(prev) => bookmark.level.min(prev + 1),
        };
        levels.push(level);
        previous = Some(level);
    }
    levels
}

/// Number of direct children of the bookmark at `index`.
fn child_count(levels: &[u32], index: usize) -> usize {
    let level = levels[index];
    levels[index + 1..]
        .iter()
        .take_while(|&&l| l > level)
        .filter(|&&l| l == level + 1)
        .count()
}

/// One `/OUT` mark per bookmark, in document order.
pub fn outline_marks(bookmarks: &BookmarkParams) -> Vec<String> {
    let entries = &bookmarks.entries;
    let levels = effective_levels(entries);

    (0..entries.len())
        .map(|index| {
            let bookmark = &entries[index];
            let mut mark = String::from("[");

            let children = child_count(&levels, index) as i64;
            if children > 0 {
                let count = if bookmark.expanded { children } else { -children };
                let _ = write!(mark, " /Count {}", count);
            }

            let _ = write!(
                mark,
                " /Page {} /Title ({}) /OUT pdfmark",
                bookmark.page.max(1),
                escape_string(&bookmark.title)
            );
            mark
        })
        .collect()
}

/// Write the side file if there is anything to put in it.
///
/// # Returns
/// `true` if the file was written, `false` if there was no content
pub fn write_side_file(
    path: &Utf8Path,
    docinfo: &DocInfoParams,
    bookmarks: &BookmarkParams,
) -> Result<bool> {
    let mut lines = Vec::new();
    if let Some(mark) = docinfo_mark(docinfo) {
        lines.push(mark);
    }
    lines.extend(outline_marks(bookmarks));

    if lines.is_empty() {
        return Ok(false);
    }

    let mut content = lines.join("\n");
    content.push('\n');

    fs::write(path, content)
        .with_context(|| format!("Failed to write PDFMark file: {}", path))?;

    tracing::debug!("Wrote {} PDFMark entries to {}", lines.len(), path);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;

    fn bookmark(title: &str, page: u32, level: u32, expanded: bool) -> Bookmark {
        Bookmark {
            title: title.to_string(),
            page,
            level,
            expanded,
        }
    }

    #[test]
    fn test_escape_string() {
        assert_eq!(escape_string("plain"), "plain");
        assert_eq!(escape_string("a (b) c\\d"), "a \\(b\\) c\\\\d");
        assert_eq!(escape_string("é"), "\\303\\251");
    }

    #[test]
    fn test_docinfo_mark() {
        assert!(docinfo_mark(&DocInfoParams::default()).is_none());

        let docinfo = DocInfoParams {
            title: "Annual (draft)".to_string(),
            author: "Finance".to_string(),
            ..Default::default()
        };
        assert_eq!(
            docinfo_mark(&docinfo).unwrap(),
            "[ /Title (Annual \\(draft\\)) /Author (Finance) /DOCINFO pdfmark"
        );
    }

    #[test]
    fn test_outline_counts() {
        let bookmarks = BookmarkParams {
            entries: vec![
                bookmark("Part 1", 1, 0, true),
                bookmark("Chapter 1", 2, 1, false),
                bookmark("Section 1.1", 3, 2, false),
                bookmark("Chapter 2", 5, 1, false),
                bookmark("Part 2", 9, 0, false),
                bookmark("Chapter 3", 10, 1, false),
            ],
        };

        let marks = outline_marks(&bookmarks);
        assert_eq!(marks.len(), 6);
        assert_eq!(marks[0], "[ /Count 2 /Page 1 /Title (Part 1) /OUT pdfmark");
        assert_eq!(marks[1], "[ /Count -1 /Page 2 /Title (Chapter 1) /OUT pdfmark");
        assert_eq!(marks[2], "[ /Page 3 /Title (Section 1.1) /OUT pdfmark");
        assert_eq!(marks[4], "[ /Count -1 /Page 9 /Title (Part 2) /OUT pdfmark");
    }

    #[test]
    fn test_outline_level_jump_nests_under_parent() {
        let bookmarks = BookmarkParams {
            entries: vec![
                bookmark("Part 1", 1, 0, true),
                bookmark("Deep", 2, 2, true),
                bookmark("Sibling", 3, 1, true),
                bookmark("Part 2", 4, 0, true),
            ],
        };

        let marks = outline_marks(&bookmarks);
        assert_eq!(marks[0], "[ /Count 2 /Page 1 /Title (Part 1) /OUT pdfmark");
        assert_eq!(marks[1], "[ /Page 2 /Title (Deep) /OUT pdfmark");
        assert_eq!(marks[3], "[ /Page 4 /Title (Part 2) /OUT pdfmark");
    }

    #[test]
    fn test_side_file_skipped_when_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(dir.path().join("marks")).unwrap();

        let written =
            write_side_file(&path, &DocInfoParams::default(), &BookmarkParams::default()).unwrap();
        assert!(!written);
        assert!(!path.exists());
    }

    #[test]
    fn test_side_file_written() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(dir.path().join("marks")).unwrap();

        let docinfo = DocInfoParams {
            title: "Doc".to_string(),
            ..Default::default()
        };
        let bookmarks = BookmarkParams {
            entries: vec![bookmark("Start", 1, 0, false)],
        };

        assert!(write_side_file(&path, &docinfo, &bookmarks).unwrap());
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("/DOCINFO pdfmark"));
        assert!(content.contains("/Title (Start) /OUT pdfmark"));
    }
}
