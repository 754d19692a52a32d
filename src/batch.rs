//! Size-bounded batch packing for assistant uploads.
//!
//! The managed-assistant service charges per-file upload and processing
//! overhead, so many small documents are concatenated into a few upload
//! units under a byte ceiling. Packing is greedy in arrival order: files
//! are appended to the current batch until adding the next one would
//! exceed the ceiling, at which point the batch is sealed and a new one
//! started. A single file whose own formatted block exceeds the ceiling
//! still ships alone in its own oversized batch — files are never split.
//!
//! This does not reorder input and does not guarantee a minimal batch
//! count.

use crate::models::ExtractedFile;

/// A sealed upload unit: concatenated file blocks plus bookkeeping.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Upload name, `folder_{folder_id}_batch_{n}.txt` with n from 1.
    pub name: String,
    /// Concatenated `=== FILE: … ===` blocks.
    pub body: String,
    /// UTF-8 byte length of `body`.
    pub byte_len: usize,
    /// Names of the files included, in input order.
    pub files: Vec<String>,
}

/// Outcome of uploading one sealed batch.
#[derive(Debug, Clone)]
pub struct BatchUploadOutcome {
    pub batch_name: String,
    pub files: Vec<String>,
    pub status: UploadStatus,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    Success,
    Error,
}

/// Render one file as its marker-delimited block.
fn format_block(file_name: &str, content: &str) -> String {
    format!("\n\n=== FILE: {} ===\n\n{}\n", file_name, content)
}

/// Pack files into batches under `max_bytes`, greedy in arrival order.
///
/// Files with empty or whitespace-only content are skipped. Every other
/// input file lands in exactly one batch.
pub fn pack_batches(folder_id: &str, files: &[ExtractedFile], max_bytes: usize) -> Vec<Batch> {
    let mut batches: Vec<Batch> = Vec::new();
    let mut body = String::new();
    let mut included: Vec<String> = Vec::new();
    let mut total = 0usize;

    for file in files {
        if file.content.trim().is_empty() {
            continue;
        }

        let block = format_block(&file.file_name, &file.content);
        let block_len = block.len();

        if total > 0 && total + block_len > max_bytes {
            seal_batch(folder_id, &mut batches, &mut body, &mut included, &mut total);
        }

        body.push_str(&block);
        total += block_len;
        included.push(file.file_name.clone());
    }

    seal_batch(folder_id, &mut batches, &mut body, &mut included, &mut total);

    batches
}

/// Close the current batch and reset the running buffer.
fn seal_batch(
    folder_id: &str,
    batches: &mut Vec<Batch>,
    body: &mut String,
    included: &mut Vec<String>,
    total: &mut usize,
) {
    if *total == 0 {
        return;
    }
    batches.push(Batch {
        name: format!("folder_{}_batch_{}.txt", folder_id, batches.len() + 1),
        body: std::mem::take(body),
        byte_len: *total,
        files: std::mem::take(included),
    });
    *total = 0;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, content: &str) -> ExtractedFile {
        ExtractedFile {
            file_id: format!("id-{}", name),
            file_name: name.to_string(),
            content: content.to_string(),
        }
    }

    fn block_len(name: &str, content: &str) -> usize {
        format_block(name, content).len()
    }

    #[test]
    fn test_three_equal_files_split_two_one() {
        // Three equal files with a ceiling that fits two: batches are [1, 2] and [3].
        let content = "x".repeat(1000);
        let files = vec![
            file("a.txt", &content),
            file("b.txt", &content),
            file("c.txt", &content),
        ];
        let ceiling = 2 * block_len("a.txt", &content) + 10;

        let batches = pack_batches("d1", &files, ceiling);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].files, vec!["a.txt", "b.txt"]);
        assert_eq!(batches[1].files, vec!["c.txt"]);
        assert_eq!(batches[0].name, "folder_d1_batch_1.txt");
        assert_eq!(batches[1].name, "folder_d1_batch_2.txt");
    }

    #[test]
    fn test_no_batch_exceeds_ceiling() {
        let files: Vec<ExtractedFile> = (0..20)
            .map(|i| file(&format!("f{}.txt", i), &"y".repeat(300)))
            .collect();
        let ceiling = 1000;

        let batches = pack_batches("d1", &files, ceiling);
        for batch in &batches {
            assert!(batch.byte_len <= ceiling, "batch over ceiling");
            assert_eq!(batch.byte_len, batch.body.len());
        }
    }

    #[test]
    fn test_every_nonempty_file_in_exactly_one_batch() {
        let files = vec![
            file("a.txt", "alpha"),
            file("empty.txt", "   \n  "),
            file("b.txt", "beta"),
        ];
        let batches = pack_batches("d1", &files, 10_000);

        let all: Vec<&str> = batches
            .iter()
            .flat_map(|b| b.files.iter().map(|s| s.as_str()))
            .collect();
        assert_eq!(all, vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn test_oversized_file_ships_alone() {
        let big = "z".repeat(5000);
        let files = vec![file("small.txt", "tiny"), file("big.txt", &big), file("after.txt", "ok")];

        let batches = pack_batches("d1", &files, 100);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[1].files, vec!["big.txt"]);
        assert!(batches[1].byte_len > 100);
    }

    #[test]
    fn test_empty_input_yields_no_batches() {
        assert!(pack_batches("d1", &[], 1000).is_empty());
        let only_empty = vec![file("a.txt", ""), file("b.txt", "  ")];
        assert!(pack_batches("d1", &only_empty, 1000).is_empty());
    }

    #[test]
    fn test_body_contains_file_markers() {
        let batches = pack_batches("d1", &[file("notes.txt", "hello world")], 1000);
        assert_eq!(batches.len(), 1);
        assert!(batches[0].body.contains("=== FILE: notes.txt ==="));
        assert!(batches[0].body.contains("hello world"));
    }
}
