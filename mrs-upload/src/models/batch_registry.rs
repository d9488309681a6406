//! Batch registry: folder label → selected files
//!
//! Iteration follows insertion order. Replacing the contents of an existing
//! label keeps its position, so flattening is stable across re-merges.

use super::SelectedFile;

/// Files belonging to one logical folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub label: String,
    pub files: Vec<SelectedFile>,
}

/// All batches for one upload role
///
/// Labels are unique within a registry. An empty registry means no files
/// are selected for the role.
#[derive(Debug, Clone, Default)]
pub struct BatchRegistry {
    batches: Vec<Batch>,
}

impl BatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of batches
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn contains_label(&self, label: &str) -> bool {
        self.batches.iter().any(|b| b.label == label)
    }

    /// Labels in iteration order
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.batches.iter().map(|b| b.label.as_str())
    }

    pub fn get(&self, label: &str) -> Option<&[SelectedFile]> {
        self.batches
            .iter()
            .find(|b| b.label == label)
            .map(|b| b.files.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Batch> {
        self.batches.iter()
    }

    /// Set a batch's contents
    ///
    /// Returns the previous contents if the label already existed (its
    /// position is kept); otherwise the batch is appended.
    pub fn insert(&mut self, label: String, files: Vec<SelectedFile>) -> Option<Vec<SelectedFile>> {
        match self.batches.iter_mut().find(|b| b.label == label) {
            Some(batch) => Some(std::mem::replace(&mut batch.files, files)),
            None => {
                self.batches.push(Batch { label, files });
                None
            }
        }
    }

    /// Append files to a batch, creating it if missing
    pub fn append(&mut self, label: &str, files: Vec<SelectedFile>) {
        match self.batches.iter_mut().find(|b| b.label == label) {
            Some(batch) => batch.files.extend(files),
            None => self.batches.push(Batch {
                label: label.to_string(),
                files,
            }),
        }
    }

    /// All files across batches, in iteration order
    ///
    /// No deduplication: a file present in two batches appears twice.
    pub fn flatten(&self) -> Vec<SelectedFile> {
        self.batches
            .iter()
            .flat_map(|b| b.files.iter().cloned())
            .collect()
    }

    /// Total number of files across batches
    pub fn file_count(&self) -> usize {
        self.batches.iter().map(|b| b.files.len()).sum()
    }

    pub fn clear(&mut self) {
        self.batches.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(rel: &str) -> SelectedFile {
        SelectedFile::in_memory(rel, Vec::new())
    }

    #[test]
    fn test_flatten_follows_insertion_order() {
        let mut registry = BatchRegistry::new();
        registry.insert("S14".to_string(), vec![file("S14/f1.dcm"), file("S14/f2.dcm")]);
        registry.insert("S15".to_string(), vec![file("S15/f3.dcm")]);

        let flat = registry.flatten();
        let names: Vec<&str> = flat.iter().map(|f| f.relative_path.as_str()).collect();

        assert_eq!(names, vec!["S14/f1.dcm", "S14/f2.dcm", "S15/f3.dcm"]);
        assert_eq!(registry.file_count(), 3);
    }

    #[test]
    fn test_insert_existing_label_replaces_in_place() {
        let mut registry = BatchRegistry::new();
        registry.insert("A".to_string(), vec![file("A/1.dcm")]);
        registry.insert("B".to_string(), vec![file("B/1.dcm")]);

        let previous = registry.insert("A".to_string(), vec![file("A/2.dcm")]);

        assert_eq!(previous, Some(vec![file("A/1.dcm")]));
        assert_eq!(registry.labels().collect::<Vec<_>>(), vec!["A", "B"]);
        assert_eq!(registry.get("A").unwrap(), &[file("A/2.dcm")]);
    }

    #[test]
    fn test_flatten_keeps_duplicates_across_batches() {
        let mut registry = BatchRegistry::new();
        registry.insert("A".to_string(), vec![file("x.dcm")]);
        registry.insert("B".to_string(), vec![file("x.dcm")]);

        assert_eq!(registry.flatten().len(), 2);
    }

    #[test]
    fn test_append_extends_or_creates() {
        let mut registry = BatchRegistry::new();
        registry.append("A", vec![file("A/1.dcm")]);
        registry.append("A", vec![file("A/2.dcm")]);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("A").unwrap().len(), 2);
    }

    #[test]
    fn test_clear_empties_registry() {
        let mut registry = BatchRegistry::new();
        registry.insert("A".to_string(), vec![file("A/1.dcm")]);
        registry.clear();

        assert!(registry.is_empty());
        assert!(registry.flatten().is_empty());
    }
}
